//! Feed Courier - RSS/Atom to Discord webhook relay
//!
//! Periodically refreshes subscribed feeds, filters new entries through per-feed
//! whitelist/blacklist rules, renders them with per-feed templates and posts them
//! to the Discord webhook bound to each feed.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod markdown;
pub mod pipeline;
pub mod render;
pub mod tags;

pub use error::{Error, Result};
