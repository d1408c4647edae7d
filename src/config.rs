use serde::Deserialize;
use std::path::Path;

use crate::filter::RuleList;
use crate::tags::Embed;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Check interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// HTTP timeout in seconds, for both feed fetches and webhook posts
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// How often a rate-limited webhook post is retried
    #[serde(default = "default_rate_limit_retries")]
    pub rate_limit_retries: u32,
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_request_timeout() -> u64 {
    30
}

fn default_rate_limit_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub url: String,
    /// Name of a registered webhook
    pub webhook: String,
    #[serde(default)]
    pub paused: bool,
    /// Display title overriding the one the feed publishes
    pub title: Option<String>,
    pub custom_message: Option<String>,
    pub embed: Option<Embed>,
    pub whitelist: Option<RuleList>,
    pub blacklist: Option<RuleList>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}
