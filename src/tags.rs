//! Tag-backed configuration.
//!
//! Every per-feed setting (webhook binding, custom message, embed, filter rules) and the
//! global webhook registry are stored as string tags. Components receive the store as a
//! `&dyn TagStore` so they can be driven by any implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

pub const WEBHOOK: &str = "webhook";
pub const WEBHOOKS: &str = "webhooks";
pub const CUSTOM_MESSAGE: &str = "custom_message";
pub const EMBED: &str = "embed";

/// Color used by embeds that were never customised.
pub const DEFAULT_EMBED_COLOR: u32 = 32896;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagScope<'a> {
    Global,
    Feed(&'a str),
}

impl<'a> TagScope<'a> {
    pub fn as_key(&self) -> &'a str {
        match self {
            TagScope::Global => "",
            TagScope::Feed(url) => *url,
        }
    }
}

#[async_trait]
pub trait TagStore: Send + Sync {
    async fn get_tag(&self, scope: TagScope<'_>, key: &str) -> Result<Option<String>>;
    async fn set_tag(&self, scope: TagScope<'_>, key: &str, value: &str) -> Result<()>;
    async fn delete_tag(&self, scope: TagScope<'_>, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub name: String,
    pub url: String,
}

/// A Discord embed template. String fields may contain `{{tokens}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub author_name: String,
    pub author_url: String,
    pub author_icon_url: String,
    pub image_url: String,
    pub thumbnail_url: String,
    pub footer_text: String,
    pub footer_icon_url: String,
}

impl Default for Embed {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            color: DEFAULT_EMBED_COLOR,
            author_name: String::new(),
            author_url: String::new(),
            author_icon_url: String::new(),
            image_url: String::new(),
            thumbnail_url: String::new(),
            footer_text: String::new(),
            footer_icon_url: String::new(),
        }
    }
}

impl Embed {
    pub fn is_default(&self) -> bool {
        *self == Embed::default()
    }

    /// Mutable access to the nine templated string fields.
    pub fn text_fields_mut(&mut self) -> [&mut String; 9] {
        [
            &mut self.title,
            &mut self.description,
            &mut self.author_name,
            &mut self.author_url,
            &mut self.author_icon_url,
            &mut self.image_url,
            &mut self.thumbnail_url,
            &mut self.footer_text,
            &mut self.footer_icon_url,
        ]
    }
}

/// The webhook URL bound to a feed. An empty tag counts as unbound.
pub async fn get_webhook_url(store: &dyn TagStore, feed_url: &str) -> Result<Option<String>> {
    let url = store.get_tag(TagScope::Feed(feed_url), WEBHOOK).await?;
    Ok(url.filter(|u| !u.trim().is_empty()))
}

pub async fn set_webhook_url(store: &dyn TagStore, feed_url: &str, webhook_url: &str) -> Result<()> {
    store
        .set_tag(TagScope::Feed(feed_url), WEBHOOK, webhook_url)
        .await
}

pub async fn list_webhooks(store: &dyn TagStore) -> Result<Vec<Webhook>> {
    let Some(raw) = store.get_tag(TagScope::Global, WEBHOOKS).await? else {
        return Ok(Vec::new());
    };

    match serde_json::from_str(&raw) {
        Ok(hooks) => Ok(hooks),
        Err(e) => {
            warn!(error = %e, "ignoring unreadable webhook registry");
            Ok(Vec::new())
        }
    }
}

pub async fn find_webhook(store: &dyn TagStore, name: &str) -> Result<Option<Webhook>> {
    let hooks = list_webhooks(store).await?;
    Ok(hooks.into_iter().find(|h| h.name == name.trim()))
}

/// Register a webhook under a unique name.
pub async fn add_webhook(store: &dyn TagStore, name: &str, url: &str) -> Result<Webhook> {
    let webhook = Webhook {
        name: name.trim().to_string(),
        url: url.trim().to_string(),
    };

    let mut hooks = list_webhooks(store).await?;
    if hooks.iter().any(|h| h.name == webhook.name) {
        return Err(Error::WebhookExists(webhook.name));
    }

    hooks.push(webhook.clone());
    store
        .set_tag(TagScope::Global, WEBHOOKS, &serde_json::to_string(&hooks)?)
        .await?;

    info!("Added webhook {}", webhook.name);
    Ok(webhook)
}

/// Remove the registration with this URL. Feeds bound to it keep their (now dangling) URL.
pub async fn delete_webhook(store: &dyn TagStore, url: &str) -> Result<Webhook> {
    let url = url.trim();
    let mut hooks = list_webhooks(store).await?;

    let Some(position) = hooks.iter().position(|h| h.url == url) else {
        return Err(Error::WebhookNotFound(url.to_string()));
    };

    let removed = hooks.remove(position);
    store
        .set_tag(TagScope::Global, WEBHOOKS, &serde_json::to_string(&hooks)?)
        .await?;

    info!("Removed webhook {}", removed.name);
    Ok(removed)
}

pub async fn get_custom_message(store: &dyn TagStore, feed_url: &str) -> Result<String> {
    let message = store.get_tag(TagScope::Feed(feed_url), CUSTOM_MESSAGE).await?;
    Ok(message.unwrap_or_default())
}

pub async fn set_custom_message(store: &dyn TagStore, feed_url: &str, message: &str) -> Result<()> {
    store
        .set_tag(TagScope::Feed(feed_url), CUSTOM_MESSAGE, message)
        .await
}

/// The embed stored for a feed, or the default embed when none is set.
pub async fn get_embed(store: &dyn TagStore, feed_url: &str) -> Result<Embed> {
    let Some(raw) = store.get_tag(TagScope::Feed(feed_url), EMBED).await? else {
        return Ok(Embed::default());
    };

    match serde_json::from_str(&raw) {
        Ok(embed) => Ok(embed),
        Err(e) => {
            warn!(feed = %feed_url, error = %e, "ignoring unreadable embed");
            Ok(Embed::default())
        }
    }
}

pub async fn set_embed(store: &dyn TagStore, feed_url: &str, embed: &Embed) -> Result<()> {
    store
        .set_tag(TagScope::Feed(feed_url), EMBED, &serde_json::to_string(embed)?)
        .await
}
