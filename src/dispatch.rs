use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, error, warn};

use crate::db::{Database, Entry};
use crate::error::{Error, Result};
use crate::tags::{self, Embed, TagStore};

const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(1);
const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

/// What gets posted to a webhook.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Message(String),
    Embed(Embed),
}

impl Payload {
    /// The Discord webhook body for this payload.
    pub fn to_json(&self) -> Value {
        match self {
            Payload::Message(content) => json!({ "content": content }),
            Payload::Embed(embed) => json!({ "embeds": [embed_json(embed)] }),
        }
    }
}

fn insert_non_empty(object: &mut Map<String, Value>, key: &str, value: &str) {
    if !value.is_empty() {
        object.insert(key.to_string(), Value::String(value.to_string()));
    }
}

// Discord rejects empty strings in embeds, so blank fields are left out.
fn embed_json(embed: &Embed) -> Value {
    let mut object = Map::new();
    insert_non_empty(&mut object, "title", &embed.title);
    insert_non_empty(&mut object, "description", &embed.description);
    object.insert("color".to_string(), json!(embed.color));

    let mut author = Map::new();
    insert_non_empty(&mut author, "name", &embed.author_name);
    insert_non_empty(&mut author, "url", &embed.author_url);
    insert_non_empty(&mut author, "icon_url", &embed.author_icon_url);
    if author.contains_key("name") {
        object.insert("author".to_string(), Value::Object(author));
    }

    if !embed.image_url.is_empty() {
        object.insert("image".to_string(), json!({ "url": embed.image_url }));
    }
    if !embed.thumbnail_url.is_empty() {
        object.insert("thumbnail".to_string(), json!({ "url": embed.thumbnail_url }));
    }

    let mut footer = Map::new();
    insert_non_empty(&mut footer, "text", &embed.footer_text);
    insert_non_empty(&mut footer, "icon_url", &embed.footer_icon_url);
    if footer.contains_key("text") {
        object.insert("footer".to_string(), Value::Object(footer));
    }

    Value::Object(object)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { status: StatusCode },
    /// The entry was put back to unread and will be retried on the next run.
    Failed {
        status: Option<StatusCode>,
        reason: String,
    },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

pub struct Dispatcher {
    client: Client,
    db: Arc<Database>,
    tags: Arc<dyn TagStore>,
    rate_limit_retries: u32,
}

impl Dispatcher {
    pub fn new(db: Arc<Database>, timeout: Duration, rate_limit_retries: u32) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("FeedCourier/1.0 (Webhook Relay)")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            tags: db.clone(),
            db,
            rate_limit_retries,
        }
    }

    /// Look up webhook bindings in `tags` instead of the database.
    pub fn with_tag_store(mut self, tags: Arc<dyn TagStore>) -> Self {
        self.tags = tags;
        self
    }

    /// Deliver one entry to its feed's webhook.
    ///
    /// The entry is marked read before sending and put back to unread when anything after
    /// that fails, so the next run picks it up again.
    pub async fn dispatch(&self, entry: &Entry, payload: &Payload) -> Result<DeliveryOutcome> {
        self.db.set_entry_read(entry, true).await?;
        debug!("New entry: {}", entry.title.as_deref().unwrap_or_default());

        match self.send(entry, payload).await {
            Ok(outcome) if outcome.is_delivered() => Ok(outcome),
            Ok(outcome) => {
                self.db.set_entry_read(entry, false).await?;
                Ok(outcome)
            }
            Err(e) => {
                self.db.set_entry_read(entry, false).await?;
                Err(e)
            }
        }
    }

    async fn send(&self, entry: &Entry, payload: &Payload) -> Result<DeliveryOutcome> {
        let Some(webhook_url) = tags::get_webhook_url(&*self.tags, &entry.feed_url).await?
        else {
            error!("No webhook found for feed: {}", entry.feed_url);
            return Err(Error::NoWebhookFound(entry.feed_url.clone()));
        };

        debug!("Sending to webhook: {}", webhook_url);
        let outcome = match self.execute(&webhook_url, &payload.to_json()).await {
            Ok(response) if response.status().is_success() => DeliveryOutcome::Delivered {
                status: response.status(),
            },
            Ok(response) => {
                let status = response.status();
                let reason = response.text().await.unwrap_or_default();
                error!(feed = %entry.feed_url, entry = %entry.id, %status, "Webhook rejected entry: {}", reason);
                DeliveryOutcome::Failed {
                    status: Some(status),
                    reason,
                }
            }
            Err(e) => {
                error!(feed = %entry.feed_url, entry = %entry.id, error = %e, "Webhook request failed");
                DeliveryOutcome::Failed {
                    status: None,
                    reason: e.to_string(),
                }
            }
        };

        Ok(outcome)
    }

    /// POST the body, waiting out 429 responses up to the configured number of retries.
    async fn execute(&self, url: &str, body: &Value) -> reqwest::Result<Response> {
        let mut retries = 0;
        loop {
            let response = self.client.post(url).json(body).send().await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS
                || retries >= self.rate_limit_retries
            {
                return Ok(response);
            }

            retries += 1;
            let wait = retry_after(response).await;
            warn!("Webhook rate limited, retrying in {:?} ({}/{})", wait, retries, self.rate_limit_retries);
            tokio::time::sleep(wait).await;
        }
    }
}

/// How long a 429 response asks us to wait, from the `Retry-After` header or the
/// `retry_after` field Discord puts in the body.
async fn retry_after(response: Response) -> Duration {
    let from_header = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok());

    let seconds = match from_header {
        Some(seconds) => Some(seconds),
        None => response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("retry_after").and_then(Value::as_f64)),
    };

    seconds
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(|s| Duration::from_secs_f64(s).min(MAX_RETRY_WAIT))
        .unwrap_or(DEFAULT_RETRY_WAIT)
}
