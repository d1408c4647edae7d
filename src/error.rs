use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Feed not found: {0}")]
    FeedNotFound(String),

    #[error("Feed already exists: {0}")]
    FeedExists(String),

    #[error("Invalid feed URL: {0}")]
    InvalidFeedUrl(String),

    #[error("An error occurred while getting/parsing feed {url}: {message}")]
    Parse { url: String, message: String },

    #[error("No webhook found for feed: {0}")]
    NoWebhookFound(String),

    #[error("Webhook already exists: {0}")]
    WebhookExists(String),

    #[error("Could not find webhook: {0}")]
    WebhookNotFound(String),

    #[error("An exception was raised by the underlying storage: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Short descriptor used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::FeedNotFound(_) => "feed_not_found",
            Error::FeedExists(_) => "feed_exists",
            Error::InvalidFeedUrl(_) => "invalid_feed_url",
            Error::Parse { .. } => "parse",
            Error::NoWebhookFound(_) => "no_webhook_found",
            Error::WebhookExists(_) => "webhook_exists",
            Error::WebhookNotFound(_) => "webhook_not_found",
            Error::Storage(_) => "storage",
            Error::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
