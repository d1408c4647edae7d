use std::sync::Arc;
use std::time::Duration;

use feed_rs::model::{Entry as ParsedEntry, Feed as ParsedFeed};
use feed_rs::parser;
use reqwest::Client;
use tracing::{debug, error, info};

use crate::db::{Content, Database, EntryUpdate, FeedUpdate};
use crate::error::{Error, Result};

pub struct Fetcher {
    client: Client,
    db: Arc<Database>,
}

impl Fetcher {
    pub fn new(db: Arc<Database>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("FeedCourier/1.0 (RSS Reader)")
            .build()
            .expect("Failed to create HTTP client");

        Self { client, db }
    }

    /// Refresh every feed that has updates enabled.
    ///
    /// A failing feed is logged and recorded on the feed; the others still refresh.
    pub async fn update_feeds(&self) -> Result<()> {
        let feeds = self.db.get_feeds().await?;
        info!("Refreshing {} feeds", feeds.len());

        for feed in feeds {
            if !feed.updates_enabled {
                debug!("Skipping paused feed: {}", feed.url);
                continue;
            }

            if let Err(e) = self.update_feed(&feed.url).await {
                error!(feed = %feed.url, error = %e, kind = e.kind(), "Failed to refresh feed");
            }
        }

        info!("Feed refresh complete");
        Ok(())
    }

    /// Refresh one feed and return how many entries were new.
    pub async fn update_feed(&self, url: &str) -> Result<usize> {
        if self.db.get_feed(url).await?.is_none() {
            return Err(Error::FeedNotFound(url.to_string()));
        }

        match self.refresh(url).await {
            Ok(count) => {
                self.db.update_feed_fetched(url, None).await?;
                Ok(count)
            }
            Err(e) => {
                self.db.update_feed_fetched(url, Some(&e.to_string())).await?;
                Err(e)
            }
        }
    }

    async fn refresh(&self, url: &str) -> Result<usize> {
        debug!("Fetching feed: {}", url);

        let parse_error = |message: String| Error::Parse {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| parse_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error(format!("bad HTTP status {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| parse_error(e.to_string()))?;
        let parsed = parser::parse(&bytes[..]).map_err(|e| parse_error(e.to_string()))?;

        self.db
            .update_feed_metadata(url, &Self::feed_update(&parsed))
            .await?;

        let total = parsed.entries.len();
        let mut new = 0;
        for entry in parsed.entries {
            if self.db.upsert_entry(url, &Self::entry_update(entry)).await? {
                new += 1;
            }
        }

        info!("Stored {} entries ({} new) for feed '{}'", total, new, url);
        Ok(new)
    }

    pub fn feed_update(feed: &ParsedFeed) -> FeedUpdate {
        FeedUpdate {
            title: feed.title.as_ref().map(|t| t.content.clone()),
            subtitle: feed.description.as_ref().map(|t| t.content.clone()),
            author: feed.authors.first().map(|p| p.name.clone()),
            link: feed.links.first().map(|l| l.href.clone()),
            version: Some(format!("{:?}", feed.feed_type).to_lowercase()),
            updated: feed.updated.map(|dt| dt.to_rfc3339()),
        }
    }

    pub fn entry_update(entry: ParsedEntry) -> EntryUpdate {
        let content = entry
            .content
            .into_iter()
            .filter_map(|c| {
                let content_type = Some(c.content_type.to_string());
                c.body.map(|value| Content {
                    value,
                    content_type,
                })
            })
            .collect();

        EntryUpdate {
            id: entry.id,
            title: entry.title.map(|t| t.content),
            link: entry.links.into_iter().next().map(|l| l.href),
            author: entry.authors.into_iter().next().map(|p| p.name),
            summary: entry.summary.map(|t| t.content),
            content,
            published: entry.published.map(|dt| dt.to_rfc3339()),
            updated: entry.updated.map(|dt| dt.to_rfc3339()),
        }
    }
}
