//! Ties the pieces together: refresh feeds, filter new entries, render and deliver them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{Config, FeedConfig};
use crate::db::{Database, Entry, Feed};
use crate::dispatch::{DeliveryOutcome, Dispatcher, Payload};
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::filter::FilterRules;
use crate::render;
use crate::tags;

/// Tally of one check run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub delivered: usize,
    pub failed: usize,
    pub filtered: usize,
    /// Entries whose processing raised an error, such as a missing webhook.
    pub errored: usize,
}

pub struct Pipeline {
    db: Arc<Database>,
    fetcher: Fetcher,
    dispatcher: Dispatcher,
    checking: Arc<RwLock<bool>>,
}

impl Pipeline {
    pub fn new(db: Arc<Database>, fetcher: Fetcher, dispatcher: Dispatcher) -> Self {
        Self {
            db,
            fetcher,
            dispatcher,
            checking: Arc::new(RwLock::new(false)),
        }
    }

    pub fn from_config(db: Arc<Database>, config: &Config) -> Self {
        let timeout = Duration::from_secs(config.request_timeout);
        let fetcher = Fetcher::new(db.clone(), timeout);
        let dispatcher = Dispatcher::new(db.clone(), timeout, config.rate_limit_retries);
        Self::new(db, fetcher, dispatcher)
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub async fn is_checking(&self) -> bool {
        *self.checking.read().await
    }

    /// Refresh every enabled feed and deliver all unread entries.
    ///
    /// Returns an empty summary without doing anything if a run is already in progress.
    pub async fn check_all_feeds(&self) -> Result<CheckSummary> {
        if !self.begin_check().await {
            info!("Check already in progress, skipping");
            return Ok(CheckSummary::default());
        }

        let result = self.do_check_all().await;
        self.end_check().await;
        result
    }

    async fn do_check_all(&self) -> Result<CheckSummary> {
        self.fetcher.update_feeds().await?;

        let entries = self.db.get_entries(None, Some(false)).await?;
        let summary = self.process_entries(entries).await;

        info!(
            "Check complete: {} delivered, {} failed, {} filtered, {} errored",
            summary.delivered, summary.failed, summary.filtered, summary.errored
        );
        Ok(summary)
    }

    /// Refresh a single feed and deliver its unread entries.
    ///
    /// Shares the in-progress guard with [`Pipeline::check_all_feeds`], so it is skipped
    /// while any other check is running.
    pub async fn check_feed(&self, url: &str) -> Result<CheckSummary> {
        if !self.begin_check().await {
            info!("Check already in progress, skipping {}", url);
            return Ok(CheckSummary::default());
        }

        let result = self.do_check_feed(url).await;
        self.end_check().await;
        result
    }

    async fn do_check_feed(&self, url: &str) -> Result<CheckSummary> {
        self.fetcher.update_feed(url).await?;

        let entries = self.db.get_entries(Some(url), Some(false)).await?;
        Ok(self.process_entries(entries).await)
    }

    async fn begin_check(&self) -> bool {
        let mut checking = self.checking.write().await;
        if *checking {
            return false;
        }
        *checking = true;
        true
    }

    async fn end_check(&self) {
        let mut checking = self.checking.write().await;
        *checking = false;
    }

    async fn process_entries(&self, entries: Vec<Entry>) -> CheckSummary {
        let mut summary = CheckSummary::default();
        // Feed row and filter rules, loaded once per feed per run.
        let mut feeds: HashMap<String, Option<(Feed, FilterRules)>> = HashMap::new();

        for entry in entries {
            if !feeds.contains_key(&entry.feed_url) {
                let loaded = match self.load_feed(&entry.feed_url).await {
                    Ok(loaded) => loaded,
                    Err(e) => {
                        error!(feed = %entry.feed_url, error = %e, kind = e.kind(), "Failed to load feed");
                        None
                    }
                };
                feeds.insert(entry.feed_url.clone(), loaded);
            }

            let Some((feed, rules)) = feeds.get(&entry.feed_url).and_then(Option::as_ref) else {
                summary.errored += 1;
                continue;
            };

            if !rules.admit(&entry) {
                debug!("Entry filtered out: {}", entry.id);
                summary.filtered += 1;
                continue;
            }

            match self.deliver(feed, &entry).await {
                Ok(DeliveryOutcome::Delivered { .. }) => summary.delivered += 1,
                Ok(DeliveryOutcome::Failed { .. }) => summary.failed += 1,
                Err(e) => {
                    error!(feed = %entry.feed_url, entry = %entry.id, error = %e, kind = e.kind(), "Failed to deliver entry");
                    summary.errored += 1;
                }
            }
        }

        summary
    }

    async fn load_feed(&self, url: &str) -> Result<Option<(Feed, FilterRules)>> {
        let Some(feed) = self.db.get_feed(url).await? else {
            return Ok(None);
        };
        let rules = FilterRules::load(&*self.db, url).await?;
        Ok(Some((feed, rules)))
    }

    async fn deliver(&self, feed: &Feed, entry: &Entry) -> Result<DeliveryOutcome> {
        let payload = self.build_payload(feed, entry).await?;
        self.dispatcher.dispatch(entry, &payload).await
    }

    /// A customised embed wins over a custom message, which wins over the default message.
    pub async fn build_payload(&self, feed: &Feed, entry: &Entry) -> Result<Payload> {
        let embed = tags::get_embed(&*self.db, &feed.url).await?;
        if !embed.is_default() {
            return Ok(Payload::Embed(render::render_embed(&embed, feed, entry)));
        }

        let message = tags::get_custom_message(&*self.db, &feed.url).await?;
        if !message.is_empty() {
            return Ok(Payload::Message(render::render_message(&message, feed, entry)));
        }

        Ok(Payload::Message(render::default_message(entry)))
    }

    /// Subscribe to a feed and bind it to a registered webhook.
    ///
    /// Entries already present in the feed are marked read so only later ones are announced.
    /// If the first refresh fails the feed is removed again.
    pub async fn add_feed(&self, url: &str, webhook_name: &str) -> Result<()> {
        let url = url.trim();
        let Some(webhook) = tags::find_webhook(&*self.db, webhook_name).await? else {
            return Err(Error::WebhookNotFound(webhook_name.trim().to_string()));
        };

        self.db.add_feed(url).await?;

        if let Err(e) = self.fetcher.update_feed(url).await {
            self.db.delete_feed(url).await?;
            return Err(e);
        }

        for entry in self.db.get_entries(Some(url), Some(false)).await? {
            self.db.set_entry_read(&entry, true).await?;
        }

        tags::set_webhook_url(&*self.db, url, &webhook.url).await?;
        info!("Added feed {} -> webhook {}", url, webhook.name);
        Ok(())
    }

    /// Refresh one feed without delivering anything.
    pub async fn update_feed(&self, url: &str) -> Result<usize> {
        self.fetcher.update_feed(url).await
    }

    pub async fn remove_feed(&self, url: &str) -> Result<()> {
        self.db.delete_feed(url).await?;
        info!("Removed feed {}", url);
        Ok(())
    }

    pub async fn pause_feed(&self, url: &str) -> Result<()> {
        self.db.set_feed_updates_enabled(url, false).await
    }

    pub async fn unpause_feed(&self, url: &str) -> Result<()> {
        self.db.set_feed_updates_enabled(url, true).await
    }

    /// Register the configured webhooks and feeds and apply per-feed settings.
    ///
    /// Already-registered webhooks and feeds are left in place. A feed that can't be
    /// added is logged and skipped.
    pub async fn sync_config(&self, config: &Config) -> Result<()> {
        for hook in &config.webhooks {
            match tags::add_webhook(&*self.db, &hook.name, &hook.url).await {
                Ok(_) => {}
                Err(Error::WebhookExists(name)) => debug!("Webhook {} already registered", name),
                Err(e) => return Err(e),
            }
        }

        for feed in &config.feeds {
            if let Err(e) = self.sync_feed(feed).await {
                warn!(feed = %feed.url, error = %e, kind = e.kind(), "Failed to apply feed config");
            }
        }

        Ok(())
    }

    async fn sync_feed(&self, config: &FeedConfig) -> Result<()> {
        let url = config.url.trim();

        if self.db.get_feed(url).await?.is_none() {
            self.add_feed(url, &config.webhook).await?;
        } else {
            let Some(webhook) = tags::find_webhook(&*self.db, &config.webhook).await? else {
                return Err(Error::WebhookNotFound(config.webhook.clone()));
            };
            tags::set_webhook_url(&*self.db, url, &webhook.url).await?;
        }

        self.db.set_feed_updates_enabled(url, !config.paused).await?;

        if let Some(title) = &config.title {
            let title = title.trim();
            self.db
                .set_feed_user_title(url, (!title.is_empty()).then_some(title))
                .await?;
        }

        if let Some(message) = &config.custom_message {
            tags::set_custom_message(&*self.db, url, message).await?;
        }
        if let Some(embed) = &config.embed {
            tags::set_embed(&*self.db, url, embed).await?;
        }
        if config.whitelist.is_some() || config.blacklist.is_some() {
            let rules = FilterRules {
                whitelist: config.whitelist.clone().unwrap_or_default(),
                blacklist: config.blacklist.clone().unwrap_or_default(),
            };
            rules.save(&*self.db, url).await?;
        }

        Ok(())
    }
}

pub async fn start_background_check(pipeline: Arc<Pipeline>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes * 60);

    info!("Starting initial feed check");
    if let Err(e) = pipeline.check_all_feeds().await {
        error!("Initial feed check failed: {}", e);
    }

    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled feed check");
        if let Err(e) = pipeline.check_all_feeds().await {
            error!("Scheduled feed check failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::EntryUpdate;
    use crate::filter::RuleList;
    use crate::tags::Embed;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example News</title>
    <link>https://example.com/</link>
    <description>All the news</description>
    <item>
      <guid>https://example.com/1</guid>
      <title>Release notes</title>
      <link>https://example.com/1</link>
      <description>Version 2 is out</description>
    </item>
    <item>
      <guid>https://example.com/2</guid>
      <title>SPAM alert</title>
      <link>https://example.com/2</link>
      <description>Buy now</description>
    </item>
  </channel>
</rss>"#;

    async fn create_pipeline() -> Pipeline {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        let db = Arc::new(db);
        let fetcher = Fetcher::new(db.clone(), Duration::from_secs(5));
        let dispatcher = Dispatcher::new(db.clone(), Duration::from_secs(5), 1);
        Pipeline::new(db, fetcher, dispatcher)
    }

    async fn serve_feed(server: &MockServer) -> String {
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(server)
            .await;
        format!("{}/rss", server.uri())
    }

    /// Registers a feed without the initial mark-as-read pass, so its entries stay unread.
    async fn add_unread_feed(pipeline: &Pipeline, url: &str, webhook_url: &str) {
        pipeline.db().add_feed(url).await.unwrap();
        tags::set_webhook_url(pipeline.db(), url, webhook_url).await.unwrap();
    }

    async fn unread_titles(pipeline: &Pipeline) -> Vec<String> {
        pipeline
            .db()
            .get_entries(None, Some(false))
            .await
            .unwrap()
            .into_iter()
            .filter_map(|e| e.title)
            .collect()
    }

    mod build_payload_tests {
        use super::*;

        const FEED: &str = "https://example.com/rss";

        async fn setup() -> (Pipeline, Feed, Entry) {
            let pipeline = create_pipeline().await;
            let db = pipeline.db();
            db.add_feed(FEED).await.unwrap();
            db.upsert_entry(
                FEED,
                &EntryUpdate {
                    id: "1".to_string(),
                    title: Some("Hello".to_string()),
                    link: Some("https://example.com/1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
            let feed = db.get_feed(FEED).await.unwrap().unwrap();
            let entry = db.get_entry(FEED, "1").await.unwrap().unwrap();
            (pipeline, feed, entry)
        }

        #[tokio::test]
        async fn test_default_message() {
            let (pipeline, feed, entry) = setup().await;
            let payload = pipeline.build_payload(&feed, &entry).await.unwrap();
            assert_eq!(
                payload,
                Payload::Message(":robot: :mega: New entry: Hello\nhttps://example.com/1".to_string())
            );
        }

        #[tokio::test]
        async fn test_custom_message() {
            let (pipeline, feed, entry) = setup().await;
            tags::set_custom_message(pipeline.db(), FEED, "{{entry_title}} ({{feed_url}})")
                .await
                .unwrap();

            let payload = pipeline.build_payload(&feed, &entry).await.unwrap();
            assert_eq!(
                payload,
                Payload::Message("Hello (https://example.com/rss)".to_string())
            );
        }

        #[tokio::test]
        async fn test_embed_wins_over_message() {
            let (pipeline, feed, entry) = setup().await;
            tags::set_custom_message(pipeline.db(), FEED, "ignored").await.unwrap();
            let embed = Embed {
                title: "{{entry_title}}".to_string(),
                ..Default::default()
            };
            tags::set_embed(pipeline.db(), FEED, &embed).await.unwrap();

            let Payload::Embed(rendered) = pipeline.build_payload(&feed, &entry).await.unwrap() else {
                panic!("expected an embed payload");
            };
            assert_eq!(rendered.title, "Hello");
        }

        #[tokio::test]
        async fn test_default_embed_falls_back_to_message() {
            let (pipeline, feed, entry) = setup().await;
            tags::set_embed(pipeline.db(), FEED, &Embed::default()).await.unwrap();
            tags::set_custom_message(pipeline.db(), FEED, "{{entry_link}}").await.unwrap();

            let payload = pipeline.build_payload(&feed, &entry).await.unwrap();
            assert_eq!(payload, Payload::Message("https://example.com/1".to_string()));
        }
    }

    mod check_tests {
        use super::*;

        #[tokio::test]
        async fn test_delivers_unread_entries() {
            let server = MockServer::start().await;
            let feed_url = serve_feed(&server).await;
            Mock::given(method("POST"))
                .and(path("/webhook"))
                .respond_with(ResponseTemplate::new(204))
                .expect(2)
                .mount(&server)
                .await;

            let pipeline = create_pipeline().await;
            add_unread_feed(&pipeline, &feed_url, &format!("{}/webhook", server.uri())).await;

            let summary = pipeline.check_all_feeds().await.unwrap();
            assert_eq!(summary.delivered, 2);
            assert!(unread_titles(&pipeline).await.is_empty());
        }

        #[tokio::test]
        async fn test_rejected_entry_stays_unread() {
            let server = MockServer::start().await;
            let feed_url = serve_feed(&server).await;
            Mock::given(method("POST"))
                .and(path("/webhook"))
                .and(body_json(json!({
                    "content": ":robot: :mega: New entry: Release notes\nhttps://example.com/1"
                })))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;

            let pipeline = create_pipeline().await;
            add_unread_feed(&pipeline, &feed_url, &format!("{}/webhook", server.uri())).await;
            let rules = FilterRules {
                blacklist: RuleList {
                    title: "spam".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            };
            rules.save(pipeline.db(), &feed_url).await.unwrap();

            let summary = pipeline.check_all_feeds().await.unwrap();
            assert_eq!(summary.delivered, 1);
            assert_eq!(summary.filtered, 1);
            assert_eq!(unread_titles(&pipeline).await, vec!["SPAM alert".to_string()]);
        }

        #[tokio::test]
        async fn test_rejected_entry_sent_once_rule_is_cleared() {
            let server = MockServer::start().await;
            let feed_url = serve_feed(&server).await;
            Mock::given(method("POST"))
                .and(path("/webhook"))
                .and(body_json(json!({
                    "content": ":robot: :mega: New entry: SPAM alert\nhttps://example.com/2"
                })))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path("/webhook"))
                .respond_with(ResponseTemplate::new(204))
                .mount(&server)
                .await;

            let pipeline = create_pipeline().await;
            add_unread_feed(&pipeline, &feed_url, &format!("{}/webhook", server.uri())).await;
            let mut rules = FilterRules {
                blacklist: RuleList {
                    title: "spam".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            };
            rules.save(pipeline.db(), &feed_url).await.unwrap();

            let first = pipeline.check_all_feeds().await.unwrap();
            assert_eq!(first.filtered, 1);

            // Rejection leaves no marker, so relaxing the rule re-surfaces the entry.
            rules.blacklist.title.clear();
            rules.save(pipeline.db(), &feed_url).await.unwrap();

            let second = pipeline.check_all_feeds().await.unwrap();
            assert_eq!(second.delivered, 1);
            assert_eq!(second.filtered, 0);
            assert!(unread_titles(&pipeline).await.is_empty());
        }

        #[tokio::test]
        async fn test_failed_delivery_is_retried_next_run() {
            let server = MockServer::start().await;
            let feed_url = serve_feed(&server).await;
            Mock::given(method("POST"))
                .and(path("/webhook"))
                .respond_with(ResponseTemplate::new(500))
                .up_to_n_times(2)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path("/webhook"))
                .respond_with(ResponseTemplate::new(204))
                .mount(&server)
                .await;

            let pipeline = create_pipeline().await;
            add_unread_feed(&pipeline, &feed_url, &format!("{}/webhook", server.uri())).await;

            let first = pipeline.check_all_feeds().await.unwrap();
            assert_eq!(first.failed, 2);
            assert_eq!(unread_titles(&pipeline).await.len(), 2);

            let second = pipeline.check_all_feeds().await.unwrap();
            assert_eq!(second.delivered, 2);
            assert!(unread_titles(&pipeline).await.is_empty());
        }

        #[tokio::test]
        async fn test_missing_webhook_does_not_stop_run() {
            let server = MockServer::start().await;
            let feed_url = serve_feed(&server).await;

            let pipeline = create_pipeline().await;
            pipeline.db().add_feed(&feed_url).await.unwrap();

            let summary = pipeline.check_all_feeds().await.unwrap();
            assert_eq!(summary.errored, 2);
            assert_eq!(unread_titles(&pipeline).await.len(), 2);
        }

        #[tokio::test]
        async fn test_paused_feed_entries_still_delivered() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/webhook"))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;

            let pipeline = create_pipeline().await;
            let feed_url = format!("{}/rss", server.uri());
            add_unread_feed(&pipeline, &feed_url, &format!("{}/webhook", server.uri())).await;
            pipeline
                .db()
                .upsert_entry(
                    &feed_url,
                    &EntryUpdate {
                        id: "stored".to_string(),
                        title: Some("Stored".to_string()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            pipeline.pause_feed(&feed_url).await.unwrap();

            let summary = pipeline.check_all_feeds().await.unwrap();
            assert_eq!(summary.delivered, 1);
        }

        #[tokio::test]
        async fn test_overlapping_check_is_skipped() {
            let pipeline = create_pipeline().await;
            *pipeline.checking.write().await = true;

            let summary = pipeline.check_all_feeds().await.unwrap();
            assert_eq!(summary, CheckSummary::default());
            assert!(pipeline.is_checking().await);
        }

        #[tokio::test]
        async fn test_check_feed_during_full_check_is_skipped() {
            let server = MockServer::start().await;
            let feed_url = serve_feed(&server).await;
            Mock::given(method("POST"))
                .and(path("/webhook"))
                .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(300)))
                .expect(2)
                .mount(&server)
                .await;

            let pipeline = create_pipeline().await;
            add_unread_feed(&pipeline, &feed_url, &format!("{}/webhook", server.uri())).await;

            let (all, one) = tokio::join!(pipeline.check_all_feeds(), pipeline.check_feed(&feed_url));
            let (all, one) = (all.unwrap(), one.unwrap());

            assert_eq!(all.delivered + one.delivered, 2);
            assert!(all == CheckSummary::default() || one == CheckSummary::default());
            assert!(!pipeline.is_checking().await);
        }

        #[tokio::test]
        async fn test_check_feed() {
            let server = MockServer::start().await;
            let feed_url = serve_feed(&server).await;
            Mock::given(method("POST"))
                .and(path("/webhook"))
                .respond_with(ResponseTemplate::new(204))
                .expect(2)
                .mount(&server)
                .await;

            let pipeline = create_pipeline().await;
            add_unread_feed(&pipeline, &feed_url, &format!("{}/webhook", server.uri())).await;

            let summary = pipeline.check_feed(&feed_url).await.unwrap();
            assert_eq!(summary.delivered, 2);
        }
    }

    mod add_feed_tests {
        use super::*;

        #[tokio::test]
        async fn test_existing_entries_marked_read() {
            let server = MockServer::start().await;
            let feed_url = serve_feed(&server).await;
            let pipeline = create_pipeline().await;
            tags::add_webhook(pipeline.db(), "general", "https://discord.test/hook")
                .await
                .unwrap();

            pipeline.add_feed(&feed_url, "general").await.unwrap();

            assert!(unread_titles(&pipeline).await.is_empty());
            assert_eq!(
                pipeline.db().get_entries(Some(&feed_url), None).await.unwrap().len(),
                2
            );
            assert_eq!(
                tags::get_webhook_url(pipeline.db(), &feed_url).await.unwrap().as_deref(),
                Some("https://discord.test/hook")
            );
        }

        #[tokio::test]
        async fn test_unknown_webhook() {
            let pipeline = create_pipeline().await;
            let err = pipeline
                .add_feed("https://example.com/rss", "nope")
                .await
                .unwrap_err();

            assert!(matches!(err, Error::WebhookNotFound(_)));
            assert!(pipeline.db().get_feeds().await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_unreachable_feed_is_not_kept() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;
            let pipeline = create_pipeline().await;
            tags::add_webhook(pipeline.db(), "general", "https://discord.test/hook")
                .await
                .unwrap();

            let err = pipeline
                .add_feed(&format!("{}/missing", server.uri()), "general")
                .await
                .unwrap_err();

            assert!(matches!(err, Error::Parse { .. }));
            assert!(pipeline.db().get_feeds().await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_duplicate_feed() {
            let server = MockServer::start().await;
            let feed_url = serve_feed(&server).await;
            let pipeline = create_pipeline().await;
            tags::add_webhook(pipeline.db(), "general", "https://discord.test/hook")
                .await
                .unwrap();

            pipeline.add_feed(&feed_url, "general").await.unwrap();
            let err = pipeline.add_feed(&feed_url, "general").await.unwrap_err();
            assert!(matches!(err, Error::FeedExists(_)));
        }
    }

    mod feed_management_tests {
        use super::*;

        #[tokio::test]
        async fn test_pause_and_unpause() {
            let pipeline = create_pipeline().await;
            let url = "https://example.com/rss";
            pipeline.db().add_feed(url).await.unwrap();

            pipeline.pause_feed(url).await.unwrap();
            assert!(!pipeline.db().get_feed(url).await.unwrap().unwrap().updates_enabled);

            pipeline.unpause_feed(url).await.unwrap();
            assert!(pipeline.db().get_feed(url).await.unwrap().unwrap().updates_enabled);
        }

        #[tokio::test]
        async fn test_remove_feed() {
            let pipeline = create_pipeline().await;
            let url = "https://example.com/rss";
            pipeline.db().add_feed(url).await.unwrap();
            tags::set_webhook_url(pipeline.db(), url, "https://discord.test/hook")
                .await
                .unwrap();

            pipeline.remove_feed(url).await.unwrap();

            assert!(pipeline.db().get_feed(url).await.unwrap().is_none());
            assert_eq!(tags::get_webhook_url(pipeline.db(), url).await.unwrap(), None);
            assert!(matches!(
                pipeline.remove_feed(url).await,
                Err(Error::FeedNotFound(_))
            ));
        }
    }

    mod sync_config_tests {
        use super::*;

        #[tokio::test]
        async fn test_applies_feed_settings() {
            let server = MockServer::start().await;
            let feed_url = serve_feed(&server).await;
            let pipeline = create_pipeline().await;

            let config = Config::from_str(&format!(
                r#"
                [[webhooks]]
                name = "general"
                url = "https://discord.test/hook"

                [[feeds]]
                url = "{feed_url}"
                webhook = "general"
                custom_message = "{{{{entry_title}}}}"
                paused = true
                title = "My Feed"

                [feeds.blacklist]
                title = "spam"
                "#
            ))
            .unwrap();

            pipeline.sync_config(&config).await.unwrap();
            // Running twice must not fail on already-registered items.
            pipeline.sync_config(&config).await.unwrap();

            let db = pipeline.db();
            let feed = db.get_feed(&feed_url).await.unwrap().unwrap();
            assert!(!feed.updates_enabled);
            assert_eq!(feed.user_title.as_deref(), Some("My Feed"));
            assert_eq!(
                tags::get_custom_message(db, &feed_url).await.unwrap(),
                "{{entry_title}}"
            );
            let rules = FilterRules::load(db, &feed_url).await.unwrap();
            assert_eq!(rules.blacklist.title, "spam");
            assert_eq!(tags::list_webhooks(db).await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn test_bad_feed_is_skipped() {
            let pipeline = create_pipeline().await;
            let config = Config::from_str(
                r#"
                [[feeds]]
                url = "https://example.com/rss"
                webhook = "missing"
                "#,
            )
            .unwrap();

            pipeline.sync_config(&config).await.unwrap();
            assert!(pipeline.db().get_feeds().await.unwrap().is_empty());
        }
    }
}
