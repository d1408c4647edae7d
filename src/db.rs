use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};
use tracing::warn;

use crate::error::{Error, Result};
use crate::tags::{TagScope, TagStore};

#[derive(Debug, Clone, FromRow)]
pub struct Feed {
    pub url: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub author: Option<String>,
    pub link: Option<String>,
    pub version: Option<String>,
    pub added: String,
    pub updated: Option<String>,
    pub last_updated: Option<String>,
    pub last_exception: Option<String>,
    pub updates_enabled: bool,
    pub user_title: Option<String>,
}

/// One content variant of an entry, e.g. the `text/html` body of an Atom entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub value: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub feed_url: String,
    pub id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    /// Empty when the entry carries no content.
    pub content: Vec<Content>,
    pub published: Option<String>,
    pub updated: Option<String>,
    pub added: String,
    pub read: bool,
    pub read_modified: Option<String>,
    pub important: bool,
}

#[derive(FromRow)]
struct EntryRow {
    feed_url: String,
    id: String,
    title: Option<String>,
    link: Option<String>,
    author: Option<String>,
    summary: Option<String>,
    content: String,
    published: Option<String>,
    updated: Option<String>,
    added: String,
    read: bool,
    read_modified: Option<String>,
    important: bool,
}

impl From<EntryRow> for Entry {
    fn from(row: EntryRow) -> Self {
        let content = serde_json::from_str(&row.content).unwrap_or_else(|e| {
            warn!(feed = %row.feed_url, entry = %row.id, error = %e, "unreadable entry content");
            Vec::new()
        });

        Self {
            feed_url: row.feed_url,
            id: row.id,
            title: row.title,
            link: row.link,
            author: row.author,
            summary: row.summary,
            content,
            published: row.published,
            updated: row.updated,
            added: row.added,
            read: row.read,
            read_modified: row.read_modified,
            important: row.important,
        }
    }
}

/// Feed metadata taken from a freshly parsed document.
#[derive(Debug, Clone, Default)]
pub struct FeedUpdate {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub author: Option<String>,
    pub link: Option<String>,
    pub version: Option<String>,
    pub updated: Option<String>,
}

/// Entry fields taken from a freshly parsed document.
#[derive(Debug, Clone, Default)]
pub struct EntryUpdate {
    pub id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub content: Vec<Content>,
    pub published: Option<String>,
    pub updated: Option<String>,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                url TEXT PRIMARY KEY,
                title TEXT,
                subtitle TEXT,
                author TEXT,
                link TEXT,
                version TEXT,
                added TEXT NOT NULL,
                updated TEXT,
                last_updated TEXT,
                last_exception TEXT,
                updates_enabled INTEGER NOT NULL DEFAULT 1,
                user_title TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                feed_url TEXT NOT NULL REFERENCES feeds(url),
                id TEXT NOT NULL,
                title TEXT,
                link TEXT,
                author TEXT,
                summary TEXT,
                content TEXT NOT NULL DEFAULT '[]',
                published TEXT,
                updated TEXT,
                added TEXT NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                read_modified TEXT,
                important INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY(feed_url, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_entries_read
            ON entries(read, feed_url)
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Global tags use the empty scope.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                scope TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY(scope, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Register a feed. The URL must be an absolute http(s) URL.
    pub async fn add_feed(&self, url: &str) -> Result<()> {
        match reqwest::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Err(Error::InvalidFeedUrl(url.to_string())),
        }

        if self.get_feed(url).await?.is_some() {
            return Err(Error::FeedExists(url.to_string()));
        }

        sqlx::query("INSERT INTO feeds (url, added) VALUES (?, ?)")
            .bind(url)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_feed(&self, url: &str) -> Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(feed)
    }

    pub async fn get_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>("SELECT * FROM feeds ORDER BY added, rowid")
            .fetch_all(&self.pool)
            .await?;
        Ok(feeds)
    }

    /// Delete a feed together with its entries and feed-scoped tags.
    pub async fn delete_feed(&self, url: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entries WHERE feed_url = ?")
            .bind(url)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tags WHERE scope = ?")
            .bind(TagScope::Feed(url).as_key())
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM feeds WHERE url = ?")
            .bind(url)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(Error::FeedNotFound(url.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn set_feed_updates_enabled(&self, url: &str, enabled: bool) -> Result<()> {
        let result = sqlx::query("UPDATE feeds SET updates_enabled = ? WHERE url = ?")
            .bind(enabled)
            .bind(url)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::FeedNotFound(url.to_string()));
        }
        Ok(())
    }

    pub async fn set_feed_user_title(&self, url: &str, user_title: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE feeds SET user_title = ? WHERE url = ?")
            .bind(user_title)
            .bind(url)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::FeedNotFound(url.to_string()));
        }
        Ok(())
    }

    pub async fn update_feed_metadata(&self, url: &str, update: &FeedUpdate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE feeds
            SET title = ?, subtitle = ?, author = ?, link = ?, version = ?, updated = ?
            WHERE url = ?
            "#,
        )
        .bind(&update.title)
        .bind(&update.subtitle)
        .bind(&update.author)
        .bind(&update.link)
        .bind(&update.version)
        .bind(&update.updated)
        .bind(url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record the outcome of a refresh. A successful refresh clears the last exception.
    pub async fn update_feed_fetched(&self, url: &str, error: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE feeds
            SET last_exception = ?,
                last_updated = CASE WHEN ? IS NULL THEN ? ELSE last_updated END
            WHERE url = ?
            "#,
        )
        .bind(error)
        .bind(error)
        .bind(&now)
        .bind(url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or refresh an entry. The read flag of an existing entry is left alone.
    ///
    /// Returns `true` when the entry was not stored before.
    pub async fn upsert_entry(&self, feed_url: &str, entry: &EntryUpdate) -> Result<bool> {
        let exists: (i64,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM entries WHERE feed_url = ? AND id = ?)")
                .bind(feed_url)
                .bind(&entry.id)
                .fetch_one(&self.pool)
                .await?;

        let content = serde_json::to_string(&entry.content)?;

        sqlx::query(
            r#"
            INSERT INTO entries (feed_url, id, title, link, author, summary, content, published, updated, added)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(feed_url, id) DO UPDATE SET
                title = excluded.title,
                link = excluded.link,
                author = excluded.author,
                summary = excluded.summary,
                content = excluded.content,
                published = excluded.published,
                updated = excluded.updated
            "#,
        )
        .bind(feed_url)
        .bind(&entry.id)
        .bind(&entry.title)
        .bind(&entry.link)
        .bind(&entry.author)
        .bind(&entry.summary)
        .bind(content)
        .bind(&entry.published)
        .bind(&entry.updated)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(exists.0 == 0)
    }

    /// Entries in arrival order, optionally restricted to one feed and/or a read state.
    pub async fn get_entries(&self, feed_url: Option<&str>, read: Option<bool>) -> Result<Vec<Entry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT * FROM entries
            WHERE (?1 IS NULL OR feed_url = ?1)
              AND (?2 IS NULL OR read = ?2)
            ORDER BY rowid
            "#,
        )
        .bind(feed_url)
        .bind(read)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Entry::from).collect())
    }

    pub async fn get_entry(&self, feed_url: &str, id: &str) -> Result<Option<Entry>> {
        let row = sqlx::query_as::<_, EntryRow>(
            "SELECT * FROM entries WHERE feed_url = ? AND id = ?",
        )
        .bind(feed_url)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Entry::from))
    }

    pub async fn set_entry_read(&self, entry: &Entry, read: bool) -> Result<()> {
        sqlx::query(
            "UPDATE entries SET read = ?, read_modified = ? WHERE feed_url = ? AND id = ?",
        )
        .bind(read)
        .bind(Utc::now().to_rfc3339())
        .bind(&entry.feed_url)
        .bind(&entry.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TagStore for Database {
    async fn get_tag(&self, scope: TagScope<'_>, key: &str) -> Result<Option<String>> {
        let value: Option<(String,)> =
            sqlx::query_as("SELECT value FROM tags WHERE scope = ? AND key = ?")
                .bind(scope.as_key())
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.map(|v| v.0))
    }

    async fn set_tag(&self, scope: TagScope<'_>, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tags (scope, key, value)
            VALUES (?, ?, ?)
            ON CONFLICT(scope, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(scope.as_key())
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_tag(&self, scope: TagScope<'_>, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM tags WHERE scope = ? AND key = ?")
            .bind(scope.as_key())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
