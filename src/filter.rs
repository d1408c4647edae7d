//! Whitelist / blacklist rules deciding which entries get announced.

use serde::Deserialize;

use crate::db::Entry;
use crate::error::Result;
use crate::tags::{TagScope, TagStore};

pub const WHITELIST_TITLE: &str = "whitelist_title";
pub const WHITELIST_SUMMARY: &str = "whitelist_summary";
pub const WHITELIST_CONTENT: &str = "whitelist_content";
pub const BLACKLIST_TITLE: &str = "blacklist_title";
pub const BLACKLIST_SUMMARY: &str = "blacklist_summary";
pub const BLACKLIST_CONTENT: &str = "blacklist_content";

/// Substrings per entry field. An empty string means the category is not configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuleList {
    pub title: String,
    pub summary: String,
    pub content: String,
}

impl RuleList {
    pub fn is_active(&self) -> bool {
        [&self.title, &self.summary, &self.content]
            .iter()
            .any(|rule| is_configured(rule))
    }

    /// Pairs each configured category with the entry's matching fields.
    fn categories<'a>(&'a self, entry: &'a Entry) -> [(&'a str, Vec<&'a str>); 3] {
        [
            (self.title.as_str(), entry.title.as_deref().into_iter().collect()),
            (self.summary.as_str(), entry.summary.as_deref().into_iter().collect()),
            (
                self.content.as_str(),
                entry.content.iter().map(|c| c.value.as_str()).collect(),
            ),
        ]
    }
}

/// A snapshot of a feed's filter tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterRules {
    pub whitelist: RuleList,
    pub blacklist: RuleList,
}

impl FilterRules {
    pub async fn load(store: &dyn TagStore, feed_url: &str) -> Result<Self> {
        let scope = TagScope::Feed(feed_url);

        Ok(Self {
            whitelist: RuleList {
                title: tag_or_empty(store, scope, WHITELIST_TITLE).await?,
                summary: tag_or_empty(store, scope, WHITELIST_SUMMARY).await?,
                content: tag_or_empty(store, scope, WHITELIST_CONTENT).await?,
            },
            blacklist: RuleList {
                title: tag_or_empty(store, scope, BLACKLIST_TITLE).await?,
                summary: tag_or_empty(store, scope, BLACKLIST_SUMMARY).await?,
                content: tag_or_empty(store, scope, BLACKLIST_CONTENT).await?,
            },
        })
    }

    /// Store the rules. Cleared categories have their tag removed.
    pub async fn save(&self, store: &dyn TagStore, feed_url: &str) -> Result<()> {
        let scope = TagScope::Feed(feed_url);
        let pairs = [
            (WHITELIST_TITLE, &self.whitelist.title),
            (WHITELIST_SUMMARY, &self.whitelist.summary),
            (WHITELIST_CONTENT, &self.whitelist.content),
            (BLACKLIST_TITLE, &self.blacklist.title),
            (BLACKLIST_SUMMARY, &self.blacklist.summary),
            (BLACKLIST_CONTENT, &self.blacklist.content),
        ];

        for (key, value) in pairs {
            if value.trim().is_empty() {
                store.delete_tag(scope, key).await?;
            } else {
                store.set_tag(scope, key, value.trim()).await?;
            }
        }
        Ok(())
    }

    /// Passes when the whitelist is inactive, or when every configured whitelist
    /// category finds one of its words in the entry.
    pub fn is_whitelisted(&self, entry: &Entry) -> bool {
        if !self.whitelist.is_active() {
            return true;
        }

        self.whitelist
            .categories(entry)
            .iter()
            .filter(|(rule, _)| is_configured(rule))
            .all(|(rule, fields)| matches_any(rule, fields))
    }

    /// Fails as soon as any configured blacklist category matches.
    pub fn is_not_blacklisted(&self, entry: &Entry) -> bool {
        if !self.blacklist.is_active() {
            return true;
        }

        !self
            .blacklist
            .categories(entry)
            .iter()
            .filter(|(rule, _)| is_configured(rule))
            .any(|(rule, fields)| matches_any(rule, fields))
    }

    pub fn admit(&self, entry: &Entry) -> bool {
        self.is_whitelisted(entry) && self.is_not_blacklisted(entry)
    }
}

/// Split a rule into lowercase words on commas and whitespace.
pub fn split_words(rule: &str) -> Vec<String> {
    rule.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn is_configured(rule: &str) -> bool {
    !split_words(rule).is_empty()
}

async fn tag_or_empty(store: &dyn TagStore, scope: TagScope<'_>, key: &str) -> Result<String> {
    Ok(store.get_tag(scope, key).await?.unwrap_or_default())
}

fn matches_any(rule: &str, fields: &[&str]) -> bool {
    let words = split_words(rule);
    fields.iter().any(|field| {
        let field = field.to_lowercase();
        words.iter().any(|word| field.contains(word.as_str()))
    })
}
