//! Placeholder substitution for custom messages and embeds.
//!
//! Tokens are resolved from a fixed, ordered table of `(token, accessor)` pairs. Each
//! accessor reads one value out of a [`RenderContext`] built once per render.

use chrono::DateTime;

use crate::db::{Entry, Feed};
use crate::markdown::{first_image, html_to_plain, Image};
use crate::tags::Embed;

/// A token's replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValue {
    Text(String),
    /// The value has no textual form; the token is left as written.
    Unrepresentable,
}

impl TokenValue {
    fn text(value: Option<&str>) -> Self {
        TokenValue::Text(value.unwrap_or_default().to_string())
    }

    fn flag(value: bool) -> Self {
        TokenValue::Text(if value { "True" } else { "False" }.to_string())
    }

    /// Stored timestamps are RFC 3339; missing ones render empty.
    fn timestamp(value: Option<&str>) -> Self {
        match value {
            None => TokenValue::Text(String::new()),
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(ts) => TokenValue::Text(ts.format("%Y-%m-%d %H:%M:%S%:z").to_string()),
                Err(_) => TokenValue::Unrepresentable,
            },
        }
    }
}

/// Values derived from a feed/entry pair for one render.
pub struct RenderContext<'a> {
    pub feed: &'a Feed,
    pub entry: &'a Entry,
    pub summary: String,
    pub content: String,
    pub image: Option<Image>,
}

impl<'a> RenderContext<'a> {
    pub fn new(feed: &'a Feed, entry: &'a Entry) -> Self {
        let summary = entry.summary.as_deref().map(html_to_plain).unwrap_or_default();
        let content = entry
            .content
            .first()
            .map(|c| html_to_plain(&c.value))
            .unwrap_or_default();

        let image = entry
            .summary
            .as_deref()
            .and_then(first_image)
            .or_else(|| entry.content.first().and_then(|c| first_image(&c.value)));

        Self {
            feed,
            entry,
            summary,
            content,
            image,
        }
    }

    /// Converted content when there is any, otherwise the converted summary.
    pub fn text(&self) -> &str {
        if self.content.is_empty() {
            &self.summary
        } else {
            &self.content
        }
    }
}

type Accessor = fn(&RenderContext) -> TokenValue;

/// Every supported token, in substitution order.
pub const TOKENS: &[(&str, Accessor)] = &[
    ("{{feed_author}}", |c: &RenderContext| TokenValue::text(c.feed.author.as_deref())),
    ("{{feed_added}}", |c: &RenderContext| TokenValue::timestamp(Some(c.feed.added.as_str()))),
    ("{{feed_last_exception}}", |c: &RenderContext| TokenValue::text(c.feed.last_exception.as_deref())),
    ("{{feed_last_updated}}", |c: &RenderContext| TokenValue::timestamp(c.feed.last_updated.as_deref())),
    ("{{feed_link}}", |c: &RenderContext| TokenValue::text(c.feed.link.as_deref())),
    ("{{feed_subtitle}}", |c: &RenderContext| TokenValue::text(c.feed.subtitle.as_deref())),
    ("{{feed_title}}", |c: &RenderContext| TokenValue::text(c.feed.title.as_deref())),
    ("{{feed_updated}}", |c: &RenderContext| TokenValue::timestamp(c.feed.updated.as_deref())),
    ("{{feed_updates_enabled}}", |c: &RenderContext| TokenValue::flag(c.feed.updates_enabled)),
    ("{{feed_url}}", |c: &RenderContext| TokenValue::text(Some(c.feed.url.as_str()))),
    ("{{feed_user_title}}", |c: &RenderContext| TokenValue::text(c.feed.user_title.as_deref())),
    ("{{feed_version}}", |c: &RenderContext| TokenValue::text(c.feed.version.as_deref())),
    ("{{entry_added}}", |c: &RenderContext| TokenValue::timestamp(Some(c.entry.added.as_str()))),
    ("{{entry_author}}", |c: &RenderContext| TokenValue::text(c.entry.author.as_deref())),
    ("{{entry_content}}", |c: &RenderContext| TokenValue::text(Some(c.content.as_str()))),
    ("{{entry_content_raw}}", |c: &RenderContext| {
        TokenValue::text(c.entry.content.first().map(|v| v.value.as_str()))
    }),
    ("{{entry_id}}", |c: &RenderContext| TokenValue::text(Some(c.entry.id.as_str()))),
    ("{{entry_important}}", |c: &RenderContext| TokenValue::flag(c.entry.important)),
    ("{{entry_link}}", |c: &RenderContext| TokenValue::text(c.entry.link.as_deref())),
    ("{{entry_published}}", |c: &RenderContext| TokenValue::timestamp(c.entry.published.as_deref())),
    ("{{entry_read}}", |c: &RenderContext| TokenValue::flag(c.entry.read)),
    ("{{entry_read_modified}}", |c: &RenderContext| TokenValue::timestamp(c.entry.read_modified.as_deref())),
    ("{{entry_summary}}", |c: &RenderContext| TokenValue::text(Some(c.summary.as_str()))),
    ("{{entry_summary_raw}}", |c: &RenderContext| TokenValue::text(c.entry.summary.as_deref())),
    ("{{entry_text}}", |c: &RenderContext| TokenValue::text(Some(c.text()))),
    ("{{entry_title}}", |c: &RenderContext| TokenValue::text(c.entry.title.as_deref())),
    ("{{entry_updated}}", |c: &RenderContext| TokenValue::timestamp(c.entry.updated.as_deref())),
    ("{{image_1}}", |c: &RenderContext| TokenValue::text(c.image.as_ref().map(|i| i.src.as_str()))),
    ("{{image_1_alt}}", |c: &RenderContext| TokenValue::text(c.image.as_ref().map(|i| i.alt.as_str()))),
];

/// Replace one token everywhere in `text`. Unrepresentable values leave `text` as is.
pub fn try_replace(text: &str, token: &str, value: &TokenValue) -> String {
    match value {
        TokenValue::Text(replacement) => text.replace(token, replacement),
        TokenValue::Unrepresentable => text.to_string(),
    }
}

fn substitute(template: &str, ctx: &RenderContext) -> String {
    let mut text = template.to_string();
    for (token, accessor) in TOKENS {
        if text.contains(token) {
            text = try_replace(&text, token, &accessor(ctx));
        }
    }
    text.replace("\\n", "\n")
}

pub fn render_message(template: &str, feed: &Feed, entry: &Entry) -> String {
    substitute(template, &RenderContext::new(feed, entry))
}

/// Render every string field of the embed. The color is kept.
pub fn render_embed(embed: &Embed, feed: &Feed, entry: &Entry) -> Embed {
    let ctx = RenderContext::new(feed, entry);
    let mut rendered = embed.clone();
    for field in rendered.text_fields_mut() {
        *field = substitute(field, &ctx);
    }
    rendered
}

/// The announcement used when a feed has no custom message or embed.
pub fn default_message(entry: &Entry) -> String {
    format!(
        ":robot: :mega: New entry: {}\n{}",
        entry.title.as_deref().unwrap_or_default(),
        entry.link.as_deref().unwrap_or_default()
    )
}
