use std::sync::OnceLock;

use scraper::{Html, Selector};
use tracing::warn;

/// Alt text used when an image has none.
pub const DEFAULT_IMAGE_ALT: &str = "Link to image";

// Wide enough that html2text never wraps a line on its own.
const TEXT_WIDTH: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub src: String,
    pub alt: String,
}

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("static selector is valid"))
}

fn img_selector() -> &'static Selector {
    static IMG: OnceLock<Selector> = OnceLock::new();
    selector(&IMG, "img")
}

fn table_selector() -> &'static Selector {
    static TABLE: OnceLock<Selector> = OnceLock::new();
    selector(&TABLE, "table")
}

/// Remove every `<table>` element from an HTML fragment. Discord can't show tables.
pub fn strip_tables(markup: &str) -> String {
    let mut fragment = Html::parse_fragment(markup);

    let tables: Vec<_> = fragment.select(table_selector()).map(|t| t.id()).collect();
    if tables.is_empty() {
        return markup.to_string();
    }

    for id in tables {
        if let Some(mut node) = fragment.tree.get_mut(id) {
            node.detach();
        }
    }

    fragment.root_element().inner_html()
}

/// Convert markup to readable plain text with tables dropped.
///
/// Conversion failures fall back to the raw markup so rendering never fails.
pub fn html_to_plain(markup: &str) -> String {
    if markup.trim().is_empty() {
        return String::new();
    }

    let cleaned = strip_tables(markup);
    match html2text::config::plain().string_from_read(cleaned.as_bytes(), TEXT_WIDTH) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!(error = %e, "html to text conversion failed");
            markup.to_string()
        }
    }
}

/// The first `<img>` with a non-empty `src`, if any.
pub fn first_image(markup: &str) -> Option<Image> {
    let fragment = Html::parse_fragment(markup);
    let img = fragment
        .select(img_selector())
        .find(|img| img.value().attr("src").is_some_and(|src| !src.trim().is_empty()))?;

    let src = img.value().attr("src").unwrap_or_default().trim().to_string();
    let alt = img
        .value()
        .attr("alt")
        .filter(|alt| !alt.is_empty())
        .unwrap_or(DEFAULT_IMAGE_ALT)
        .to_string();

    Some(Image { src, alt })
}
