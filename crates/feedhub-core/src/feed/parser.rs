use chrono::{DateTime, Utc};
use feed_rs::parser;

use super::models::{Document, DocumentItem};
use crate::{Error, Result};

/// Parse RSS/Atom/JSON feed content into a `Document`
///
/// Entries without a link are dropped since the link is the dedup key.
pub fn parse_document(content: &[u8]) -> Result<Document> {
    let feed = parser::parse(content)
        .map_err(|e| Error::FeedParse(e.to_string()))?;

    let title = feed.title.map(|t| t.content);

    let items = feed.entries.into_iter().filter_map(|entry| {
        let link = entry.links.first().map(|l| l.href.trim().to_string())
            .filter(|l| !l.is_empty())?;

        let title = entry.title
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let description = entry.summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .map(|d| html_to_text(&d))
            .filter(|d| !d.is_empty());

        let published_at = entry.published
            .or(entry.updated)
            .map(|dt| DateTime::<Utc>::from(dt));

        Some(DocumentItem {
            link,
            title,
            description,
            published_at,
        })
    }).collect();

    Ok(Document { title, items })
}

/// Convert HTML content to plain text
fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 80)
        .map(|text| text.trim().to_string())
        .unwrap_or_else(|_| html.to_string())
}
