use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered feed source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `None` until the first successful fetch
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Data required to register a new feed
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub name: String,
    pub url: String,
}

/// A stored article, unique per (link, feed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub link: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new article
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub feed_id: Uuid,
    pub link: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Parsed feed document as returned by a `DocumentSource`
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub title: Option<String>,
    pub items: Vec<DocumentItem>,
}

/// A single entry of a parsed document
#[derive(Debug, Clone)]
pub struct DocumentItem {
    pub link: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Feed {
    pub fn never_fetched(&self) -> bool {
        self.last_fetched_at.is_none()
    }

    /// Record a successful fetch
    pub fn mark_fetched(&mut self) {
        let now = Utc::now();
        self.last_fetched_at = Some(now);
        self.updated_at = now;
    }
}

impl DocumentItem {
    pub fn into_new_article(self, feed_id: Uuid) -> NewArticle {
        NewArticle {
            feed_id,
            link: self.link,
            title: self.title,
            description: self.description,
            published_at: self.published_at,
        }
    }
}

impl Article {
    /// Date shown in listings: publish date, falling back to when we stored it
    pub fn display_date(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}
