//! Validated feed and article operations used by the command surface.

use url::Url;

use super::{ArticleRepository, Database, FeedRepository};
use crate::feed::{Article, Feed, NewFeed};
use crate::{Error, Result};

/// Default number of articles shown per feed
pub const DEFAULT_ARTICLE_LIMIT: u32 = 3;

/// Register a feed after validating its name and URL
pub async fn add_feed(db: &Database, name: &str, url: &str) -> Result<Feed> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidArgument("feed name cannot be empty".into()));
    }
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::InvalidArgument("feed url cannot be empty".into()));
    }
    let parsed = Url::parse(url)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidArgument(format!(
            "unsupported url scheme: {}",
            parsed.scheme()
        )));
    }

    FeedRepository::new(db)
        .create(&NewFeed {
            name: name.to_string(),
            url: parsed.to_string(),
        })
        .await
}

/// List feeds; a limit of zero lists everything
pub async fn list_feeds(db: &Database, limit: u32) -> Result<Vec<Feed>> {
    let repo = FeedRepository::new(db);
    if limit > 0 {
        repo.list(limit).await
    } else {
        repo.list_all().await
    }
}

pub async fn delete_feed(db: &Database, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidArgument("feed name cannot be empty".into()));
    }
    FeedRepository::new(db).delete(name).await
}

/// Latest articles of a feed. A zero limit falls back to the default.
pub async fn articles_for_feed(db: &Database, feed_name: &str, limit: u32) -> Result<Vec<Article>> {
    let feed_name = feed_name.trim();
    if feed_name.is_empty() {
        return Err(Error::InvalidArgument("feed name cannot be empty".into()));
    }
    if FeedRepository::new(db).get_by_name(feed_name).await?.is_none() {
        return Err(Error::FeedNotFound(feed_name.to_string()));
    }

    let limit = if limit == 0 { DEFAULT_ARTICLE_LIMIT } else { limit };
    ArticleRepository::new(db).list_by_feed_name(feed_name, limit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::NewArticle;

    #[tokio::test]
    async fn test_add_feed_validation() {
        let db = Database::new_in_memory().await.unwrap();

        assert!(matches!(add_feed(&db, "  ", "https://a.com/rss").await, Err(Error::InvalidArgument(_))));
        assert!(matches!(add_feed(&db, "a", "").await, Err(Error::InvalidArgument(_))));
        assert!(matches!(add_feed(&db, "a", "not a url").await, Err(Error::UrlParse(_))));
        assert!(matches!(add_feed(&db, "a", "ftp://a.com/rss").await, Err(Error::InvalidArgument(_))));

        let feed = add_feed(&db, " tech-crunch ", "https://techcrunch.com/feed/").await.unwrap();
        assert_eq!(feed.name, "tech-crunch");
    }

    #[tokio::test]
    async fn test_articles_default_limit() {
        let db = Database::new_in_memory().await.unwrap();
        let feed = add_feed(&db, "tech", "https://example.com/rss").await.unwrap();

        let batch: Vec<NewArticle> = (0..5)
            .map(|i| NewArticle {
                feed_id: feed.id,
                link: format!("https://example.com/{}", i),
                title: format!("Post {}", i),
                description: None,
                published_at: None,
            })
            .collect();
        ArticleRepository::new(&db).create_batch(&batch).await.unwrap();

        assert_eq!(articles_for_feed(&db, "tech", 0).await.unwrap().len(), 3);
        assert_eq!(articles_for_feed(&db, "tech", 10).await.unwrap().len(), 5);
        assert!(matches!(
            articles_for_feed(&db, "missing", 3).await,
            Err(Error::FeedNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_feeds_zero_means_all() {
        let db = Database::new_in_memory().await.unwrap();
        for name in ["a", "b", "c"] {
            add_feed(&db, name, "https://example.com/rss").await.unwrap();
        }

        assert_eq!(list_feeds(&db, 0).await.unwrap().len(), 3);
        assert_eq!(list_feeds(&db, 1).await.unwrap().len(), 1);
        delete_feed(&db, "b").await.unwrap();
        assert_eq!(list_feeds(&db, 0).await.unwrap().len(), 2);
    }
}
