use std::collections::HashSet;

use tracing::{debug, error, warn};

use crate::feed::{DocumentSource, Feed};
use crate::storage::{ArticleRepository, Database, FeedRepository};

/// Result of one fetch cycle for a single feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Document fetched and stored; the feed's fetch time advanced
    Fetched { new_articles: u64 },
    /// Source could not be retrieved or parsed
    FetchFailed,
    /// Document fetched but the store rejected a read or write
    StoreFailed,
}

/// Fetch one feed, store the articles not seen before and mark it fetched.
///
/// `last_fetched_at` only moves when every step succeeds, so a feed whose
/// articles could not be stored stays at the head of the staleness order.
pub async fn process_feed(db: &Database, source: &dyn DocumentSource, mut feed: Feed) -> FeedOutcome {
    let document = match source.fetch(&feed.url).await {
        Ok(document) => document,
        Err(e) => {
            warn!(feed = %feed.name, "Failed to fetch feed: {}", e);
            return FeedOutcome::FetchFailed;
        }
    };

    let articles = ArticleRepository::new(db);
    let mut seen = HashSet::new();
    let mut fresh = Vec::new();

    for item in document.items {
        if !seen.insert(item.link.clone()) {
            continue;
        }
        match articles.exists(&item.link, feed.id).await {
            Ok(true) => {}
            Ok(false) => fresh.push(item.into_new_article(feed.id)),
            Err(e) => {
                error!(feed = %feed.name, "Failed to check article {}: {}", item.link, e);
                return FeedOutcome::StoreFailed;
            }
        }
    }

    let new_articles = match articles.create_batch(&fresh).await {
        Ok(inserted) => inserted,
        Err(e) => {
            error!(feed = %feed.name, "Failed to store {} articles: {}", fresh.len(), e);
            return FeedOutcome::StoreFailed;
        }
    };

    feed.mark_fetched();
    if let Err(e) = FeedRepository::new(db).update(&feed).await {
        error!(feed = %feed.name, "Failed to update fetch time: {}", e);
        return FeedOutcome::StoreFailed;
    }

    debug!(feed = %feed.name, new_articles, "Feed fetched");
    FeedOutcome::Fetched { new_articles }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::testing::{document, ScriptedSource};
    use crate::storage::catalog;

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let db = Database::new_in_memory().await.unwrap();
        let feed = catalog::add_feed(&db, "tech", "https://example.com/rss").await.unwrap();
        let source = ScriptedSource::new().with_document(
            "https://example.com/rss",
            document(&[("https://example.com/1", "One"), ("https://example.com/2", "Two")]),
        );

        let first = process_feed(&db, &source, feed.clone()).await;
        assert_eq!(first, FeedOutcome::Fetched { new_articles: 2 });

        let second = process_feed(&db, &source, feed.clone()).await;
        assert_eq!(second, FeedOutcome::Fetched { new_articles: 0 });

        let count = ArticleRepository::new(&db).count_for_feed(feed.id).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_duplicate_link_in_document_keeps_first() {
        let db = Database::new_in_memory().await.unwrap();
        let feed = catalog::add_feed(&db, "tech", "https://example.com/rss").await.unwrap();
        let source = ScriptedSource::new().with_document(
            "https://example.com/rss",
            document(&[("a", "T1"), ("a", "T1-dup"), ("b", "T2")]),
        );

        let outcome = process_feed(&db, &source, feed).await;
        assert_eq!(outcome, FeedOutcome::Fetched { new_articles: 2 });

        let stored = ArticleRepository::new(&db).list_by_feed_name("tech", 10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored.iter().find(|a| a.link == "a").unwrap().title, "T1");
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_fetch_time() {
        let db = Database::new_in_memory().await.unwrap();
        let feed = catalog::add_feed(&db, "broken", "https://example.com/broken").await.unwrap();
        let source = ScriptedSource::new();

        let outcome = process_feed(&db, &source, feed.clone()).await;
        assert_eq!(outcome, FeedOutcome::FetchFailed);

        let stored = FeedRepository::new(&db).get_by_id(feed.id).await.unwrap().unwrap();
        assert!(stored.never_fetched());
    }

    #[tokio::test]
    async fn test_empty_document_marks_fetched() {
        let db = Database::new_in_memory().await.unwrap();
        let feed = catalog::add_feed(&db, "quiet", "https://example.com/quiet").await.unwrap();
        let source = ScriptedSource::new().with_document("https://example.com/quiet", document(&[]));

        let outcome = process_feed(&db, &source, feed.clone()).await;
        assert_eq!(outcome, FeedOutcome::Fetched { new_articles: 0 });

        let stored = FeedRepository::new(&db).get_by_id(feed.id).await.unwrap().unwrap();
        assert!(stored.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_deleted_feed_is_store_failure() {
        let db = Database::new_in_memory().await.unwrap();
        let feed = catalog::add_feed(&db, "gone", "https://example.com/gone").await.unwrap();
        let source = ScriptedSource::new()
            .with_document("https://example.com/gone", document(&[("https://example.com/x", "X")]));

        catalog::delete_feed(&db, "gone").await.unwrap();

        let outcome = process_feed(&db, &source, feed).await;
        assert_eq!(outcome, FeedOutcome::StoreFailed);
    }
}
