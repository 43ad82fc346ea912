use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::database::is_unique_violation;
use super::Database;
use crate::feed::{Feed, NewFeed};
use crate::{Error, Result};

const FEED_COLUMNS: &str = "id, name, url, last_fetched_at, created_at, updated_at";

/// Repository for feed CRUD operations
pub struct FeedRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct FeedRow {
    id: String,
    name: String,
    url: String,
    last_fetched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            name: row.name,
            url: row.url,
            last_fetched_at: row.last_fetched_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl<'a> FeedRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Register a new feed. Names are unique.
    pub async fn create(&self, new_feed: &NewFeed) -> Result<Feed> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO feeds (id, name, url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&new_feed.name)
        .bind(&new_feed.url)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::FeedAlreadyExists(new_feed.name.clone())
            } else {
                Error::Database(e)
            }
        })?;

        self.get_by_id(id).await?.ok_or_else(|| {
            Error::FeedNotFound(id.to_string())
        })
    }

    /// Find a feed by its unique name
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Feed>> {
        let query = format!("SELECT {} FROM feeds WHERE name = ?", FEED_COLUMNS);
        let row: Option<FeedRow> = sqlx::query_as(&query)
            .bind(name)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(Feed::from))
    }

    /// Find a feed by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Feed>> {
        let query = format!("SELECT {} FROM feeds WHERE id = ?", FEED_COLUMNS);
        let row: Option<FeedRow> = sqlx::query_as(&query)
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(Feed::from))
    }

    /// Most recently added feeds first
    pub async fn list(&self, limit: u32) -> Result<Vec<Feed>> {
        let query = format!(
            "SELECT {} FROM feeds ORDER BY created_at DESC, name ASC LIMIT ?",
            FEED_COLUMNS
        );
        let rows: Vec<FeedRow> = sqlx::query_as(&query)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    pub async fn list_all(&self) -> Result<Vec<Feed>> {
        let query = format!(
            "SELECT {} FROM feeds ORDER BY created_at DESC, name ASC",
            FEED_COLUMNS
        );
        let rows: Vec<FeedRow> = sqlx::query_as(&query)
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Delete a feed by name; its articles go with it
    pub async fn delete(&self, name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM feeds WHERE name = ?")
            .bind(name)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::FeedNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Persist fetch bookkeeping (`updated_at`, `last_fetched_at`)
    pub async fn update(&self, feed: &Feed) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET updated_at = ?, last_fetched_at = ?
            WHERE id = ?
            "#,
        )
        .bind(feed.updated_at)
        .bind(feed.last_fetched_at)
        .bind(feed.id.to_string())
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::FeedNotFound(feed.name.clone()));
        }
        Ok(())
    }

    /// Feeds ordered by staleness: never fetched first, then oldest fetch
    pub async fn get_most_stale(&self, limit: u32) -> Result<Vec<Feed>> {
        let query = format!(
            r#"
            SELECT {} FROM feeds
            ORDER BY last_fetched_at IS NOT NULL, last_fetched_at ASC, created_at ASC
            LIMIT ?
            "#,
            FEED_COLUMNS
        );
        let rows: Vec<FeedRow> = sqlx::query_as(&query)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Get total feed count
    pub async fn count(&self) -> Result<u32> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds")
            .fetch_one(self.db.pool())
            .await?;

        Ok(u32::try_from(count.0).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_feed(name: &str) -> NewFeed {
        NewFeed {
            name: name.to_string(),
            url: format!("https://example.com/{}.xml", name),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = FeedRepository::new(&db);

        let feed = repo.create(&new_feed("alpha")).await.unwrap();
        assert!(feed.never_fetched());

        let by_name = repo.get_by_name("alpha").await.unwrap().unwrap();
        assert_eq!(by_name.id, feed.id);
        let by_id = repo.get_by_id(feed.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "alpha");

        assert!(repo.get_by_name("missing").await.unwrap().is_none());
        assert!(repo.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = FeedRepository::new(&db);

        repo.create(&new_feed("alpha")).await.unwrap();
        let err = repo.create(&new_feed("alpha")).await.unwrap_err();
        assert!(matches!(err, Error::FeedAlreadyExists(name) if name == "alpha"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = FeedRepository::new(&db);

        repo.create(&new_feed("alpha")).await.unwrap();
        repo.delete("alpha").await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);

        let err = repo.delete("alpha").await.unwrap_err();
        assert!(matches!(err, Error::FeedNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_with_limit() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = FeedRepository::new(&db);

        for name in ["a", "b", "c"] {
            repo.create(&new_feed(name)).await.unwrap();
        }
        assert_eq!(repo.count().await.unwrap(), 3);

        assert_eq!(repo.list(2).await.unwrap().len(), 2);
        assert_eq!(repo.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_most_stale_ordering() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = FeedRepository::new(&db);
        let now = Utc::now();

        let mut recent = repo.create(&new_feed("recent")).await.unwrap();
        let mut old = repo.create(&new_feed("old")).await.unwrap();
        let never = repo.create(&new_feed("never")).await.unwrap();
        let mut middle = repo.create(&new_feed("middle")).await.unwrap();

        recent.last_fetched_at = Some(now - Duration::minutes(1));
        old.last_fetched_at = Some(now - Duration::hours(5));
        middle.last_fetched_at = Some(now - Duration::hours(1));
        for feed in [&recent, &old, &middle] {
            repo.update(feed).await.unwrap();
        }

        let stale: Vec<String> = repo
            .get_most_stale(10)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(stale, vec!["never", "old", "middle", "recent"]);

        // A limit never drops a staler feed in favour of a fresher one
        let top_two = repo.get_most_stale(2).await.unwrap();
        assert_eq!(top_two[0].id, never.id);
        assert_eq!(top_two[1].id, old.id);
    }
}
