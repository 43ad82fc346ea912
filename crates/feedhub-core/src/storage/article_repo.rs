use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::Database;
use crate::feed::{Article, NewArticle};
use crate::Result;

/// Repository for article operations
pub struct ArticleRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct ArticleRow {
    id: String,
    feed_id: String,
    link: String,
    title: String,
    description: Option<String>,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Article {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            feed_id: Uuid::parse_str(&row.feed_id).unwrap_or_default(),
            link: row.link,
            title: row.title,
            description: row.description,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const INSERT_ARTICLE: &str = r#"
INSERT OR IGNORE INTO articles
(id, feed_id, link, title, description, published_at, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

impl<'a> ArticleRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Whether an article with this link is already stored for the feed
    pub async fn exists(&self, link: &str, feed_id: Uuid) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM articles WHERE link = ? AND feed_id = ?)",
        )
        .bind(link)
        .bind(feed_id.to_string())
        .fetch_one(self.db.pool())
        .await?;

        Ok(exists)
    }

    /// Insert a single article. Returns false if (link, feed) already existed.
    pub async fn create(&self, new_article: &NewArticle) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(INSERT_ARTICLE)
            .bind(Uuid::new_v4().to_string())
            .bind(new_article.feed_id.to_string())
            .bind(&new_article.link)
            .bind(&new_article.title)
            .bind(&new_article.description)
            .bind(new_article.published_at)
            .bind(now)
            .bind(now)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Insert a batch in one transaction.
    ///
    /// Either every row is written or none is. Conflicts on (link, feed_id)
    /// are skipped silently, so the first write of a link wins. Returns the
    /// number of rows actually inserted.
    pub async fn create_batch(&self, articles: &[NewArticle]) -> Result<u64> {
        if articles.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut tx = self.db.pool().begin().await?;
        let mut inserted = 0;

        for article in articles {
            let result = sqlx::query(INSERT_ARTICLE)
                .bind(Uuid::new_v4().to_string())
                .bind(article.feed_id.to_string())
                .bind(&article.link)
                .bind(&article.title)
                .bind(&article.description)
                .bind(article.published_at)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Latest articles of a feed, newest first
    pub async fn list_by_feed_name(&self, feed_name: &str, limit: u32) -> Result<Vec<Article>> {
        let rows: Vec<ArticleRow> = sqlx::query_as(
            r#"
            SELECT a.id, a.feed_id, a.link, a.title, a.description,
                   a.published_at, a.created_at, a.updated_at
            FROM articles a
            INNER JOIN feeds f ON a.feed_id = f.id
            WHERE f.name = ?
            ORDER BY COALESCE(a.published_at, a.created_at) DESC
            LIMIT ?
            "#,
        )
        .bind(feed_name)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    /// Count stored articles for a feed
    pub async fn count_for_feed(&self, feed_id: Uuid) -> Result<u32> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles WHERE feed_id = ?")
            .bind(feed_id.to_string())
            .fetch_one(self.db.pool())
            .await?;

        Ok(u32::try_from(count.0).unwrap_or(u32::MAX))
    }
}
