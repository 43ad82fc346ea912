use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{CommandMailbox, CoordinationLock, LockHolder};
use crate::storage::retry::with_retry;
use crate::storage::Database;
use crate::{Error, Result};

const ACQUIRE_LOCK: &str = r#"
INSERT INTO fetch_lock (id, holder_id, acquired_at, renewed_at)
VALUES (1, ?, ?, ?)
ON CONFLICT(id) DO UPDATE
SET holder_id = excluded.holder_id,
    acquired_at = excluded.acquired_at,
    renewed_at = excluded.renewed_at
WHERE fetch_lock.renewed_at < ? OR fetch_lock.holder_id = excluded.holder_id
"#;

const UPSERT_COMMAND: &str = r#"
INSERT INTO ipc_commands (command, value, updated_at)
VALUES (?, ?, ?)
ON CONFLICT(command) DO UPDATE
SET value = excluded.value,
    updated_at = excluded.updated_at
"#;

/// Lease-based fetch lock and command mailbox backed by SQLite.
///
/// SQLite has no session-scoped advisory lock, so the lock is a single
/// row with a heartbeat timestamp. A holder that stops renewing for
/// `lease_timeout` can be displaced by the next `try_acquire`.
pub struct SqliteCoordinator {
    db: Database,
    holder_id: String,
    lease_timeout: Duration,
}

impl SqliteCoordinator {
    pub fn new(db: Database, lease_timeout: Duration) -> Self {
        Self {
            db,
            holder_id: format!("{}-{}", std::process::id(), Uuid::new_v4()),
            lease_timeout,
        }
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

#[async_trait]
impl CoordinationLock for SqliteCoordinator {
    async fn try_acquire(&self) -> Result<bool> {
        let pool = self.db.pool();
        let holder = self.holder_id.as_str();
        let now = now_millis();
        let expired_before = now - self.lease_timeout.as_millis() as i64;

        let result = with_retry("acquire_lock", move || {
            sqlx::query(ACQUIRE_LOCK)
                .bind(holder)
                .bind(now)
                .bind(now)
                .bind(expired_before)
                .execute(pool)
        })
        .await?;

        let acquired = result.rows_affected() > 0;
        if acquired {
            tracing::debug!(holder = %self.holder_id, "Fetch lock acquired");
        }
        Ok(acquired)
    }

    async fn release(&self) -> Result<()> {
        let pool = self.db.pool();
        let holder = self.holder_id.as_str();

        let result = with_retry("release_lock", move || {
            sqlx::query("DELETE FROM fetch_lock WHERE id = 1 AND holder_id = ?")
                .bind(holder)
                .execute(pool)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::LockNotHeld);
        }
        tracing::debug!(holder = %self.holder_id, "Fetch lock released");
        Ok(())
    }

    async fn keep_alive(&self) -> Result<()> {
        let pool = self.db.pool();
        let holder = self.holder_id.as_str();
        let now = now_millis();

        let result = with_retry("renew_lock", move || {
            sqlx::query("UPDATE fetch_lock SET renewed_at = ? WHERE id = 1 AND holder_id = ?")
                .bind(now)
                .bind(holder)
                .execute(pool)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::LockNotHeld);
        }
        Ok(())
    }

    fn needs_keep_alive(&self) -> bool {
        true
    }

    async fn holder(&self) -> Result<Option<LockHolder>> {
        let row: Option<(String, i64, i64)> = sqlx::query_as(
            "SELECT holder_id, acquired_at, renewed_at FROM fetch_lock WHERE id = 1",
        )
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|(holder_id, acquired_at, renewed_at)| LockHolder {
            holder_id,
            acquired_at: from_millis(acquired_at),
            renewed_at: from_millis(renewed_at),
        }))
    }
}

#[async_trait]
impl CommandMailbox for SqliteCoordinator {
    async fn set_command(&self, name: &str, value: &str) -> Result<()> {
        let pool = self.db.pool();
        let now = now_millis();

        with_retry("set_command", move || {
            sqlx::query(UPSERT_COMMAND)
                .bind(name)
                .bind(value)
                .bind(now)
                .execute(pool)
        })
        .await?;

        Ok(())
    }

    async fn get_command(&self, name: &str) -> Result<Option<String>> {
        let pool = self.db.pool();

        let value: Option<String> = with_retry("get_command", move || {
            sqlx::query_scalar("SELECT value FROM ipc_commands WHERE command = ?")
                .bind(name)
                .fetch_optional(pool)
        })
        .await?;

        Ok(value.filter(|v| !v.is_empty()))
    }

    async fn clear_command(&self, name: &str, observed: &str) -> Result<bool> {
        let pool = self.db.pool();
        let now = now_millis();

        let result = with_retry("clear_command", move || {
            sqlx::query(
                "UPDATE ipc_commands SET value = '', updated_at = ? WHERE command = ? AND value = ?",
            )
            .bind(now)
            .bind(name)
            .bind(observed)
            .execute(pool)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::CommandKind;

    const LEASE: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let db = Database::new_in_memory().await.unwrap();
        let first = SqliteCoordinator::new(db.clone(), LEASE);
        let second = SqliteCoordinator::new(db.clone(), LEASE);

        assert!(first.try_acquire().await.unwrap());
        assert!(!second.try_acquire().await.unwrap());

        let holder = second.holder().await.unwrap().unwrap();
        assert_eq!(holder.holder_id, first.holder_id());

        first.release().await.unwrap();
        assert!(second.holder().await.unwrap().is_none());
        assert!(second.try_acquire().await.unwrap());
    }

    #[tokio::test]
    async fn test_release_without_holding_fails() {
        let db = Database::new_in_memory().await.unwrap();
        let first = SqliteCoordinator::new(db.clone(), LEASE);
        let second = SqliteCoordinator::new(db, LEASE);

        assert!(matches!(first.release().await, Err(Error::LockNotHeld)));

        assert!(first.try_acquire().await.unwrap());
        assert!(matches!(second.release().await, Err(Error::LockNotHeld)));
        assert!(matches!(second.keep_alive().await, Err(Error::LockNotHeld)));

        first.keep_alive().await.unwrap();
        first.release().await.unwrap();
        assert!(matches!(first.release().await, Err(Error::LockNotHeld)));
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let db = Database::new_in_memory().await.unwrap();
        let crashed = SqliteCoordinator::new(db.clone(), Duration::from_millis(50));
        let next = SqliteCoordinator::new(db, Duration::from_millis(50));

        assert!(crashed.try_acquire().await.unwrap());
        assert!(!next.try_acquire().await.unwrap());

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(next.try_acquire().await.unwrap());
        assert!(matches!(crashed.keep_alive().await, Err(Error::LockNotHeld)));
    }

    #[tokio::test]
    async fn test_mailbox_overwrite_and_clear() {
        let db = Database::new_in_memory().await.unwrap();
        let writer = SqliteCoordinator::new(db.clone(), LEASE);
        let reader = SqliteCoordinator::new(db, LEASE);
        let key = CommandKind::SetWorkers.as_str();

        assert_eq!(reader.get_command(key).await.unwrap(), None);

        writer.set_command(key, "4").await.unwrap();
        writer.set_command(key, "6").await.unwrap();
        assert_eq!(reader.get_command(key).await.unwrap().as_deref(), Some("6"));

        assert!(reader.clear_command(key, "6").await.unwrap());
        assert_eq!(reader.get_command(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_keeps_newer_value() {
        let db = Database::new_in_memory().await.unwrap();
        let mailbox = SqliteCoordinator::new(db, LEASE);
        let key = CommandKind::SetInterval.as_str();

        mailbox.set_command(key, "2m").await.unwrap();
        let observed = mailbox.get_command(key).await.unwrap().unwrap();

        // Another invocation writes before the consumer clears
        mailbox.set_command(key, "5m").await.unwrap();

        assert!(!mailbox.clear_command(key, &observed).await.unwrap());
        assert_eq!(mailbox.get_command(key).await.unwrap().as_deref(), Some("5m"));
    }
}
