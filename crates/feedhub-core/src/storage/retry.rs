//! Retry for SQLite statements that race with another process.
//!
//! The fetch process and short-lived CLI invocations share one database
//! file. The busy timeout covers most contention; this handles the
//! remaining SQLITE_BUSY/LOCKED results (e.g. WAL snapshot conflicts)
//! on the coordination and mailbox statements.

use std::future::Future;
use std::time::Duration;

/// Maximum number of retry attempts for database operations
pub const MAX_RETRIES: u32 = 4;

/// Check if a SQLite error is transient and should be retried
///
/// - SQLITE_BUSY (5) and SQLITE_BUSY_SNAPSHOT (517)
/// - SQLITE_LOCKED (6)
/// - SQLITE_IOERR (10) and SQLITE_IOERR_LOCK (3850)
pub fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string());
            matches!(
                code.as_deref(),
                Some("5") | Some("517") | Some("6") | Some("10") | Some("3850")
            )
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

/// Exponential backoff: 100ms, 200ms, 400ms, 800ms
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(100 * 2u64.pow(attempt.saturating_sub(1)))
}

/// Run a database operation, retrying transient errors with backoff
pub async fn with_retry<F, Fut, T>(label: &str, operation: F) -> std::result::Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if is_transient_error(&e) && attempts < MAX_RETRIES => {
                attempts += 1;
                let delay = backoff_delay(attempts);
                tracing::debug!(
                    error = %e,
                    operation = label,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Database busy, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(1), Duration::from_millis(100));
        assert_eq!(backoff_delay(2), Duration::from_millis(200));
        assert_eq!(backoff_delay(4), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_retries_pool_timeout_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry("test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(sqlx::Error::PoolTimedOut)
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: std::result::Result<(), _> = with_retry("test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(sqlx::Error::RowNotFound)
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
