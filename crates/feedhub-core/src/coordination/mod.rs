//! Cross-process coordination over the shared database.
//!
//! Two pieces live here: the fetch lock, which makes sure only one process
//! runs the aggregator against a data store, and the command mailbox, which
//! lets short-lived invocations leave reconfiguration requests for the
//! running process to pick up.

mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::Result;

pub use sqlite::SqliteCoordinator;

/// Mutual exclusion between aggregator processes
#[async_trait]
pub trait CoordinationLock: Send + Sync {
    /// Non-blocking. `Ok(false)` means another live process holds the lock.
    async fn try_acquire(&self) -> Result<bool>;

    /// Fails with `Error::LockNotHeld` if this instance does not hold it.
    async fn release(&self) -> Result<()>;

    /// Renew the lease. `Error::LockNotHeld` means it was lost.
    async fn keep_alive(&self) -> Result<()>;

    /// Whether `keep_alive` has to be called periodically
    fn needs_keep_alive(&self) -> bool;

    /// Current holder, for diagnostics
    async fn holder(&self) -> Result<Option<LockHolder>>;
}

/// Overwrite-on-write command slots, one per command name
#[async_trait]
pub trait CommandMailbox: Send + Sync {
    async fn set_command(&self, name: &str, value: &str) -> Result<()>;

    /// `None` when nothing is pending (missing or empty slot)
    async fn get_command(&self, name: &str) -> Result<Option<String>>;

    /// Clear the slot only if it still holds `observed`.
    ///
    /// Returns false when a newer value was written in between; that value
    /// stays pending for the next poll.
    async fn clear_command(&self, name: &str, observed: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Serialize)]
pub struct LockHolder {
    pub holder_id: String,
    pub acquired_at: DateTime<Utc>,
    pub renewed_at: DateTime<Utc>,
}

/// Reconfiguration commands carried by the mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    SetInterval,
    SetWorkers,
}

impl CommandKind {
    pub const ALL: [CommandKind; 2] = [CommandKind::SetInterval, CommandKind::SetWorkers];

    /// Mailbox key
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::SetInterval => "set_interval",
            CommandKind::SetWorkers => "set_workers",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
