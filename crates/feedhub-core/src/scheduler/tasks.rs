use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::service::Shared;
use super::signalled;
use crate::config::{format_duration, parse_duration};
use crate::coordination::{CommandKind, CoordinationLock};
use crate::feed::Feed;
use crate::storage::FeedRepository;
use crate::Error;

fn ticker(first_tick: Instant, period: Duration) -> Interval {
    let mut interval = time::interval_at(first_tick, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Periodically queue the most stale feeds for the worker pool.
///
/// Ticks once right away. An interval change restarts the schedule one new
/// period from now.
pub(crate) async fn dispatch_loop(
    shared: Arc<Shared>,
    jobs: mpsc::Sender<Feed>,
    mut interval_rx: watch::Receiver<Duration>,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = *interval_rx.borrow_and_update();
    let mut interval = ticker(Instant::now(), period);

    loop {
        tokio::select! {
            biased;

            _ = signalled(&mut shutdown) => break,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let period = *interval_rx.borrow_and_update();
                interval = ticker(Instant::now() + period, period);
                info!("Fetch interval changed to {}", format_duration(period));
            }
            _ = interval.tick() => {
                if !dispatch_once(&shared, &jobs).await {
                    break;
                }
            }
        }
    }

    debug!("Dispatch loop stopped");
}

/// Queue up to twice the worker count of stale feeds. Returns false once
/// the queue is closed.
async fn dispatch_once(shared: &Shared, jobs: &mpsc::Sender<Feed>) -> bool {
    let workers = shared.target_workers().await;
    let limit = u32::try_from(workers.saturating_mul(2)).unwrap_or(u32::MAX);

    let feeds = match FeedRepository::new(&shared.db).get_most_stale(limit).await {
        Ok(feeds) => feeds,
        Err(e) => {
            warn!("Failed to load feeds for dispatch: {}", e);
            return true;
        }
    };

    debug!("Dispatching {} feeds", feeds.len());
    for feed in feeds {
        match jobs.try_send(feed) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(feed)) => {
                shared.dropped_dispatches.fetch_add(1, Ordering::Relaxed);
                warn!(feed = %feed.name, "Job queue full, skipping feed this cycle");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
        }
    }
    true
}

/// Apply reconfiguration commands left in the mailbox by other invocations
pub(crate) async fn command_listener(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let period = shared.settings.command_poll;
    let mut interval = ticker(Instant::now() + period, period);

    loop {
        tokio::select! {
            biased;

            _ = signalled(&mut shutdown) => break,
            _ = interval.tick() => poll_commands(&shared).await,
        }
    }

    debug!("Command listener stopped");
}

async fn poll_commands(shared: &Shared) {
    for kind in CommandKind::ALL {
        let value = match shared.mailbox.get_command(kind.as_str()).await {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(e) => {
                warn!("Failed to read {} command: {}", kind, e);
                continue;
            }
        };

        let applied = match kind {
            CommandKind::SetInterval => match parse_duration(&value) {
                Ok(period) if !period.is_zero() => shared.apply_interval(period).await,
                _ => {
                    warn!("Discarding invalid {} command: {:?}", kind, value);
                    true
                }
            },
            CommandKind::SetWorkers => match value.trim().parse::<usize>() {
                Ok(count) if count > 0 => shared.apply_resize(count).await,
                _ => {
                    warn!("Discarding invalid {} command: {:?}", kind, value);
                    true
                }
            },
        };

        // Stopped between the read and the apply; leave it for the next run
        if !applied {
            continue;
        }

        match shared.mailbox.clear_command(kind.as_str(), &value).await {
            Ok(true) => debug!("Consumed {} command {:?}", kind, value),
            Ok(false) => debug!("Newer {} command arrived, keeping it pending", kind),
            Err(e) => warn!("Failed to clear {} command: {}", kind, e),
        }
    }
}

/// Renew the fetch lock lease until shutdown
pub(crate) async fn keep_alive_loop(
    lock: Arc<dyn CoordinationLock>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = ticker(Instant::now() + period, period);

    loop {
        tokio::select! {
            biased;

            _ = signalled(&mut shutdown) => break,
            _ = interval.tick() => match lock.keep_alive().await {
                Ok(()) => debug!("Fetch lock renewed"),
                Err(Error::LockNotHeld) => {
                    error!("Fetch lock lease was lost; another process may take over");
                }
                Err(e) => warn!("Failed to renew fetch lock: {}", e),
            },
        }
    }

    debug!("Keep-alive loop stopped");
}
