use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::tasks::{command_listener, dispatch_loop, keep_alive_loop};
use super::worker::{JobReceiver, WorkerPool};
use crate::config::{format_duration, AggregatorConfig};
use crate::coordination::{CommandKind, CommandMailbox, CoordinationLock};
use crate::feed::{DocumentSource, Feed};
use crate::storage::Database;
use crate::{Error, Result};

/// Runtime knobs of the aggregator
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub interval: Duration,
    pub workers: usize,
    pub queue_capacity: usize,
    pub command_poll: Duration,
    pub heartbeat: Duration,
}

impl AggregatorSettings {
    pub fn from_config(config: &AggregatorConfig) -> Self {
        Self {
            interval: config.interval(),
            workers: config.workers,
            queue_capacity: config.queue_capacity,
            command_poll: config.command_poll(),
            heartbeat: config.heartbeat(),
        }
    }
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self::from_config(&AggregatorConfig::default())
    }
}

/// Snapshot returned by [`Aggregator::status`]
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    #[serde(serialize_with = "serialize_interval")]
    pub interval: Duration,
    /// Target worker count
    pub workers: usize,
    /// Workers currently accepting jobs
    pub live_workers: usize,
    /// Feeds skipped because the job queue was full
    pub dropped_dispatches: u64,
}

fn serialize_interval<S: Serializer>(interval: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(*interval))
}

struct Runtime {
    shutdown: watch::Sender<bool>,
    interval: watch::Sender<Duration>,
    jobs: mpsc::Sender<Feed>,
    pool: WorkerPool,
    loops: Vec<JoinHandle<()>>,
}

struct SchedulerState {
    interval: Duration,
    target_workers: usize,
    /// `Some` while running in this process
    runtime: Option<Runtime>,
}

/// State shared between the facade and its background tasks
pub(crate) struct Shared {
    pub(crate) db: Database,
    source: Arc<dyn DocumentSource>,
    lock: Arc<dyn CoordinationLock>,
    pub(crate) mailbox: Arc<dyn CommandMailbox>,
    pub(crate) settings: AggregatorSettings,
    pub(crate) dropped_dispatches: AtomicU64,
    state: RwLock<SchedulerState>,
    /// Held for the whole of `start` and `stop`, lock release included
    lifecycle: Mutex<()>,
}

impl Shared {
    pub(crate) async fn target_workers(&self) -> usize {
        self.state.read().await.target_workers
    }

    /// Change the dispatch interval of the running instance.
    /// Returns false when nothing runs in this process.
    pub(crate) async fn apply_interval(&self, period: Duration) -> bool {
        let mut state = self.state.write().await;
        let state = &mut *state;
        let Some(runtime) = state.runtime.as_ref() else {
            return false;
        };
        if state.interval != period {
            state.interval = period;
            runtime.interval.send_replace(period);
        }
        true
    }

    /// Resize the worker pool of the running instance.
    /// Returns false when nothing runs in this process.
    pub(crate) async fn apply_resize(&self, count: usize) -> bool {
        let mut state = self.state.write().await;
        let state = &mut *state;
        let Some(runtime) = state.runtime.as_mut() else {
            return false;
        };
        if state.target_workers != count {
            state.target_workers = count;
            runtime.pool.resize(count);
        }
        true
    }
}

/// Periodic feed aggregation with a resizable worker pool.
///
/// At most one process runs the aggregator against a data store at a time,
/// enforced through the coordination lock. Reconfiguration requests made
/// while this instance is not running go to the command mailbox, where the
/// running process picks them up.
#[derive(Clone)]
pub struct Aggregator {
    shared: Arc<Shared>,
}

impl Aggregator {
    pub fn new<C>(
        db: Database,
        source: Arc<dyn DocumentSource>,
        coordinator: Arc<C>,
        settings: AggregatorSettings,
    ) -> Self
    where
        C: CoordinationLock + CommandMailbox + 'static,
    {
        let state = SchedulerState {
            interval: settings.interval,
            target_workers: settings.workers,
            runtime: None,
        };

        Self {
            shared: Arc::new(Shared {
                db,
                source,
                lock: coordinator.clone(),
                mailbox: coordinator,
                settings,
                dropped_dispatches: AtomicU64::new(0),
                state: RwLock::new(state),
                lifecycle: Mutex::new(()),
            }),
        }
    }

    /// Take the fetch lock and spawn the dispatch loop, command listener,
    /// keep-alive loop and workers.
    pub async fn start(&self) -> Result<()> {
        let shared = &self.shared;
        let _lifecycle = shared.lifecycle.lock().await;
        if self.is_running().await {
            return Err(Error::AlreadyRunningLocally);
        }
        if !shared.lock.try_acquire().await? {
            return Err(Error::AlreadyRunningElsewhere);
        }

        let mut state = shared.state.write().await;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (interval, interval_rx) = watch::channel(state.interval);
        let (jobs, jobs_rx) = mpsc::channel(shared.settings.queue_capacity);

        let mut pool = WorkerPool::new(
            shared.db.clone(),
            shared.source.clone(),
            Arc::new(Mutex::new(jobs_rx)),
            shutdown_rx.clone(),
        );
        pool.resize(state.target_workers);

        let mut loops = vec![
            tokio::spawn(dispatch_loop(
                shared.clone(),
                jobs.clone(),
                interval_rx,
                shutdown_rx.clone(),
            )),
            tokio::spawn(command_listener(shared.clone(), shutdown_rx.clone())),
        ];
        if shared.lock.needs_keep_alive() {
            loops.push(tokio::spawn(keep_alive_loop(
                shared.lock.clone(),
                shared.settings.heartbeat,
                shutdown_rx,
            )));
        }

        info!(
            "Aggregator started: interval={}, workers={}",
            format_duration(state.interval),
            state.target_workers
        );

        state.runtime = Some(Runtime {
            shutdown,
            interval,
            jobs,
            pool,
            loops,
        });
        Ok(())
    }

    /// Stop all tasks, release the fetch lock and discard queued jobs.
    ///
    /// Jobs already picked up by a worker run to completion first.
    pub async fn stop(&self) -> Result<()> {
        let _lifecycle = self.shared.lifecycle.lock().await;
        let runtime = self
            .shared
            .state
            .write()
            .await
            .runtime
            .take()
            .ok_or(Error::NotRunning)?;

        info!("Stopping aggregator");
        let Runtime {
            shutdown,
            interval: _,
            jobs,
            pool,
            loops,
        } = runtime;

        shutdown.send_replace(true);
        for task in loops {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("Background task panicked: {}", e);
                }
            }
        }
        let queue = pool.join().await;
        drop(jobs);

        if let Err(e) = self.shared.lock.release().await {
            warn!("Failed to release fetch lock: {}", e);
        }

        let pending = drain(queue).await;
        if pending > 0 {
            info!("{} queued feeds were not fetched", pending);
        }

        info!("Aggregator stopped");
        Ok(())
    }

    /// Start, wait for `shutdown` to resolve, then stop
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }

    /// Change the dispatch interval, here or in the process that is running
    pub async fn set_interval(&self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(Error::InvalidArgument("interval must be greater than zero".into()));
        }
        if self.shared.apply_interval(period).await {
            return Ok(());
        }

        self.shared
            .mailbox
            .set_command(CommandKind::SetInterval.as_str(), &format_duration(period))
            .await?;
        info!("Requested fetch interval {}", format_duration(period));
        Ok(())
    }

    /// Change the worker count, here or in the process that is running
    pub async fn resize(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(Error::InvalidArgument("worker count must be greater than zero".into()));
        }
        if self.shared.apply_resize(count).await {
            return Ok(());
        }

        self.shared
            .mailbox
            .set_command(CommandKind::SetWorkers.as_str(), &count.to_string())
            .await?;
        info!("Requested {} workers", count);
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.shared.state.read().await.runtime.is_some()
    }

    pub async fn interval(&self) -> Duration {
        self.shared.state.read().await.interval
    }

    pub async fn workers_count(&self) -> usize {
        self.shared.state.read().await.target_workers
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.shared.state.read().await;
        SchedulerStatus {
            running: state.runtime.is_some(),
            interval: state.interval,
            workers: state.target_workers,
            live_workers: state.runtime.as_ref().map_or(0, |runtime| runtime.pool.live()),
            dropped_dispatches: self.shared.dropped_dispatches.load(Ordering::Relaxed),
        }
    }
}

/// Close the queue and count the jobs nobody picked up
async fn drain(queue: JobReceiver) -> usize {
    let mut jobs = queue.lock().await;
    jobs.close();

    let mut pending = 0;
    while jobs.try_recv().is_ok() {
        pending += 1;
    }
    pending
}
