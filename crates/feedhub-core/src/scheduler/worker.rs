use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::pipeline::{process_feed, FeedOutcome};
use super::signalled;
use crate::feed::{DocumentSource, Feed};
use crate::storage::Database;

pub(crate) type JobReceiver = Arc<Mutex<mpsc::Receiver<Feed>>>;

struct WorkerHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Fetch workers draining the shared job queue.
///
/// Workers are keyed by a monotonically increasing slot id. Shrinking
/// cancels the newest slots first; a cancelled worker finishes the job it
/// already dequeued before exiting.
pub(crate) struct WorkerPool {
    db: Database,
    source: Arc<dyn DocumentSource>,
    jobs: JobReceiver,
    shutdown: watch::Receiver<bool>,
    workers: BTreeMap<u64, WorkerHandle>,
    retired: Vec<JoinHandle<()>>,
    next_slot: u64,
}

impl WorkerPool {
    pub(crate) fn new(
        db: Database,
        source: Arc<dyn DocumentSource>,
        jobs: JobReceiver,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            source,
            jobs,
            shutdown,
            workers: BTreeMap::new(),
            retired: Vec::new(),
            next_slot: 0,
        }
    }

    /// Workers that still accept new jobs
    pub(crate) fn live(&self) -> usize {
        self.workers.len()
    }

    /// Grow or shrink to `target` workers without waiting on any of them
    pub(crate) fn resize(&mut self, target: usize) {
        let current = self.workers.len();
        if target > current {
            for _ in current..target {
                self.spawn();
            }
            info!("Worker pool grown from {} to {}", current, target);
        } else if target < current {
            for _ in target..current {
                let Some((slot, handle)) = self.workers.pop_last() else {
                    break;
                };
                handle.cancel.send_replace(true);
                self.retired.push(handle.task);
                debug!(slot, "Worker retired");
            }
            self.retired.retain(|task| !task.is_finished());
            info!("Worker pool shrunk from {} to {}", current, target);
        }
    }

    fn spawn(&mut self) {
        let slot = self.next_slot;
        self.next_slot += 1;

        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_worker(
            slot,
            self.db.clone(),
            self.source.clone(),
            self.jobs.clone(),
            self.shutdown.clone(),
            cancel_rx,
        ));
        self.workers.insert(slot, WorkerHandle { cancel, task });
    }

    /// Wait for every worker, retired ones included, and hand back the queue
    pub(crate) async fn join(self) -> JobReceiver {
        let tasks = self
            .workers
            .into_values()
            .map(|handle| handle.task)
            .chain(self.retired);

        for task in tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("Worker panicked: {}", e);
                }
            }
        }
        self.jobs
    }
}

async fn run_worker(
    slot: u64,
    db: Database,
    source: Arc<dyn DocumentSource>,
    jobs: JobReceiver,
    mut shutdown: watch::Receiver<bool>,
    mut cancel: watch::Receiver<bool>,
) {
    debug!(slot, "Worker started");

    loop {
        let job = tokio::select! {
            biased;

            _ = signalled(&mut shutdown) => break,
            _ = signalled(&mut cancel) => break,
            job = async { jobs.lock().await.recv().await } => job,
        };

        let Some(feed) = job else {
            break;
        };

        let name = feed.name.clone();
        match process_feed(&db, source.as_ref(), feed).await {
            FeedOutcome::Fetched { new_articles } if new_articles > 0 => {
                info!(slot, feed = %name, "{} new articles", new_articles);
            }
            outcome => debug!(slot, feed = %name, ?outcome, "Job finished"),
        }
    }

    debug!(slot, "Worker stopped");
}
