//! Feed aggregation: dispatch loop, worker pool and the `Aggregator` facade.

mod pipeline;
mod service;
mod tasks;
#[cfg(test)]
mod testing;
mod worker;

pub use pipeline::{process_feed, FeedOutcome};
pub use service::{Aggregator, AggregatorSettings, SchedulerStatus};

use tokio::sync::watch;

/// Resolves once the flag is set or its sender is gone
async fn signalled(flag: &mut watch::Receiver<bool>) {
    let _ = flag.wait_for(|set| *set).await;
}
