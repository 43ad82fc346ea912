use anyhow::Result;
use tracing::{info, warn};

use feedhub_core::{config::format_duration, scheduler::Aggregator, Error};

/// Resolves on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Received shutdown signal");
}

pub async fn run(aggregator: &Aggregator) -> Result<()> {
    println!(
        "Fetching feeds every {} with {} workers. Press Ctrl+C to stop.",
        format_duration(aggregator.interval().await),
        aggregator.workers_count().await
    );

    match aggregator.run_until(shutdown_signal()).await {
        Ok(()) => {
            let status = aggregator.status().await;
            if status.dropped_dispatches > 0 {
                println!(
                    "{} feeds were skipped because the job queue was full.",
                    status.dropped_dispatches
                );
            }
            println!("Stopped.");
            Ok(())
        }
        Err(Error::AlreadyRunningElsewhere) => {
            println!("Background process is already running; use set-interval or set-workers to reconfigure it.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
