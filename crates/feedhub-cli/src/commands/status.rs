use anyhow::Result;
use chrono::Utc;
use serde_json::json;

use feedhub_core::{
    config::format_duration,
    coordination::{CommandKind, CommandMailbox, CoordinationLock, SqliteCoordinator},
    scheduler::Aggregator,
    storage::{Database, FeedRepository},
    AppConfig,
};

pub async fn run(
    config: &AppConfig,
    db: &Database,
    aggregator: &Aggregator,
    coordinator: &SqliteCoordinator,
    as_json: bool,
) -> Result<()> {
    let scheduler = aggregator.status().await;
    let holder = coordinator.holder().await?;

    let lease_timeout = chrono::Duration::from_std(config.aggregator.lease_timeout())?;
    let stale = holder
        .as_ref()
        .is_some_and(|h| Utc::now() - h.renewed_at > lease_timeout);

    let mut pending = Vec::new();
    for kind in CommandKind::ALL {
        if let Some(value) = coordinator.get_command(kind.as_str()).await? {
            pending.push((kind, value));
        }
    }

    let feeds = FeedRepository::new(db).count().await?;

    if as_json {
        let pending: serde_json::Map<String, serde_json::Value> = pending
            .iter()
            .map(|(kind, value)| (kind.to_string(), json!(value)))
            .collect();
        let output = json!({
            "scheduler": scheduler,
            "lock_holder": holder,
            "lock_stale": stale,
            "pending_commands": pending,
            "feeds": feeds,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match &holder {
        Some(h) => {
            println!("Fetch process: running ({})", h.holder_id);
            println!("  Since: {}", h.acquired_at.format("%Y-%m-%d %H:%M:%S"));
            println!("  Last heartbeat: {}", h.renewed_at.format("%Y-%m-%d %H:%M:%S"));
            if stale {
                println!("  Lease expired; the next 'feedhub fetch' will take over.");
            }
        }
        None => println!("Fetch process: not running"),
    }

    println!("Feeds: {}", feeds);
    println!(
        "Defaults: interval {}, workers {}",
        format_duration(scheduler.interval),
        scheduler.workers
    );

    if pending.is_empty() {
        println!("Pending commands: none");
    } else {
        println!("Pending commands:");
        for (kind, value) in &pending {
            println!("  {} = {}", kind, value);
        }
    }

    Ok(())
}
