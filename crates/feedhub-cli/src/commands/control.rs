use anyhow::Result;

use feedhub_core::{config::parse_duration, scheduler::Aggregator};

pub async fn set_interval(aggregator: &Aggregator, input: &str) -> Result<()> {
    let period = parse_duration(input)?;
    aggregator.set_interval(period).await?;
    println!("Fetch interval set to {}.", input.trim());
    println!("A running 'feedhub fetch' process applies it within a few seconds.");
    Ok(())
}

pub async fn set_workers(aggregator: &Aggregator, count: usize) -> Result<()> {
    aggregator.resize(count).await?;
    println!("Worker count set to {}.", count);
    println!("A running 'feedhub fetch' process applies it within a few seconds.");
    Ok(())
}
