use anyhow::Result;

use feedhub_core::storage::{catalog, Database};

pub async fn run(db: &Database, limit: u32) -> Result<()> {
    let feeds = catalog::list_feeds(db, limit).await?;

    if feeds.is_empty() {
        println!("No feeds yet.");
        println!("\nTo add a feed, run:");
        println!("  feedhub add --name <name> --url <url>");
        return Ok(());
    }

    println!("Feeds ({}):\n", feeds.len());

    for feed in &feeds {
        println!("  {}", feed.name);
        println!("    URL: {}", feed.url);
        match feed.last_fetched_at {
            Some(last) => println!("    Last fetched: {}", last.format("%Y-%m-%d %H:%M")),
            None => println!("    Last fetched: never"),
        }
        println!();
    }

    Ok(())
}
