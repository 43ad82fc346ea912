use anyhow::Result;

use feedhub_core::{storage::catalog, storage::Database, Error};

pub async fn run(db: &Database, name: &str) -> Result<()> {
    match catalog::delete_feed(db, name).await {
        Ok(()) => println!("Deleted feed: {}", name),
        Err(Error::FeedNotFound(_)) => {
            println!("Feed '{}' not found.", name);

            let feeds = catalog::list_feeds(db, 0).await?;
            if !feeds.is_empty() {
                println!("\nAvailable feeds:");
                for feed in &feeds {
                    println!("  - {}", feed.name);
                }
            }
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
