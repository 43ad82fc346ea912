use anyhow::Result;

use feedhub_core::{storage::catalog, storage::Database, Error};

pub async fn run(db: &Database, name: &str, url: &str) -> Result<()> {
    match catalog::add_feed(db, name, url).await {
        Ok(feed) => {
            println!("Added feed: {} ({})", feed.name, feed.url);
            println!("It will be fetched on the next cycle of 'feedhub fetch'.");
            Ok(())
        }
        Err(Error::FeedAlreadyExists(name)) => {
            println!("A feed named '{}' already exists.", name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
