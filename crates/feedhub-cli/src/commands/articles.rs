use anyhow::Result;

use feedhub_core::{storage::catalog, storage::Database, Error};

pub async fn run(db: &Database, feed_name: &str, limit: u32) -> Result<()> {
    let articles = match catalog::articles_for_feed(db, feed_name, limit).await {
        Ok(articles) => articles,
        Err(Error::FeedNotFound(name)) => {
            println!("Feed '{}' not found.", name);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if articles.is_empty() {
        println!("No articles stored for '{}' yet.", feed_name);
        return Ok(());
    }

    for article in &articles {
        println!("{}", article.title);
        println!("  {}", article.link);
        println!("  {}", article.display_date().format("%Y-%m-%d %H:%M"));
        if let Some(description) = &article.description {
            let summary: String = description.chars().take(200).collect();
            if !summary.trim().is_empty() {
                println!("  {}", summary.trim().replace('\n', " "));
            }
        }
        println!();
    }

    Ok(())
}
