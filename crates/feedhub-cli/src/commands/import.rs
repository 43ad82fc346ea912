use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;

use feedhub_core::{
    feed::parse_opml_file,
    storage::{catalog, Database},
    Error,
};

pub async fn run(db: &Database, file_path: &str) -> Result<()> {
    let path = Path::new(file_path);

    if !path.exists() {
        println!("File not found: {}", file_path);
        return Ok(());
    }

    let feeds = parse_opml_file(path)?;
    println!("Found {} feeds in OPML file\n", feeds.len());

    if feeds.is_empty() {
        return Ok(());
    }

    let mut imported = 0u32;
    let mut skipped = 0u32;
    let mut failed = 0u32;
    let total = feeds.len();

    for (i, feed) in feeds.iter().enumerate() {
        // Truncate name for display if too long
        let display_name = if feed.name.chars().count() > 40 {
            format!("{}...", feed.name.chars().take(37).collect::<String>())
        } else {
            feed.name.clone()
        };

        print!("[{}/{}] {} ... ", i + 1, total, display_name);
        io::stdout().flush().ok();

        match catalog::add_feed(db, &feed.name, &feed.url).await {
            Ok(_) => {
                println!("OK");
                imported += 1;
            }
            Err(Error::FeedAlreadyExists(_)) => {
                println!("already exists");
                skipped += 1;
            }
            Err(e) => {
                println!("failed: {}", e);
                failed += 1;
            }
        }
    }

    println!("\nImport complete:");
    println!("  Imported: {}", imported);
    println!("  Skipped (already exists): {}", skipped);
    println!("  Failed: {}", failed);

    Ok(())
}
