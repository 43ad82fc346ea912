use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedhub_core::{
    coordination::SqliteCoordinator,
    feed::FeedFetcher,
    scheduler::{Aggregator, AggregatorSettings},
    storage::Database,
    AppConfig,
};

mod commands;

#[derive(Parser)]
#[command(name = "feedhub")]
#[command(author, version, about = "Feed aggregator with a runtime-reconfigurable fetch scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch feeds in the background until interrupted
    Fetch,
    /// Register a feed
    Add {
        /// Unique name of the feed
        #[arg(short, long)]
        name: String,
        /// Feed URL (RSS, Atom or JSON Feed)
        #[arg(short, long)]
        url: String,
    },
    /// List registered feeds
    List {
        /// Maximum number of feeds to show (0 shows all)
        #[arg(long, default_value_t = 0)]
        num: u32,
    },
    /// Remove a feed and its articles
    Delete {
        #[arg(short, long)]
        name: String,
    },
    /// Show the latest articles of a feed
    Articles {
        #[arg(short, long)]
        feed_name: String,
        #[arg(long, default_value_t = 3)]
        num: u32,
    },
    /// Change the fetch interval, e.g. "90s", "2m", "1h30m"
    SetInterval {
        #[arg(short, long)]
        duration: String,
    },
    /// Change the number of fetch workers
    SetWorkers {
        #[arg(short, long)]
        count: usize,
    },
    /// Register every feed listed in an OPML file
    Import {
        #[arg(short, long)]
        file: String,
    },
    /// Show the state of the fetch process
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    config.apply_env_overrides();
    config.validate()?;

    // Initialize database
    let db = Database::open(&config).await?;

    match cli.command {
        Commands::Add { name, url } => commands::add::run(&db, &name, &url).await,
        Commands::List { num } => commands::list::run(&db, num).await,
        Commands::Delete { name } => commands::delete::run(&db, &name).await,
        Commands::Articles { feed_name, num } => {
            commands::articles::run(&db, &feed_name, num).await
        }
        Commands::Import { file } => commands::import::run(&db, &file).await,
        Commands::Fetch => {
            let (aggregator, _) = build_aggregator(&config, &db)?;
            commands::fetch::run(&aggregator).await
        }
        Commands::SetInterval { duration } => {
            let (aggregator, _) = build_aggregator(&config, &db)?;
            commands::control::set_interval(&aggregator, &duration).await
        }
        Commands::SetWorkers { count } => {
            let (aggregator, _) = build_aggregator(&config, &db)?;
            commands::control::set_workers(&aggregator, count).await
        }
        Commands::Status { json } => {
            let (aggregator, coordinator) = build_aggregator(&config, &db)?;
            commands::status::run(&config, &db, &aggregator, coordinator.as_ref(), json).await
        }
    }
}

fn build_aggregator(
    config: &AppConfig,
    db: &Database,
) -> Result<(Aggregator, Arc<SqliteCoordinator>)> {
    let fetcher = Arc::new(FeedFetcher::new(&config.http)?);
    let coordinator = Arc::new(SqliteCoordinator::new(
        db.clone(),
        config.aggregator.lease_timeout(),
    ));
    let aggregator = Aggregator::new(
        db.clone(),
        fetcher,
        coordinator.clone(),
        AggregatorSettings::from_config(&config.aggregator),
    );
    Ok((aggregator, coordinator))
}
