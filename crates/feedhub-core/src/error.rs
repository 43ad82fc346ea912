use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feed not found: {0}")]
    FeedNotFound(String),

    #[error("Feed already exists: {0}")]
    FeedAlreadyExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Aggregator is already running in this process")]
    AlreadyRunningLocally,

    #[error("Background process is already running")]
    AlreadyRunningElsewhere,

    #[error("Aggregator is not running")]
    NotRunning,

    #[error("Fetch lock is not held by this process")]
    LockNotHeld,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Lifecycle conditions are expected outcomes of start/stop, not failures.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Error::AlreadyRunningLocally | Error::AlreadyRunningElsewhere | Error::NotRunning
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
