mod article_repo;
pub mod catalog;
mod database;
mod feed_repo;
pub mod retry;

pub use article_repo::ArticleRepository;
pub use database::Database;
pub use feed_repo::FeedRepository;
