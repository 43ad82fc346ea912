mod fetcher;
mod models;
mod opml;
mod parser;

pub use fetcher::{DocumentSource, FeedFetcher};
pub use models::{Article, Document, DocumentItem, Feed, NewArticle, NewFeed};
pub use opml::{parse_opml, parse_opml_file};
pub use parser::parse_document;
