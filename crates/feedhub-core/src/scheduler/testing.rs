//! Test doubles shared by the scheduler tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::feed::{Document, DocumentItem, DocumentSource};
use crate::{Error, Result};

/// Serves canned documents by URL. Unknown URLs fail.
///
/// A gated source blocks every fetch until the test hands out permits, which
/// keeps jobs in flight for as long as a test needs.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    documents: HashMap<String, Document>,
    gate: Option<Arc<Semaphore>>,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub(crate) fn with_document(mut self, url: &str, document: Document) -> Self {
        self.documents.insert(url.to_string(), document);
        self
    }

    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for ScriptedSource {
    async fn fetch(&self, url: &str) -> Result<Document> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| Error::Other("gate closed".into()))?;
        }
        let result = self
            .documents
            .get(url)
            .cloned()
            .ok_or_else(|| Error::FeedParse(format!("no document for {}", url)));
        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}

pub(crate) fn document(items: &[(&str, &str)]) -> Document {
    Document {
        title: Some("Scripted".to_string()),
        items: items
            .iter()
            .map(|(link, title)| DocumentItem {
                link: link.to_string(),
                title: title.to_string(),
                description: None,
                published_at: None,
            })
            .collect(),
    }
}

/// Poll `check` until it holds or five seconds pass
pub(crate) async fn eventually<F, Fut>(check: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
