// src/indexer.rs
//! Fire-and-forget handoff of newly stored articles to downstream
//! embedding/enrichment.
//!
//! Modeled as a bounded worker queue rather than a detached task: a full
//! queue is visible (logged drop) and worker failures are logged, but
//! nothing here ever propagates back into the ingestion cycle.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::validate::StoredArticle;

/// Queue depth before batches are dropped with a warning.
const QUEUE_CAPACITY: usize = 64;

/// Consumes batches of newly stored articles asynchronously.
#[async_trait::async_trait]
pub trait DownstreamIndexer: Send + Sync {
    async fn index_batch(&self, articles: Vec<StoredArticle>) -> Result<()>;
}

/// Default indexer: does nothing. Wire a real embedding client here.
pub struct NoopIndexer;

#[async_trait::async_trait]
impl DownstreamIndexer for NoopIndexer {
    async fn index_batch(&self, articles: Vec<StoredArticle>) -> Result<()> {
        debug!(target: "indexer", count = articles.len(), "noop indexer consumed batch");
        Ok(())
    }
}

/// Sender half of the indexing queue; cheap to clone.
#[derive(Clone)]
pub struct IndexerQueue {
    tx: mpsc::Sender<Vec<StoredArticle>>,
}

impl IndexerQueue {
    /// Spawn the worker task and return the enqueue handle.
    pub fn spawn(indexer: Arc<dyn DownstreamIndexer>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Vec<StoredArticle>>(QUEUE_CAPACITY);
        let handle = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                let count = batch.len();
                if let Err(e) = indexer.index_batch(batch).await {
                    // Indexing failures stay here; the cycle already reported.
                    warn!(target: "indexer", error = %e, count, "downstream indexing failed");
                } else {
                    debug!(target: "indexer", count, "batch indexed");
                }
            }
        });
        (Self { tx }, handle)
    }

    /// Hand off a batch without waiting. A full or closed queue drops the
    /// batch with a warning.
    pub fn enqueue(&self, batch: Vec<StoredArticle>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        match self.tx.try_send(batch) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(target: "indexer", count, "indexing queue full, dropping batch");
                metrics::counter!("ingest_indexer_dropped_total").increment(count as u64);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(target: "indexer", count, "indexing queue closed, dropping batch");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CollectingIndexer {
        batches: Mutex<Vec<usize>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl DownstreamIndexer for CollectingIndexer {
        async fn index_batch(&self, articles: Vec<StoredArticle>) -> Result<()> {
            self.batches
                .lock()
                .expect("test mutex poisoned")
                .push(articles.len());
            if self.fail {
                anyhow::bail!("index backend down");
            }
            Ok(())
        }
    }

    fn article() -> StoredArticle {
        StoredArticle {
            key: "abcd1234abcd1234".into(),
            title: "A headline long enough to pass".into(),
            url: "https://example.com/x".into(),
            description: String::new(),
            image: None,
            published_at: "2026-01-22T05:58:33Z".into(),
            source: "Test".into(),
            category: "ai".into(),
            slug: "a-headline-long-enough-to-pass".into(),
            quality_score: 50,
        }
    }

    #[tokio::test]
    async fn batches_reach_the_indexer() {
        let indexer = Arc::new(CollectingIndexer {
            batches: Mutex::new(Vec::new()),
            fail: false,
        });
        let (queue, worker) = IndexerQueue::spawn(indexer.clone());

        queue.enqueue(vec![article(), article()]);
        queue.enqueue(Vec::new()); // empty batches are not sent
        drop(queue);
        worker.await.unwrap();

        let batches = indexer.batches.lock().unwrap();
        assert_eq!(*batches, vec![2]);
    }

    #[tokio::test]
    async fn worker_failure_does_not_kill_the_queue() {
        let indexer = Arc::new(CollectingIndexer {
            batches: Mutex::new(Vec::new()),
            fail: true,
        });
        let (queue, worker) = IndexerQueue::spawn(indexer.clone());

        queue.enqueue(vec![article()]);
        queue.enqueue(vec![article()]);
        drop(queue);
        worker.await.unwrap();

        // Both batches were attempted despite the first failing.
        assert_eq!(indexer.batches.lock().unwrap().len(), 2);
    }
}
