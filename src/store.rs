// src/store.rs
//! External collaborator contracts: article persistence, durable state blobs,
//! and the run-report sink. The pipeline only ever talks to these traits; the
//! in-process implementations here back local runs and tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::validate::StoredArticle;

/// Article persistence keyed by the canonical-URL hash.
///
/// `save_if_absent` must be idempotent: re-saving an existing key is a no-op
/// returning `false`, not an error. This is the authoritative duplicate guard
/// backing the probabilistic filter.
#[async_trait::async_trait]
pub trait ArticleStore: Send + Sync {
    /// Returns `true` if the article was created, `false` if the key existed.
    async fn save_if_absent(&self, article: StoredArticle) -> Result<bool>;
}

/// In-memory article store for local runs and tests.
#[derive(Default)]
pub struct MemoryArticleStore {
    inner: Mutex<HashMap<String, StoredArticle>>,
}

impl MemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("article store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<StoredArticle> {
        self.inner
            .lock()
            .expect("article store mutex poisoned")
            .get(key)
            .cloned()
    }
}

#[async_trait::async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn save_if_absent(&self, article: StoredArticle) -> Result<bool> {
        let mut map = self.inner.lock().expect("article store mutex poisoned");
        if map.contains_key(&article.key) {
            return Ok(false);
        }
        map.insert(article.key.clone(), article);
        Ok(true)
    }
}

/// Durable binary-blob storage for filter and velocity state.
///
/// Loaded at startup, saved periodically and on operator reset. Failures here
/// degrade to empty/default state rather than aborting the pipeline.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Filesystem-backed state store rooted at a data directory.
pub struct FsStateStore {
    root: PathBuf,
}

impl FsStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait::async_trait]
impl StateStore for FsStateStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .with_context(|| format!("reading state blob {}", path.display()))?;
        Ok(Some(bytes))
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("creating state dir {}", self.root.display()))?;
        let path = self.path_for(key);
        // Write-then-rename so a crash mid-save never truncates good state.
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)
            .with_context(|| format!("writing state blob {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("renaming state blob into {}", path.display()))?;
        Ok(())
    }
}

/// Receives each cycle's run report for monitoring/alerting. Duplicate-rate
/// and error-rate thresholds are evaluated on the consumer side.
pub trait RunReportSink: Send + Sync {
    fn publish(&self, report: &crate::orchestrator::RunReport);
}

/// Default sink: structured log line per cycle.
pub struct LogReportSink;

impl RunReportSink for LogReportSink {
    fn publish(&self, report: &crate::orchestrator::RunReport) {
        let totals = report.totals();
        tracing::info!(
            target: "ingest",
            timestamp = %report.timestamp,
            fetched = totals.fetched,
            saved = totals.saved,
            duplicates = totals.duplicates,
            invalid = totals.invalid,
            irrelevant = totals.irrelevant,
            errors = totals.errors,
            duration_ms = report.duration_ms,
            "ingestion cycle report"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::StoredArticle;

    fn article(key: &str) -> StoredArticle {
        StoredArticle {
            key: key.to_string(),
            title: "A reasonably long test headline".into(),
            url: format!("https://example.com/{key}"),
            description: String::new(),
            image: None,
            published_at: "2026-01-22T05:58:33Z".into(),
            source: "Test".into(),
            category: "ai".into(),
            slug: "a-reasonably-long-test-headline".into(),
            quality_score: 50,
        }
    }

    #[tokio::test]
    async fn save_if_absent_is_idempotent() {
        let store = MemoryArticleStore::new();
        assert!(store.save_if_absent(article("k1")).await.unwrap());
        assert!(!store.save_if_absent(article("k1")).await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn fs_state_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        assert!(store.load("missing.bin").await.unwrap().is_none());

        store.save("blob.bin", b"hello").await.unwrap();
        let loaded = store.load("blob.bin").await.unwrap().unwrap();
        assert_eq!(loaded, b"hello");
    }
}
