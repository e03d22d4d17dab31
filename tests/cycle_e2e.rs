// tests/cycle_e2e.rs
use std::sync::{Arc, Mutex};

use newspulse::breaker::CircuitBreaker;
use newspulse::dedup::UrlFilter;
use newspulse::failover::{FailoverEngine, ProviderRegistry};
use newspulse::indexer::{IndexerQueue, NoopIndexer};
use newspulse::orchestrator::{Orchestrator, RunReport};
use newspulse::providers::{ArticleCandidate, FetchError, FetchErrorKind, NewsProvider};
use newspulse::quota::QuotaTracker;
use newspulse::store::{FsStateStore, MemoryArticleStore, RunReportSink, StateStore};
use newspulse::validate::Validator;
use newspulse::velocity::VelocityTracker;

struct FiveArticleProvider;

#[async_trait::async_trait]
impl NewsProvider for FiveArticleProvider {
    async fn fetch(&self, category: &str) -> Result<Vec<ArticleCandidate>, FetchError> {
        Ok((0..5)
            .map(|i| ArticleCandidate {
                title: format!("Machine learning milestone number {i} announced"),
                description: "A new AI system enters production.".to_string(),
                url: format!("https://example.com/ai/story-{i}"),
                image: Some(format!("https://example.com/ai/story-{i}.png")),
                published_at: Some("2026-01-22T05:58:33Z".to_string()),
                source: "Example Wire".to_string(),
                category: category.to_string(),
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

struct OutageProvider;

#[async_trait::async_trait]
impl NewsProvider for OutageProvider {
    async fn fetch(&self, _category: &str) -> Result<Vec<ArticleCandidate>, FetchError> {
        Err(FetchError::new(FetchErrorKind::ServerError, "always down"))
    }

    fn name(&self) -> &'static str {
        "outage"
    }
}

struct MixedBatchProvider;

#[async_trait::async_trait]
impl NewsProvider for MixedBatchProvider {
    async fn fetch(&self, category: &str) -> Result<Vec<ArticleCandidate>, FetchError> {
        let good = ArticleCandidate {
            title: "Deep learning conquers another benchmark".to_string(),
            description: "Neural network results".to_string(),
            url: "https://example.com/good".to_string(),
            image: None,
            published_at: Some("2026-01-22T05:58:33Z".to_string()),
            source: "Example".to_string(),
            category: category.to_string(),
        };
        let short_title = ArticleCandidate {
            title: "Short".to_string(),
            url: "https://example.com/short".to_string(),
            ..good.clone()
        };
        // No "ai" substring anywhere (so not even "fair"): the relevance
        // gate matches substrings.
        let off_topic = ArticleCandidate {
            title: "County bake-off crowns pie champion this weekend".to_string(),
            description: "Dessert excellence on show".to_string(),
            url: "https://example.com/pie".to_string(),
            ..good.clone()
        };
        let no_date = ArticleCandidate {
            title: "Transformer models keep growing larger".to_string(),
            url: "https://example.com/no-date".to_string(),
            published_at: None,
            ..good.clone()
        };
        Ok(vec![good, short_title, off_topic, no_date])
    }

    fn name(&self) -> &'static str {
        "mixed"
    }
}

struct CollectingSink {
    reports: Mutex<Vec<RunReport>>,
}

impl RunReportSink for CollectingSink {
    fn publish(&self, report: &RunReport) {
        self.reports
            .lock()
            .expect("sink mutex poisoned")
            .push(report.clone());
    }
}

struct Harness {
    orchestrator: Orchestrator,
    articles: Arc<MemoryArticleStore>,
    velocity: Arc<VelocityTracker>,
    sink: Arc<CollectingSink>,
    _dir: tempfile::TempDir,
}

fn harness(provider: Arc<dyn NewsProvider>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let state: Arc<dyn StateStore> = Arc::new(FsStateStore::new(dir.path()));

    let mut registry = ProviderRegistry::new();
    registry.register(provider);
    let engine = Arc::new(FailoverEngine::new(
        registry,
        Arc::new(CircuitBreaker::default()),
        Arc::new(QuotaTracker::with_defaults()),
    ));

    let articles = Arc::new(MemoryArticleStore::new());
    let velocity = Arc::new(VelocityTracker::new());
    let sink = Arc::new(CollectingSink {
        reports: Mutex::new(Vec::new()),
    });
    let (indexer, _worker) = IndexerQueue::spawn(Arc::new(NoopIndexer));

    let orchestrator = Orchestrator::new(
        engine,
        Arc::new(Validator::new()),
        Arc::new(UrlFilter::with_settings(1000, 0.001)),
        articles.clone(),
        state,
        velocity.clone(),
        indexer,
        sink.clone(),
    );

    Harness {
        orchestrator,
        articles,
        velocity,
        sink,
        _dir: dir,
    }
}

#[tokio::test]
async fn cycle_is_idempotent_across_runs() {
    let h = harness(Arc::new(FiveArticleProvider));
    let categories = vec!["ai".to_string()];

    let first = h.orchestrator.run_cycle(&categories).await;
    let ai = &first.categories["ai"];
    assert_eq!(ai.fetched, 5);
    assert_eq!(ai.saved, 5);
    assert_eq!(ai.duplicates, 0);
    assert_eq!(ai.invalid, 0);
    assert_eq!(ai.irrelevant, 0);
    assert_eq!(h.articles.len(), 5);

    // Same provider, same data: everything is a duplicate the second time.
    let second = h.orchestrator.run_cycle(&categories).await;
    let ai = &second.categories["ai"];
    assert_eq!(ai.fetched, 5);
    assert_eq!(ai.saved, 0);
    assert_eq!(ai.duplicates, 5);
    assert_eq!(h.articles.len(), 5);

    // Both reports reached the sink.
    assert_eq!(h.sink.reports.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn validator_partitions_mixed_batch() {
    let h = harness(Arc::new(MixedBatchProvider));
    let report = h.orchestrator.run_cycle(&["ai".to_string()]).await;

    let ai = &report.categories["ai"];
    assert_eq!(ai.fetched, 4);
    assert_eq!(ai.saved, 1);
    assert_eq!(ai.invalid, 2); // short title + missing date
    assert_eq!(ai.irrelevant, 1); // pie story
    assert_eq!(h.articles.len(), 1);

    let stored = h.articles.get(&newspulse::url_hash("https://example.com/good"));
    let stored = stored.expect("good article stored");
    assert_eq!(stored.published_at, "2026-01-22T05:58:33Z");
    assert_eq!(stored.category, "ai");
}

#[tokio::test]
async fn provider_outage_yields_zero_entry_and_cycle_completes() {
    let h = harness(Arc::new(OutageProvider));
    let report = h
        .orchestrator
        .run_cycle(&["ai".to_string(), "cloud-computing".to_string()])
        .await;

    assert_eq!(report.categories.len(), 2);
    for stats in report.categories.values() {
        assert_eq!(stats.fetched, 0);
        assert_eq!(stats.saved, 0);
    }
    // The cycle still published a report and recorded velocity.
    assert_eq!(h.sink.reports.lock().unwrap().len(), 1);
    assert_eq!(h.velocity.interval("ai"), 60); // one zero-count fetch -> slow
}

#[tokio::test]
async fn velocity_updates_after_each_cycle() {
    let h = harness(Arc::new(FiveArticleProvider));
    let categories = vec!["ai".to_string()];

    h.orchestrator.run_cycle(&categories).await;
    let stats = h.velocity.stats();
    assert_eq!(stats["ai"].total_fetches, 1);
    assert_eq!(stats["ai"].total_articles, 5);
    // Mean of [5] = 5: moderate band, default interval.
    assert_eq!(stats["ai"].interval_minutes, 15);
}
