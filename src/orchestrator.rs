// src/orchestrator.rs
//! Ingestion orchestrator: one concurrent fetch task per category, each
//! running failover fetch -> dedup -> validation -> storage, aggregated into
//! a per-cycle run report.
//!
//! A category's failure never aborts its siblings or the cycle; the report is
//! always produced, even under total provider outage.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::dedup::UrlFilter;
use crate::failover::FailoverEngine;
use crate::indexer::IndexerQueue;
use crate::store::{ArticleStore, RunReportSink, StateStore};
use crate::validate::{Rejection, StoredArticle, Validator};
use crate::velocity::VelocityTracker;

/// Per-category outcome counters for one cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub fetched: u64,
    pub saved: u64,
    pub duplicates: u64,
    pub invalid: u64,
    pub irrelevant: u64,
    pub errors: u64,
}

impl CategoryStats {
    fn add(&mut self, other: &CategoryStats) {
        self.fetched += other.fetched;
        self.saved += other.saved;
        self.duplicates += other.duplicates;
        self.invalid += other.invalid;
        self.irrelevant += other.irrelevant;
        self.errors += other.errors;
    }
}

/// Emitted once per orchestrator cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub timestamp: String,
    pub duration_ms: u64,
    pub categories: HashMap<String, CategoryStats>,
}

impl RunReport {
    pub fn totals(&self) -> CategoryStats {
        let mut totals = CategoryStats::default();
        for stats in self.categories.values() {
            totals.add(stats);
        }
        totals
    }
}

/// Owns the per-cycle pipeline and its shared services.
pub struct Orchestrator {
    engine: Arc<FailoverEngine>,
    validator: Arc<Validator>,
    filter: Arc<UrlFilter>,
    articles: Arc<dyn ArticleStore>,
    state: Arc<dyn StateStore>,
    velocity: Arc<VelocityTracker>,
    indexer: IndexerQueue,
    report_sink: Arc<dyn RunReportSink>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Arc<FailoverEngine>,
        validator: Arc<Validator>,
        filter: Arc<UrlFilter>,
        articles: Arc<dyn ArticleStore>,
        state: Arc<dyn StateStore>,
        velocity: Arc<VelocityTracker>,
        indexer: IndexerQueue,
        report_sink: Arc<dyn RunReportSink>,
    ) -> Self {
        Self {
            engine,
            validator,
            filter,
            articles,
            state,
            velocity,
            indexer,
            report_sink,
        }
    }

    /// Run one full ingestion cycle over the given categories.
    pub async fn run_cycle(&self, categories: &[String]) -> RunReport {
        crate::metrics::ensure_ingest_metrics_described();
        let started = std::time::Instant::now();
        info!(target: "ingest", categories = categories.len(), "starting ingestion cycle");

        let mut tasks: JoinSet<(String, CategoryStats, Vec<StoredArticle>)> = JoinSet::new();
        for category in categories {
            let category = category.clone();
            let engine = Arc::clone(&self.engine);
            let validator = Arc::clone(&self.validator);
            let filter = Arc::clone(&self.filter);
            let articles = Arc::clone(&self.articles);
            let state = Arc::clone(&self.state);
            tasks.spawn(async move {
                run_category(category, engine, validator, filter, articles, state).await
            });
        }

        let mut report_categories: HashMap<String, CategoryStats> = categories
            .iter()
            .map(|c| (c.clone(), CategoryStats::default()))
            .collect();
        let mut newly_stored: Vec<StoredArticle> = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((category, stats, batch)) => {
                    report_categories.insert(category, stats);
                    newly_stored.extend(batch);
                }
                Err(e) => {
                    // A panicked task leaves its zero-result entry in place.
                    error!(target: "ingest", error = %e, "category task failed");
                }
            }
        }

        for (category, stats) in &report_categories {
            self.velocity.record_fetch(category, stats.fetched);
        }
        if let Err(e) = self.velocity.save(self.state.as_ref()).await {
            error!(target: "velocity", error = %e, "failed to persist velocity state");
        }
        if let Err(e) = self.filter.save(self.state.as_ref()).await {
            error!(target: "dedup", error = %e, "failed to persist url filter state");
        }

        self.indexer.enqueue(newly_stored);

        let report = RunReport {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            duration_ms: started.elapsed().as_millis() as u64,
            categories: report_categories,
        };

        let totals = report.totals();
        counter!("ingest_fetched_total").increment(totals.fetched);
        counter!("ingest_saved_total").increment(totals.saved);
        counter!("ingest_duplicates_total").increment(totals.duplicates);
        counter!("ingest_invalid_total").increment(totals.invalid);
        counter!("ingest_irrelevant_total").increment(totals.irrelevant);
        counter!("ingest_errors_total").increment(totals.errors);
        counter!("ingest_runs_total").increment(1);
        gauge!("ingest_pipeline_last_run_ts").set(Utc::now().timestamp().max(0) as f64);
        histogram!("ingest_cycle_ms").record(report.duration_ms as f64);

        self.report_sink.publish(&report);
        report
    }
}

/// The per-category pipeline. Catches everything locally: the return value is
/// always a stats entry, never an error.
async fn run_category(
    category: String,
    engine: Arc<FailoverEngine>,
    validator: Arc<Validator>,
    filter: Arc<UrlFilter>,
    articles: Arc<dyn ArticleStore>,
    state: Arc<dyn StateStore>,
) -> (String, CategoryStats, Vec<StoredArticle>) {
    let mut stats = CategoryStats::default();
    let mut stored_batch = Vec::new();

    let candidates = engine.fetch_category(&category).await;
    stats.fetched = candidates.len() as u64;

    for candidate in candidates {
        if candidate.url.trim().is_empty() {
            // An empty URL can't key the filter; it is plain invalid.
            stats.invalid += 1;
            continue;
        }

        // Dedup before validation: the hash probe is far cheaper than the
        // keyword scan, and the store's idempotent key backstops false
        // positives either way.
        if !filter.check_and_add(&candidate.url) {
            stats.duplicates += 1;
            continue;
        }

        match validator.check(&candidate) {
            Ok(()) => {}
            Err(Rejection::Invalid(issue)) => {
                stats.invalid += 1;
                counter!("ingest_invalid_by_reason_total", "reason" => issue.as_str())
                    .increment(1);
                continue;
            }
            Err(Rejection::Irrelevant) => {
                stats.irrelevant += 1;
                continue;
            }
        }

        let stored = validator.sanitize(candidate);
        match articles.save_if_absent(stored.clone()).await {
            Ok(true) => {
                stats.saved += 1;
                stored_batch.push(stored);
            }
            Ok(false) => {
                // Filter false positive path is impossible here (it said new),
                // so this is a pre-existing row from before a filter reset.
                stats.duplicates += 1;
            }
            Err(e) => {
                warn!(
                    target: "ingest",
                    category,
                    key = %stored.key,
                    error = %e,
                    "failed to persist article"
                );
                stats.errors += 1;
            }
        }
    }

    if filter.autosave_due() {
        if let Err(e) = filter.save(state.as_ref()).await {
            error!(target: "dedup", error = %e, "autosave of url filter state failed");
        }
    }

    info!(
        target: "ingest",
        category,
        fetched = stats.fetched,
        saved = stats.saved,
        duplicates = stats.duplicates,
        invalid = stats.invalid,
        irrelevant = stats.irrelevant,
        errors = stats.errors,
        "category cycle finished"
    );

    (category, stats, stored_batch)
}
