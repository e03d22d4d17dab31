// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_ingest_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Raw articles parsed from providers.");
        describe_counter!("ingest_fetched_total", "Candidates returned by the failover chain.");
        describe_counter!("ingest_saved_total", "Articles newly persisted to the store.");
        describe_counter!("ingest_duplicates_total", "Candidates dropped as duplicates.");
        describe_counter!("ingest_invalid_total", "Candidates dropped by the quality gate.");
        describe_counter!(
            "ingest_invalid_by_reason_total",
            "Quality-gate rejections by reason."
        );
        describe_counter!(
            "ingest_irrelevant_total",
            "Candidates dropped by the relevance gate."
        );
        describe_counter!("ingest_errors_total", "Persistence errors during a cycle.");
        describe_counter!("ingest_runs_total", "Completed ingestion cycles.");
        describe_counter!("ingest_failover_total", "Provider skips/failures in the chain.");
        describe_counter!(
            "ingest_category_exhausted_total",
            "Categories where every provider was exhausted."
        );
        describe_counter!(
            "ingest_provider_failures_total",
            "Provider failures recorded by the circuit breaker."
        );
        describe_counter!("ingest_dedup_unique_total", "Unique URLs added to the filter.");
        describe_counter!(
            "ingest_indexer_dropped_total",
            "Articles dropped because the indexing queue was full."
        );
        describe_histogram!("ingest_parse_ms", "Provider parse time in milliseconds.");
        describe_histogram!("ingest_cycle_ms", "Full cycle duration in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the ingestion pipeline last ran."
        );
        describe_gauge!(
            "ingest_category_interval_minutes",
            "Advisory polling interval per category."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize the Prometheus recorder and describe the ingest series.
    pub fn init() -> Self {
        let builder = PrometheusBuilder::new();

        let handle = builder
            .install_recorder()
            .expect("prometheus: install recorder");

        ensure_ingest_metrics_described();

        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
