//! NewsPulse Ingestion Service — Binary Entrypoint
//! Boots the Axum operator/metrics server and the background ingestion
//! driver, wiring shared pipeline services.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newspulse::api::{create_router, AppState};
use newspulse::config::{ApiKeys, IngestConfig};
use newspulse::dedup::UrlFilter;
use newspulse::driver::spawn_ingest_driver;
use newspulse::failover::FailoverEngine;
use newspulse::indexer::{IndexerQueue, NoopIndexer};
use newspulse::metrics::Metrics;
use newspulse::orchestrator::Orchestrator;
use newspulse::store::{FsStateStore, LogReportSink, MemoryArticleStore, StateStore};
use newspulse::validate::Validator;
use newspulse::velocity::VelocityTracker;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("newspulse=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments. This enables
    // NEWSPULSE_CONFIG and the provider API keys from .env.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = IngestConfig::load_default().context("loading ingest config")?;
    let keys = ApiKeys::from_env();

    // Prometheus recorder must be installed before any series is touched.
    let metrics = Metrics::init();

    // --- Durable state ---
    let state_store: Arc<dyn StateStore> = Arc::new(FsStateStore::new(config.data_dir.clone()));
    let filter = Arc::new(UrlFilter::with_settings(
        config.dedup.initial_capacity,
        config.dedup.error_rate,
    ));
    filter.load(state_store.as_ref()).await;
    let velocity = Arc::new(VelocityTracker::new());
    velocity.load(state_store.as_ref()).await;

    // --- Provider chain ---
    let breaker = Arc::new(newspulse::CircuitBreaker::new(config.breaker_config()));
    let quota = Arc::new(config.quota_tracker());
    let registry = config.build_registry(&keys);
    tracing::info!(
        providers = ?registry.provider_names(),
        categories = config.categories.len(),
        "provider chain configured"
    );
    let engine = Arc::new(FailoverEngine::new(registry, breaker, quota));

    // --- Pipeline ---
    let validator = Arc::new(Validator::with_overrides(config.keywords.clone()));
    // Article persistence is an external collaborator; the in-memory store
    // backs local runs. Swap in a real document-store client here.
    let articles = Arc::new(MemoryArticleStore::new());
    let (indexer, _indexer_worker) = IndexerQueue::spawn(Arc::new(NoopIndexer));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&engine),
        validator,
        Arc::clone(&filter),
        articles,
        Arc::clone(&state_store),
        Arc::clone(&velocity),
        indexer,
        Arc::new(LogReportSink),
    ));

    let _driver = spawn_ingest_driver(
        Arc::clone(&orchestrator),
        Arc::clone(&velocity),
        config.categories.clone(),
    );

    // --- Operator API + metrics ---
    let state = AppState {
        orchestrator,
        engine,
        filter,
        velocity,
        state_store,
        categories: Arc::new(config.categories.clone()),
    };
    let router = create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "operator API listening");
    axum::serve(listener, router).await.context("serving operator API")?;

    Ok(())
}
