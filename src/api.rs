// src/api.rs
//! Operator control surface: trigger cycles, reset circuits, reset the
//! dedup filter, inspect pipeline state.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::breaker::CircuitSnapshot;
use crate::dedup::{FilterStats, UrlFilter};
use crate::failover::{FailoverEngine, FailoverStats};
use crate::orchestrator::{Orchestrator, RunReport};
use crate::quota::QuotaSnapshot;
use crate::store::StateStore;
use crate::velocity::{VelocitySnapshot, VelocityTracker};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub engine: Arc<FailoverEngine>,
    pub filter: Arc<UrlFilter>,
    pub velocity: Arc<VelocityTracker>,
    pub state_store: Arc<dyn StateStore>,
    pub categories: Arc<Vec<String>>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/admin/ingest/run", post(run_ingest))
        .route("/admin/circuit/reset", post(reset_circuit))
        .route("/admin/dedup/reset", post(reset_dedup))
        .route("/admin/stats", get(stats))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Trigger an immediate cycle for one category (`?category=ai`) or all.
async fn run_ingest(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<RunReport> {
    let categories: Vec<String> = match params.get("category") {
        Some(c) => vec![c.clone()],
        None => state.categories.as_ref().clone(),
    };
    let report = state.orchestrator.run_cycle(&categories).await;
    Json(report)
}

#[derive(Serialize)]
struct ResetResp {
    reset: String,
}

/// Reset one provider's circuit (`?provider=gnews`) or all circuits.
async fn reset_circuit(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<ResetResp> {
    let provider = params.get("provider").map(String::as_str);
    state.engine.breaker().reset(provider);
    Json(ResetResp {
        reset: provider.unwrap_or("all").to_string(),
    })
}

/// Destructive: wipes all dedup history. The article store's idempotent keys
/// are the only remaining duplicate guard afterwards.
async fn reset_dedup(State(state): State<AppState>) -> Json<ResetResp> {
    warn!(target: "api", "operator requested dedup filter reset");
    state.filter.reset();
    if let Err(e) = state.filter.save(state.state_store.as_ref()).await {
        warn!(target: "api", error = %e, "failed to persist reset filter state");
    }
    Json(ResetResp {
        reset: "dedup".to_string(),
    })
}

#[derive(Serialize)]
struct StatsResp {
    providers: Vec<&'static str>,
    circuits: HashMap<String, CircuitSnapshot>,
    quotas: HashMap<String, QuotaSnapshot>,
    dedup: FilterStats,
    velocity: HashMap<String, VelocitySnapshot>,
    failover: FailoverStats,
}

async fn stats(State(state): State<AppState>) -> Json<StatsResp> {
    Json(StatsResp {
        providers: state.engine.provider_names(),
        circuits: state.engine.breaker().stats(),
        quotas: state.engine.quota().stats(),
        dedup: state.filter.stats(),
        velocity: state.velocity.stats(),
        failover: state.engine.stats(),
    })
}
