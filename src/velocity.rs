// src/velocity.rs
//! Adaptive per-category polling intervals driven by observed fetch volume.
//!
//! Each category keeps a ring of its last five fetch counts; the mean picks
//! the interval: fast-moving categories are polled every 5 minutes, quiet
//! ones hourly. The interval is advisory metadata for the orchestrator's
//! trigger layer, not a timer.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::store::StateStore;

/// Stable key under which velocity state is persisted.
pub const VELOCITY_STATE_KEY: &str = "velocity_tracking.json";

/// Ring length: the last N fetch counts considered.
const HISTORY_LEN: usize = 5;

const FAST_INTERVAL_MIN: u32 = 5;
const DEFAULT_INTERVAL_MIN: u32 = 15;
const SLOW_INTERVAL_MIN: u32 = 60;

/// Mean above this selects the fast interval.
const HIGH_VELOCITY: f64 = 15.0;
/// Mean below this selects the slow interval.
const LOW_VELOCITY: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VelocityRecord {
    interval_minutes: u32,
    history: Vec<u64>,
    last_fetch: Option<String>,
    total_fetches: u64,
    total_articles: u64,
}

impl Default for VelocityRecord {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_INTERVAL_MIN,
            history: Vec::new(),
            last_fetch: None,
            total_fetches: 0,
            total_articles: 0,
        }
    }
}

/// Per-category velocity snapshot for the operator API.
#[derive(Debug, Clone, Serialize)]
pub struct VelocitySnapshot {
    pub interval_minutes: u32,
    pub avg_articles_per_fetch: f64,
    pub total_fetches: u64,
    pub total_articles: u64,
    pub last_fetch: Option<String>,
}

/// Thread-safe velocity tracker across categories.
#[derive(Debug, Default)]
pub struct VelocityTracker {
    inner: Mutex<HashMap<String, VelocityRecord>>,
}

impl VelocityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one fetch's article count and return the newly selected
    /// interval in minutes.
    pub fn record_fetch(&self, category: &str, article_count: u64) -> u32 {
        let mut map = self.inner.lock().expect("velocity tracker mutex poisoned");
        let rec = map.entry(category.to_string()).or_default();

        rec.history.push(article_count);
        if rec.history.len() > HISTORY_LEN {
            let excess = rec.history.len() - HISTORY_LEN;
            rec.history.drain(0..excess);
        }
        rec.last_fetch = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        rec.total_fetches += 1;
        rec.total_articles += article_count;

        let mean = rec.history.iter().sum::<u64>() as f64 / rec.history.len() as f64;
        let interval = if mean > HIGH_VELOCITY {
            FAST_INTERVAL_MIN
        } else if mean < LOW_VELOCITY {
            SLOW_INTERVAL_MIN
        } else {
            DEFAULT_INTERVAL_MIN
        };
        rec.interval_minutes = interval;

        debug!(
            target: "velocity",
            category,
            mean = format!("{mean:.1}"),
            interval_min = interval,
            "velocity updated"
        );
        metrics::gauge!("ingest_category_interval_minutes", "category" => category.to_string())
            .set(interval as f64);

        interval
    }

    /// Current advisory interval for a category (default 15 minutes).
    pub fn interval(&self, category: &str) -> u32 {
        self.inner
            .lock()
            .expect("velocity tracker mutex poisoned")
            .get(category)
            .map(|r| r.interval_minutes)
            .unwrap_or(DEFAULT_INTERVAL_MIN)
    }

    pub fn stats(&self) -> HashMap<String, VelocitySnapshot> {
        let map = self.inner.lock().expect("velocity tracker mutex poisoned");
        map.iter()
            .map(|(category, rec)| {
                let avg = if rec.total_fetches > 0 {
                    rec.total_articles as f64 / rec.total_fetches as f64
                } else {
                    0.0
                };
                (
                    category.clone(),
                    VelocitySnapshot {
                        interval_minutes: rec.interval_minutes,
                        avg_articles_per_fetch: (avg * 10.0).round() / 10.0,
                        total_fetches: rec.total_fetches,
                        total_articles: rec.total_articles,
                        last_fetch: rec.last_fetch.clone(),
                    },
                )
            })
            .collect()
    }

    /// Persist velocity history so intervals survive restarts.
    pub async fn save(&self, store: &dyn StateStore) -> Result<()> {
        let bytes = {
            let map = self.inner.lock().expect("velocity tracker mutex poisoned");
            serde_json::to_vec(&*map).context("serializing velocity state")?
        };
        store.save(VELOCITY_STATE_KEY, &bytes).await?;
        debug!(target: "velocity", "velocity state saved");
        Ok(())
    }

    /// Load persisted history; missing or corrupt state starts fresh.
    pub async fn load(&self, store: &dyn StateStore) {
        match store.load(VELOCITY_STATE_KEY).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<HashMap<String, VelocityRecord>>(
                &bytes,
            ) {
                Ok(loaded) => {
                    let mut map = self.inner.lock().expect("velocity tracker mutex poisoned");
                    *map = loaded;
                    info!(target: "velocity", categories = map.len(), "loaded velocity state");
                }
                Err(e) => {
                    error!(target: "velocity", error = %e, "corrupt velocity state, starting fresh");
                }
            },
            Ok(None) => {
                info!(target: "velocity", "no persisted velocity state, starting fresh");
            }
            Err(e) => {
                error!(target: "velocity", error = %e, "failed to load velocity state, starting fresh");
            }
        }
    }
}
