// src/dedup.rs
//! URL deduplication over a persistent, auto-scaling bloom filter.
//!
//! A previously-added URL is always reported as a duplicate (no false
//! negatives); a genuinely new URL is occasionally reported as a duplicate at
//! the configured error rate. That tradeoff buys constant-space membership
//! over unbounded article volume. When a stage fills, a larger stage with a
//! tighter error rate is appended; existing stages are never reset.

use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::canonical::canonicalize;
use crate::store::StateStore;

/// Stable key under which filter state is persisted.
pub const DEDUP_STATE_KEY: &str = "bloom_filter.bin";

/// Growth factor for each appended stage.
const STAGE_GROWTH: usize = 2;
/// Error-rate tightening ratio per stage, so the compound rate stays bounded.
const STAGE_TIGHTENING: f64 = 0.9;
/// Unique adds between automatic persistence saves.
const AUTOSAVE_EVERY: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BloomStage {
    capacity: usize,
    error_rate: f64,
    inserted: usize,
    num_bits: u64,
    num_hashes: u32,
    bits: Vec<u64>,
}

impl BloomStage {
    fn new(capacity: usize, error_rate: f64) -> Self {
        let capacity = capacity.max(1);
        // Standard bloom sizing: m = -n·ln(ε)/ln(2)², k = (m/n)·ln(2).
        let ln2 = std::f64::consts::LN_2;
        let m = (-(capacity as f64) * error_rate.ln() / (ln2 * ln2)).ceil() as u64;
        let m = m.max(64);
        let k = ((m as f64 / capacity as f64) * ln2).ceil() as u32;
        let k = k.max(1);
        let words = m.div_ceil(64) as usize;
        Self {
            capacity,
            error_rate,
            inserted: 0,
            num_bits: m,
            num_hashes: k,
            bits: vec![0u64; words],
        }
    }

    fn bit_positions(&self, h1: u64, h2: u64) -> impl Iterator<Item = u64> + '_ {
        // Double hashing: g_i = h1 + i·h2 mod m.
        (0..self.num_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits)
    }

    fn contains(&self, h1: u64, h2: u64) -> bool {
        self.bit_positions(h1, h2)
            .all(|pos| self.bits[(pos / 64) as usize] & (1u64 << (pos % 64)) != 0)
    }

    fn insert(&mut self, h1: u64, h2: u64) {
        let positions: Vec<u64> = self.bit_positions(h1, h2).collect();
        for pos in positions {
            self.bits[(pos / 64) as usize] |= 1u64 << (pos % 64);
        }
        self.inserted += 1;
    }

    fn is_full(&self) -> bool {
        self.inserted >= self.capacity
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FilterStats {
    pub total_checks: u64,
    pub unique_urls_added: u64,
    pub duplicates_detected: u64,
    pub stages: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct FilterState {
    initial_capacity: usize,
    error_rate: f64,
    stages: Vec<BloomStage>,
    stats: FilterStats,
    #[serde(default)]
    adds_since_save: u64,
}

impl FilterState {
    fn new(initial_capacity: usize, error_rate: f64) -> Self {
        Self {
            initial_capacity,
            error_rate,
            stages: vec![BloomStage::new(initial_capacity, error_rate)],
            stats: FilterStats {
                stages: 1,
                ..FilterStats::default()
            },
            adds_since_save: 0,
        }
    }
}

/// Thread-safe deduplication filter over canonical URLs.
#[derive(Debug)]
pub struct UrlFilter {
    inner: Mutex<FilterState>,
    initial_capacity: usize,
    error_rate: f64,
}

impl UrlFilter {
    /// Default sizing: 100k URLs at a 0.1% false-positive rate.
    pub fn new() -> Self {
        Self::with_settings(100_000, 0.001)
    }

    pub fn with_settings(initial_capacity: usize, error_rate: f64) -> Self {
        Self {
            inner: Mutex::new(FilterState::new(initial_capacity, error_rate)),
            initial_capacity,
            error_rate,
        }
    }

    /// Check whether a URL has been seen and record it.
    ///
    /// Returns `true` if the URL is new, `false` if it is a duplicate. The
    /// check-and-add is atomic per URL: two concurrent calls with the same
    /// URL cannot both observe "new".
    pub fn check_and_add(&self, url: &str) -> bool {
        let canonical = canonicalize(url);
        let (h1, h2) = hash_pair(&canonical);

        let mut state = self.inner.lock().expect("url filter mutex poisoned");
        state.stats.total_checks += 1;

        if state.stages.iter().any(|s| s.contains(h1, h2)) {
            state.stats.duplicates_detected += 1;
            return false;
        }

        if state.stages.last().expect("at least one stage").is_full() {
            let next_capacity = state
                .stages
                .last()
                .map(|s| s.capacity.saturating_mul(STAGE_GROWTH))
                .unwrap_or(self.initial_capacity);
            let next_error = state
                .stages
                .last()
                .map(|s| s.error_rate * STAGE_TIGHTENING)
                .unwrap_or(self.error_rate);
            info!(
                target: "dedup",
                capacity = next_capacity,
                "bloom filter stage full, growing"
            );
            state.stages.push(BloomStage::new(next_capacity, next_error));
            state.stats.stages = state.stages.len();
        }

        state
            .stages
            .last_mut()
            .expect("at least one stage")
            .insert(h1, h2);
        state.stats.unique_urls_added += 1;
        state.adds_since_save += 1;
        metrics::counter!("ingest_dedup_unique_total").increment(1);

        true
    }

    /// True once enough unique adds have accumulated to warrant a save.
    pub fn autosave_due(&self) -> bool {
        self.inner
            .lock()
            .expect("url filter mutex poisoned")
            .adds_since_save
            >= AUTOSAVE_EVERY
    }

    /// Destructive wipe. All membership history is lost; the next cycle will
    /// treat every URL as new and lean on the article store's idempotent keys.
    pub fn reset(&self) {
        warn!(target: "dedup", "resetting URL filter: all dedup history will be lost");
        let mut state = self.inner.lock().expect("url filter mutex poisoned");
        *state = FilterState::new(self.initial_capacity, self.error_rate);
    }

    pub fn stats(&self) -> FilterStats {
        self.inner
            .lock()
            .expect("url filter mutex poisoned")
            .stats
            .clone()
    }

    /// Persist filter state through the durable state store.
    pub async fn save(&self, store: &dyn StateStore) -> Result<()> {
        let bytes = {
            let mut state = self.inner.lock().expect("url filter mutex poisoned");
            state.adds_since_save = 0;
            serde_json::to_vec(&*state).context("serializing url filter state")?
        };
        store.save(DEDUP_STATE_KEY, &bytes).await?;
        debug!(target: "dedup", bytes = bytes.len(), "url filter state saved");
        Ok(())
    }

    /// Load persisted state, replacing the in-memory filter. A missing or
    /// unreadable blob logs and keeps the current (empty) state.
    pub async fn load(&self, store: &dyn StateStore) {
        match store.load(DEDUP_STATE_KEY).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<FilterState>(&bytes) {
                Ok(loaded) => {
                    let mut state = self.inner.lock().expect("url filter mutex poisoned");
                    *state = loaded;
                    info!(
                        target: "dedup",
                        unique = state.stats.unique_urls_added,
                        stages = state.stats.stages,
                        "loaded url filter state"
                    );
                }
                Err(e) => {
                    error!(target: "dedup", error = %e, "corrupt url filter state, starting empty");
                }
            },
            Ok(None) => {
                info!(target: "dedup", "no persisted url filter state, starting empty");
            }
            Err(e) => {
                error!(target: "dedup", error = %e, "failed to load url filter state, starting empty");
            }
        }
    }
}

impl Default for UrlFilter {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_pair(canonical: &str) -> (u64, u64) {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let h1 = u64::from_be_bytes(digest[0..8].try_into().expect("8 bytes"));
    let h2 = u64::from_be_bytes(digest[8..16].try_into().expect("8 bytes"));
    // Odd step so the double-hash walk cycles through all positions.
    (h1, h2 | 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsStateStore;

    #[test]
    fn new_then_duplicate() {
        let filter = UrlFilter::with_settings(100, 0.001);
        assert!(filter.check_and_add("https://example.com/article1"));
        assert!(!filter.check_and_add("https://example.com/article1"));

        let stats = filter.stats();
        assert_eq!(stats.total_checks, 2);
        assert_eq!(stats.unique_urls_added, 1);
        assert_eq!(stats.duplicates_detected, 1);
    }

    #[test]
    fn canonical_variants_collapse() {
        let filter = UrlFilter::with_settings(100, 0.001);
        assert!(filter.check_and_add("https://example.com/article1"));
        assert!(!filter.check_and_add("https://example.com/article1/"));
        assert!(!filter.check_and_add("https://www.example.com/article1"));
        // A real query parameter changes identity.
        assert!(filter.check_and_add("https://example.com/article1?page=2"));
    }

    #[test]
    fn no_false_negatives_across_growth() {
        let filter = UrlFilter::with_settings(100, 0.001);
        let urls: Vec<String> = (0..500)
            .map(|i| format!("https://example.com/auto-scale-{i}"))
            .collect();
        for u in &urls {
            filter.check_and_add(u);
        }
        // Every previously-added URL must still report as duplicate.
        for u in &urls {
            assert!(!filter.check_and_add(u), "false negative for {u}");
        }
        assert!(filter.stats().stages > 1, "filter should have grown");
    }

    #[test]
    fn bounded_false_positive_rate() {
        let filter = UrlFilter::with_settings(10_000, 0.001);
        for i in 0..5_000 {
            filter.check_and_add(&format!("https://example.com/seed-{i}"));
        }
        let mut false_positives = 0usize;
        let probes = 5_000usize;
        for i in 0..probes {
            if !filter.check_and_add(&format!("https://example.com/fresh-{i}")) {
                false_positives += 1;
            }
        }
        // 0.1% design rate; allow generous slack for hash variance.
        assert!(
            false_positives < probes / 100,
            "false positive rate too high: {false_positives}/{probes}"
        );
    }

    #[test]
    fn reset_wipes_membership() {
        let filter = UrlFilter::with_settings(100, 0.001);
        assert!(filter.check_and_add("https://example.com/a"));
        filter.reset();
        assert!(filter.check_and_add("https://example.com/a"));
        assert_eq!(filter.stats().unique_urls_added, 1);
    }

    #[tokio::test]
    async fn state_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStateStore::new(dir.path());

        let filter = UrlFilter::with_settings(100, 0.001);
        assert!(filter.check_and_add("https://example.com/persisted"));
        filter.save(&store).await.unwrap();

        let reloaded = UrlFilter::with_settings(100, 0.001);
        reloaded.load(&store).await;
        assert!(!reloaded.check_and_add("https://example.com/persisted"));
    }
}
