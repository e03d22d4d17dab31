// src/failover.rs
//! Provider registry and the priority-ordered failover chain.
//!
//! Providers are tried sequentially per category. The first non-empty result
//! wins and later providers are never called, so one category never burns
//! more than one provider's quota per fetch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::breaker::CircuitBreaker;
use crate::providers::{ArticleCandidate, NewsProvider};
use crate::quota::QuotaTracker;

/// One slot in the failover chain.
pub struct ProviderEntry {
    pub provider: Arc<dyn NewsProvider>,
}

/// Ordered provider list; index order is priority order.
#[derive(Default)]
pub struct ProviderRegistry {
    entries: Vec<ProviderEntry>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider at the lowest remaining priority.
    pub fn register(&mut self, provider: Arc<dyn NewsProvider>) {
        self.entries.push(ProviderEntry { provider });
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.provider.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &ProviderEntry> {
        self.entries.iter()
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct FailoverStats {
    pub total_requests: u64,
    pub failover_count: u64,
    pub provider_usage: HashMap<String, u64>,
}

/// Tries providers in priority order per category until one yields content.
pub struct FailoverEngine {
    registry: ProviderRegistry,
    breaker: Arc<CircuitBreaker>,
    quota: Arc<QuotaTracker>,
    stats: Mutex<FailoverStats>,
}

impl FailoverEngine {
    pub fn new(
        registry: ProviderRegistry,
        breaker: Arc<CircuitBreaker>,
        quota: Arc<QuotaTracker>,
    ) -> Self {
        Self {
            registry,
            breaker,
            quota,
            stats: Mutex::new(FailoverStats::default()),
        }
    }

    /// Circuit not skipping and quota permitting.
    pub fn is_available(&self, provider: &str) -> bool {
        !self.breaker.should_skip(provider) && self.quota.can_call(provider, 1)
    }

    /// Fetch one category through the chain. Always returns (possibly empty)
    /// candidates; provider failures are recorded, never surfaced.
    pub async fn fetch_category(&self, category: &str) -> Vec<ArticleCandidate> {
        {
            let mut stats = self.stats.lock().expect("failover stats mutex poisoned");
            stats.total_requests += 1;
        }

        for entry in self.registry.iter() {
            let name = entry.provider.name();

            if self.breaker.should_skip(name) {
                debug!(target: "failover", provider = name, category, "circuit skipping");
                self.count_failover();
                continue;
            }
            if !self.quota.can_call(name, 1) {
                debug!(target: "failover", provider = name, category, "quota exhausted");
                self.count_failover();
                continue;
            }

            match entry.provider.fetch(category).await {
                Ok(articles) if !articles.is_empty() => {
                    self.breaker.record_success(name);
                    self.quota.record(name, 1);
                    let mut stats = self.stats.lock().expect("failover stats mutex poisoned");
                    *stats.provider_usage.entry(name.to_string()).or_insert(0) += 1;
                    info!(
                        target: "failover",
                        provider = name,
                        category,
                        count = articles.len(),
                        "fetched articles"
                    );
                    return articles;
                }
                Ok(_) => {
                    // The call worked, the well is just dry; try the next one.
                    self.breaker.record_success(name);
                    self.quota.record(name, 1);
                    debug!(target: "failover", provider = name, category, "no articles, trying next");
                }
                Err(e) => {
                    warn!(
                        target: "failover",
                        provider = name,
                        category,
                        error = %e,
                        "provider failed, trying next"
                    );
                    self.breaker.record_failure(name, e.kind);
                    self.count_failover();
                }
            }
        }

        warn!(target: "failover", category, "all providers exhausted");
        metrics::counter!("ingest_category_exhausted_total").increment(1);
        Vec::new()
    }

    fn count_failover(&self) {
        let mut stats = self.stats.lock().expect("failover stats mutex poisoned");
        stats.failover_count += 1;
        metrics::counter!("ingest_failover_total").increment(1);
    }

    pub fn stats(&self) -> FailoverStats {
        self.stats
            .lock()
            .expect("failover stats mutex poisoned")
            .clone()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.registry.provider_names()
    }
}
