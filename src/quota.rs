// src/quota.rs
//! Per-provider usage counters against rolling windows.
//!
//! Advisory only: benign races between concurrent category tasks are
//! acceptable, the hard limit lives upstream at the provider. Exceeding a
//! budget marks the provider unavailable until the window resets.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{error, warn};

const DAY_SECS: u64 = 24 * 3600;
const MINUTE_SECS: u64 = 60;

/// Budget window kind for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaWindow {
    /// Fixed number of calls per rolling day.
    DailyCalls { limit: u64 },
    /// Token budget per rolling minute.
    TokensPerMinute { limit: u64 },
}

impl QuotaWindow {
    fn limit(&self) -> u64 {
        match self {
            QuotaWindow::DailyCalls { limit } => *limit,
            QuotaWindow::TokensPerMinute { limit } => *limit,
        }
    }

    fn span_secs(&self) -> u64 {
        match self {
            QuotaWindow::DailyCalls { .. } => DAY_SECS,
            QuotaWindow::TokensPerMinute { .. } => MINUTE_SECS,
        }
    }
}

#[derive(Debug)]
struct QuotaRecord {
    window: QuotaWindow,
    used: u64,
    reset_at: Option<u64>,
    last_call: Option<u64>,
}

/// Per-provider quota usage snapshot for the operator API.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaSnapshot {
    pub window: QuotaWindow,
    pub used: u64,
    pub remaining: u64,
    pub reset_at: Option<u64>,
    pub last_call: Option<u64>,
}

/// Tracks API usage per provider. Unknown providers are treated as unlimited.
#[derive(Debug)]
pub struct QuotaTracker {
    inner: Mutex<HashMap<String, QuotaRecord>>,
}

impl QuotaTracker {
    pub fn new(budgets: impl IntoIterator<Item = (String, QuotaWindow)>) -> Self {
        let map = budgets
            .into_iter()
            .map(|(name, window)| {
                (
                    name,
                    QuotaRecord {
                        window,
                        used: 0,
                        reset_at: None,
                        last_call: None,
                    },
                )
            })
            .collect();
        Self {
            inner: Mutex::new(map),
        }
    }

    /// Free-tier defaults for the stock provider set.
    pub fn with_defaults() -> Self {
        Self::new([
            ("gnews".to_string(), QuotaWindow::DailyCalls { limit: 100 }),
            ("newsapi".to_string(), QuotaWindow::DailyCalls { limit: 100 }),
            ("newsdata".to_string(), QuotaWindow::DailyCalls { limit: 200 }),
        ])
    }

    /// Whether a call of the given cost fits inside the provider's budget.
    pub fn can_call(&self, provider: &str, cost: u64) -> bool {
        self.can_call_at(provider, cost, now_unix())
    }

    pub fn can_call_at(&self, provider: &str, cost: u64, now: u64) -> bool {
        let mut map = self.inner.lock().expect("quota tracker mutex poisoned");
        let Some(rec) = map.get_mut(provider) else {
            return true;
        };
        expire_window(rec, now);
        rec.used + cost <= rec.window.limit()
    }

    /// Record usage. Never fails; unknown providers are ignored with a warning.
    pub fn record(&self, provider: &str, cost: u64) {
        self.record_at(provider, cost, now_unix());
    }

    pub fn record_at(&self, provider: &str, cost: u64, now: u64) {
        let mut map = self.inner.lock().expect("quota tracker mutex poisoned");
        let Some(rec) = map.get_mut(provider) else {
            warn!(target: "quota", provider, "recording usage for unknown provider");
            return;
        };
        expire_window(rec, now);
        if rec.reset_at.is_none() {
            rec.reset_at = Some(now + rec.window.span_secs());
        }
        rec.used += cost;
        rec.last_call = Some(now);

        let limit = rec.window.limit();
        if rec.used >= limit {
            error!(
                target: "quota",
                provider,
                used = rec.used,
                limit,
                "quota limit exceeded"
            );
        } else if rec.used * 10 >= limit * 9 {
            warn!(
                target: "quota",
                provider,
                used = rec.used,
                limit,
                "approaching quota limit"
            );
        }
    }

    pub fn stats(&self) -> HashMap<String, QuotaSnapshot> {
        let map = self.inner.lock().expect("quota tracker mutex poisoned");
        map.iter()
            .map(|(name, rec)| {
                let limit = rec.window.limit();
                (
                    name.clone(),
                    QuotaSnapshot {
                        window: rec.window,
                        used: rec.used,
                        remaining: limit.saturating_sub(rec.used),
                        reset_at: rec.reset_at,
                        last_call: rec.last_call,
                    },
                )
            })
            .collect()
    }
}

fn expire_window(rec: &mut QuotaRecord, now: u64) {
    if let Some(reset_at) = rec.reset_at {
        if now > reset_at {
            rec.used = 0;
            rec.reset_at = None;
        }
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(limit: u64) -> QuotaTracker {
        QuotaTracker::new([("gnews".to_string(), QuotaWindow::DailyCalls { limit })])
    }

    #[test]
    fn unknown_provider_is_unlimited() {
        let t = tracker(2);
        assert!(t.can_call_at("mystery", 1_000_000, 100));
        // record for unknown provider must not panic
        t.record_at("mystery", 5, 100);
    }

    #[test]
    fn budget_enforced_within_window() {
        let t = tracker(2);
        assert!(t.can_call_at("gnews", 1, 100));
        t.record_at("gnews", 1, 100);
        t.record_at("gnews", 1, 110);
        assert!(!t.can_call_at("gnews", 1, 120));
    }

    #[test]
    fn window_resets_after_expiry() {
        let t = tracker(1);
        t.record_at("gnews", 1, 100);
        assert!(!t.can_call_at("gnews", 1, 200));
        // First record stamps reset_at = 100 + 86400.
        assert!(t.can_call_at("gnews", 1, 100 + DAY_SECS + 1));
        t.record_at("gnews", 1, 100 + DAY_SECS + 2);
        let stats = t.stats();
        assert_eq!(stats["gnews"].used, 1);
    }

    #[test]
    fn per_minute_window_uses_short_span() {
        let t = QuotaTracker::new([(
            "llm".to_string(),
            QuotaWindow::TokensPerMinute { limit: 100 },
        )]);
        t.record_at("llm", 100, 50);
        assert!(!t.can_call_at("llm", 1, 60));
        assert!(t.can_call_at("llm", 1, 50 + MINUTE_SECS + 1));
    }

    #[test]
    fn snapshot_reports_remaining() {
        let t = tracker(10);
        t.record_at("gnews", 3, 100);
        let stats = t.stats();
        assert_eq!(stats["gnews"].used, 3);
        assert_eq!(stats["gnews"].remaining, 7);
        assert_eq!(stats["gnews"].reset_at, Some(100 + DAY_SECS));
    }
}
