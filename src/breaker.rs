// src/breaker.rs
//! Per-provider circuit breaker.
//!
//! Stops calling a consistently failing provider for a cooldown period:
//! CLOSED -> OPEN after enough failures inside the failure window, OPEN ->
//! HALF_OPEN once the cooldown elapses, then a bounded number of probe calls
//! decide between CLOSED (recovered) and OPEN again.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info, warn};

// Failure classification is supplied by the caller (provider layer) and used
// for logs and metrics only; the state machine is classification-agnostic.
use crate::providers::FetchErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: usize,
    pub failure_window_secs: u64,
    pub open_duration_secs: u64,
    pub half_open_max_attempts: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        // 3 failures in 5 minutes opens the circuit for an hour, then one
        // probe request decides.
        Self {
            failure_threshold: 3,
            failure_window_secs: 300,
            open_duration_secs: 3600,
            half_open_max_attempts: 1,
        }
    }
}

#[derive(Debug)]
struct CircuitRecord {
    state: CircuitState,
    /// Unix timestamps of failures inside the current window.
    failures: Vec<u64>,
    last_failure_at: Option<u64>,
    opened_at: u64,
    half_open_attempts: u32,
}

impl CircuitRecord {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: Vec::new(),
            last_failure_at: None,
            opened_at: 0,
            half_open_attempts: 0,
        }
    }
}

/// Snapshot of one provider's circuit for the operator API.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failures: usize,
    pub last_failure_at: Option<u64>,
}

/// Per-provider failure state machines behind one lock.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    records: Mutex<HashMap<String, CircuitRecord>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Whether calls to the provider should be skipped right now.
    ///
    /// In OPEN this also performs the timed transition to HALF_OPEN, and in
    /// HALF_OPEN it consumes one of the bounded probe slots.
    pub fn should_skip(&self, provider: &str) -> bool {
        self.should_skip_at(provider, now_unix())
    }

    pub fn should_skip_at(&self, provider: &str, now: u64) -> bool {
        let mut records = self.records.lock().expect("circuit breaker mutex poisoned");
        let rec = records
            .entry(provider.to_string())
            .or_insert_with(CircuitRecord::new);

        match rec.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                if now.saturating_sub(rec.opened_at) >= self.config.open_duration_secs {
                    rec.state = CircuitState::HalfOpen;
                    rec.half_open_attempts = 1;
                    info!(target: "breaker", provider, "circuit HALF_OPEN, probing recovery");
                    false
                } else {
                    let remaining =
                        self.config.open_duration_secs - now.saturating_sub(rec.opened_at);
                    debug!(target: "breaker", provider, remaining, "circuit OPEN, skipping");
                    true
                }
            }
            CircuitState::HalfOpen => {
                if rec.half_open_attempts < self.config.half_open_max_attempts {
                    rec.half_open_attempts += 1;
                    false
                } else {
                    debug!(target: "breaker", provider, "circuit HALF_OPEN, probe budget spent");
                    true
                }
            }
        }
    }

    /// Record a successful call: any non-closed circuit closes and the
    /// failure count resets.
    pub fn record_success(&self, provider: &str) {
        let mut records = self.records.lock().expect("circuit breaker mutex poisoned");
        let rec = records
            .entry(provider.to_string())
            .or_insert_with(CircuitRecord::new);
        rec.failures.clear();
        rec.half_open_attempts = 0;
        if rec.state != CircuitState::Closed {
            rec.state = CircuitState::Closed;
            info!(target: "breaker", provider, "circuit CLOSED, provider recovered");
        }
    }

    pub fn record_failure(&self, provider: &str, kind: FetchErrorKind) {
        self.record_failure_at(provider, kind, now_unix());
    }

    pub fn record_failure_at(&self, provider: &str, kind: FetchErrorKind, now: u64) {
        let mut records = self.records.lock().expect("circuit breaker mutex poisoned");
        let rec = records
            .entry(provider.to_string())
            .or_insert_with(CircuitRecord::new);

        let cutoff = now.saturating_sub(self.config.failure_window_secs);
        rec.failures.retain(|&ts| ts >= cutoff);
        rec.failures.push(now);
        rec.last_failure_at = Some(now);
        metrics::counter!("ingest_provider_failures_total", "kind" => kind.as_str())
            .increment(1);

        warn!(
            target: "breaker",
            provider,
            kind = kind.as_str(),
            failures = rec.failures.len(),
            "provider failure recorded"
        );

        match rec.state {
            CircuitState::Closed => {
                if rec.failures.len() >= self.config.failure_threshold {
                    rec.state = CircuitState::Open;
                    rec.opened_at = now;
                    warn!(
                        target: "breaker",
                        provider,
                        cooldown_secs = self.config.open_duration_secs,
                        "circuit OPEN"
                    );
                }
            }
            CircuitState::HalfOpen => {
                rec.state = CircuitState::Open;
                rec.opened_at = now;
                rec.half_open_attempts = 0;
                warn!(target: "breaker", provider, "probe failed, circuit back to OPEN");
            }
            CircuitState::Open => {}
        }
    }

    /// Operator reset: one provider, or all when `provider` is `None`.
    pub fn reset(&self, provider: Option<&str>) {
        let mut records = self.records.lock().expect("circuit breaker mutex poisoned");
        match provider {
            Some(name) => {
                records.insert(name.to_string(), CircuitRecord::new());
                info!(target: "breaker", provider = name, "circuit reset");
            }
            None => {
                records.clear();
                info!(target: "breaker", "all circuits reset");
            }
        }
    }

    pub fn stats(&self) -> HashMap<String, CircuitSnapshot> {
        let records = self.records.lock().expect("circuit breaker mutex poisoned");
        records
            .iter()
            .map(|(name, rec)| {
                (
                    name.clone(),
                    CircuitSnapshot {
                        state: rec.state,
                        failures: rec.failures.len(),
                        last_failure_at: rec.last_failure_at,
                    },
                )
            })
            .collect()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
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

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig::default())
    }

    #[test]
    fn closed_until_threshold() {
        let b = breaker();
        b.record_failure_at("gnews", FetchErrorKind::ServerError, 100);
        b.record_failure_at("gnews", FetchErrorKind::ServerError, 110);
        assert!(!b.should_skip_at("gnews", 120));
        b.record_failure_at("gnews", FetchErrorKind::Timeout, 120);
        assert!(b.should_skip_at("gnews", 121));
    }

    #[test]
    fn failures_outside_window_do_not_count() {
        let b = breaker();
        b.record_failure_at("gnews", FetchErrorKind::ServerError, 100);
        b.record_failure_at("gnews", FetchErrorKind::ServerError, 150);
        // 500s later, first two have aged out of the 300s window.
        b.record_failure_at("gnews", FetchErrorKind::ServerError, 600);
        assert!(!b.should_skip_at("gnews", 601));
    }

    #[test]
    fn open_transitions_to_half_open_after_cooldown() {
        let b = breaker();
        for ts in [100, 110, 120] {
            b.record_failure_at("gnews", FetchErrorKind::RateLimited, ts);
        }
        assert!(b.should_skip_at("gnews", 120 + 3599));
        // Cooldown elapsed: exactly one probe is allowed.
        assert!(!b.should_skip_at("gnews", 120 + 3600));
        assert!(b.should_skip_at("gnews", 120 + 3601));
    }

    #[test]
    fn probe_success_closes_circuit() {
        let b = breaker();
        for ts in [100, 110, 120] {
            b.record_failure_at("gnews", FetchErrorKind::ServerError, ts);
        }
        assert!(!b.should_skip_at("gnews", 120 + 3600));
        b.record_success("gnews");
        assert!(!b.should_skip_at("gnews", 120 + 3601));
        assert_eq!(b.stats()["gnews"].state, CircuitState::Closed);
    }

    #[test]
    fn probe_failure_reopens_circuit() {
        let b = breaker();
        for ts in [100, 110, 120] {
            b.record_failure_at("gnews", FetchErrorKind::ServerError, ts);
        }
        let probe_at = 120 + 3600;
        assert!(!b.should_skip_at("gnews", probe_at));
        b.record_failure_at("gnews", FetchErrorKind::ServerError, probe_at);
        assert!(b.should_skip_at("gnews", probe_at + 1));
        // Reopened with a fresh cooldown stamped at the probe failure.
        assert!(!b.should_skip_at("gnews", probe_at + 3600));
    }

    #[test]
    fn reset_returns_provider_to_closed() {
        let b = breaker();
        for ts in [100, 110, 120] {
            b.record_failure_at("gnews", FetchErrorKind::ServerError, ts);
        }
        assert!(b.should_skip_at("gnews", 121));
        b.reset(Some("gnews"));
        assert!(!b.should_skip_at("gnews", 122));
    }

    #[test]
    fn providers_are_isolated() {
        let b = breaker();
        for ts in [100, 110, 120] {
            b.record_failure_at("gnews", FetchErrorKind::ServerError, ts);
        }
        assert!(b.should_skip_at("gnews", 121));
        assert!(!b.should_skip_at("newsapi", 121));
    }
}
