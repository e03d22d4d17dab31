// src/config.rs
//! Pipeline configuration: TOML file with env-var path override, API keys
//! from the environment. A missing config file falls back to the built-in
//! defaults, so a bare checkout runs against the public RSS fallback alone.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::breaker::BreakerConfig;
use crate::failover::ProviderRegistry;
use crate::providers::{
    GNewsProvider, GoogleNewsRssProvider, NewsApiProvider, NewsDataProvider,
};
use crate::quota::{QuotaTracker, QuotaWindow};

pub const ENV_CONFIG_PATH: &str = "NEWSPULSE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/ingest.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Categories fetched each cycle.
    pub categories: Vec<String>,
    /// Failover chain order; unknown names are ignored at registry build.
    pub provider_priority: Vec<String>,
    /// Root for persisted dedup/velocity state.
    pub data_dir: String,
    /// Operator API bind address.
    pub bind_addr: String,
    pub dedup: DedupSettings,
    pub breaker: BreakerSettings,
    /// Per-provider budgets; absent providers are unlimited.
    pub quotas: HashMap<String, QuotaEntry>,
    /// Per-category relevance keyword overrides.
    pub keywords: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupSettings {
    pub initial_capacity: usize,
    pub error_rate: f64,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            initial_capacity: 100_000,
            error_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: usize,
    pub failure_window_secs: u64,
    pub open_duration_secs: u64,
    pub half_open_max_attempts: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let d = BreakerConfig::default();
        Self {
            failure_threshold: d.failure_threshold,
            failure_window_secs: d.failure_window_secs,
            open_duration_secs: d.open_duration_secs,
            half_open_max_attempts: d.half_open_max_attempts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaEntry {
    #[serde(default)]
    pub daily_calls: Option<u64>,
    #[serde(default)]
    pub tokens_per_minute: Option<u64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let quotas = HashMap::from([
            (
                "gnews".to_string(),
                QuotaEntry {
                    daily_calls: Some(100),
                    tokens_per_minute: None,
                },
            ),
            (
                "newsapi".to_string(),
                QuotaEntry {
                    daily_calls: Some(100),
                    tokens_per_minute: None,
                },
            ),
            (
                "newsdata".to_string(),
                QuotaEntry {
                    daily_calls: Some(200),
                    tokens_per_minute: None,
                },
            ),
        ]);
        Self {
            categories: [
                "ai",
                "data-security",
                "data-governance",
                "data-privacy",
                "data-engineering",
                "business-intelligence",
                "business-analytics",
                "customer-data-platform",
                "data-centers",
                "cloud-computing",
                "magazines",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            provider_priority: ["gnews", "newsapi", "newsdata", "google_rss"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            data_dir: "data".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            dedup: DedupSettings::default(),
            breaker: BreakerSettings::default(),
            quotas,
            keywords: HashMap::new(),
        }
    }
}

impl IngestConfig {
    /// Load from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).context("parsing ingest config")?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $NEWSPULSE_CONFIG
    /// 2) config/ingest.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            anyhow::bail!("NEWSPULSE_CONFIG points to non-existent path");
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        info!(target: "config", "no config file found, using built-in defaults");
        Ok(Self::default())
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            failure_window_secs: self.breaker.failure_window_secs,
            open_duration_secs: self.breaker.open_duration_secs,
            half_open_max_attempts: self.breaker.half_open_max_attempts,
        }
    }

    pub fn quota_tracker(&self) -> QuotaTracker {
        let budgets = self.quotas.iter().filter_map(|(name, entry)| {
            let window = match (entry.daily_calls, entry.tokens_per_minute) {
                (Some(limit), _) => QuotaWindow::DailyCalls { limit },
                (None, Some(limit)) => QuotaWindow::TokensPerMinute { limit },
                (None, None) => return None,
            };
            Some((name.clone(), window))
        });
        QuotaTracker::new(budgets.collect::<Vec<_>>())
    }

    /// Build the failover chain in priority order. Keyed providers are only
    /// registered when their key is present; the public RSS fallback is
    /// always appended so the chain never fully starves.
    pub fn build_registry(&self, keys: &ApiKeys) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        let mut rss_registered = false;

        for name in &self.provider_priority {
            match name.as_str() {
                "gnews" => {
                    if let Some(key) = &keys.gnews {
                        registry.register(Arc::new(GNewsProvider::from_api_key(key.clone())));
                    }
                }
                "newsapi" => {
                    if let Some(key) = &keys.newsapi {
                        registry.register(Arc::new(NewsApiProvider::from_api_key(key.clone())));
                    }
                }
                "newsdata" => {
                    if let Some(key) = &keys.newsdata {
                        registry.register(Arc::new(NewsDataProvider::from_api_key(key.clone())));
                    }
                }
                "google_rss" => {
                    registry.register(Arc::new(GoogleNewsRssProvider::new()));
                    rss_registered = true;
                }
                other => {
                    tracing::warn!(target: "config", provider = other, "unknown provider in priority list");
                }
            }
        }

        if !rss_registered {
            registry.register(Arc::new(GoogleNewsRssProvider::new()));
        }
        registry
    }
}

/// Provider API keys, read from the environment (dotenv-friendly).
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub gnews: Option<String>,
    pub newsapi: Option<String>,
    pub newsdata: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        Self {
            gnews: non_empty_env("GNEWS_API_KEY"),
            newsapi: non_empty_env("NEWSAPI_API_KEY"),
            newsdata: non_empty_env("NEWSDATA_API_KEY"),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = IngestConfig::default();
        assert!(cfg.categories.contains(&"ai".to_string()));
        assert_eq!(
            cfg.provider_priority.last().map(String::as_str),
            Some("google_rss")
        );
        assert_eq!(cfg.breaker.failure_threshold, 3);
    }

    #[test]
    fn toml_overrides_merge_with_defaults() {
        let cfg = IngestConfig::from_toml_str(
            r#"
categories = ["ai"]
data_dir = "/var/lib/newspulse"

[quotas.gnews]
daily_calls = 50

[keywords]
ai = ["robotics"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.categories, vec!["ai".to_string()]);
        assert_eq!(cfg.data_dir, "/var/lib/newspulse");
        assert_eq!(cfg.quotas["gnews"].daily_calls, Some(50));
        assert_eq!(cfg.keywords["ai"], vec!["robotics".to_string()]);
        // Untouched sections keep defaults.
        assert_eq!(cfg.breaker.open_duration_secs, 3600);
    }

    #[serial_test::serial]
    #[test]
    fn env_path_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("override.toml");
        std::fs::write(&path, r#"categories = ["data-privacy"]"#).unwrap();

        std::env::set_var(ENV_CONFIG_PATH, path.display().to_string());
        let cfg = IngestConfig::load_default().unwrap();
        std::env::remove_var(ENV_CONFIG_PATH);

        assert_eq!(cfg.categories, vec!["data-privacy".to_string()]);
    }

    #[serial_test::serial]
    #[test]
    fn dangling_env_path_is_an_error() {
        std::env::set_var(ENV_CONFIG_PATH, "/nonexistent/newspulse.toml");
        let result = IngestConfig::load_default();
        std::env::remove_var(ENV_CONFIG_PATH);
        assert!(result.is_err());
    }

    #[test]
    fn registry_without_keys_still_has_rss_fallback() {
        let cfg = IngestConfig::default();
        let registry = cfg.build_registry(&ApiKeys::default());
        assert_eq!(registry.provider_names(), vec!["google_rss"]);
    }

    #[test]
    fn registry_orders_by_priority() {
        let cfg = IngestConfig::default();
        let keys = ApiKeys {
            gnews: Some("k1".into()),
            newsapi: None,
            newsdata: Some("k3".into()),
        };
        let registry = cfg.build_registry(&keys);
        assert_eq!(
            registry.provider_names(),
            vec!["gnews", "newsdata", "google_rss"]
        );
    }
}
