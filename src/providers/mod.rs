// src/providers/mod.rs
pub mod gnews;
pub mod google_rss;
pub mod newsapi;
pub mod newsdata;

use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

pub use gnews::GNewsProvider;
pub use google_rss::GoogleNewsRssProvider;
pub use newsapi::NewsApiProvider;
pub use newsdata::NewsDataProvider;

/// Per-call timeout; a stuck provider must not stall its category task.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw article as fetched from a provider, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleCandidate {
    pub title: String,
    pub description: String,
    pub url: String,
    pub image: Option<String>,
    pub published_at: Option<String>,
    pub source: String,
    pub category: String,
}

/// Failure classification surfaced to the circuit breaker and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    RateLimited,
    ServerError,
    Timeout,
    Network,
    Parse,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::RateLimited => "rate_limited",
            FetchErrorKind::ServerError => "server_error",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Network => "network",
            FetchErrorKind::Parse => "parse",
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged provider failure consumed by the failover loop.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Parse, message)
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        let kind = match status {
            429 | 426 => FetchErrorKind::RateLimited,
            s if s >= 500 => FetchErrorKind::ServerError,
            _ => FetchErrorKind::ServerError,
        };
        Self::new(kind, format!("HTTP {status}"))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            FetchErrorKind::Timeout
        } else {
            FetchErrorKind::Network
        };
        Self::new(kind, e.to_string())
    }
}

/// Uniform fetch capability dispatched through the provider registry.
#[async_trait::async_trait]
pub trait NewsProvider: Send + Sync {
    async fn fetch(&self, category: &str) -> Result<Vec<ArticleCandidate>, FetchError>;
    fn name(&self) -> &'static str;
}

/// Shared HTTP client with the bounded per-call timeout.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceCell<reqwest::Client> = OnceCell::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .expect("building provider http client")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(FetchError::from_status(429).kind, FetchErrorKind::RateLimited);
        assert_eq!(FetchError::from_status(426).kind, FetchErrorKind::RateLimited);
        assert_eq!(FetchError::from_status(503).kind, FetchErrorKind::ServerError);
        assert_eq!(FetchError::from_status(404).kind, FetchErrorKind::ServerError);
    }

    #[test]
    fn error_display_carries_kind() {
        let e = FetchError::new(FetchErrorKind::Timeout, "deadline exceeded");
        assert_eq!(e.to_string(), "timeout: deadline exceeded");
    }
}
