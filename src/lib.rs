// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod breaker;
pub mod canonical;
pub mod config;
pub mod dedup;
pub mod driver;
pub mod failover;
pub mod indexer;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod quota;
pub mod store;
pub mod validate;
pub mod velocity;

// ---- Re-exports for stable public API ----
pub use crate::breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use crate::canonical::{canonicalize, url_hash};
pub use crate::config::{ApiKeys, IngestConfig};
pub use crate::dedup::UrlFilter;
pub use crate::failover::{FailoverEngine, ProviderRegistry};
pub use crate::indexer::{DownstreamIndexer, IndexerQueue, NoopIndexer};
pub use crate::orchestrator::{CategoryStats, Orchestrator, RunReport};
pub use crate::providers::{ArticleCandidate, FetchError, FetchErrorKind, NewsProvider};
pub use crate::quota::{QuotaTracker, QuotaWindow};
pub use crate::store::{ArticleStore, FsStateStore, MemoryArticleStore, StateStore};
pub use crate::validate::{StoredArticle, Validator};
pub use crate::velocity::VelocityTracker;
