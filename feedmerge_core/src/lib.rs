// src/lib.rs
pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod normalize;
pub mod persist;
pub mod query;
pub mod rate_limit;
pub mod sources;
pub mod types;

pub use aggregator::{Aggregator, AggregatorBuilder};
pub use cache::ResultCache;
pub use config::AggregatorConfig;
pub use error::{
    AggregatorError, ConfigError, FetchError, NormalizationError, RateLimitExceeded, StoreError,
    ValidationError,
};
pub use persist::{
    FileResultStore, MemoryResultStore, PersistenceWriter, ResultStore, StoredResult,
};
pub use query::{DateRange, Fingerprint, SearchQuery, SearchRequest, SourceId};
pub use rate_limit::RateLimiter;
pub use sources::{Credentials, FetchOptions, OfflineMode, RawItem, SourceClient};
pub use types::{
    AggregateResponse, CacheStats, CanonicalResult, ConnectionReport, ConnectionStatus,
    HealthReport, MetricValue, PersistenceStats, ResponseOrigin, ServiceStatus,
};
