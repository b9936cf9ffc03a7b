// src/error.rs
use std::time::Duration;

use crate::query::SourceId;

/// Malformed search query, rejected before any fetch is issued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("query text must not be empty")]
    EmptyText,

    #[error("query text is {len} characters, the maximum is {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("max_results must be between {min} and {max}, got {value}")]
    MaxResultsOutOfRange { value: u32, min: u32, max: u32 },

    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("unknown date range '{0}'")]
    UnknownDateRange(String),
}

impl ValidationError {
    pub fn code_str(&self) -> &'static str {
        match self {
            ValidationError::EmptyText => "empty_text",
            ValidationError::TextTooLong { .. } => "text_too_long",
            ValidationError::MaxResultsOutOfRange { .. } => "max_results_out_of_range",
            ValidationError::UnknownSource(_) => "unknown_source",
            ValidationError::UnknownDateRange(_) => "unknown_date_range",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded for '{identity}': {limit} requests per window, retry in {}s", retry_after.as_secs())]
pub struct RateLimitExceeded {
    pub identity: String,
    pub limit: u32,
    pub retry_after: Duration,
}

/// Failure of a single source fetch. Never escapes the aggregator.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned status {status}")]
    Status { provider: SourceId, status: u16 },

    #[error("{0} rejected the credentials")]
    Unauthorized(SourceId),

    #[error("missing credentials for {0}")]
    MissingCredentials(SourceId),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn code_str(&self) -> &'static str {
        match self {
            FetchError::Http(_) => "upstream_error",
            FetchError::Status { .. } => "upstream_status",
            FetchError::Unauthorized(_) => "auth_failed",
            FetchError::MissingCredentials(_) => "not_configured",
            FetchError::Timeout(_) => "timeout",
            FetchError::Decode(_) => "parse_error",
        }
    }
}

/// A single raw item that could not be mapped. The item is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("invalid url '{0}'")]
    InvalidUrl(String),

    #[error("metric '{name}' is not a number: '{value}'")]
    InvalidMetric { name: &'static str, value: String },

    #[error("{found} item passed to the {expected} normalizer")]
    SourceMismatch { expected: SourceId, found: SourceId },
}

/// Errors a caller of [`crate::Aggregator::search`] can observe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregatorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),
}

impl AggregatorError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AggregatorError::Validation(e) => e.code_str(),
            AggregatorError::RateLimited(_) => "rate_limited",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {key}: '{value}'")]
    InvalidEnv { key: &'static str, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt store: {0}")]
    Corrupt(String),
    #[error("persist error: {0}")]
    Persist(String),
}
