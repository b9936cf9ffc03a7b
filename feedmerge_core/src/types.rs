//! Canonical result and response types shared by every pipeline stage.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::{SearchQuery, SourceId};

/// A single engagement counter. Most providers report integers; ratios
/// such as an upvote ratio are floats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Int(n) => *n as f64,
            MetricValue::Float(f) => *f,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(n) => write!(f, "{}", n),
            MetricValue::Float(x) => write!(f, "{:.2}", x),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(n: i64) -> Self {
        MetricValue::Int(n)
    }
}

impl From<f64> for MetricValue {
    fn from(x: f64) -> Self {
        MetricValue::Float(x)
    }
}

/// A normalized, source-agnostic search result.
///
/// The identifier is deterministic for a given upstream item: the native id
/// for video, a SHA-256 digest of the canonical URL for news and social.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResult {
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub source: SourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Always UTC.
    pub published_at: DateTime<Utc>,
    /// Metric name to value. Which metrics exist depends on the source.
    pub engagement: BTreeMap<String, MetricValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl CanonicalResult {
    pub fn new(
        id: impl Into<String>,
        source: SourceId,
        title: impl Into<String>,
        url: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            url: url.into(),
            source,
            author: None,
            published_at,
            engagement: BTreeMap::new(),
            category: None,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_metric(mut self, name: &str, value: impl Into<MetricValue>) -> Self {
        self.engagement.insert(name.to_string(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn metric(&self, name: &str) -> Option<MetricValue> {
        self.engagement.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetadata {
    pub retrieved_at: DateTime<Utc>,
    pub cache_ttl_secs: u64,
}

/// The merged answer to one search, cached verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResponse {
    pub query: String,
    /// Newest first.
    pub results: Vec<CanonicalResult>,
    pub total_results: usize,
    pub sources: Vec<SourceId>,
    pub metadata: RetrievalMetadata,
}

impl AggregateResponse {
    pub fn new(query: &SearchQuery, results: Vec<CanonicalResult>, cache_ttl_secs: u64) -> Self {
        Self {
            query: query.text().to_string(),
            total_results: results.len(),
            results,
            sources: query.sources().to_vec(),
            metadata: RetrievalMetadata {
                retrieved_at: Utc::now(),
                cache_ttl_secs,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Whether a response was computed or replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOrigin {
    Cache,
    Fresh,
}

/// Result of probing one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub service: SourceId,
    pub status: ConnectionStatus,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Success,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Configured,
    NotConfigured,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub offline: bool,
    pub services: BTreeMap<SourceId, ServiceStatus>,
    pub cache: CacheStats,
    /// `None` when persistence is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence: Option<PersistenceStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceStats {
    pub submitted: u64,
    pub dropped: u64,
    pub written: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> CanonicalResult {
        CanonicalResult::new(
            "abc",
            SourceId::Social,
            "Title",
            "https://reddit.com/r/rust/1",
            Utc.with_ymd_and_hms(2024, 1, 18, 8, 0, 0).unwrap(),
        )
        .with_metric("score", 127i64)
        .with_metric("upvote_ratio", 0.5)
        .with_category("rust")
    }

    #[test]
    fn metrics_serialize_as_plain_numbers() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["engagement"]["score"], 127);
        assert_eq!(json["engagement"]["upvote_ratio"], 0.5);
        assert_eq!(json["source"], "social");
        assert!(json.get("author").is_none());
        assert!(json.get("tags").is_none());
    }

    #[test]
    fn result_survives_json() {
        let original = sample().with_author("someone").with_tag("rust");
        let text = serde_json::to_string(&original).unwrap();
        let back: CanonicalResult = serde_json::from_str(&text).unwrap();
        assert_eq!(back, original);
        assert_eq!(back.metric("score"), Some(MetricValue::Int(127)));
    }

    #[test]
    fn response_counts_results() {
        let q = SearchQuery::builder("rust").build().unwrap();
        let resp = AggregateResponse::new(&q, vec![sample(), sample()], 3600);
        assert_eq!(resp.total_results, 2);
        assert_eq!(resp.query, "rust");
        assert_eq!(resp.sources, SourceId::ALL.to_vec());
        assert_eq!(resp.metadata.cache_ttl_secs, 3600);
    }
}
