//! Validated search queries and their cache fingerprints.
//!
//! A [`SearchQuery`] can only be obtained through [`SearchQueryBuilder::build`]
//! or [`SearchRequest::into_query`], both of which enforce the text and
//! result-cap bounds. Once built the query is immutable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::ValidationError;

pub const MAX_TEXT_CHARS: usize = 500;
pub const MIN_MAX_RESULTS: u32 = 1;
pub const MAX_MAX_RESULTS: u32 = 100;
pub const DEFAULT_MAX_RESULTS: u32 = 50;

/// The closed set of upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    #[serde(alias = "google_news")]
    News,
    #[serde(alias = "youtube")]
    Video,
    #[serde(alias = "reddit")]
    Social,
}

impl SourceId {
    pub const ALL: [SourceId; 3] = [SourceId::News, SourceId::Video, SourceId::Social];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::News => "news",
            SourceId::Video => "video",
            SourceId::Social => "social",
        }
    }

    /// Human-facing provider name, as shown in results and reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceId::News => "Google News",
            SourceId::Video => "YouTube",
            SourceId::Social => "Reddit",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "news" | "google_news" | "gnews" => Ok(SourceId::News),
            "video" | "youtube" => Ok(SourceId::Video),
            "social" | "reddit" => Ok(SourceId::Social),
            other => Err(ValidationError::UnknownSource(other.to_string())),
        }
    }
}

/// How far back a search reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    Day,
    #[default]
    Week,
    Month,
    Year,
}

impl DateRange {
    pub fn days(&self) -> i64 {
        match self {
            DateRange::Day => 1,
            DateRange::Week => 7,
            DateRange::Month => 30,
            DateRange::Year => 365,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DateRange::Day => "day",
            DateRange::Week => "week",
            DateRange::Month => "month",
            DateRange::Year => "year",
        }
    }

    pub fn cutoff(&self, now: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
        now - chrono::Duration::days(self.days())
    }
}

impl FromStr for DateRange {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(DateRange::Day),
            "week" => Ok(DateRange::Week),
            "month" => Ok(DateRange::Month),
            "year" => Ok(DateRange::Year),
            other => Err(ValidationError::UnknownDateRange(other.to_string())),
        }
    }
}

/// Cache key over every field of a normalized query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, enough to tell entries apart in logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    text: String,
    sources: Vec<SourceId>,
    category: Option<String>,
    date_range: DateRange,
    max_results: u32,
}

impl SearchQuery {
    pub fn builder(text: impl Into<String>) -> SearchQueryBuilder {
        SearchQueryBuilder {
            text: text.into(),
            sources: None,
            category: None,
            date_range: DateRange::default(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sources(&self) -> &[SourceId] {
        &self.sources
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
    }

    /// Per-source fetch budget: the cap split evenly, never below one.
    pub fn per_source_limit(&self) -> u32 {
        let enabled = self.sources.len().max(1) as u32;
        (self.max_results / enabled).max(1)
    }

    /// SHA-256 over the canonical JSON encoding of all fields.
    ///
    /// Source order is part of the key: it is echoed back in the response,
    /// so two orderings are two distinct responses.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        match serde_json::to_vec(self) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => hasher.update(format!("{:?}", self).as_bytes()),
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }
}

pub struct SearchQueryBuilder {
    text: String,
    sources: Option<Vec<SourceId>>,
    category: Option<String>,
    date_range: DateRange,
    max_results: u32,
}

impl SearchQueryBuilder {
    pub fn sources(mut self, sources: impl IntoIterator<Item = SourceId>) -> Self {
        self.sources = Some(sources.into_iter().collect());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn date_range(mut self, date_range: DateRange) -> Self {
        self.date_range = date_range;
        self
    }

    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn build(self) -> Result<SearchQuery, ValidationError> {
        let text = self.text.trim().to_string();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let len = text.chars().count();
        if len > MAX_TEXT_CHARS {
            return Err(ValidationError::TextTooLong {
                len,
                max: MAX_TEXT_CHARS,
            });
        }

        if !(MIN_MAX_RESULTS..=MAX_MAX_RESULTS).contains(&self.max_results) {
            return Err(ValidationError::MaxResultsOutOfRange {
                value: self.max_results,
                min: MIN_MAX_RESULTS,
                max: MAX_MAX_RESULTS,
            });
        }

        let mut sources = Vec::with_capacity(SourceId::ALL.len());
        for source in self.sources.unwrap_or_else(|| SourceId::ALL.to_vec()) {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }

        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(SearchQuery {
            text,
            sources,
            category,
            date_range: self.date_range,
            max_results: self.max_results,
        })
    }
}

/// Loosely-typed request as it arrives from a caller (CLI flags, JSON body).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub date_range: Option<String>,
    #[serde(default)]
    pub max_results: Option<u32>,
}

impl SearchRequest {
    /// Validate into a [`SearchQuery`].
    ///
    /// Unknown source names are dropped with a warning rather than failing
    /// the whole request. If every name is unknown the query has no sources
    /// and yields an empty response.
    pub fn into_query(self) -> Result<SearchQuery, ValidationError> {
        let mut builder = SearchQuery::builder(self.query);

        if let Some(names) = self.sources {
            let sources: Vec<SourceId> = names
                .iter()
                .filter_map(|name| match name.parse::<SourceId>() {
                    Ok(source) => Some(source),
                    Err(e) => {
                        warn!(source = %name, error = %e, "Ignoring unknown source");
                        None
                    }
                })
                .collect();
            builder = builder.sources(sources);
        }
        if let Some(category) = self.category {
            builder = builder.category(category);
        }
        if let Some(range) = self.date_range {
            builder = builder.date_range(range.parse()?);
        }
        if let Some(max) = self.max_results {
            builder = builder.max_results(max);
        }

        builder.build()
    }
}
