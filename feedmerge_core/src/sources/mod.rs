//! Per-provider fetch clients.
//!
//! Each client returns provider-shaped [`RawItem`]s; nothing here knows about
//! [`crate::CanonicalResult`]. Raw shapes are deserialized straight from the
//! provider JSON with every field optional, and are only validated by the
//! normalizer.

mod credentials;
mod news;
mod social;
mod video;

pub use credentials::{
    AccessToken, ClientCredentialsSource, Credentials, TokenManager, TokenSource,
};
pub use news::NewsClient;
pub use social::SocialClient;
pub use video::VideoClient;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::SourcesConfig;
use crate::error::FetchError;
use crate::query::{DateRange, SearchQuery, SourceId};

// ============================================================================
// Client contract
// ============================================================================

/// Source-specific knobs for one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Upper bound on items returned by this source
    pub limit: u32,
    pub date_range: DateRange,
    pub category: Option<String>,
}

impl FetchOptions {
    pub fn for_query(query: &SearchQuery) -> Self {
        Self {
            limit: query.per_source_limit(),
            date_range: query.date_range(),
            category: query.category().map(str::to_string),
        }
    }
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    fn source(&self) -> SourceId;

    /// Whether the credentials needed for live calls were supplied.
    fn is_configured(&self) -> bool;

    async fn fetch(&self, query: &str, options: &FetchOptions) -> Result<Vec<RawItem>, FetchError>;

    /// Cheapest call that proves the provider is reachable with our credentials.
    async fn probe(&self) -> Result<(), FetchError>;
}

/// Process-wide switch between live providers and fixed payloads.
///
/// Cloning shares the flag; clients read it on every call.
#[derive(Debug, Clone, Default)]
pub struct OfflineMode(Arc<AtomicBool>);

impl OfflineMode {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Flip the mode for every client built from this flag, without
    /// rebuilding the aggregator.
    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }
}

/// Build one client per provider.
pub fn build_clients(
    config: &SourcesConfig,
    credentials: &Credentials,
    offline: &OfflineMode,
) -> Result<Vec<Arc<dyn SourceClient>>, FetchError> {
    Ok(vec![
        Arc::new(NewsClient::new(
            config.news.clone(),
            credentials.news_api_key.clone(),
            config.timeout(),
            offline.clone(),
        )?),
        Arc::new(VideoClient::new(
            config.video.clone(),
            credentials.video_api_key.clone(),
            config.timeout(),
            offline.clone(),
        )?),
        Arc::new(SocialClient::new(
            config.social.clone(),
            credentials.social_client_id.clone(),
            credentials.social_client_secret.clone(),
            config.timeout(),
            offline.clone(),
        )?),
    ])
}

// ============================================================================
// Raw provider shapes
// ============================================================================

/// One provider item, tagged by origin.
#[derive(Debug, Clone, PartialEq)]
pub enum RawItem {
    News(NewsArticle),
    Video(VideoItem),
    Social(SocialPost),
}

impl RawItem {
    pub fn source(&self) -> SourceId {
        match self {
            RawItem::News(_) => SourceId::News,
            RawItem::Video(_) => SourceId::Video,
            RawItem::Social(_) => SourceId::Social,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub image: Option<String>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<String>,
    pub source: Option<NewsOutlet>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsOutlet {
    pub name: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoItem {
    pub id: Option<VideoId>,
    pub snippet: Option<VideoSnippet>,
    /// Attached from the statistics endpoint; absent when that call failed.
    pub statistics: Option<VideoStatistics>,
}

impl VideoItem {
    pub fn video_id(&self) -> Option<&str> {
        self.id.as_ref().and_then(|id| id.video_id.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoId {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoSnippet {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<String>,
    #[serde(rename = "channelTitle")]
    pub channel_title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoStatistics {
    #[serde(rename = "viewCount")]
    pub view_count: Option<StatCount>,
    #[serde(rename = "likeCount")]
    pub like_count: Option<StatCount>,
    #[serde(rename = "commentCount")]
    pub comment_count: Option<StatCount>,
}

/// Providers send counters as JSON strings or numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatCount {
    Number(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialPost {
    pub id: Option<String>,
    pub title: Option<String>,
    pub selftext: Option<String>,
    pub url: Option<String>,
    pub permalink: Option<String>,
    pub author: Option<String>,
    pub subreddit: Option<String>,
    pub created_utc: Option<f64>,
    pub score: Option<i64>,
    pub num_comments: Option<i64>,
    pub upvote_ratio: Option<f64>,
    pub link_flair_text: Option<String>,
}

// ============================================================================
// HTTP helpers
// ============================================================================

pub(crate) fn http_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(FetchError::Http)
}

pub(crate) const DEFAULT_USER_AGENT: &str = concat!("feedmerge/", env!("CARGO_PKG_VERSION"));

/// Check the status and decode the body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    source: SourceId,
    response: reqwest::Response,
) -> Result<T, FetchError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(FetchError::Unauthorized(source));
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            provider: source,
            status: status.as_u16(),
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| FetchError::Decode(format!("{}: {}", source, e)))
}

/// Provider timestamp format for "published after" filters.
pub(crate) fn format_cutoff(range: DateRange) -> String {
    range
        .cutoff(chrono::Utc::now())
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_flag_is_shared_between_clones() {
        let flag = OfflineMode::new(false);
        let other = flag.clone();
        other.set(true);
        assert!(flag.is_enabled());
    }

    #[test]
    fn stat_counts_accept_strings_and_numbers() {
        let stats: VideoStatistics = serde_json::from_str(
            r#"{"viewCount":"45200","likeCount":1240,"commentCount":"n/a"}"#,
        )
        .unwrap();
        assert_eq!(stats.view_count, Some(StatCount::Text("45200".into())));
        assert_eq!(stats.like_count, Some(StatCount::Number(1240)));
        assert_eq!(stats.comment_count, Some(StatCount::Text("n/a".into())));
    }

    #[test]
    fn video_id_is_nested() {
        let item: VideoItem = serde_json::from_str(
            r#"{"id":{"kind":"youtube#video","videoId":"abc123"},"snippet":{"title":"t"}}"#,
        )
        .unwrap();
        assert_eq!(item.video_id(), Some("abc123"));
        assert!(item.statistics.is_none());
    }

    #[test]
    fn fetch_options_follow_query() {
        let q = SearchQuery::builder("x")
            .sources([SourceId::News, SourceId::Video])
            .max_results(9)
            .category("technology")
            .build()
            .unwrap();
        let opts = FetchOptions::for_query(&q);
        assert_eq!(opts.limit, 4);
        assert_eq!(opts.category.as_deref(), Some("technology"));
    }

    #[test]
    fn cutoff_is_utc_iso() {
        let s = format_cutoff(DateRange::Week);
        assert_eq!(s.len(), 20);
        assert!(s.ends_with('Z'));
    }
}
