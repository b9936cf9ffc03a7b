use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    format_cutoff, http_client, read_json, FetchOptions, OfflineMode, RawItem, SourceClient,
    StatCount, VideoId, VideoItem, VideoSnippet, VideoStatistics, DEFAULT_USER_AGENT,
};
use crate::config::VideoConfig;
use crate::error::FetchError;
use crate::query::{DateRange, SourceId};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct StatisticsResponse {
    #[serde(default)]
    items: Vec<StatisticsItem>,
}

#[derive(Debug, Deserialize)]
struct StatisticsItem {
    id: String,
    statistics: Option<VideoStatistics>,
}

/// YouTube Data API style video search, enriched with view/like/comment counts.
pub struct VideoClient {
    client: reqwest::Client,
    config: VideoConfig,
    api_key: Option<String>,
    offline: OfflineMode,
}

impl VideoClient {
    pub fn new(
        config: VideoConfig,
        api_key: Option<String>,
        timeout: Duration,
        offline: OfflineMode,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            client: http_client(timeout, DEFAULT_USER_AGENT)?,
            config,
            api_key,
            offline,
        })
    }

    fn api_key(&self) -> Result<&str, FetchError> {
        self.api_key
            .as_deref()
            .ok_or(FetchError::MissingCredentials(SourceId::Video))
    }

    async fn search(
        &self,
        query: &str,
        max: u32,
        range: DateRange,
    ) -> Result<Vec<VideoItem>, FetchError> {
        let params = [
            ("part", "snippet".to_string()),
            ("q", query.to_string()),
            ("key", self.api_key()?.to_string()),
            ("type", "video".to_string()),
            ("order", "relevance".to_string()),
            ("maxResults", max.to_string()),
            ("relevanceLanguage", self.config.relevance_language.clone()),
            ("publishedAfter", format_cutoff(range)),
        ];
        let response = self
            .client
            .get(format!("{}/search", self.config.base_url))
            .query(&params)
            .send()
            .await?;
        let body: SearchResponse = read_json(SourceId::Video, response).await?;
        Ok(body.items)
    }

    async fn statistics(&self, ids: &[&str]) -> Result<HashMap<String, VideoStatistics>, FetchError> {
        let params = [
            ("part", "statistics".to_string()),
            ("id", ids.join(",")),
            ("key", self.api_key()?.to_string()),
        ];
        let response = self
            .client
            .get(format!("{}/videos", self.config.base_url))
            .query(&params)
            .send()
            .await?;
        let body: StatisticsResponse = read_json(SourceId::Video, response).await?;
        Ok(body
            .items
            .into_iter()
            .filter_map(|item| item.statistics.map(|stats| (item.id, stats)))
            .collect())
    }

    async fn fetch_live(&self, query: &str, options: &FetchOptions) -> Result<Vec<VideoItem>, FetchError> {
        let max = options.limit.min(self.config.page_size).max(1);
        let mut items = self.search(query, max, options.date_range).await?;

        let ids: Vec<&str> = items.iter().filter_map(|i| i.video_id()).collect();
        if ids.is_empty() {
            return Ok(items);
        }

        // Counters are optional: a failed statistics call still returns the videos.
        let stats = self.statistics(&ids).await;
        match stats {
            Ok(mut stats) => {
                for item in &mut items {
                    if let Some(id) = item.video_id().map(str::to_string) {
                        item.statistics = stats.remove(&id);
                    }
                }
            }
            Err(e) => {
                warn!(source = "video", error = %e, "Failed to fetch video statistics");
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl SourceClient for VideoClient {
    fn source(&self) -> SourceId {
        SourceId::Video
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, query: &str, options: &FetchOptions) -> Result<Vec<RawItem>, FetchError> {
        let items = if self.offline.is_enabled() {
            offline_videos(query)
        } else {
            self.fetch_live(query, options).await?
        };
        debug!(source = "video", count = items.len(), "Fetched videos");
        Ok(items
            .into_iter()
            .take(options.limit as usize)
            .map(RawItem::Video)
            .collect())
    }

    async fn probe(&self) -> Result<(), FetchError> {
        if self.offline.is_enabled() {
            return Ok(());
        }
        self.search("test", 1, DateRange::Week).await.map(|_| ())
    }
}

fn offline_video(
    id: &str,
    title: String,
    description: String,
    published_at: &str,
    channel: &str,
    counts: (&str, &str, &str),
) -> VideoItem {
    VideoItem {
        id: Some(VideoId {
            video_id: Some(id.to_string()),
        }),
        snippet: Some(VideoSnippet {
            title: Some(title),
            description: Some(description),
            published_at: Some(published_at.to_string()),
            channel_title: Some(channel.to_string()),
            tags: Vec::new(),
        }),
        statistics: Some(VideoStatistics {
            view_count: Some(StatCount::Text(counts.0.to_string())),
            like_count: Some(StatCount::Text(counts.1.to_string())),
            comment_count: Some(StatCount::Text(counts.2.to_string())),
        }),
    }
}

fn offline_videos(query: &str) -> Vec<VideoItem> {
    vec![
        offline_video(
            "mock-video-1",
            format!("{}: Complete Tutorial 2025", query),
            format!("A step-by-step guide to {} for beginners and experts.", query),
            "2025-01-17T12:00:00Z",
            "TechEdu",
            ("45200", "1240", "89"),
        ),
        offline_video(
            "mock-video-2",
            format!("The Future of {} in Industry", query),
            format!("Analysis of current trends in {} and what comes next.", query),
            "2025-01-16T15:30:00Z",
            "Innovation Hub",
            ("28900", "892", "156"),
        ),
    ]
}
