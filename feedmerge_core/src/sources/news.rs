use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    format_cutoff, http_client, read_json, FetchOptions, NewsArticle, NewsOutlet, OfflineMode,
    RawItem, SourceClient, DEFAULT_USER_AGENT,
};
use crate::config::NewsConfig;
use crate::error::FetchError;
use crate::query::SourceId;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<NewsArticle>,
}

/// GNews-style article search.
pub struct NewsClient {
    client: reqwest::Client,
    config: NewsConfig,
    api_key: Option<String>,
    offline: OfflineMode,
}

impl NewsClient {
    pub fn new(
        config: NewsConfig,
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
            .ok_or(FetchError::MissingCredentials(SourceId::News))
    }

    async fn search(
        &self,
        query: &str,
        max: u32,
        options: &FetchOptions,
    ) -> Result<Vec<NewsArticle>, FetchError> {
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.to_string()),
            ("token", self.api_key()?.to_string()),
            ("lang", self.config.lang.clone()),
            ("country", self.config.country.clone()),
            ("max", max.to_string()),
            ("from", format_cutoff(options.date_range)),
        ];
        if let Some(category) = &options.category {
            params.push(("category", category.clone()));
        }

        let response = self
            .client
            .get(format!("{}/search", self.config.base_url))
            .query(&params)
            .send()
            .await?;
        let body: SearchResponse = read_json(SourceId::News, response).await?;
        Ok(body.articles)
    }
}

#[async_trait]
impl SourceClient for NewsClient {
    fn source(&self) -> SourceId {
        SourceId::News
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, query: &str, options: &FetchOptions) -> Result<Vec<RawItem>, FetchError> {
        let limit = options.limit as usize;
        let articles = if self.offline.is_enabled() {
            offline_articles(query)
        } else {
            let max = options.limit.min(self.config.page_size).max(1);
            self.search(query, max, options).await?
        };
        debug!(source = "news", count = articles.len(), "Fetched articles");
        Ok(articles.into_iter().take(limit).map(RawItem::News).collect())
    }

    async fn probe(&self) -> Result<(), FetchError> {
        if self.offline.is_enabled() {
            return Ok(());
        }
        let options = FetchOptions {
            limit: 1,
            date_range: Default::default(),
            category: None,
        };
        self.search("test", 1, &options).await.map(|_| ())
    }
}

/// Fixed payload shaped like a live search response.
fn offline_articles(query: &str) -> Vec<NewsArticle> {
    vec![NewsArticle {
        title: Some(format!("Artificial Intelligence: New Breakthroughs in {}", query)),
        description: Some(format!(
            "The latest developments in {} are reshaping how teams build and ship software.",
            query
        )),
        content: Some(format!(
            "Full coverage of {} with analysis from industry practitioners...",
            query
        )),
        url: Some("https://techcrunch.example/ai-news-2025".to_string()),
        image: Some("https://techcrunch.example/images/ai-news.jpg".to_string()),
        published_at: Some("2025-01-18T10:00:00Z".to_string()),
        source: Some(NewsOutlet {
            name: Some("TechCrunch".to_string()),
            url: Some("https://techcrunch.example".to_string()),
        }),
    }]
}
