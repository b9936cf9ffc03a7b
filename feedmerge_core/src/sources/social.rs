use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    http_client, read_json, ClientCredentialsSource, FetchOptions, OfflineMode, RawItem,
    SocialPost, SourceClient, TokenManager,
};
use crate::config::SocialConfig;
use crate::error::FetchError;
use crate::query::{DateRange, SourceId};

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: SocialPost,
}

/// Reddit-style forum search across a fixed set of communities.
///
/// Uses an application-only bearer token owned by this client.
pub struct SocialClient {
    client: reqwest::Client,
    config: SocialConfig,
    tokens: Option<TokenManager>,
    offline: OfflineMode,
}

impl SocialClient {
    pub fn new(
        config: SocialConfig,
        client_id: Option<String>,
        client_secret: Option<String>,
        timeout: Duration,
        offline: OfflineMode,
    ) -> Result<Self, FetchError> {
        let client = http_client(timeout, &config.user_agent)?;
        let tokens = match (client_id, client_secret) {
            (Some(id), Some(secret)) => Some(TokenManager::new(ClientCredentialsSource::new(
                client.clone(),
                config.auth_url.clone(),
                id,
                secret,
                SourceId::Social,
            ))),
            _ => None,
        };
        Ok(Self {
            client,
            config,
            tokens,
            offline,
        })
    }

    fn tokens(&self) -> Result<&TokenManager, FetchError> {
        self.tokens
            .as_ref()
            .ok_or(FetchError::MissingCredentials(SourceId::Social))
    }

    /// Exchange (or reuse) the bearer token.
    pub async fn authenticate(&self) -> Result<(), FetchError> {
        self.tokens()?.token().await.map(|_| ())
    }

    async fn search_community(
        &self,
        community: &str,
        query: &str,
        limit: u32,
        range: DateRange,
    ) -> Result<Vec<SocialPost>, FetchError> {
        self.tokens()?
            .with_token(move |token| self.request_community(token, community, query, limit, range))
            .await
    }

    async fn request_community(
        &self,
        token: String,
        community: &str,
        query: &str,
        limit: u32,
        range: DateRange,
    ) -> Result<Vec<SocialPost>, FetchError> {
        let params = [
            ("q", query.to_string()),
            ("sort", self.config.sort.clone()),
            ("restrict_sr", "true".to_string()),
            ("limit", limit.to_string()),
            ("t", range.as_str().to_string()),
        ];
        let response = self
            .client
            .get(format!("{}/r/{}/search", self.config.base_url, community))
            .bearer_auth(token)
            .query(&params)
            .send()
            .await?;
        let listing: Listing = read_json(SourceId::Social, response).await?;
        Ok(listing.data.children.into_iter().map(|c| c.data).collect())
    }

    async fn fetch_live(&self, query: &str, options: &FetchOptions) -> Result<Vec<SocialPost>, FetchError> {
        // A bad token fails every community, so fail the source once up front.
        self.authenticate().await?;

        let limit = self.config.per_community_limit.min(options.limit).max(1);
        let searches = self.config.communities.iter().map(|community| async move {
            let result = self
                .search_community(community, query, limit, options.date_range)
                .await;
            (community, result)
        });

        let mut posts = Vec::new();
        for (community, result) in futures::future::join_all(searches).await {
            match result {
                Ok(found) => posts.extend(found),
                Err(e) => {
                    warn!(source = "social", community = %community, error = %e, "Community search failed");
                }
            }
        }
        Ok(posts)
    }
}

#[async_trait]
impl SourceClient for SocialClient {
    fn source(&self) -> SourceId {
        SourceId::Social
    }

    fn is_configured(&self) -> bool {
        self.tokens.is_some()
    }

    async fn fetch(&self, query: &str, options: &FetchOptions) -> Result<Vec<RawItem>, FetchError> {
        let posts = if self.offline.is_enabled() {
            offline_posts(query)
        } else {
            self.fetch_live(query, options).await?
        };
        debug!(source = "social", count = posts.len(), "Fetched posts");
        let cap = self.config.max_items.min(options.limit as usize);
        Ok(posts.into_iter().take(cap).map(RawItem::Social).collect())
    }

    async fn probe(&self) -> Result<(), FetchError> {
        if self.offline.is_enabled() {
            return Ok(());
        }
        self.authenticate().await
    }
}

fn offline_posts(query: &str) -> Vec<SocialPost> {
    vec![
        SocialPost {
            id: Some("mock1".to_string()),
            title: Some(format!("[D] What are the best libraries for {}?", query)),
            selftext: Some(format!(
                "I'm starting a project on {} and looking for advice on which libraries to use. \
                 So far I've looked at a few options but I'd like to hear from people who have \
                 shipped something with them in production.",
                query
            )),
            url: Some("https://reddit.com/r/MachineLearning/mock-post-1".to_string()),
            permalink: None,
            author: Some("AIResearcher".to_string()),
            subreddit: Some("MachineLearning".to_string()),
            created_utc: Some(1_705_564_800.0),
            score: Some(127),
            num_comments: Some(43),
            upvote_ratio: Some(0.95),
            link_flair_text: Some("Discussion".to_string()),
        },
        SocialPost {
            id: Some("mock2".to_string()),
            title: Some(format!("Best practices for {} in Python", query)),
            selftext: Some(format!(
                "After 3 years working with {}, here are the lessons I learned...",
                query
            )),
            url: Some("https://reddit.com/r/programming/mock-post-2".to_string()),
            permalink: None,
            author: Some("DevExpert".to_string()),
            subreddit: Some("programming".to_string()),
            created_utc: Some(1_705_478_400.0),
            score: Some(89),
            num_comments: Some(21),
            upvote_ratio: Some(0.91),
            link_flair_text: None,
        },
    ]
}
