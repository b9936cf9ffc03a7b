use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::FetchError;
use crate::query::SourceId;

pub const ENV_NEWS_API_KEY: &str = "GNEWS_API_KEY";
pub const ENV_VIDEO_API_KEY: &str = "YOUTUBE_API_KEY";
pub const ENV_SOCIAL_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const ENV_SOCIAL_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";

/// Refresh this long before the provider-reported expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Provider credentials supplied at process start. Any may be missing.
#[derive(Clone, Default)]
pub struct Credentials {
    pub news_api_key: Option<String>,
    pub video_api_key: Option<String>,
    pub social_client_id: Option<String>,
    pub social_client_secret: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            news_api_key: get(ENV_NEWS_API_KEY),
            video_api_key: get(ENV_VIDEO_API_KEY),
            social_client_id: get(ENV_SOCIAL_CLIENT_ID),
            social_client_secret: get(ENV_SOCIAL_CLIENT_SECRET),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("news_api_key", &mask(&self.news_api_key))
            .field("video_api_key", &mask(&self.video_api_key))
            .field("social_client_id", &mask(&self.social_client_id))
            .field("social_client_secret", &mask(&self.social_client_secret))
            .finish()
    }
}

// ============================================================================
// Bearer tokens
// ============================================================================

#[derive(Clone)]
pub struct AccessToken {
    pub value: String,
    /// `None` when the provider did not report a lifetime.
    pub expires_at: Option<Instant>,
}

impl AccessToken {
    fn is_usable(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) => now + EXPIRY_SKEW < at,
            None => true,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Something that can mint a fresh bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, FetchError>;
}

/// Lazily fetched, cached, renewable bearer token.
///
/// The token is exchanged on first use and reused until it is within a minute
/// of expiry. Callers that see a 401 call [`TokenManager::refresh`] to force a
/// new exchange. Exchanges are serialized: concurrent callers wait for the
/// one in progress instead of starting their own.
pub struct TokenManager {
    source: Box<dyn TokenSource>,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(source: impl TokenSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String, FetchError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_usable(Instant::now()) {
                return Ok(token.value.clone());
            }
            debug!("Bearer token expired, exchanging a new one");
        }
        let fresh = self.source.fetch_token().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    /// Drop `stale` and exchange a new token, unless another caller already
    /// replaced it.
    pub async fn refresh(&self, stale: &str) -> Result<String, FetchError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.value != stale && token.is_usable(Instant::now()) {
                return Ok(token.value.clone());
            }
        }
        debug!("Refreshing rejected bearer token");
        *cached = None;
        let fresh = self.source.fetch_token().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    /// Run `call` with the current token, refreshing and retrying once if the
    /// provider rejects it.
    pub async fn with_token<T, F, Fut>(&self, call: F) -> Result<T, FetchError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let token = self.token().await?;
        match call(token.clone()).await {
            Err(FetchError::Unauthorized(source)) => {
                debug!(source = %source, "Bearer token rejected, retrying with a fresh one");
                let fresh = self.refresh(&token).await?;
                call(fresh).await
            }
            other => other,
        }
    }

    #[cfg(test)]
    async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    #[cfg(test)]
    async fn has_token(&self) -> bool {
        self.cached.lock().await.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth2 client-credentials grant against a token endpoint.
pub struct ClientCredentialsSource {
    client: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
    provider: SourceId,
}

impl ClientCredentialsSource {
    pub fn new(
        client: reqwest::Client,
        auth_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        provider: SourceId,
    ) -> Self {
        Self {
            client,
            auth_url: auth_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            provider,
        }
    }
}

#[async_trait]
impl TokenSource for ClientCredentialsSource {
    async fn fetch_token(&self) -> Result<AccessToken, FetchError> {
        let response = self
            .client
            .post(&self.auth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let body: TokenResponse = super::read_json(self.provider, response).await?;
        debug!(
            source = %self.provider,
            expires_in = ?body.expires_in,
            "Obtained bearer token"
        );
        Ok(AccessToken {
            value: body.access_token,
            expires_at: body
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        })
    }
}
