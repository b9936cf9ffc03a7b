//! Scatter-gather search across every enabled source.
//!
//! Coordinates rate limiting, caching, request coalescing and the parallel
//! fan-out, then merges the normalized results by recency.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::config::{AggregatorConfig, DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_TIMEOUT_MS};
use crate::error::{AggregatorError, FetchError};
use crate::normalize::normalize;
use crate::persist::{FileResultStore, PersistenceWriter};
use crate::query::{Fingerprint, SearchQuery, SearchRequest, SourceId};
use crate::rate_limit::RateLimiter;
use crate::sources::{build_clients, Credentials, FetchOptions, OfflineMode, SourceClient};
use crate::types::{
    AggregateResponse, CanonicalResult, ConnectionReport, ConnectionStatus, HealthReport,
    ResponseOrigin, ServiceStatus,
};

/// Entry point for searches.
///
/// Holds the only mutable state shared across concurrent calls: the cache
/// (which also coalesces in-flight searches) and the per-caller counters.
pub struct Aggregator {
    clients: BTreeMap<SourceId, Arc<dyn SourceClient>>,
    cache: ResultCache,
    limiter: RateLimiter,
    writer: Option<PersistenceWriter>,
    offline: OfflineMode,
    timeout: Duration,
    probe_timeout: Duration,
}

pub struct AggregatorBuilder {
    clients: Vec<Arc<dyn SourceClient>>,
    cache: Option<ResultCache>,
    limiter: Option<RateLimiter>,
    writer: Option<PersistenceWriter>,
    offline: OfflineMode,
    timeout: Duration,
    probe_timeout: Duration,
}

impl Default for AggregatorBuilder {
    fn default() -> Self {
        Self {
            clients: Vec::new(),
            cache: None,
            limiter: None,
            writer: None,
            offline: OfflineMode::default(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
        }
    }
}

impl AggregatorBuilder {
    /// Register a client. A later client for the same source replaces an
    /// earlier one.
    pub fn client(mut self, client: Arc<dyn SourceClient>) -> Self {
        self.clients.push(client);
        self
    }

    pub fn clients(mut self, clients: impl IntoIterator<Item = Arc<dyn SourceClient>>) -> Self {
        self.clients.extend(clients);
        self
    }

    pub fn cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn persistence(mut self, writer: PersistenceWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn offline(mut self, offline: OfflineMode) -> Self {
        self.offline = offline;
        self
    }

    /// Per-source fetch budget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn build(self) -> Aggregator {
        let defaults = AggregatorConfig::default();
        Aggregator {
            clients: self
                .clients
                .into_iter()
                .map(|c| (c.source(), c))
                .collect(),
            cache: self
                .cache
                .unwrap_or_else(|| ResultCache::from_config(&defaults.cache)),
            limiter: self
                .limiter
                .unwrap_or_else(|| RateLimiter::from_config(&defaults.rate_limit)),
            writer: self.writer,
            offline: self.offline,
            timeout: self.timeout,
            probe_timeout: self.probe_timeout,
        }
    }
}

impl Aggregator {
    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::default()
    }

    /// Wire up the three provider clients, cache, limiter and (optionally)
    /// the file-backed persistence writer.
    ///
    /// Must be called within a Tokio runtime when persistence is enabled.
    pub fn from_config(
        config: &AggregatorConfig,
        credentials: &Credentials,
    ) -> Result<Self, FetchError> {
        let offline = OfflineMode::new(config.offline);
        let clients = build_clients(&config.sources, credentials, &offline)?;

        let mut builder = Self::builder()
            .clients(clients)
            .cache(ResultCache::from_config(&config.cache))
            .rate_limiter(RateLimiter::from_config(&config.rate_limit))
            .offline(offline)
            .timeout(config.sources.timeout())
            .probe_timeout(config.sources.probe_timeout());

        if config.persistence.enabled {
            let store = match &config.persistence.path {
                Some(path) => FileResultStore::new(path),
                None => FileResultStore::new_default(),
            };
            debug!(path = %store.path().display(), "Persisting results");
            builder = builder.persistence(PersistenceWriter::spawn(
                Arc::new(store),
                config.persistence.queue_capacity,
            ));
        }

        Ok(builder.build())
    }

    pub fn offline(&self) -> &OfflineMode {
        &self.offline
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.clients.keys().copied().collect()
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Run `query` on behalf of `caller`.
    ///
    /// Only validation and rate limiting fail the call; source failures just
    /// mean fewer results.
    pub async fn search(
        &self,
        caller: &str,
        query: &SearchQuery,
    ) -> Result<AggregateResponse, AggregatorError> {
        self.search_with_origin(caller, query)
            .await
            .map(|(response, _)| response)
    }

    /// Validate a loosely-typed request, then search. Invalid input is
    /// rejected before any source is called.
    pub async fn search_request(
        &self,
        caller: &str,
        request: SearchRequest,
    ) -> Result<AggregateResponse, AggregatorError> {
        let query = request.into_query()?;
        self.search(caller, &query).await
    }

    /// Like [`Aggregator::search`], also reporting whether the response was
    /// replayed from the cache.
    pub async fn search_with_origin(
        &self,
        caller: &str,
        query: &SearchQuery,
    ) -> Result<(AggregateResponse, ResponseOrigin), AggregatorError> {
        self.limiter.admit(caller)?;

        let fingerprint = query.fingerprint();
        if let Some(response) = self.cache.get(&fingerprint).await {
            debug!(caller = %caller, fingerprint = %fingerprint.short(), "Served from cache");
            return Ok((response, ResponseOrigin::Cache));
        }

        // Identical misses wait on the first caller's fan-out.
        let (response, fresh) = self
            .cache
            .get_or_compute(&fingerprint, self.compute(caller, query, &fingerprint))
            .await;
        let origin = if fresh {
            ResponseOrigin::Fresh
        } else {
            ResponseOrigin::Cache
        };
        Ok((response, origin))
    }

    async fn compute(
        &self,
        caller: &str,
        query: &SearchQuery,
        fingerprint: &Fingerprint,
    ) -> AggregateResponse {
        let start = Instant::now();
        let results = self.fan_out(query).await;
        let response = AggregateResponse::new(query, results, self.cache.ttl().as_secs());

        if let Some(writer) = &self.writer {
            writer.submit(query.text(), response.results.clone());
        }

        info!(
            caller = %caller,
            fingerprint = %fingerprint.short(),
            results = response.total_results,
            duration_ms = start.elapsed().as_millis() as u64,
            "Search completed"
        );
        response
    }

    async fn fan_out(&self, query: &SearchQuery) -> Vec<CanonicalResult> {
        let options = FetchOptions::for_query(query);

        let units: Vec<_> = query
            .sources()
            .iter()
            .filter_map(|source| match self.clients.get(source) {
                Some(client) => Some(Arc::clone(client)),
                None => {
                    warn!(source = %source, "No client registered for source");
                    None
                }
            })
            .map(|client| {
                let options = &options;
                async move { self.fetch_unit(client.as_ref(), query.text(), options).await }
            })
            .collect();

        let mut merged: Vec<CanonicalResult> = futures::future::join_all(units)
            .await
            .into_iter()
            .flatten()
            .collect();

        // Stable, so equal timestamps keep source order.
        merged.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        merged.truncate(query.max_results() as usize);
        merged
    }

    /// One fetch-and-normalize unit. Never fails: errors and timeouts
    /// contribute nothing.
    async fn fetch_unit(
        &self,
        client: &dyn SourceClient,
        text: &str,
        options: &FetchOptions,
    ) -> Vec<CanonicalResult> {
        let source = client.source();
        let start = Instant::now();

        match timeout(self.timeout, client.fetch(text, options)).await {
            Ok(Ok(items)) => {
                let mut results = normalize(items, source);
                results.truncate(options.limit as usize);
                debug!(
                    source = %source,
                    count = results.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Source fetch completed"
                );
                results
            }
            Ok(Err(e)) => {
                warn!(source = %source, error = %e, code = e.code_str(), "Source fetch failed");
                Vec::new()
            }
            Err(_) => {
                let e = FetchError::Timeout(format!("{} after {}ms", source, self.timeout.as_millis()));
                warn!(source = %source, error = %e, code = e.code_str(), "Source fetch failed");
                Vec::new()
            }
        }
    }

    /// Probe every registered source concurrently.
    pub async fn check_connections(&self) -> Vec<ConnectionReport> {
        let probes = self.clients.values().map(|client| async move {
            let start = Instant::now();
            let outcome = timeout(self.probe_timeout, client.probe()).await;
            let response_time_ms = start.elapsed().as_millis() as u64;

            let (status, error) = match outcome {
                Ok(Ok(())) => (ConnectionStatus::Success, None),
                Ok(Err(e)) => (ConnectionStatus::Error, Some(e.to_string())),
                Err(_) => {
                    let e = FetchError::Timeout(format!(
                        "{} connection check after {}ms",
                        client.source(),
                        self.probe_timeout.as_millis()
                    ));
                    (ConnectionStatus::Timeout, Some(e.to_string()))
                }
            };
            ConnectionReport {
                service: client.source(),
                status,
                response_time_ms,
                error,
            }
        });
        futures::future::join_all(probes).await
    }

    pub fn health(&self) -> HealthReport {
        let services = self
            .clients
            .iter()
            .map(|(source, client)| {
                let status = if client.is_configured() {
                    ServiceStatus::Configured
                } else {
                    ServiceStatus::NotConfigured
                };
                (*source, status)
            })
            .collect();

        HealthReport {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            offline: self.offline.is_enabled(),
            services,
            cache: self.cache.stats(),
            persistence: self.writer.as_ref().map(PersistenceWriter::stats),
        }
    }

    /// Flush queued persistence work.
    pub async fn shutdown(&self) {
        if let Some(writer) = &self.writer {
            writer.shutdown().await;
        }
    }
}
