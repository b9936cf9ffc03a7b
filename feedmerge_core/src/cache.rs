//! Fingerprint-keyed response cache with TTL and LRU eviction.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use moka::policy::EvictionPolicy;
use tracing::debug;

use crate::config::CacheConfig;
use crate::query::Fingerprint;
use crate::types::{AggregateResponse, CacheStats};

/// Bounded map from query fingerprint to a previously computed response.
///
/// Entries expire `ttl` after insertion; reads do not extend their life.
/// When full, expired entries are dropped first, then the least recently
/// used one.
pub struct ResultCache {
    ttl: Duration,
    capacity: usize,
    entries: Cache<Fingerprint, AggregateResponse>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity as u64)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self {
            ttl,
            capacity,
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<AggregateResponse> {
        match self.entries.get(fingerprint).await {
            Some(response) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(response)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn put(&self, fingerprint: Fingerprint, response: AggregateResponse) {
        self.entries.insert(fingerprint, response).await;
    }

    /// Return the cached response, or run `init` and cache its output.
    ///
    /// Concurrent callers for the same fingerprint share one `init`; the
    /// flag is true only for the caller whose `init` ran.
    pub async fn get_or_compute<F>(&self, fingerprint: &Fingerprint, init: F) -> (AggregateResponse, bool)
    where
        F: Future<Output = AggregateResponse>,
    {
        let entry = self.entries.entry_by_ref(fingerprint).or_insert_with(init).await;
        let fresh = entry.is_fresh();
        if !fresh {
            debug!(fingerprint = %fingerprint.short(), "Joined in-flight search");
        }
        (entry.into_value(), fresh)
    }

    /// Approximate until pending maintenance has run.
    pub fn len(&self) -> usize {
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            ttl_secs: self.ttl.as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SearchQuery;
    use std::sync::atomic::AtomicUsize;

    fn entry(text: &str) -> (Fingerprint, AggregateResponse) {
        let q = SearchQuery::builder(text).build().unwrap();
        (q.fingerprint(), AggregateResponse::new(&q, Vec::new(), 60))
    }

    #[tokio::test]
    async fn hit_returns_identical_response() {
        let cache = ResultCache::new(Duration::from_secs(60), 10);
        let (fp, resp) = entry("a");
        assert!(cache.get(&fp).await.is_none());
        cache.put(fp.clone(), resp.clone()).await;
        assert_eq!(cache.get(&fp).await, Some(resp));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn reads_do_not_extend_ttl() {
        let cache = ResultCache::new(Duration::from_millis(300), 10);
        let (fp, resp) = entry("a");
        cache.put(fp.clone(), resp).await;

        for _ in 0..2 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(cache.get(&fp).await.is_some());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(cache.get(&fp).await.is_none());
    }

    #[tokio::test]
    async fn least_recently_used_is_evicted_at_capacity() {
        let cache = ResultCache::new(Duration::from_secs(600), 2);
        let (a, ra) = entry("a");
        let (b, rb) = entry("b");
        let (c, rc) = entry("c");

        cache.put(a.clone(), ra).await;
        cache.put(b.clone(), rb).await;
        cache.entries.run_pending_tasks().await;
        // Touch "a" so "b" becomes the LRU entry.
        assert!(cache.get(&a).await.is_some());
        cache.entries.run_pending_tasks().await;
        cache.put(c.clone(), rc).await;
        cache.entries.run_pending_tasks().await;

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a).await.is_some());
        assert!(cache.get(&b).await.is_none());
        assert!(cache.get(&c).await.is_some());
    }

    #[tokio::test]
    async fn expired_entries_go_before_live_ones() {
        let cache = ResultCache::new(Duration::from_millis(400), 2);
        let (a, ra) = entry("a");
        let (b, rb) = entry("b");
        let (c, rc) = entry("c");

        cache.put(a.clone(), ra).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        cache.put(b.clone(), rb).await;
        assert!(cache.get(&a).await.is_some());
        // "a" is the most recently used but expired by the time "c" arrives.
        tokio::time::sleep(Duration::from_millis(300)).await;
        cache.entries.run_pending_tasks().await;
        cache.put(c.clone(), rc).await;
        cache.entries.run_pending_tasks().await;

        assert!(cache.get(&a).await.is_none());
        assert!(cache.get(&b).await.is_some());
        assert!(cache.get(&c).await.is_some());
    }

    #[tokio::test]
    async fn replacing_an_entry_does_not_evict() {
        let cache = ResultCache::new(Duration::from_secs(60), 1);
        let (a, ra) = entry("a");
        cache.put(a.clone(), ra.clone()).await;
        cache.put(a.clone(), ra).await;
        cache.entries.run_pending_tasks().await;
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&a).await.is_some());
    }

    #[tokio::test]
    async fn concurrent_computes_share_one_init() {
        let cache = ResultCache::new(Duration::from_secs(60), 10);
        let (fp, resp) = entry("a");
        let runs = AtomicUsize::new(0);
        let (counter, shared) = (&runs, &resp);
        let init = || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            shared.clone()
        };

        let ((first, first_fresh), (second, second_fresh)) = tokio::join!(
            cache.get_or_compute(&fp, init()),
            cache.get_or_compute(&fp, init())
        );

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert!(first_fresh ^ second_fresh);
        assert_eq!(cache.get(&fp).await, Some(resp));
    }
}
