use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use feedmerge_core::config::SourcesConfig;
use feedmerge_core::sources::{build_clients, NewsArticle, SocialPost};
use feedmerge_core::{
    Aggregator, AggregatorError, Credentials, FetchError, FetchOptions, MemoryResultStore,
    OfflineMode, PersistenceWriter, RateLimiter, RawItem, ResponseOrigin, ResultStore,
    SearchQuery, SearchRequest, SourceClient, SourceId,
};

struct FakeClient {
    source: SourceId,
    items: Vec<RawItem>,
    fail: bool,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl FakeClient {
    fn new(source: SourceId, items: Vec<RawItem>) -> Self {
        Self {
            source,
            items,
            fail: false,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(source: SourceId) -> Self {
        Self {
            fail: true,
            ..Self::new(source, Vec::new())
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl SourceClient for FakeClient {
    fn source(&self) -> SourceId {
        self.source
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn fetch(&self, _query: &str, _options: &FetchOptions) -> Result<Vec<RawItem>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(FetchError::Status {
                provider: self.source,
                status: 503,
            });
        }
        Ok(self.items.clone())
    }

    async fn probe(&self) -> Result<(), FetchError> {
        Ok(())
    }
}

fn article(slug: &str, published_at: &str) -> RawItem {
    RawItem::News(NewsArticle {
        title: Some(format!("Story {}", slug)),
        url: Some(format!("https://news.example/{}", slug)),
        published_at: Some(published_at.to_string()),
        ..Default::default()
    })
}

fn post(slug: &str, created_utc: f64) -> RawItem {
    RawItem::Social(SocialPost {
        title: Some(format!("Thread {}", slug)),
        permalink: Some(format!("/r/rust/comments/{}/", slug)),
        subreddit: Some("rust".to_string()),
        created_utc: Some(created_utc),
        score: Some(10),
        ..Default::default()
    })
}

fn news_items() -> Vec<RawItem> {
    vec![
        article("a", "2025-01-10T08:00:00Z"),
        article("b", "2025-01-14T08:00:00Z"),
        article("c", "2025-01-12T08:00:00Z"),
    ]
}

fn social_items() -> Vec<RawItem> {
    // 2025-01-11, 2025-01-15, 2025-01-13 at 00:00 UTC
    vec![
        post("x", 1_736_553_600.0),
        post("y", 1_736_899_200.0),
        post("z", 1_736_726_400.0),
    ]
}

fn query(text: &str, sources: &[SourceId], max_results: u32) -> SearchQuery {
    SearchQuery::builder(text)
        .sources(sources.iter().copied())
        .max_results(max_results)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_second_identical_search_is_served_from_cache() {
    let news = FakeClient::new(SourceId::News, news_items());
    let calls = news.calls();
    let agg = Aggregator::builder().client(Arc::new(news)).build();
    let q = query("rust", &[SourceId::News], 10);

    let (first, origin) = agg.search_with_origin("alice", &q).await.unwrap();
    assert_eq!(origin, ResponseOrigin::Fresh);
    let (second, origin) = agg.search_with_origin("alice", &q).await.unwrap();
    assert_eq!(origin, ResponseOrigin::Cache);

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_results_are_newest_first_across_sources() {
    let agg = Aggregator::builder()
        .client(Arc::new(FakeClient::new(SourceId::News, news_items())))
        .client(Arc::new(FakeClient::new(SourceId::Social, social_items())))
        .build();

    let resp = agg
        .search("alice", &query("rust", &[SourceId::News, SourceId::Social], 50))
        .await
        .unwrap();

    assert_eq!(resp.total_results, 6);
    assert!(resp
        .results
        .windows(2)
        .all(|w| w[0].published_at >= w[1].published_at));
    assert_eq!(resp.results[0].title, "Thread y");
    assert_eq!(resp.results[5].title, "Story a");
}

#[tokio::test(start_paused = true)]
async fn test_merge_order_ignores_completion_order() {
    // The source holding the newest items finishes last.
    let agg = Aggregator::builder()
        .client(Arc::new(
            FakeClient::new(SourceId::Social, social_items()).delayed(Duration::from_millis(500)),
        ))
        .client(Arc::new(FakeClient::new(SourceId::News, news_items())))
        .timeout(Duration::from_secs(2))
        .build();

    let resp = agg
        .search("alice", &query("rust", &[SourceId::Social, SourceId::News], 50))
        .await
        .unwrap();

    assert_eq!(resp.total_results, 6);
    assert_eq!(resp.results[0].title, "Thread y");
    assert!(resp
        .results
        .windows(2)
        .all(|w| w[0].published_at >= w[1].published_at));
}

#[tokio::test]
async fn test_results_never_exceed_max_results() {
    let many: Vec<RawItem> = (1..=20)
        .map(|d| article(&d.to_string(), &format!("2025-01-{:02}T00:00:00Z", d)))
        .collect();
    let agg = Aggregator::builder()
        .client(Arc::new(FakeClient::new(SourceId::News, many)))
        .client(Arc::new(FakeClient::new(SourceId::Social, social_items())))
        .build();

    for max in [1, 3, 7, 100] {
        let q = query("rust", &[SourceId::News, SourceId::Social], max);
        let resp = agg.search("alice", &q).await.unwrap();
        assert!(resp.results.len() <= max as usize, "max_results={}", max);
        assert_eq!(resp.total_results, resp.results.len());
    }
}

#[tokio::test]
async fn test_one_failing_source_does_not_fail_the_search() {
    let agg = Aggregator::builder()
        .client(Arc::new(FakeClient::new(SourceId::News, news_items())))
        .client(Arc::new(FakeClient::failing(SourceId::Video)))
        .client(Arc::new(FakeClient::new(SourceId::Social, social_items())))
        .build();

    let resp = agg
        .search("alice", &query("rust", &SourceId::ALL, 50))
        .await
        .unwrap();

    assert_eq!(resp.total_results, 6);
    assert!(resp.results.iter().all(|r| r.source != SourceId::Video));
}

#[tokio::test]
async fn test_all_sources_failing_yields_empty_response() {
    let agg = Aggregator::builder()
        .client(Arc::new(FakeClient::failing(SourceId::News)))
        .client(Arc::new(FakeClient::failing(SourceId::Video)))
        .client(Arc::new(FakeClient::failing(SourceId::Social)))
        .build();

    let resp = agg
        .search("alice", &query("rust", &SourceId::ALL, 50))
        .await
        .unwrap();

    assert!(resp.is_empty());
    assert_eq!(resp.total_results, 0);
    assert_eq!(resp.query, "rust");
}

#[tokio::test]
async fn test_queries_differing_in_max_results_do_not_share_cache() {
    let news = FakeClient::new(SourceId::News, news_items());
    let calls = news.calls();
    let agg = Aggregator::builder().client(Arc::new(news)).build();

    let a = query("rust", &[SourceId::News], 10);
    let b = query("rust", &[SourceId::News], 11);
    assert_ne!(a.fingerprint(), b.fingerprint());

    agg.search("alice", &a).await.unwrap();
    let (_, origin) = agg.search_with_origin("alice", &b).await.unwrap();
    assert_eq!(origin, ResponseOrigin::Fresh);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_offline_news_search_returns_seeded_article() {
    let offline = OfflineMode::new(true);
    let build = || {
        let clients = build_clients(
            &SourcesConfig::default(),
            &Credentials::from_lookup(|_| None),
            &offline,
        )
        .unwrap();
        Aggregator::builder()
            .clients(clients)
            .offline(offline.clone())
            .build()
    };
    let q = query("cloud computing", &[SourceId::News], 5);

    let first = build().search("alice", &q).await.unwrap();
    let second = build().search("alice", &q).await.unwrap();

    assert_eq!(first.total_results, 1);
    let result = &first.results[0];
    assert_eq!(result.source, SourceId::News);
    assert!(result.title.contains("cloud computing"));
    assert_eq!(result.id.len(), 64);
    assert_eq!(result.id, second.results[0].id);
}

#[tokio::test]
async fn test_empty_text_is_rejected_before_any_fetch() {
    let news = FakeClient::new(SourceId::News, news_items());
    let calls = news.calls();
    let agg = Aggregator::builder().client(Arc::new(news)).build();

    let request = SearchRequest {
        query: "   ".to_string(),
        ..Default::default()
    };
    let err = agg.search_request("alice", request).await.unwrap_err();

    assert!(matches!(err, AggregatorError::Validation(_)));
    assert_eq!(err.code_str(), "empty_text");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sixty_first_search_is_rate_limited() {
    let agg = Aggregator::builder()
        .client(Arc::new(FakeClient::new(SourceId::News, news_items())))
        .rate_limiter(RateLimiter::new(60, Duration::from_secs(60), 100))
        .build();
    let q = query("rust", &[SourceId::News], 10);

    for i in 0..60 {
        assert!(agg.search("alice", &q).await.is_ok(), "call {} rejected", i + 1);
    }
    let err = agg.search("alice", &q).await.unwrap_err();
    assert!(matches!(err, AggregatorError::RateLimited(_)));
    assert_eq!(err.code_str(), "rate_limited");

    // Other callers keep their own quota.
    assert!(agg.search("bob", &q).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_identical_searches_fan_out_once() {
    let news = FakeClient::new(SourceId::News, news_items()).delayed(Duration::from_millis(50));
    let calls = news.calls();
    let agg = Aggregator::builder().client(Arc::new(news)).build();
    let q = query("rust", &[SourceId::News], 10);

    let (a, b, c) = tokio::join!(
        agg.search("alice", &q),
        agg.search("bob", &q),
        agg.search("carol", &q)
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a, c.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_slow_source_times_out_without_failing_the_search() {
    let agg = Aggregator::builder()
        .client(Arc::new(FakeClient::new(SourceId::News, news_items())))
        .client(Arc::new(
            FakeClient::new(SourceId::Social, social_items()).delayed(Duration::from_secs(30)),
        ))
        .timeout(Duration::from_millis(100))
        .build();

    let resp = agg
        .search("alice", &query("rust", &[SourceId::News, SourceId::Social], 50))
        .await
        .unwrap();

    assert_eq!(resp.total_results, 3);
    assert!(resp.results.iter().all(|r| r.source == SourceId::News));
}

#[tokio::test]
async fn test_results_are_persisted_in_the_background() {
    let store = Arc::new(MemoryResultStore::new());
    let agg = Aggregator::builder()
        .client(Arc::new(FakeClient::new(SourceId::News, news_items())))
        .persistence(PersistenceWriter::spawn(store.clone(), 8))
        .build();
    let q = query("rust", &[SourceId::News], 2);

    let resp = agg.search("alice", &q).await.unwrap();
    // Cache hit: nothing new to store.
    agg.search("alice", &q).await.unwrap();
    agg.shutdown().await;

    let stored = store.load_all().unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|s| s.query == "rust"));
    assert_eq!(stored[0].result, resp.results[0]);

    let stats = agg.health().persistence.unwrap();
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.written, 2);
}
