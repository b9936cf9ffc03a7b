//! Raw provider items to [`CanonicalResult`].
//!
//! Pure functions, no I/O. A malformed item is logged and skipped; it never
//! aborts the rest of the batch.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::NormalizationError;
use crate::query::SourceId;
use crate::sources::{NewsArticle, RawItem, SocialPost, StatCount, VideoItem};
use crate::types::CanonicalResult;

/// Social descriptions longer than this are cut and marked with `...`.
pub const SOCIAL_DESCRIPTION_CHARS: usize = 200;

const ELLIPSIS: &str = "...";
const VIDEO_WATCH_URL: &str = "https://youtube.com/watch?v=";
const SOCIAL_BASE_URL: &str = "https://reddit.com";

/// Normalize one source's batch, dropping items that fail to map.
pub fn normalize(items: Vec<RawItem>, source: SourceId) -> Vec<CanonicalResult> {
    let total = items.len();
    let results: Vec<CanonicalResult> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match normalize_item(item, source) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(source = %source, index, error = %e, "Skipping malformed item");
                None
            }
        })
        .collect();

    debug!(
        source = %source,
        total,
        kept = results.len(),
        "Normalized batch"
    );
    results
}

pub fn normalize_item(item: RawItem, source: SourceId) -> Result<CanonicalResult, NormalizationError> {
    match (item, source) {
        (RawItem::News(article), SourceId::News) => normalize_news(article),
        (RawItem::Video(video), SourceId::Video) => normalize_video(video),
        (RawItem::Social(post), SourceId::Social) => normalize_social(post),
        (item, expected) => Err(NormalizationError::SourceMismatch {
            expected,
            found: item.source(),
        }),
    }
}

fn normalize_news(article: NewsArticle) -> Result<CanonicalResult, NormalizationError> {
    let title = required(article.title, "title")?;
    let url = canonical_url(&required(article.url, "url")?)?;
    let published_at = parse_rfc3339(&required(article.published_at, "publishedAt")?)?;

    let mut result = CanonicalResult::new(
        content_hash(&url),
        SourceId::News,
        clean_text(&title),
        url,
        published_at,
    )
    .with_description(clean_text(article.description.as_deref().unwrap_or_default()))
    // The provider exposes no counters.
    .with_metric("views", 0i64)
    .with_metric("shares", 0i64);

    if let Some(outlet) = article.source.and_then(|s| s.name) {
        result = result.with_author(outlet);
    }
    Ok(result)
}

fn normalize_video(video: VideoItem) -> Result<CanonicalResult, NormalizationError> {
    let id = required(video.video_id().map(str::to_string), "id.videoId")?;
    let snippet = video.snippet.ok_or(NormalizationError::MissingField("snippet"))?;
    let title = required(snippet.title, "snippet.title")?;
    let published_at = parse_rfc3339(&required(snippet.published_at, "snippet.publishedAt")?)?;

    let stats = video.statistics.unwrap_or_default();
    let views = stat_value("views", stats.view_count.as_ref())?;
    let likes = stat_value("likes", stats.like_count.as_ref())?;
    let comments = stat_value("comments", stats.comment_count.as_ref())?;

    let mut result = CanonicalResult::new(
        id.clone(),
        SourceId::Video,
        clean_text(&title),
        format!("{}{}", VIDEO_WATCH_URL, id),
        published_at,
    )
    .with_description(clean_text(snippet.description.as_deref().unwrap_or_default()))
    .with_metric("views", views)
    .with_metric("likes", likes)
    .with_metric("comments", comments);

    if let Some(channel) = snippet.channel_title.filter(|c| !c.trim().is_empty()) {
        result = result.with_author(channel);
    }
    for tag in snippet.tags {
        result = result.with_tag(tag);
    }
    Ok(result)
}

fn normalize_social(post: SocialPost) -> Result<CanonicalResult, NormalizationError> {
    let title = required(post.title, "title")?;
    let url = match post.permalink.filter(|p| !p.trim().is_empty()) {
        Some(permalink) => canonical_url(&format!("{}{}", SOCIAL_BASE_URL, permalink))?,
        None => canonical_url(&required(post.url, "url")?)?,
    };
    let created = post
        .created_utc
        .ok_or(NormalizationError::MissingField("created_utc"))?;
    let published_at = from_epoch_seconds(created)?;

    let body = clean_text(post.selftext.as_deref().unwrap_or_default());

    let mut result = CanonicalResult::new(
        content_hash(&url),
        SourceId::Social,
        clean_text(&title),
        url,
        published_at,
    )
    .with_description(truncate_with_ellipsis(&body, SOCIAL_DESCRIPTION_CHARS))
    .with_metric("score", post.score.unwrap_or(0))
    .with_metric("upvote_ratio", post.upvote_ratio.unwrap_or(0.0))
    .with_metric("comments", post.num_comments.unwrap_or(0));

    if let Some(author) = post.author {
        result = result.with_author(author);
    }
    if let Some(community) = post.subreddit {
        result = result.with_category(community);
    }
    if let Some(flair) = post.link_flair_text.filter(|f| !f.trim().is_empty()) {
        result = result.with_tag(flair);
    }
    Ok(result)
}

// ============================================================================
// Field helpers
// ============================================================================

fn required(value: Option<String>, field: &'static str) -> Result<String, NormalizationError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(NormalizationError::MissingField(field))
}

fn canonical_url(raw: &str) -> Result<String, NormalizationError> {
    url::Url::parse(raw.trim())
        .map(|u| u.to_string())
        .map_err(|_| NormalizationError::InvalidUrl(raw.to_string()))
}

/// SHA-256 hex digest, the identifier for sources without a native id.
pub fn content_hash(canonical_url: &str) -> String {
    hex::encode(Sha256::digest(canonical_url.as_bytes()))
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, NormalizationError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| NormalizationError::InvalidTimestamp(raw.to_string()))
}

fn from_epoch_seconds(secs: f64) -> Result<DateTime<Utc>, NormalizationError> {
    if !secs.is_finite() {
        return Err(NormalizationError::InvalidTimestamp(secs.to_string()));
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(whole, nanos)
        .ok_or_else(|| NormalizationError::InvalidTimestamp(secs.to_string()))
}

/// Coerce a provider counter to an integer. Absent counters are zero.
fn stat_value(name: &'static str, value: Option<&StatCount>) -> Result<i64, NormalizationError> {
    let invalid = |v: String| NormalizationError::InvalidMetric { name, value: v };
    match value {
        None => Ok(0),
        Some(StatCount::Number(n)) => Ok(*n),
        Some(StatCount::Float(f)) if f.is_finite() && f.fract() == 0.0 => Ok(*f as i64),
        Some(StatCount::Float(f)) => Err(invalid(f.to_string())),
        Some(StatCount::Text(s)) if s.trim().is_empty() => Ok(0),
        Some(StatCount::Text(s)) => s.trim().parse::<i64>().map_err(|_| invalid(s.clone())),
    }
}

/// Decode HTML entities, twice for double-encoded provider text.
fn clean_text(text: &str) -> String {
    let mut cleaned = text.trim().to_string();
    for _ in 0..2 {
        let decoded = html_escape::decode_html_entities(&cleaned).into_owned();
        if decoded == cleaned {
            break;
        }
        cleaned = decoded;
    }
    cleaned
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{NewsOutlet, VideoId, VideoSnippet, VideoStatistics};
    use crate::types::MetricValue;
    use chrono::TimeZone;

    fn article(url: &str) -> NewsArticle {
        NewsArticle {
            title: Some("Rust 2024 &amp; beyond".into()),
            description: Some("What&#39;s next".into()),
            url: Some(url.into()),
            published_at: Some("2025-01-18T10:00:00Z".into()),
            source: Some(NewsOutlet {
                name: Some("TechCrunch".into()),
                url: None,
            }),
            ..Default::default()
        }
    }

    fn video(views: Option<StatCount>) -> VideoItem {
        VideoItem {
            id: Some(VideoId {
                video_id: Some("abc123".into()),
            }),
            snippet: Some(VideoSnippet {
                title: Some("Async Rust".into()),
                description: None,
                published_at: Some("2025-01-17T14:00:00+02:00".into()),
                channel_title: Some("RustConf".into()),
                tags: vec!["rust".into()],
            }),
            statistics: Some(VideoStatistics {
                view_count: views,
                like_count: Some(StatCount::Number(12)),
                comment_count: None,
            }),
        }
    }

    fn post(selftext: &str) -> SocialPost {
        SocialPost {
            title: Some("Show and tell".into()),
            selftext: Some(selftext.into()),
            url: Some("https://example.com/linked".into()),
            permalink: Some("/r/rust/comments/abc/show_and_tell/".into()),
            author: Some("ferris".into()),
            subreddit: Some("rust".into()),
            created_utc: Some(1_705_564_800.0),
            score: Some(127),
            num_comments: Some(43),
            upvote_ratio: Some(0.95),
            ..Default::default()
        }
    }

    #[test]
    fn news_id_is_hash_of_url_and_stable() {
        let a = normalize_item(RawItem::News(article("https://n.example/a")), SourceId::News).unwrap();
        let b = normalize_item(RawItem::News(article("https://n.example/a")), SourceId::News).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, content_hash("https://n.example/a"));
        assert_eq!(a.id.len(), 64);
        assert_eq!(a.title, "Rust 2024 & beyond");
        assert_eq!(a.description, "What's next");
        assert_eq!(a.author.as_deref(), Some("TechCrunch"));
        assert_eq!(a.metric("views"), Some(MetricValue::Int(0)));
        assert_eq!(a.metric("shares"), Some(MetricValue::Int(0)));
    }

    #[test]
    fn video_uses_native_id_and_coerces_counts() {
        let r = normalize_item(
            RawItem::Video(video(Some(StatCount::Text("45200".into())))),
            SourceId::Video,
        )
        .unwrap();
        assert_eq!(r.id, "abc123");
        assert_eq!(r.url, "https://youtube.com/watch?v=abc123");
        assert_eq!(r.metric("views"), Some(MetricValue::Int(45200)));
        assert_eq!(r.metric("likes"), Some(MetricValue::Int(12)));
        assert_eq!(r.metric("comments"), Some(MetricValue::Int(0)));
        assert_eq!(r.author.as_deref(), Some("RustConf"));
        assert!(r.tags.contains("rust"));
        // Offset timestamps are converted to UTC.
        assert_eq!(r.published_at, Utc.with_ymd_and_hms(2025, 1, 17, 12, 0, 0).unwrap());
    }

    #[test]
    fn video_without_statistics_defaults_to_zero() {
        let mut v = video(None);
        v.statistics = None;
        let r = normalize_item(RawItem::Video(v), SourceId::Video).unwrap();
        assert_eq!(r.metric("views"), Some(MetricValue::Int(0)));
        assert_eq!(r.metric("likes"), Some(MetricValue::Int(0)));
    }

    #[test]
    fn malformed_counter_drops_the_item() {
        let err = normalize_item(
            RawItem::Video(video(Some(StatCount::Text("lots".into())))),
            SourceId::Video,
        )
        .unwrap_err();
        assert!(matches!(err, NormalizationError::InvalidMetric { name: "views", .. }));
    }

    #[test]
    fn social_uses_permalink_and_truncates() {
        let long = "x".repeat(250);
        let r = normalize_item(RawItem::Social(post(&long)), SourceId::Social).unwrap();
        assert_eq!(r.url, "https://reddit.com/r/rust/comments/abc/show_and_tell/");
        assert_eq!(r.id, content_hash(&r.url));
        assert_eq!(r.description.chars().count(), SOCIAL_DESCRIPTION_CHARS + 3);
        assert!(r.description.ends_with("..."));
        assert_eq!(r.category.as_deref(), Some("rust"));
        assert_eq!(r.metric("score"), Some(MetricValue::Int(127)));
        assert_eq!(r.metric("upvote_ratio"), Some(MetricValue::Float(0.95)));
        assert_eq!(r.metric("comments"), Some(MetricValue::Int(43)));
        assert_eq!(r.published_at, Utc.with_ymd_and_hms(2024, 1, 18, 8, 0, 0).unwrap());
    }

    #[test]
    fn social_description_at_limit_is_untouched() {
        let exact = "é".repeat(SOCIAL_DESCRIPTION_CHARS);
        let r = normalize_item(RawItem::Social(post(&exact)), SourceId::Social).unwrap();
        assert_eq!(r.description, exact);
    }

    #[test]
    fn social_falls_back_to_post_url() {
        let mut p = post("short");
        p.permalink = None;
        let r = normalize_item(RawItem::Social(p), SourceId::Social).unwrap();
        assert_eq!(r.url, "https://example.com/linked");
    }

    #[test]
    fn batch_skips_malformed_items() {
        let mut no_title = article("https://n.example/b");
        no_title.title = None;
        let mut bad_date = article("https://n.example/c");
        bad_date.published_at = Some("yesterday".into());

        let items = vec![
            RawItem::News(article("https://n.example/a")),
            RawItem::News(no_title),
            RawItem::News(bad_date),
            RawItem::Video(video(None)),
            RawItem::News(article("not a url")),
        ];
        let out = normalize(items, SourceId::News);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url, "https://n.example/a");
    }

    #[test]
    fn mismatched_variant_is_rejected() {
        let err = normalize_item(RawItem::News(article("https://n.example/a")), SourceId::Social)
            .unwrap_err();
        assert_eq!(
            err,
            NormalizationError::SourceMismatch {
                expected: SourceId::Social,
                found: SourceId::News
            }
        );
    }
}
