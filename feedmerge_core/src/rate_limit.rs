//! Fixed-window admission control per caller identity.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::RateLimitConfig;
use crate::error::RateLimitExceeded;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    window_start: Instant,
}

/// Counts admissions per identity inside a fixed window.
///
/// A rejected call does not consume quota. The number of tracked identities
/// is bounded: when full, expired buckets are purged first, then the bucket
/// whose window started earliest is dropped.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    max_identities: usize,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration, max_identities: usize) -> Self {
        Self {
            limit,
            window,
            max_identities: max_identities.max(1),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.per_window, config.window(), config.max_identities)
    }

    pub fn admit(&self, identity: &str) -> Result<(), RateLimitExceeded> {
        self.admit_at(identity, Instant::now())
    }

    pub fn admit_at(&self, identity: &str, now: Instant) -> Result<(), RateLimitExceeded> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);

        if !buckets.contains_key(identity) && buckets.len() >= self.max_identities {
            self.evict(&mut buckets, now);
        }

        let bucket = buckets.entry(identity.to_string()).or_insert(Bucket {
            count: 0,
            window_start: now,
        });

        let elapsed = now.saturating_duration_since(bucket.window_start);
        if elapsed >= self.window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count >= self.limit {
            let retry_after = self
                .window
                .saturating_sub(now.saturating_duration_since(bucket.window_start));
            debug!(caller = %identity, limit = self.limit, "Rate limit exceeded");
            return Err(RateLimitExceeded {
                identity: identity.to_string(),
                limit: self.limit,
                retry_after,
            });
        }

        bucket.count += 1;
        Ok(())
    }

    /// Admissions left for `identity` in its current window.
    pub fn remaining_at(&self, identity: &str, now: Instant) -> u32 {
        let buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        match buckets.get(identity) {
            Some(b) if now.saturating_duration_since(b.window_start) < self.window => {
                self.limit.saturating_sub(b.count)
            }
            _ => self.limit,
        }
    }

    pub fn tracked_identities(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn evict(&self, buckets: &mut HashMap<String, Bucket>, now: Instant) {
        let window = self.window;
        buckets.retain(|_, b| now.saturating_duration_since(b.window_start) < window);

        while buckets.len() >= self.max_identities {
            let oldest = buckets
                .iter()
                .min_by_key(|(_, b)| b.window_start)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    buckets.remove(&key);
                }
                None => break,
            }
        }
    }
}
