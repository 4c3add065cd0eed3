//! Degradable feed results.
//!
//! Adapters never surface raw errors to callers. A fetch either yields fresh
//! data, the last good value from the cache, or an empty default, and the
//! result says which. Every outcome is also reported to the availability
//! tracker.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;
use serde::Serialize;

use crate::availability::{AvailabilityTracker, Source};

use super::error::{UpstreamError, UpstreamErrorKind};

/// Where a feed value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Fetched just now (or within the cache TTL of a successful fetch)
    Fresh,
    /// The fetch failed; this is the last good value
    Cached,
    /// The fetch failed and nothing was cached
    Empty,
}

/// A value plus how stale it is.
#[derive(Debug, Clone)]
pub struct FeedResult<T> {
    pub value: T,
    pub freshness: Freshness,
    /// Why the value is not fresh, if it isn't.
    pub error: Option<UpstreamErrorKind>,
}

impl<T> FeedResult<T> {
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            freshness: Freshness::Fresh,
            error: None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }

    /// Whether there is anything usable (fresh or cached).
    pub fn has_data(&self) -> bool {
        self.freshness != Freshness::Empty
    }
}

/// Configuration for a feed cache.
#[derive(Debug, Clone)]
pub struct FeedCacheConfig {
    pub ttl: Duration,
    pub max_capacity: u64,
}

impl FeedCacheConfig {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_capacity: 1000,
        }
    }

    pub fn with_max_capacity(mut self, n: u64) -> Self {
        self.max_capacity = n;
        self
    }
}

/// TTL cache of last good values for one source.
pub struct FeedCache<K, V> {
    source: Source,
    entries: MokaCache<K, Arc<V>>,
}

impl<K, V> FeedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Default + Send + Sync + 'static,
{
    pub fn new(source: Source, config: &FeedCacheConfig) -> Self {
        let entries = MokaCache::builder()
            .time_to_live(config.ttl)
            .max_capacity(config.max_capacity)
            .build();
        Self { source, entries }
    }

    /// Last good value for `key`, if it has not expired.
    pub async fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.get(key).await
    }

    /// Turn a fetch outcome into a feed result.
    ///
    /// Success caches the value and resets the source's failure counter.
    /// Failure counts against the source and falls back to the cache.
    pub async fn settle(
        &self,
        key: K,
        outcome: Result<V, UpstreamError>,
        tracker: &AvailabilityTracker,
    ) -> FeedResult<Arc<V>> {
        match outcome {
            Ok(value) => {
                tracker.record_success(self.source);
                let value = Arc::new(value);
                self.entries.insert(key, Arc::clone(&value)).await;
                FeedResult::fresh(value)
            }
            Err(e) => {
                tracing::warn!(source = %self.source, error = %e, "upstream fetch failed");
                tracker.record_failure(self.source);
                self.fallback(&key, e.kind()).await
            }
        }
    }

    /// Last good value for `key` as a feed result, without fetching.
    ///
    /// Reads are not outcomes: the tracker is left alone.
    pub async fn latest(&self, key: &K) -> FeedResult<Arc<V>> {
        match self.entries.get(key).await {
            Some(value) => FeedResult::fresh(value),
            None => FeedResult {
                value: Arc::default(),
                freshness: Freshness::Empty,
                error: None,
            },
        }
    }

    /// Serve the cached value (or an empty default) without fetching.
    ///
    /// Does not touch the tracker.
    pub async fn fallback(&self, key: &K, kind: UpstreamErrorKind) -> FeedResult<Arc<V>> {
        match self.entries.get(key).await {
            Some(value) => FeedResult {
                value,
                freshness: Freshness::Cached,
                error: Some(kind),
            },
            None => FeedResult {
                value: Arc::default(),
                freshness: Freshness::Empty,
                error: Some(kind),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> FeedCache<(), Vec<u32>> {
        FeedCache::new(
            Source::Disruptions,
            &FeedCacheConfig::new(Duration::from_secs(60)),
        )
    }

    #[tokio::test]
    async fn success_is_fresh_and_cached() {
        let tracker = AvailabilityTracker::new(3);
        let cache = cache();

        let result = cache.settle((), Ok(vec![1, 2]), &tracker).await;
        assert!(result.is_fresh());
        assert_eq!(result.error, None);
        assert_eq!(*result.value, vec![1, 2]);
        assert_eq!(cache.get(&()).await.as_deref(), Some(&vec![1, 2]));
    }

    #[tokio::test]
    async fn failure_serves_cached_value() {
        let tracker = AvailabilityTracker::new(3);
        let cache = cache();
        cache.settle((), Ok(vec![7]), &tracker).await;

        let result = cache
            .settle((), Err(UpstreamError::Timeout), &tracker)
            .await;
        assert_eq!(result.freshness, Freshness::Cached);
        assert_eq!(result.error, Some(UpstreamErrorKind::Timeout));
        assert_eq!(*result.value, vec![7]);
        assert_eq!(tracker.health(Source::Disruptions).consecutive_failures, 1);
    }

    #[tokio::test]
    async fn failure_without_cache_is_empty() {
        let tracker = AvailabilityTracker::new(3);
        let cache = cache();

        let result = cache
            .settle((), Err(UpstreamError::malformed("bad")), &tracker)
            .await;
        assert_eq!(result.freshness, Freshness::Empty);
        assert!(!result.has_data());
        assert!(result.value.is_empty());
        assert_eq!(result.error, Some(UpstreamErrorKind::Malformed));
    }

    #[tokio::test]
    async fn repeated_failures_mark_source_unavailable() {
        let tracker = AvailabilityTracker::new(3);
        let cache = cache();
        cache.settle((), Ok(vec![1]), &tracker).await;

        for _ in 0..3 {
            let result = cache
                .settle((), Err(UpstreamError::Timeout), &tracker)
                .await;
            assert_eq!(*result.value, vec![1]);
        }
        assert!(!tracker.is_available(Source::Disruptions));

        cache.settle((), Ok(vec![2]), &tracker).await;
        assert!(tracker.is_available(Source::Disruptions));
    }

    #[tokio::test]
    async fn latest_reads_the_last_good_value() {
        let tracker = AvailabilityTracker::new(1);
        let cache = cache();

        let empty = cache.latest(&()).await;
        assert_eq!(empty.freshness, Freshness::Empty);
        assert_eq!(empty.error, None);

        cache.settle((), Ok(vec![4]), &tracker).await;
        cache
            .settle((), Err(UpstreamError::Timeout), &tracker)
            .await;
        assert!(!tracker.is_available(Source::Disruptions));

        let result = cache.latest(&()).await;
        assert!(result.is_fresh());
        assert_eq!(*result.value, vec![4]);
        assert_eq!(tracker.health(Source::Disruptions).consecutive_failures, 1);
    }
}
