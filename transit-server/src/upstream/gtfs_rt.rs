//! GTFS-Realtime trip updates adapter.
//!
//! The delay feed is rate limited upstream, so requests are self-throttled
//! to one per `min_interval`. Early calls are turned away and served from
//! the cache. The poll task waits for the gate to open before calling, so
//! no scheduled poll is lost; request handlers only read the last overlay.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::time::Instant;

use crate::assembler::DelayOverlay;
use crate::availability::{AvailabilityTracker, Source};

use super::error::{UpstreamError, UpstreamErrorKind};
use super::feed::{FeedCache, FeedCacheConfig, FeedResult};
use super::http::OtdClient;
use super::types::{FeedMessage, StopTimeEvent};

/// Minimum spacing between delay feed requests.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(30);

/// Admits at most one request per interval.
#[derive(Debug)]
pub struct RateGate {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Claim the gate at `now`. Returns false if the previous request was
    /// less than `min_interval` ago.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// How long until the gate opens; zero when it is open.
    pub fn remaining(&self, now: Instant) -> Duration {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(prev) => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(prev)),
            None => Duration::ZERO,
        }
    }

    /// Wait until the gate is open. Does not claim it.
    pub async fn ready(&self) {
        loop {
            let wait = self.remaining(Instant::now());
            if wait.is_zero() {
                return;
            }
            tracing::debug!(?wait, "waiting for delay feed gate");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Adapter for the realtime delay feed.
pub struct DelayFeed {
    client: OtdClient,
    endpoint: String,
    tracker: Arc<AvailabilityTracker>,
    gate: RateGate,
    cache: FeedCache<(), DelayOverlay>,
}

impl DelayFeed {
    pub fn new(
        client: OtdClient,
        endpoint: impl Into<String>,
        cache: &FeedCacheConfig,
        tracker: Arc<AvailabilityTracker>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            tracker,
            gate: RateGate::new(MIN_REQUEST_INTERVAL),
            cache: FeedCache::new(Source::Delays, cache),
        }
    }

    /// Last polled overlay. Never fetches.
    pub async fn latest(&self) -> FeedResult<Arc<DelayOverlay>> {
        self.cache.latest(&()).await
    }

    /// Wait for the rate gate, then refresh.
    pub async fn poll(&self) -> FeedResult<Arc<DelayOverlay>> {
        self.gate.ready().await;
        self.refresh().await
    }

    /// Fetch a new overlay if the rate gate allows it.
    ///
    /// A throttled call is served from the cache with a `RateLimited`
    /// error and is not counted as an upstream failure.
    pub async fn refresh(&self) -> FeedResult<Arc<DelayOverlay>> {
        if !self.gate.try_acquire(Instant::now()) {
            tracing::debug!("delay feed throttled locally");
            return self
                .cache
                .fallback(&(), UpstreamErrorKind::RateLimited)
                .await;
        }
        let outcome = self.fetch().await;
        self.cache.settle((), outcome, &self.tracker).await
    }

    async fn fetch(&self) -> Result<DelayOverlay, UpstreamError> {
        let text = self
            .client
            .get_text(&self.endpoint, &[("format", "JSON")])
            .await?;
        let feed: FeedMessage = serde_json::from_str(&text)?;
        let overlay = build_overlay(&feed);
        tracing::debug!(entries = overlay.len(), "delay overlay refreshed");
        Ok(overlay)
    }
}

/// Index every arrival/departure prediction by its scheduled time.
///
/// The scheduled time is recovered as `time - delay`; events lacking
/// either are skipped, as are updates without a route or stop.
pub(crate) fn build_overlay(feed: &FeedMessage) -> DelayOverlay {
    let mut overlay = DelayOverlay::new();
    for update in feed.entity.iter().filter_map(|e| e.trip_update.as_ref()) {
        let Some(line) = update.trip.as_ref().and_then(|t| t.route_id.as_deref()) else {
            continue;
        };
        for stu in &update.stop_time_update {
            let Some(stop) = stu.stop_id.as_deref() else {
                continue;
            };
            for event in [stu.arrival, stu.departure].into_iter().flatten() {
                if let Some((scheduled, delay)) = scheduled_and_delay(event) {
                    overlay.insert(line, stop, scheduled, delay);
                }
            }
        }
    }
    overlay
}

fn scheduled_and_delay(event: StopTimeEvent) -> Option<(DateTime<Utc>, i64)> {
    let delay = event.delay?;
    let estimated = event.time?;
    let scheduled = Utc.timestamp_opt(estimated.checked_sub(delay)?, 0).single()?;
    Some((scheduled, delay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::feed::Freshness;
    use crate::upstream::http::OtdConfig;

    #[test]
    fn gate_spacing() {
        let gate = RateGate::new(Duration::from_secs(30));
        let t0 = Instant::now();
        assert!(gate.try_acquire(t0));
        assert!(!gate.try_acquire(t0 + Duration::from_secs(10)));
        assert!(!gate.try_acquire(t0 + Duration::from_secs(29)));
        assert_eq!(
            gate.remaining(t0 + Duration::from_secs(29)),
            Duration::from_secs(1)
        );
        assert!(gate.try_acquire(t0 + Duration::from_secs(30)));
        assert!(!gate.try_acquire(t0 + Duration::from_secs(31)));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_waits_for_the_gate() {
        let gate = RateGate::new(MIN_REQUEST_INTERVAL);
        let t0 = Instant::now();
        gate.ready().await;
        assert_eq!(Instant::now(), t0);
        assert!(gate.try_acquire(t0));

        tokio::time::sleep(Duration::from_millis(29_600)).await;
        gate.ready().await;
        let waited = Instant::now() - t0;
        assert!(waited >= MIN_REQUEST_INTERVAL);
        assert!(waited < MIN_REQUEST_INTERVAL + Duration::from_secs(1));
        assert!(gate.try_acquire(Instant::now()));
    }

    #[test]
    fn overlay_keys_by_scheduled_time() {
        let json = r#"{"Entity": [
            {"TripUpdate": {
                "Trip": {"TripId": "t1", "RouteId": "IC5"},
                "StopTimeUpdate": [
                    {"StopId": "8503000:0:7", "Departure": {"Delay": 240, "Time": 1710496920}},
                    {"StopId": "8507000:0:5", "Arrival": {"Delay": 60, "Time": 1710500340}},
                    {"StopId": "8500218:0:3", "Arrival": {"Time": 1710498660}},
                    {"Departure": {"Delay": 60, "Time": 1710500340}}
                ]}},
            {"TripUpdate": {"Trip": {"TripId": "t2"}, "StopTimeUpdate": [
                {"StopId": "x", "Departure": {"Delay": 60, "Time": 1710500340}}
            ]}},
            {"Id": "alert-only"}
        ]}"#;
        let feed: FeedMessage = serde_json::from_str(json).unwrap();
        let overlay = build_overlay(&feed);
        assert_eq!(overlay.len(), 2);

        // 2024-03-15T10:02:00Z scheduled, 4 minutes late.
        let scheduled = Utc.timestamp_opt(1_710_496_920 - 240, 0).unwrap();
        assert_eq!(
            overlay.estimate("IC5", "8503000:0:7", scheduled),
            Utc.timestamp_opt(1_710_496_920, 0).single()
        );
    }

    #[tokio::test]
    async fn latest_never_fetches() {
        let tracker = Arc::new(AvailabilityTracker::new(1));
        let client = OtdClient::new(&OtdConfig::new("")).unwrap();
        let feed = DelayFeed::new(
            client,
            "http://127.0.0.1:9/unused",
            &FeedCacheConfig::new(Duration::from_secs(60)),
            Arc::clone(&tracker),
        );

        let result = feed.latest().await;
        assert_eq!(result.freshness, Freshness::Empty);
        assert!(result.value.is_empty());
        assert_eq!(tracker.health(Source::Delays).consecutive_failures, 0);
    }

    #[tokio::test]
    async fn throttled_refresh_serves_cache_without_failure() {
        let tracker = Arc::new(AvailabilityTracker::new(1));
        let client = OtdClient::new(&OtdConfig::new("")).unwrap();
        let feed = DelayFeed::new(
            client,
            "http://127.0.0.1:9/unused",
            &FeedCacheConfig::new(Duration::from_secs(60)),
            Arc::clone(&tracker),
        );
        assert!(feed.gate.try_acquire(Instant::now()));

        let result = feed.refresh().await;
        assert_eq!(result.freshness, Freshness::Empty);
        assert_eq!(result.error, Some(UpstreamErrorKind::RateLimited));
        assert!(tracker.is_available(Source::Delays));
        assert_eq!(tracker.health(Source::Delays).consecutive_failures, 0);
    }
}
