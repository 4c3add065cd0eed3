//! Upstream feed adapters.
//!
//! Five feeds sit behind the open transport data gateway:
//! - OJP journey planner (itineraries and location search, XML)
//! - GTFS-Realtime trip updates (live delays, JSON)
//! - SIRI-SX situation exchange (service disruptions, XML)
//! - DATEX II traffic situations (road incidents, SOAP)
//! - OCIT-C traffic light snippets (intersection load, JSON)
//!
//! Adapters absorb failures: callers get a [`FeedResult`] describing how
//! fresh the data is, and the [`AvailabilityTracker`] hears about every
//! outcome.

pub mod datex;
pub mod error;
pub mod feed;
pub mod gtfs_rt;
pub mod http;
pub mod ocit;
pub mod ojp;
pub mod siri_sx;
pub mod types;
mod xml;

use std::sync::Arc;

use crate::availability::{AvailabilityTracker, Source};
use crate::config::AppConfig;
use crate::domain::TrafficSnapshot;

pub use datex::SituationFeed;
pub use error::{ConversionError, UpstreamError, UpstreamErrorKind};
pub use feed::{FeedCache, FeedCacheConfig, FeedResult, Freshness};
pub use gtfs_rt::{DelayFeed, RateGate};
pub use http::{OtdClient, OtdConfig};
pub use ocit::LightFeed;
pub use ojp::{Itinerary, ItineraryResponse, OjpAdapter, TripQuery};
pub use siri_sx::DisruptionFeed;

/// All upstream adapters, sharing one HTTP client and one tracker.
pub struct Feeds {
    pub itinerary: OjpAdapter,
    pub delays: DelayFeed,
    pub disruptions: DisruptionFeed,
    pub situations: SituationFeed,
    pub lights: LightFeed,
    tracker: Arc<AvailabilityTracker>,
}

impl Feeds {
    pub fn new(
        config: &AppConfig,
        tracker: Arc<AvailabilityTracker>,
    ) -> Result<Self, UpstreamError> {
        let client = OtdClient::new(
            &OtdConfig::new(config.api_key.clone()).with_timeout(config.upstream_timeout),
        )?;

        Ok(Self {
            itinerary: OjpAdapter::new(
                client.clone(),
                config.ojp_endpoint.clone(),
                &FeedCacheConfig::new(config.cache_ttl_routes),
                Arc::clone(&tracker),
            ),
            delays: DelayFeed::new(
                client.clone(),
                config.gtfs_rt_endpoint.clone(),
                &FeedCacheConfig::new(config.cache_ttl_delays).with_max_capacity(1),
                Arc::clone(&tracker),
            ),
            disruptions: DisruptionFeed::new(
                client.clone(),
                config.siri_sx_endpoint.clone(),
                &FeedCacheConfig::new(config.cache_ttl_disruptions).with_max_capacity(1),
                Arc::clone(&tracker),
            ),
            situations: SituationFeed::new(
                client.clone(),
                config.traffic_situations_endpoint.clone(),
                &FeedCacheConfig::new(config.cache_ttl_traffic).with_max_capacity(1),
                Arc::clone(&tracker),
            ),
            lights: LightFeed::new(
                client,
                config.traffic_lights_base.clone(),
                &FeedCacheConfig::new(config.cache_ttl_traffic).with_max_capacity(1),
                Arc::clone(&tracker),
            ),
            tracker,
        })
    }

    /// Road traffic as of the last polls.
    ///
    /// Returns `None` when both traffic sources are unavailable; predictions
    /// are skipped rather than computed from stale data.
    pub async fn traffic_snapshot(&self) -> Option<TrafficSnapshot> {
        let (situations, lights) = futures::join!(self.situations.latest(), self.lights.latest());
        let any_available = self.tracker.is_available(Source::TrafficSituations)
            || self.tracker.is_available(Source::TrafficLights);
        if !any_available {
            tracing::debug!("traffic sources unavailable; skipping predictions");
            return None;
        }
        Some(TrafficSnapshot::new(situations.value, lights.value))
    }

    pub fn tracker(&self) -> &Arc<AvailabilityTracker> {
        &self.tracker
    }
}
