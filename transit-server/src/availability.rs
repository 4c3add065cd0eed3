//! Per-source availability tracking.
//!
//! Each upstream source is tracked independently. Failures degrade a source
//! slowly (it only becomes unavailable after `threshold` consecutive
//! failures) while a single success restores it immediately, so one
//! transient failure never interrupts service.
//!
//! The tracker is an owned component: construct one, share it with
//! `Arc<AvailabilityTracker>`, and drive it from adapters or tests.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;

/// Default number of consecutive failures before a source is unavailable.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// An upstream data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Itinerary,
    Delays,
    Disruptions,
    TrafficSituations,
    TrafficLights,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Itinerary,
        Source::Delays,
        Source::Disruptions,
        Source::TrafficSituations,
        Source::TrafficLights,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Itinerary => "itinerary",
            Source::Delays => "delays",
            Source::Disruptions => "disruptions",
            Source::TrafficSituations => "traffic_situations",
            Source::TrafficLights => "traffic_lights",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceHealth {
    pub available: bool,
    pub consecutive_failures: u32,
}

impl Default for SourceHealth {
    fn default() -> Self {
        Self {
            available: true,
            consecutive_failures: 0,
        }
    }
}

/// A flip of a source's availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityChange {
    pub source: Source,
    pub available: bool,
}

/// Tracks the health of every upstream source.
pub struct AvailabilityTracker {
    threshold: u32,
    states: RwLock<HashMap<Source, SourceHealth>>,
    changes: broadcast::Sender<AvailabilityChange>,
}

impl AvailabilityTracker {
    /// Create a tracker; every source starts available.
    ///
    /// A threshold of 0 is treated as 1.
    pub fn new(threshold: u32) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            threshold: threshold.max(1),
            states: RwLock::new(HashMap::new()),
            changes,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record a successful fetch: reset the counter and mark available.
    ///
    /// Returns the change if the source was unavailable.
    pub fn record_success(&self, source: Source) -> Option<AvailabilityChange> {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        let health = states.entry(source).or_default();
        let was_available = health.available;
        health.consecutive_failures = 0;
        health.available = true;
        drop(states);

        if was_available {
            return None;
        }
        tracing::info!(%source, "source recovered");
        self.publish(AvailabilityChange {
            source,
            available: true,
        })
    }

    /// Record a failed fetch: bump the counter, marking the source
    /// unavailable once the counter reaches the threshold.
    ///
    /// Returns the change if the source just became unavailable.
    pub fn record_failure(&self, source: Source) -> Option<AvailabilityChange> {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        let health = states.entry(source).or_default();
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        let failures = health.consecutive_failures;
        let flipped = health.available && failures >= self.threshold;
        if flipped {
            health.available = false;
        }
        drop(states);

        if !flipped {
            tracing::debug!(%source, failures, "source failure recorded");
            return None;
        }
        tracing::warn!(%source, failures, "source marked unavailable");
        self.publish(AvailabilityChange {
            source,
            available: false,
        })
    }

    pub fn is_available(&self, source: Source) -> bool {
        self.health(source).available
    }

    pub fn health(&self, source: Source) -> SourceHealth {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);
        states.get(&source).copied().unwrap_or_default()
    }

    /// Health of every source, in a stable order.
    pub fn snapshot(&self) -> BTreeMap<Source, SourceHealth> {
        Source::ALL
            .into_iter()
            .map(|source| (source, self.health(source)))
            .collect()
    }

    /// Receive availability changes as they happen.
    pub fn subscribe(&self) -> broadcast::Receiver<AvailabilityChange> {
        self.changes.subscribe()
    }

    fn publish(&self, change: AvailabilityChange) -> Option<AvailabilityChange> {
        // No receivers is fine: nobody is listening yet.
        let _ = self.changes.send(change);
        Some(change)
    }
}

impl Default for AvailabilityTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}
