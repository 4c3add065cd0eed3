//! Stop points within a leg.

use chrono::{DateTime, Utc};

use super::Coordinate;

/// Prefix of Swiss Location IDs (SLOID) for stop points.
const SLOID_PREFIX: &str = "ch:1:sloid:";

/// A call at a stop: scheduled time, optional live estimate and derived delay.
///
/// # Invariants
///
/// - `delay_minutes` is never negative: early running is reported as 0.
/// - `delay_minutes` is only non-zero when `estimated_time` is present.
#[derive(Debug, Clone, PartialEq)]
pub struct StopPoint {
    pub id: String,
    pub name: String,
    pub platform: Option<String>,
    pub scheduled_time: DateTime<Utc>,
    estimated_time: Option<DateTime<Utc>>,
    delay_minutes: u32,
    pub position: Option<Coordinate>,
}

impl StopPoint {
    /// Create a stop point with a scheduled time only.
    pub fn scheduled(
        id: impl Into<String>,
        name: impl Into<String>,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            platform: None,
            scheduled_time,
            estimated_time: None,
            delay_minutes: 0,
            position: None,
        }
    }

    pub fn with_platform(mut self, platform: Option<String>) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_position(mut self, position: Option<Coordinate>) -> Self {
        self.position = position;
        self
    }

    pub fn estimated_time(&self) -> Option<DateTime<Utc>> {
        self.estimated_time
    }

    pub fn delay_minutes(&self) -> u32 {
        self.delay_minutes
    }

    /// Record a live estimate, deriving the delay in whole minutes.
    pub fn apply_estimate(&mut self, estimated: DateTime<Utc>) {
        let minutes = (estimated - self.scheduled_time).num_minutes().max(0);
        self.estimated_time = Some(estimated);
        self.delay_minutes = u32::try_from(minutes).unwrap_or(u32::MAX);
    }

    /// Identity of the stop place this point belongs to.
    ///
    /// Platform-level references share a place with their parent station:
    /// `ch:1:sloid:7000:4:7` and `ch:1:sloid:7000:2` are both `ch:1:sloid:7000`,
    /// and `8503000:0:7` is `8503000`. Other identifiers are their own place.
    pub fn place_id(&self) -> &str {
        place_id(&self.id)
    }
}

/// Strip platform/quay suffixes from a stop reference.
pub fn place_id(id: &str) -> &str {
    if let Some(rest) = id.strip_prefix(SLOID_PREFIX) {
        let station_len = rest.find(':').unwrap_or(rest.len());
        return &id[..SLOID_PREFIX.len() + station_len];
    }

    match id.split_once(':') {
        Some((head, _)) if !head.is_empty() && head.bytes().all(|b| b.is_ascii_digit()) => head,
        _ => id,
    }
}
