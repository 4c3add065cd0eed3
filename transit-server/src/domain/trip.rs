//! Trip type: an ordered, contiguous sequence of legs.

use chrono::{DateTime, Utc};

use super::{Disruption, DomainError, TripLeg};

/// A complete trip.
///
/// # Invariants
///
/// - At least one leg.
/// - Legs chain: each leg's origin is at the same stop place as the previous
///   leg's destination (see [`StopPoint::place_id`](super::StopPoint::place_id)).
/// - `departure_time`/`arrival_time` are the first leg's departure and the
///   last leg's arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    trip_id: String,
    legs: Vec<TripLeg>,
    pub has_disruptions: bool,
    pub disruptions: Vec<Disruption>,
}

impl Trip {
    /// Build a trip, validating the chaining invariant.
    pub fn new(trip_id: impl Into<String>, legs: Vec<TripLeg>) -> Result<Self, DomainError> {
        if legs.is_empty() {
            return Err(DomainError::EmptyTrip);
        }

        for (idx, pair) in legs.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.destination.place_id() != next.origin.place_id() {
                return Err(DomainError::LegsNotContiguous {
                    index: idx + 1,
                    from: prev.destination.id.clone(),
                    to: next.origin.id.clone(),
                });
            }
        }

        Ok(Self {
            trip_id: trip_id.into(),
            legs,
            has_disruptions: false,
            disruptions: Vec::new(),
        })
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub fn legs(&self) -> &[TripLeg] {
        &self.legs
    }

    pub fn departure_time(&self) -> DateTime<Utc> {
        self.legs[0].departure_time()
    }

    pub fn arrival_time(&self) -> DateTime<Utc> {
        self.legs[self.legs.len() - 1].arrival_time()
    }

    /// Total scheduled duration in minutes (at least one).
    pub fn duration_minutes(&self) -> u32 {
        let minutes = (self.arrival_time() - self.departure_time()).num_minutes();
        u32::try_from(minutes.max(1)).unwrap_or(u32::MAX)
    }

    /// Number of changes: non-walking legs minus one, floored at zero.
    pub fn num_transfers(&self) -> usize {
        self.legs
            .iter()
            .filter(|leg| !leg.mode.is_walk())
            .count()
            .saturating_sub(1)
    }

    /// Attach the disruptions affecting this trip.
    pub fn set_disruptions(&mut self, disruptions: Vec<Disruption>) {
        self.has_disruptions = !disruptions.is_empty();
        self.disruptions = disruptions;
    }
}
