//! Trip leg type.
//!
//! A `TripLeg` is one ride (or walk) from boarding to alighting, with the
//! stops in between in physical order.

use chrono::{DateTime, Utc};

use super::{DelayPrediction, StopPoint, TransportMode};

/// A single leg of a trip.
#[derive(Debug, Clone, PartialEq)]
pub struct TripLeg {
    pub leg_id: String,
    pub mode: TransportMode,
    /// Upstream line reference, used for exact matching against the delay feed.
    pub line_id: Option<String>,
    /// Published line name shown to passengers (e.g. "IC 5", "31").
    pub line_name: Option<String>,
    /// Direction text (e.g. "Zürich HB").
    pub destination_text: Option<String>,
    pub operator: Option<String>,
    pub origin: StopPoint,
    pub destination: StopPoint,
    /// Intermediate calls, in physical stop order.
    pub intermediate_stops: Vec<StopPoint>,
    pub duration_minutes: u32,
    pub has_realtime: bool,
    pub delay_prediction: Option<DelayPrediction>,
}

impl TripLeg {
    /// Create a leg between two stops; duration is derived from the
    /// scheduled times (at least one minute).
    pub fn new(
        leg_id: impl Into<String>,
        mode: TransportMode,
        origin: StopPoint,
        destination: StopPoint,
    ) -> Self {
        let minutes = (destination.scheduled_time - origin.scheduled_time).num_minutes();
        Self {
            leg_id: leg_id.into(),
            mode,
            line_id: None,
            line_name: None,
            destination_text: None,
            operator: None,
            origin,
            destination,
            intermediate_stops: Vec::new(),
            duration_minutes: u32::try_from(minutes.max(1)).unwrap_or(u32::MAX),
            has_realtime: false,
            delay_prediction: None,
        }
    }

    pub fn departure_time(&self) -> DateTime<Utc> {
        self.origin.scheduled_time
    }

    pub fn arrival_time(&self) -> DateTime<Utc> {
        self.destination.scheduled_time
    }

    /// All stops of the leg in physical order: origin, intermediates, destination.
    pub fn stops(&self) -> impl Iterator<Item = &StopPoint> {
        std::iter::once(&self.origin)
            .chain(self.intermediate_stops.iter())
            .chain(std::iter::once(&self.destination))
    }

    /// Mutable access to all stops in physical order.
    pub fn stops_mut(&mut self) -> impl Iterator<Item = &mut StopPoint> {
        std::iter::once(&mut self.origin)
            .chain(self.intermediate_stops.iter_mut())
            .chain(std::iter::once(&mut self.destination))
    }
}
