//! Domain types for the transport aggregator.
//!
//! This module contains the normalized records every upstream feed is
//! converted into. Types that carry invariants (`StopPoint`, `Trip`) enforce
//! them at construction or mutation time, so code that receives them can
//! trust their validity.

mod disruption;
mod error;
mod geo;
mod leg;
mod location;
mod mode;
mod prediction;
mod stop_point;
mod traffic;
mod trip;

pub use disruption::{Disruption, Severity};
pub use error::DomainError;
pub use geo::Coordinate;
pub use leg::TripLeg;
pub use location::{Location, LocationKind};
pub use mode::TransportMode;
pub use prediction::DelayPrediction;
pub use stop_point::{StopPoint, place_id};
pub use traffic::{
    IncidentSeverity, LevelOfService, TrafficLightStatus, TrafficSituation, TrafficSnapshot,
};
pub use trip::Trip;
