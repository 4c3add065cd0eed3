//! Resolved locations from the upstream location search.

use serde::Serialize;

use super::Coordinate;

/// What a location refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Stop,
    Address,
    Poi,
    Coordinate,
}

/// A place a trip can start or end at.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub kind: LocationKind,
    pub position: Option<Coordinate>,
    pub locality: Option<String>,
}
