//! Road traffic records used for bus/tram delay prediction.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Coordinate;

/// Severity of a road traffic situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentSeverity {
    Minor,
    Moderate,
    Severe,
}

impl IncidentSeverity {
    /// Classify a DATEX II severity or impact value.
    pub fn from_datex(value: &str) -> Self {
        let value = value.trim().to_ascii_lowercase();
        if value.contains("severe")
            || value.contains("danger")
            || value == "highest"
            || value == "high"
        {
            Self::Severe
        } else if value.contains("moderate") || value.contains("normal") || value == "medium" {
            Self::Moderate
        } else {
            Self::Minor
        }
    }
}

/// A road incident (accident, roadworks, closure).
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficSituation {
    pub id: String,
    pub description: String,
    pub position: Option<Coordinate>,
    pub severity: IncidentSeverity,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TrafficSituation {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_time.is_none_or(|start| start <= now)
            && self.end_time.is_none_or(|end| now <= end)
    }
}

/// Level of service: A (free flow) to F (breakdown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LevelOfService {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl LevelOfService {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "E" => Some(Self::E),
            "F" => Some(Self::F),
            _ => None,
        }
    }
}

impl fmt::Display for LevelOfService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
        };
        f.write_str(letter)
    }
}

/// Measurements from a signalised intersection.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficLightStatus {
    pub intersection_id: String,
    pub area_id: String,
    pub name: Option<String>,
    pub level_of_service: Option<LevelOfService>,
    pub spillback_length_meters: Option<f64>,
    pub green_percentage: Option<f64>,
    pub position: Option<Coordinate>,
}

impl TrafficLightStatus {
    /// Name for factor labels, falling back to the intersection id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.intersection_id)
    }
}

/// Everything currently known about road traffic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficSnapshot {
    pub situations: Arc<Vec<TrafficSituation>>,
    pub lights: Arc<Vec<TrafficLightStatus>>,
}

impl TrafficSnapshot {
    pub fn new(
        situations: Arc<Vec<TrafficSituation>>,
        lights: Arc<Vec<TrafficLightStatus>>,
    ) -> Self {
        Self { situations, lights }
    }
}
