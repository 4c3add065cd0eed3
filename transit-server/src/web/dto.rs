//! Data transfer objects for web requests and responses.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::availability::{Source, SourceHealth};
use crate::domain::{
    Coordinate, DelayPrediction, Disruption, IncidentSeverity, Location, LocationKind, Severity,
    StopPoint, TrafficLightStatus, TrafficSituation, TransportMode, Trip, TripLeg,
};
use crate::prediction::RuleDescription;

/// Query for location search.
#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    /// Free text, at least two characters
    pub query: String,

    /// Maximum results, 1..=50 (default 10)
    pub limit: Option<u32>,
}

/// Request to plan a trip.
#[derive(Debug, Deserialize)]
pub struct TripRequest {
    pub origin_id: String,

    /// Shown for the trip's first stop when upstream gives no name
    #[serde(default)]
    pub origin_name: String,

    pub destination_id: String,

    /// Shown for the trip's last stop when upstream gives no name
    #[serde(default)]
    pub destination_name: String,

    /// Desired departure (defaults to now)
    pub departure_time: Option<DateTime<Utc>>,

    /// Maximum trips, 1..=10 (default 5)
    pub num_results: Option<u32>,

    /// Whether to run delay prediction on bus and tram legs
    #[serde(default = "default_true")]
    pub include_predictions: bool,
}

fn default_true() -> bool {
    true
}

/// Query with an optional result limit.
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

/// Query for disruptions touching a route. Both lists are comma separated.
#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    #[serde(default)]
    pub stop_ids: String,

    #[serde(default)]
    pub line_refs: String,
}

impl RouteQuery {
    pub fn stops(&self) -> Vec<String> {
        split_list(&self.stop_ids)
    }

    pub fn lines(&self) -> Vec<String> {
        split_list(&self.line_refs)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Query for traffic light statuses.
#[derive(Debug, Deserialize)]
pub struct TrafficLightQuery {
    pub area_id: Option<String>,
}

/// A location in search results.
#[derive(Debug, Serialize)]
pub struct LocationDto {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LocationKind,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub locality: Option<String>,
}

impl LocationDto {
    pub fn from_location(location: &Location) -> Self {
        let (latitude, longitude) = split_position(location.position);
        Self {
            id: location.id.clone(),
            name: location.name.clone(),
            kind: location.kind,
            latitude,
            longitude,
            locality: location.locality.clone(),
        }
    }
}

/// A stop within a leg.
#[derive(Debug, Serialize)]
pub struct StopPointDto {
    pub id: String,
    pub name: String,
    pub platform: Option<String>,
    pub scheduled_time: DateTime<Utc>,
    pub estimated_time: Option<DateTime<Utc>>,
    pub delay_minutes: u32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl StopPointDto {
    pub fn from_stop(stop: &StopPoint) -> Self {
        let (latitude, longitude) = split_position(stop.position);
        Self {
            id: stop.id.clone(),
            name: stop.name.clone(),
            platform: stop.platform.clone(),
            scheduled_time: stop.scheduled_time,
            estimated_time: stop.estimated_time(),
            delay_minutes: stop.delay_minutes(),
            latitude,
            longitude,
        }
    }
}

/// Predicted delay for a bus or tram leg.
#[derive(Debug, Serialize)]
pub struct PredictionDto {
    pub predicted_delay_minutes: u32,
    pub confidence_score: f64,
    pub factors: Vec<String>,
    pub is_peak_hour: bool,
    pub prediction_time: DateTime<Utc>,
}

impl PredictionDto {
    pub fn from_prediction(prediction: &DelayPrediction) -> Self {
        Self {
            predicted_delay_minutes: prediction.predicted_delay_minutes,
            confidence_score: prediction.confidence,
            factors: prediction.factors.clone(),
            is_peak_hour: prediction.is_peak_hour,
            prediction_time: prediction.prediction_time,
        }
    }
}

/// One leg of a trip.
#[derive(Debug, Serialize)]
pub struct LegDto {
    pub leg_id: String,
    pub mode: TransportMode,
    pub line_name: Option<String>,
    /// Upstream line reference, as accepted by `line_refs` filters
    pub line_ref: Option<String>,
    pub destination_text: Option<String>,
    pub operator: Option<String>,
    pub origin: StopPointDto,
    pub destination: StopPointDto,
    pub intermediate_stops: Vec<StopPointDto>,
    pub duration_minutes: u32,
    pub has_realtime: bool,
    pub delay_prediction: Option<PredictionDto>,
}

impl LegDto {
    pub fn from_leg(leg: &TripLeg) -> Self {
        Self {
            leg_id: leg.leg_id.clone(),
            mode: leg.mode,
            line_name: leg.line_name.clone(),
            line_ref: leg.line_id.clone(),
            destination_text: leg.destination_text.clone(),
            operator: leg.operator.clone(),
            origin: StopPointDto::from_stop(&leg.origin),
            destination: StopPointDto::from_stop(&leg.destination),
            intermediate_stops: leg
                .intermediate_stops
                .iter()
                .map(StopPointDto::from_stop)
                .collect(),
            duration_minutes: leg.duration_minutes,
            has_realtime: leg.has_realtime,
            delay_prediction: leg.delay_prediction.as_ref().map(PredictionDto::from_prediction),
        }
    }
}

/// A complete trip.
#[derive(Debug, Serialize)]
pub struct TripDto {
    pub trip_id: String,
    pub legs: Vec<LegDto>,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub num_transfers: usize,
    pub has_disruptions: bool,
    pub disruptions: Vec<DisruptionDto>,
}

impl TripDto {
    pub fn from_trip(trip: &Trip, now: DateTime<Utc>) -> Self {
        Self {
            trip_id: trip.trip_id().to_string(),
            legs: trip.legs().iter().map(LegDto::from_leg).collect(),
            departure_time: trip.departure_time(),
            arrival_time: trip.arrival_time(),
            duration_minutes: trip.duration_minutes(),
            num_transfers: trip.num_transfers(),
            has_disruptions: trip.has_disruptions,
            disruptions: trip
                .disruptions
                .iter()
                .map(|d| DisruptionDto::from_disruption(d, now))
                .collect(),
        }
    }
}

/// Response to a trip search.
#[derive(Debug, Serialize)]
pub struct TripSearchResponse {
    pub trips: Vec<TripDto>,
    pub search_time: DateTime<Utc>,
}

/// A disruption with its activity evaluated at response time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisruptionDto {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub affected_lines: Vec<String>,
    pub affected_stops: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl DisruptionDto {
    pub fn from_disruption(disruption: &Disruption, now: DateTime<Utc>) -> Self {
        Self {
            id: disruption.id.clone(),
            title: disruption.title.clone(),
            description: disruption.description.clone(),
            severity: disruption.severity,
            affected_lines: disruption.affected_lines.clone(),
            affected_stops: disruption.affected_stops.clone(),
            start_time: disruption.start_time,
            end_time: disruption.end_time,
            is_active: disruption.is_active_at(now),
        }
    }
}

/// A road traffic situation.
#[derive(Debug, Serialize)]
pub struct TrafficSituationDto {
    pub id: String,
    pub description: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub severity: IncidentSeverity,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl From<&TrafficSituation> for TrafficSituationDto {
    fn from(situation: &TrafficSituation) -> Self {
        let (latitude, longitude) = split_position(situation.position);
        Self {
            id: situation.id.clone(),
            description: situation.description.clone(),
            latitude,
            longitude,
            severity: situation.severity,
            start_time: situation.start_time,
            end_time: situation.end_time,
        }
    }
}

/// Measurements from one intersection.
#[derive(Debug, Serialize)]
pub struct TrafficLightDto {
    pub intersection_id: String,
    pub area_id: String,
    pub name: Option<String>,
    pub level_of_service: Option<String>,
    pub spillback_length_meters: Option<f64>,
    pub green_percentage: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<&TrafficLightStatus> for TrafficLightDto {
    fn from(light: &TrafficLightStatus) -> Self {
        let (latitude, longitude) = split_position(light.position);
        Self {
            intersection_id: light.intersection_id.clone(),
            area_id: light.area_id.clone(),
            name: light.name.clone(),
            level_of_service: light.level_of_service.map(|los| los.to_string()),
            spillback_length_meters: light.spillback_length_meters,
            green_percentage: light.green_percentage,
            latitude,
            longitude,
        }
    }
}

/// Liveness plus per-source availability.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub api_configured: bool,
    pub disruptions_count: usize,
    pub sources: BTreeMap<Source, SourceHealth>,
}

/// Data sources, assumptions and prediction rules.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub data_sources: BTreeMap<&'static str, &'static str>,
    pub assumptions: &'static [&'static str],
    pub prediction_rules: &'static [RuleDescription],
    pub prediction_horizon_minutes: i64,
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn split_position(position: Option<Coordinate>) -> (Option<f64>, Option<f64>) {
    match position {
        Some(c) => (Some(c.latitude), Some(c.longitude)),
        None => (None, None),
    }
}
