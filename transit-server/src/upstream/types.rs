//! GTFS-Realtime JSON payload types.
//!
//! The gateway renders the protobuf feed as JSON with PascalCase keys. The
//! camelCase spelling of the reference protobuf-to-JSON mapping is accepted
//! as well. Numeric fields may arrive as strings (64-bit protobuf integers).

use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedMessage {
    #[serde(default, alias = "entity")]
    pub entity: Vec<FeedEntity>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedEntity {
    #[serde(default, alias = "id")]
    pub id: Option<String>,
    #[serde(default, alias = "tripUpdate")]
    pub trip_update: Option<TripUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TripUpdate {
    #[serde(default, alias = "trip")]
    pub trip: Option<TripDescriptor>,
    #[serde(default, alias = "stopTimeUpdate")]
    pub stop_time_update: Vec<StopTimeUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TripDescriptor {
    #[serde(default, alias = "tripId")]
    pub trip_id: Option<String>,
    #[serde(default, alias = "routeId")]
    pub route_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopTimeUpdate {
    #[serde(default, alias = "stopId")]
    pub stop_id: Option<String>,
    #[serde(default, alias = "arrival")]
    pub arrival: Option<StopTimeEvent>,
    #[serde(default, alias = "departure")]
    pub departure: Option<StopTimeEvent>,
}

/// An arrival or departure prediction.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopTimeEvent {
    /// Delay in seconds
    #[serde(default, alias = "delay", deserialize_with = "lenient_i64")]
    pub delay: Option<i64>,
    /// Estimated POSIX time
    #[serde(default, alias = "time", deserialize_with = "lenient_i64")]
    pub time: Option<i64>,
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<NumberOrString>::deserialize(deserializer)? {
        None => None,
        Some(NumberOrString::Int(n)) => Some(n),
        Some(NumberOrString::Float(f)) if f.is_finite() => Some(f.round() as i64),
        Some(NumberOrString::Float(_)) => None,
        Some(NumberOrString::Text(s)) => s.trim().parse().ok(),
    })
}
