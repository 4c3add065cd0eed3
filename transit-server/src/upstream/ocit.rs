//! OCIT-C traffic light adapter.
//!
//! The REST API lists areas, then serves measurement snippets per area. The
//! snippet shape varies between deployments, so fields are read from a
//! `serde_json::Value` with fallbacks rather than from fixed structs.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::availability::{AvailabilityTracker, Source};
use crate::domain::{Coordinate, LevelOfService, TrafficLightStatus};

use super::error::UpstreamError;
use super::feed::{FeedCache, FeedCacheConfig, FeedResult};
use super::http::OtdClient;

/// Concurrent snippet requests.
const AREA_CONCURRENCY: usize = 4;

/// Adapter for traffic light measurements across all areas.
pub struct LightFeed {
    client: OtdClient,
    base_url: String,
    tracker: Arc<AvailabilityTracker>,
    cache: FeedCache<(), Vec<TrafficLightStatus>>,
}

impl LightFeed {
    pub fn new(
        client: OtdClient,
        base_url: impl Into<String>,
        cache: &FeedCacheConfig,
        tracker: Arc<AvailabilityTracker>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tracker,
            cache: FeedCache::new(Source::TrafficLights, cache),
        }
    }

    /// Last polled lights. Never fetches.
    pub async fn latest(&self) -> FeedResult<Arc<Vec<TrafficLightStatus>>> {
        self.cache.latest(&()).await
    }

    pub async fn refresh(&self) -> FeedResult<Arc<Vec<TrafficLightStatus>>> {
        let outcome = self.fetch_all().await;
        self.cache.settle((), outcome, &self.tracker).await
    }

    async fn fetch_all(&self) -> Result<Vec<TrafficLightStatus>, UpstreamError> {
        let areas_url = format!("{}/areas", self.base_url);
        let text = self.client.get_text(&areas_url, &[]).await?;
        let areas = parse_areas(&serde_json::from_str(&text)?);
        if areas.is_empty() {
            return Ok(Vec::new());
        }

        let results: Vec<_> = stream::iter(areas)
            .map(|area| async move {
                let outcome = self.fetch_area(&area).await;
                (area, outcome)
            })
            .buffered(AREA_CONCURRENCY)
            .collect()
            .await;

        let mut lights = Vec::new();
        let mut last_error = None;
        let mut succeeded = 0usize;
        for (area, outcome) in results {
            match outcome {
                Ok(mut area_lights) => {
                    succeeded += 1;
                    lights.append(&mut area_lights);
                }
                Err(e) => {
                    tracing::warn!(area = %area, error = %e, "traffic light area failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => {
                tracing::debug!(
                    areas = succeeded,
                    lights = lights.len(),
                    "traffic lights refreshed"
                );
                Ok(lights)
            }
        }
    }

    async fn fetch_area(&self, area: &str) -> Result<Vec<TrafficLightStatus>, UpstreamError> {
        let url = format!("{}/snippets/{area}", self.base_url);
        let text = self.client.get_text(&url, &[]).await?;
        Ok(parse_snippets(&serde_json::from_str(&text)?, area))
    }
}

/// Area ids from an `areas` listing (a list, or an object with `areas`).
pub(crate) fn parse_areas(data: &Value) -> Vec<String> {
    list(data, "areas")
        .iter()
        .filter_map(|area| string_field(area, &["areaId", "id"]))
        .collect()
}

/// Traffic light statuses from a snippet payload.
pub(crate) fn parse_snippets(data: &Value, area_id: &str) -> Vec<TrafficLightStatus> {
    list(data, "snippets")
        .iter()
        .filter_map(|snippet| parse_snippet(snippet, area_id))
        .collect()
}

fn parse_snippet(snippet: &Value, area_id: &str) -> Option<TrafficLightStatus> {
    let intersection_id = string_field(snippet, &["unitId", "intersectionId"])?;
    let empty = Value::Null;
    let measurements = snippet.get("measurements").unwrap_or(&empty);

    let level_of_service = first(measurements, &["LOS", "levelOfService"])
        .and_then(|v| nested(v, &["value", "LOS"]))
        .and_then(as_string)
        .and_then(|s| LevelOfService::parse(&s));
    let spillback_length_meters = first(measurements, &["SpillbackLength", "spillbackLength"])
        .and_then(|v| nested(v, &["Length", "length"]))
        .and_then(as_f64);
    let green_percentage = first(measurements, &["GreenPercentage", "greenPercentage"])
        .and_then(|v| nested(v, &["Percentage", "percentage"]))
        .and_then(as_f64);

    Some(TrafficLightStatus {
        intersection_id,
        area_id: area_id.to_string(),
        name: string_field(snippet, &["name"]),
        level_of_service,
        spillback_length_meters,
        green_percentage,
        position: Coordinate::from_parts(
            snippet.get("latitude").and_then(as_f64),
            snippet.get("longitude").and_then(as_f64),
        ),
    })
}

fn list<'a>(data: &'a Value, key: &str) -> &'a [Value] {
    match data {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    }
}

fn first<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| value.get(*k)).filter(|v| !v.is_null())
}

/// A measurement is either a plain value or an object wrapping it.
fn nested<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    if value.is_object() {
        first(value, keys)
    } else {
        Some(value)
    }
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    first(value, keys).and_then(as_string).filter(|s| !s.is_empty())
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    number.filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn areas_from_list_or_object() {
        let data = json!([{"areaId": "zh-1"}, {"id": 7}, {"name": "no id"}]);
        assert_eq!(parse_areas(&data), vec!["zh-1", "7"]);

        let data = json!({"areas": [{"areaId": "be-2"}]});
        assert_eq!(parse_areas(&data), vec!["be-2"]);

        assert!(parse_areas(&json!("unexpected")).is_empty());
    }

    #[test]
    fn tolerant_snippet_fields() {
        let data = json!({"snippets": [
            {
                "unitId": "K101",
                "name": "Bellevue",
                "latitude": 47.3667,
                "longitude": "8.5450",
                "measurements": {
                    "LOS": {"value": "F"},
                    "SpillbackLength": {"Length": 240},
                    "GreenPercentage": 35.5
                }
            },
            {
                "intersectionId": 202,
                "measurements": {
                    "levelOfService": "d",
                    "spillbackLength": "80",
                    "greenPercentage": {"percentage": "50"}
                }
            },
            {"name": "no id", "measurements": {}}
        ]});

        let lights = parse_snippets(&data, "zh-1");
        assert_eq!(lights.len(), 2);

        let bellevue = &lights[0];
        assert_eq!(bellevue.intersection_id, "K101");
        assert_eq!(bellevue.area_id, "zh-1");
        assert_eq!(bellevue.label(), "Bellevue");
        assert_eq!(bellevue.level_of_service, Some(LevelOfService::F));
        assert_eq!(bellevue.spillback_length_meters, Some(240.0));
        assert_eq!(bellevue.green_percentage, Some(35.5));
        assert_eq!(bellevue.position, Some(Coordinate::new(47.3667, 8.545)));

        let other = &lights[1];
        assert_eq!(other.intersection_id, "202");
        assert_eq!(other.label(), "202");
        assert_eq!(other.level_of_service, Some(LevelOfService::D));
        assert_eq!(other.spillback_length_meters, Some(80.0));
        assert_eq!(other.green_percentage, Some(50.0));
        assert_eq!(other.position, None);
    }

    #[test]
    fn missing_measurements() {
        let lights = parse_snippets(&json!([{"unitId": "K1"}]), "a");
        assert_eq!(lights[0].level_of_service, None);
        assert_eq!(lights[0].spillback_length_meters, None);
    }
}
