//! HTTP route handlers.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::ops::RangeInclusive;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{get, post},
};
use chrono::{DurationRound, TimeDelta, Utc};
use futures::{Stream, StreamExt};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::assembler::{AssemblyContext, assemble};
use crate::availability::Source;
use crate::prediction::{HORIZON_MINUTES, RULE_TABLE};
use crate::upstream::TripQuery;

use super::dto::*;
use super::state::AppState;

const LOCATION_LIMIT: RangeInclusive<u32> = 1..=50;
const TRIP_LIMIT: RangeInclusive<u32> = 1..=10;
const LIST_LIMIT: RangeInclusive<u32> = 1..=200;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.cors_origins.as_deref());
    Router::new()
        .route("/health", get(health))
        .route("/api/info", get(info))
        .route("/api/locations", get(search_locations))
        .route("/api/trips", post(plan_trips))
        .route("/api/disruptions", get(list_disruptions))
        .route("/api/disruptions/for-route", get(route_disruptions))
        .route("/api/events", get(events))
        .route("/api/traffic/situations", get(traffic_situations))
        .route("/api/traffic/lights", get(traffic_lights))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `None` allows any origin.
fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let allow_origin = match origins {
        None => AllowOrigin::from(Any),
        Some(origins) => AllowOrigin::list(origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|_| warn!(%origin, "ignoring invalid CORS origin"))
                .ok()
        })),
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Liveness plus availability of every upstream source.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        api_configured: !state.config.api_key.is_empty(),
        disruptions_count: state.disruptions.len().await,
        sources: state.feeds.tracker().snapshot(),
    })
}

async fn info() -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "Swiss Transport Planner",
        version: env!("CARGO_PKG_VERSION"),
        data_sources: BTreeMap::from([
            ("routing", "OJP journey planner, timetable only"),
            ("delays", "GTFS-Realtime trip updates"),
            ("disruptions", "SIRI-SX situation exchange, polled"),
            ("traffic_situations", "DATEX II road incidents"),
            ("traffic_lights", "OCIT-C level of service and queue lengths"),
        ]),
        assumptions: &[
            "Routing is timetable-only; live delays are overlaid for display",
            "The delay feed carries no vehicle positions",
            "Bus and tram delays are predicted with fixed heuristic rules",
            "Predictions cover departures in the next 15 minutes",
            "Peak hours are 05:45-07:00 and 16:30-18:00 local time",
            "Traffic data coverage varies by region",
        ],
        prediction_rules: RULE_TABLE,
        prediction_horizon_minutes: HORIZON_MINUTES,
    })
}

/// Search stops by name, in upstream relevance order.
async fn search_locations(
    State(state): State<AppState>,
    query: Result<Query<LocationQuery>, QueryRejection>,
) -> Result<Json<Vec<LocationDto>>, AppError> {
    let Query(req) = query.map_err(AppError::from)?;
    let text = req.query.trim();
    if text.chars().count() < 2 {
        return Err(AppError::BadRequest {
            message: "query must be at least 2 characters".into(),
        });
    }
    let limit = bounded("limit", req.limit, 10, LOCATION_LIMIT)?;

    with_deadline(&state, async {
        let result = state
            .feeds
            .itinerary
            .search_locations(text, u8::try_from(limit).unwrap_or(u8::MAX))
            .await;
        if !result.has_data() {
            return Err(AppError::Unavailable {
                message: "location search is unavailable".into(),
            });
        }
        Ok(Json(
            result.value.iter().map(LocationDto::from_location).collect(),
        ))
    })
    .await
}

/// Plan trips and enrich them with delays, predictions and disruptions.
async fn plan_trips(
    State(state): State<AppState>,
    body: Result<Json<TripRequest>, JsonRejection>,
) -> Result<Json<TripSearchResponse>, AppError> {
    let Json(req) = body.map_err(AppError::from)?;
    if req.origin_id.trim().is_empty() || req.destination_id.trim().is_empty() {
        return Err(AppError::BadRequest {
            message: "origin_id and destination_id are required".into(),
        });
    }
    let num_results = bounded("num_results", req.num_results, 5, TRIP_LIMIT)?;

    with_deadline(&state, async {
        let now = Utc::now();
        // Whole minutes, so repeated "now" searches share a cache entry.
        let departure = req
            .departure_time
            .unwrap_or_else(|| now.duration_trunc(TimeDelta::minutes(1)).unwrap_or(now));
        let query = TripQuery {
            origin_id: req.origin_id.trim().to_string(),
            destination_id: req.destination_id.trim().to_string(),
            departure_time: Some(departure),
            num_results: u8::try_from(num_results).unwrap_or(u8::MAX),
        };

        let feeds = &state.feeds;
        let traffic = async {
            if req.include_predictions {
                feeds.traffic_snapshot().await
            } else {
                None
            }
        };
        let (plan, delays, traffic, disruptions) = futures::join!(
            feeds.itinerary.plan(&query),
            feeds.delays.latest(),
            traffic,
            state.disruptions.active_at(now, usize::MAX),
        );

        if let Some(reason) = &plan.value.unknown_location {
            return Err(AppError::NotFound {
                message: format!("location not found: {reason}"),
            });
        }
        if !plan.has_data() {
            return Err(AppError::Unavailable {
                message: "trip planning is unavailable".into(),
            });
        }

        let delays_available = feeds.tracker().is_available(Source::Delays);
        let ctx = AssemblyContext {
            overlay: delays_available.then_some(&*delays.value),
            traffic: traffic.as_ref(),
            disruptions: &disruptions,
            clock: now.with_timezone(&state.config.timezone),
            origin_id: &query.origin_id,
            destination_id: &query.destination_id,
            origin_name: req.origin_name.trim(),
            destination_name: req.destination_name.trim(),
            max_trips: num_results as usize,
        };
        let trips = assemble(&plan.value.itineraries, &ctx);

        Ok(Json(TripSearchResponse {
            trips: trips.iter().map(|t| TripDto::from_trip(t, now)).collect(),
            search_time: now,
        }))
    })
    .await
}

/// Active disruptions, in upstream order.
async fn list_disruptions(
    State(state): State<AppState>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<Vec<DisruptionDto>>, AppError> {
    let Query(req) = query.map_err(AppError::from)?;
    let limit = bounded("limit", req.limit, 50, LIST_LIMIT)?;
    let now = Utc::now();
    let active = state.disruptions.active_at(now, limit as usize).await;
    Ok(Json(
        active
            .iter()
            .map(|d| DisruptionDto::from_disruption(d, now))
            .collect(),
    ))
}

/// Active disruptions touching the given stops or lines.
async fn route_disruptions(
    State(state): State<AppState>,
    query: Result<Query<RouteQuery>, QueryRejection>,
) -> Result<Json<Vec<DisruptionDto>>, AppError> {
    let Query(req) = query.map_err(AppError::from)?;
    let (stops, lines) = (req.stops(), req.lines());
    if stops.is_empty() && lines.is_empty() {
        return Err(AppError::BadRequest {
            message: "stop_ids or line_refs is required".into(),
        });
    }
    let now = Utc::now();
    let matched = state.disruptions.for_route(&stops, &lines, now).await;
    Ok(Json(
        matched
            .iter()
            .map(|d| DisruptionDto::from_disruption(d, now))
            .collect(),
    ))
}

/// Live stream of disruption updates, availability changes and heartbeats.
async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let available = state.feeds.tracker().is_available(Source::Disruptions);
    let subscription = state
        .disruptions
        .subscribe(&state.broadcaster, Utc::now(), available)
        .await;

    Sse::new(
        subscription
            .into_stream()
            .map(|payload| Ok::<_, Infallible>(Event::default().data(&*payload))),
    )
}

async fn traffic_situations(
    State(state): State<AppState>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<Vec<TrafficSituationDto>>, AppError> {
    let Query(req) = query.map_err(AppError::from)?;
    let limit = bounded("limit", req.limit, 50, LIST_LIMIT)?;

    with_deadline(&state, async {
        let result = state.feeds.situations.latest().await;
        Ok(Json(
            result
                .value
                .iter()
                .take(limit as usize)
                .map(TrafficSituationDto::from)
                .collect(),
        ))
    })
    .await
}

async fn traffic_lights(
    State(state): State<AppState>,
    query: Result<Query<TrafficLightQuery>, QueryRejection>,
) -> Result<Json<Vec<TrafficLightDto>>, AppError> {
    let Query(req) = query.map_err(AppError::from)?;
    with_deadline(&state, async {
        let result = state.feeds.lights.latest().await;
        Ok(Json(
            result
                .value
                .iter()
                .filter(|light| {
                    req.area_id
                        .as_deref()
                        .is_none_or(|area| light.area_id == area)
                })
                .map(TrafficLightDto::from)
                .collect(),
        ))
    })
    .await
}

/// Bound a request by the configured deadline.
async fn with_deadline<T>(
    state: &AppState,
    work: impl Future<Output = Result<T, AppError>>,
) -> Result<T, AppError> {
    tokio::time::timeout(state.config.request_deadline, work)
        .await
        .map_err(|_| AppError::Timeout)?
}

/// Validate an optional numeric parameter, applying its default.
fn bounded(
    name: &str,
    value: Option<u32>,
    default: u32,
    range: RangeInclusive<u32>,
) -> Result<u32, AppError> {
    let value = value.unwrap_or(default);
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(AppError::BadRequest {
            message: format!(
                "{name} must be between {} and {}",
                range.start(),
                range.end()
            ),
        })
    }
}

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    BadRequest { message: String },

    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    Unavailable { message: String },

    #[error("request deadline exceeded")]
    Timeout,
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::BadRequest {
            message: e.body_text(),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        AppError::BadRequest {
            message: e.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        };
        if status.is_server_error() {
            warn!(%status, error = %self, "request failed");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use chrono::{DateTime, Duration};
    use tower::ServiceExt;

    use crate::availability::AvailabilityTracker;
    use crate::config::AppConfig;
    use crate::disruptions::DisruptionStore;
    use crate::domain::{Disruption, Severity};
    use crate::events::Broadcaster;
    use crate::upstream::Feeds;

    /// Every upstream points at a closed local port.
    fn test_state() -> AppState {
        let closed = "http://127.0.0.1:9";
        let config = AppConfig {
            ojp_endpoint: format!("{closed}/ojp"),
            gtfs_rt_endpoint: format!("{closed}/gtfs-rt"),
            siri_sx_endpoint: format!("{closed}/siri-sx"),
            traffic_lights_base: format!("{closed}/ocit"),
            traffic_situations_endpoint: format!("{closed}/datex"),
            ..AppConfig::default()
        };
        let tracker = Arc::new(AvailabilityTracker::new(config.availability_threshold));
        let feeds = Feeds::new(&config, tracker).unwrap();
        AppState::new(
            Arc::new(config),
            Arc::new(feeds),
            DisruptionStore::new(),
            Broadcaster::new(4),
        )
    }

    fn disruption(id: &str, end: Option<DateTime<Utc>>) -> Disruption {
        Disruption {
            id: id.into(),
            title: format!("Disruption {id}"),
            description: String::new(),
            severity: Severity::Warning,
            affected_lines: vec!["S3".into()],
            affected_stops: vec!["8503000".into()],
            start_time: None,
            end_time: end,
        }
    }

    async fn get(state: AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = create_router(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        read(response).await
    }

    async fn post_json(state: AppState, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = create_router(state).oneshot(request).await.unwrap();
        read(response).await
    }

    async fn read(response: Response) -> (StatusCode, serde_json::Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_every_source() {
        let (status, body) = get(test_state(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["api_configured"], false);
        assert_eq!(body["sources"]["disruptions"]["available"], true);
        assert_eq!(body["sources"].as_object().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn info_lists_rules() {
        let (status, body) = get(test_state(), "/api/info").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prediction_horizon_minutes"], 15);
        assert!(!body["prediction_rules"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn short_location_query_is_rejected() {
        let (status, body) = get(test_state(), "/api/locations?query=Z").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("2 characters"));
    }

    #[tokio::test]
    async fn location_limit_is_bounded() {
        let (status, _) = get(test_state(), "/api/locations?query=Zurich&limit=51").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn trip_result_count_is_bounded() {
        let (status, body) = post_json(
            test_state(),
            "/api/trips",
            r#"{"origin_id":"8503000","destination_id":"8507000","num_results":11}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("num_results"));
    }

    #[tokio::test]
    async fn malformed_trip_body_is_a_json_error() {
        let (status, body) = post_json(test_state(), "/api/trips", r#"{"origin_id":1}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn trips_unavailable_without_upstream_or_cache() {
        let state = test_state();
        let (status, body) = post_json(
            state.clone(),
            "/api/trips",
            r#"{"origin_id":"8503000","destination_id":"8507000","include_predictions":false}"#,
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].is_string());
        assert_eq!(
            state.feeds.tracker().health(Source::Itinerary).consecutive_failures,
            1
        );
    }

    #[tokio::test]
    async fn disruptions_are_filtered_by_activity() {
        let state = test_state();
        let past = Utc::now() - Duration::hours(1);
        state
            .disruptions
            .replace(&[disruption("a", None), disruption("b", Some(past))])
            .await;

        let (status, body) = get(state, "/api/disruptions").await;
        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], "a");
        assert_eq!(list[0]["is_active"], true);
    }

    #[tokio::test]
    async fn disruption_limit_is_bounded() {
        let (status, _) = get(test_state(), "/api/disruptions?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn route_disruptions_match_by_line() {
        let state = test_state();
        state.disruptions.replace(&[disruption("a", None)]).await;

        let (status, body) = get(state.clone(), "/api/disruptions/for-route?line_refs=S3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = get(state, "/api/disruptions/for-route?stop_ids=8507000").await;
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn route_disruptions_need_a_filter() {
        let (status, _) = get(test_state(), "/api/disruptions/for-route").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn bounded_applies_default() {
        assert_eq!(bounded("limit", None, 10, LOCATION_LIMIT).unwrap(), 10);
        assert_eq!(bounded("limit", Some(50), 10, LOCATION_LIMIT).unwrap(), 50);
        assert!(bounded("limit", Some(0), 10, LOCATION_LIMIT).is_err());
    }

    #[tokio::test]
    async fn traffic_reads_never_fetch() {
        let state = test_state();
        let (status, body) = get(state.clone(), "/api/traffic/situations").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());

        let (status, _) = get(state.clone(), "/api/traffic/lights").await;
        assert_eq!(status, StatusCode::OK);

        let tracker = state.feeds.tracker();
        for source in [Source::TrafficSituations, Source::TrafficLights] {
            assert_eq!(tracker.health(source).consecutive_failures, 0);
        }
    }

    #[tokio::test]
    async fn malformed_traffic_light_query_is_a_json_error() {
        let (status, body) =
            get(test_state(), "/api/traffic/lights?area_id=a&area_id=b").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("area_id"));
    }

    /// Stop refs the gateway stand-in treats as unknown.
    const UNKNOWN_STOP: &str = "0000000";

    const BELLEVUE: (f64, f64) = (47.3667, 8.5450);
    const HEIMPLATZ: (f64, f64) = (47.3700, 8.5480);

    /// Local stand-in for the transport data gateway, serving canned OJP
    /// and DATEX II payloads. Returns its base URL.
    async fn spawn_gateway() -> String {
        let app = Router::new()
            .route("/ojp", post(gateway_ojp))
            .route("/datex", post(|| async { gateway_datex() }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    async fn gateway_ojp(body: String) -> String {
        if body.contains(&format!(">{UNKNOWN_STOP}<")) {
            return r#"<OJP xmlns="http://www.vdv.de/ojp"><OJPResponse><OJPTripDelivery>
                <ErrorCondition><OtherError>
                  <ErrorText>TRIP_ORIGINUNKNOWN</ErrorText>
                </OtherError></ErrorCondition>
            </OJPTripDelivery></OJPResponse></OJP>"#
                .to_string();
        }
        // Three bus trips leaving within the prediction horizon.
        let now = Utc::now();
        let results: String = [5, 7, 9]
            .iter()
            .enumerate()
            .map(|(i, offset)| {
                let departure = now + Duration::minutes(*offset);
                gateway_trip(i, departure, departure + Duration::minutes(5))
            })
            .collect();
        format!(
            r#"<OJP xmlns="http://www.vdv.de/ojp"><OJPResponse><OJPTripDelivery>
  <TripResponseContext><Places>
    <Location>
      <StopPoint><StopPointRef>8591067:0:A</StopPointRef></StopPoint>
      <GeoPosition><Longitude>{}</Longitude><Latitude>{}</Latitude></GeoPosition>
    </Location>
    <Location>
      <StopPoint><StopPointRef>8591181:0:B</StopPointRef></StopPoint>
      <GeoPosition><Longitude>{}</Longitude><Latitude>{}</Latitude></GeoPosition>
    </Location>
  </Places></TripResponseContext>
  {results}
</OJPTripDelivery></OJPResponse></OJP>"#,
            BELLEVUE.1, BELLEVUE.0, HEIMPLATZ.1, HEIMPLATZ.0,
        )
    }

    fn gateway_trip(index: usize, departure: DateTime<Utc>, arrival: DateTime<Utc>) -> String {
        let time = |t: DateTime<Utc>| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        format!(
            r#"<TripResult><Trip>
  <TripId>T{index}</TripId>
  <TripLeg>
    <LegId>1</LegId>
    <TimedLeg>
      <LegBoard>
        <StopPointRef>8591067:0:A</StopPointRef>
        <StopPointName><Text>Zürich, Bellevue</Text></StopPointName>
        <ServiceDeparture><TimetabledTime>{}</TimetabledTime></ServiceDeparture>
      </LegBoard>
      <LegAlight>
        <StopPointRef>8591181:0:B</StopPointRef>
        <StopPointName><Text>Zürich, Kunsthaus</Text></StopPointName>
        <ServiceArrival><TimetabledTime>{}</TimetabledTime></ServiceArrival>
      </LegAlight>
      <Service>
        <Mode><PtMode>bus</PtMode></Mode>
        <LineRef>ojp:91031:A</LineRef>
        <PublishedLineName><Text>31</Text></PublishedLineName>
      </Service>
    </TimedLeg>
  </TripLeg>
</Trip></TripResult>"#,
            time(departure),
            time(arrival),
        )
    }

    /// One severe road incident at Bellevue.
    fn gateway_datex() -> String {
        format!(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body>
  <d2LogicalModel xmlns="http://datex2.eu/schema/2/2_0"><payloadPublication>
    <situation id="S1">
      <overallSeverity>high</overallSeverity>
      <situationRecord id="R1">
        <groupOfLocations><locationForDisplay>
          <latitude>{}</latitude><longitude>{}</longitude>
        </locationForDisplay></groupOfLocations>
      </situationRecord>
    </situation>
  </payloadPublication></d2LogicalModel>
</s:Body></s:Envelope>"#,
            BELLEVUE.0, BELLEVUE.1,
        )
    }

    /// State wired to the gateway stand-in, with traffic situations polled
    /// once. Traffic lights stay on a closed port and are never polled.
    async fn gateway_state() -> AppState {
        let gateway = spawn_gateway().await;
        let config = AppConfig {
            ojp_endpoint: format!("{gateway}/ojp"),
            traffic_situations_endpoint: format!("{gateway}/datex"),
            gtfs_rt_endpoint: "http://127.0.0.1:9/gtfs-rt".into(),
            siri_sx_endpoint: "http://127.0.0.1:9/siri-sx".into(),
            traffic_lights_base: "http://127.0.0.1:9/ocit".into(),
            ..AppConfig::default()
        };
        let tracker = Arc::new(AvailabilityTracker::new(config.availability_threshold));
        let feeds = Feeds::new(&config, tracker).unwrap();
        let polled = feeds.situations.refresh().await;
        assert!(polled.is_fresh());
        AppState::new(
            Arc::new(config),
            Arc::new(feeds),
            DisruptionStore::new(),
            Broadcaster::new(4),
        )
    }

    #[tokio::test]
    async fn trips_are_planned_and_predicted() {
        let state = gateway_state().await;
        let (status, body) = post_json(
            state.clone(),
            "/api/trips",
            r#"{"origin_id":"8591067","destination_id":"8591181"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let trips = body["trips"].as_array().unwrap();
        assert_eq!(trips.len(), 3);
        assert_eq!(trips[0]["trip_id"], "T0");
        let leg = &trips[0]["legs"][0];
        assert_eq!(leg["mode"], "bus");
        assert_eq!(leg["line_ref"], "ojp:91031:A");
        assert_eq!(leg["line_name"], "31");
        assert!(leg["delay_prediction"]["predicted_delay_minutes"].as_u64().unwrap() >= 8);
        assert!(
            leg["delay_prediction"]["factors"][0]
                .as_str()
                .unwrap()
                .contains("incident")
        );
        assert!(state.feeds.tracker().is_available(Source::Itinerary));
    }

    #[tokio::test]
    async fn trips_without_predictions() {
        let (status, body) = post_json(
            gateway_state().await,
            "/api/trips",
            r#"{"origin_id":"8591067","destination_id":"8591181","include_predictions":false}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let trips = body["trips"].as_array().unwrap();
        assert!(!trips.is_empty());
        for trip in trips {
            for leg in trip["legs"].as_array().unwrap() {
                assert!(leg["delay_prediction"].is_null());
            }
        }
    }

    #[tokio::test]
    async fn trips_are_truncated_to_num_results() {
        let (status, body) = post_json(
            gateway_state().await,
            "/api/trips",
            r#"{"origin_id":"8591067","destination_id":"8591181","num_results":2}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<_> = body["trips"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["trip_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["T0", "T1"]);
    }

    #[tokio::test]
    async fn unknown_origin_is_not_found() {
        let state = gateway_state().await;
        let (status, body) = post_json(
            state.clone(),
            "/api/trips",
            &format!(r#"{{"origin_id":"{UNKNOWN_STOP}","destination_id":"8591181"}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("ORIGINUNKNOWN"));
        // The gateway answered; an unknown stop is not an outage.
        assert!(state.feeds.tracker().is_available(Source::Itinerary));
    }
}
