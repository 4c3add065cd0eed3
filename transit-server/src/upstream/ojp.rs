//! OJP (Open Journey Planner) adapter: itineraries and location search.
//!
//! Requests are OJP 1.0 XML documents POSTed to a single endpoint. Responses
//! are parsed into domain legs; a trip whose legs cannot all be converted is
//! skipped with a warning rather than failing the whole response.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use roxmltree::Node;

use crate::availability::{AvailabilityTracker, Source};
use crate::domain::{
    Coordinate, Location, LocationKind, StopPoint, TransportMode, TripLeg, place_id,
};

use super::error::{ConversionError, UpstreamError};
use super::feed::{FeedCache, FeedCacheConfig, FeedResult};
use super::http::OtdClient;
use super::xml;

/// Parameters of a journey planning request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TripQuery {
    pub origin_id: String,
    pub destination_id: String,
    /// Requested departure; `None` means now
    pub departure_time: Option<DateTime<Utc>>,
    pub num_results: u8,
}

/// One itinerary as returned upstream, before assembly.
///
/// Walk legs may have an empty stop id when the upstream omits it.
#[derive(Debug, Clone, PartialEq)]
pub struct Itinerary {
    pub id: String,
    pub legs: Vec<TripLeg>,
}

/// Parsed trip response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItineraryResponse {
    pub itineraries: Vec<Itinerary>,
    /// Set when the upstream reported the origin or destination as unknown.
    pub unknown_location: Option<String>,
}

/// Adapter for the journey planner.
pub struct OjpAdapter {
    client: OtdClient,
    endpoint: String,
    tracker: Arc<AvailabilityTracker>,
    trips: FeedCache<TripQuery, ItineraryResponse>,
    locations: FeedCache<(String, u8), Vec<Location>>,
}

impl OjpAdapter {
    pub fn new(
        client: OtdClient,
        endpoint: impl Into<String>,
        cache: &FeedCacheConfig,
        tracker: Arc<AvailabilityTracker>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            tracker,
            trips: FeedCache::new(Source::Itinerary, cache),
            locations: FeedCache::new(Source::Itinerary, cache),
        }
    }

    /// Plan itineraries, serving identical recent queries from the cache.
    pub async fn plan(&self, query: &TripQuery) -> FeedResult<Arc<ItineraryResponse>> {
        if let Some(hit) = self.trips.get(query).await {
            tracing::debug!(
                origin = %query.origin_id,
                destination = %query.destination_id,
                "trip cache hit"
            );
            return FeedResult::fresh(hit);
        }

        let outcome = self.fetch_trips(query).await;
        self.trips.settle(query.clone(), outcome, &self.tracker).await
    }

    async fn fetch_trips(&self, query: &TripQuery) -> Result<ItineraryResponse, UpstreamError> {
        let body = build_trip_request(query, Utc::now());
        let text = self.client.post_xml(&self.endpoint, body, None).await?;
        let response = parse_trip_response(&text)?;
        tracing::debug!(
            itineraries = response.itineraries.len(),
            "parsed trip response"
        );
        Ok(response)
    }

    /// Search stops by name.
    pub async fn search_locations(&self, query: &str, limit: u8) -> FeedResult<Arc<Vec<Location>>> {
        let key = (query.to_string(), limit);
        if let Some(hit) = self.locations.get(&key).await {
            return FeedResult::fresh(hit);
        }

        let outcome = self.fetch_locations(query, limit).await;
        self.locations.settle(key, outcome, &self.tracker).await
    }

    async fn fetch_locations(
        &self,
        query: &str,
        limit: u8,
    ) -> Result<Vec<Location>, UpstreamError> {
        let body = build_location_request(query, limit, Utc::now());
        let text = self.client.post_xml(&self.endpoint, body, None).await?;
        let mut locations = parse_location_response(&text)?;
        locations.truncate(usize::from(limit));
        Ok(locations)
    }
}

static MESSAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn message_id(now: DateTime<Utc>) -> String {
    let n = MESSAGE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("ts-{}-{n}", now.timestamp_millis())
}

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn build_location_request(query: &str, limit: u8, now: DateTime<Utc>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ojp:OJP xmlns:ojp="http://www.vdv.de/ojp" xmlns:siri="http://www.siri.org.uk/siri" version="1.0">
  <ojp:OJPRequest>
    <siri:ServiceRequest>
      <siri:RequestTimestamp>{ts}</siri:RequestTimestamp>
      <siri:MessageIdentifier>{msg}</siri:MessageIdentifier>
      <ojp:OJPLocationInformationRequest>
        <siri:RequestTimestamp>{ts}</siri:RequestTimestamp>
        <ojp:InitialInput>
          <ojp:LocationName>{name}</ojp:LocationName>
        </ojp:InitialInput>
        <ojp:Restrictions>
          <ojp:Type>stop</ojp:Type>
          <ojp:NumberOfResults>{limit}</ojp:NumberOfResults>
        </ojp:Restrictions>
      </ojp:OJPLocationInformationRequest>
    </siri:ServiceRequest>
  </ojp:OJPRequest>
</ojp:OJP>"#,
        ts = timestamp(now),
        msg = message_id(now),
        name = xml::escape(query),
    )
}

pub(crate) fn build_trip_request(query: &TripQuery, now: DateTime<Utc>) -> String {
    let departure = query.departure_time.unwrap_or(now);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ojp:OJP xmlns:ojp="http://www.vdv.de/ojp" xmlns:siri="http://www.siri.org.uk/siri" version="1.0">
  <ojp:OJPRequest>
    <siri:ServiceRequest>
      <siri:RequestTimestamp>{ts}</siri:RequestTimestamp>
      <siri:MessageIdentifier>{msg}</siri:MessageIdentifier>
      <ojp:OJPTripRequest>
        <siri:RequestTimestamp>{ts}</siri:RequestTimestamp>
        <ojp:Origin>
          <ojp:PlaceRef>
            <ojp:StopPlaceRef>{origin}</ojp:StopPlaceRef>
          </ojp:PlaceRef>
          <ojp:DepArrTime>{departure}</ojp:DepArrTime>
        </ojp:Origin>
        <ojp:Destination>
          <ojp:PlaceRef>
            <ojp:StopPlaceRef>{destination}</ojp:StopPlaceRef>
          </ojp:PlaceRef>
        </ojp:Destination>
        <ojp:Params>
          <ojp:NumberOfResults>{results}</ojp:NumberOfResults>
          <ojp:IncludeTrackSections>false</ojp:IncludeTrackSections>
          <ojp:IncludeTurnDescription>false</ojp:IncludeTurnDescription>
          <ojp:IncludeIntermediateStops>true</ojp:IncludeIntermediateStops>
        </ojp:Params>
      </ojp:OJPTripRequest>
    </siri:ServiceRequest>
  </ojp:OJPRequest>
</ojp:OJP>"#,
        ts = timestamp(now),
        msg = message_id(now),
        origin = xml::escape(&query.origin_id),
        destination = xml::escape(&query.destination_id),
        departure = timestamp(departure),
        results = query.num_results,
    )
}

fn ensure_ojp_root(root: Node<'_, '_>) -> Result<(), UpstreamError> {
    if xml::is(root, "OJP") {
        Ok(())
    } else {
        Err(UpstreamError::malformed(format!(
            "expected OJP root element, found {}",
            root.tag_name().name()
        )))
    }
}

pub(crate) fn parse_trip_response(text: &str) -> Result<ItineraryResponse, UpstreamError> {
    let doc = xml::parse(text)?;
    let root = doc.root_element();
    ensure_ojp_root(root)?;

    let unknown_location = error_conditions(root).find(|msg| is_unknown_location(msg));
    let places = context_places(root);

    let itineraries = xml::descendants(root, "TripResult")
        .enumerate()
        .filter_map(|(idx, node)| match parse_itinerary(node, idx, &places) {
            Ok(itinerary) => Some(itinerary),
            Err(e) => {
                tracing::warn!(index = idx, error = %e, "skipping unparseable trip");
                None
            }
        })
        .collect();

    Ok(ItineraryResponse {
        itineraries,
        unknown_location,
    })
}

/// Texts of all `ErrorCondition` elements.
fn error_conditions<'a>(root: Node<'a, '_>) -> impl Iterator<Item = String> + 'a {
    xml::descendants(root, "ErrorCondition").map(|node| {
        node.descendants()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    })
}

fn is_unknown_location(message: &str) -> bool {
    let normalized: String = message
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    [
        "ORIGINUNKNOWN",
        "DESTINATIONUNKNOWN",
        "LOCATIONUNKNOWN",
        "UNKNOWNORIGIN",
        "UNKNOWNDESTINATION",
        "UNKNOWNLOCATION",
    ]
    .iter()
    .any(|needle| normalized.contains(needle))
}

/// Coordinates of places listed in the response context, by stop reference.
fn context_places(root: Node<'_, '_>) -> HashMap<String, Coordinate> {
    let mut places = HashMap::new();
    for container in xml::descendants(root, "Places") {
        for place in container
            .children()
            .filter(|n| xml::is(*n, "Location") || xml::is(*n, "Place"))
        {
            let Some(position) = xml::child(place, "GeoPosition").and_then(geo_position) else {
                continue;
            };
            for reference in ["StopPointRef", "StopPlaceRef"] {
                if let Some(id) = xml::descendant_text(place, reference) {
                    places.insert(id.to_string(), position);
                }
            }
        }
    }
    places
}

fn geo_position(node: Node<'_, '_>) -> Option<Coordinate> {
    Coordinate::from_parts(
        xml::child_text(node, "Latitude").and_then(xml::parse_f64),
        xml::child_text(node, "Longitude").and_then(xml::parse_f64),
    )
}

fn lookup_position(places: &HashMap<String, Coordinate>, id: &str) -> Option<Coordinate> {
    places
        .get(id)
        .or_else(|| places.get(place_id(id)))
        .copied()
}

fn parse_itinerary(
    node: Node<'_, '_>,
    idx: usize,
    places: &HashMap<String, Coordinate>,
) -> Result<Itinerary, ConversionError> {
    let trip = xml::child(node, "Trip").unwrap_or(node);
    let id = xml::child_text(trip, "TripId")
        .or_else(|| xml::child_text(node, "ResultId"))
        .map(str::to_string)
        .unwrap_or_else(|| format!("trip_{idx}"));

    let legs = xml::children(trip, "TripLeg")
        .enumerate()
        .map(|(leg_idx, leg)| parse_leg(leg, leg_idx, places))
        .collect::<Result<Vec<_>, _>>()?;

    if legs.is_empty() {
        return Err(ConversionError::MissingField("TripLeg"));
    }

    Ok(Itinerary { id, legs })
}

fn parse_leg(
    node: Node<'_, '_>,
    idx: usize,
    places: &HashMap<String, Coordinate>,
) -> Result<TripLeg, ConversionError> {
    let leg_id = xml::child_text(node, "LegId")
        .map(|id| format!("leg_{id}"))
        .unwrap_or_else(|| format!("leg_{idx}"));

    if let Some(timed) = xml::child(node, "TimedLeg") {
        return parse_timed_leg(timed, leg_id, places);
    }
    let walk = xml::child(node, "TransferLeg").or_else(|| xml::child(node, "ContinuousLeg"));
    if let Some(walk) = walk {
        return parse_walk_leg(walk, leg_id, places);
    }
    Err(ConversionError::MissingField("TimedLeg"))
}

fn parse_timed_leg(
    timed: Node<'_, '_>,
    leg_id: String,
    places: &HashMap<String, Coordinate>,
) -> Result<TripLeg, ConversionError> {
    let board = xml::child(timed, "LegBoard").ok_or(ConversionError::MissingField("LegBoard"))?;
    let alight = xml::child(timed, "LegAlight").ok_or(ConversionError::MissingField("LegAlight"))?;

    let origin = parse_call(board, &["ServiceDeparture", "ServiceArrival"], places)?;
    let destination = parse_call(alight, &["ServiceArrival", "ServiceDeparture"], places)?;

    let intermediate_stops = timed
        .children()
        .filter(|n| xml::is(*n, "LegIntermediates") || xml::is(*n, "LegIntermediate"))
        .filter_map(|n| {
            parse_call(n, &["ServiceArrival", "ServiceDeparture"], places)
                .inspect_err(|e| tracing::debug!(error = %e, "skipping intermediate stop"))
                .ok()
        })
        .collect();

    let service = xml::child(timed, "Service");
    let mode = service
        .and_then(|s| xml::descendant_text(s, "PtMode"))
        .map(TransportMode::from_ojp)
        .unwrap_or(TransportMode::Unknown);

    let mut leg = TripLeg::new(leg_id, mode, origin, destination);
    leg.intermediate_stops = intermediate_stops;
    if let Some(service) = service {
        leg.line_id = xml::child_text(service, "LineRef").map(str::to_string);
        leg.line_name = xml::path_text(service, &["PublishedLineName", "Text"])
            .or_else(|| xml::path_text(service, &["PublishedServiceName", "Text"]))
            .map(str::to_string);
        leg.destination_text =
            xml::path_text(service, &["DestinationText", "Text"]).map(str::to_string);
        leg.operator = xml::child_text(service, "OperatorRef").map(str::to_string);
    }
    Ok(leg)
}

/// Parse a board/alight/intermediate call. `time_containers` are tried in
/// order for the timetabled time.
fn parse_call(
    node: Node<'_, '_>,
    time_containers: &[&str],
    places: &HashMap<String, Coordinate>,
) -> Result<StopPoint, ConversionError> {
    let id = xml::child_text(node, "StopPointRef")
        .or_else(|| xml::descendant_text(node, "StopPointRef"))
        .ok_or(ConversionError::MissingField("StopPointRef"))?;
    let name = xml::path_text(node, &["StopPointName", "Text"]).unwrap_or(id);
    let platform = xml::path_text(node, &["PlannedQuay", "Text"])
        .or_else(|| xml::path_text(node, &["EstimatedQuay", "Text"]))
        .map(str::to_string);

    let raw = time_containers
        .iter()
        .find_map(|container| xml::path_text(node, &[*container, "TimetabledTime"]))
        .ok_or(ConversionError::MissingField("TimetabledTime"))?;
    let scheduled = parse_time(raw)?;

    Ok(StopPoint::scheduled(id, name, scheduled)
        .with_platform(platform)
        .with_position(lookup_position(places, id)))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, ConversionError> {
    xml::parse_datetime(raw).ok_or_else(|| ConversionError::InvalidTime(raw.to_string()))
}

fn parse_walk_leg(
    walk: Node<'_, '_>,
    leg_id: String,
    places: &HashMap<String, Coordinate>,
) -> Result<TripLeg, ConversionError> {
    let raw_start = xml::descendant_text(walk, "TimeWindowStart")
        .ok_or(ConversionError::MissingField("TimeWindowStart"))?;
    let start = parse_time(raw_start)?;
    let duration = xml::child_text(walk, "Duration").and_then(parse_iso_duration);
    let end = match xml::descendant_text(walk, "TimeWindowEnd") {
        Some(raw) => parse_time(raw)?,
        None => start + duration.unwrap_or_else(Duration::zero),
    };

    let origin = walk_endpoint(xml::child(walk, "LegStart"), start, places);
    let destination = walk_endpoint(xml::child(walk, "LegEnd"), end, places);

    let mut leg = TripLeg::new(leg_id, TransportMode::Walk, origin, destination);
    if let Some(minutes) = duration.map(|d| d.num_minutes()).filter(|m| *m > 0) {
        leg.duration_minutes = u32::try_from(minutes).unwrap_or(u32::MAX);
    }
    Ok(leg)
}

/// A walk leg endpoint; the id stays empty when the upstream omits it.
fn walk_endpoint(
    node: Option<Node<'_, '_>>,
    time: DateTime<Utc>,
    places: &HashMap<String, Coordinate>,
) -> StopPoint {
    let id = node
        .and_then(|n| {
            xml::descendant_text(n, "StopPointRef")
                .or_else(|| xml::descendant_text(n, "StopPlaceRef"))
        })
        .unwrap_or_default();
    let name = node
        .and_then(|n| {
            xml::path_text(n, &["LocationName", "Text"])
                .or_else(|| xml::descendant_text(n, "Text"))
        })
        .unwrap_or(id);
    let position = node
        .and_then(|n| xml::child(n, "GeoPosition"))
        .and_then(geo_position)
        .or_else(|| lookup_position(places, id));
    StopPoint::scheduled(id, name, time).with_position(position)
}

/// Parse an ISO 8601 duration such as `PT1H5M30S` or `P1DT2H`.
pub(crate) fn parse_iso_duration(value: &str) -> Option<Duration> {
    let rest = value.trim().strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, t),
        None => (rest, ""),
    };

    let mut seconds: i64 = 0;
    for (part, units) in [
        (date_part, &[('D', 86_400)][..]),
        (time_part, &[('H', 3_600), ('M', 60), ('S', 1)][..]),
    ] {
        let mut number = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                continue;
            }
            let (_, factor) = units.iter().find(|(unit, _)| *unit == c)?;
            let amount: f64 = number.parse().ok()?;
            seconds += (amount * *factor as f64) as i64;
            number.clear();
        }
        if !number.is_empty() {
            return None;
        }
    }
    Some(Duration::seconds(seconds))
}

pub(crate) fn parse_location_response(text: &str) -> Result<Vec<Location>, UpstreamError> {
    let doc = xml::parse(text)?;
    let root = doc.root_element();
    ensure_ojp_root(root)?;

    let Some(delivery) = xml::descendant(root, "OJPLocationInformationDelivery") else {
        return Ok(Vec::new());
    };

    Ok(delivery
        .children()
        .filter(|n| xml::is(*n, "Location") || xml::is(*n, "PlaceResult"))
        .filter_map(|result| {
            let place = xml::child(result, "Location")
                .or_else(|| xml::child(result, "Place"))
                .unwrap_or(result);
            parse_location(place)
        })
        .collect())
}

fn parse_location(place: Node<'_, '_>) -> Option<Location> {
    let position = xml::child(place, "GeoPosition").and_then(geo_position);

    let (kind, id, name) = if let Some(stop) = xml::child(place, "StopPlace") {
        (
            LocationKind::Stop,
            xml::child_text(stop, "StopPlaceRef"),
            xml::path_text(stop, &["StopPlaceName", "Text"]),
        )
    } else if let Some(stop) = xml::child(place, "StopPoint") {
        (
            LocationKind::Stop,
            xml::child_text(stop, "StopPointRef"),
            xml::path_text(stop, &["StopPointName", "Text"]),
        )
    } else if let Some(address) = xml::child(place, "Address") {
        (
            LocationKind::Address,
            xml::child_text(address, "AddressCode")
                .or_else(|| xml::child_text(address, "PublicCode")),
            xml::path_text(address, &["AddressName", "Text"]),
        )
    } else if let Some(poi) = xml::child(place, "PointOfInterest") {
        (
            LocationKind::Poi,
            xml::child_text(poi, "PointOfInterestCode"),
            xml::path_text(poi, &["PointOfInterestName", "Text"]),
        )
    } else {
        (LocationKind::Coordinate, None, None)
    };

    let name = name
        .or_else(|| xml::path_text(place, &["LocationName", "Text"]))
        .or_else(|| xml::path_text(place, &["Name", "Text"]))?;
    let id = match (id, kind, position) {
        (Some(id), _, _) => id.to_string(),
        (None, LocationKind::Coordinate, Some(p)) => {
            format!("{:.6},{:.6}", p.latitude, p.longitude)
        }
        _ => return None,
    };
    let locality = xml::descendant(place, "TopographicPlaceName")
        .and_then(|n| xml::child_text(n, "Text"))
        .map(str::to_string);

    Some(Location {
        id,
        name: name.to_string(),
        kind,
        position,
        locality,
    })
}
