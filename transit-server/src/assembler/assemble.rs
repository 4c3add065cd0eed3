//! Itinerary enrichment.

use std::collections::HashSet;

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::domain::{Disruption, TrafficSnapshot, Trip, TripLeg, place_id};
use crate::prediction;
use crate::upstream::Itinerary;

use super::DelayOverlay;

/// Most disruptions attached to a single trip.
pub const MAX_DISRUPTIONS_PER_TRIP: usize = 5;

/// Everything assembly needs besides the itineraries.
#[derive(Debug, Clone)]
pub struct AssemblyContext<'a> {
    /// Live delays; `None` when the delay source is unavailable.
    pub overlay: Option<&'a DelayOverlay>,
    /// Road traffic; `None` disables predictions.
    pub traffic: Option<&'a TrafficSnapshot>,
    /// Currently active disruptions.
    pub disruptions: &'a [Disruption],
    pub clock: DateTime<Tz>,
    /// Requested origin and destination, used for walk legs without ids.
    pub origin_id: &'a str,
    pub destination_id: &'a str,
    /// Display names of the requested endpoints; may be empty.
    pub origin_name: &'a str,
    pub destination_name: &'a str,
    pub max_trips: usize,
}

/// Build validated trips from upstream itineraries, keeping upstream order.
///
/// Itineraries whose legs do not chain are dropped with a warning.
pub fn assemble(itineraries: &[Itinerary], ctx: &AssemblyContext<'_>) -> Vec<Trip> {
    itineraries
        .iter()
        .filter_map(|itinerary| assemble_one(itinerary, ctx))
        .take(ctx.max_trips)
        .collect()
}

fn assemble_one(itinerary: &Itinerary, ctx: &AssemblyContext<'_>) -> Option<Trip> {
    let mut legs = itinerary.legs.clone();
    fill_walk_endpoints(&mut legs, ctx);

    for leg in &mut legs {
        leg.has_realtime = ctx.overlay.is_some_and(|overlay| apply_delays(leg, overlay));
        leg.delay_prediction = ctx
            .traffic
            .and_then(|traffic| prediction::predict(traffic, leg, &ctx.clock));
    }

    let mut trip = match Trip::new(itinerary.id.clone(), legs) {
        Ok(trip) => trip,
        Err(e) => {
            warn!(trip = %itinerary.id, error = %e, "dropping itinerary");
            return None;
        }
    };

    let related = related_disruptions(&trip, ctx.disruptions);
    if !related.is_empty() {
        debug!(trip = %itinerary.id, count = related.len(), "disruptions attached");
    }
    trip.set_disruptions(related);
    Some(trip)
}

/// Give walk legs without stop ids the id of the stop they connect to.
///
/// Endpoints of the whole trip take the requested id, and the requested name
/// when the leg has none.
fn fill_walk_endpoints(legs: &mut [TripLeg], ctx: &AssemblyContext<'_>) {
    let requested = |name: &str| Some(name.to_string()).filter(|n| !n.is_empty());
    for i in 0..legs.len() {
        if legs[i].origin.id.is_empty() {
            let (id, name) = match i {
                0 => (ctx.origin_id.to_string(), requested(ctx.origin_name)),
                _ => {
                    let prev = &legs[i - 1].destination;
                    (prev.id.clone(), Some(prev.name.clone()))
                }
            };
            let origin = &mut legs[i].origin;
            origin.id = id;
            if origin.name.is_empty() {
                origin.name = name.unwrap_or_else(|| origin.id.clone());
            }
        }
    }

    let last = legs.len().saturating_sub(1);
    for i in (0..legs.len()).rev() {
        if legs[i].destination.id.is_empty() {
            let (id, name) = if i == last {
                (ctx.destination_id.to_string(), requested(ctx.destination_name))
            } else {
                let next = &legs[i + 1].origin;
                (next.id.clone(), Some(next.name.clone()))
            };
            let destination = &mut legs[i].destination;
            destination.id = id;
            if destination.name.is_empty() {
                destination.name = name.unwrap_or_else(|| destination.id.clone());
            }
        }
    }
}

/// Apply exact-match delays to every stop of the leg. Returns whether any
/// stop matched.
fn apply_delays(leg: &mut TripLeg, overlay: &DelayOverlay) -> bool {
    let Some(line) = leg.line_id.clone() else {
        return false;
    };
    let mut matched = false;
    for stop in leg.stops_mut() {
        if let Some(estimated) = overlay.estimate(&line, &stop.id, stop.scheduled_time) {
            stop.apply_estimate(estimated);
            matched = true;
        }
    }
    matched
}

/// Active disruptions touching any stop or line of the trip, most severe
/// first, capped at [`MAX_DISRUPTIONS_PER_TRIP`].
fn related_disruptions(trip: &Trip, disruptions: &[Disruption]) -> Vec<Disruption> {
    let mut stops: HashSet<&str> = HashSet::new();
    let mut lines: HashSet<&str> = HashSet::new();
    for leg in trip.legs() {
        for stop in leg.stops() {
            stops.insert(stop.id.as_str());
            stops.insert(place_id(&stop.id));
        }
        lines.extend(leg.line_id.as_deref());
        lines.extend(leg.line_name.as_deref());
    }

    let mut related: Vec<Disruption> = disruptions
        .iter()
        .filter(|d| d.affects(&stops, &lines))
        .cloned()
        .collect();
    related.sort_by(|a, b| b.severity.cmp(&a.severity));
    related.truncate(MAX_DISRUPTIONS_PER_TRIP);
    related
}
