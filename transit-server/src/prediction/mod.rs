//! Heuristic delay prediction for road-based legs.
//!
//! Buses and trams have no live delay coverage, so their delay is estimated
//! from road traffic along the leg's path. [`predict`] is a pure function of
//! the traffic snapshot, the leg and the clock: identical inputs always give
//! identical output.
//!
//! The leg path is the ordered list of stop coordinates. Consecutive stops
//! form segments; a segment is covered when a traffic light lies within
//! [`PATH_RADIUS_M`] of either end. Scores are added in a fixed order
//! (incidents, level of service, spillback) and then scaled during peak
//! hours.

pub mod peak;
pub mod rules;

use std::collections::HashSet;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::domain::{
    Coordinate, DelayPrediction, LevelOfService, TrafficLightStatus, TrafficSnapshot, TripLeg,
};

pub use rules::{HORIZON_MINUTES, PATH_RADIUS_M, RULE_TABLE, RuleDescription};

/// Predict the delay of `leg` at `clock`.
///
/// Returns `None` for modes other than bus and tram, and for legs departing
/// before `clock` or more than [`HORIZON_MINUTES`] after it.
pub fn predict<Tz: TimeZone>(
    snapshot: &TrafficSnapshot,
    leg: &TripLeg,
    clock: &DateTime<Tz>,
) -> Option<DelayPrediction> {
    if !leg.mode.is_road_based() {
        return None;
    }

    let now = clock.with_timezone(&Utc);
    let departure = leg.departure_time();
    if departure < now || departure > now + Duration::minutes(HORIZON_MINUTES) {
        return None;
    }

    let path: Vec<Coordinate> = leg.stops().filter_map(|stop| stop.position).collect();
    let lights: Vec<(&TrafficLightStatus, Coordinate)> = snapshot
        .lights
        .iter()
        .filter_map(|light| light.position.map(|p| (light, p)))
        .collect();
    let near_path =
        |point: &Coordinate| path.iter().any(|stop| stop.is_within(point, PATH_RADIUS_M));

    let mut factors = Vec::new();
    let mut total: u32 = 0;

    // Incidents
    let mut incident_minutes = 0;
    let mut incident_count = 0;
    for situation in snapshot.situations.iter() {
        if !situation.is_active_at(now) || !situation.position.as_ref().is_some_and(near_path) {
            continue;
        }
        let minutes = rules::incident_minutes(situation.severity);
        if minutes > 0 {
            incident_minutes += minutes;
            incident_count += 1;
        }
    }
    if incident_minutes > 0 {
        total += incident_minutes;
        factors.push(format!(
            "{incident_count} traffic incident(s) on route: +{incident_minutes} min"
        ));
    }

    // Level of service, per covered segment
    let mut segments = 0usize;
    let mut covered = 0usize;
    let mut los_minutes = 0;
    let mut worst_overall: Option<LevelOfService> = None;
    for pair in path.windows(2) {
        segments += 1;
        let (a, b) = (&pair[0], &pair[1]);
        let mut is_covered = false;
        let mut worst: Option<LevelOfService> = None;
        for (light, position) in &lights {
            if position.is_within(a, PATH_RADIUS_M) || position.is_within(b, PATH_RADIUS_M) {
                is_covered = true;
                worst = worst.max(light.level_of_service);
            }
        }
        if is_covered {
            covered += 1;
            if let Some(los) = worst {
                los_minutes += rules::level_of_service_minutes(los);
            }
            worst_overall = worst_overall.max(worst);
        }
    }
    if los_minutes > 0 {
        total += los_minutes;
        let worst = worst_overall.map(|l| l.to_string()).unwrap_or_default();
        factors.push(format!(
            "Congestion (worst level of service {worst}): +{los_minutes} min"
        ));
    }

    // Spillback, each light counted once
    let mut spillback_minutes = 0;
    let mut queued_at: Vec<&str> = Vec::new();
    let mut seen = HashSet::new();
    for (light, position) in &lights {
        if !near_path(position) || !seen.insert(light.intersection_id.as_str()) {
            continue;
        }
        let minutes = light
            .spillback_length_meters
            .map(rules::spillback_minutes)
            .unwrap_or(0);
        if minutes > 0 {
            spillback_minutes += minutes;
            queued_at.push(light.label());
        }
    }
    if spillback_minutes > 0 {
        total += spillback_minutes;
        factors.push(format!(
            "Queue spillback at {}: +{spillback_minutes} min",
            queued_at.join(", ")
        ));
    }

    let is_peak_hour = peak::is_peak(clock.time());
    if is_peak_hour && total > 0 {
        let scaled = peak::apply_multiplier(total);
        factors.push(format!("Peak hour x1.5: +{} min", scaled - total));
        total = scaled;
    }

    let confidence = if segments == 0 {
        0.0
    } else {
        covered as f64 / segments as f64
    };

    Some(DelayPrediction {
        predicted_delay_minutes: total,
        confidence,
        factors,
        is_peak_hour,
        prediction_time: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono_tz::Europe::Zurich;

    use crate::domain::{
        IncidentSeverity, StopPoint, TrafficSituation, TransportMode,
    };

    // About 600 m apart, further than the path radius.
    const BELLEVUE: Coordinate = Coordinate::new(47.3667, 8.5450);
    const HEIMPLATZ: Coordinate = Coordinate::new(47.3667, 8.5530);
    const FAR_AWAY: Coordinate = Coordinate::new(46.9490, 7.4391);

    fn clock(h: u32, m: u32) -> DateTime<chrono_tz::Tz> {
        Zurich.with_ymd_and_hms(2024, 3, 15, h, m, 0).unwrap()
    }

    fn bus_leg(departure: DateTime<chrono_tz::Tz>, mode: TransportMode) -> TripLeg {
        let dep = departure.with_timezone(&Utc);
        TripLeg::new(
            "leg_0",
            mode,
            StopPoint::scheduled("8591123", "Zürich, Bellevue", dep).with_position(Some(BELLEVUE)),
            StopPoint::scheduled("8591381", "Zürich, Heimplatz", dep + Duration::minutes(3))
                .with_position(Some(HEIMPLATZ)),
        )
    }

    fn situation(severity: IncidentSeverity, position: Coordinate) -> TrafficSituation {
        TrafficSituation {
            id: format!("{severity:?}"),
            description: String::new(),
            position: Some(position),
            severity,
            start_time: None,
            end_time: None,
        }
    }

    fn light(
        id: &str,
        position: Coordinate,
        los: Option<LevelOfService>,
        spillback: Option<f64>,
    ) -> TrafficLightStatus {
        TrafficLightStatus {
            intersection_id: id.into(),
            area_id: "zh".into(),
            name: None,
            level_of_service: los,
            spillback_length_meters: spillback,
            green_percentage: None,
            position: Some(position),
        }
    }

    fn snapshot(
        situations: Vec<TrafficSituation>,
        lights: Vec<TrafficLightStatus>,
    ) -> TrafficSnapshot {
        TrafficSnapshot::new(Arc::new(situations), Arc::new(lights))
    }

    #[test]
    fn severe_incident_and_los_f_at_peak() {
        let snapshot = snapshot(
            vec![situation(IncidentSeverity::Severe, BELLEVUE)],
            vec![light("K1", BELLEVUE, Some(LevelOfService::F), None)],
        );
        let now = clock(6, 0);
        let leg = bus_leg(clock(6, 5), TransportMode::Bus);

        let prediction = predict(&snapshot, &leg, &now).unwrap();
        assert_eq!(prediction.predicted_delay_minutes, 21);
        assert!(prediction.is_peak_hour);
        assert_eq!(prediction.confidence, 1.0);
        assert_eq!(prediction.factors.len(), 3);
        assert!(prediction.factors[0].contains("+8 min"));
        assert!(prediction.factors[1].contains("+6 min"));
        assert!(prediction.factors[2].starts_with("Peak hour"));
        assert_eq!(prediction.prediction_time, now.with_timezone(&Utc));
    }

    #[test]
    fn off_peak_is_unscaled() {
        let snapshot = snapshot(
            vec![situation(IncidentSeverity::Moderate, HEIMPLATZ)],
            vec![light("K1", HEIMPLATZ, Some(LevelOfService::E), Some(250.0))],
        );
        let leg = bus_leg(clock(12, 10), TransportMode::Tram);
        let prediction = predict(&snapshot, &leg, &clock(12, 0)).unwrap();
        // 4 (moderate) + 4 (E) + 2 (250 m spillback)
        assert_eq!(prediction.predicted_delay_minutes, 10);
        assert!(!prediction.is_peak_hour);
        assert_eq!(prediction.factors.len(), 3);
        assert!(prediction.factors[2].contains("K1"));
    }

    #[test]
    fn quiet_peak_has_no_peak_factor() {
        let leg = bus_leg(clock(17, 0), TransportMode::Bus);
        let prediction = predict(&TrafficSnapshot::default(), &leg, &clock(17, 0)).unwrap();
        assert_eq!(prediction.predicted_delay_minutes, 0);
        assert!(prediction.is_peak_hour);
        assert!(prediction.factors.is_empty());
        assert_eq!(prediction.confidence, 0.0);
    }

    #[test]
    fn far_away_traffic_is_ignored() {
        let snapshot = snapshot(
            vec![situation(IncidentSeverity::Severe, FAR_AWAY)],
            vec![light("K9", FAR_AWAY, Some(LevelOfService::F), Some(900.0))],
        );
        let leg = bus_leg(clock(12, 5), TransportMode::Bus);
        let prediction = predict(&snapshot, &leg, &clock(12, 0)).unwrap();
        assert_eq!(prediction.predicted_delay_minutes, 0);
        assert_eq!(prediction.confidence, 0.0);
    }

    #[test]
    fn inactive_incidents_are_ignored() {
        let mut ended = situation(IncidentSeverity::Severe, BELLEVUE);
        ended.end_time = Some(clock(11, 0).with_timezone(&Utc));
        let leg = bus_leg(clock(12, 5), TransportMode::Bus);
        let prediction = predict(&snapshot(vec![ended], vec![]), &leg, &clock(12, 0)).unwrap();
        assert_eq!(prediction.predicted_delay_minutes, 0);
    }

    #[test]
    fn minor_incidents_score_nothing() {
        let prediction = predict(
            &snapshot(vec![situation(IncidentSeverity::Minor, BELLEVUE)], vec![]),
            &bus_leg(clock(12, 5), TransportMode::Bus),
            &clock(12, 0),
        )
        .unwrap();
        assert_eq!(prediction.predicted_delay_minutes, 0);
        assert!(prediction.factors.is_empty());
    }

    #[test]
    fn partial_coverage() {
        let mut leg = bus_leg(clock(12, 5), TransportMode::Bus);
        leg.intermediate_stops.push(
            StopPoint::scheduled("x", "Far", clock(12, 6).with_timezone(&Utc))
                .with_position(Some(FAR_AWAY)),
        );
        // Bellevue-Far is covered by the light at Bellevue; Far-Heimplatz is not.
        let snapshot = snapshot(vec![], vec![light("K1", BELLEVUE, Some(LevelOfService::A), None)]);
        let prediction = predict(&snapshot, &leg, &clock(12, 0)).unwrap();
        assert_eq!(prediction.confidence, 0.5);
        assert_eq!(prediction.predicted_delay_minutes, 0);
    }

    #[test]
    fn only_road_modes() {
        let modes = [
            TransportMode::Rail,
            TransportMode::Metro,
            TransportMode::Walk,
            TransportMode::Ferry,
        ];
        for mode in modes {
            let leg = bus_leg(clock(12, 5), mode);
            assert!(predict(&TrafficSnapshot::default(), &leg, &clock(12, 0)).is_none());
        }
    }

    #[test]
    fn horizon_bounds() {
        let snapshot = TrafficSnapshot::default();
        let now = clock(12, 0);
        assert!(predict(&snapshot, &bus_leg(clock(12, 0), TransportMode::Bus), &now).is_some());
        assert!(predict(&snapshot, &bus_leg(clock(12, 15), TransportMode::Bus), &now).is_some());
        assert!(predict(&snapshot, &bus_leg(clock(12, 16), TransportMode::Bus), &now).is_none());
        assert!(predict(&snapshot, &bus_leg(clock(11, 59), TransportMode::Bus), &now).is_none());
    }

    #[test]
    fn leg_without_positions_has_zero_confidence() {
        let dep = clock(12, 5).with_timezone(&Utc);
        let leg = TripLeg::new(
            "leg_0",
            TransportMode::Bus,
            StopPoint::scheduled("a", "A", dep),
            StopPoint::scheduled("b", "B", dep + Duration::minutes(4)),
        );
        let prediction = predict(&TrafficSnapshot::default(), &leg, &clock(12, 0)).unwrap();
        assert_eq!(prediction.confidence, 0.0);
    }
}
