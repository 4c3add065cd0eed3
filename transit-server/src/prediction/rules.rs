//! Point table for the delay heuristic.
//!
//! Each rule maps one kind of traffic observation to whole minutes of
//! delay. The table is also published by `/api/info`.

use serde::Serialize;

use crate::domain::{IncidentSeverity, LevelOfService};

/// Distance within which traffic data counts as on the leg's path.
pub const PATH_RADIUS_M: f64 = 300.0;

/// Only legs departing within this many minutes get a prediction.
pub const HORIZON_MINUTES: i64 = 15;

/// Spillback length worth one minute of delay.
pub const SPILLBACK_METERS_PER_MINUTE: f64 = 100.0;

pub fn incident_minutes(severity: IncidentSeverity) -> u32 {
    match severity {
        IncidentSeverity::Severe => 8,
        IncidentSeverity::Moderate => 4,
        IncidentSeverity::Minor => 0,
    }
}

pub fn level_of_service_minutes(los: LevelOfService) -> u32 {
    match los {
        LevelOfService::F => 6,
        LevelOfService::E => 4,
        LevelOfService::D => 2,
        LevelOfService::A | LevelOfService::B | LevelOfService::C => 0,
    }
}

/// One minute per full 100 m of queue.
pub fn spillback_minutes(length_m: f64) -> u32 {
    if !length_m.is_finite() || length_m <= 0.0 {
        return 0;
    }
    (length_m / SPILLBACK_METERS_PER_MINUTE).floor() as u32
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RuleDescription {
    pub condition: &'static str,
    pub effect: &'static str,
}

/// Human-readable form of the rules, in evaluation order.
pub const RULE_TABLE: &[RuleDescription] = &[
    RuleDescription {
        condition: "Severe traffic incident within 300 m of the route",
        effect: "+8 min",
    },
    RuleDescription {
        condition: "Moderate traffic incident within 300 m of the route",
        effect: "+4 min",
    },
    RuleDescription {
        condition: "Level of service F on a route segment",
        effect: "+6 min",
    },
    RuleDescription {
        condition: "Level of service E on a route segment",
        effect: "+4 min",
    },
    RuleDescription {
        condition: "Level of service D on a route segment",
        effect: "+2 min",
    },
    RuleDescription {
        condition: "Queue spillback at a nearby traffic light",
        effect: "+1 min per 100 m",
    },
    RuleDescription {
        condition: "Peak hour (05:45-07:00, 16:30-18:00 local time)",
        effect: "x1.5, rounded half up",
    },
];
