//! Predicted delay attached to road-based legs.

use chrono::{DateTime, Utc};

/// Heuristic delay estimate for a leg. Recomputed on every request.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayPrediction {
    pub predicted_delay_minutes: u32,
    /// Share of the leg's path covered by traffic data, in [0, 1].
    pub confidence: f64,
    /// Contributing factors, in the order the rules were applied.
    pub factors: Vec<String>,
    pub is_peak_hour: bool,
    pub prediction_time: DateTime<Utc>,
}
