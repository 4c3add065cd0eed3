//! Service disruptions from the situation-exchange feed.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How urgent a disruption is. Ordered by ascending urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Severe,
}

impl Severity {
    /// Map a SIRI `Severity` value.
    ///
    /// Unknown values are treated as `Warning`.
    pub fn from_siri(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "noimpact" | "slight" | "veryslight" => Self::Info,
            "severe" | "verysevere" => Self::Severe,
            _ => Self::Warning,
        }
    }
}

/// A disruption record, keyed by its upstream identifier.
///
/// Whether a disruption is active depends on the time of the read, so it is
/// computed with [`Disruption::is_active_at`] and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disruption {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub affected_lines: Vec<String>,
    pub affected_stops: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Disruption {
    /// Whether the validity window contains `now`.
    ///
    /// A missing bound is open: no window at all means always active.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        let started = self.start_time.is_none_or(|start| start <= now);
        let not_ended = self.end_time.is_none_or(|end| now <= end);
        started && not_ended
    }

    /// Whether this disruption touches any of the given stops or lines.
    pub fn affects(&self, stops: &HashSet<&str>, lines: &HashSet<&str>) -> bool {
        self.affected_stops.iter().any(|s| stops.contains(s.as_str()))
            || self.affected_lines.iter().any(|l| lines.contains(l.as_str()))
    }
}
