//! Realtime delay overlay.
//!
//! Delays are keyed by the exact `(line, stop, scheduled time)` triple. There
//! is deliberately no fuzzy matching: a stop whose triple is absent simply
//! has no live estimate.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DelayKey {
    line: String,
    stop: String,
    scheduled: DateTime<Utc>,
}

/// Live delays indexed for exact lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelayOverlay {
    delays: HashMap<DelayKey, i64>,
}

impl DelayOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delay in seconds (negative when early).
    pub fn insert(
        &mut self,
        line: impl Into<String>,
        stop: impl Into<String>,
        scheduled: DateTime<Utc>,
        delay_secs: i64,
    ) {
        let key = DelayKey {
            line: line.into(),
            stop: stop.into(),
            scheduled,
        };
        self.delays.insert(key, delay_secs);
    }

    /// Estimated time for an exact match.
    pub fn estimate(
        &self,
        line: &str,
        stop: &str,
        scheduled: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let key = DelayKey {
            line: line.to_string(),
            stop: stop.to_string(),
            scheduled,
        };
        self.delays
            .get(&key)
            .map(|secs| scheduled + Duration::seconds(*secs))
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }
}
