//! Application state for the web layer.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::disruptions::DisruptionStore;
use crate::events::Broadcaster;
use crate::upstream::Feeds;

/// Shared application state.
///
/// Cheap to clone; every handler gets its own copy.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Upstream adapters and the availability tracker
    pub feeds: Arc<Feeds>,

    /// Canonical disruption set, kept current by the poll task
    pub disruptions: DisruptionStore,

    /// Push channel behind `/api/events`
    pub broadcaster: Broadcaster,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        feeds: Arc<Feeds>,
        disruptions: DisruptionStore,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            config,
            feeds,
            disruptions,
            broadcaster,
        }
    }
}
