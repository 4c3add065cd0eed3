//! Canonical disruption set.
//!
//! The set is replaced wholesale by each fresh poll (last poll wins) and
//! swapped under a lock, so readers see either the old or the new set and
//! never a mix. Whether a disruption is active is evaluated at read time.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::{Disruption, place_id};
use crate::events::{Broadcaster, EventMessage, Subscription};
use crate::upstream::{DisruptionFeed, FeedResult};

/// Thread-safe disruption store.
#[derive(Clone, Default)]
pub struct DisruptionStore {
    inner: Arc<RwLock<Arc<Vec<Disruption>>>>,
}

impl DisruptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The whole set, active or not.
    pub async fn snapshot(&self) -> Arc<Vec<Disruption>> {
        Arc::clone(&*self.inner.read().await)
    }

    /// Disruptions active at `now`, in upstream order.
    pub async fn active_at(&self, now: DateTime<Utc>, limit: usize) -> Vec<Disruption> {
        self.snapshot()
            .await
            .iter()
            .filter(|d| d.is_active_at(now))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Active disruptions touching any of the given stops or lines.
    ///
    /// Stops match on their own id or on their stop place.
    pub async fn for_route(
        &self,
        stop_ids: &[String],
        line_refs: &[String],
        now: DateTime<Utc>,
    ) -> Vec<Disruption> {
        let stops: HashSet<&str> = stop_ids
            .iter()
            .flat_map(|id| [id.as_str(), place_id(id)])
            .collect();
        let lines: HashSet<&str> = line_refs.iter().map(String::as_str).collect();

        self.snapshot()
            .await
            .iter()
            .filter(|d| d.is_active_at(now) && d.affects(&stops, &lines))
            .cloned()
            .collect()
    }

    /// Replace the set. Records sharing an id are collapsed to the first.
    ///
    /// Returns whether the set changed.
    pub async fn replace(&self, disruptions: &[Disruption]) -> bool {
        self.replace_then(disruptions, |_| {}).await
    }

    /// Like [`replace`](Self::replace), but runs `on_change` with the new set
    /// before the write lock is released.
    async fn replace_then(
        &self,
        disruptions: &[Disruption],
        on_change: impl FnOnce(&[Disruption]),
    ) -> bool {
        let mut seen = HashSet::new();
        let deduped: Vec<Disruption> = disruptions
            .iter()
            .filter(|d| seen.insert(d.id.as_str()))
            .cloned()
            .collect();

        let mut guard = self.inner.write().await;
        if **guard == deduped {
            return false;
        }
        *guard = Arc::new(deduped);
        on_change(guard.as_slice());
        true
    }

    /// Register an event subscriber whose first frame is the set active at
    /// `now`, followed by the disruption source's availability.
    ///
    /// Registration happens under the read lock. An update racing with it
    /// is either in the first frame or broadcast to the new subscriber.
    pub async fn subscribe(
        &self,
        broadcaster: &Broadcaster,
        now: DateTime<Utc>,
        available: bool,
    ) -> Subscription {
        let guard = self.inner.read().await;
        let active: Vec<Disruption> = guard
            .iter()
            .filter(|d| d.is_active_at(now))
            .cloned()
            .collect();
        broadcaster.subscribe(&[
            EventMessage::disruptions(&active, now),
            EventMessage::Availability { available },
        ])
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// Applies disruption polls to the store and notifies subscribers.
#[derive(Clone)]
pub struct DisruptionAggregator {
    store: DisruptionStore,
    broadcaster: Broadcaster,
}

impl DisruptionAggregator {
    pub fn new(store: DisruptionStore, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }

    pub fn store(&self) -> &DisruptionStore {
        &self.store
    }

    /// Poll the feed once and apply the result.
    pub async fn poll(&self, feed: &DisruptionFeed) -> bool {
        let result = feed.fetch().await;
        self.apply(&result, Utc::now()).await
    }

    /// Apply a poll result. Only fresh results replace the set; degraded
    /// results keep the last good snapshot.
    ///
    /// Broadcasts the active set and returns true when the set changed.
    pub async fn apply(
        &self,
        result: &FeedResult<Arc<Vec<Disruption>>>,
        now: DateTime<Utc>,
    ) -> bool {
        if !result.is_fresh() {
            debug!(freshness = ?result.freshness, "keeping last disruption snapshot");
            return false;
        }

        let total = result.value.len();
        let broadcaster = &self.broadcaster;
        let changed = self
            .store
            .replace_then(&result.value, |set| {
                let active: Vec<Disruption> = set
                    .iter()
                    .filter(|d| d.is_active_at(now))
                    .cloned()
                    .collect();
                info!(total, active = active.len(), "disruptions updated");
                let delivered = broadcaster.broadcast(&EventMessage::disruptions(&active, now));
                debug!(delivered, "disruption update broadcast");
            })
            .await;
        if !changed {
            debug!("disruptions unchanged");
        }
        changed
    }
}
