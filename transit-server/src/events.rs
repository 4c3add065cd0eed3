//! Push channel for live disruption updates.
//!
//! Each subscriber owns a bounded queue. Messages are serialized once and
//! fanned out with `try_send`; a subscriber whose queue is full or closed is
//! dropped from the registry rather than awaited.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::Disruption;
use crate::web::DisruptionDto;

/// Default cap on concurrent subscribers.
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 256;

/// Queue depth per subscriber.
const SUBSCRIBER_BUFFER: usize = 32;

/// A message pushed to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum EventMessage {
    Heartbeat,
    Disruptions(Vec<DisruptionDto>),
    Availability { available: bool },
}

impl EventMessage {
    pub fn disruptions(active: &[Disruption], now: DateTime<Utc>) -> Self {
        Self::Disruptions(
            active
                .iter()
                .map(|d| DisruptionDto::from_disruption(d, now))
                .collect(),
        )
    }

    /// Wire form of the message.
    pub fn to_json(&self) -> String {
        let value = match self {
            Self::Heartbeat => json!({ "type": "heartbeat" }),
            Self::Disruptions(disruptions) => json!({ "disruptions": disruptions }),
            Self::Availability { available } => json!({ "available": available }),
        };
        value.to_string()
    }
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Arc<str>>,
}

struct Registry {
    subscribers: RwLock<VecDeque<Subscriber>>,
    next_id: AtomicU64,
    max_subscribers: usize,
}

impl Registry {
    fn remove(&self, ids: &[u64]) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|s| !ids.contains(&s.id));
    }
}

/// Fan-out of [`EventMessage`]s to subscribers.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    /// A `max_subscribers` of 0 is treated as 1.
    pub fn new(max_subscribers: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                subscribers: RwLock::new(VecDeque::new()),
                next_id: AtomicU64::new(1),
                max_subscribers: max_subscribers.max(1),
            }),
        }
    }

    /// Register a subscriber whose queue starts with `initial`.
    ///
    /// At capacity, the oldest subscriber is evicted: its stream ends.
    pub fn subscribe(&self, initial: &[EventMessage]) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER.max(initial.len()));
        for message in initial {
            // Fresh channel sized for the initial messages.
            let _ = tx.try_send(Arc::from(message.to_json()));
        }

        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self
            .registry
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        while subscribers.len() >= self.registry.max_subscribers {
            if let Some(evicted) = subscribers.pop_front() {
                debug!(subscriber = evicted.id, "evicting oldest subscriber");
            }
        }
        subscribers.push_back(Subscriber { id, tx });
        let count = subscribers.len();
        drop(subscribers);

        debug!(subscriber = id, count, "subscriber registered");
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Send a message to every subscriber. Returns how many received it.
    pub fn broadcast(&self, message: &EventMessage) -> usize {
        let payload: Arc<str> = Arc::from(message.to_json());
        let mut dropped = Vec::new();
        let mut delivered = 0;

        {
            let subscribers = self
                .registry
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for subscriber in subscribers.iter() {
                match subscriber.tx.try_send(Arc::clone(&payload)) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(subscriber = subscriber.id, "dropping slow subscriber");
                        dropped.push(subscriber.id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => dropped.push(subscriber.id),
                }
            }
        }

        if !dropped.is_empty() {
            self.registry.remove(&dropped);
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Broadcast a heartbeat every `period`, forever.
    ///
    /// The first heartbeat goes out one period after start.
    pub async fn run_heartbeat(self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            let delivered = self.broadcast(&EventMessage::Heartbeat);
            debug!(delivered, "heartbeat");
        }
    }
}

/// A live subscription. Dropping it deregisters the subscriber.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<str>>,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Next serialized message, or `None` once the subscriber was removed.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    /// Convert into a stream of serialized messages.
    pub fn into_stream(self) -> impl futures::Stream<Item = Arc<str>> {
        futures::stream::unfold(self, |mut subscription| async move {
            let message = subscription.recv().await?;
            Some((message, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&[self.id]);
            debug!(subscriber = self.id, "subscriber deregistered");
        }
    }
}
