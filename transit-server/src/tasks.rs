//! Background tasks: feed polling, heartbeat and availability relay.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::availability::{AvailabilityTracker, Source};
use crate::config::AppConfig;
use crate::disruptions::DisruptionAggregator;
use crate::events::{Broadcaster, EventMessage};
use crate::upstream::Feeds;

/// Spawn every background task. Handles are returned for shutdown.
pub fn spawn_all(
    config: &AppConfig,
    feeds: Arc<Feeds>,
    aggregator: DisruptionAggregator,
    broadcaster: Broadcaster,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(6);

    let disruption_feeds = Arc::clone(&feeds);
    handles.push(spawn_poll("disruptions", config.poll_interval_disruptions, move || {
        let feeds = Arc::clone(&disruption_feeds);
        let aggregator = aggregator.clone();
        async move {
            aggregator.poll(&feeds.disruptions).await;
        }
    }));

    let delay_feeds = Arc::clone(&feeds);
    handles.push(spawn_poll("delays", config.poll_interval_delays, move || {
        let feeds = Arc::clone(&delay_feeds);
        async move {
            let result = feeds.delays.poll().await;
            debug!(entries = result.value.len(), freshness = ?result.freshness, "delay poll");
        }
    }));

    let situation_feeds = Arc::clone(&feeds);
    handles.push(spawn_poll("traffic_situations", config.poll_interval_traffic, move || {
        let feeds = Arc::clone(&situation_feeds);
        async move {
            let result = feeds.situations.refresh().await;
            debug!(
                situations = result.value.len(),
                freshness = ?result.freshness,
                "situation poll"
            );
        }
    }));

    let light_feeds = Arc::clone(&feeds);
    handles.push(spawn_poll("traffic_lights", config.poll_interval_traffic, move || {
        let feeds = Arc::clone(&light_feeds);
        async move {
            let result = feeds.lights.refresh().await;
            debug!(lights = result.value.len(), freshness = ?result.freshness, "light poll");
        }
    }));

    handles.push(tokio::spawn(
        broadcaster.clone().run_heartbeat(config.heartbeat_interval),
    ));
    handles.push(tokio::spawn(relay_availability(
        Arc::clone(feeds.tracker()),
        broadcaster,
    )));

    info!(tasks = handles.len(), "background tasks started");
    handles
}

/// Run `poll` now and then every `period`. Polls never overlap.
fn spawn_poll<F, Fut>(name: &'static str, period: Duration, poll: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            debug!(task = name, "polling");
            poll().await;
        }
    })
}

/// Forward disruption-source availability changes to subscribers.
pub async fn relay_availability(tracker: Arc<AvailabilityTracker>, broadcaster: Broadcaster) {
    let mut changes = tracker.subscribe();
    loop {
        match changes.recv().await {
            Ok(change) if change.source == Source::Disruptions => {
                broadcaster.broadcast(&EventMessage::Availability {
                    available: change.available,
                });
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "availability relay lagged");
                // Resend the current state in case a flip was skipped.
                broadcaster.broadcast(&EventMessage::Availability {
                    available: tracker.is_available(Source::Disruptions),
                });
            }
            Err(RecvError::Closed) => break,
        }
    }
}
