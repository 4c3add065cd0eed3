use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use transit_server::availability::AvailabilityTracker;
use transit_server::config::AppConfig;
use transit_server::disruptions::{DisruptionAggregator, DisruptionStore};
use transit_server::events::Broadcaster;
use transit_server::tasks;
use transit_server::upstream::Feeds;
use transit_server::web::{AppState, create_router};

const DEFAULT_LOG_FILTER: &str = "transit_server=info,tower_http=info";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Arc::new(AppConfig::from_env().expect("Invalid configuration"));
    if config.api_key.is_empty() {
        warn!("OTD_API_KEY not set; upstream calls will be rejected");
    }

    let tracker = Arc::new(AvailabilityTracker::new(config.availability_threshold));
    let feeds = Arc::new(Feeds::new(&config, tracker).expect("Failed to create HTTP client"));

    let broadcaster = Broadcaster::new(config.max_subscribers);
    let store = DisruptionStore::new();
    let aggregator = DisruptionAggregator::new(store.clone(), broadcaster.clone());

    tasks::spawn_all(&config, Arc::clone(&feeds), aggregator, broadcaster.clone());

    let state = AppState::new(Arc::clone(&config), feeds, store, broadcaster);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind");
    info!(addr = %config.bind_addr, timezone = %config.timezone, "transit server listening");

    axum::serve(listener, app).await.expect("Server error");
}
