//! Web layer for the transport aggregator.
//!
//! Provides the JSON API for location search, trip planning, disruptions,
//! road traffic and the live event stream.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;
