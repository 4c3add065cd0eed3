//! Swiss public transport aggregator.
//!
//! Plans trips through an external journey planner, overlays live delays,
//! predicts bus and tram delays from road traffic, and keeps subscribers
//! informed about service disruptions.

pub mod assembler;
pub mod availability;
pub mod config;
pub mod disruptions;
pub mod domain;
pub mod events;
pub mod prediction;
pub mod tasks;
pub mod upstream;
pub mod web;
