//! Trip assembly: upstream itineraries plus live delays, predictions and
//! disruptions, checked against the trip invariants.

mod assemble;
mod overlay;

pub use assemble::{AssemblyContext, MAX_DISRUPTIONS_PER_TRIP, assemble};
pub use overlay::DelayOverlay;
