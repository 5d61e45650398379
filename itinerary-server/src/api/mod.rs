//! Query façade over the entity store.
//!
//! This is the surface an HTTP layer would call: it turns stop ids and a
//! date string into itinerary DTOs, and lists or searches stops.

mod dto;
mod state;

pub use dto::{ItineraryDto, StopDto};
pub use state::AppState;
