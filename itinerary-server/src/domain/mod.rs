//! Domain types for the itinerary server.
//!
//! This module contains the schedule entities built from provider payloads:
//! stops, routes, trips and their timed stop visits. Types enforce their
//! invariants at construction time, so code that receives them can trust
//! their validity.

mod error;
mod itinerary;
mod route;
mod stop;
mod time;
mod trip;

pub use error::DomainError;
pub use itinerary::{Itinerary, ItineraryKey, RouteRef, TripRef};
pub use route::{Route, RouteId, RouteStub};
pub use stop::{Stop, StopId};
pub use time::{TimeOfDay, parse_service_date};
pub use trip::{TimedStop, Trip};
