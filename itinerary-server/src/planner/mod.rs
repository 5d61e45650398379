//! Itinerary query engine.
//!
//! This module answers the question: "which trips take me directly from one
//! of these stops to one of those stops on this day, and when?"
//!
//! Routes are scanned from a `RouteSource` (the entity store in
//! production), trips not running on the date are skipped, and every trip
//! visiting an origin before a destination yields an itinerary. Results are
//! ordered by departure with exact repeats removed.

mod config;
mod rank;
pub mod resolve;
mod search;

pub use config::QueryConfig;
pub use rank::rank_itineraries;
pub use resolve::{MatchBy, all_stops, match_stops, resolve_stop_ids, search_stops};
pub use search::{
    Planner, RouteSource, SearchError, SearchRequest, SearchResult, itineraries_for_route,
};
