//! Transit itinerary server.
//!
//! Fetches route schedules from a remote provider, keeps them in a
//! two-tier cache (raw responses on disk, decoded routes in a SQLite
//! store), renews them in the background, and answers: "which trips take
//! me directly from this stop to that stop on this day?"

pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod ingest;
pub mod planner;
pub mod provider;
pub mod renewal;
pub mod store;
