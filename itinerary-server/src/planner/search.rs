//! Direct itinerary search.
//!
//! Finds every trip that carries a passenger from one of the origin stops
//! to one of the destination stops on a given service date, without
//! changes.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::domain::{Itinerary, Route, RouteId, Stop, StopId, TimeOfDay, TimedStop, Trip};
use crate::store::{EntityStore, StoreError};

use super::config::QueryConfig;
use super::rank::rank_itineraries;

/// Error reading routes during a search.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// Failed to read a route from the source
    #[error("failed to read route {route}: {message}")]
    RouteRead { route: String, message: String },

    /// Failed to enumerate routes
    #[error("failed to list routes: {0}")]
    Listing(String),
}

impl From<StoreError> for SearchError {
    fn from(e: StoreError) -> Self {
        match &e {
            StoreError::Codec { route, .. } => SearchError::RouteRead {
                route: route.clone(),
                message: e.to_string(),
            },
            _ => SearchError::Listing(e.to_string()),
        }
    }
}

/// Trait for providing routes to search.
///
/// This abstraction allows the planner to be tested without a database.
pub trait RouteSource {
    /// Get a single route. An unknown id is `Ok(None)`.
    fn route(&self, id: &RouteId) -> Result<Option<Arc<Route>>, SearchError>;

    /// Iterate over every route.
    fn routes(&self) -> impl Iterator<Item = Result<Arc<Route>, SearchError>> + '_;
}

impl RouteSource for EntityStore {
    fn route(&self, id: &RouteId) -> Result<Option<Arc<Route>>, SearchError> {
        Ok(self.get(id)?)
    }

    fn routes(&self) -> impl Iterator<Item = Result<Arc<Route>, SearchError>> + '_ {
        self.stream_all()
            .map(|r| r.map(Arc::new).map_err(SearchError::from))
    }
}

impl RouteSource for BTreeMap<RouteId, Arc<Route>> {
    fn route(&self, id: &RouteId) -> Result<Option<Arc<Route>>, SearchError> {
        Ok(self.get(id).cloned())
    }

    fn routes(&self) -> impl Iterator<Item = Result<Arc<Route>, SearchError>> + '_ {
        self.values().cloned().map(Ok)
    }
}

/// Request for an itinerary search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Stops the passenger may board at.
    pub origins: Vec<StopId>,

    /// Stops the passenger may alight at.
    pub destinations: Vec<StopId>,

    /// Service date.
    pub date: NaiveDate,

    /// Restrict the search to these routes instead of scanning them all.
    pub routes: Option<Vec<RouteId>>,

    /// Only return itineraries departing at or after this time.
    pub departing_after: Option<TimeOfDay>,
}

impl SearchRequest {
    /// Create a new search request. Repeated stops are ignored.
    pub fn new(
        origins: impl IntoIterator<Item = StopId>,
        destinations: impl IntoIterator<Item = StopId>,
        date: NaiveDate,
    ) -> Self {
        Self {
            origins: unique(origins),
            destinations: unique(destinations),
            date,
            routes: None,
            departing_after: None,
        }
    }

    pub fn with_routes(mut self, routes: impl IntoIterator<Item = RouteId>) -> Self {
        self.routes = Some(routes.into_iter().collect());
        self
    }

    pub fn departing_after(mut self, time: TimeOfDay) -> Self {
        self.departing_after = Some(time);
        self
    }
}

/// Result of an itinerary search.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    /// Found itineraries, in departure order.
    pub itineraries: Vec<Itinerary>,

    /// Number of routes examined.
    pub routes_scanned: usize,

    /// Number of routes that could not be read and were skipped.
    pub routes_failed: usize,
}

/// Itinerary planner over a route source.
pub struct Planner<'a, S: RouteSource> {
    source: &'a S,
    config: &'a QueryConfig,
}

impl<'a, S: RouteSource> Planner<'a, S> {
    /// Create a new planner.
    pub fn new(source: &'a S, config: &'a QueryConfig) -> Self {
        Self { source, config }
    }

    /// Find direct itineraries for `request`.
    ///
    /// Routes that cannot be read are logged and contribute nothing.
    pub fn search(&self, request: &SearchRequest) -> SearchResult {
        let mut result = SearchResult::default();
        if request.origins.is_empty() || request.destinations.is_empty() {
            return result;
        }

        let mut found = Vec::new();
        let mut visit = |route: Result<Arc<Route>, SearchError>, result: &mut SearchResult| {
            result.routes_scanned += 1;
            match route {
                Ok(route) => found.extend(itineraries_for_route(
                    &route,
                    &request.origins,
                    &request.destinations,
                    request.date,
                )),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable route");
                    result.routes_failed += 1;
                }
            }
        };

        match &request.routes {
            Some(ids) => {
                for id in ids {
                    match self.source.route(id) {
                        Ok(Some(route)) => visit(Ok(route), &mut result),
                        Ok(None) => debug!(route = %id, "candidate route not in store"),
                        Err(e) => visit(Err(e), &mut result),
                    }
                }
            }
            None => {
                for route in self.source.routes() {
                    visit(route, &mut result);
                }
            }
        }

        if let Some(after) = request.departing_after {
            found.retain(|it| it.departure >= after);
        }

        let mut itineraries = rank_itineraries(found);
        if let Some(max) = self.config.max_results {
            itineraries.truncate(max);
        }

        debug!(
            origins = request.origins.len(),
            destinations = request.destinations.len(),
            date = %request.date,
            routes = result.routes_scanned,
            found = itineraries.len(),
            "itinerary search finished"
        );
        result.itineraries = itineraries;
        result
    }
}

/// Every direct itinerary `route` offers between the given stops on `date`,
/// in discovery order (trip, then origin, then destination).
pub fn itineraries_for_route(
    route: &Route,
    origins: &[StopId],
    destinations: &[StopId],
    date: NaiveDate,
) -> Vec<Itinerary> {
    if !route.has_any_stop(origins.iter()) || !route.has_any_stop(destinations.iter()) {
        return Vec::new();
    }

    let mut itineraries = Vec::new();
    for trip in route.trips().iter().filter(|t| t.runs_on(date)) {
        for origin in origins {
            let Some(boarding) = trip.timed_stop(origin.as_str()) else {
                continue;
            };
            for destination in destinations {
                let Some(alighting) = trip.timed_stop(destination.as_str()) else {
                    continue;
                };
                if boarding.sequence >= alighting.sequence {
                    continue;
                }
                itineraries.push(build_itinerary(route, trip, boarding, alighting));
            }
        }
    }
    itineraries
}

fn build_itinerary(route: &Route, trip: &Trip, boarding: &TimedStop, alighting: &TimedStop) -> Itinerary {
    Itinerary {
        origin: stop_for(route, boarding),
        destination: stop_for(route, alighting),
        departure: boarding.departure,
        arrival: alighting.arrival,
        route: route.into(),
        trip: trip.into(),
    }
}

/// The route's stop entity, or one built from the schedule entry.
fn stop_for(route: &Route, timed: &TimedStop) -> Stop {
    route
        .stop(timed.stop_id.as_str())
        .cloned()
        .unwrap_or_else(|| Stop::new(timed.stop_id.as_str(), timed.stop_name.clone(), 0.0, 0.0))
}

fn unique(ids: impl IntoIterator<Item = StopId>) -> Vec<StopId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
#[path = "search_tests.rs"]
mod tests;
