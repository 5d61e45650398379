//! Route types.
//!
//! A `RouteStub` is what the provider's cheap summary listing gives us. A
//! `Route` is the fully ingested entity: the stub plus every stop and trip
//! from the route's detail payload. Routes are immutable once built and are
//! replaced wholesale on renewal.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Stop, StopId, Trip};

/// Route identifier from the provider summary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(String);

impl RouteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RouteId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Summary-level route information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStub {
    pub id: RouteId,
    /// Key used to request this route's detail payload.
    pub key: String,
    pub short_name: String,
    pub long_name: String,
    pub color: String,
    pub text_color: String,
}

/// A fully ingested route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub key: String,
    pub short_name: String,
    pub long_name: String,
    pub color: String,
    pub text_color: String,
    /// Union of all stops touched by any trip.
    stops: HashMap<StopId, Stop>,
    trips: Vec<Trip>,
}

impl Route {
    /// Build a route from its stub and the parsed detail.
    ///
    /// The first occurrence of each stop wins; later duplicates only
    /// contribute aliases.
    pub fn new(
        stub: RouteStub,
        stops: impl IntoIterator<Item = Stop>,
        trips: Vec<Trip>,
    ) -> Self {
        let mut by_id: HashMap<StopId, Stop> = HashMap::new();
        for stop in stops {
            match by_id.get_mut(&stop.id) {
                Some(existing) => {
                    for alias in stop.aliases() {
                        existing.add_alias(alias.clone());
                    }
                }
                None => {
                    by_id.insert(stop.id.clone(), stop);
                }
            }
        }

        Self {
            id: stub.id,
            key: stub.key,
            short_name: stub.short_name,
            long_name: stub.long_name,
            color: stub.color,
            text_color: stub.text_color,
            stops: by_id,
            trips,
        }
    }

    pub fn has_stop(&self, stop: &str) -> bool {
        self.stops.contains_key(stop)
    }

    pub fn stop(&self, stop: &str) -> Option<&Stop> {
        self.stops.get(stop)
    }

    pub fn stops(&self) -> impl Iterator<Item = &Stop> {
        self.stops.values()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    pub fn trips(&self) -> &[Trip] {
        &self.trips
    }

    /// Whether any of the given stops is served by this route.
    pub fn has_any_stop<'s>(&self, mut stops: impl Iterator<Item = &'s StopId>) -> bool {
        stops.any(|s| self.stops.contains_key(s))
    }

    /// The summary-level view of this route.
    pub fn stub(&self) -> RouteStub {
        RouteStub {
            id: self.id.clone(),
            key: self.key.clone(),
            short_name: self.short_name.clone(),
            long_name: self.long_name.clone(),
            color: self.color.clone(),
            text_color: self.text_color.clone(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.long_name, self.id)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn stub(id: &str) -> RouteStub {
        RouteStub {
            id: RouteId::new(id),
            key: id.to_string(),
            short_name: id.to_string(),
            long_name: format!("Route {id}"),
            color: "#ED1944".to_string(),
            text_color: "#FFFFFF".to_string(),
        }
    }

    /// Build a route whose stops are derived from its trips' schedules.
    pub fn route(id: &str, trips: Vec<Trip>) -> Route {
        let stops: Vec<Stop> = trips
            .iter()
            .flat_map(|t| t.stops())
            .map(|ts| Stop::new(ts.stop_id.as_str(), ts.stop_name.clone(), 0.0, 0.0))
            .collect();
        Route::new(stub(id), stops, trips)
    }
}
