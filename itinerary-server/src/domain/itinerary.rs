//! Itinerary (query result) types.

use super::{Route, RouteId, Stop, TimeOfDay, Trip};

/// Identifies the route an itinerary rides on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteRef {
    pub id: RouteId,
    pub short_name: String,
    pub long_name: String,
}

impl From<&Route> for RouteRef {
    fn from(route: &Route) -> Self {
        Self {
            id: route.id.clone(),
            short_name: route.short_name.clone(),
            long_name: route.long_name.clone(),
        }
    }
}

/// Identifies the trip an itinerary rides on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TripRef {
    pub id: String,
    pub direction: String,
}

impl From<&Trip> for TripRef {
    fn from(trip: &Trip) -> Self {
        Self {
            id: trip.id.clone(),
            direction: trip.direction.clone(),
        }
    }
}

/// A single direct origin → destination travel option.
#[derive(Debug, Clone)]
pub struct Itinerary {
    pub origin: Stop,
    pub destination: Stop,
    /// Departure from the origin stop.
    pub departure: TimeOfDay,
    /// Arrival at the destination stop.
    pub arrival: TimeOfDay,
    pub route: RouteRef,
    pub trip: TripRef,
}

/// Fields that make two itineraries exact repeats.
pub type ItineraryKey<'a> = (&'a str, &'a str, TimeOfDay, TimeOfDay, &'a str, &'a str);

impl Itinerary {
    pub fn key(&self) -> ItineraryKey<'_> {
        (
            self.origin.id.as_str(),
            self.destination.id.as_str(),
            self.departure,
            self.arrival,
            self.route.id.as_str(),
            self.trip.id.as_str(),
        )
    }
}
