//! Data transfer objects for query responses.

use serde::{Deserialize, Serialize};

use crate::domain::{Itinerary, Stop};

/// A travel option between two stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItineraryDto {
    /// Departure from the origin stop (HH:MM:SS)
    pub departure_time: String,

    /// Arrival at the destination stop (HH:MM:SS)
    pub arrival_time: String,

    /// Route short name (e.g., "1002")
    pub route_short_name: String,

    /// Route long name
    pub route_long_name: String,

    /// Direction headsign
    pub direction: String,
}

impl ItineraryDto {
    /// Convert a domain itinerary to a DTO.
    pub fn from_itinerary(itinerary: &Itinerary) -> Self {
        Self {
            departure_time: itinerary.departure.to_string(),
            arrival_time: itinerary.arrival.to_string(),
            route_short_name: itinerary.route.short_name.clone(),
            route_long_name: itinerary.route.long_name.clone(),
            direction: itinerary.trip.direction.clone(),
        }
    }
}

/// A stop in listings and search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopDto {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,

    /// Alternative names, space separated
    #[serde(rename = "location-identifiers")]
    pub location_identifiers: String,
}

impl StopDto {
    pub fn from_stop(stop: &Stop) -> Self {
        Self {
            id: stop.id.to_string(),
            name: stop.name.clone(),
            lat: stop.lat,
            lon: stop.lon,
            location_identifiers: stop.aliases().join(" "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RouteId, RouteRef, TimeOfDay, TripRef};

    #[test]
    fn itinerary_dto_fields() {
        let itinerary = Itinerary {
            origin: Stop::new("A", "Stop A", 0.0, 0.0),
            destination: Stop::new("C", "Stop C", 0.0, 0.0),
            departure: TimeOfDay::parse("07:46").unwrap(),
            arrival: TimeOfDay::parse("25:05:30").unwrap(),
            route: RouteRef {
                id: RouteId::new("1002_0"),
                short_name: "1002".to_string(),
                long_name: "Alfragide - Lisboa".to_string(),
            },
            trip: TripRef {
                id: "T".to_string(),
                direction: "Lisboa".to_string(),
            },
        };

        let dto = ItineraryDto::from_itinerary(&itinerary);
        assert_eq!(dto.departure_time, "07:46:00");
        assert_eq!(dto.arrival_time, "25:05:30");
        assert_eq!(dto.route_short_name, "1002");
        assert_eq!(dto.direction, "Lisboa");
    }

    #[test]
    fn stop_dto_serializes_identifiers() {
        let mut stop = Stop::new("030064", "Alfragide", 38.74, -9.21);
        stop.add_alias("Força Aérea");

        let json = serde_json::to_value(StopDto::from_stop(&stop)).unwrap();
        assert_eq!(json["id"], "030064");
        assert_eq!(json["location-identifiers"], "Força Aérea");
    }
}
