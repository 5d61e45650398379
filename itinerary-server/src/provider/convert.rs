//! Conversion from provider payloads to domain types.
//!
//! Parsing is tolerant below the route level: a malformed direction, trip
//! or schedule entry is logged and skipped, and the rest of the route is
//! still built. Only a payload whose top level is unusable fails.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::{
    Route, RouteId, RouteStub, Stop, StopId, TimeOfDay, TimedStop, Trip, parse_service_date,
};

use super::types::{DirectionDto, RouteDetailDto, RouteSummaryDto, ScheduleEntryDto, TripDto};

/// A payload whose structure is unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed {context} payload: {message}")]
pub struct MalformedPayload {
    context: &'static str,
    message: String,
}

impl MalformedPayload {
    fn new(context: &'static str, message: impl Into<String>) -> Self {
        Self {
            context,
            message: message.into(),
        }
    }
}

/// Parse the route summary listing.
///
/// Entries without a route id or short name are skipped.
pub fn parse_summary(payload: &[u8]) -> Result<Vec<RouteStub>, MalformedPayload> {
    let entries: Vec<serde_json::Value> = serde_json::from_slice(payload)
        .map_err(|e| MalformedPayload::new("summary", e.to_string()))?;

    let mut stubs = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.into_iter().enumerate() {
        let dto: RouteSummaryDto = match serde_json::from_value(entry) {
            Ok(dto) => dto,
            Err(e) => {
                warn!(entry = idx, error = %e, "skipping malformed summary entry");
                continue;
            }
        };
        let (Some(id), Some(short_name)) = (dto.route_id, dto.route_short_name) else {
            warn!(entry = idx, "skipping summary entry without id or short name");
            continue;
        };
        let short_name = short_name.to_text();
        stubs.push(RouteStub {
            id: RouteId::new(id.to_text()),
            key: short_name.clone(),
            short_name,
            long_name: dto.route_long_name.unwrap_or_default(),
            color: dto.route_color.unwrap_or_default(),
            text_color: dto.route_text_color.unwrap_or_default(),
        });
    }

    Ok(stubs)
}

/// Parse a route detail payload into a fully built `Route`.
pub fn parse_route_detail(stub: RouteStub, payload: &[u8]) -> Result<Route, MalformedPayload> {
    let details: Vec<RouteDetailDto> = serde_json::from_slice(payload)
        .map_err(|e| MalformedPayload::new("route detail", e.to_string()))?;

    let detail = details
        .into_iter()
        .next()
        .ok_or_else(|| MalformedPayload::new("route detail", "empty document"))?;

    let mut stops = StopCollector::default();
    let mut trips = Vec::new();

    for (d_idx, direction) in detail.directions.into_iter().enumerate() {
        let direction: DirectionDto = match serde_json::from_value(direction) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(route = %stub.id, direction = d_idx, error = %e, "skipping malformed direction");
                continue;
            }
        };
        let headsign = direction.headsign.unwrap_or_default();

        for trip in direction.trips {
            let trip: TripDto = match serde_json::from_value(trip) {
                Ok(trip) => trip,
                Err(e) => {
                    warn!(route = %stub.id, error = %e, "skipping malformed trip");
                    continue;
                }
            };
            if let Some(trip) = convert_trip(&stub.id, trip, &headsign, &mut stops) {
                trips.push(trip);
            }
        }
    }

    Ok(Route::new(stub, stops.into_stops(), trips))
}

/// Convert one trip, recording its stops. Returns `None` if the trip is unusable.
fn convert_trip(
    route: &RouteId,
    dto: TripDto,
    headsign: &str,
    stops: &mut StopCollector,
) -> Option<Trip> {
    let trip_id = dto.trip_id.to_text();

    let dates: Vec<_> = dto
        .dates
        .iter()
        .filter_map(|d| match parse_service_date(d) {
            Ok(date) => Some(date),
            Err(e) => {
                debug!(%route, trip = %trip_id, error = %e, "skipping invalid service date");
                None
            }
        })
        .collect();

    let mut schedule = Vec::with_capacity(dto.schedule.len());
    for entry in dto.schedule {
        let entry: ScheduleEntryDto = match serde_json::from_value(entry) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(%route, trip = %trip_id, error = %e, "skipping malformed schedule entry");
                continue;
            }
        };
        match convert_entry(entry, stops) {
            Some(timed) => schedule.push(timed),
            None => {
                warn!(%route, trip = %trip_id, "skipping schedule entry with invalid fields");
            }
        }
    }

    if schedule.is_empty() {
        warn!(%route, trip = %trip_id, "skipping trip with empty schedule");
        return None;
    }

    let service_id = dto.service_id.map(|s| s.to_text()).unwrap_or_default();
    match Trip::new(trip_id, service_id, headsign, dates, schedule) {
        Ok(trip) => Some(trip),
        Err(e) => {
            warn!(%route, error = %e, "skipping inconsistent trip");
            None
        }
    }
}

/// Convert one schedule entry. A missing arrival or departure time falls
/// back to the other one; missing coordinates default to zero.
fn convert_entry(entry: ScheduleEntryDto, stops: &mut StopCollector) -> Option<TimedStop> {
    let sequence = entry.stop_sequence.as_u32()?;
    let stop_id = entry.stop_id.to_text();
    if stop_id.is_empty() {
        return None;
    }

    let arrival = entry.arrival_time.as_deref().map(TimeOfDay::parse);
    let departure = entry.departure_time.as_deref().map(TimeOfDay::parse);
    let (arrival, departure) = match (arrival, departure) {
        (Some(Ok(a)), Some(Ok(d))) => (a, d),
        (Some(Ok(a)), None) => (a, a),
        (None, Some(Ok(d))) => (d, d),
        _ => return None,
    };

    let name = entry.stop_name.unwrap_or_default();
    let lat = entry.stop_lat.and_then(|v| v.as_f64()).unwrap_or(0.0);
    let lon = entry.stop_lon.and_then(|v| v.as_f64()).unwrap_or(0.0);
    stops.observe(&stop_id, &name, lat, lon);

    Some(TimedStop {
        stop_id: StopId::new(stop_id),
        stop_name: name,
        sequence,
        arrival,
        departure,
    })
}

/// Collects the stops a route touches. The first sighting of a stop
/// defines it; later sightings under a different name become aliases.
#[derive(Default)]
struct StopCollector {
    stops: HashMap<String, Stop>,
}

impl StopCollector {
    fn observe(&mut self, id: &str, name: &str, lat: f64, lon: f64) {
        match self.stops.get_mut(id) {
            Some(stop) => {
                if !name.is_empty() && stop.name != name {
                    stop.add_alias(name);
                }
            }
            None => {
                self.stops
                    .insert(id.to_string(), Stop::new(id, name, lat, lon));
            }
        }
    }

    fn into_stops(self) -> impl Iterator<Item = Stop> {
        self.stops.into_values()
    }
}
