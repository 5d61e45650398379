//! Provider wire types.
//!
//! These mirror the JSON the schedule API returns. Nested collections are
//! kept as raw `serde_json::Value`s so that a single malformed element can
//! be skipped during conversion instead of failing the whole document.

use serde::{Deserialize, Serialize};

/// A scalar the provider may send either as a string or as a number.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LooseValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl LooseValue {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            LooseValue::Int(n) => u32::try_from(*n).ok(),
            LooseValue::Float(f) if f.fract() == 0.0 && *f >= 0.0 => u32::try_from(*f as i64).ok(),
            LooseValue::Float(_) => None,
            LooseValue::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LooseValue::Int(n) => Some(*n as f64),
            LooseValue::Float(f) => Some(*f),
            LooseValue::Str(s) => s.trim().parse().ok(),
        }
    }

    /// String form; numbers are formatted without a fractional part when integral.
    pub fn to_text(&self) -> String {
        match self {
            LooseValue::Int(n) => n.to_string(),
            LooseValue::Float(f) => f.to_string(),
            LooseValue::Str(s) => s.trim().to_string(),
        }
    }
}

/// One entry of the route summary listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteSummaryDto {
    pub route_id: Option<LooseValue>,
    pub route_short_name: Option<LooseValue>,
    #[serde(default)]
    pub route_long_name: Option<String>,
    #[serde(default)]
    pub route_color: Option<String>,
    #[serde(default)]
    pub route_text_color: Option<String>,
}

/// Top-level element of a route detail payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteDetailDto {
    #[serde(default)]
    pub directions: Vec<serde_json::Value>,
}

/// One direction (way) of a route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectionDto {
    #[serde(default)]
    pub headsign: Option<String>,
    #[serde(default)]
    pub trips: Vec<serde_json::Value>,
}

/// One trip within a direction.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TripDto {
    pub trip_id: LooseValue,
    #[serde(default)]
    pub service_id: Option<LooseValue>,
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub schedule: Vec<serde_json::Value>,
}

/// One stop visit within a trip's schedule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleEntryDto {
    pub stop_sequence: LooseValue,
    pub stop_id: LooseValue,
    #[serde(default)]
    pub stop_name: Option<String>,
    #[serde(default)]
    pub stop_lat: Option<LooseValue>,
    #[serde(default)]
    pub stop_lon: Option<LooseValue>,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub departure_time: Option<String>,
}
