//! Trip and schedule types.
//!
//! A `Trip` is one run of a vehicle along a route on a set of service
//! dates. Its schedule is kept in sequence order, with a stop-id index for
//! O(1) membership and sequence lookup.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{DomainError, StopId, TimeOfDay};

/// A stop visit within one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedStop {
    pub stop_id: StopId,
    pub stop_name: String,
    /// Position within the trip; strictly increasing along the trip.
    pub sequence: u32,
    pub arrival: TimeOfDay,
    pub departure: TimeOfDay,
}

/// A single trip with its schedule and active dates.
///
/// Only constructible through [`Trip::new`], which guarantees the schedule
/// is ordered by strictly increasing sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TripRepr", into = "TripRepr")]
pub struct Trip {
    pub id: String,
    pub service_id: String,
    pub direction: String,
    dates: BTreeSet<NaiveDate>,
    /// Schedule in sequence order.
    stops: Vec<TimedStop>,
    /// Stop id → index into `stops`.
    index: HashMap<StopId, usize>,
}

impl Trip {
    /// Build a trip from unordered schedule entries.
    ///
    /// Entries are sorted by sequence. Two entries with the same sequence
    /// number are rejected. When a stop is visited more than once (loop
    /// services), only its latest visit is kept, so a trip that returns to
    /// where it started can still be ridden back there.
    pub fn new(
        id: impl Into<String>,
        service_id: impl Into<String>,
        direction: impl Into<String>,
        dates: impl IntoIterator<Item = NaiveDate>,
        mut schedule: Vec<TimedStop>,
    ) -> Result<Self, DomainError> {
        let id = id.into();
        schedule.sort_by_key(|ts| ts.sequence);

        if let Some(pair) = schedule.windows(2).find(|w| w[0].sequence == w[1].sequence) {
            return Err(DomainError::DuplicateSequence {
                trip: id,
                sequence: pair[0].sequence,
            });
        }

        // Later visits overwrite earlier ones
        let mut latest: HashMap<StopId, TimedStop> = HashMap::with_capacity(schedule.len());
        for timed in schedule {
            latest.insert(timed.stop_id.clone(), timed);
        }
        let mut stops: Vec<TimedStop> = latest.into_values().collect();
        stops.sort_by_key(|ts| ts.sequence);
        let index = stops
            .iter()
            .enumerate()
            .map(|(i, ts)| (ts.stop_id.clone(), i))
            .collect();

        Ok(Self {
            id,
            service_id: service_id.into(),
            direction: direction.into(),
            dates: dates.into_iter().collect(),
            stops,
            index,
        })
    }

    /// Schedule entries in sequence order.
    pub fn stops(&self) -> &[TimedStop] {
        &self.stops
    }

    pub fn dates(&self) -> &BTreeSet<NaiveDate> {
        &self.dates
    }

    pub fn contains(&self, stop: &str) -> bool {
        self.index.contains_key(stop)
    }

    pub fn timed_stop(&self, stop: &str) -> Option<&TimedStop> {
        self.index.get(stop).map(|&i| &self.stops[i])
    }

    /// Whether the trip operates on `date`.
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    /// Returns true iff both stops are on this trip and `origin` is visited
    /// before `destination`.
    ///
    /// ```
    /// use itinerary_server::domain::{StopId, TimeOfDay, TimedStop, Trip};
    ///
    /// let ts = |id: &str, seq| TimedStop {
    ///     stop_id: StopId::new(id),
    ///     stop_name: id.to_string(),
    ///     sequence: seq,
    ///     arrival: TimeOfDay::parse("08:00").unwrap(),
    ///     departure: TimeOfDay::parse("08:00").unwrap(),
    /// };
    /// let trip = Trip::new("T", "S", "Out", [], vec![ts("A", 1), ts("B", 2)]).unwrap();
    ///
    /// assert!(trip.in_sequence("A", "B"));
    /// assert!(!trip.in_sequence("B", "A"));
    /// assert!(!trip.in_sequence("A", "Z"));
    /// ```
    pub fn in_sequence(&self, origin: &str, destination: &str) -> bool {
        match (self.timed_stop(origin), self.timed_stop(destination)) {
            (Some(o), Some(d)) => o.sequence < d.sequence,
            _ => false,
        }
    }
}

impl PartialEq for Trip {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.service_id == other.service_id
            && self.direction == other.direction
            && self.dates == other.dates
            && self.stops == other.stops
    }
}

impl Eq for Trip {}

/// Serialized form of a trip; the stop index is rebuilt on load.
#[derive(Serialize, Deserialize)]
struct TripRepr {
    id: String,
    service_id: String,
    direction: String,
    dates: BTreeSet<NaiveDate>,
    stops: Vec<TimedStop>,
}

impl TryFrom<TripRepr> for Trip {
    type Error = DomainError;

    fn try_from(repr: TripRepr) -> Result<Self, Self::Error> {
        Trip::new(
            repr.id,
            repr.service_id,
            repr.direction,
            repr.dates,
            repr.stops,
        )
    }
}

impl From<Trip> for TripRepr {
    fn from(trip: Trip) -> Self {
        Self {
            id: trip.id,
            service_id: trip.service_id,
            direction: trip.direction,
            dates: trip.dates,
            stops: trip.stops,
        }
    }
}
