//! Ordering of query results.

use std::collections::HashSet;

use crate::domain::Itinerary;

/// Order itineraries by departure and drop exact repeats.
///
/// The sort is stable, so itineraries departing at the same second keep
/// the order in which they were found. Two itineraries are repeats when
/// they share origin, destination, departure, arrival, route and trip; the
/// first one is kept.
pub fn rank_itineraries(mut itineraries: Vec<Itinerary>) -> Vec<Itinerary> {
    itineraries.sort_by_key(|it| it.departure.seconds());

    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(itineraries.len());
        itineraries.iter().map(|it| seen.insert(it.key())).collect()
    };

    itineraries
        .into_iter()
        .zip(keep)
        .filter_map(|(it, keep)| keep.then_some(it))
        .collect()
}
