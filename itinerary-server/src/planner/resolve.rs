//! Resolving free-text stop queries to stop ids.
//!
//! Matching is by substring: on the stop id, or case-insensitively on the
//! stop name and any of its aliases.

use std::collections::HashMap;

use tracing::warn;

use crate::domain::{Stop, StopId};

use super::search::RouteSource;

/// Which stop field a pattern is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBy {
    Id,
    /// Name or any alias.
    Name,
}

/// Every distinct stop served by any route, sorted by name.
///
/// When routes disagree about a stop, the first route read wins and the
/// others only contribute aliases. Unreadable routes are skipped.
pub fn all_stops<S: RouteSource>(source: &S) -> Vec<Stop> {
    let mut by_id: HashMap<StopId, Stop> = HashMap::new();
    for route in source.routes() {
        let route = match route {
            Ok(route) => route,
            Err(e) => {
                warn!(error = %e, "skipping unreadable route while listing stops");
                continue;
            }
        };
        for stop in route.stops() {
            match by_id.get_mut(&stop.id) {
                Some(existing) => {
                    if existing.name != stop.name {
                        existing.add_alias(stop.name.clone());
                    }
                    for alias in stop.aliases() {
                        existing.add_alias(alias.clone());
                    }
                }
                None => {
                    by_id.insert(stop.id.clone(), stop.clone());
                }
            }
        }
    }

    let mut stops: Vec<Stop> = by_id.into_values().collect();
    sort_by_name(&mut stops);
    stops
}

/// Stops matching any of `patterns`, in input order.
///
/// An empty pattern matches nothing.
pub fn match_stops<'s>(stops: &'s [Stop], patterns: &[&str], by: MatchBy) -> Vec<&'s Stop> {
    let patterns: Vec<String> = patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| match by {
            MatchBy::Id => p.to_string(),
            MatchBy::Name => p.to_lowercase(),
        })
        .collect();
    if patterns.is_empty() {
        return Vec::new();
    }

    stops
        .iter()
        .filter(|stop| patterns.iter().any(|p| matches(stop, p, by)))
        .collect()
}

/// Stops matching `query` by id or by name, exact id matches first.
pub fn search_stops<'s>(stops: &'s [Stop], query: &str, limit: usize) -> Vec<&'s Stop> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    let mut found: Vec<&Stop> = stops.iter().filter(|s| s.id.as_str() == query).collect();
    let by_name = match_stops(stops, &[query], MatchBy::Name);
    let by_id = match_stops(stops, &[query], MatchBy::Id);
    for stop in by_name.into_iter().chain(by_id) {
        if !found.iter().any(|f| f.id == stop.id) {
            found.push(stop);
        }
    }
    found.truncate(limit);
    found
}

/// Resolve `query` to the ids of every stop it matches.
pub fn resolve_stop_ids(stops: &[Stop], query: &str) -> Vec<StopId> {
    search_stops(stops, query, usize::MAX)
        .into_iter()
        .map(|s| s.id.clone())
        .collect()
}

fn matches(stop: &Stop, pattern: &str, by: MatchBy) -> bool {
    match by {
        MatchBy::Id => stop.id.as_str().contains(pattern),
        MatchBy::Name => {
            stop.name.to_lowercase().contains(pattern)
                || stop
                    .aliases()
                    .iter()
                    .any(|a| a.to_lowercase().contains(pattern))
        }
    }
}

fn sort_by_name(stops: &mut [Stop]) {
    stops.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::stub;
    use crate::domain::{Route, RouteId};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn stops() -> Vec<Stop> {
        let mut alfragide = Stop::new("030064", "Alfragide (Força Aérea)", 38.74, -9.21);
        alfragide.add_alias("Estrada de Alfragide");
        vec![
            alfragide,
            Stop::new("030065", "Amadora Este", 38.75, -9.22),
            Stop::new("170064", "Cacém", 38.77, -9.30),
        ]
    }

    #[test]
    fn match_by_id_substring() {
        let stops = stops();
        let found = match_stops(&stops, &["0064"], MatchBy::Id);
        let ids: Vec<&str> = found.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["030064", "170064"]);
    }

    #[test]
    fn match_by_name_is_case_insensitive_and_uses_aliases() {
        let stops = stops();
        assert_eq!(match_stops(&stops, &["alfragide"], MatchBy::Name).len(), 1);
        assert_eq!(match_stops(&stops, &["ESTRADA"], MatchBy::Name).len(), 1);
        assert_eq!(match_stops(&stops, &["cacém", "amadora"], MatchBy::Name).len(), 2);
    }

    #[test]
    fn empty_patterns_match_nothing() {
        let stops = stops();
        assert!(match_stops(&stops, &[""], MatchBy::Name).is_empty());
        assert!(match_stops(&stops, &[], MatchBy::Id).is_empty());
        assert!(search_stops(&stops, "  ", 10).is_empty());
    }

    #[test]
    fn exact_id_ranks_first() {
        let stops = stops();
        let found = search_stops(&stops, "170064", 10);
        assert_eq!(found[0].id.as_str(), "170064");
        assert_eq!(found.len(), 1);

        let found = search_stops(&stops, "0064", 1);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn resolve_returns_ids() {
        let stops = stops();
        assert_eq!(
            resolve_stop_ids(&stops, "amadora"),
            vec![StopId::new("030065")]
        );
    }

    #[test]
    fn all_stops_deduplicates_across_routes() {
        let r1 = Route::new(
            stub("r1"),
            vec![
                Stop::new("B", "Bravo", 0.0, 0.0),
                Stop::new("A", "Alpha", 0.0, 0.0),
            ],
            Vec::new(),
        );
        let r2 = Route::new(
            stub("r2"),
            vec![Stop::new("A", "Alpha (Norte)", 0.0, 0.0)],
            Vec::new(),
        );
        let source: BTreeMap<RouteId, Arc<Route>> = [r1, r2]
            .into_iter()
            .map(|r| (r.id.clone(), Arc::new(r)))
            .collect();

        let stops = all_stops(&source);
        let names: Vec<&str> = stops.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Bravo"]);
        assert_eq!(stops[0].aliases(), ["Alpha (Norte)".to_string()]);
    }
}
