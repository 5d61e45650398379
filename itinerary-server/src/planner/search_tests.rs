//! Unit tests for direct itinerary search.

use super::*;
use crate::domain::test_support::{date, route, timed};
use crate::store::StoreConfig;
use proptest::prelude::*;

fn ids(stops: &[&str]) -> Vec<StopId> {
    stops.iter().map(|s| StopId::new(*s)).collect()
}

fn trip(id: &str, dates: &[&str], schedule: &[(&str, u32, &str)]) -> Trip {
    Trip::new(
        id,
        "p0_7",
        "Lisboa",
        dates.iter().map(|d| date(d)),
        schedule
            .iter()
            .map(|(stop, seq, time)| timed(stop, *seq, time))
            .collect(),
    )
    .unwrap()
}

fn source(routes: Vec<Route>) -> BTreeMap<RouteId, Arc<Route>> {
    routes
        .into_iter()
        .map(|r| (r.id.clone(), Arc::new(r)))
        .collect()
}

/// Route 1002_0 with trip T: A(1, 07:46) B(2, 07:58) C(3, 08:10), on 2023-07-03.
fn route_1002() -> Route {
    route(
        "1002_0",
        vec![trip(
            "T",
            &["20230703"],
            &[("A", 1, "07:46"), ("B", 2, "07:58"), ("C", 3, "08:10")],
        )],
    )
}

fn search(
    source: &BTreeMap<RouteId, Arc<Route>>,
    request: &SearchRequest,
) -> SearchResult {
    let config = QueryConfig::default();
    Planner::new(source, &config).search(request)
}

#[test]
fn direct_trip_found() {
    let source = source(vec![route_1002()]);
    let request = SearchRequest::new(ids(&["A"]), ids(&["C"]), date("20230703"));

    let result = search(&source, &request);

    assert_eq!(result.itineraries.len(), 1);
    let it = &result.itineraries[0];
    assert_eq!(it.departure.hhmm(), "07:46");
    assert_eq!(it.arrival.hhmm(), "08:10");
    assert_eq!(it.route.id.as_str(), "1002_0");
    assert_eq!(it.trip.id, "T");
    assert_eq!(it.origin.id.as_str(), "A");
    assert_eq!(it.destination.id.as_str(), "C");
}

#[test]
fn reverse_direction_is_empty() {
    let source = source(vec![route_1002()]);
    let request = SearchRequest::new(ids(&["C"]), ids(&["A"]), date("20230703"));

    assert!(search(&source, &request).itineraries.is_empty());
}

#[test]
fn trip_not_running_on_date() {
    let source = source(vec![route_1002()]);
    let request = SearchRequest::new(ids(&["A"]), ids(&["C"]), date("20230704"));

    assert!(search(&source, &request).itineraries.is_empty());
}

#[test]
fn two_trips_in_departure_order() {
    let r = route(
        "1002_0",
        vec![
            trip("T2", &["20230703"], &[("A", 1, "08:10"), ("C", 2, "08:30")]),
            trip("T1", &["20230703"], &[("A", 1, "07:46"), ("C", 3, "08:00")]),
        ],
    );
    let source = source(vec![r]);
    let request = SearchRequest::new(ids(&["A"]), ids(&["C"]), date("20230703"));

    let result = search(&source, &request);
    let departures: Vec<String> = result.itineraries.iter().map(|it| it.departure.hhmm()).collect();
    assert_eq!(departures, ["07:46", "08:10"]);
}

#[test]
fn empty_stop_sets_yield_nothing() {
    let source = source(vec![route_1002()]);

    let request = SearchRequest::new(Vec::new(), ids(&["C"]), date("20230703"));
    let result = search(&source, &request);
    assert!(result.itineraries.is_empty());
    assert_eq!(result.routes_scanned, 0);

    let request = SearchRequest::new(ids(&["A"]), Vec::new(), date("20230703"));
    assert!(search(&source, &request).itineraries.is_empty());
}

#[test]
fn multiple_origins_and_destinations() {
    let source = source(vec![route_1002()]);
    let request = SearchRequest::new(ids(&["A", "B"]), ids(&["B", "C"]), date("20230703"));

    let result = search(&source, &request);
    let pairs: Vec<(&str, &str)> = result
        .itineraries
        .iter()
        .map(|it| (it.origin.id.as_str(), it.destination.id.as_str()))
        .collect();
    // A->B, A->C depart 07:46 (discovery order), B->C departs 07:58. B->B is not a trip.
    assert_eq!(pairs, [("A", "B"), ("A", "C"), ("B", "C")]);
}

#[test]
fn repeated_stops_in_request_do_not_duplicate() {
    let source = source(vec![route_1002()]);
    let request = SearchRequest::new(ids(&["A", "A"]), ids(&["C", "C"]), date("20230703"));

    assert_eq!(search(&source, &request).itineraries.len(), 1);
}

#[test]
fn routes_without_the_stops_are_skipped() {
    let other = route(
        "2000_0",
        vec![trip("X", &["20230703"], &[("X", 1, "06:00"), ("Y", 2, "06:30")])],
    );
    let source = source(vec![route_1002(), other]);
    let request = SearchRequest::new(ids(&["A"]), ids(&["C"]), date("20230703"));

    let result = search(&source, &request);
    assert_eq!(result.routes_scanned, 2);
    assert_eq!(result.itineraries.len(), 1);
}

#[test]
fn candidate_routes_restrict_the_scan() {
    let second = route(
        "1003_0",
        vec![trip("U", &["20230703"], &[("A", 1, "09:00"), ("C", 2, "09:20")])],
    );
    let source = source(vec![route_1002(), second]);
    let request = SearchRequest::new(ids(&["A"]), ids(&["C"]), date("20230703"))
        .with_routes([RouteId::new("1003_0"), RouteId::new("missing")]);

    let result = search(&source, &request);
    assert_eq!(result.routes_scanned, 1);
    assert_eq!(result.itineraries.len(), 1);
    assert_eq!(result.itineraries[0].trip.id, "U");
}

#[test]
fn departing_after_filters_earlier_trips() {
    let r = route(
        "1002_0",
        vec![
            trip("T1", &["20230703"], &[("A", 1, "07:46"), ("C", 2, "08:00")]),
            trip("T2", &["20230703"], &[("A", 1, "08:10"), ("C", 2, "08:30")]),
        ],
    );
    let source = source(vec![r]);
    let request = SearchRequest::new(ids(&["A"]), ids(&["C"]), date("20230703"))
        .departing_after(TimeOfDay::parse("08:00").unwrap());

    let result = search(&source, &request);
    assert_eq!(result.itineraries.len(), 1);
    assert_eq!(result.itineraries[0].trip.id, "T2");
}

#[test]
fn max_results_truncates_after_sorting() {
    let r = route(
        "1002_0",
        vec![
            trip("T2", &["20230703"], &[("A", 1, "08:10"), ("C", 2, "08:30")]),
            trip("T1", &["20230703"], &[("A", 1, "07:46"), ("C", 2, "08:00")]),
        ],
    );
    let source = source(vec![r]);
    let config = QueryConfig::default().with_max_results(1);
    let request = SearchRequest::new(ids(&["A"]), ids(&["C"]), date("20230703"));

    let result = Planner::new(&source, &config).search(&request);
    assert_eq!(result.itineraries.len(), 1);
    assert_eq!(result.itineraries[0].trip.id, "T1");
}

#[test]
fn same_trip_listed_twice_is_deduplicated() {
    let t = || trip("T", &["20230703"], &[("A", 1, "07:46"), ("C", 2, "08:10")]);
    let r = route("1002_0", vec![t(), t()]);
    let source = source(vec![r]);
    let request = SearchRequest::new(ids(&["A"]), ids(&["C"]), date("20230703"));

    assert_eq!(search(&source, &request).itineraries.len(), 1);
}

#[test]
fn searches_the_entity_store() {
    let store = EntityStore::open_in_memory(&StoreConfig::default().with_page_size(1)).unwrap();
    store
        .put_all(&[
            route_1002(),
            route(
                "1003_0",
                vec![trip("U", &["20230703"], &[("A", 1, "07:00"), ("C", 2, "07:20")])],
            ),
        ])
        .unwrap();

    let config = QueryConfig::default();
    let request = SearchRequest::new(ids(&["A"]), ids(&["C"]), date("20230703"));
    let result = Planner::new(&store, &config).search(&request);

    let trips: Vec<&str> = result.itineraries.iter().map(|it| it.trip.id.as_str()).collect();
    assert_eq!(trips, ["U", "T"]);
    assert_eq!(result.routes_failed, 0);
}

#[test]
fn unreadable_route_is_skipped() {
    struct Flaky(BTreeMap<RouteId, Arc<Route>>);

    impl RouteSource for Flaky {
        fn route(&self, id: &RouteId) -> Result<Option<Arc<Route>>, SearchError> {
            self.0.route(id)
        }

        fn routes(&self) -> impl Iterator<Item = Result<Arc<Route>, SearchError>> + '_ {
            std::iter::once(Err(SearchError::RouteRead {
                route: "broken".to_string(),
                message: "corrupt".to_string(),
            }))
            .chain(self.0.routes())
        }
    }

    let flaky = Flaky(source(vec![route_1002()]));
    let config = QueryConfig::default();
    let request = SearchRequest::new(ids(&["A"]), ids(&["C"]), date("20230703"));
    let result = Planner::new(&flaky, &config).search(&request);

    assert_eq!(result.routes_failed, 1);
    assert_eq!(result.itineraries.len(), 1);
}

proptest! {
    /// Every itinerary boards before it alights and runs on the date.
    #[test]
    fn results_respect_sequence(
        times in prop::collection::vec(0u32..(24 * 60), 2..8),
        origin in 0usize..8,
        destination in 0usize..8,
    ) {
        let mut sorted = times.clone();
        sorted.sort();
        let schedule: Vec<(String, u32, String)> = sorted
            .iter()
            .enumerate()
            .map(|(i, m)| (format!("S{i}"), i as u32 + 1, format!("{:02}:{:02}", m / 60, m % 60)))
            .collect();
        let refs: Vec<(&str, u32, &str)> = schedule
            .iter()
            .map(|(s, q, t)| (s.as_str(), *q, t.as_str()))
            .collect();
        let source = source(vec![route("R", vec![trip("T", &["20230703"], &refs)])]);

        let request = SearchRequest::new(
            [StopId::new(format!("S{origin}"))],
            [StopId::new(format!("S{destination}"))],
            date("20230703"),
        );
        let result = search(&source, &request);

        let expected = origin < destination && destination < sorted.len();
        prop_assert_eq!(result.itineraries.len(), usize::from(expected));
        for it in &result.itineraries {
            prop_assert!(it.departure <= it.arrival);
        }
    }
}
