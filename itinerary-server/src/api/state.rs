//! Shared application state and the query operations built on it.

use std::sync::Arc;

use tracing::warn;

use crate::domain::{StopId, parse_service_date};
use crate::planner::{self, Planner, QueryConfig, SearchRequest};
use crate::store::{EntityStore, StoreError};

use super::dto::{ItineraryDto, StopDto};

/// Shared application state.
///
/// Queries read the entity store on the blocking pool; they never write.
#[derive(Clone)]
pub struct AppState {
    /// Entity store of ingested routes
    pub store: Arc<EntityStore>,

    /// Query configuration
    pub config: Arc<QueryConfig>,
}

impl AppState {
    /// Create a new app state.
    pub fn new(store: Arc<EntityStore>, config: QueryConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Direct itineraries between two stops on a service date (`YYYYMMDD`).
    ///
    /// An invalid date or a store failure yields an empty list.
    pub async fn find_itineraries(
        &self,
        origin_stop_id: &str,
        destination_stop_id: &str,
        date: &str,
    ) -> Vec<ItineraryDto> {
        let date = match parse_service_date(date) {
            Ok(date) => date,
            Err(e) => {
                warn!(error = %e, "rejecting itinerary query");
                return Vec::new();
            }
        };
        let request = SearchRequest::new(
            [StopId::new(origin_stop_id)],
            [StopId::new(destination_stop_id)],
            date,
        );

        let config = Arc::clone(&self.config);
        let result = self
            .store
            .run_blocking(move |store| {
                let result = Planner::new(store, &config).search(&request);
                Ok::<_, StoreError>(result)
            })
            .await;

        match result {
            Ok(result) => result
                .itineraries
                .iter()
                .map(ItineraryDto::from_itinerary)
                .collect(),
            Err(e) => {
                warn!(error = %e, "itinerary query failed");
                Vec::new()
            }
        }
    }

    /// Every known stop, sorted by name, each id once.
    pub async fn list_all_stops(&self) -> Vec<StopDto> {
        match self
            .store
            .run_blocking(|store| Ok(planner::all_stops(store)))
            .await
        {
            Ok(stops) => stops.iter().map(StopDto::from_stop).collect(),
            Err(e) => {
                warn!(error = %e, "failed to list stops");
                Vec::new()
            }
        }
    }

    /// Stops matching `query` by id, name or alias.
    pub async fn search_stops(&self, query: &str) -> Vec<StopDto> {
        let query = query.to_string();
        let limit = self.config.max_stop_matches;
        match self
            .store
            .run_blocking(move |store| {
                let stops = planner::all_stops(store);
                let found: Vec<StopDto> = planner::search_stops(&stops, &query, limit)
                    .into_iter()
                    .map(StopDto::from_stop)
                    .collect();
                Ok(found)
            })
            .await
        {
            Ok(stops) => stops,
            Err(e) => {
                warn!(error = %e, "stop search failed");
                Vec::new()
            }
        }
    }
}
