//! Query configuration for the itinerary planner.

/// Configuration parameters for itinerary queries.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Maximum number of itineraries to return. `None` returns all.
    pub max_results: Option<usize>,

    /// Maximum number of stops a free-text stop search returns.
    pub max_stop_matches: usize,
}

impl QueryConfig {
    /// Create a new configuration with the given parameters.
    pub fn new(max_results: Option<usize>, max_stop_matches: usize) -> Self {
        Self {
            max_results,
            max_stop_matches,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_results: None,
            max_stop_matches: 50,
        }
    }
}
