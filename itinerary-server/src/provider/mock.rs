//! Mock schedule provider for testing without network access.
//!
//! Serves payloads from memory, optionally loaded from a directory of JSON
//! files, and can be scripted to fail specific requests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::error::ProviderError;
use super::{ProviderRequest, ScheduleProvider};

#[derive(Default)]
struct MockState {
    summary: Option<Vec<u8>>,
    routes: HashMap<String, Vec<u8>>,
    /// Errors returned before the stored payload, per request.
    failures: HashMap<ProviderRequest, VecDeque<ProviderError>>,
    calls: HashMap<ProviderRequest, usize>,
}

/// Mock provider that serves data from memory.
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load payloads from a directory.
    ///
    /// Expects `summary.json` and `routes/{key}.json`.
    pub fn from_dir(data_dir: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let data_dir = data_dir.as_ref();
        let io_err = |e: std::io::Error| ProviderError::Other {
            status: 0,
            message: format!("failed to read mock data from {:?}: {}", data_dir, e),
        };

        let mut provider = Self::new().with_summary(
            std::fs::read(data_dir.join("summary.json")).map_err(io_err)?,
        );

        let routes_dir = data_dir.join("routes");
        if routes_dir.is_dir() {
            for entry in std::fs::read_dir(&routes_dir).map_err(io_err)? {
                let path = entry.map_err(io_err)?.path();
                if path.extension().and_then(|s| s.to_str()) != Some("json") {
                    continue;
                }
                let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let key = key.to_string();
                provider = provider.with_route(key, std::fs::read(&path).map_err(io_err)?);
            }
        }

        Ok(provider)
    }

    pub fn with_summary(self, payload: Vec<u8>) -> Self {
        self.set_summary(payload);
        self
    }

    pub fn with_route(self, key: impl Into<String>, payload: Vec<u8>) -> Self {
        self.set_route(key, payload);
        self
    }

    /// Replace the summary payload.
    pub fn set_summary(&self, payload: Vec<u8>) {
        self.lock().summary = Some(payload);
    }

    /// Replace one route's detail payload.
    pub fn set_route(&self, key: impl Into<String>, payload: Vec<u8>) {
        self.lock().routes.insert(key.into(), payload);
    }

    /// Remove one route's detail payload.
    pub fn remove_route(&self, key: &str) {
        self.lock().routes.remove(key);
    }

    /// Make the next call for `request` fail with `error`.
    ///
    /// Queued failures are returned in order before the stored payload.
    pub fn fail_next(&self, request: ProviderRequest, error: ProviderError) {
        self.lock()
            .failures
            .entry(request)
            .or_default()
            .push_back(error);
    }

    /// Number of calls made for `request`.
    pub fn call_count(&self, request: &ProviderRequest) -> usize {
        self.lock().calls.get(request).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned lock only means a test panicked mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn serve(&self, request: ProviderRequest) -> Result<Vec<u8>, ProviderError> {
        let mut state = self.lock();
        *state.calls.entry(request.clone()).or_default() += 1;

        if let Some(err) = state.failures.get_mut(&request).and_then(|q| q.pop_front()) {
            return Err(err);
        }

        let payload = match &request {
            ProviderRequest::RouteSummary => state.summary.clone(),
            ProviderRequest::RouteDetail { route_key } => state.routes.get(route_key).cloned(),
        };
        payload.ok_or(ProviderError::NotAvailable)
    }
}

impl ScheduleProvider for MockProvider {
    async fn get_route_summary(&self) -> Result<Vec<u8>, ProviderError> {
        self.serve(ProviderRequest::RouteSummary)
    }

    async fn get_route_detail(&self, route_key: &str) -> Result<Vec<u8>, ProviderError> {
        self.serve(ProviderRequest::route_detail(route_key))
    }
}
