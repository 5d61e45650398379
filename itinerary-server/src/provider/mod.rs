//! Remote schedule provider adapter.
//!
//! The provider exposes two requests: a cheap summary listing every route,
//! and an expensive per-route detail payload with all trips and stops. The
//! adapter returns raw payload bytes; parsing lives in [`convert`] so the
//! response cache can stay payload-agnostic.
//!
//! Key characteristics of the provider:
//! - Route details are looked up by the route's short name, not its id
//! - Numeric fields are often sent as strings
//! - Throttling is signalled with HTTP 429

mod client;
pub mod convert;
mod error;
mod mock;
mod types;

use std::future::Future;

pub use client::{ProviderClient, ProviderConfig};
pub use convert::{MalformedPayload, parse_route_detail, parse_summary};
pub use error::ProviderError;
pub use mock::MockProvider;
pub use types::{
    DirectionDto, LooseValue, RouteDetailDto, RouteSummaryDto, ScheduleEntryDto, TripDto,
};

/// Source of raw schedule payloads.
///
/// Implemented by the HTTP client and by [`MockProvider`] for tests.
pub trait ScheduleProvider: Send + Sync {
    /// Fetch the summary listing of all routes.
    fn get_route_summary(&self) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;

    /// Fetch the full detail payload of one route.
    fn get_route_detail(
        &self,
        route_key: &str,
    ) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;
}

/// A logical provider request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderRequest {
    RouteSummary,
    RouteDetail { route_key: String },
}

impl ProviderRequest {
    pub fn route_detail(route_key: impl Into<String>) -> Self {
        ProviderRequest::RouteDetail {
            route_key: route_key.into(),
        }
    }

    /// Endpoint name, independent of parameters.
    pub fn endpoint(&self) -> &'static str {
        match self {
            ProviderRequest::RouteSummary => "routes/summary",
            ProviderRequest::RouteDetail { .. } => "routes/route_short_name",
        }
    }

    /// Request parameters as name/value pairs.
    pub fn params(&self) -> Vec<(&'static str, &str)> {
        match self {
            ProviderRequest::RouteSummary => Vec::new(),
            ProviderRequest::RouteDetail { route_key } => vec![("route_short_name", route_key.as_str())],
        }
    }

    /// Dispatch this request to a provider.
    pub async fn send<P: ScheduleProvider>(&self, provider: &P) -> Result<Vec<u8>, ProviderError> {
        match self {
            ProviderRequest::RouteSummary => provider.get_route_summary().await,
            ProviderRequest::RouteDetail { route_key } => {
                provider.get_route_detail(route_key).await
            }
        }
    }
}
