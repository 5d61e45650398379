//! Ingestion pipeline: provider payloads (through the response cache) into
//! `Route` entities.
//!
//! Bulk ingestion splits the summary into batches. Each batch is fetched by
//! its own task, with at most `workers` batches in flight; payload parsing
//! runs on the blocking pool. Finished batches are sent back over a bounded
//! channel to the coordinator, which hands them to a sink (normally the
//! entity store). A batch task keeps its slot until the coordinator has
//! accepted its batch, so a slow sink stalls fetching instead of letting
//! finished batches pile up. A batch is committed whole or not at all.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, ResponseCache};
use crate::domain::{Route, RouteStub};
use crate::provider::{
    MalformedPayload, ProviderError, ProviderRequest, ScheduleProvider, parse_route_detail,
    parse_summary,
};
use crate::store::{EntityStore, StoreError};

/// Configuration for bulk ingestion.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Routes per batch.
    pub batch_size: usize,

    /// Maximum batches in flight.
    pub workers: usize,
}

impl IngestConfig {
    pub fn new() -> Self {
        Self {
            batch_size: 10,
            workers: 4,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from ingestion.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("route {route}: {source}")]
    MalformedPayload {
        route: String,
        #[source]
        source: MalformedPayload,
    },

    #[error("route summary is malformed: {0}")]
    MalformedSummary(#[source] MalformedPayload),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no route could be ingested out of {offered} offered by the provider")]
    NothingIngested { offered: usize },

    #[error("ingestion task failed: {0}")]
    Join(String),
}

/// Outcome counts of a bulk ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Routes offered by the summary.
    pub offered: usize,
    /// Routes handed to the sink.
    pub persisted: usize,
    /// Routes that were unavailable or malformed.
    pub skipped: usize,
    /// Batches given up on after a connection failure.
    pub abandoned_batches: usize,
}

/// Builds `Route`s from provider payloads read through the response cache.
pub struct Ingestor<P> {
    cache: Arc<ResponseCache<P>>,
    config: IngestConfig,
}

impl<P: ScheduleProvider + 'static> Ingestor<P> {
    pub fn new(cache: Arc<ResponseCache<P>>, config: IngestConfig) -> Self {
        Self { cache, config }
    }

    /// Fetch and parse the route summary.
    pub async fn ingest_summary(&self) -> Result<Vec<RouteStub>, IngestError> {
        let bytes = self.cache.fetch(&ProviderRequest::RouteSummary).await?;
        parse_summary(&bytes).map_err(IngestError::MalformedSummary)
    }

    /// Like [`Self::ingest_summary`], but force-refreshes the cached summary.
    pub async fn refresh_summary(&self) -> Result<Vec<RouteStub>, IngestError> {
        let bytes = self.cache.refresh(&ProviderRequest::RouteSummary).await?;
        parse_summary(&bytes).map_err(IngestError::MalformedSummary)
    }

    /// Fetch and build one route.
    pub async fn ingest_route_detail(&self, stub: &RouteStub) -> Result<Route, IngestError> {
        let bytes = self.cache.fetch(&detail_request(stub)).await?;
        parse_detail(stub.clone(), bytes).await
    }

    /// Like [`Self::ingest_route_detail`], but force-refreshes the cached payload.
    pub async fn ingest_route_detail_fresh(&self, stub: &RouteStub) -> Result<Route, IngestError> {
        let bytes = self.cache.refresh(&detail_request(stub)).await?;
        parse_detail(stub.clone(), bytes).await
    }

    /// Ingest every route in `stubs`, handing each finished batch to `sink`.
    ///
    /// `sink` returns how many routes it stored. A sink error stops the
    /// ingestion and is returned; batches still in flight are cancelled.
    pub async fn ingest_all<F, Fut>(
        &self,
        stubs: Vec<RouteStub>,
        mut sink: F,
    ) -> Result<IngestReport, IngestError>
    where
        F: FnMut(Vec<Route>) -> Fut,
        Fut: Future<Output = Result<usize, IngestError>>,
    {
        let mut report = IngestReport {
            offered: stubs.len(),
            ..IngestReport::default()
        };
        if stubs.is_empty() {
            return Ok(report);
        }

        let batch_size = self.config.batch_size.max(1);
        let workers = self.config.workers.max(1);
        let batches: Vec<Vec<RouteStub>> = stubs.chunks(batch_size).map(<[_]>::to_vec).collect();
        info!(
            routes = report.offered,
            batches = batches.len(),
            workers,
            "starting bulk ingestion"
        );

        let (tx, mut rx) = mpsc::channel(workers);
        let dispatcher = tokio::spawn(dispatch(Arc::clone(&self.cache), batches, workers, tx));

        while let Some(finished) = rx.recv().await {
            match finished.outcome {
                Ok(batch) => {
                    report.skipped += batch.skipped;
                    if batch.routes.is_empty() {
                        continue;
                    }
                    let count = batch.routes.len();
                    match sink(batch.routes).await {
                        Ok(stored) => report.persisted += stored,
                        Err(e) => {
                            // Dropping the dispatcher's task set cancels the batches
                            dispatcher.abort();
                            return Err(e);
                        }
                    }
                    debug!(batch = finished.index, routes = count, "batch committed");
                }
                Err(e) => {
                    warn!(batch = finished.index, error = %e, "abandoning batch");
                    report.abandoned_batches += 1;
                }
            }
        }

        dispatcher
            .await
            .map_err(|e| IngestError::Join(e.to_string()))?;

        info!(
            persisted = report.persisted,
            skipped = report.skipped,
            abandoned_batches = report.abandoned_batches,
            "bulk ingestion finished"
        );
        Ok(report)
    }
}

/// Populate an empty store from the provider.
///
/// Returns `None` when the store already holds routes. An unreachable
/// summary, or a non-empty summary of which nothing could be stored, is an
/// error: the server has nothing to answer queries from.
pub async fn bootstrap<P: ScheduleProvider + 'static>(
    store: &Arc<EntityStore>,
    ingestor: &Ingestor<P>,
) -> Result<Option<IngestReport>, IngestError> {
    if store.run_blocking(|s| s.exists()).await? {
        debug!("entity store already populated, skipping bootstrap");
        return Ok(None);
    }

    info!("entity store is empty, bootstrapping from provider");
    let stubs = ingestor.ingest_summary().await?;
    let offered = stubs.len();

    let sink_store = Arc::clone(store);
    let report = ingestor
        .ingest_all(stubs, move |routes| {
            let store = Arc::clone(&sink_store);
            async move {
                store
                    .run_blocking(move |s| s.put_all(&routes))
                    .await
                    .map_err(IngestError::from)
            }
        })
        .await?;

    if offered > 0 && report.persisted == 0 {
        return Err(IngestError::NothingIngested { offered });
    }
    Ok(Some(report))
}

fn detail_request(stub: &RouteStub) -> ProviderRequest {
    ProviderRequest::route_detail(stub.key.clone())
}

async fn parse_detail(stub: RouteStub, bytes: Vec<u8>) -> Result<Route, IngestError> {
    let route = stub.id.to_string();
    tokio::task::spawn_blocking(move || parse_route_detail(stub, &bytes))
        .await
        .map_err(|e| IngestError::Join(e.to_string()))?
        .map_err(|source| IngestError::MalformedPayload { route, source })
}

struct BatchRoutes {
    routes: Vec<Route>,
    skipped: usize,
}

struct FinishedBatch {
    index: usize,
    outcome: Result<BatchRoutes, IngestError>,
}

/// Spawn one task per batch, at most `workers` running or waiting to hand
/// over their batch at once. Cancelling this future cancels every batch.
async fn dispatch<P: ScheduleProvider + 'static>(
    cache: Arc<ResponseCache<P>>,
    batches: Vec<Vec<RouteStub>>,
    workers: usize,
    tx: mpsc::Sender<FinishedBatch>,
) {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    for (index, batch) in batches.into_iter().enumerate() {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let cache = Arc::clone(&cache);
        let tx = tx.clone();
        tasks.spawn(async move {
            let outcome = run_batch(&cache, batch).await;
            // The slot is held until the coordinator takes the batch.
            let sent = tx.send(FinishedBatch { index, outcome }).await;
            drop(permit);
            if sent.is_err() {
                debug!(batch = index, "coordinator gone, dropping batch");
            }
        });
    }
    drop(tx);

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "ingestion batch task failed");
        }
    }
}

async fn run_batch<P: ScheduleProvider>(
    cache: &ResponseCache<P>,
    batch: Vec<RouteStub>,
) -> Result<BatchRoutes, IngestError> {
    let mut payloads = Vec::with_capacity(batch.len());
    let mut skipped = 0;

    for stub in batch {
        match cache.fetch(&detail_request(&stub)).await {
            Ok(bytes) => payloads.push((stub, bytes)),
            Err(CacheError::ProviderUnavailable(ProviderError::NotAvailable)) => {
                debug!(route = %stub.id, "route detail not available, skipping");
                skipped += 1;
            }
            Err(CacheError::ProviderUnavailable(e @ ProviderError::Other { .. })) => {
                warn!(route = %stub.id, error = %e, "provider rejected route detail, skipping");
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let fetched = payloads.len();
    let routes = tokio::task::spawn_blocking(move || {
        payloads
            .into_iter()
            .filter_map(|(stub, bytes)| {
                let id = stub.id.clone();
                match parse_route_detail(stub, &bytes) {
                    Ok(route) => Some(route),
                    Err(e) => {
                        warn!(route = %id, error = %e, "skipping malformed route");
                        None
                    }
                }
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| IngestError::Join(e.to_string()))?;

    skipped += fetched - routes.len();
    Ok(BatchRoutes { routes, skipped })
}
