//! Background renewal of stored routes.
//!
//! The worker wakes up every `interval`, force-refreshes one route's
//! payload and replaces it in the store, then moves on to the next key,
//! cycling through the summary indefinitely. On the first step and every
//! `summary_every` steps after that, the summary itself is refreshed and
//! routes the provider no longer offers are dropped from the store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{RouteId, RouteStub};
use crate::ingest::{IngestError, Ingestor};
use crate::provider::ScheduleProvider;
use crate::store::EntityStore;

/// Configuration for the renewal worker.
#[derive(Debug, Clone)]
pub struct RenewalConfig {
    /// Sleep between two keys.
    pub interval: Duration,

    /// Steps between two summary refreshes.
    pub summary_every: u64,
}

impl RenewalConfig {
    pub fn new() -> Self {
        Self {
            interval: Duration::from_secs(120),
            summary_every: 1000,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_summary_every(mut self, steps: u64) -> Self {
        self.summary_every = steps;
        self
    }
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What one wake-up of the worker did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The route was re-fetched and replaced in the store.
    Renewed(RouteId),
    /// Renewing the route failed; it is retried on the next cycle.
    Failed(RouteId),
    /// No keys are known yet.
    Idle,
}

/// Keeps the entity store fresh, one route per wake-up.
pub struct RenewalWorker<P> {
    ingestor: Arc<Ingestor<P>>,
    store: Arc<EntityStore>,
    config: RenewalConfig,
    keys: Vec<RouteStub>,
    cursor: usize,
    steps: u64,
}

impl<P: ScheduleProvider + 'static> RenewalWorker<P> {
    pub fn new(ingestor: Arc<Ingestor<P>>, store: Arc<EntityStore>, config: RenewalConfig) -> Self {
        Self {
            ingestor,
            store,
            config,
            keys: Vec::new(),
            cursor: 0,
            steps: 0,
        }
    }

    /// Route keys the worker is currently cycling through.
    pub fn keys(&self) -> &[RouteStub] {
        &self.keys
    }

    /// Perform one wake-up: maybe refresh the summary, then renew one route.
    pub async fn step(&mut self) -> StepOutcome {
        if self.steps % self.config.summary_every.max(1) == 0 {
            self.reload_summary().await;
        }
        self.steps += 1;

        if self.keys.is_empty() {
            return StepOutcome::Idle;
        }
        let stub = self.keys[self.cursor % self.keys.len()].clone();
        self.cursor = (self.cursor + 1) % self.keys.len();

        match self.renew(&stub).await {
            Ok(()) => {
                debug!(route = %stub.id, "renewed route");
                StepOutcome::Renewed(stub.id)
            }
            Err(e) => {
                warn!(route = %stub.id, error = %e, "failed to renew route");
                StepOutcome::Failed(stub.id)
            }
        }
    }

    /// Run forever, sleeping `interval` between steps.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            summary_every = self.config.summary_every,
            "renewal worker started"
        );
        loop {
            self.step().await;
            tokio::time::sleep(self.config.interval).await;
        }
    }

    /// Run the worker on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn renew(&self, stub: &RouteStub) -> Result<(), IngestError> {
        let route = self.ingestor.ingest_route_detail_fresh(stub).await?;
        self.store.run_blocking(move |s| s.put(&route)).await?;
        Ok(())
    }

    async fn reload_summary(&mut self) {
        let stubs = match self.ingestor.refresh_summary().await {
            Ok(stubs) => stubs,
            Err(e) if self.keys.is_empty() => {
                warn!(error = %e, "summary refresh failed, falling back to cached summary");
                match self.ingestor.ingest_summary().await {
                    Ok(stubs) => stubs,
                    Err(e) => {
                        warn!(error = %e, "no route summary available");
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "summary refresh failed, keeping previous keys");
                return;
            }
        };

        if stubs.is_empty() {
            warn!("provider summary is empty, keeping previous keys");
            return;
        }

        let keep: HashSet<RouteId> = stubs.iter().map(|s| s.id.clone()).collect();
        match self.store.run_blocking(move |s| s.retain(&keep)).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "dropped routes missing from summary"),
            Err(e) => warn!(error = %e, "failed to drop stale routes"),
        }

        // Carry on from the key that was due next, wherever it now sits
        let due = self
            .keys
            .get(self.cursor)
            .and_then(|next| stubs.iter().position(|s| s.id == next.id));
        self.cursor = due.unwrap_or(self.cursor % stubs.len());

        info!(routes = stubs.len(), "loaded route summary");
        self.keys = stubs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, ResponseCache, RetryPolicy};
    use crate::ingest::IngestConfig;
    use crate::provider::convert::fixtures::{detail_json, summary_json};
    use crate::provider::{MockProvider, ProviderError, ProviderRequest};
    use crate::store::StoreConfig;
    use tempfile::{TempDir, tempdir};

    fn detail(depart: &str) -> Vec<u8> {
        detail_json(
            "Lisboa",
            &[("T1", &["20230703"], &[("A", 1, depart), ("C", 2, "09:00")])],
        )
    }

    struct Harness {
        _dir: TempDir,
        provider: MockProvider,
        store: Arc<EntityStore>,
        worker: RenewalWorker<MockProvider>,
    }

    async fn harness(summary_every: u64) -> Harness {
        let provider = MockProvider::new()
            .with_summary(summary_json(&[("r0", "k0"), ("r1", "k1")]))
            .with_route("k0", detail("07:00"))
            .with_route("k1", detail("07:30"));
        let dir = tempdir().unwrap();
        let cache = ResponseCache::open(
            provider.clone(),
            CacheConfig::new(dir.path()).with_retry(RetryPolicy::new(1, Duration::ZERO)),
        )
        .await
        .unwrap();
        let ingestor = Arc::new(Ingestor::new(Arc::new(cache), IngestConfig::default()));
        let store = Arc::new(EntityStore::open_in_memory(&StoreConfig::default()).unwrap());
        let config = RenewalConfig::new()
            .with_interval(Duration::from_millis(5))
            .with_summary_every(summary_every);
        let worker = RenewalWorker::new(ingestor, Arc::clone(&store), config);
        Harness {
            _dir: dir,
            provider,
            store,
            worker,
        }
    }

    fn first_departure(store: &EntityStore, id: &str) -> String {
        let route = store.get(&RouteId::new(id)).unwrap().unwrap();
        route.trips()[0].stops()[0].departure.hhmm()
    }

    #[tokio::test]
    async fn cycles_through_keys() {
        let mut h = harness(1000).await;

        assert_eq!(h.worker.step().await, StepOutcome::Renewed(RouteId::new("r0")));
        assert_eq!(h.worker.keys().len(), 2);
        assert_eq!(h.worker.step().await, StepOutcome::Renewed(RouteId::new("r1")));
        assert_eq!(h.worker.step().await, StepOutcome::Renewed(RouteId::new("r0")));
        assert_eq!(h.store.len().unwrap(), 2);
        assert_eq!(
            h.provider.call_count(&ProviderRequest::RouteSummary),
            1,
            "summary is only refreshed on the first step"
        );
    }

    #[tokio::test]
    async fn renewal_picks_up_changed_payload() {
        let mut h = harness(1000).await;
        h.worker.step().await;
        assert_eq!(first_departure(&h.store, "r0"), "07:00");

        h.provider.set_route("k0", detail("08:15"));
        h.worker.step().await; // r1
        h.worker.step().await; // r0 again
        assert_eq!(first_departure(&h.store, "r0"), "08:15");
    }

    #[tokio::test]
    async fn failure_is_skipped_and_worker_advances() {
        let mut h = harness(1000).await;
        h.provider.fail_next(
            ProviderRequest::route_detail("k0"),
            ProviderError::ConnectionFailed("timeout".to_string()),
        );

        assert_eq!(h.worker.step().await, StepOutcome::Failed(RouteId::new("r0")));
        assert_eq!(h.worker.step().await, StepOutcome::Renewed(RouteId::new("r1")));
        assert!(h.store.get(&RouteId::new("r0")).unwrap().is_none());
    }

    #[tokio::test]
    async fn summary_refresh_drops_vanished_routes() {
        let mut h = harness(2).await;
        h.worker.step().await;
        h.worker.step().await;
        assert_eq!(h.store.len().unwrap(), 2);

        h.provider.set_summary(summary_json(&[("r1", "k1")]));
        // Third step reloads the summary
        assert_eq!(h.worker.step().await, StepOutcome::Renewed(RouteId::new("r1")));
        assert_eq!(h.store.route_ids().unwrap(), vec![RouteId::new("r1")]);
        assert_eq!(h.worker.keys().len(), 1);
    }

    #[tokio::test]
    async fn summary_reload_keeps_cycling_past_reload_cadence() {
        let mut h = harness(2).await;
        h.provider
            .set_summary(summary_json(&[("r0", "k0"), ("r1", "k1"), ("r2", "k2")]));
        h.provider.set_route("k2", detail("08:00"));

        let mut renewed = Vec::new();
        for _ in 0..6 {
            match h.worker.step().await {
                StepOutcome::Renewed(id) => renewed.push(id.to_string()),
                other => panic!("unexpected step outcome {other:?}"),
            }
        }
        assert_eq!(renewed, ["r0", "r1", "r2", "r0", "r1", "r2"]);
        assert_eq!(h.provider.call_count(&ProviderRequest::RouteSummary), 3);
    }

    #[tokio::test]
    async fn summary_reload_follows_due_key_to_new_position() {
        let mut h = harness(2).await;
        h.provider
            .set_summary(summary_json(&[("r0", "k0"), ("r1", "k1"), ("r2", "k2")]));
        h.provider.set_route("k2", detail("08:00"));
        h.worker.step().await; // r0
        h.worker.step().await; // r1

        // r2 is due next; a new route is inserted before it
        h.provider.set_summary(summary_json(&[
            ("r0", "k0"),
            ("r1", "k1"),
            ("r9", "k9"),
            ("r2", "k2"),
        ]));
        h.provider.set_route("k9", detail("09:00"));
        assert_eq!(h.worker.step().await, StepOutcome::Renewed(RouteId::new("r2")));
        assert_eq!(h.worker.step().await, StepOutcome::Renewed(RouteId::new("r0")));
    }

    #[tokio::test]
    async fn failed_summary_refresh_keeps_keys() {
        let mut h = harness(1).await;
        h.worker.step().await;

        h.provider.fail_next(
            ProviderRequest::RouteSummary,
            ProviderError::ConnectionFailed("timeout".to_string()),
        );
        assert_eq!(h.worker.step().await, StepOutcome::Renewed(RouteId::new("r1")));
        assert_eq!(h.worker.keys().len(), 2);
    }

    #[tokio::test]
    async fn idle_without_summary() {
        let mut h = harness(1000).await;
        h.provider.fail_next(
            ProviderRequest::RouteSummary,
            ProviderError::ConnectionFailed("down".to_string()),
        );
        h.provider.fail_next(
            ProviderRequest::RouteSummary,
            ProviderError::ConnectionFailed("down".to_string()),
        );
        assert_eq!(h.worker.step().await, StepOutcome::Idle);
    }

    #[tokio::test]
    async fn spawned_worker_renews_in_background() {
        let h = harness(1000).await;
        let store = Arc::clone(&h.store);
        let handle = h.worker.spawn();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.len().unwrap() < 2 {
            assert!(tokio::time::Instant::now() < deadline, "worker made no progress");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
