use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use itinerary_server::api::AppState;
use itinerary_server::cache::ResponseCache;
use itinerary_server::config::AppConfig;
use itinerary_server::ingest::{Ingestor, bootstrap};
use itinerary_server::planner::QueryConfig;
use itinerary_server::provider::{MockProvider, ProviderClient, ScheduleProvider};
use itinerary_server::renewal::RenewalWorker;
use itinerary_server::store::EntityStore;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "itinerary server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), BoxError> {
    let config = AppConfig::from_env()?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Serve recorded payloads instead of the live API
    match std::env::var("PROVIDER_MOCK_DIR") {
        Ok(dir) if !dir.is_empty() => {
            info!(dir = %dir, "using recorded provider payloads");
            serve(MockProvider::from_dir(&dir)?, config, &args).await
        }
        _ => serve(ProviderClient::new(config.provider.clone())?, config, &args).await,
    }
}

async fn serve<P: ScheduleProvider + 'static>(
    provider: P,
    config: AppConfig,
    args: &[String],
) -> Result<(), BoxError> {
    let cache = Arc::new(ResponseCache::open(provider, config.cache.clone()).await?);
    if !config.cache_prune_age.is_zero() {
        let pruned = cache.invalidate_older_than(config.cache_prune_age).await?;
        info!(pruned, "pruned old cache entries");
    }

    let store = Arc::new(EntityStore::open(&config.store)?);
    let ingestor = Arc::new(Ingestor::new(Arc::clone(&cache), config.ingest.clone()));

    if let Some(report) = bootstrap(&store, &ingestor).await? {
        info!(
            routes = report.persisted,
            skipped = report.skipped,
            abandoned_batches = report.abandoned_batches,
            "bootstrapped entity store"
        );
    }

    let renewal = RenewalWorker::new(ingestor, Arc::clone(&store), config.renewal.clone()).spawn();
    let state = AppState::new(Arc::clone(&store), QueryConfig::default());

    match args {
        [origin, destination, date] => {
            let itineraries = state.find_itineraries(origin, destination, date).await;
            if itineraries.is_empty() {
                println!("No direct trips from {origin} to {destination} on {date}");
            }
            for it in &itineraries {
                println!(
                    "{} -> {}  {} {} ({})",
                    it.departure_time,
                    it.arrival_time,
                    it.route_short_name,
                    it.route_long_name,
                    it.direction
                );
            }
        }
        [query] => {
            for stop in state.search_stops(query).await {
                println!("{}  {}", stop.id, stop.name);
            }
        }
        [] => {
            let stops = state.list_all_stops().await;
            info!(stops = stops.len(), "ready, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
        }
        _ => {
            eprintln!("usage: itinerary-server [<origin-stop-id> <destination-stop-id> <YYYYMMDD> | <stop query>]");
        }
    }

    renewal.abort();
    if let Err(e) = renewal.await
        && !e.is_cancelled()
    {
        warn!(error = %e, "renewal worker failed");
    }
    drop(state);

    let stats = cache.stats();
    info!(
        hits = stats.hits.load(Ordering::Relaxed),
        misses = stats.misses.load(Ordering::Relaxed),
        writes = stats.writes.load(Ordering::Relaxed),
        "response cache usage"
    );

    match Arc::try_unwrap(store) {
        Ok(store) => store.close()?,
        Err(_) => warn!("entity store still in use at shutdown"),
    }
    Ok(())
}
