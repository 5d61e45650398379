//! Process configuration read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::ingest::IngestConfig;
use crate::provider::ProviderConfig;
use crate::renewal::RenewalConfig;
use crate::store::StoreConfig;

/// A configuration variable with an unusable value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid value {value:?} for {name}: {reason}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub reason: String,
}

/// Configuration for every component of the server.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub renewal: RenewalConfig,

    /// Cache entries older than this are deleted at startup.
    pub cache_prune_age: Duration,
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut provider = defaults.provider;
        if let Some(url) = get("PROVIDER_BASE_URL") {
            provider = provider.with_base_url(url);
        }
        if let Some(key) = get("PROVIDER_API_KEY") {
            provider = provider.with_api_key(key);
        }
        if let Some(secs) = parse_var::<u64>(&get, "PROVIDER_TIMEOUT_SECS")? {
            provider = provider.with_timeout(positive("PROVIDER_TIMEOUT_SECS", secs)?);
        }

        let cache = match get("CACHE_DIR") {
            Some(dir) => CacheConfig::new(PathBuf::from(dir)),
            None => defaults.cache,
        };
        let store = match get("STORE_PATH") {
            Some(path) => StoreConfig::new(PathBuf::from(path)),
            None => defaults.store,
        };

        let mut renewal = defaults.renewal;
        if let Some(secs) = parse_var::<u64>(&get, "RENEWAL_INTERVAL_SECS")? {
            renewal = renewal.with_interval(Duration::from_secs(secs));
        }
        if let Some(steps) = parse_var::<u64>(&get, "RENEWAL_SUMMARY_EVERY")? {
            renewal = renewal.with_summary_every(positive("RENEWAL_SUMMARY_EVERY", steps)?);
        }

        let mut ingest = defaults.ingest;
        if let Some(n) = parse_var::<usize>(&get, "INGEST_BATCH_SIZE")? {
            ingest = ingest.with_batch_size(positive("INGEST_BATCH_SIZE", n)?);
        }
        if let Some(n) = parse_var::<usize>(&get, "INGEST_WORKERS")? {
            ingest = ingest.with_workers(positive("INGEST_WORKERS", n)?);
        }

        let cache_prune_age = match parse_var::<u64>(&get, "CACHE_PRUNE_DAYS")? {
            Some(days) => days_to_duration(days),
            None => defaults.cache_prune_age,
        };

        Ok(Self {
            provider,
            cache,
            store,
            ingest,
            renewal,
            cache_prune_age,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            cache: CacheConfig::default(),
            store: StoreConfig::default(),
            ingest: IngestConfig::default(),
            renewal: RenewalConfig::default(),
            cache_prune_age: days_to_duration(30),
        }
    }
}

fn days_to_duration(days: u64) -> Duration {
    Duration::from_secs(days.saturating_mul(24 * 60 * 60))
}

fn parse_var<T>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(name)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError {
                name,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

fn positive<T: PartialEq + Default + ToString>(name: &'static str, n: T) -> Result<T, ConfigError> {
    if n == T::default() {
        return Err(ConfigError {
            name,
            value: n.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(n)
}
