//! On-disk cache of raw provider responses.
//!
//! Entries are opaque byte blobs keyed by a deterministic encoding of the
//! logical request. Reads go through the cache to the provider on a miss;
//! writes go to a unique temporary file that is then renamed over the
//! entry, so a concurrent reader sees either the old or the new payload and
//! never a truncated one. Same-key writers are serialized by a per-key lock.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use moka::future::Cache as MokaCache;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::provider::{ProviderError, ProviderRequest, ScheduleProvider};

/// File suffix of cache entries.
const ENTRY_SUFFIX: &str = ".bin";

/// File suffix of in-flight writes.
const TEMP_SUFFIX: &str = ".tmp";

/// Deterministic identity of a logical request.
///
/// The canonical form is `endpoint?name=value&...` with parameters sorted,
/// so identical requests map to the same key regardless of parameter order.
///
/// ```
/// use itinerary_server::cache::RequestKey;
///
/// let a = RequestKey::new("routes", [("b", "2"), ("a", "1")]);
/// let b = RequestKey::new("routes", [("a", "1"), ("b", "2")]);
/// assert_eq!(a, b);
/// assert_eq!(a.canonical(), "routes?a=1&b=2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new<K, V>(endpoint: &str, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params: Vec<(String, String)> = params
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        params.sort();

        let mut canonical = endpoint.to_string();
        for (i, (k, v)) in params.iter().enumerate() {
            canonical.push(if i == 0 { '?' } else { '&' });
            canonical.push_str(k);
            canonical.push('=');
            canonical.push_str(v);
        }
        Self(canonical)
    }

    pub fn canonical(&self) -> &str {
        &self.0
    }

    /// File name of this entry: URL-safe base64 of the canonical form.
    pub fn file_name(&self) -> String {
        format!("{}{}", URL_SAFE_NO_PAD.encode(self.0.as_bytes()), ENTRY_SUFFIX)
    }

    /// Recover a key from an entry file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let encoded = name.strip_suffix(ENTRY_SUFFIX)?;
        let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        String::from_utf8(bytes).ok().map(Self)
    }
}

impl From<&ProviderRequest> for RequestKey {
    fn from(request: &ProviderRequest) -> Self {
        RequestKey::new(request.endpoint(), request.params())
    }
}

/// Fixed-backoff retry of rate-limited provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `op`, retrying while it reports `RateLimited`.
    ///
    /// Exhausting the attempt budget is reported as `ConnectionFailed`, so
    /// `RateLimited` never escapes this call.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(ProviderError::RateLimited) if attempt < self.max_attempts => {
                    debug!(attempt, backoff_ms = self.backoff.as_millis() as u64, "rate limited, backing off");
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(ProviderError::RateLimited) => {
                    return Err(ProviderError::ConnectionFailed(format!(
                        "still rate limited after {attempt} attempts"
                    )));
                }
                other => return other,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}

/// Configuration for the response cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding cache entries.
    pub dir: PathBuf,

    /// Retry policy for rate-limited fetches.
    pub retry: RetryPolicy,

    /// How long an idle per-key write lock is kept.
    pub lock_idle: Duration,
}

impl CacheConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            retry: RetryPolicy::default(),
            lock_idle: Duration::from_secs(600),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new("cache/responses")
    }
}

/// Errors from the response cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The provider could not supply the payload; nothing was cached
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(#[source] ProviderError),

    /// Reading or writing an entry failed
    #[error("cache I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the underlying cause is a provider-side failure.
    pub fn is_provider(&self) -> bool {
        matches!(self, CacheError::ProviderUnavailable(_))
    }
}

/// Counters for monitoring.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub writes: AtomicU64,
}

/// Read-through disk cache in front of a schedule provider.
pub struct ResponseCache<P> {
    provider: P,
    dir: PathBuf,
    retry: RetryPolicy,
    /// Per-key write locks.
    locks: MokaCache<RequestKey, Arc<Mutex<()>>>,
    temp_counter: AtomicU64,
    stats: CacheStats,
}

impl<P: ScheduleProvider> ResponseCache<P> {
    /// Open a cache rooted at `config.dir`, creating the directory if needed.
    pub async fn open(provider: P, config: CacheConfig) -> Result<Self, CacheError> {
        tokio::fs::create_dir_all(&config.dir)
            .await
            .map_err(|e| CacheError::io(&config.dir, e))?;

        let locks = MokaCache::builder()
            .time_to_idle(config.lock_idle)
            .build();

        Ok(Self {
            provider,
            dir: config.dir,
            retry: config.retry,
            locks,
            temp_counter: AtomicU64::new(0),
            stats: CacheStats::default(),
        })
    }

    /// Get the payload for `request`, fetching it on a miss.
    pub async fn fetch(&self, request: &ProviderRequest) -> Result<Vec<u8>, CacheError> {
        let key = RequestKey::from(request);

        if let Some(bytes) = self.read(&key).await? {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(bytes);
        }

        let lock = self.lock_for(&key).await;
        let _guard = lock.lock().await;

        // Another task may have filled the entry while we waited.
        if let Some(bytes) = self.read(&key).await? {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(bytes);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        trace!(key = key.canonical(), "cache miss");
        self.fetch_and_store(request, &key).await
    }

    /// Re-fetch `request` and replace its entry, ignoring any cached value.
    ///
    /// On failure the existing entry is left untouched.
    pub async fn refresh(&self, request: &ProviderRequest) -> Result<Vec<u8>, CacheError> {
        let key = RequestKey::from(request);
        let lock = self.lock_for(&key).await;
        let _guard = lock.lock().await;
        debug!(key = key.canonical(), "force refresh");
        self.fetch_and_store(request, &key).await
    }

    /// Read an entry without touching the provider.
    pub async fn read(&self, key: &RequestKey) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Delete an entry. Returns whether one existed.
    pub async fn invalidate(&self, key: &RequestKey) -> Result<bool, CacheError> {
        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;

        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Delete every entry last modified more than `max_age` ago.
    ///
    /// Stale temporary files left by interrupted writes are removed too.
    /// Returns the number of entries removed.
    pub async fn invalidate_older_than(&self, max_age: Duration) -> Result<usize, CacheError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?;

        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?
        {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let is_entry = name.ends_with(ENTRY_SUFFIX);
            if !is_entry && !name.ends_with(TEMP_SUFFIX) {
                continue;
            }

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(path = ?path, error = %e, "cannot read entry age");
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age < max_age {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) if is_entry => removed += 1,
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(&path, e)),
            }
        }

        debug!(removed, max_age_secs = max_age.as_secs(), "pruned response cache");
        Ok(removed)
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn path_for(&self, key: &RequestKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    async fn lock_for(&self, key: &RequestKey) -> Arc<Mutex<()>> {
        self.locks
            .get_with(key.clone(), async { Arc::new(Mutex::new(())) })
            .await
    }

    /// Fetch from the provider and persist. Caller holds the key's lock.
    async fn fetch_and_store(
        &self,
        request: &ProviderRequest,
        key: &RequestKey,
    ) -> Result<Vec<u8>, CacheError> {
        let provider = &self.provider;
        let bytes = self
            .retry
            .run(move || request.send(provider))
            .await
            .map_err(CacheError::ProviderUnavailable)?;

        self.write_atomic(key, &bytes).await?;
        Ok(bytes)
    }

    /// Write to a unique temporary file, then rename it over the entry.
    async fn write_atomic(&self, key: &RequestKey, bytes: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let temp = self.dir.join(format!(
            ".{}.{}.{}{}",
            key.file_name(),
            std::process::id(),
            self.temp_counter.fetch_add(1, Ordering::Relaxed),
            TEMP_SUFFIX
        ));

        let result = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&temp, &path).await
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(CacheError::io(&path, e));
        }

        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
