//! Persistent store of ingested routes.
//!
//! Routes are kept in a single SQLite table keyed by route id, with each
//! value a bincode-encoded `Route`. Writes replace a route wholesale inside
//! a transaction, so a reader sees either the old or the new value for a
//! key. Decoded routes served by [`EntityStore::get`] are kept in a small
//! in-memory cache that every write to the key invalidates.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use moka::sync::Cache as MokaCache;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::domain::{Route, RouteId};

/// Configuration for the entity store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the database file.
    pub path: PathBuf,

    /// Rows fetched per page when streaming.
    pub page_size: usize,

    /// Maximum number of decoded routes kept in memory.
    pub max_cached_routes: u64,

    /// TTL for decoded routes kept in memory.
    pub cached_route_ttl: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            page_size: 8,
            max_cached_routes: 64,
            cached_route_ttl: Duration::from_secs(300),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("cache/routes.db")
    }
}

/// Errors from the entity store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode or decode route {route}: {source}")]
    Codec {
        route: String,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to create store directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("blocking store task failed: {0}")]
    Join(String),
}

/// Keyed store of `Route` entities.
pub struct EntityStore {
    conn: Mutex<Connection>,
    page_size: usize,
    hot: MokaCache<RouteId, Arc<Route>>,
}

impl EntityStore {
    /// Open (or create) the store at `config.path`.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&config.path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        debug!(path = ?config.path, "opened entity store");
        Self::init(conn, config)
    }

    /// Open a store that lives only in memory.
    pub fn open_in_memory(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, config)
    }

    fn init(conn: Connection, config: &StoreConfig) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS routes (
                id TEXT PRIMARY KEY,
                route BLOB NOT NULL
            )",
        )?;

        let hot = MokaCache::builder()
            .max_capacity(config.max_cached_routes)
            .time_to_live(config.cached_route_ttl)
            .build();

        Ok(Self {
            conn: Mutex::new(conn),
            page_size: config.page_size.max(1),
            hot,
        })
    }

    /// Close the underlying database.
    pub fn close(self) -> Result<(), StoreError> {
        let conn = self.conn.into_inner().unwrap_or_else(|e| e.into_inner());
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-transaction rolls the transaction back on drop.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get a route by id. A route that was never ingested is `Ok(None)`.
    pub fn get(&self, id: &RouteId) -> Result<Option<Arc<Route>>, StoreError> {
        if let Some(route) = self.hot.get(id) {
            return Ok(Some(route));
        }

        // The hot cache is filled under the connection lock so that a
        // concurrent write cannot be overtaken by a stale insert.
        let conn = self.lock();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT route FROM routes WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(blob) = blob else {
            return Ok(None);
        };
        let route = Arc::new(decode(id.as_str(), &blob)?);
        self.hot.insert(id.clone(), route.clone());
        Ok(Some(route))
    }

    /// Insert or replace a single route.
    pub fn put(&self, route: &Route) -> Result<(), StoreError> {
        self.put_all(std::iter::once(route)).map(|_| ())
    }

    /// Insert or replace routes in one transaction. Returns how many were written.
    pub fn put_all<'a>(&self, routes: impl IntoIterator<Item = &'a Route>) -> Result<usize, StoreError> {
        let encoded = routes
            .into_iter()
            .map(|route| Ok((route.id.clone(), encode(route)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO routes (id, route) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET route = excluded.route",
            )?;
            for (id, blob) in &encoded {
                stmt.execute(params![id.as_str(), blob])?;
            }
        }
        tx.commit()?;

        for (id, _) in &encoded {
            self.hot.invalidate(id);
        }
        Ok(encoded.len())
    }

    /// Remove a route. Returns whether it existed.
    pub fn remove(&self, id: &RouteId) -> Result<bool, StoreError> {
        let conn = self.lock();
        let removed = conn.execute("DELETE FROM routes WHERE id = ?1", params![id.as_str()])?;
        self.hot.invalidate(id);
        Ok(removed > 0)
    }

    /// Remove every route whose id is not in `keep`. Returns how many were removed.
    pub fn retain(&self, keep: &HashSet<RouteId>) -> Result<usize, StoreError> {
        let stale: Vec<RouteId> = self
            .route_ids()?
            .into_iter()
            .filter(|id| !keep.contains(id))
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM routes WHERE id = ?1")?;
            for id in &stale {
                stmt.execute(params![id.as_str()])?;
            }
        }
        tx.commit()?;

        for id in &stale {
            self.hot.invalidate(id);
        }
        info!(removed = stale.len(), "removed routes no longer offered by provider");
        Ok(stale.len())
    }

    /// Whether the store holds any routes.
    pub fn exists(&self) -> Result<bool, StoreError> {
        let conn = self.lock();
        let exists = conn.query_row("SELECT EXISTS(SELECT 1 FROM routes)", [], |row| row.get(0))?;
        Ok(exists)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM routes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.exists().map(|e| !e)
    }

    /// All stored route ids, in key order.
    pub fn route_ids(&self) -> Result<Vec<RouteId>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached("SELECT id FROM routes ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|id| id.map(RouteId::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Lazily stream every route in key order.
    ///
    /// Rows are fetched a page at a time and decoded one by one, so the
    /// whole store is never held in memory. Each call starts from the
    /// beginning.
    pub fn stream_all(&self) -> RouteStream<'_> {
        RouteStream {
            store: self,
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Run a store operation on the blocking thread pool.
    pub async fn run_blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&EntityStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    fn fetch_page(&self, after: Option<&str>) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let conn = self.lock();
        let limit = self.page_size as i64;
        let rows = match after {
            Some(after) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, route FROM routes WHERE id > ?1 ORDER BY id LIMIT ?2",
                )?;
                stmt.query_map(params![after, limit], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt =
                    conn.prepare_cached("SELECT id, route FROM routes ORDER BY id LIMIT ?1")?;
                stmt.query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(rows)
    }
}

/// Lazy iterator over all stored routes, see [`EntityStore::stream_all`].
pub struct RouteStream<'a> {
    store: &'a EntityStore,
    /// Last key handed out; the next page starts after it.
    after: Option<String>,
    buffer: VecDeque<(String, Vec<u8>)>,
    exhausted: bool,
}

impl Iterator for RouteStream<'_> {
    type Item = Result<Route, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.store.fetch_page(self.after.as_deref()) {
                Ok(page) => {
                    if page.len() < self.store.page_size {
                        self.exhausted = true;
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        let (id, blob) = self.buffer.pop_front()?;
        let item = decode(&id, &blob);
        self.after = Some(id);
        Some(item)
    }
}

fn encode(route: &Route) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(route).map_err(|source| StoreError::Codec {
        route: route.id.to_string(),
        source,
    })
}

fn decode(id: &str, blob: &[u8]) -> Result<Route, StoreError> {
    bincode::deserialize(blob).map_err(|source| StoreError::Codec {
        route: id.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::{date, route, timed};
    use crate::domain::Trip;
    use tempfile::tempdir;

    fn memory_store(page_size: usize) -> EntityStore {
        EntityStore::open_in_memory(&StoreConfig::new(":memory:").with_page_size(page_size))
            .unwrap()
    }

    fn sample_route(id: &str, depart: &str) -> Route {
        let trip = Trip::new(
            format!("{id}-t1"),
            "p0_7",
            "Out",
            [date("20230703")],
            vec![timed("A", 1, depart), timed("C", 2, "09:00")],
        )
        .unwrap();
        route(id, vec![trip])
    }

    #[test]
    fn empty_store() {
        let store = memory_store(4);
        assert!(!store.exists().unwrap());
        assert!(store.is_empty().unwrap());
        assert_eq!(store.len().unwrap(), 0);
        assert!(store.get(&RouteId::new("nope")).unwrap().is_none());
        assert_eq!(store.stream_all().count(), 0);
    }

    #[test]
    fn put_and_get() {
        let store = memory_store(4);
        let r = sample_route("1002_0", "07:46");
        store.put(&r).unwrap();

        assert!(store.exists().unwrap());
        let got = store.get(&r.id).unwrap().unwrap();
        assert_eq!(*got, r);
        assert!(got.trips()[0].in_sequence("A", "C"));
    }

    #[test]
    fn put_replaces_wholesale() {
        let store = memory_store(4);
        let old = sample_route("1002_0", "07:46");
        store.put(&old).unwrap();
        // Warm the in-memory cache with the old value
        assert_eq!(*store.get(&old.id).unwrap().unwrap(), old);

        let new = sample_route("1002_0", "08:15");
        store.put(&new).unwrap();

        assert_eq!(*store.get(&new.id).unwrap().unwrap(), new);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn stream_all_pages_through_everything() {
        let store = memory_store(3);
        let routes: Vec<Route> = (0..10)
            .map(|i| sample_route(&format!("r{i:02}"), "07:00"))
            .collect();
        assert_eq!(store.put_all(&routes).unwrap(), 10);

        let streamed: Vec<Route> = store.stream_all().map(|r| r.unwrap()).collect();
        let ids: Vec<&str> = streamed.iter().map(|r| r.id.as_str()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("r{i:02}")).collect();
        assert_eq!(ids, expected);

        // Restartable
        assert_eq!(store.stream_all().count(), 10);
    }

    #[test]
    fn stream_with_exact_page_multiple() {
        let store = memory_store(5);
        let routes: Vec<Route> = (0..10)
            .map(|i| sample_route(&format!("r{i}"), "07:00"))
            .collect();
        store.put_all(&routes).unwrap();
        assert_eq!(store.stream_all().count(), 10);
    }

    #[test]
    fn stream_sees_replacement_made_mid_stream() {
        let store = memory_store(1);
        store
            .put_all(&[sample_route("a", "07:00"), sample_route("b", "07:00")])
            .unwrap();

        let mut stream = store.stream_all();
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.id.as_str(), "a");

        store.put(&sample_route("b", "10:00")).unwrap();
        let second = stream.next().unwrap().unwrap();
        assert_eq!(second, sample_route("b", "10:00"));
        assert!(stream.next().is_none());
    }

    #[test]
    fn remove_and_retain() {
        let store = memory_store(4);
        store
            .put_all(&[
                sample_route("a", "07:00"),
                sample_route("b", "07:00"),
                sample_route("c", "07:00"),
            ])
            .unwrap();
        store.get(&RouteId::new("c")).unwrap();

        assert!(store.remove(&RouteId::new("a")).unwrap());
        assert!(!store.remove(&RouteId::new("a")).unwrap());

        let keep: HashSet<RouteId> = [RouteId::new("b")].into_iter().collect();
        assert_eq!(store.retain(&keep).unwrap(), 1);
        assert_eq!(store.route_ids().unwrap(), vec![RouteId::new("b")]);
        assert!(store.get(&RouteId::new("c")).unwrap().is_none());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("nested").join("routes.db"));

        let store = EntityStore::open(&config).unwrap();
        store.put(&sample_route("1002_0", "07:46")).unwrap();
        store.close().unwrap();

        let store = EntityStore::open(&config).unwrap();
        assert!(store.exists().unwrap());
        assert_eq!(
            *store.get(&RouteId::new("1002_0")).unwrap().unwrap(),
            sample_route("1002_0", "07:46")
        );
    }

    #[tokio::test]
    async fn run_blocking_uses_store() {
        let store = Arc::new(memory_store(4));
        let n = store
            .run_blocking(|s| s.put_all(&[sample_route("a", "07:00")]))
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert!(store.run_blocking(|s| s.exists()).await.unwrap());
    }
}
