use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde::Serialize;
use tracing::{debug, trace};

use crate::{cache::DocumentCache, config::StoreConfig, shard::ShardFiles, Result};

/// Pseudo shard key under which flat-collection contents are cached; real
/// shard keys always carry a `-{year}-{month}` suffix, so it cannot collide.
pub(crate) const FLAT_KEY: &str = "flat";

/// The embedded document store for payment records.
///
/// `Store` owns the shard file backend, the in-memory TTL cache, a per-shard
/// lock table serializing read-modify-write cycles, and the background task
/// sweeping expired cache entries. It is the single entry point other
/// subsystems call; one instance is shared by all concurrent callers.
///
/// # Layout
///
/// - `{data_dir}/{collection}.json` holds a flat collection (one JSON array)
/// - `{data_dir}/shards/{collection}-{merchant}-{year}-{month}.json` holds
///   one shard of a sharded collection
///
/// # Example
///
/// ```no_run
/// use ledgerstore::{Store, StoreConfig};
/// use serde_json::json;
///
/// # async fn example() -> ledgerstore::Result<()> {
/// let store = Store::new(StoreConfig::new("/var/lib/ledgerstore")).await?;
///
/// store
///     .insert_document(
///         "transactions",
///         json!({"id": "t1", "merchantId": "M1", "amount": 125.50}),
///     )
///     .await?;
///
/// let doc = store.find_by_id("transactions", "t1").await?;
/// assert!(doc.is_some());
/// # Ok(())
/// # }
/// ```
///
/// # Thread safety
///
/// `Store` is safe to share across tasks and threads. Writes targeting the
/// same shard are serialized by a per-shard async lock; cross-shard
/// migration takes both locks in lexicographic key order to avoid deadlock.
#[derive(Debug)]
pub struct Store {
    /// Store configuration, injected at construction.
    pub(crate) config:      StoreConfig,
    /// Shard and flat-file storage backend.
    pub(crate) files:       ShardFiles,
    /// Shared TTL read cache.
    pub(crate) cache:       Arc<DocumentCache>,
    /// Per-shard write locks, created lazily per `{collection}::{shard}`.
    pub(crate) shard_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Background cache sweeper, aborted on drop.
    sweep_task:             Option<tokio::task::JoinHandle<()>>,
}

/// Read-only operational snapshot of a store, for status endpoints and
/// tooling. Not used by correctness-sensitive callers.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    /// Number of cache entries currently held (expired or not).
    pub cache_size: usize,
    /// All current cache keys, sorted.
    pub cache_keys: Vec<String>,
    /// Static capability flag: this store shards its collections.
    pub sharding:   bool,
}

impl Store {
    /// Creates a store, its directory layout, and the cache sweeper task.
    pub async fn new(config: StoreConfig) -> Result<Self> {
        trace!("Creating store at {:?}", config.data_dir);
        let files = ShardFiles::new(&config.data_dir).await?;
        let cache = Arc::new(DocumentCache::new(config.cache_ttl));

        let sweep_cache = Arc::clone(&cache);
        let sweep_interval = config.cache_sweep_interval;
        let sweep_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            // the first tick fires immediately; skip it
            interval.tick().await;
            loop {
                interval.tick().await;
                let size = sweep_cache.sweep();
                trace!("Cache sweep complete, {} entries remain", size);
            }
        });

        debug!("Store ready at {:?}", config.data_dir);
        Ok(Self {
            config,
            files,
            cache,
            shard_locks: Mutex::new(HashMap::new()),
            sweep_task: Some(sweep_task),
        })
    }

    /// Returns the store configuration.
    pub const fn config(&self) -> &StoreConfig { &self.config }

    /// Returns the operational status snapshot.
    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            cache_size: self.cache.len(),
            cache_keys: self.cache.keys(),
            sharding:   true,
        }
    }

    /// Stops the background cache sweeper.
    ///
    /// In-flight store operations are unaffected; only the periodic sweep
    /// stops. Called automatically on drop.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.sweep_task.take() {
            task.abort();
            debug!("Cache sweeper stopped");
        }
    }

    /// Returns the lock guarding one shard (or a flat collection's single
    /// file), creating it on first use.
    pub(crate) fn shard_lock(&self, collection: &str, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.shard_locks.lock().unwrap();
        Arc::clone(
            locks
                .entry(format!("{}::{}", collection, key))
                .or_default(),
        )
    }

    /// Returns the locks for a shard pair in lexicographic key order.
    ///
    /// Callers must acquire them in the returned order; the second element
    /// is `None` when both names resolve to the same shard.
    pub(crate) fn shard_lock_pair(
        &self,
        collection: &str,
        key_a: &str,
        key_b: &str,
    ) -> (Arc<tokio::sync::Mutex<()>>, Option<Arc<tokio::sync::Mutex<()>>>) {
        if key_a == key_b {
            return (self.shard_lock(collection, key_a), None);
        }
        let (first, second) = if key_a < key_b { (key_a, key_b) } else { (key_b, key_a) };
        (
            self.shard_lock(collection, first),
            Some(self.shard_lock(collection, second)),
        )
    }
}

impl Drop for Store {
    fn drop(&mut self) { self.shutdown(); }
}
