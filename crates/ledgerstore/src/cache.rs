//! In-process read cache with per-entry TTL.
//!
//! The cache is a read-through/write-through accelerator, never an
//! independent source of truth: entries are written only from values that
//! were just read from or persisted to storage.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use serde_json::Value;
use tracing::{debug, trace};

struct CacheEntry {
    value:       Value,
    inserted_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Per-collection counter bumped on every invalidation, so readers that
    /// computed a value before a write can detect it and discard the value
    /// instead of caching it.
    epochs:  HashMap<String, u64>,
}

/// Key→value cache with lazy expiry on lookup and periodic sweeping.
///
/// Three key families share the one map, distinguished by an infix:
/// shard contents (`{collection}::shard::{key}`), by-id lookups
/// (`{collection}::id::{id}`) and query results
/// (`{collection}::query::{filter}::{options}`). Collection-scoped
/// invalidation removes the query family only.
pub struct DocumentCache {
    state: Mutex<CacheState>,
    ttl:   Duration,
}

impl DocumentCache {
    /// Creates an empty cache with the given entry time-to-live.
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            ttl,
        }
    }

    /// Cache key for the full contents of one shard.
    pub fn shard_key(collection: &str, key: &str) -> String {
        format!("{}::shard::{}", collection, key)
    }

    /// Cache key for a by-id lookup.
    pub fn id_key(collection: &str, id: &str) -> String { format!("{}::id::{}", collection, id) }

    /// Deterministic cache key for a query result.
    ///
    /// `serde_json` maps iterate in sorted key order, so two semantically
    /// identical filters render identically regardless of construction order.
    pub fn query_key(collection: &str, filter: &Value, options: &Value) -> String {
        format!("{}::query::{}::{}", collection, filter, options)
    }

    /// Returns the cached value for a key, or `None` when absent or expired.
    ///
    /// Expired entries are treated as absent but left for `sweep` to remove.
    pub fn get(&self, key: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        let entry = state.entries.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            trace!("Cache entry expired: {}", key);
            return None;
        }
        trace!("Cache hit: {}", key);
        Some(entry.value.clone())
    }

    /// Inserts or overwrites an entry, resetting its insertion timestamp.
    pub fn put(&self, key: String, value: Value) {
        let mut state = self.state.lock().unwrap();
        state.entries.insert(key, CacheEntry {
            value,
            inserted_at: Instant::now(),
        });
    }

    /// Returns the collection's current write epoch.
    ///
    /// Readers that compute a value outside any shard lock sample this
    /// before reading storage and pass it to [`put_if_unchanged`]; a writer
    /// invalidating in between bumps the epoch and the stale value is
    /// dropped instead of cached.
    ///
    /// [`put_if_unchanged`]: DocumentCache::put_if_unchanged
    pub fn write_epoch(&self, collection: &str) -> u64 {
        let state = self.state.lock().unwrap();
        state.epochs.get(collection).copied().unwrap_or(0)
    }

    /// Inserts an entry only when the collection's write epoch still matches
    /// the sampled one. Returns whether the entry was stored.
    pub fn put_if_unchanged(&self, collection: &str, epoch: u64, key: String, value: Value) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.epochs.get(collection).copied().unwrap_or(0) != epoch {
            trace!("Stale cache entry dropped: {}", key);
            return false;
        }
        state.entries.insert(key, CacheEntry {
            value,
            inserted_at: Instant::now(),
        });
        true
    }

    /// Removes a single entry.
    pub fn invalidate(&self, key: &str) {
        self.state.lock().unwrap().entries.remove(key);
    }

    /// Removes every query-cache entry scoped to a collection and bumps the
    /// collection's write epoch.
    ///
    /// Shard and by-id entries for the collection are untouched; writers
    /// refresh those directly.
    pub fn invalidate_queries(&self, collection: &str) {
        let prefix = format!("{}::query::", collection);
        let mut state = self.state.lock().unwrap();
        state.entries.retain(|key, _| !key.starts_with(&prefix));
        *state.epochs.entry(collection.to_owned()).or_insert(0) += 1;
    }

    /// Removes all expired entries and returns the surviving entry count.
    pub fn sweep(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        let before = state.entries.len();
        let ttl = self.ttl;
        state.entries.retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
        let after = state.entries.len();
        if before != after {
            debug!("Cache sweep evicted {} entries, {} remain", before - after, after);
        }
        after
    }

    /// Current number of entries, expired or not.
    pub fn len(&self) -> usize { self.state.lock().unwrap().entries.len() }

    /// Returns true when the cache holds no entries.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Snapshot of all current keys, for the status surface.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .entries
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for DocumentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
