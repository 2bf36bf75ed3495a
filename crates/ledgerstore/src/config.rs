use std::{collections::HashSet, path::PathBuf, time::Duration};

/// Default time-to-live for cache entries (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(300_000);

/// Default interval between background cache sweeps (60 seconds).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(60_000);

/// Configuration for a [`Store`](crate::Store) instance.
///
/// All state is carried explicitly by the store that was constructed from
/// this config; there are no module-level singletons, so tests can run
/// multiple isolated stores side by side.
///
/// # Example
///
/// ```rust
/// use ledgerstore::StoreConfig;
///
/// let config = StoreConfig::new("/var/lib/ledgerstore");
/// assert!(config.is_flat("audit_logs"));
/// assert!(!config.is_flat("transactions"));
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base directory for all persisted files. Flat collections live at the
    /// top level, shard files under a `shards/` subdirectory.
    pub data_dir:             PathBuf,
    /// Maximum age after which a cache entry is considered expired.
    pub cache_ttl:            Duration,
    /// Period of the background sweep that evicts expired cache entries.
    pub cache_sweep_interval: Duration,
    /// Collection names stored as a single persisted list instead of shards.
    pub flat_collections:     HashSet<String>,
}

impl StoreConfig {
    /// Creates a config with defaults for everything except the data directory.
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir:             data_dir.into(),
            cache_ttl:            DEFAULT_CACHE_TTL,
            cache_sweep_interval: DEFAULT_SWEEP_INTERVAL,
            flat_collections:     ["encryption_keys", "audit_logs"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }

    /// Sets the cache entry time-to-live.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the background sweep interval.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.cache_sweep_interval = interval;
        self
    }

    /// Replaces the set of flat (non-sharded) collection names.
    #[must_use]
    pub fn with_flat_collections<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flat_collections = names.into_iter().map(Into::into).collect();
        self
    }

    /// Returns whether a collection is stored as a single flat list.
    pub fn is_flat(&self, collection: &str) -> bool { self.flat_collections.contains(collection) }
}
