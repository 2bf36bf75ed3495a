use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    cache::DocumentCache,
    document::{document_id, has_id, merge_patch},
    query::{apply_filter, apply_sort, paginate, Filter, QueryOptions},
    router,
    Result,
};
use super::stor::{Store, FLAT_KEY};

impl Store {
    /// Returns the entire contents of a collection.
    ///
    /// Flat collections return their single persisted list; sharded
    /// collections concatenate every existing shard. No ordering is defined
    /// across shards.
    pub async fn read_all(&self, collection: &str) -> Result<Vec<Value>> {
        trace!("Reading all documents from {}", collection);
        if self.config.is_flat(collection) {
            return self.load_shard_cached(collection, FLAT_KEY).await;
        }

        let keys = self.files.shard_keys(collection).await?;
        let shards = join_all(
            keys.iter()
                .map(|key| self.load_shard_cached(collection, key)),
        )
        .await;

        let mut docs = Vec::new();
        for shard in shards {
            docs.extend(shard?);
        }
        Ok(docs)
    }

    /// Replaces the contents of a collection with the given snapshot.
    ///
    /// Flat collections overwrite their single file. Sharded collections
    /// partition `docs` by shard key and fully replace every shard that
    /// receives at least one document; shards not represented in `docs` are
    /// left untouched, so callers must pass a complete collection snapshot
    /// to avoid orphaned shard contents.
    pub async fn write_all(&self, collection: &str, docs: Vec<Value>) -> Result<()> {
        trace!("Writing {} documents to {}", docs.len(), collection);
        if self.config.is_flat(collection) {
            let lock = self.shard_lock(collection, FLAT_KEY);
            let _guard = lock.lock().await;
            self.files.write_flat(collection, &docs).await?;
            self.cache_shard(collection, FLAT_KEY, &docs);
        }
        else {
            let mut groups: std::collections::HashMap<String, Vec<Value>> =
                std::collections::HashMap::new();
            for doc in docs {
                groups.entry(router::shard_key(&doc)).or_default().push(doc);
            }

            let mut keys: Vec<String> = groups.keys().cloned().collect();
            keys.sort();
            for key in keys {
                let group = &groups[&key];
                let lock = self.shard_lock(collection, &key);
                let _guard = lock.lock().await;
                self.files.write_shard(collection, &key, group).await?;
                self.cache_shard(collection, &key, group);
            }
        }

        self.cache.invalidate_queries(collection);
        Ok(())
    }

    /// Finds a document by its `id` (or legacy `transactionId`) field.
    ///
    /// The by-id cache is checked first; on a miss the flat list or each
    /// shard in turn is scanned, and a hit is cached for subsequent lookups.
    /// Returns `None` (never an error) when no document matches.
    pub async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let id_key = DocumentCache::id_key(collection, id);
        if let Some(doc) = self.cache.get(&id_key) {
            debug!("find_by_id served from cache: {}/{}", collection, id);
            return Ok(Some(doc));
        }

        let epoch = self.cache.write_epoch(collection);
        let found = if self.config.is_flat(collection) {
            self.load_shard_cached(collection, FLAT_KEY)
                .await?
                .into_iter()
                .find(|doc| has_id(doc, id))
        }
        else {
            let mut found = None;
            for key in self.files.shard_keys(collection).await? {
                let docs = self.load_shard_cached(collection, &key).await?;
                if let Some(doc) = docs.into_iter().find(|doc| has_id(doc, id)) {
                    found = Some(doc);
                    break;
                }
            }
            found
        };

        if let Some(doc) = &found {
            // skipped if a write to the collection raced the scan; the
            // writer's own id-cache entry wins
            self.cache
                .put_if_unchanged(collection, epoch, id_key, doc.clone());
        }
        Ok(found)
    }

    /// Inserts a document into a collection.
    ///
    /// Sharded collections stamp a `timestamp` (now) into timestamp-less
    /// documents so the derived shard key stays stable across later reads,
    /// then append to the shard computed from the document's current fields.
    /// Query-cache entries for the collection are invalidated; by-id entries
    /// for unrelated documents are not. Returns the document as stored.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ledgerstore::{Store, StoreConfig};
    /// use serde_json::json;
    ///
    /// # async fn example() -> ledgerstore::Result<()> {
    /// let store = Store::new(StoreConfig::new("/var/lib/ledgerstore")).await?;
    /// let stored = store
    ///     .insert_document(
    ///         "transactions",
    ///         json!({"id": "t1", "merchantId": "M1", "amount": 42}),
    ///     )
    ///     .await?;
    /// assert!(stored.get("timestamp").is_some());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn insert_document(&self, collection: &str, mut doc: Value) -> Result<Value> {
        trace!("Inserting document into {}", collection);
        if self.config.is_flat(collection) {
            let lock = self.shard_lock(collection, FLAT_KEY);
            let _guard = lock.lock().await;
            let mut docs = self.files.read_flat(collection).await?;
            docs.push(doc.clone());
            self.files.write_flat(collection, &docs).await?;
            self.cache_shard(collection, FLAT_KEY, &docs);
        }
        else {
            if let Value::Object(map) = &mut doc {
                if !map.contains_key("timestamp") {
                    map.insert(
                        "timestamp".to_owned(),
                        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
                    );
                }
            }
            let key = router::shard_key(&doc);
            let lock = self.shard_lock(collection, &key);
            let _guard = lock.lock().await;
            let mut docs = self.files.read_shard(collection, &key).await?;
            docs.push(doc.clone());
            self.files.write_shard(collection, &key, &docs).await?;
            self.cache_shard(collection, &key, &docs);
            debug!("Document inserted into shard {}/{}", collection, key);
        }

        if let Some(id) = document_id(&doc) {
            self.cache
                .put(DocumentCache::id_key(collection, id), doc.clone());
        }
        self.cache.invalidate_queries(collection);
        Ok(doc)
    }

    /// Updates a document by shallow-merging a patch into it.
    ///
    /// For sharded collections the shard key is recomputed from the merged
    /// document; when it changes, the document migrates: the new shard is
    /// written first and the old shard second, so a crash between the two
    /// writes duplicates the document briefly instead of losing it. Both
    /// shard locks are held for the migration, acquired in lexicographic
    /// key order.
    ///
    /// Returns the merged document, or `None` when no document has that id.
    pub async fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<Option<Value>> {
        trace!("Updating document {}/{}", collection, id);
        if self.config.is_flat(collection) {
            return self.update_flat(collection, id, patch).await;
        }

        loop {
            // Locate the owning shard and pick lock targets before locking;
            // the read is repeated under the locks to close the race.
            let Some((old_key, existing)) = self.locate(collection, id).await? else {
                return Ok(None);
            };
            let new_key = router::shard_key(&merge_patch(&existing, patch.clone()));

            let (first, second) = self.shard_lock_pair(collection, &old_key, &new_key);
            let _guard_a = first.lock().await;
            let _guard_b = match &second {
                Some(lock) => Some(lock.lock().await),
                None => None,
            };

            let mut old_docs = self.files.read_shard(collection, &old_key).await?;
            let Some(pos) = old_docs.iter().position(|doc| has_id(doc, id)) else {
                // moved or deleted while we were acquiring locks
                continue;
            };
            let merged = merge_patch(&old_docs[pos], patch.clone());
            if router::shard_key(&merged) != new_key {
                continue;
            }

            if new_key == old_key {
                old_docs[pos] = merged.clone();
                self.files.write_shard(collection, &old_key, &old_docs).await?;
                self.cache_shard(collection, &old_key, &old_docs);
            }
            else {
                debug!(
                    "Document {}/{} migrating from shard {} to {}",
                    collection, id, old_key, new_key
                );
                let mut new_docs = self.files.read_shard(collection, &new_key).await?;
                new_docs.push(merged.clone());
                // new shard first: a failure here duplicates, never loses
                self.files.write_shard(collection, &new_key, &new_docs).await?;
                old_docs.remove(pos);
                self.files.write_shard(collection, &old_key, &old_docs).await?;
                self.cache_shard(collection, &new_key, &new_docs);
                self.cache_shard(collection, &old_key, &old_docs);
            }

            self.cache
                .put(DocumentCache::id_key(collection, id), merged.clone());
            self.cache.invalidate_queries(collection);
            return Ok(Some(merged));
        }
    }

    async fn update_flat(&self, collection: &str, id: &str, patch: Value) -> Result<Option<Value>> {
        let lock = self.shard_lock(collection, FLAT_KEY);
        let _guard = lock.lock().await;

        let mut docs = self.files.read_flat(collection).await?;
        let Some(pos) = docs.iter().position(|doc| has_id(doc, id)) else {
            return Ok(None);
        };
        let merged = merge_patch(&docs[pos], patch);
        docs[pos] = merged.clone();
        self.files.write_flat(collection, &docs).await?;
        self.cache_shard(collection, FLAT_KEY, &docs);

        self.cache
            .put(DocumentCache::id_key(collection, id), merged.clone());
        self.cache.invalidate_queries(collection);
        Ok(Some(merged))
    }

    /// Deletes a document by id.
    ///
    /// Returns `true` when a document was removed and persisted, `false`
    /// when no document matched (idempotent; the miss performs no write).
    pub async fn delete_document(&self, collection: &str, id: &str) -> Result<bool> {
        trace!("Deleting document {}/{}", collection, id);
        if self.config.is_flat(collection) {
            let lock = self.shard_lock(collection, FLAT_KEY);
            let _guard = lock.lock().await;
            let mut docs = self.files.read_flat(collection).await?;
            let Some(pos) = docs.iter().position(|doc| has_id(doc, id)) else {
                return Ok(false);
            };
            docs.remove(pos);
            self.files.write_flat(collection, &docs).await?;
            self.cache_shard(collection, FLAT_KEY, &docs);
            self.finish_delete(collection, id);
            return Ok(true);
        }

        for key in self.files.shard_keys(collection).await? {
            let lock = self.shard_lock(collection, &key);
            let _guard = lock.lock().await;
            let mut docs = self.files.read_shard(collection, &key).await?;
            let Some(pos) = docs.iter().position(|doc| has_id(doc, id)) else {
                continue;
            };
            docs.remove(pos);
            self.files.write_shard(collection, &key, &docs).await?;
            self.cache_shard(collection, &key, &docs);
            self.finish_delete(collection, id);
            debug!("Document {}/{} removed from shard {}", collection, id, key);
            return Ok(true);
        }
        Ok(false)
    }

    fn finish_delete(&self, collection: &str, id: &str) {
        self.cache.invalidate(&DocumentCache::id_key(collection, id));
        self.cache.invalidate_queries(collection);
    }

    /// Runs a filter/sort/paginate query over a collection.
    ///
    /// The full result set is cached under a deterministic key derived from
    /// the collection, filter and options; any write to the collection
    /// invalidates it. The result spans multiple shards and is computed
    /// without a lock, so it is cached only when no write invalidated the
    /// collection while it was being computed.
    pub async fn find_documents(
        &self,
        collection: &str,
        filter: &Filter,
        options: &QueryOptions,
    ) -> Result<Vec<Value>> {
        let filter_value = Value::Object(filter.clone());
        let options_value = serde_json::to_value(options)?;
        let cache_key = DocumentCache::query_key(collection, &filter_value, &options_value);
        if let Some(Value::Array(docs)) = self.cache.get(&cache_key) {
            debug!("find_documents served from cache: {}", collection);
            return Ok(docs);
        }

        let epoch = self.cache.write_epoch(collection);
        let docs = self.read_all(collection).await?;
        let mut docs = apply_filter(docs, filter);
        apply_sort(&mut docs, &options.sort);
        let docs = paginate(docs, options.skip, options.limit);

        self.cache
            .put_if_unchanged(collection, epoch, cache_key, Value::Array(docs.clone()));
        Ok(docs)
    }

    /// Counts the documents matching a filter.
    ///
    /// Counts are cheap and staleness-sensitive, so they are never cached.
    pub async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let docs = self.read_all(collection).await?;
        Ok(apply_filter(docs, filter).len())
    }

    /// Finds the shard currently holding a document, scanning persisted
    /// shards directly (write paths must not trust possibly stale cache).
    async fn locate(&self, collection: &str, id: &str) -> Result<Option<(String, Value)>> {
        for key in self.files.shard_keys(collection).await? {
            let docs = self.files.read_shard(collection, &key).await?;
            if let Some(doc) = docs.into_iter().find(|doc| has_id(doc, id)) {
                return Ok(Some((key, doc)));
            }
        }
        Ok(None)
    }

    /// Reads one shard (or a flat collection's list) through the cache.
    ///
    /// The miss path holds the shard lock around the read and the cache
    /// fill, so it cannot interleave with a writer and put back the shard's
    /// pre-write contents.
    async fn load_shard_cached(&self, collection: &str, key: &str) -> Result<Vec<Value>> {
        let cache_key = DocumentCache::shard_key(collection, key);
        if let Some(Value::Array(docs)) = self.cache.get(&cache_key) {
            return Ok(docs);
        }

        let lock = self.shard_lock(collection, key);
        let _guard = lock.lock().await;
        // a writer may have filled the entry while we waited for the lock
        if let Some(Value::Array(docs)) = self.cache.get(&cache_key) {
            return Ok(docs);
        }

        let docs = if self.config.is_flat(collection) && key == FLAT_KEY {
            self.files.read_flat(collection).await?
        }
        else {
            self.files.read_shard(collection, key).await?
        };
        self.cache.put(cache_key, Value::Array(docs.clone()));
        Ok(docs)
    }

    /// Write-through of fresh shard contents into the cache.
    fn cache_shard(&self, collection: &str, key: &str, docs: &[Value]) {
        self.cache.put(
            DocumentCache::shard_key(collection, key),
            Value::Array(docs.to_vec()),
        );
    }
}
