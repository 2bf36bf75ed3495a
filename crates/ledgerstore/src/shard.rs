//! Durable shard and flat-file I/O.
//!
//! Every shard is persisted as one JSON array and read or replaced as an
//! atomic unit. Writes land in a `.tmp` sibling first and are renamed into
//! place, so a crash mid-write leaves the previous contents intact.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs as tokio_fs;
use tracing::{debug, error, trace};

use crate::{
    router::{flat_file_name, shard_file_name},
    LedgerError,
    Result,
};

/// Subdirectory of the data directory holding shard files.
pub const SHARDS_DIR: &str = "shards";

/// Filesystem backend for shard and flat-collection files.
///
/// Flat collections live at `{data_dir}/{collection}.json`; shards at
/// `{data_dir}/shards/{collection}-{key}.json`.
#[derive(Debug, Clone)]
pub struct ShardFiles {
    data_dir: PathBuf,
}

impl ShardFiles {
    /// Creates the backend and its directory layout.
    pub async fn new<P: Into<PathBuf>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio_fs::create_dir_all(data_dir.join(SHARDS_DIR))
            .await
            .map_err(|e| {
                error!("Failed to create data directory {:?}: {}", data_dir, e);
                e
            })?;
        debug!("Shard storage ready at {:?}", data_dir);
        Ok(Self {
            data_dir,
        })
    }

    fn shard_path(&self, collection: &str, key: &str) -> PathBuf {
        self.data_dir
            .join(SHARDS_DIR)
            .join(shard_file_name(collection, key))
    }

    fn flat_path(&self, collection: &str) -> PathBuf { self.data_dir.join(flat_file_name(collection)) }

    /// Reads the full contents of one shard.
    ///
    /// An absent shard is created empty and persisted before returning, so
    /// callers never need a separate existence check.
    pub async fn read_shard(&self, collection: &str, key: &str) -> Result<Vec<Value>> {
        let path = self.shard_path(collection, key);
        match read_documents(&path).await? {
            Some(docs) => Ok(docs),
            None => {
                debug!("Shard {}/{} absent, creating empty", collection, key);
                write_documents(&path, &[]).await?;
                Ok(Vec::new())
            },
        }
    }

    /// Overwrites the full contents of one shard.
    pub async fn write_shard(&self, collection: &str, key: &str, docs: &[Value]) -> Result<()> {
        trace!(
            "Writing shard {}/{} ({} documents)",
            collection,
            key,
            docs.len()
        );
        write_documents(&self.shard_path(collection, key), docs).await
    }

    /// Reads the single persisted list of a flat collection.
    ///
    /// Absent files read as an empty list; unlike shards, nothing is
    /// persisted until the first write.
    pub async fn read_flat(&self, collection: &str) -> Result<Vec<Value>> {
        Ok(read_documents(&self.flat_path(collection))
            .await?
            .unwrap_or_default())
    }

    /// Overwrites the single persisted list of a flat collection.
    pub async fn write_flat(&self, collection: &str, docs: &[Value]) -> Result<()> {
        trace!(
            "Writing flat collection {} ({} documents)",
            collection,
            docs.len()
        );
        write_documents(&self.flat_path(collection), docs).await
    }

    /// Enumerates the shard keys that currently exist for a collection.
    pub async fn shard_keys(&self, collection: &str) -> Result<Vec<String>> {
        let shards_dir = self.data_dir.join(SHARDS_DIR);
        let mut entries = match tokio_fs::read_dir(&shards_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                error!("Failed to list shards directory {:?}: {}", shards_dir, e);
                return Err(LedgerError::Io {
                    source: e,
                });
            },
        };

        let prefix = format!("{}-", collection);
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(rest) = name.strip_prefix(&prefix) {
                if let Some(key) = rest.strip_suffix(".json") {
                    keys.push(key.to_owned());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Reads a persisted JSON array, distinguishing "absent" from "unreadable".
async fn read_documents(path: &Path) -> Result<Option<Vec<Value>>> {
    match tokio_fs::read_to_string(path).await {
        Ok(content) => {
            let docs: Vec<Value> = serde_json::from_str(&content).map_err(|e| {
                error!("Unparseable shard file {:?}: {}", path, e);
                LedgerError::Corrupted {
                    path:   path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;
            Ok(Some(docs))
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => {
            error!("IO error reading {:?}: {}", path, e);
            Err(LedgerError::Io {
                source: e,
            })
        },
    }
}

/// Serializes and durably replaces a persisted JSON array.
///
/// The write goes to a `.tmp` sibling and is renamed over the target, so the
/// overwrite is all-or-nothing from the reader's perspective.
async fn write_documents(path: &Path, docs: &[Value]) -> Result<()> {
    let json = serde_json::to_string_pretty(docs)?;
    let tmp_path = path.with_extension("json.tmp");

    tokio_fs::write(&tmp_path, &json).await.map_err(|e| {
        error!("Failed to write temp file {:?}: {}", tmp_path, e);
        e
    })?;
    tokio_fs::rename(&tmp_path, path).await.map_err(|e| {
        error!("Failed to rename {:?} into place: {}", tmp_path, e);
        e
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_read_absent_shard_creates_empty_file() {
        let dir = tempdir().unwrap();
        let files = ShardFiles::new(dir.path()).await.unwrap();

        let docs = files.read_shard("transactions", "M1-2024-03").await.unwrap();
        assert!(docs.is_empty());

        // The empty shard was persisted, not just returned
        let path = dir
            .path()
            .join(SHARDS_DIR)
            .join("transactions-M1-2024-03.json");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_write_read_round_trip_preserves_order() {
        let dir = tempdir().unwrap();
        let files = ShardFiles::new(dir.path()).await.unwrap();

        let docs = vec![
            json!({"id": "b", "amount": 2}),
            json!({"id": "a", "amount": 1}),
            json!({"id": "c", "amount": 3}),
        ];
        files
            .write_shard("transactions", "M1-2024-03", &docs)
            .await
            .unwrap();

        let read_back = files.read_shard("transactions", "M1-2024-03").await.unwrap();
        assert_eq!(read_back, docs);
    }

    #[tokio::test]
    async fn test_corrupt_shard_surfaces_error() {
        let dir = tempdir().unwrap();
        let files = ShardFiles::new(dir.path()).await.unwrap();

        let path = dir.path().join(SHARDS_DIR).join("transactions-M1-2024-03.json");
        tokio_fs::write(&path, "{not json").await.unwrap();

        let err = files
            .read_shard("transactions", "M1-2024-03")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Corrupted { .. }));
    }

    #[tokio::test]
    async fn test_flat_read_absent_is_empty_without_creating() {
        let dir = tempdir().unwrap();
        let files = ShardFiles::new(dir.path()).await.unwrap();

        let docs = files.read_flat("audit_logs").await.unwrap();
        assert!(docs.is_empty());
        assert!(!dir.path().join("audit_logs.json").exists());
    }

    #[tokio::test]
    async fn test_flat_write_and_read() {
        let dir = tempdir().unwrap();
        let files = ShardFiles::new(dir.path()).await.unwrap();

        let docs = vec![json!({"event": "login"}), json!({"event": "logout"})];
        files.write_flat("audit_logs", &docs).await.unwrap();
        assert_eq!(files.read_flat("audit_logs").await.unwrap(), docs);
    }

    #[tokio::test]
    async fn test_shard_keys_lists_only_matching_collection() {
        let dir = tempdir().unwrap();
        let files = ShardFiles::new(dir.path()).await.unwrap();

        files.write_shard("transactions", "M1-2024-03", &[]).await.unwrap();
        files.write_shard("transactions", "M2-2024-04", &[]).await.unwrap();
        files.write_shard("refunds", "M1-2024-03", &[]).await.unwrap();

        let keys = files.shard_keys("transactions").await.unwrap();
        assert_eq!(keys, vec!["M1-2024-03", "M2-2024-04"]);
    }

    #[tokio::test]
    async fn test_shard_keys_without_shards_dir() {
        let dir = tempdir().unwrap();
        let files = ShardFiles::new(dir.path()).await.unwrap();
        tokio_fs::remove_dir_all(dir.path().join(SHARDS_DIR))
            .await
            .unwrap();

        let keys = files.shard_keys("transactions").await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let files = ShardFiles::new(dir.path()).await.unwrap();

        files
            .write_shard("transactions", "M1-2024-03", &[json!({"id": "t1"})])
            .await
            .unwrap();

        let mut entries = tokio_fs::read_dir(dir.path().join(SHARDS_DIR)).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name();
            assert!(!name.to_string_lossy().ends_with(".tmp"));
        }
    }
}
