//! Pure shard-key derivation and file naming.
//!
//! Routing never performs I/O and never fails: missing `merchantId` or
//! `timestamp` fields use their documented defaults, so any JSON shape maps
//! to a shard.

use chrono::Datelike as _;
use serde_json::Value;

use crate::document::{document_timestamp, merchant_id};

/// Derives the shard key for a document: `{merchantId}-{year}-{month:02}`.
///
/// Two documents with the same merchant and calendar month always share a
/// shard, regardless of day or time of day.
pub fn shard_key(doc: &Value) -> String {
    let merchant = merchant_id(doc);
    let ts = document_timestamp(doc);
    format!("{}-{}-{:02}", merchant, ts.year(), ts.month())
}

/// File name for a shard of a sharded collection.
pub fn shard_file_name(collection: &str, key: &str) -> String {
    format!("{}-{}.json", collection, key)
}

/// File name for the single persisted list of a flat collection.
pub fn flat_file_name(collection: &str) -> String { format!("{}.json", collection) }
