//! Accessor helpers for schemaless JSON documents.
//!
//! Documents are open `serde_json::Value` maps; these helpers centralize the
//! handful of fields the store itself interprets (`id`, the legacy
//! `transactionId` alias, `merchantId` and `timestamp`).

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

/// Merchant identifier used when a document carries none.
pub const DEFAULT_MERCHANT: &str = "default";

/// Returns the identifier of a document.
///
/// Transaction-like records historically carried their identifier under
/// `transactionId`; that alias is still honored when `id` is absent.
pub fn document_id(doc: &Value) -> Option<&str> {
    doc.get("id")
        .and_then(Value::as_str)
        .or_else(|| doc.get("transactionId").and_then(Value::as_str))
}

/// Returns true when the document's identifier equals `id`.
pub fn has_id(doc: &Value, id: &str) -> bool { document_id(doc) == Some(id) }

/// Returns the merchant identifier of a document, defaulting to
/// [`DEFAULT_MERCHANT`] when the field is absent or not a string.
pub fn merchant_id(doc: &Value) -> &str {
    doc.get("merchantId")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_MERCHANT)
}

/// Returns the timestamp of a document, defaulting to now.
///
/// Accepts RFC 3339 strings, plain `YYYY-MM-DD` dates, and integer
/// millisecond epochs. Anything unparseable falls back to the current time,
/// so shard-key derivation stays total over arbitrary document shapes.
pub fn document_timestamp(doc: &Value) -> DateTime<Utc> {
    match doc.get("timestamp") {
        Some(Value::String(s)) => parse_timestamp(s).unwrap_or_else(Utc::now),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now),
        _ => Utc::now(),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Merges a patch into an existing document with shallow field overwrite.
///
/// Fields present in `patch` replace the corresponding top-level fields of
/// `existing`; nested objects are replaced wholesale, not recursed into.
/// A non-object patch replaces the document entirely.
pub fn merge_patch(existing: &Value, patch: Value) -> Value {
    match (existing, &patch) {
        (Value::Object(existing_map), Value::Object(patch_map)) => {
            let mut merged = existing_map.clone();
            for (key, value) in patch_map {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        },
        _ => patch,
    }
}
