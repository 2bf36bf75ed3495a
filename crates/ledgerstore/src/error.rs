use thiserror::Error;

/// Crate-wide error type for the ledgerstore document store.
///
/// Read paths normalize "resource does not exist" into empty results and
/// only surface this type for genuine storage failures; write paths always
/// surface it.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// I/O operations failed (shard file reads/writes, directory creation)
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Persisted shard or flat file contained unusable content
    #[error("Corrupted storage at '{path}': {reason}")]
    Corrupted {
        path:   String,
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },
}

/// Result type alias for ledgerstore operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
