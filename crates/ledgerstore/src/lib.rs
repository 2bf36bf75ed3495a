pub mod cache;
pub mod comparison;
pub mod config;
pub mod document;
pub mod error;
pub mod query;
pub mod router;
pub mod shard;
pub mod store;

pub use config::StoreConfig;
pub use error::{LedgerError, Result};
pub use query::{Filter, QueryOptions};
pub use store::{Store, StoreStatus};
