//! Embedded, document-oriented object store with pluggable persistence
//! (single-file, per-collection folder, per-partition shard), an
//! append-only log, an LRU-bounded resident cache, a serializing
//! transaction controller, and a small Mongo-flavored query language.

pub mod aof;
pub mod cache;
pub mod codec;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod model;
pub mod ops;
pub mod paths;
pub mod query;
pub mod transaction;

pub use config::{PersistenceMode, StoreConfig, StoreConfigBuilder};
pub use database::Database;
pub use document::Document;
pub use error::{Error, Result};
pub use logging::{get_log_level, set_log_level, LogLevel};
pub use ops::{IndexSpec, IndexUpdateSpec};
pub use query::{FindOptions, PopulateRule};
pub use transaction::Tx;
