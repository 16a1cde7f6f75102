//! Crate-wide error type.
//!
//! Every fallible public operation returns [`Result<T>`]. There is a single
//! flat enum rather than one error type per module, matching the teacher's
//! convention of one error enum shared by the whole storage engine.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All ways a store operation can fail.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("index not found: {collection}::{index}")]
    IndexNotFound { collection: String, index: String },

    #[error("document not found: {collection}#{id}")]
    DocumentNotFound { collection: String, id: u64 },

    #[error("database not loaded")]
    DatabaseNotLoaded,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Error::CollectionNotFound(name.into())
    }

    pub fn index_not_found(collection: impl Into<String>, index: impl Into<String>) -> Self {
        Error::IndexNotFound {
            collection: collection.into(),
            index: index.into(),
        }
    }

    pub fn document_not_found(collection: impl Into<String>, id: u64) -> Self {
        Error::DocumentNotFound {
            collection: collection.into(),
            id,
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}
