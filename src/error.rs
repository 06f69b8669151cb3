use thiserror::Error;

use crate::store::Collection;

/// Failures of the storage gateway. Fatal for the operation in progress and
/// never retried; each variant names the operation and the collection.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{operation} on `{collection}` failed: {source}")]
    Io {
        operation: &'static str,
        collection: Collection,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} on `{collection}` found malformed data: {source}")]
    Serde {
        operation: &'static str,
        collection: Collection,
        #[source]
        source: serde_json::Error,
    },

    #[error("{operation} on `{collection}` rejected: {reason}")]
    Rejected {
        operation: &'static str,
        collection: Collection,
        reason: String,
    },

    #[error("{operation} on `{collection}` failed: store lock poisoned")]
    Poisoned {
        operation: &'static str,
        collection: Collection,
    },
}

/// File-level import failures. Nothing has been written when one of these is
/// returned, except for [`ImportError::Store`] raised by the write itself.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("could not read import source: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed delimited source: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed JSON source: {0}")]
    Json(#[from] serde_json::Error),

    #[error("import source is empty or has no header row")]
    Empty,

    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
