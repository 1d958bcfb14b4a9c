use std::path::PathBuf;

use thiserror::Error;

/// Failure at the storage boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to (de)serialize record `{key}`: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored record at `{path}` is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// The normalizer was driven out of order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("{stack} stack is empty")]
    EmptyStack { stack: &'static str },
    #[error("list of {expected} elements resolved with only {available} values")]
    ShortList { expected: usize, available: usize },
}

/// Failure walking a response or reading one back from the store.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("expected {expected} at `{path}`")]
    UnexpectedShape { path: String, expected: &'static str },
    #[error("missing field `{path}` in response")]
    MissingField { path: String },
    #[error("cache miss: {key}")]
    CacheMiss { key: String },
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReadError {
    pub fn shape(path: &[String], expected: &'static str) -> Self {
        Self::UnexpectedShape {
            path: path.join("."),
            expected,
        }
    }

    pub fn missing(path: &[String]) -> Self {
        Self::MissingField {
            path: path.join("."),
        }
    }

    pub fn miss(key: impl Into<String>) -> Self {
        Self::CacheMiss { key: key.into() }
    }
}

/// Error surfaced to callers of the cache facade and its transactions.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("transaction used after close")]
    TransactionClosed,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}
