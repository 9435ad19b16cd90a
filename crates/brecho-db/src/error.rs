//! Storage errors.
//!
//! Callers map these into their own taxonomy; `is_storage_failure` separates
//! disk trouble from contract violations such as a wrong vector length.

use std::path::PathBuf;
use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

/// Everything the vector index can fail with.
#[derive(Debug, Error)]
pub enum DbError {
    // ========================================================================
    // Storage errors
    // ========================================================================
    /// Reading or writing index files failed.
    #[error("Index storage failed at {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    /// An index file exists but its contents do not decode.
    #[error("Index file {path} is unreadable: {message}")]
    VectorParse { path: PathBuf, message: String },

    #[cfg(feature = "lancedb")]
    #[error("LanceDB: {message}")]
    LanceDb { message: String },

    // ========================================================================
    // Contract errors
    // ========================================================================
    /// A vector of the wrong length was passed in.
    #[error("Vector has {actual} dimensions, index holds {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No index at {path}")]
    IndexNotFound { path: PathBuf },

    /// The manifest on disk disagrees with the requested configuration.
    #[error("Index '{collection}' cannot be opened: {reason}")]
    IndexIncompatible { collection: String, reason: String },

    // ========================================================================
    // General errors
    // ========================================================================
    /// Unknown or uncompiled backend.
    #[error("Index configuration: {message}")]
    Config { message: String },

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A poisoned lock or a failed runtime.
    #[error("Index internal failure: {message}")]
    Internal { message: String },
}

impl DbError {
    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn vector_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::VectorParse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn index_incompatible(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IndexIncompatible {
            collection: collection.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error comes from the storage medium rather than the caller.
    pub fn is_storage_failure(&self) -> bool {
        match self {
            Self::Persistence { .. } | Self::VectorParse { .. } | Self::Io(_) | Self::Json(_) => {
                true
            }
            #[cfg(feature = "lancedb")]
            Self::LanceDb { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_failure_classification() {
        assert!(DbError::persistence("/tmp/x", "disk full").is_storage_failure());
        assert!(DbError::from(std::io::Error::other("boom")).is_storage_failure());
        assert!(!DbError::DimensionMismatch {
            expected: 4,
            actual: 3
        }
        .is_storage_failure());
    }
}
