//! Adapter layer for brecho-db infrastructure.
//!
//! Bridges the storage crate with brecho-core's domain types:
//!
//! - Error conversion from `DbError` to `BrechoError`
//! - Opening the configured index for a given model dimension
//!
//! ```text
//! brecho-core domain code (service, pipeline)
//!        ↓
//!   db_adapter (this module)
//!        ↓
//!     brecho-db implementations (JSONL snapshot, LanceDB)
//! ```

use std::sync::Arc;

use brecho_db::vector::{open_vector_index, VectorIndexBackend, VectorIndexConfig};

use crate::config::IndexConfig;
use crate::errors::BrechoError;

// ============================================================================
// Error Conversion
// ============================================================================

/// Convert a brecho-db error to a brecho-core error.
pub fn from_db_error(err: brecho_db::DbError) -> BrechoError {
    use brecho_db::DbError;

    match err {
        DbError::Io(io_err) => BrechoError::Io(io_err),

        DbError::Persistence { path, message } => BrechoError::Persistence { path, message },

        DbError::VectorParse { path, message } => BrechoError::Persistence {
            path,
            message: format!("unreadable index data: {}", message),
        },

        DbError::DimensionMismatch { expected, actual } => {
            BrechoError::DimensionMismatch { expected, actual }
        }

        DbError::IndexNotFound { path } => BrechoError::Persistence {
            message: format!("Index not found at {}", path.display()),
            path,
        },

        DbError::IndexIncompatible { collection, reason } => BrechoError::IndexIncompatible {
            reason: format!("{}: {}", collection, reason),
        },

        DbError::Config { message } => BrechoError::IndexBackendUnavailable { reason: message },

        DbError::Json(json_err) => BrechoError::Json(json_err),

        // Internal plus backend-specific storage failures.
        other => BrechoError::Persistence {
            path: std::path::PathBuf::new(),
            message: other.to_string(),
        },
    }
}

/// Extension trait to convert infrastructure results to `Result<T, BrechoError>`.
pub trait IntoBrechoResult<T> {
    /// Convert to a BrechoError result.
    fn into_brecho_result(self) -> Result<T, BrechoError>;
}

impl<T> IntoBrechoResult<T> for brecho_db::DbResult<T> {
    fn into_brecho_result(self) -> Result<T, BrechoError> {
        self.map_err(from_db_error)
    }
}

// ============================================================================
// Index construction
// ============================================================================

/// Open (or create) the configured vector index for `model_id` vectors of
/// `dimension`.
///
/// # Errors
///
/// Fails when the index on disk was built by another model, for another
/// dimension or backend, or when the directory cannot be created.
pub fn open_index(
    config: &IndexConfig,
    dimension: usize,
    model_id: &str,
) -> Result<Arc<dyn VectorIndexBackend>, BrechoError> {
    let path = config.effective_path();
    tracing::debug!(
        "Opening {} vector index at {} (dim={})",
        config.backend,
        path.display(),
        dimension
    );

    let db_config = VectorIndexConfig::new(dimension, path)
        .with_backend(config.backend.clone())
        .with_model(model_id);
    open_vector_index(&db_config).into_brecho_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_error_mapping() {
        let err = from_db_error(brecho_db::DbError::persistence("/x", "disk full"));
        assert!(matches!(err, BrechoError::Persistence { .. }));

        let err = from_db_error(brecho_db::DbError::DimensionMismatch {
            expected: 512,
            actual: 64,
        });
        assert!(err.is_client_error());

        let err = from_db_error(brecho_db::DbError::internal("lock poisoned"));
        assert_eq!(err.code(), "persistence_failed");
    }

    #[test]
    fn test_open_index_refuses_other_dimension_or_model() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig {
            path: Some(dir.path().join("vectordb")),
            ..IndexConfig::default()
        };

        let index = open_index(&config, 64, "brecho/color-histogram").unwrap();
        assert_eq!(index.dimension(), 64);
        drop(index);

        let err = open_index(&config, 512, "brecho/color-histogram")
            .err()
            .expect("a 512-dim model must not open a 64-dim index");
        assert!(matches!(err, BrechoError::IndexIncompatible { .. }));

        let err = open_index(&config, 64, "someone/else")
            .err()
            .expect("another model must not open this index");
        assert!(err.to_string().contains("someone/else"));
        assert_eq!(config.effective_path(), dir.path().join("vectordb"));
    }
}
