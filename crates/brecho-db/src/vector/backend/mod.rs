//! Vector index backend implementations.
//!
//! - `simple` (default): JSONL snapshot with exact cosine scan
//! - `lancedb`: LanceDB table with ANN search

#[cfg(feature = "lancedb")]
mod lancedb;

#[cfg(feature = "simple")]
mod simple;

#[cfg(feature = "lancedb")]
pub use self::lancedb::LanceDbVectorIndex;

#[cfg(feature = "simple")]
pub use simple::SimpleFileVectorIndex;

use super::config::{
    check_index_compatibility, IndexManifest, VectorIndexCompatibility, VectorIndexConfig,
    COLLECTION_NAME,
};
use super::traits::VectorIndexBackend;
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Open the index described by `config`, creating it when allowed.
///
/// The manifest is checked before any backend touches the directory.
///
/// # Errors
///
/// Unknown or uncompiled backend, a manifest that disagrees with `config`,
/// a missing index with `create_if_missing` off, or I/O failure.
pub fn open_vector_index(config: &VectorIndexConfig) -> DbResult<Arc<dyn VectorIndexBackend>> {
    debug!("Opening vector index at {:?}", config.path);

    if !available_backends().contains(&config.backend.as_str()) {
        return Err(DbError::Config {
            message: format!(
                "Backend '{}' is not available. Available backends: {}",
                config.backend,
                available_backends().join(", ")
            ),
        });
    }

    match check_index_compatibility(config) {
        VectorIndexCompatibility::Compatible(manifest) => {
            debug!(
                "Manifest ok: {} entries, last written {}",
                manifest.entries, manifest.updated_at
            );
        }
        VectorIndexCompatibility::NotFound if config.create_if_missing => {
            info!("Creating {} index at {:?}", config.backend, config.path);
            IndexManifest::for_config(config).write(&config.path)?;
        }
        VectorIndexCompatibility::NotFound => {
            return Err(DbError::IndexNotFound {
                path: config.path.clone(),
            });
        }
        VectorIndexCompatibility::Incompatible(reason) => {
            return Err(DbError::index_incompatible(COLLECTION_NAME, reason));
        }
        VectorIndexCompatibility::Corrupted(reason) => {
            return Err(DbError::index_incompatible(
                COLLECTION_NAME,
                format!("unreadable index: {}", reason),
            ));
        }
    }

    match config.backend.as_str() {
        #[cfg(feature = "lancedb")]
        "lancedb" => {
            let index = LanceDbVectorIndex::open(config)?;
            Ok(Arc::new(index))
        }

        #[cfg(feature = "simple")]
        "simple" => {
            let index = SimpleFileVectorIndex::open(config)?;
            Ok(Arc::new(index))
        }

        backend => Err(DbError::Config {
            message: format!("Unknown backend: '{}'", backend),
        }),
    }
}

/// Get a list of available backend names.
#[allow(clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<&'static str> {
    let mut backends = Vec::new();

    #[cfg(feature = "lancedb")]
    backends.push("lancedb");

    #[cfg(feature = "simple")]
    backends.push("simple");

    backends
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_available_backends() {
        assert!(available_backends().contains(&"simple"));
    }

    #[test]
    fn test_open_creates_meta() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vectordb");
        let index = open_vector_index(&VectorIndexConfig::new(8, &path)).unwrap();

        assert_eq!(index.dimension(), 8);
        assert_eq!(index.backend_name(), "simple");
        assert!(index.is_empty().unwrap());
        assert!(path.join(super::super::config::INDEX_META_FILENAME).exists());
    }

    #[test]
    fn test_open_missing_without_create() {
        let dir = TempDir::new().unwrap();
        let config =
            VectorIndexConfig::new(8, dir.path().join("nope")).with_create_if_missing(false);
        assert!(matches!(
            open_vector_index(&config),
            Err(DbError::IndexNotFound { .. })
        ));
    }

    #[test]
    fn test_open_rejects_dimension_change() {
        let dir = TempDir::new().unwrap();
        open_vector_index(&VectorIndexConfig::new(8, dir.path())).unwrap();

        let err = open_vector_index(&VectorIndexConfig::new(16, dir.path()))
            .err()
            .unwrap();
        assert!(matches!(err, DbError::IndexIncompatible { .. }));
        assert!(err.to_string().contains("8-dim"));
    }

    #[test]
    fn test_open_rejects_other_model() {
        let dir = TempDir::new().unwrap();
        open_vector_index(&VectorIndexConfig::new(8, dir.path()).with_model("a")).unwrap();

        assert!(open_vector_index(&VectorIndexConfig::new(8, dir.path()).with_model("a")).is_ok());
        let err = open_vector_index(&VectorIndexConfig::new(8, dir.path()).with_model("b"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("model 'a'"));
    }

    #[test]
    fn test_unknown_backend() {
        let dir = TempDir::new().unwrap();
        let config = VectorIndexConfig::new(8, dir.path()).with_backend("chroma");
        assert!(matches!(
            open_vector_index(&config),
            Err(DbError::Config { .. })
        ));
    }
}
