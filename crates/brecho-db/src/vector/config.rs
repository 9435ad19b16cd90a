//! Index location and the on-disk manifest.
//!
//! Every index directory carries an `index.meta.json` manifest naming the
//! collection, the backend, the vector dimension and the embedding model the
//! vectors came from. Opening an index whose manifest disagrees with the
//! running configuration is refused: distances between vectors of two
//! different models are meaningless.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::SimilaritySpace;
use crate::error::{DbError, DbResult};

/// Backend used when none is configured.
pub const DEFAULT_BACKEND: &str = "simple";

/// Manifest file inside the index directory.
pub const INDEX_META_FILENAME: &str = "index.meta.json";

/// The single logical collection every catalog item lives in.
pub const COLLECTION_NAME: &str = "items";

/// Manifest layout version.
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// VectorIndexConfig
// ============================================================================

/// Where the index lives and what it must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorIndexConfig {
    pub dimension: usize,
    pub path: PathBuf,
    /// `simple` or `lancedb`.
    pub backend: String,
    /// Embedding model id recorded in the manifest; `None` skips the check.
    pub model_id: Option<String>,
    pub create_if_missing: bool,
}

impl VectorIndexConfig {
    pub fn new(dimension: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            path: path.into(),
            backend: DEFAULT_BACKEND.to_string(),
            model_id: None,
            create_if_missing: true,
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

// ============================================================================
// IndexManifest
// ============================================================================

/// Contents of `index.meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexManifest {
    #[serde(default = "default_collection")]
    pub collection: String,
    pub backend: String,
    pub dimension: usize,
    #[serde(default)]
    pub space: SimilaritySpace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Entry count at the last write; informational only.
    #[serde(default)]
    pub entries: usize,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_collection() -> String {
    COLLECTION_NAME.to_string()
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl IndexManifest {
    /// A fresh manifest describing `config`.
    pub fn for_config(config: &VectorIndexConfig) -> Self {
        let now = Utc::now();
        Self {
            collection: COLLECTION_NAME.to_string(),
            backend: config.backend.clone(),
            dimension: config.dimension,
            space: SimilaritySpace::Cosine,
            model_id: config.model_id.clone(),
            entries: 0,
            schema_version: SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn file_in(dir: &Path) -> PathBuf {
        dir.join(INDEX_META_FILENAME)
    }

    pub fn read(dir: &Path) -> DbResult<Self> {
        let path = Self::file_in(dir);
        debug!("Reading index manifest {}", path.display());
        let content = fs::read_to_string(&path)
            .map_err(|e| DbError::persistence(&path, format!("cannot read manifest: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| DbError::vector_parse(&path, format!("bad manifest: {}", e)))
    }

    /// Write through a temp file so a crash never leaves half a manifest.
    pub fn write(&self, dir: &Path) -> DbResult<()> {
        let path = Self::file_in(dir);
        let tmp = dir.join(format!("{}.tmp", INDEX_META_FILENAME));
        fs::create_dir_all(dir)?;

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, content)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| {
                let _ = fs::remove_file(&tmp);
                DbError::persistence(&path, format!("cannot write manifest: {}", e))
            })
    }

    /// Record the entry count after a write.
    pub fn touch(&mut self, entries: usize) {
        self.entries = entries;
        self.updated_at = Utc::now();
    }

    /// First disagreement with `config`, if any.
    fn mismatch(&self, config: &VectorIndexConfig) -> Option<String> {
        if self.collection != COLLECTION_NAME {
            return Some(format!(
                "collection '{}' is not '{}'",
                self.collection, COLLECTION_NAME
            ));
        }
        if self.dimension != config.dimension {
            return Some(format!(
                "built for {}-dim vectors, the model produces {}",
                self.dimension, config.dimension
            ));
        }
        if self.backend != config.backend {
            return Some(format!(
                "written by the '{}' backend, configured backend is '{}'",
                self.backend, config.backend
            ));
        }
        if let (Some(built_with), Some(wanted)) = (&self.model_id, &config.model_id) {
            if built_with != wanted {
                return Some(format!(
                    "built with model '{}', the running model is '{}'",
                    built_with, wanted
                ));
            }
        }
        if self.schema_version > SCHEMA_VERSION {
            return Some(format!(
                "manifest version {} is newer than {}",
                self.schema_version, SCHEMA_VERSION
            ));
        }
        None
    }
}

// ============================================================================
// Compatibility
// ============================================================================

/// What opening `config` would find on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorIndexCompatibility {
    /// Nothing there yet.
    NotFound,
    Compatible(IndexManifest),
    Incompatible(String),
    /// Files present but the manifest is missing or unreadable.
    Corrupted(String),
}

impl VectorIndexCompatibility {
    pub fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Compare the manifest in `config.path` with `config`.
pub fn check_index_compatibility(config: &VectorIndexConfig) -> VectorIndexCompatibility {
    if !IndexManifest::file_in(&config.path).exists() {
        let has_files = config
            .path
            .read_dir()
            .map(|mut rd| rd.next().is_some())
            .unwrap_or(false);
        return if has_files {
            VectorIndexCompatibility::Corrupted(format!(
                "{} has files but no {}",
                config.path.display(),
                INDEX_META_FILENAME
            ))
        } else {
            VectorIndexCompatibility::NotFound
        };
    }

    match IndexManifest::read(&config.path) {
        Ok(manifest) => match manifest.mismatch(config) {
            Some(reason) => VectorIndexCompatibility::Incompatible(reason),
            None => VectorIndexCompatibility::Compatible(manifest),
        },
        Err(e) => VectorIndexCompatibility::Corrupted(e.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded(dimension: usize, model: &str) -> (TempDir, VectorIndexConfig) {
        let dir = TempDir::new().unwrap();
        let config = VectorIndexConfig::new(dimension, dir.path()).with_model(model);
        IndexManifest::for_config(&config).write(dir.path()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_manifest_file_shape() {
        let (dir, _) = seeded(512, "openai/clip-vit-base-patch32");
        let raw = fs::read_to_string(dir.path().join(INDEX_META_FILENAME)).unwrap();
        assert!(raw.contains("\"collection\": \"items\""));
        assert!(raw.contains("\"space\": \"cosine\""));
        assert!(raw.contains("\"modelId\": \"openai/clip-vit-base-patch32\""));
        assert!(!dir.path().join("index.meta.json.tmp").exists());
    }

    #[test]
    fn test_empty_or_missing_dir_is_not_found() {
        let dir = TempDir::new().unwrap();
        let config = VectorIndexConfig::new(64, dir.path());
        assert!(check_index_compatibility(&config).is_not_found());

        let config = VectorIndexConfig::new(64, dir.path().join("absent"));
        assert!(check_index_compatibility(&config).is_not_found());
    }

    #[test]
    fn test_stray_files_without_manifest_are_corrupted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("vectors.jsonl"), "").unwrap();
        let config = VectorIndexConfig::new(64, dir.path());
        assert!(matches!(
            check_index_compatibility(&config),
            VectorIndexCompatibility::Corrupted(_)
        ));
    }

    #[test]
    fn test_mismatches_are_reported() {
        let (dir, config) = seeded(64, "brecho/color-histogram");
        assert!(check_index_compatibility(&config).is_compatible());

        let other_dim = VectorIndexConfig { dimension: 512, ..config.clone() };
        let other_model = config.clone().with_model("openai/clip-vit-base-patch32");
        let other_backend = config.clone().with_backend("lancedb");

        for (probe, needle) in [
            (other_dim, "64-dim"),
            (other_model, "clip"),
            (other_backend, "lancedb"),
        ] {
            match check_index_compatibility(&probe) {
                VectorIndexCompatibility::Incompatible(reason) => {
                    assert!(reason.contains(needle), "{}", reason)
                }
                other => panic!("expected a mismatch, got {:?}", other),
            }
        }

        // Without a model id the model check is skipped.
        let anonymous = VectorIndexConfig::new(64, dir.path());
        assert!(check_index_compatibility(&anonymous).is_compatible());
    }

    #[test]
    fn test_unknown_space_is_corrupted() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(INDEX_META_FILENAME),
            r#"{"backend":"simple","dimension":4,"space":"l2","createdAt":"2025-01-01T00:00:00Z","updatedAt":"2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let config = VectorIndexConfig::new(4, dir.path());
        assert!(matches!(
            check_index_compatibility(&config),
            VectorIndexCompatibility::Corrupted(_)
        ));
    }

    #[test]
    fn test_touch_updates_count() {
        let (dir, _) = seeded(8, "m");
        let mut manifest = IndexManifest::read(dir.path()).unwrap();
        let created = manifest.created_at;
        manifest.touch(3);
        manifest.write(dir.path()).unwrap();

        let reread = IndexManifest::read(dir.path()).unwrap();
        assert_eq!(reread.entries, 3);
        assert_eq!(reread.created_at, created);
    }
}
