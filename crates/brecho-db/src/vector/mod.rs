//! Vector index module for brecho-db.
//!
//! ## Usage
//!
//! ```ignore
//! use brecho_db::vector::{VectorIndexConfig, open_vector_index};
//!
//! let config = VectorIndexConfig::new(512, "/path/to/index");
//! let index = open_vector_index(&config)?;
//!
//! index.upsert(&entries)?;
//! let neighbors = index.query(&embedding, 5)?;
//! ```

mod backend;
mod config;
mod traits;

pub use config::{
    check_index_compatibility, IndexManifest, VectorIndexCompatibility, VectorIndexConfig,
    COLLECTION_NAME, DEFAULT_BACKEND, INDEX_META_FILENAME, SCHEMA_VERSION,
};
pub use traits::{
    cosine_distance, IndexEntry, Metadata, MetadataValue, NeighborResult, SimilaritySpace,
    VectorIndexBackend,
};

pub use backend::{available_backends, open_vector_index};

#[cfg(feature = "lancedb")]
pub use backend::LanceDbVectorIndex;

#[cfg(feature = "simple")]
pub use backend::SimpleFileVectorIndex;
