//! # brecho-db
//!
//! Infrastructure layer for Brecho - the durable vector index behind
//! "find items that look like this photo".
//!
//! The index is one logical collection (`items`) that maps a catalog key
//! (SKU) to a pooled image vector plus scalar metadata. It is kept apart from
//! the domain logic in `brecho-core` so storage backends can be swapped
//! without touching the intake pipeline.
//!
//! ## Architecture
//!
//! ```text
//! brecho-cli → brecho-core → (traits)
//!                  ↑
//!             brecho-db (implements the vector index)
//!             brecho-model (implements embeddings / oracle / speech)
//! ```
//!
//! ## Features
//!
//! - `simple` (default): JSONL snapshot with exact cosine scan
//! - `lancedb`: LanceDB table with ANN search
//!
//! ## Usage
//!
//! ```ignore
//! use brecho_db::vector::{open_vector_index, IndexEntry, VectorIndexConfig};
//!
//! let config = VectorIndexConfig::new(512, "/path/to/vectordb");
//! let index = open_vector_index(&config)?;
//!
//! index.upsert(&[IndexEntry::new("X1", pooled, metadata)])?;
//! let neighbors = index.query(&pooled, 5)?;
//! ```

pub mod error;
pub mod vector;

pub use error::{DbError, DbResult};
