//! Vector index traits and core types.
//!
//! This module defines the core abstraction for vector storage backends and
//! the records that flow through it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DbResult;

// ============================================================================
// MetadataValue
// ============================================================================

/// A scalar metadata value stored next to an item vector.
///
/// The set is closed on purpose: metadata is catalog data (SKU, brand, list
/// price...), never nested documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// Borrow the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Read the value as a float, accepting integers too.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl<T: Into<MetadataValue>> From<Option<T>> for MetadataValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(MetadataValue::Null)
    }
}

/// Metadata attached to an index entry.
pub type Metadata = BTreeMap<String, MetadataValue>;

// ============================================================================
// SimilaritySpace
// ============================================================================

/// Similarity space of the index.
///
/// Cosine is the only space: stored vectors and query vectors come from the
/// same image model and are compared by angle, never by magnitude. The value
/// is persisted in the index metadata so an index written under another
/// space is refused at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilaritySpace {
    #[default]
    Cosine,
}

impl SimilaritySpace {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilaritySpace::Cosine => "cosine",
        }
    }
}

impl std::fmt::Display for SimilaritySpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cosine distance (`1 - cosine_similarity`) clamped to `[0, 2]`.
///
/// A zero vector on either side has similarity 0, so distance 1.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}

// ============================================================================
// IndexEntry
// ============================================================================

/// A durable `(id, vector, metadata)` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Stable catalog key (e.g. a SKU), unique within the collection.
    pub id: String,

    /// Pooled, L2-normalized item vector.
    pub vector: Vec<f32>,

    /// Scalar catalog metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl IndexEntry {
    pub fn new(id: impl Into<String>, vector: Vec<f32>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata,
        }
    }

    /// Add one metadata field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// NeighborResult
// ============================================================================

/// A single result from a nearest-neighbor query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborResult {
    /// Catalog key of the matched item.
    pub id: String,

    /// Cosine distance to the query vector (lower is closer).
    pub distance: f32,

    /// Metadata stored with the matched item.
    pub metadata: Metadata,
}

impl NeighborResult {
    pub fn new(id: impl Into<String>, distance: f32, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            distance,
            metadata,
        }
    }
}

// ============================================================================
// VectorIndexBackend Trait
// ============================================================================

/// Core trait for vector index backends.
///
/// ## Implementation Notes
///
/// - Backends must be thread-safe (`Send + Sync`); one instance is shared by
///   every concurrently handled request.
/// - `upsert` replaces any existing entry with the same id. A query that
///   starts after `upsert` returns sees the new vector and metadata
///   together, never one without the other.
/// - `query` returns at most `k` results ordered by ascending distance.
///   Equal distances are ordered most-recently-upserted first.
pub trait VectorIndexBackend: Send + Sync {
    /// Query the index for the `k` nearest entries.
    ///
    /// An empty index or `k == 0` yields an empty list.
    fn query(&self, embedding: &[f32], k: usize) -> DbResult<Vec<NeighborResult>>;

    /// Insert or replace entries by id.
    ///
    /// Fails only when the storage medium fails, or when a vector does not
    /// have the index dimension.
    fn upsert(&self, entries: &[IndexEntry]) -> DbResult<()>;

    /// Fetch one entry by id.
    fn get(&self, id: &str) -> DbResult<Option<IndexEntry>>;

    /// Flush pending writes to persistent storage.
    fn flush(&self) -> DbResult<()>;

    /// Get the number of entries in the index.
    fn len(&self) -> DbResult<usize>;

    /// Check if the index is empty.
    fn is_empty(&self) -> DbResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Get the dimension of vectors in this index.
    fn dimension(&self) -> usize;

    /// The similarity space. Always cosine.
    fn similarity_space(&self) -> SimilaritySpace {
        SimilaritySpace::Cosine
    }

    /// Short backend name, as recorded in the index metadata.
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance() {
        let a = vec![1.0, 0.0, 0.0];
        assert!(cosine_distance(&a, &a).abs() < 1e-6);

        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);

        let c = vec![-1.0, 0.0, 0.0];
        assert!((cosine_distance(&a, &c) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_zero_vector() {
        let a = vec![1.0, 0.0];
        let z = vec![0.0, 0.0];
        assert_eq!(cosine_distance(&a, &z), 1.0);
    }

    #[test]
    fn test_metadata_value_json_shape() {
        let entry = IndexEntry::new("X1", vec![1.0, 0.0], Metadata::new())
            .with_field("brand", "Zara")
            .with_field("list_price", 49.9)
            .with_field("stage", 0i64)
            .with_field("consignor_id", None::<String>);

        let json = serde_json::to_value(&entry.metadata).unwrap();
        assert_eq!(json["brand"], "Zara");
        assert_eq!(json["stage"], 0);
        assert!(json["consignor_id"].is_null());

        let parsed: Metadata = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.get("stage"), Some(&MetadataValue::Int(0)));
        assert_eq!(parsed.get("list_price").and_then(|v| v.as_f64()), Some(49.9));
        assert!(parsed["consignor_id"].is_null());
    }

    #[test]
    fn test_similarity_space() {
        assert_eq!(SimilaritySpace::default().as_str(), "cosine");
        assert_eq!(
            serde_json::to_string(&SimilaritySpace::Cosine).unwrap(),
            "\"cosine\""
        );
    }
}
