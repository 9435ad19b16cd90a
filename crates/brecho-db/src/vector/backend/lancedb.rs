//! LanceDB backend.
//!
//! One table named after the collection with columns `id`, `vector`,
//! `metadata` (JSON text), `seq` and `updated_at`. Writes go through a single
//! `merge_insert` keyed on `id`, so a replaced item never shows up half-updated.
//! `seq` is the write timestamp in microseconds and breaks distance ties in
//! favor of the most recent write. The tie-break only reorders the `k` rows
//! LanceDB returns: a more recent row at the same distance just past the
//! limit is not pulled in.
//!
//! Writers are serialized by a gate. Two concurrent `merge_insert`s of a new
//! `id` would otherwise both take the insert branch against the same table
//! version and leave two rows for it.

use std::sync::{Arc, Mutex};

use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use futures::TryStreamExt;
use lance_arrow::FixedSizeListArrayExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, DistanceType, Table};
use tokio::runtime::Runtime;
use tracing::{debug, trace, warn};

use super::super::config::{VectorIndexConfig, COLLECTION_NAME};
use super::super::traits::{IndexEntry, Metadata, NeighborResult, VectorIndexBackend};
use crate::error::{DbError, DbResult};

pub struct LanceDbVectorIndex {
    dimension: usize,
    table: Table,
    runtime: Runtime,
    write_gate: Mutex<()>,
}

fn lance<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> DbError {
    move |e| DbError::LanceDb {
        message: format!("{}: {}", context, e),
    }
}

fn items_schema(dimension: usize) -> SchemaRef {
    let element = Arc::new(Field::new("item", DataType::Float32, true));
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(element, dimension as i32),
            false,
        ),
        Field::new("metadata", DataType::Utf8, true),
        Field::new("seq", DataType::Int64, false),
        Field::new("updated_at", DataType::Utf8, true),
    ]))
}

impl LanceDbVectorIndex {
    /// Connect to `config.path` and open the items table, creating it empty
    /// on first use.
    pub fn open(config: &VectorIndexConfig) -> DbResult<Self> {
        debug!("Opening LanceDB index at {}", config.path.display());
        let runtime = Runtime::new()
            .map_err(|e| DbError::internal(format!("cannot start LanceDB runtime: {}", e)))?;
        let dimension = config.dimension;
        let uri = config.path.to_string_lossy().into_owned();

        let table = runtime.block_on(async {
            let db = connect(&uri).execute().await.map_err(lance("connect"))?;
            let existing = db.table_names().execute().await.map_err(lance("list tables"))?;

            if existing.iter().any(|name| name == COLLECTION_NAME) {
                db.open_table(COLLECTION_NAME)
                    .execute()
                    .await
                    .map_err(lance("open table"))
            } else {
                debug!("Creating table '{}' ({} dims)", COLLECTION_NAME, dimension);
                let empty = to_batch(dimension, &[], 0)?;
                let rows = RecordBatchIterator::new(vec![Ok(empty)], items_schema(dimension));
                db.create_table(COLLECTION_NAME, Box::new(rows))
                    .execute()
                    .await
                    .map_err(lance("create table"))
            }
        })?;

        Ok(Self {
            dimension,
            table,
            runtime,
            write_gate: Mutex::new(()),
        })
    }

    fn check_len(&self, vector: &[f32]) -> DbResult<()> {
        if vector.len() == self.dimension {
            Ok(())
        } else {
            Err(DbError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            })
        }
    }
}

/// Rows for `entries`, with `seq` counting up from `first_seq`.
fn to_batch(dimension: usize, entries: &[IndexEntry], first_seq: i64) -> DbResult<RecordBatch> {
    let now = chrono::Utc::now().to_rfc3339();

    let ids = StringArray::from_iter_values(entries.iter().map(|e| e.id.as_str()));
    let flat: Vec<f32> = entries.iter().flat_map(|e| e.vector.iter().copied()).collect();
    let vectors = FixedSizeListArray::try_new_from_values(Float32Array::from(flat), dimension as i32)
        .map_err(|e| DbError::internal(format!("cannot build vector column: {}", e)))?;
    let metadata = entries
        .iter()
        .map(|e| serde_json::to_string(&e.metadata))
        .collect::<Result<Vec<_>, _>>()?;
    let seqs = Int64Array::from_iter_values((first_seq..).take(entries.len()));
    let stamps = StringArray::from_iter_values(entries.iter().map(|_| now.as_str()));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(ids),
        Arc::new(vectors),
        Arc::new(StringArray::from_iter_values(metadata)),
        Arc::new(seqs),
        Arc::new(stamps),
    ];
    RecordBatch::try_new(items_schema(dimension), columns)
        .map_err(|e| DbError::internal(format!("cannot build record batch: {}", e)))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> DbResult<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| DbError::internal(format!("result batch lacks a usable '{}' column", name)))
}

fn metadata_at(column: &StringArray, row: usize) -> Metadata {
    if column.is_null(row) {
        return Metadata::new();
    }
    parse_metadata(column.value(row))
}

fn parse_metadata(raw: &str) -> Metadata {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Discarding unreadable metadata: {}", e);
        Metadata::new()
    })
}

/// `'o''neil'`: Lance filters use SQL quoting.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl VectorIndexBackend for LanceDbVectorIndex {
    fn query(&self, embedding: &[f32], k: usize) -> DbResult<Vec<NeighborResult>> {
        trace!("LanceDB query, k={}", k);
        if k == 0 {
            return Ok(Vec::new());
        }
        self.check_len(embedding)?;

        let batches: Vec<RecordBatch> = self.runtime.block_on(async {
            self.table
                .vector_search(embedding.to_vec())
                .map_err(lance("build query"))?
                .distance_type(DistanceType::Cosine)
                .limit(k)
                .execute()
                .await
                .map_err(lance("query"))?
                .try_collect::<Vec<RecordBatch>>()
                .await
                .map_err(lance("read query results"))
        })?;

        let mut hits: Vec<(NeighborResult, i64)> = Vec::new();
        for batch in &batches {
            let ids = column::<StringArray>(batch, "id")?;
            let metadata = column::<StringArray>(batch, "metadata")?;
            let seqs = column::<Int64Array>(batch, "seq")?;
            let distances = column::<Float32Array>(batch, "_distance")?;

            hits.extend((0..batch.num_rows()).map(|row| {
                let neighbor = NeighborResult::new(
                    ids.value(row),
                    distances.value(row).clamp(0.0, 2.0),
                    metadata_at(metadata, row),
                );
                (neighbor, seqs.value(row))
            }));
        }

        hits.sort_by(|(a, a_seq), (b, b_seq)| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| b_seq.cmp(a_seq))
        });
        hits.truncate(k);
        Ok(hits.into_iter().map(|(neighbor, _)| neighbor).collect())
    }

    fn upsert(&self, entries: &[IndexEntry]) -> DbResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        for entry in entries {
            self.check_len(&entry.vector)?;
        }
        debug!("LanceDB upsert of {} entries", entries.len());

        let _gate = self
            .write_gate
            .lock()
            .map_err(|e| DbError::internal(format!("LanceDB write gate poisoned: {}", e)))?;
        let batch = to_batch(
            self.dimension,
            entries,
            chrono::Utc::now().timestamp_micros(),
        )?;
        let rows = RecordBatchIterator::new(vec![Ok(batch)], items_schema(self.dimension));

        self.runtime.block_on(async {
            let mut merge = self.table.merge_insert(&["id"]);
            merge
                .when_matched_update_all(None)
                .when_not_matched_insert_all();
            merge.execute(Box::new(rows)).await.map_err(lance("upsert"))?;
            Ok(())
        })
    }

    fn get(&self, id: &str) -> DbResult<Option<IndexEntry>> {
        let batches: Vec<RecordBatch> = self.runtime.block_on(async {
            self.table
                .query()
                .only_if(format!("id = {}", sql_literal(id)))
                .limit(1)
                .execute()
                .await
                .map_err(lance("lookup"))?
                .try_collect::<Vec<RecordBatch>>()
                .await
                .map_err(lance("read lookup results"))
        })?;

        let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) else {
            return Ok(None);
        };
        let vectors = column::<FixedSizeListArray>(batch, "vector")?;
        let metadata = column::<StringArray>(batch, "metadata")?;
        let row = vectors.value(0);
        let values = row
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| DbError::internal("vector column is not Float32"))?;

        Ok(Some(IndexEntry::new(
            id,
            values.values().to_vec(),
            metadata_at(metadata, 0),
        )))
    }

    fn flush(&self) -> DbResult<()> {
        // Each merge_insert is its own commit.
        Ok(())
    }

    fn len(&self) -> DbResult<usize> {
        self.runtime
            .block_on(self.table.count_rows(None))
            .map_err(lance("count rows"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn backend_name(&self) -> &'static str {
        "lancedb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(sql_literal("X1"), "'X1'");
        assert_eq!(sql_literal("o'neil"), "'o''neil'");
    }

    #[test]
    fn test_unreadable_metadata_becomes_empty() {
        assert!(parse_metadata("not json").is_empty());
        let parsed = parse_metadata(r#"{"brand":"Zara"}"#);
        assert_eq!(parsed.get("brand").and_then(|v| v.as_str()), Some("Zara"));
    }

    #[test]
    fn test_replace_then_query_and_get() {
        let dir = TempDir::new().unwrap();
        let config = VectorIndexConfig::new(2, dir.path()).with_backend("lancedb");
        let index = LanceDbVectorIndex::open(&config).unwrap();

        index
            .upsert(&[
                IndexEntry::new("near", vec![1.0, 0.0], Metadata::new()),
                IndexEntry::new("far", vec![0.0, 1.0], Metadata::new()),
            ])
            .unwrap();
        index
            .upsert(&[IndexEntry::new("near", vec![1.0, 0.1], Metadata::new())
                .with_field("brand", "Zara")])
            .unwrap();
        assert_eq!(index.len().unwrap(), 2);

        let results = index.query(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].id, "near");
        assert_eq!(
            results[0].metadata.get("brand").and_then(|v| v.as_str()),
            Some("Zara")
        );

        let stored = index.get("near").unwrap().unwrap();
        assert_eq!(stored.vector, vec![1.0, 0.1]);
        assert!(index.get("missing").unwrap().is_none());

        assert!(matches!(
            index.query(&[1.0], 1),
            Err(DbError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_concurrent_first_writes_keep_one_row() {
        let dir = TempDir::new().unwrap();
        let config = VectorIndexConfig::new(2, dir.path()).with_backend("lancedb");
        let index = LanceDbVectorIndex::open(&config).unwrap();

        std::thread::scope(|scope| {
            for i in 0..4 {
                let index = &index;
                scope.spawn(move || {
                    let entry = IndexEntry::new("X1", vec![1.0, i as f32], Metadata::new());
                    index.upsert(&[entry]).unwrap();
                });
            }
        });

        assert_eq!(index.len().unwrap(), 1);
        assert!(index.get("X1").unwrap().is_some());
    }
}
