//! Simple file-based vector index backend.
//!
//! Entries live in memory and are snapshotted to a JSONL file after every
//! upsert. Search is an exact cosine scan, which is plenty for a shop-sized
//! catalog.

use super::super::config::{IndexManifest, VectorIndexConfig};
use super::super::traits::{
    cosine_distance, IndexEntry, Metadata, NeighborResult, VectorIndexBackend,
};
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, RwLock};
use tracing::{debug, trace, warn};

/// Filename for the JSONL data file.
const DATA_FILENAME: &str = "vectors.jsonl";

/// A stored entry. `seq` grows with every write and breaks distance ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    id: String,
    vector: Vec<f32>,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    seq: u64,
    #[serde(default)]
    updated_at: Option<String>,
}

impl StoredEntry {
    fn to_entry(&self) -> IndexEntry {
        IndexEntry::new(self.id.clone(), self.vector.clone(), self.metadata.clone())
    }
}

/// Simple file-based vector index.
pub struct SimpleFileVectorIndex {
    /// Path to the index directory.
    path: PathBuf,

    /// Dimension of vectors.
    dimension: usize,

    /// Committed entries, keyed by id.
    entries: RwLock<HashMap<String, StoredEntry>>,

    /// Serializes writers so two upserts never interleave their snapshots.
    write_gate: Mutex<()>,

    /// Next write sequence number.
    next_seq: AtomicU64,
}

impl SimpleFileVectorIndex {
    /// Open or create a simple file vector index.
    pub fn open(config: &VectorIndexConfig) -> DbResult<Self> {
        debug!("Opening SimpleFileVectorIndex at {:?}", config.path);

        let data_path = config.path.join(DATA_FILENAME);
        let entries = if data_path.exists() {
            load_from_file(&data_path)?
        } else {
            HashMap::new()
        };

        let next_seq = entries.values().map(|e| e.seq).max().map_or(0, |s| s + 1);

        Ok(Self {
            path: config.path.clone(),
            dimension: config.dimension,
            entries: RwLock::new(entries),
            write_gate: Mutex::new(()),
            next_seq: AtomicU64::new(next_seq),
        })
    }

    fn data_path(&self) -> PathBuf {
        self.path.join(DATA_FILENAME)
    }

    /// Write a full snapshot to a temp file, then rename it into place.
    fn persist(&self, entries: &HashMap<String, StoredEntry>) -> DbResult<()> {
        let data_path = self.data_path();
        let tmp_path = self.path.join(format!("{}.tmp", DATA_FILENAME));
        debug!("Saving {} entries to {:?}", entries.len(), data_path);

        let write = || -> std::io::Result<()> {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);

            let mut ordered: Vec<&StoredEntry> = entries.values().collect();
            ordered.sort_by_key(|e| e.seq);
            for stored in ordered {
                let line = serde_json::to_string(stored).map_err(std::io::Error::other)?;
                writeln!(writer, "{}", line)?;
            }

            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &data_path)
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DbError::persistence(&data_path, e.to_string())
        })?;

        self.touch_manifest(entries.len());
        Ok(())
    }

    /// Keep the entry count in the manifest roughly current.
    fn touch_manifest(&self, count: usize) {
        let touched = IndexManifest::read(&self.path).and_then(|mut manifest| {
            manifest.touch(count);
            manifest.write(&self.path)
        });
        if let Err(e) = touched {
            warn!("Failed to update index manifest: {}", e);
        }
    }

    fn read_entries(
        &self,
    ) -> DbResult<std::sync::RwLockReadGuard<'_, HashMap<String, StoredEntry>>> {
        self.entries
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))
    }
}

/// Load entries from a JSONL file, skipping lines that do not parse.
fn load_from_file(path: &Path) -> DbResult<HashMap<String, StoredEntry>> {
    debug!("Loading vectors from {:?}", path);

    let file = File::open(path)
        .map_err(|e| DbError::persistence(path, format!("Failed to open data file: {}", e)))?;
    let reader = BufReader::new(file);
    let mut entries: HashMap<String, StoredEntry> = HashMap::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| DbError::persistence(path, e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<StoredEntry>(&line) {
            Ok(stored) => {
                let newer = entries
                    .get(&stored.id)
                    .is_none_or(|existing| existing.seq <= stored.seq);
                if newer {
                    entries.insert(stored.id.clone(), stored);
                }
            }
            Err(e) => {
                warn!("Skipping invalid line {} in {:?}: {}", line_num + 1, path, e);
            }
        }
    }

    debug!("Loaded {} entries", entries.len());
    Ok(entries)
}

impl VectorIndexBackend for SimpleFileVectorIndex {
    fn query(&self, embedding: &[f32], k: usize) -> DbResult<Vec<NeighborResult>> {
        trace!("Querying SimpleFileVectorIndex, k={}", k);

        if k == 0 {
            return Ok(Vec::new());
        }
        if embedding.len() != self.dimension {
            return Err(DbError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let entries = self.read_entries()?;

        let mut scored: Vec<(f32, &StoredEntry)> = entries
            .values()
            .map(|e| (cosine_distance(embedding, &e.vector), e))
            .collect();

        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.1.seq.cmp(&a.1.seq))
        });

        let results: Vec<NeighborResult> = scored
            .into_iter()
            .take(k)
            .map(|(distance, stored)| {
                NeighborResult::new(stored.id.clone(), distance, stored.metadata.clone())
            })
            .collect();

        trace!("Found {} results", results.len());
        Ok(results)
    }

    fn upsert(&self, entries: &[IndexEntry]) -> DbResult<()> {
        debug!("Upserting {} entries", entries.len());

        for entry in entries {
            if entry.vector.len() != self.dimension {
                return Err(DbError::DimensionMismatch {
                    expected: self.dimension,
                    actual: entry.vector.len(),
                });
            }
        }

        let _gate = self
            .write_gate
            .lock()
            .map_err(|e| DbError::internal(format!("Failed to acquire write gate: {}", e)))?;

        // Build the next snapshot aside; readers keep the committed one.
        let mut next = self.read_entries()?.clone();
        let now = chrono::Utc::now().to_rfc3339();
        for entry in entries {
            let seq = self.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
            next.insert(
                entry.id.clone(),
                StoredEntry {
                    id: entry.id.clone(),
                    vector: entry.vector.clone(),
                    metadata: entry.metadata.clone(),
                    seq,
                    updated_at: Some(now.clone()),
                },
            );
        }

        self.persist(&next)?;

        let mut committed = self
            .entries
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))?;
        *committed = next;

        Ok(())
    }

    fn get(&self, id: &str) -> DbResult<Option<IndexEntry>> {
        Ok(self.read_entries()?.get(id).map(StoredEntry::to_entry))
    }

    fn flush(&self) -> DbResult<()> {
        let _gate = self
            .write_gate
            .lock()
            .map_err(|e| DbError::internal(format!("Failed to acquire write gate: {}", e)))?;
        let snapshot = self.read_entries()?.clone();
        self.persist(&snapshot)
    }

    fn len(&self) -> DbResult<usize> {
        Ok(self.read_entries()?.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn backend_name(&self) -> &'static str {
        "simple"
    }
}

// ============================================================================
// Tests
// ============================================================================
