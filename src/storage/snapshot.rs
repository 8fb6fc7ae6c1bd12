//! Persisted index snapshots: gzip-compressed JSON, one file per repository root.

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::memory::IndexStore;
use crate::error::{RepoLensError, Result};
use crate::types::{FileRecord, ScanGeneration, StructuralFacts, Tombstone};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;
const SNAPSHOT_EXTENSION: &str = "json.gz";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub root: String,
    pub saved_at: DateTime<Utc>,
    pub generation: ScanGeneration,
    pub records: Vec<FileRecord>,
    pub facts: Vec<StructuralFacts>,
    pub tombstones: Vec<Tombstone>,
}

impl Snapshot {
    pub fn capture(store: &IndexStore, root: &Path) -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            root: canonical_root(root).to_string_lossy().into_owned(),
            saved_at: Utc::now(),
            generation: store.generation(),
            records: store.records().cloned().collect(),
            facts: store.all_facts().cloned().collect(),
            tombstones: store.tombstones().cloned().collect(),
        }
    }

    /// Rebuild the store, rejecting snapshots of another root or with broken invariants.
    pub fn into_store(self, root: &Path) -> Result<IndexStore> {
        if self.version != SNAPSHOT_FORMAT_VERSION {
            return Err(RepoLensError::SnapshotCorrupt(format!(
                "unsupported format version {} (expected {})",
                self.version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        let expected = canonical_root(root).to_string_lossy().into_owned();
        if self.root != expected {
            return Err(RepoLensError::SnapshotCorrupt(format!(
                "snapshot belongs to {}, not {}",
                self.root, expected
            )));
        }

        let store = IndexStore::from_parts(self.generation, self.records, self.facts, self.tombstones)
            .map_err(|e| RepoLensError::SnapshotCorrupt(e.to_string()))?;
        store
            .check_consistency()
            .map_err(|e| RepoLensError::SnapshotCorrupt(e.to_string()))?;
        Ok(store)
    }
}

pub fn canonical_root(root: &Path) -> PathBuf {
    std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
}

/// Snapshot file for `root` inside `cache_dir`, named by a hash of the canonical root.
pub fn snapshot_path(cache_dir: &Path, root: &Path) -> PathBuf {
    let canonical = canonical_root(root);
    let key = blake3::hash(canonical.to_string_lossy().as_bytes()).to_hex();
    cache_dir.join(format!("{}.{}", &key.as_str()[..16], SNAPSHOT_EXTENSION))
}

/// Write atomically: a temp file next to the target, then rename.
pub fn save_snapshot(store: &IndexStore, root: &Path, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let snapshot = Snapshot::capture(store, root);
    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut encoder, &snapshot)?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;

    info!(
        "Saved snapshot of {} files ({}) to {}",
        snapshot.records.len(),
        snapshot.generation,
        path.display()
    );
    Ok(())
}

/// `Ok(None)` when no snapshot exists yet.
pub fn load_snapshot(root: &Path, path: &Path) -> Result<Option<IndexStore>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("No snapshot at {}", path.display());
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };

    let decoder = GzDecoder::new(BufReader::new(file));
    let snapshot: Snapshot = serde_json::from_reader(decoder)
        .map_err(|e| RepoLensError::SnapshotCorrupt(format!("{}: {}", path.display(), e)))?;
    let store = snapshot.into_store(root)?;

    info!(
        "Loaded snapshot of {} files ({}) from {}",
        store.len(),
        store.generation(),
        path.display()
    );
    Ok(Some(store))
}
