//! Indexing pipeline: walk, diff against the store, extract changed files in parallel, apply.
//!
//! One pass captures a baseline under a single read lock, walks the tree keeping only the path and
//! digest of files that changed, applies removals, then re-reads, extracts and ingests on a bounded
//! worker pool. Each ingest takes the write lock for exactly one file.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::analyzers::extract_or_minimal;
use crate::config::RepoLensConfig;
use crate::error::{RepoLensError, Result};
use crate::incremental::{Baseline, ChangeDetector, ChangeSet};
use crate::scanner::{normalize_scope, RepositoryScanner};
use crate::storage::SharedIndex;
use crate::types::{Digest, FileRecord, LanguageTag, ScanGeneration};

/// Shared flag checked between file units.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A file left out of the index, or indexed with fallback facts, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIssue {
    pub path: String,
    pub reason: String,
}

/// Outcome of one indexing pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexReport {
    pub root: PathBuf,
    pub scope: Option<String>,
    pub generation: ScanGeneration,
    pub files_scanned: usize,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: usize,
    /// Unreadable files and directories; their previous records, if any, are kept.
    pub skipped: Vec<FileIssue>,
    /// Files indexed with minimal facts because extraction failed.
    pub degraded: Vec<FileIssue>,
    pub ignored: usize,
    pub oversized: usize,
    pub symbols_extracted: usize,
    pub tombstones_purged: usize,
    pub duration_ms: u64,
}

impl IndexReport {
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty())
    }

    pub fn files_indexed(&self) -> usize {
        self.added.len() + self.modified.len()
    }
}

/// A changed file seen by the walk. Its bytes are read again by the worker that extracts it.
struct PendingFile {
    path: String,
    abs_path: PathBuf,
    language: LanguageTag,
    digest: Digest,
}

enum Outcome {
    Ingested { symbols: usize, degraded: Option<FileIssue> },
    Unreadable(FileIssue),
    Cancelled,
}

pub struct Indexer {
    scanner: RepositoryScanner,
    pool: rayon::ThreadPool,
    grace_generations: u64,
}

impl Indexer {
    pub fn new(config: &RepoLensConfig) -> Result<Self> {
        let workers = config.indexing.effective_workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("repolens-extract-{}", i))
            .build()
            .map_err(|e| RepoLensError::Other(format!("Failed to start extraction pool: {}", e)))?;

        Ok(Self {
            scanner: RepositoryScanner::new(&config.scanning)?,
            pool,
            grace_generations: config.indexing.grace_generations,
        })
    }

    pub fn scanner(&self) -> &RepositoryScanner {
        &self.scanner
    }

    pub fn index(&self, root: &Path, index: &SharedIndex, cancel: &CancellationToken) -> Result<IndexReport> {
        self.index_scope(root, None, index, cancel)
    }

    /// Index the subtree `scope` (root-relative). Only stored paths inside it can be removed.
    pub fn index_scope(
        &self,
        root: &Path,
        scope: Option<&str>,
        index: &SharedIndex,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let started = Instant::now();
        let scope = normalize_scope(scope);
        let mut walk = self.scanner.scan_scope(root, scope.as_deref())?;

        let detector = ChangeDetector::new(Baseline::capture(&index.read()));
        debug!("Baseline has {} files at {}", detector.baseline().len(), detector.baseline().generation);

        let mut observed: BTreeMap<String, Digest> = BTreeMap::new();
        let mut changed: Vec<PendingFile> = Vec::new();
        let mut skipped: Vec<FileIssue> = Vec::new();

        for item in walk.by_ref() {
            if cancel.is_cancelled() {
                info!("Indexing of {} cancelled during the walk", root.display());
                return Err(RepoLensError::Cancelled);
            }
            match item {
                Ok(entry) => {
                    let digest = Digest::of(&entry.bytes);
                    observed.insert(entry.path.clone(), digest.clone());
                    if detector.is_changed(&entry.path, &digest) {
                        changed.push(PendingFile {
                            path: entry.path,
                            abs_path: entry.abs_path,
                            language: entry.language,
                            digest,
                        });
                    }
                }
                Err(RepoLensError::Access { path, reason }) => skipped.push(FileIssue { path, reason }),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!("Skipping entry: {}", err);
                    skipped.push(FileIssue {
                        path: String::new(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        let stats = walk.stats().clone();

        let mut changes = detector.diff(&observed, scope.as_deref());
        changes.removed.retain(|path| !shadowed_by_skip(path, &skipped));

        let mut report = IndexReport {
            root: root.to_path_buf(),
            scope: scope.clone(),
            generation: detector.baseline().generation,
            files_scanned: observed.len(),
            unchanged: changes.unchanged,
            skipped,
            ignored: stats.ignored,
            oversized: stats.oversized,
            ..IndexReport::default()
        };

        if changes.is_empty() {
            report.duration_ms = started.elapsed().as_millis() as u64;
            info!(
                "Index of {} is up to date: {} files unchanged at {}",
                root.display(),
                report.unchanged,
                report.generation
            );
            return Ok(report);
        }

        let generation = index.write().advance_generation();
        report.generation = generation;
        self.apply(changes, changed, generation, index, cancel, &mut report)?;

        let purged = index.write().purge_tombstones(generation, self.grace_generations);
        report.tombstones_purged = purged.len();
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "Indexed {} at {}: {} scanned, {} added, {} modified, {} removed, {} unchanged, {} skipped, {} degraded, {} symbols in {}ms",
            root.display(),
            generation,
            report.files_scanned,
            report.added.len(),
            report.modified.len(),
            report.removed.len(),
            report.unchanged,
            report.skipped.len(),
            report.degraded.len(),
            report.symbols_extracted,
            report.duration_ms,
        );
        Ok(report)
    }

    fn apply(
        &self,
        changes: ChangeSet,
        changed: Vec<PendingFile>,
        generation: ScanGeneration,
        index: &SharedIndex,
        cancel: &CancellationToken,
        report: &mut IndexReport,
    ) -> Result<()> {
        // Removals first
        for path in &changes.removed {
            index.write().mark_removed(path, generation);
        }

        let outcomes: Vec<Result<Outcome>> = self.pool.install(|| {
            changed
                .into_par_iter()
                .map(|pending| {
                    if cancel.is_cancelled() {
                        return Ok(Outcome::Cancelled);
                    }
                    let bytes = match fs::read(&pending.abs_path) {
                        Ok(bytes) => bytes,
                        Err(err) => {
                            warn!("Failed to re-read {}: {}", pending.path, err);
                            return Ok(Outcome::Unreadable(FileIssue {
                                path: pending.path,
                                reason: err.to_string(),
                            }));
                        }
                    };
                    // The record must describe the bytes that were extracted.
                    let digest = Digest::of(&bytes);
                    if digest != pending.digest {
                        debug!("{} changed during the pass; indexing the newer content", pending.path);
                    }

                    let (facts, failure) = extract_or_minimal(&pending.path, &bytes, pending.language);
                    let degraded = failure.map(|err| {
                        debug!("Indexing {} with minimal facts: {}", pending.path, err);
                        FileIssue {
                            path: pending.path.clone(),
                            reason: err.to_string(),
                        }
                    });
                    let symbols = facts.symbols.len();
                    let record = FileRecord::new(pending.path, bytes.len() as u64, digest, pending.language, generation);
                    index.write().ingest(record, facts)?;
                    Ok(Outcome::Ingested { symbols, degraded })
                })
                .collect()
        });

        let mut cancelled = 0usize;
        let mut unreadable = Vec::new();
        for outcome in outcomes {
            match outcome? {
                Outcome::Ingested { symbols, degraded } => {
                    report.symbols_extracted += symbols;
                    report.degraded.extend(degraded);
                }
                Outcome::Unreadable(issue) => unreadable.push(issue),
                Outcome::Cancelled => cancelled += 1,
            }
        }
        if cancelled > 0 {
            info!(
                "Indexing of {} cancelled; {} files left unindexed",
                report.root.display(),
                cancelled
            );
            return Err(RepoLensError::Cancelled);
        }

        report.degraded.sort_by(|a, b| a.path.cmp(&b.path));
        let mut added = changes.added;
        let mut modified = changes.modified;
        if !unreadable.is_empty() {
            added.retain(|path| !unreadable.iter().any(|issue| &issue.path == path));
            modified.retain(|path| !unreadable.iter().any(|issue| &issue.path == path));
            report.skipped.extend(unreadable);
        }
        report.added = added;
        report.modified = modified;
        report.removed = changes.removed;
        Ok(())
    }
}

/// A stored path under an unreadable entry is not evidence of deletion.
fn shadowed_by_skip(path: &str, skipped: &[FileIssue]) -> bool {
    skipped.iter().any(|issue| {
        let skipped = issue.path.as_str();
        skipped == "."
            || path == skipped
            || (path.len() > skipped.len() && path.starts_with(skipped) && path.as_bytes()[skipped.len()] == b'/')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn indexer() -> Indexer {
        let mut config = RepoLensConfig::default();
        config.indexing.workers = 2;
        config.indexing.grace_generations = 1;
        Indexer::new(&config).unwrap()
    }

    #[test]
    fn test_index_temp_directory() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "auth/login.py", "import session\n\ndef login():\n    pass\n");
        write(dir.path(), "auth/session.py", "class Session:\n    pass\n");
        write(dir.path(), "node_modules/dep/index.js", "function hidden() {}\n");

        let index = SharedIndex::default();
        let report = indexer().index(dir.path(), &index, &CancellationToken::new()).unwrap();

        assert_eq!(report.files_scanned, 2);
        assert_eq!(report.added, vec!["auth/login.py", "auth/session.py"]);
        assert_eq!(report.generation, ScanGeneration(1));
        assert!(report.symbols_extracted >= 2);

        let store = index.read();
        assert_eq!(store.symbol_search("login").len(), 1);
        assert_eq!(store.importers_of("session").len(), 1);
        assert!(store.lookup("node_modules/dep/index.js").is_none());
        assert!(store.check_consistency().is_ok());
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/lib.rs", "pub fn run() {}\n");

        let index = SharedIndex::default();
        let indexer = indexer();
        indexer.index(dir.path(), &index, &CancellationToken::new()).unwrap();
        let before = index.read().clone();

        let report = indexer.index(dir.path(), &index, &CancellationToken::new()).unwrap();
        assert!(!report.has_changes());
        assert_eq!(report.unchanged, 1);
        assert_eq!(*index.read(), before);
    }

    #[test]
    fn test_modify_and_remove() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.py", "def alpha(): pass\n");
        write(dir.path(), "b.py", "def beta(): pass\n");

        let index = SharedIndex::default();
        let indexer = indexer();
        indexer.index(dir.path(), &index, &CancellationToken::new()).unwrap();

        write(dir.path(), "a.py", "def gamma(): pass\n");
        fs::remove_file(dir.path().join("b.py")).unwrap();
        let report = indexer.index(dir.path(), &index, &CancellationToken::new()).unwrap();

        assert_eq!(report.modified, vec!["a.py"]);
        assert_eq!(report.removed, vec!["b.py"]);
        let store = index.read();
        assert!(store.symbol_search("alpha").is_empty());
        assert_eq!(store.symbol_search("gamma").len(), 1);
        assert!(store.lookup("b.py").is_none());
        assert!(store.tombstone("b.py").is_some());
    }

    #[test]
    fn test_undecodable_file_is_degraded_not_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("weird.py"), [0x64, 0x65, 0x66, 0xff, 0xfe]).unwrap();
        write(dir.path(), "ok.py", "def ok(): pass\n");

        let index = SharedIndex::default();
        let report = indexer().index(dir.path(), &index, &CancellationToken::new()).unwrap();

        assert_eq!(report.degraded.len(), 1);
        assert_eq!(report.degraded[0].path, "weird.py");
        let store = index.read();
        assert!(store.lookup("weird.py").is_some());
        assert!(store.facts("weird.py").unwrap().is_empty());
    }

    #[test]
    fn test_scoped_pass_leaves_other_paths_alone() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.rs", "fn a() {}\n");
        write(dir.path(), "docs/guide.md", "# Guide\n");

        let index = SharedIndex::default();
        let indexer = indexer();
        indexer.index(dir.path(), &index, &CancellationToken::new()).unwrap();

        fs::remove_file(dir.path().join("docs/guide.md")).unwrap();
        write(dir.path(), "src/b.rs", "fn b() {}\n");
        let report = indexer
            .index_scope(dir.path(), Some("src"), &index, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.added, vec!["src/b.rs"]);
        assert!(report.removed.is_empty());
        assert!(index.read().lookup("docs/guide.md").is_some());
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.rs", "fn a() {}\n");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let index = SharedIndex::default();
        let result = indexer().index(dir.path(), &index, &cancel);
        assert!(matches!(result, Err(RepoLensError::Cancelled)));
        assert!(index.read().is_empty());
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let result = indexer().index(&dir.path().join("absent"), &SharedIndex::default(), &CancellationToken::new());
        assert!(matches!(result, Err(RepoLensError::RootNotFound(_))));
    }

    #[test]
    fn test_tombstones_purged_after_grace() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.rs", "fn a() {}\n");
        write(dir.path(), "b.rs", "fn b() {}\n");

        let index = SharedIndex::default();
        let indexer = indexer();
        indexer.index(dir.path(), &index, &CancellationToken::new()).unwrap();

        fs::remove_file(dir.path().join("b.rs")).unwrap();
        indexer.index(dir.path(), &index, &CancellationToken::new()).unwrap();
        assert!(index.read().tombstone("b.rs").is_some());

        write(dir.path(), "a.rs", "fn a2() {}\n");
        let report = indexer.index(dir.path(), &index, &CancellationToken::new()).unwrap();
        assert_eq!(report.tombstones_purged, 1);
        assert!(index.read().tombstone("b.rs").is_none());
    }

    #[test]
    fn test_workers_reread_changed_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "here.py", "def newer(): pass\n");
        let pending = |path: &str| PendingFile {
            path: path.to_string(),
            abs_path: dir.path().join(path),
            language: LanguageTag::Python,
            digest: Digest::of(b"def older(): pass\n"),
        };
        let changes = ChangeSet {
            added: vec!["gone.py".to_string(), "here.py".to_string()],
            ..ChangeSet::default()
        };

        let index = SharedIndex::default();
        let generation = index.write().advance_generation();
        let mut report = IndexReport::default();
        indexer()
            .apply(
                changes,
                vec![pending("gone.py"), pending("here.py")],
                generation,
                &index,
                &CancellationToken::new(),
                &mut report,
            )
            .unwrap();

        assert_eq!(report.added, vec!["here.py"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, "gone.py");

        let store = index.read();
        assert!(store.lookup("gone.py").is_none());
        let record = store.lookup("here.py").unwrap();
        assert_eq!(record.digest, Digest::of(b"def newer(): pass\n"));
        assert_eq!(store.symbol_search("newer").len(), 1);
    }

    #[test]
    fn test_shadowed_by_skip() {
        let skipped = vec![FileIssue {
            path: "locked".to_string(),
            reason: "permission denied".to_string(),
        }];
        assert!(shadowed_by_skip("locked/a.rs", &skipped));
        assert!(shadowed_by_skip("locked", &skipped));
        assert!(!shadowed_by_skip("lockedout/a.rs", &skipped));
    }
}
