use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ai_tools::{RepoTools, ToolResult, ToolSchema};
use crate::assembler::{AnswerAssembler, AnswerPackage, Explainer, FileOverview, FileSlice, TemplateExplainer};
use crate::config::{RepoLensConfig, SignalWeights};
use crate::error::{RepoLensError, Result};
use crate::indexer::{CancellationToken, IndexReport, Indexer};
use crate::ranking::{dependencies_of, FileDependencies, QueryRanker};
use crate::scanner::{check_root, normalize_scope};
use crate::storage::snapshot::canonical_root;
use crate::storage::{load_snapshot, save_snapshot, snapshot_path, DefinitionMatch, IndexMetadata, IndexStore, SharedIndex};
use crate::types::Candidate;

/// Ranked candidates plus the explainer's prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub package: AnswerPackage,
    pub explanation: String,
    pub explainer: String,
}

/// Entry point: one index bound to one repository root at a time.
///
/// Cloning is cheap and clones share the index. Queries run concurrently with each other and with
/// an indexing pass; indexing passes are serialized.
#[derive(Clone)]
pub struct RepoLens {
    inner: Arc<Inner>,
}

struct Inner {
    config: RepoLensConfig,
    index: SharedIndex,
    indexer: Indexer,
    ranker: QueryRanker,
    explainer: Arc<dyn Explainer>,
    root: RwLock<Option<PathBuf>>,
    scan_lock: Mutex<()>,
}

impl std::fmt::Debug for RepoLens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoLens")
            .field("root", &*self.inner.root.read())
            .field("files", &self.inner.index.read().len())
            .field("explainer", &self.inner.explainer.name())
            .finish()
    }
}

impl RepoLens {
    pub fn builder() -> RepoLensBuilder {
        RepoLensBuilder::new()
    }

    pub fn config(&self) -> &RepoLensConfig {
        &self.inner.config
    }

    /// Shared handle to the live index.
    pub fn index(&self) -> SharedIndex {
        self.inner.index.clone()
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.inner.root.read().clone()
    }

    pub fn is_scanned(&self) -> bool {
        self.inner.root.read().is_some()
    }

    /// Incrementally index `root` on a blocking thread.
    pub async fn scan(&self, root: impl AsRef<Path>) -> Result<IndexReport> {
        self.scan_with_cancel(root, CancellationToken::new()).await
    }

    pub async fn scan_with_cancel(&self, root: impl AsRef<Path>, cancel: CancellationToken) -> Result<IndexReport> {
        let lens = self.clone();
        let root = root.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || lens.scan_inner(&root, None, &cancel))
            .await
            .map_err(|e| RepoLensError::Other(format!("Scan task failed: {}", e)))?
    }

    pub fn scan_blocking(&self, root: impl AsRef<Path>) -> Result<IndexReport> {
        self.scan_inner(root.as_ref(), None, &CancellationToken::new())
    }

    pub fn scan_blocking_with_cancel(&self, root: impl AsRef<Path>, cancel: &CancellationToken) -> Result<IndexReport> {
        self.scan_inner(root.as_ref(), None, cancel)
    }

    /// Bind the index to `root` without walking it. The root's snapshot is loaded when the cache
    /// is on; otherwise the index starts empty. Returns whether a snapshot backs the index.
    ///
    /// Pair with [`RepoLens::scan_subtree`] to index part of a tree that was never scanned whole.
    pub fn bind_root(&self, root: impl AsRef<Path>) -> Result<bool> {
        check_root(root.as_ref())?;
        let root = canonical_root(root.as_ref());
        let _pass = self.inner.scan_lock.lock();
        self.activate(&root)
    }

    /// Re-index one subtree of the current root.
    pub fn scan_subtree(&self, scope: &str) -> Result<IndexReport> {
        let root = self.require_root()?;
        self.scan_inner(&root, Some(scope), &CancellationToken::new())
    }

    fn scan_inner(&self, root: &Path, scope: Option<&str>, cancel: &CancellationToken) -> Result<IndexReport> {
        check_root(root)?;
        let root = canonical_root(root);
        let _pass = self.inner.scan_lock.lock();

        let had_snapshot = self.activate(&root)?;
        let report = self.inner.indexer.index_scope(&root, scope, &self.inner.index, cancel)?;

        if self.inner.config.cache.enabled && (report.has_changes() || !had_snapshot) {
            if let Err(err) = self.save_snapshot() {
                warn!("Could not save snapshot for {}: {}", root.display(), err);
            }
        }
        Ok(report)
    }

    /// Bind the index to `root`, swapping stores when the root changes. Returns whether a
    /// snapshot backs the current store.
    fn activate(&self, root: &Path) -> Result<bool> {
        let mut current = self.inner.root.write();
        let cache = &self.inner.config.cache;
        let snapshot = snapshot_path(&cache.resolved_dir(), root);

        if current.as_deref() == Some(root) {
            return Ok(cache.enabled && snapshot.exists());
        }

        let (store, loaded) = if cache.enabled {
            match load_snapshot(root, &snapshot)? {
                Some(store) => (store, true),
                None => (IndexStore::new(), false),
            }
        } else {
            (IndexStore::new(), false)
        };
        debug!("Binding index to {} ({} files from snapshot)", root.display(), store.len());
        self.inner.index.replace(store);
        *current = Some(root.to_path_buf());
        Ok(loaded)
    }

    fn require_root(&self) -> Result<PathBuf> {
        self.root().ok_or(RepoLensError::NotScanned)
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        let root = self.root()?;
        Some(snapshot_path(&self.inner.config.cache.resolved_dir(), &root))
    }

    /// Persist the current index. Returns the snapshot file.
    pub fn save_snapshot(&self) -> Result<PathBuf> {
        let root = self.require_root()?;
        let path = snapshot_path(&self.inner.config.cache.resolved_dir(), &root);
        let store = self.inner.index.read();
        save_snapshot(&store, &root, &path)?;
        Ok(path)
    }

    /// Replace the index with the snapshot for `root`, if one exists.
    pub fn load_snapshot(&self, root: impl AsRef<Path>) -> Result<bool> {
        check_root(root.as_ref())?;
        let root = canonical_root(root.as_ref());
        let path = snapshot_path(&self.inner.config.cache.resolved_dir(), &root);
        match load_snapshot(&root, &path)? {
            Some(store) => {
                self.inner.index.replace(store);
                *self.inner.root.write() = Some(root);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Ranked candidates for a natural-language question.
    pub fn query(&self, text: &str) -> Result<Vec<Candidate>> {
        self.inner.ranker.rank(&self.inner.index.read(), text)
    }

    pub fn query_with_limit(&self, text: &str, limit: usize) -> Result<Vec<Candidate>> {
        self.inner.ranker.rank_with_limit(&self.inner.index.read(), text, limit)
    }

    /// Ranked candidates under `folder` (root-relative). `None` or `"."` covers the whole index.
    pub fn query_in(&self, text: &str, limit: usize, folder: Option<&str>) -> Result<Vec<Candidate>> {
        let store = self.inner.index.read();
        let folder = indexed_folder(&store, folder)?;
        self.inner.ranker.rank_in(&store, text, limit, folder.as_deref())
    }

    /// Rank, assemble, and hand the package to the configured explainer.
    pub async fn answer(&self, text: &str) -> Result<Answer> {
        let root = self.require_root()?;
        let package = {
            let store = self.inner.index.read();
            let candidates = self.inner.ranker.rank(&store, text)?;
            self.assembler(root).assemble(text, candidates, &store)
        };
        let explanation = self.inner.explainer.explain(&package).await?;
        info!("Answered '{}' with {} candidates", text, package.candidates.len());
        Ok(Answer {
            package,
            explanation,
            explainer: self.inner.explainer.name().to_string(),
        })
    }

    pub fn explain_file(&self, path: &str) -> Result<FileOverview> {
        let root = self.require_root()?;
        self.assembler(root).explain_file(path, &self.inner.index.read())
    }

    pub fn file_slice(&self, path: &str, start_line: usize, num_lines: usize) -> Result<FileSlice> {
        let root = self.require_root()?;
        self.assembler(root).file_slice(path, start_line, num_lines)
    }

    fn assembler(&self, root: PathBuf) -> AnswerAssembler {
        AnswerAssembler::new(root).with_max_file_size(self.inner.config.scanning.max_file_size)
    }

    pub fn fuzzy_find_files(&self, pattern: &str, limit: usize) -> Vec<(String, i64)> {
        self.inner.index.read().fuzzy_find_paths(pattern, limit, None)
    }

    pub fn fuzzy_find_files_in(&self, pattern: &str, limit: usize, folder: Option<&str>) -> Result<Vec<(String, i64)>> {
        let store = self.inner.index.read();
        let folder = indexed_folder(&store, folder)?;
        Ok(store.fuzzy_find_paths(pattern, limit, folder.as_deref()))
    }

    pub fn find_definitions(&self, name: &str, limit: usize) -> Vec<DefinitionMatch> {
        self.inner.index.read().find_definitions(name, limit, None)
    }

    pub fn find_definitions_in(&self, name: &str, limit: usize, folder: Option<&str>) -> Result<Vec<DefinitionMatch>> {
        let store = self.inner.index.read();
        let folder = indexed_folder(&store, folder)?;
        Ok(store.find_definitions(name, limit, folder.as_deref()))
    }

    pub fn dependencies(&self, path: &str) -> Option<FileDependencies> {
        dependencies_of(&self.inner.index.read(), path)
    }

    pub fn stats(&self) -> IndexMetadata {
        self.inner.index.read().metadata()
    }

    /// JSON schemas of the tools [`RepoLens::execute_tool`] accepts.
    pub fn get_tool_definitions() -> Vec<ToolSchema> {
        RepoTools::tool_schemas()
    }

    /// Run one tool. Failures come back as an unsuccessful [`ToolResult`], never as `Err`.
    pub async fn execute_tool(&self, name: &str, input: serde_json::Value) -> Result<ToolResult> {
        match RepoTools::new(self.clone()).execute_tool(name, input).await {
            Ok(result) => Ok(result),
            Err(err) => Ok(ToolResult::error(format!("{:#}", err))),
        }
    }
}

/// Normalized `folder`, which must be a directory holding indexed files.
fn indexed_folder(store: &IndexStore, folder: Option<&str>) -> Result<Option<String>> {
    match normalize_scope(folder) {
        Some(folder) if !store.is_directory(&folder) => {
            Err(RepoLensError::Query(format!("No indexed folder '{}'", folder)))
        }
        folder => Ok(folder),
    }
}

/// Builder for [`RepoLens`]. Options mirror [`RepoLensConfig`].
pub struct RepoLensBuilder {
    config: RepoLensConfig,
    explainer: Option<Arc<dyn Explainer>>,
}

impl Default for RepoLensBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RepoLensBuilder {
    pub fn new() -> Self {
        Self {
            config: RepoLensConfig::default(),
            explainer: None,
        }
    }

    pub fn with_config(mut self, config: RepoLensConfig) -> Self {
        self.config = config;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.ranking.top_k = top_k;
        self
    }

    pub fn max_query_len(mut self, chars: usize) -> Self {
        self.config.ranking.max_query_len = chars;
        self
    }

    pub fn weights(mut self, weights: SignalWeights) -> Self {
        self.config.ranking.weights = weights;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.indexing.workers = workers;
        self
    }

    pub fn grace_generations(mut self, generations: u64) -> Self {
        self.config.indexing.grace_generations = generations;
        self
    }

    /// Replace the default ignore patterns.
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.scanning.ignore_patterns = patterns;
        self
    }

    pub fn add_ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.scanning.ignore_patterns.push(pattern.into());
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.scanning.max_file_size = bytes;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.scanning.max_depth = Some(depth);
        self
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.config.scanning.follow_symlinks = follow;
        self
    }

    pub fn respect_gitignore(mut self, respect: bool) -> Self {
        self.config.scanning.respect_gitignore = respect;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache.dir = Some(dir.into());
        self.config.cache.enabled = true;
        self
    }

    pub fn enable_cache(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    pub fn explainer<E: Explainer + 'static>(mut self, explainer: E) -> Self {
        self.explainer = Some(Arc::new(explainer));
        self
    }

    pub fn build(self) -> Result<RepoLens> {
        self.config.validate()?;
        let indexer = Indexer::new(&self.config)?;
        let ranker = QueryRanker::new(self.config.ranking.clone());
        let explainer = self
            .explainer
            .unwrap_or_else(|| Arc::new(TemplateExplainer));

        Ok(RepoLens {
            inner: Arc::new(Inner {
                config: self.config,
                index: SharedIndex::default(),
                indexer,
                ranker,
                explainer,
                root: RwLock::new(None),
                scan_lock: Mutex::new(()),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lens(cache: &TempDir) -> RepoLens {
        RepoLens::builder().workers(2).cache_dir(cache.path()).build().unwrap()
    }

    #[test]
    fn test_builder_validates() {
        assert!(RepoLens::builder().top_k(0).build().is_err());
        assert!(RepoLens::builder().enable_cache(false).build().is_ok());
    }

    #[test]
    fn test_unscanned_lens() {
        let lens = RepoLens::builder().enable_cache(false).build().unwrap();
        assert!(!lens.is_scanned());
        assert!(matches!(lens.explain_file("a.rs"), Err(RepoLensError::NotScanned)));
        assert!(lens.query("anything").unwrap().is_empty());
        assert_eq!(lens.stats().total_files, 0);
    }

    #[test]
    fn test_scan_writes_and_reuses_snapshot() {
        let repo = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        std::fs::write(repo.path().join("main.rs"), "fn main() {}\n").unwrap();

        let first = lens(&cache);
        let report = first.scan_blocking(repo.path()).unwrap();
        assert_eq!(report.added, vec!["main.rs"]);
        let snapshot = first.snapshot_path().unwrap();
        assert!(snapshot.exists());

        // A fresh instance starts from the snapshot, so nothing is re-extracted
        let second = lens(&cache);
        let report = second.scan_blocking(repo.path()).unwrap();
        assert!(!report.has_changes());
        assert_eq!(report.unchanged, 1);
        assert_eq!(second.find_definitions("main", 5)[0].path, "main.rs");
    }

    #[test]
    fn test_switching_roots_swaps_the_store() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        std::fs::write(a.path().join("a.py"), "def alpha(): pass\n").unwrap();
        std::fs::write(b.path().join("b.py"), "def beta(): pass\n").unwrap();

        let lens = RepoLens::builder().enable_cache(false).build().unwrap();
        lens.scan_blocking(a.path()).unwrap();
        lens.scan_blocking(b.path()).unwrap();

        let index = lens.index();
        let store = index.read();
        assert!(store.lookup("a.py").is_none());
        assert!(store.lookup("b.py").is_some());
    }

    #[test]
    fn test_bind_root_then_scoped_pass_indexes_only_the_scope() {
        let repo = TempDir::new().unwrap();
        std::fs::create_dir_all(repo.path().join("auth")).unwrap();
        std::fs::create_dir_all(repo.path().join("web")).unwrap();
        std::fs::write(repo.path().join("auth/login.py"), "def login(): pass\n").unwrap();
        std::fs::write(repo.path().join("web/app.js"), "export function boot() {}\n").unwrap();

        let lens = RepoLens::builder().enable_cache(false).build().unwrap();
        assert!(!lens.bind_root(repo.path()).unwrap());
        assert!(lens.is_scanned());
        assert!(lens.index().read().is_empty());

        let report = lens.scan_subtree("auth").unwrap();
        assert_eq!(report.added, vec!["auth/login.py"]);
        assert_eq!(report.files_scanned, 1);
        assert!(!lens.index().read().contains("web/app.js"));

        assert!(matches!(
            lens.bind_root(repo.path().join("missing")),
            Err(RepoLensError::RootNotFound(_))
        ));
    }

    #[test]
    fn test_folder_scoped_lookups() {
        let repo = TempDir::new().unwrap();
        std::fs::create_dir_all(repo.path().join("auth")).unwrap();
        std::fs::create_dir_all(repo.path().join("web")).unwrap();
        std::fs::write(repo.path().join("auth/login.py"), "def login(): pass\n").unwrap();
        std::fs::write(repo.path().join("web/login.js"), "export function login() {}\n").unwrap();

        let lens = RepoLens::builder().enable_cache(false).build().unwrap();
        lens.scan_blocking(repo.path()).unwrap();

        let ranked = lens.query_in("login", 10, Some("web/")).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].path, "web/login.js");

        let defs = lens.find_definitions_in("login", 10, Some("auth")).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].path, "auth/login.py");

        let files = lens.fuzzy_find_files_in("login", 10, Some(".")).unwrap();
        assert_eq!(files.len(), 2);

        assert!(matches!(lens.query_in("login", 10, Some("billing")), Err(RepoLensError::Query(_))));
        assert!(matches!(
            lens.find_definitions_in("login", 10, Some("auth/login.py")),
            Err(RepoLensError::Query(_))
        ));
    }
}
