use ignore::{DirEntry, Walk, WalkBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::rules::IgnoreRules;
use crate::config::ScanningConfig;
use crate::error::{RepoLensError, Result};
use crate::types::record::is_within;
use crate::types::LanguageTag;

/// Raw file produced by a walk, before any digesting or extraction.
#[derive(Debug, Clone)]
pub struct ScanEntry {
    /// Root-relative, `/`-separated.
    pub path: String,
    pub abs_path: PathBuf,
    pub size: u64,
    pub bytes: Vec<u8>,
    pub language: LanguageTag,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub dirs_visited: usize,
    pub files_yielded: usize,
    pub ignored: usize,
    pub oversized: usize,
    pub access_errors: usize,
}

/// Walks repository trees. Holds no state between walks, so every `scan` is a fresh pass.
#[derive(Debug, Clone)]
pub struct RepositoryScanner {
    config: ScanningConfig,
    rules: IgnoreRules,
}

impl RepositoryScanner {
    pub fn new(config: &ScanningConfig) -> Result<Self> {
        let rules = IgnoreRules::new(&config.ignore_patterns)?;
        Ok(Self {
            config: config.clone(),
            rules,
        })
    }

    pub fn config(&self) -> &ScanningConfig {
        &self.config
    }

    /// Full walk of `root`.
    pub fn scan(&self, root: &Path) -> Result<ScanIter> {
        self.scan_scope(root, None)
    }

    /// Walk only `scope` (root-relative directory). A vanished scope yields nothing, which the
    /// change detector reads as "everything under it was removed".
    ///
    /// The walk always starts at `root` so every `.gitignore` between the root and the scope
    /// applies; directories off the path to the scope are pruned before they are read.
    pub fn scan_scope(&self, root: &Path, scope: Option<&str>) -> Result<ScanIter> {
        check_root(root)?;

        let scope = normalize_scope(scope);
        if let Some(scope) = &scope {
            if !root.join(scope).is_dir() {
                debug!("Scope {} is missing; walk is empty", scope);
            }
        }

        let ignored = Arc::new(AtomicUsize::new(0));
        let filter = EntryFilter {
            root: root.to_path_buf(),
            rules: self.rules.clone(),
            scope: scope.clone(),
            ignored: Arc::clone(&ignored),
        };

        let respect_gitignore = self.config.respect_gitignore;
        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .git_ignore(respect_gitignore)
            .git_exclude(respect_gitignore)
            .require_git(false)
            .follow_links(self.config.follow_symlinks)
            .max_depth(self.config.max_depth)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| filter.keep(entry));

        Ok(ScanIter {
            root: root.to_path_buf(),
            walk: builder.build(),
            max_file_size: self.config.max_file_size,
            ignored,
            stats: ScanStats::default(),
        })
    }

}

/// Fail fast on a missing or non-directory root.
pub fn check_root(root: &Path) -> Result<()> {
    if !root.exists() {
        return Err(RepoLensError::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(RepoLensError::RootNotDirectory(root.to_path_buf()));
    }
    Ok(())
}

/// Strip `./`, leading and trailing slashes; `None` for the root itself.
pub fn normalize_scope(scope: Option<&str>) -> Option<String> {
    let scope = scope?.replace('\\', "/");
    let parts: Vec<&str> = scope
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn relative_to(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Prunes entries during the walk: the scope first, then the ignore rules.
struct EntryFilter {
    root: PathBuf,
    rules: IgnoreRules,
    scope: Option<String>,
    ignored: Arc<AtomicUsize>,
}

impl EntryFilter {
    fn keep(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let rel = relative_to(&self.root, entry.path());
        let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());

        if let Some(scope) = &self.scope {
            // Ancestors of the scope are entered only to reach it.
            let on_path = is_within(&rel, scope) || (is_dir && is_within(scope, &rel));
            if !on_path {
                return false;
            }
        }

        if self.rules.is_ignored(&rel) {
            self.ignored.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }
}

fn is_loop(err: &ignore::Error) -> bool {
    match err {
        ignore::Error::Loop { .. } => true,
        ignore::Error::WithPath { err, .. }
        | ignore::Error::WithDepth { err, .. }
        | ignore::Error::WithLineNumber { err, .. } => is_loop(err),
        ignore::Error::Partial(errs) => !errs.is_empty() && errs.iter().all(is_loop),
        _ => false,
    }
}

fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => error_path(err),
        ignore::Error::Partial(errs) => errs.iter().find_map(error_path),
        _ => None,
    }
}

/// Lazy walk over one tree, driven by `ignore::Walk`. Entries come in depth-first order with
/// siblings sorted by name.
pub struct ScanIter {
    root: PathBuf,
    walk: Walk,
    max_file_size: u64,
    ignored: Arc<AtomicUsize>,
    stats: ScanStats,
}

impl ScanIter {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    fn access_error(&mut self, rel: &str, err: impl ToString) -> RepoLensError {
        let shown = if rel.is_empty() { "." } else { rel };
        let err = RepoLensError::access(shown, err);
        warn!("{}", err);
        self.stats.access_errors += 1;
        err
    }

    /// `None` for walk noise that does not concern any stored path.
    fn walk_error(&mut self, err: ignore::Error) -> Option<RepoLensError> {
        if is_loop(&err) {
            debug!("Skipping symlink cycle: {}", err);
            return None;
        }
        if err.io_error().is_none() {
            warn!("Ignore file problem during walk: {}", err);
            return None;
        }
        let rel = error_path(&err)
            .map(|path| relative_to(&self.root, path))
            .unwrap_or_default();
        Some(self.access_error(&rel, err))
    }

    fn read_file(&mut self, entry: DirEntry) -> Option<Result<ScanEntry>> {
        let rel = relative_to(&self.root, entry.path());
        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(err) => return Some(Err(self.access_error(&rel, err))),
        };

        if size > self.max_file_size {
            debug!("Skipping {} ({} bytes exceeds limit)", rel, size);
            self.stats.oversized += 1;
            return None;
        }

        let abs = entry.into_path();
        match fs::read(&abs) {
            Ok(bytes) => {
                self.stats.files_yielded += 1;
                let language = LanguageTag::from_path(&abs);
                Some(Ok(ScanEntry {
                    path: rel,
                    abs_path: abs,
                    size: bytes.len() as u64,
                    bytes,
                    language,
                }))
            }
            Err(err) => Some(Err(self.access_error(&rel, err))),
        }
    }
}

impl Iterator for ScanIter {
    type Item = Result<ScanEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = self.walk.next();
            self.stats.ignored = self.ignored.load(Ordering::Relaxed);

            let entry = match next? {
                Ok(entry) => entry,
                Err(err) => match self.walk_error(err) {
                    Some(err) => return Some(Err(err)),
                    None => continue,
                },
            };

            match entry.file_type() {
                Some(ft) if ft.is_dir() => self.stats.dirs_visited += 1,
                Some(ft) if ft.is_file() => match self.read_file(entry) {
                    Some(item) => return Some(item),
                    None => continue,
                },
                _ => debug!("Skipping {}", entry.path().display()),
            }
        }
    }
}
