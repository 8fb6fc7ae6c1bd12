use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::{RepoLensError, Result};
use crate::types::record::{is_within, parent_of};
use crate::types::{Digest, FileRecord, ScanGeneration, StructuralFacts, Tombstone};

/// Totals over the live records, computed on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub total_files: usize,
    pub total_bytes: u64,
    pub total_symbols: usize,
    pub total_imports: usize,
    pub languages: BTreeMap<String, usize>,
    pub directories: usize,
    pub tombstones: usize,
    pub generation: ScanGeneration,
}

/// A symbol declaration located by [`IndexStore::find_definitions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionMatch {
    pub symbol: String,
    pub path: String,
    pub score: i64,
}

/// In-memory index: forward maps keyed by path plus reverse indices for symbols, import targets
/// and directory adjacency.
///
/// A path is present in the reverse indices exactly when its record is live. Directories appear in
/// the adjacency index only while they hold at least one live file somewhere below them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexStore {
    // Core data
    records: BTreeMap<String, FileRecord>,
    facts: BTreeMap<String, StructuralFacts>,
    tombstones: BTreeMap<String, Tombstone>,

    // Reverse indices
    symbol_index: BTreeMap<String, BTreeSet<String>>, // symbol -> declaring paths
    import_index: BTreeMap<String, BTreeSet<String>>, // raw import target -> importing paths
    children: BTreeMap<String, BTreeSet<String>>,     // dir ("" is the root) -> child paths

    generation: ScanGeneration,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted parts. Reverse indices are derived, never trusted.
    pub fn from_parts(
        generation: ScanGeneration,
        records: Vec<FileRecord>,
        facts: Vec<StructuralFacts>,
        tombstones: Vec<Tombstone>,
    ) -> Result<Self> {
        let mut store = Self::new();
        store.generation = generation;

        let mut facts_by_path: BTreeMap<String, StructuralFacts> =
            facts.into_iter().map(|f| (f.path.clone(), f)).collect();
        for record in records {
            let facts = facts_by_path.remove(&record.path).ok_or_else(|| {
                RepoLensError::Inconsistent(format!("record {} has no structural facts", record.path))
            })?;
            if store.records.contains_key(&record.path) {
                return Err(RepoLensError::Inconsistent(format!("duplicate record {}", record.path)));
            }
            store.ingest(record, facts)?;
        }
        if let Some(orphan) = facts_by_path.keys().next() {
            return Err(RepoLensError::Inconsistent(format!("facts for {} have no record", orphan)));
        }
        for tombstone in tombstones {
            if store.records.contains_key(&tombstone.path) {
                return Err(RepoLensError::Inconsistent(format!(
                    "tombstone for live path {}",
                    tombstone.path
                )));
            }
            store.tombstones.insert(tombstone.path.clone(), tombstone);
        }
        Ok(store)
    }

    pub fn generation(&self) -> ScanGeneration {
        self.generation
    }

    /// Start a new indexing pass.
    pub fn advance_generation(&mut self) -> ScanGeneration {
        self.generation = self.generation.next();
        self.generation
    }

    /// Add or replace a file. Reverse indices are updated by diffing the old and new facts.
    pub fn ingest(&mut self, record: FileRecord, facts: StructuralFacts) -> Result<()> {
        if record.path != facts.path {
            return Err(RepoLensError::Inconsistent(format!(
                "facts for {} offered with record {}",
                facts.path, record.path
            )));
        }
        let path = record.path.clone();

        let empty = StructuralFacts::new(path.as_str());
        let previous = self.facts.get(&path).unwrap_or(&empty);

        let old_symbols: BTreeSet<String> = previous.symbols.clone();
        let old_imports: BTreeSet<String> = previous.imports.iter().cloned().collect();
        let new_imports: BTreeSet<String> = facts.imports.iter().cloned().collect();

        for symbol in old_symbols.difference(&facts.symbols) {
            detach(&mut self.symbol_index, symbol, &path);
        }
        for symbol in facts.symbols.difference(&old_symbols) {
            attach(&mut self.symbol_index, symbol, &path);
        }
        for target in old_imports.difference(&new_imports) {
            detach(&mut self.import_index, target, &path);
        }
        for target in new_imports.difference(&old_imports) {
            attach(&mut self.import_index, target, &path);
        }

        if !self.records.contains_key(&path) {
            self.link_ancestors(&path);
        }

        self.tombstones.remove(&path);
        self.records.insert(path.clone(), record);
        self.facts.insert(path, facts);
        Ok(())
    }

    /// Drop a record, its facts and every reverse-index reference to it.
    pub fn remove(&mut self, path: &str) -> Option<FileRecord> {
        let record = self.records.remove(path)?;
        if let Some(facts) = self.facts.remove(path) {
            for symbol in &facts.symbols {
                detach(&mut self.symbol_index, symbol, path);
            }
            for target in &facts.imports {
                detach(&mut self.import_index, target, path);
            }
        }
        self.unlink_ancestors(path);
        Some(record)
    }

    /// Remove a file and remember it as a tombstone until its grace period ends.
    pub fn mark_removed(&mut self, path: &str, generation: ScanGeneration) -> bool {
        match self.remove(path) {
            Some(record) => {
                self.tombstones.insert(
                    path.to_string(),
                    Tombstone {
                        path: path.to_string(),
                        digest: record.digest,
                        removed_at: generation,
                    },
                );
                true
            }
            None => false,
        }
    }

    /// Forget tombstones older than `grace` generations. Returns the purged paths.
    pub fn purge_tombstones(&mut self, current: ScanGeneration, grace: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .tombstones
            .values()
            .filter(|t| current.since(t.removed_at) >= grace)
            .map(|t| t.path.clone())
            .collect();
        for path in &expired {
            self.tombstones.remove(path);
        }
        if !expired.is_empty() {
            debug!("Purged {} tombstones at {}", expired.len(), current);
        }
        expired
    }

    pub fn lookup(&self, path: &str) -> Option<&FileRecord> {
        self.records.get(path)
    }

    pub fn facts(&self, path: &str) -> Option<&StructuralFacts> {
        self.facts.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.records.contains_key(path)
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub fn all_facts(&self) -> impl Iterator<Item = &StructuralFacts> {
        self.facts.values()
    }

    pub fn tombstones(&self) -> impl Iterator<Item = &Tombstone> {
        self.tombstones.values()
    }

    pub fn tombstone(&self, path: &str) -> Option<&Tombstone> {
        self.tombstones.get(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Path -> digest for every live record, the baseline change detection compares against.
    pub fn digests(&self) -> BTreeMap<String, Digest> {
        self.records
            .iter()
            .map(|(path, record)| (path.clone(), record.digest.clone()))
            .collect()
    }

    /// Paths declaring exactly `name`.
    pub fn symbol_search(&self, name: &str) -> BTreeSet<String> {
        self.symbol_index.get(name).cloned().unwrap_or_default()
    }

    /// Paths whose raw import list contains exactly `target`.
    pub fn importers_of(&self, target: &str) -> BTreeSet<String> {
        self.import_index.get(target).cloned().unwrap_or_default()
    }

    /// Direct children (files and directories) of `dir`; the root is `""`.
    pub fn children_of(&self, dir: &str) -> BTreeSet<String> {
        let dir = dir.trim_matches('/');
        self.children.get(dir).cloned().unwrap_or_default()
    }

    pub fn is_directory(&self, path: &str) -> bool {
        self.children.contains_key(path.trim_matches('/'))
    }

    /// Symbols containing `fragment`, case-insensitively, with their declaring paths.
    pub fn symbols_matching(&self, fragment: &str) -> Vec<(&str, &BTreeSet<String>)> {
        matching(&self.symbol_index, fragment)
    }

    /// Import targets containing `fragment`, case-insensitively, with their importing paths.
    pub fn imports_matching(&self, fragment: &str) -> Vec<(&str, &BTreeSet<String>)> {
        matching(&self.import_index, fragment)
    }

    /// Fuzzy search over file paths, best score first. `folder` limits matches to one subtree.
    pub fn fuzzy_find_paths(&self, pattern: &str, limit: usize, folder: Option<&str>) -> Vec<(String, i64)> {
        let pattern = pattern.trim();
        if pattern.is_empty() || limit == 0 {
            return Vec::new();
        }
        let matcher = SkimMatcherV2::default();
        let mut results: Vec<(String, i64)> = self
            .records
            .keys()
            .filter(|path| folder.map_or(true, |dir| is_within(path, dir)))
            .filter_map(|path| matcher.fuzzy_match(path, pattern).map(|score| (path.clone(), score)))
            .collect();

        results.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.len().cmp(&b.0.len())).then_with(|| a.0.cmp(&b.0)));
        results.truncate(limit);
        results
    }

    /// Declarations of `name`: exact matches first, then fuzzy matches over symbol names.
    pub fn find_definitions(&self, name: &str, limit: usize, folder: Option<&str>) -> Vec<DefinitionMatch> {
        let name = name.trim();
        if name.is_empty() || limit == 0 {
            return Vec::new();
        }
        let matcher = SkimMatcherV2::default();
        let mut results = Vec::new();

        for (symbol, paths) in &self.symbol_index {
            let score = if symbol == name {
                i64::MAX
            } else if symbol.eq_ignore_ascii_case(name) {
                i64::MAX - 1
            } else {
                match matcher.fuzzy_match(symbol, name) {
                    Some(score) => score,
                    None => continue,
                }
            };
            for path in paths.iter().filter(|path| folder.map_or(true, |dir| is_within(path, dir))) {
                results.push(DefinitionMatch {
                    symbol: symbol.clone(),
                    path: path.clone(),
                    score,
                });
            }
        }

        results.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.symbol.len().cmp(&b.symbol.len()))
                .then_with(|| a.path.cmp(&b.path))
        });
        results.truncate(limit);
        results
    }

    pub fn metadata(&self) -> IndexMetadata {
        let mut languages = BTreeMap::new();
        for record in self.records.values() {
            *languages.entry(record.language.as_str().to_string()).or_insert(0) += 1;
        }
        IndexMetadata {
            total_files: self.records.len(),
            total_bytes: self.records.values().map(|r| r.size).sum(),
            total_symbols: self.facts.values().map(|f| f.symbols.len()).sum(),
            total_imports: self.facts.values().map(|f| f.imports.len()).sum(),
            languages,
            directories: self.children.len(),
            tombstones: self.tombstones.len(),
            generation: self.generation,
        }
    }

    /// Verify that forward maps and reverse indices agree.
    pub fn check_consistency(&self) -> Result<()> {
        let fail = |msg: String| Err(RepoLensError::Inconsistent(msg));

        if self.records.len() != self.facts.len() {
            return fail(format!(
                "{} records but {} fact entries",
                self.records.len(),
                self.facts.len()
            ));
        }
        for (path, record) in &self.records {
            if record.path != *path {
                return fail(format!("record keyed {} claims path {}", path, record.path));
            }
            let Some(facts) = self.facts.get(path) else {
                return fail(format!("record {} has no facts", path));
            };
            if facts.path != *path {
                return fail(format!("facts keyed {} claim path {}", path, facts.path));
            }
            for symbol in &facts.symbols {
                if !self.symbol_index.get(symbol).map_or(false, |paths| paths.contains(path)) {
                    return fail(format!("symbol {} of {} missing from the symbol index", symbol, path));
                }
            }
            for target in &facts.imports {
                if !self.import_index.get(target).map_or(false, |paths| paths.contains(path)) {
                    return fail(format!("import {} of {} missing from the import index", target, path));
                }
            }
            if !self.children.get(parent_of(path)).map_or(false, |c| c.contains(path)) {
                return fail(format!("{} missing from the adjacency index", path));
            }
            if self.tombstones.contains_key(path) {
                return fail(format!("live path {} also has a tombstone", path));
            }
        }

        for (symbol, paths) in &self.symbol_index {
            for path in paths {
                if !self.facts.get(path).map_or(false, |f| f.symbols.contains(symbol)) {
                    return fail(format!("symbol index points {} at {}", symbol, path));
                }
            }
        }
        for (target, paths) in &self.import_index {
            for path in paths {
                if !self.facts.get(path).map_or(false, |f| f.imports.contains(target)) {
                    return fail(format!("import index points {} at {}", target, path));
                }
            }
        }
        for (dir, entries) in &self.children {
            if entries.is_empty() {
                return fail(format!("directory {} has no children", dir));
            }
            if !dir.is_empty() && !self.children.get(parent_of(dir)).map_or(false, |c| c.contains(dir)) {
                return fail(format!("directory {} is detached from its parent", dir));
            }
            for entry in entries {
                if !self.records.contains_key(entry) && !self.children.contains_key(entry) {
                    return fail(format!("adjacency entry {} is neither a file nor a directory", entry));
                }
            }
        }
        Ok(())
    }

    fn link_ancestors(&mut self, path: &str) {
        let mut child = path;
        loop {
            let parent = parent_of(child);
            let fresh_dir = !self.children.contains_key(parent);
            self.children
                .entry(parent.to_string())
                .or_default()
                .insert(child.to_string());
            if parent.is_empty() || !fresh_dir {
                break;
            }
            child = parent;
        }
    }

    fn unlink_ancestors(&mut self, path: &str) {
        let mut child = path;
        loop {
            let parent = parent_of(child);
            let now_empty = match self.children.get_mut(parent) {
                Some(entries) => {
                    entries.remove(child);
                    entries.is_empty()
                }
                None => false,
            };
            if !now_empty {
                break;
            }
            self.children.remove(parent);
            if parent.is_empty() {
                break;
            }
            child = parent;
        }
    }
}

fn attach(index: &mut BTreeMap<String, BTreeSet<String>>, key: &str, path: &str) {
    index.entry(key.to_string()).or_default().insert(path.to_string());
}

fn detach(index: &mut BTreeMap<String, BTreeSet<String>>, key: &str, path: &str) {
    if let Some(paths) = index.get_mut(key) {
        paths.remove(path);
        if paths.is_empty() {
            index.remove(key);
        }
    }
}

fn matching<'a>(index: &'a BTreeMap<String, BTreeSet<String>>, fragment: &str) -> Vec<(&'a str, &'a BTreeSet<String>)> {
    let fragment = fragment.to_lowercase();
    if fragment.is_empty() {
        return Vec::new();
    }
    index
        .iter()
        .filter(|(key, _)| key.to_lowercase().contains(&fragment))
        .map(|(key, paths)| (key.as_str(), paths))
        .collect()
}

/// Shared handle to one store: a single writer or many concurrent readers.
///
/// Writers hold the lock for exactly one mutation, so readers never observe a half-applied record.
#[derive(Debug, Clone, Default)]
pub struct SharedIndex(Arc<RwLock<IndexStore>>);

impl SharedIndex {
    pub fn new(store: IndexStore) -> Self {
        Self(Arc::new(RwLock::new(store)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, IndexStore> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, IndexStore> {
        self.0.write()
    }

    /// Swap in a whole store, e.g. one loaded from a snapshot.
    pub fn replace(&self, store: IndexStore) -> IndexStore {
        std::mem::replace(&mut *self.0.write(), store)
    }
}
