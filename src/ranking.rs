//! Query ranking over the index.
//!
//! Direct signals (symbols, imports, paths, doc excerpts) are summed per file and query term.
//! Files structurally connected to the strongest hits (through resolved imports or a shared
//! declared symbol) then get a share of the seed's score.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::RankingConfig;
use crate::error::{RepoLensError, Result};
use crate::storage::IndexStore;
use crate::types::record::is_within;
use crate::types::{Candidate, LanguageTag, Signal};

const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by", "can", "could", "did",
    "do", "does", "doing", "done", "for", "from", "get", "gets", "has", "have", "how", "i", "if", "in", "into", "is",
    "it", "its", "me", "my", "need", "of", "on", "or", "our", "please", "should", "show", "so", "some", "tell",
    "that", "the", "their", "them", "then", "there", "these", "this", "those", "to", "up", "us", "want", "was",
    "we", "were", "what", "when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Symbols declared in more files than this are too generic to relate them.
const SHARED_SYMBOL_FANOUT: usize = 8;

/// Lowercase query terms split on Unicode word boundaries, stop-words removed, first occurrence kept.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in text.unicode_words() {
        let term = word.to_lowercase();
        if STOP_WORDS.contains(&term.as_str()) {
            continue;
        }
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

pub struct QueryRanker {
    config: RankingConfig,
}

impl QueryRanker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Top `config.top_k` candidates for `query`, best first.
    pub fn rank(&self, store: &IndexStore, query: &str) -> Result<Vec<Candidate>> {
        self.rank_with_limit(store, query, self.config.top_k)
    }

    pub fn rank_with_limit(&self, store: &IndexStore, query: &str, limit: usize) -> Result<Vec<Candidate>> {
        self.rank_in(store, query, limit, None)
    }

    /// Like [`QueryRanker::rank_with_limit`], keeping only files under `folder`. Files outside it
    /// still score and seed related boosts.
    pub fn rank_in(&self, store: &IndexStore, query: &str, limit: usize, folder: Option<&str>) -> Result<Vec<Candidate>> {
        let length = query.chars().count();
        if length > self.config.max_query_len {
            return Err(RepoLensError::Query(format!(
                "query is {} characters; the limit is {}",
                length, self.config.max_query_len
            )));
        }

        let terms = tokenize(query);
        if terms.is_empty() || store.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates = self.direct_scores(store, &terms);
        if candidates.is_empty() {
            debug!("No direct matches for {:?}", terms);
            return Ok(Vec::new());
        }
        self.apply_related_boost(store, &mut candidates);

        let mut ranked: Vec<Candidate> = candidates
            .into_values()
            .filter(|candidate| folder.map_or(true, |dir| is_within(&candidate.path, dir)))
            .collect();
        ranked.sort_by(Candidate::rank_order);
        ranked.truncate(limit);
        debug!("Ranked {} candidates for {:?}", ranked.len(), terms);
        Ok(ranked)
    }

    fn direct_scores(&self, store: &IndexStore, terms: &[String]) -> BTreeMap<String, Candidate> {
        let weights = &self.config.weights;
        let files = files_under(store, "");
        let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();
        let mut add = |path: &str, signal: Signal, term: &str, contribution: f64| {
            candidates
                .entry(path.to_string())
                .or_insert_with(|| Candidate::new(path))
                .add(signal, term, contribution);
        };

        for term in terms {
            // A single character is a substring of nearly everything; it only counts as a whole symbol.
            let exact_only = term.chars().count() < 2;

            // Strongest symbol signal per file: exact beats partial
            let mut symbol_hits: BTreeMap<&str, Signal> = BTreeMap::new();
            for (symbol, paths) in store.symbols_matching(term) {
                let signal = if symbol.to_lowercase() == *term {
                    Signal::SymbolExact
                } else if exact_only {
                    continue;
                } else {
                    Signal::SymbolPartial
                };
                for path in paths {
                    let best = symbol_hits.entry(path.as_str()).or_insert(signal);
                    if signal == Signal::SymbolExact {
                        *best = signal;
                    }
                }
            }
            for (path, signal) in symbol_hits {
                let weight = match signal {
                    Signal::SymbolExact => weights.symbol_exact,
                    _ => weights.symbol_partial,
                };
                add(path, signal, term.as_str(), weight);
            }
            if exact_only {
                continue;
            }

            let importers: BTreeSet<&str> = store
                .imports_matching(term)
                .into_iter()
                .flat_map(|(_, paths)| paths.iter().map(String::as_str))
                .collect();
            for path in importers {
                add(path, Signal::ImportMatch, term.as_str(), weights.import);
            }

            for path in files.iter().filter(|path| path.to_lowercase().contains(term.as_str())) {
                add(path.as_str(), Signal::PathMatch, term.as_str(), weights.path);
            }

            for facts in store.all_facts() {
                if !facts.doc_excerpt.is_empty() && facts.doc_excerpt.to_lowercase().contains(term.as_str()) {
                    add(facts.path.as_str(), Signal::DocMatch, term.as_str(), weights.doc);
                }
            }
        }

        candidates
    }

    fn apply_related_boost(&self, store: &IndexStore, candidates: &mut BTreeMap<String, Candidate>) {
        let best = candidates.values().map(|c| c.score).fold(0.0_f64, f64::max);
        if best <= 0.0 {
            return;
        }
        let threshold = best * self.config.seed_ratio;
        let seeds: Vec<(String, f64)> = candidates
            .values()
            .filter(|c| c.score >= threshold)
            .map(|c| (c.path.clone(), c.score))
            .collect();

        let graph = ImportGraph::build(store);
        // One boost per file, from its strongest seed
        let mut boosts: BTreeMap<String, (String, f64)> = BTreeMap::new();
        for (seed, score) in &seeds {
            let boost = score * self.config.weights.related;
            let mut related: BTreeSet<String> = graph.neighbours(seed).into_iter().cloned().collect();
            related.extend(shared_symbol_neighbours(store, seed));
            for related in related {
                if related == *seed {
                    continue;
                }
                let entry = boosts.entry(related).or_insert_with(|| (seed.clone(), boost));
                if boost > entry.1 {
                    *entry = (seed.clone(), boost);
                }
            }
        }

        for (path, (seed, boost)) in boosts {
            candidates
                .entry(path.clone())
                .or_insert_with(|| Candidate::new(path))
                .add(Signal::Related, seed, boost);
        }
    }
}

/// Other files declaring one of the symbols `seed` declares.
fn shared_symbol_neighbours(store: &IndexStore, seed: &str) -> BTreeSet<String> {
    let Some(facts) = store.facts(seed) else {
        return BTreeSet::new();
    };
    facts
        .symbols
        .iter()
        .map(|symbol| store.symbol_search(symbol))
        .filter(|paths| paths.len() <= SHARED_SYMBOL_FANOUT)
        .flatten()
        .filter(|path| path != seed)
        .collect()
}

/// Raw imports of a file plus the indexed files they resolve to, and the files importing it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDependencies {
    pub path: String,
    pub imports: Vec<String>,
    pub resolved: Vec<String>,
    pub imported_by: Vec<String>,
}

/// `None` when `path` is not indexed.
pub fn dependencies_of(store: &IndexStore, path: &str) -> Option<FileDependencies> {
    let facts = store.facts(path)?;
    let graph = ImportGraph::build(store);
    let collect = |edges: &HashMap<String, BTreeSet<String>>| -> Vec<String> {
        edges
            .get(path)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    };
    Some(FileDependencies {
        path: path.to_string(),
        imports: facts.imports.clone(),
        resolved: collect(&graph.outgoing),
        imported_by: collect(&graph.incoming),
    })
}

/// Every file below `dir`, found by walking the adjacency index.
fn files_under(store: &IndexStore, dir: &str) -> Vec<String> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_string()];
    while let Some(current) = stack.pop() {
        for child in store.children_of(&current) {
            if store.contains(&child) {
                files.push(child);
            } else {
                stack.push(child);
            }
        }
    }
    files.sort();
    files
}

/// File-to-file edges derived from raw import targets, resolved best-effort.
struct ImportGraph {
    outgoing: HashMap<String, BTreeSet<String>>,
    incoming: HashMap<String, BTreeSet<String>>,
}

impl ImportGraph {
    fn build(store: &IndexStore) -> Self {
        let resolver = ImportResolver::new(store);
        let mut outgoing: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut incoming: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut cache: HashMap<&str, BTreeSet<String>> = HashMap::new();

        for facts in store.all_facts() {
            for target in &facts.imports {
                let resolved = cache
                    .entry(target.as_str())
                    .or_insert_with(|| resolver.resolve(target));
                for dest in resolved.iter() {
                    if *dest == facts.path {
                        continue;
                    }
                    outgoing.entry(facts.path.clone()).or_default().insert(dest.clone());
                    incoming.entry(dest.clone()).or_default().insert(facts.path.clone());
                }
            }
        }
        Self { outgoing, incoming }
    }

    fn neighbours(&self, path: &str) -> BTreeSet<&String> {
        self.outgoing
            .get(path)
            .into_iter()
            .chain(self.incoming.get(path))
            .flatten()
            .collect()
    }
}

/// Maps raw import targets to indexed files by module-path suffix, file stem, or declared symbol.
struct ImportResolver<'a> {
    store: &'a IndexStore,
    by_stem: HashMap<String, Vec<(&'a str, String)>>, // stem -> (path, path without extension)
}

impl<'a> ImportResolver<'a> {
    fn new(store: &'a IndexStore) -> Self {
        let mut by_stem: HashMap<String, Vec<(&'a str, String)>> = HashMap::new();
        for record in store.records() {
            let module = strip_source_extension(&record.path).to_lowercase();
            let mut stem = module.rsplit('/').next().unwrap_or(&module).to_string();
            // Package entry files stand for their directory
            if matches!(stem.as_str(), "mod" | "__init__" | "index" | "lib") {
                if let Some((parent, _)) = module.rsplit_once('/') {
                    stem = parent.rsplit('/').next().unwrap_or(parent).to_string();
                    by_stem
                        .entry(stem)
                        .or_default()
                        .push((record.path.as_str(), parent.to_string()));
                    continue;
                }
            }
            by_stem.entry(stem).or_default().push((record.path.as_str(), module));
        }
        Self { store, by_stem }
    }

    fn resolve(&self, target: &str) -> BTreeSet<String> {
        let mut resolved = BTreeSet::new();
        for module in expand_braces(target) {
            let segments = module_segments(&module);
            let Some(last) = segments.last() else { continue };

            let module_path = segments.join("/").to_lowercase();
            if let Some(files) = self.by_stem.get(&last.to_lowercase()) {
                let suffix_matches: Vec<&str> = files
                    .iter()
                    .filter(|(_, module)| ends_with_segments(module, &module_path))
                    .map(|(path, _)| *path)
                    .collect();
                if suffix_matches.is_empty() {
                    resolved.extend(files.iter().map(|(path, _)| path.to_string()));
                } else {
                    resolved.extend(suffix_matches.into_iter().map(str::to_string));
                }
            }
            resolved.extend(self.store.symbol_search(last));
        }
        resolved
    }
}

/// `crate::auth::{login, logout}` -> `crate::auth::login`, `crate::auth::logout`.
fn expand_braces(target: &str) -> Vec<String> {
    match (target.find('{'), target.rfind('}')) {
        (Some(open), Some(close)) if open < close => {
            let base = &target[..open];
            target[open + 1..close]
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| {
                    let name = name.split_whitespace().next().unwrap_or(name);
                    format!("{}{}", base, name)
                })
                .collect()
        }
        _ => vec![target.to_string()],
    }
}

fn module_segments(target: &str) -> Vec<String> {
    let target = target.trim().trim_matches(|c| c == '"' || c == '\'' || c == '<' || c == '>');
    let target = target.split_whitespace().next().unwrap_or(target);
    let target = strip_source_extension(target);
    target
        .split(|c| c == '/' || c == '.' || c == ':' || c == '\\')
        .filter(|s| !s.is_empty() && !matches!(*s, "*" | "crate" | "self" | "super"))
        .map(str::to_string)
        .collect()
}

fn strip_source_extension(path: &str) -> &str {
    if let Some((stem, ext)) = path.rsplit_once('.') {
        if !stem.is_empty() && !stem.ends_with('/') && !stem.ends_with('.') && LanguageTag::from_extension(ext).is_known() {
            return stem;
        }
    }
    path
}

fn ends_with_segments(module: &str, suffix: &str) -> bool {
    module == suffix
        || (module.len() > suffix.len()
            && module.ends_with(suffix)
            && module.as_bytes()[module.len() - suffix.len() - 1] == b'/')
}
