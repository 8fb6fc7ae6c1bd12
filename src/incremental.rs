//! Digest-based change detection for incremental indexing.
//!
//! A [`Baseline`] is captured from the store under one read lock; the walk's observed digests are
//! compared against it. File modification times are never consulted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::storage::IndexStore;
use crate::types::{Digest, ScanGeneration};

/// Path -> digest for every live record at one generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    pub generation: ScanGeneration,
    digests: BTreeMap<String, Digest>,
}

impl Baseline {
    pub fn capture(store: &IndexStore) -> Self {
        Self {
            generation: store.generation(),
            digests: store.digests(),
        }
    }

    pub fn from_digests(generation: ScanGeneration, digests: BTreeMap<String, Digest>) -> Self {
        Self { generation, digests }
    }

    pub fn digest(&self, path: &str) -> Option<&Digest> {
        self.digests.get(path)
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

/// Delta between a baseline and a walk. Every list is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: usize,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Paths that need extraction.
    pub fn to_extract(&self) -> impl Iterator<Item = &String> {
        self.added.iter().chain(self.modified.iter())
    }

    pub fn changed_count(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

pub struct ChangeDetector {
    baseline: Baseline,
}

impl ChangeDetector {
    pub fn new(baseline: Baseline) -> Self {
        Self { baseline }
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    /// True when the path is new or its digest differs from the baseline.
    pub fn is_changed(&self, path: &str, digest: &Digest) -> bool {
        self.baseline.digest(path) != Some(digest)
    }

    /// Compare observed digests with the baseline.
    ///
    /// With a `scope`, only baseline paths inside that subtree can be reported removed; paths the
    /// walk never visited are not evidence of deletion.
    pub fn diff(&self, observed: &BTreeMap<String, Digest>, scope: Option<&str>) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for (path, digest) in observed {
            match self.baseline.digest(path) {
                None => changes.added.push(path.clone()),
                Some(previous) if previous != digest => changes.modified.push(path.clone()),
                Some(_) => changes.unchanged += 1,
            }
        }

        for path in self.baseline.digests.keys() {
            if in_scope(path, scope) && !observed.contains_key(path) {
                changes.removed.push(path.clone());
            }
        }

        // BTreeMap iteration already yields sorted paths
        changes
    }
}

fn in_scope(path: &str, scope: Option<&str>) -> bool {
    match scope.map(|s| s.trim_matches('/')) {
        None | Some("") => true,
        Some(scope) => {
            path == scope || (path.len() > scope.len() && path.starts_with(scope) && path.as_bytes()[scope.len()] == b'/')
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digests(entries: &[(&str, &str)]) -> BTreeMap<String, Digest> {
        entries
            .iter()
            .map(|(path, content)| (path.to_string(), Digest::of(content.as_bytes())))
            .collect()
    }

    #[test]
    fn test_unchanged_tree_has_empty_delta() {
        let observed = digests(&[("a.py", "a"), ("b/c.py", "c")]);
        let detector = ChangeDetector::new(Baseline::from_digests(ScanGeneration(1), observed.clone()));

        let changes = detector.diff(&observed, None);
        assert!(changes.is_empty());
        assert_eq!(changes.unchanged, 2);
    }

    #[test]
    fn test_added_modified_removed() {
        let baseline = digests(&[("auth/login.py", "login"), ("auth/session.py", "v1"), ("gone.py", "x")]);
        let detector = ChangeDetector::new(Baseline::from_digests(ScanGeneration(1), baseline));
        let observed = digests(&[("auth/login.py", "login"), ("auth/session.py", "v2"), ("new.py", "n")]);

        let changes = detector.diff(&observed, None);
        assert_eq!(changes.added, vec!["new.py"]);
        assert_eq!(changes.modified, vec!["auth/session.py"]);
        assert_eq!(changes.removed, vec!["gone.py"]);
        assert_eq!(changes.unchanged, 1);
        assert_eq!(changes.to_extract().count(), 2);
        assert_eq!(changes.changed_count(), 3);
    }

    #[test]
    fn test_scoped_diff_only_removes_inside_scope() {
        let baseline = digests(&[("src/a.rs", "a"), ("src/b.rs", "b"), ("srcx/c.rs", "c"), ("docs/d.md", "d")]);
        let detector = ChangeDetector::new(Baseline::from_digests(ScanGeneration(1), baseline));
        let observed = digests(&[("src/a.rs", "a")]);

        let changes = detector.diff(&observed, Some("src/"));
        assert_eq!(changes.removed, vec!["src/b.rs"]);
        assert!(changes.added.is_empty());
    }

    #[test]
    fn test_diff_is_deterministic() {
        let detector = ChangeDetector::new(Baseline::from_digests(ScanGeneration(3), digests(&[("z.rs", "1"), ("a.rs", "1")])));
        let observed = digests(&[("m.rs", "2"), ("b.rs", "2")]);
        let first = detector.diff(&observed, None);
        let second = detector.diff(&observed, None);
        assert_eq!(first, second);
        assert_eq!(first.added, vec!["b.rs", "m.rs"]);
        assert_eq!(first.removed, vec!["a.rs", "z.rs"]);
    }

    #[test]
    fn test_is_changed() {
        let detector = ChangeDetector::new(Baseline::from_digests(ScanGeneration(1), digests(&[("a.rs", "a")])));
        assert!(!detector.is_changed("a.rs", &Digest::of(b"a")));
        assert!(detector.is_changed("a.rs", &Digest::of(b"b")));
        assert!(detector.is_changed("new.rs", &Digest::of(b"a")));
    }
}
