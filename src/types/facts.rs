use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Best-effort structural summary of one file.
///
/// `path` is a lookup key into the owning [`FileRecord`](super::FileRecord), never an owning
/// reference, so removing the record is a single well-defined operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralFacts {
    pub path: String,
    pub symbols: BTreeSet<String>,
    pub imports: Vec<String>,
    pub doc_excerpt: String,
}

impl StructuralFacts {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            symbols: BTreeSet::new(),
            imports: Vec::new(),
            doc_excerpt: String::new(),
        }
    }

    /// Facts used when extraction fails outright: nothing but the owning path.
    pub fn minimal(path: impl Into<String>) -> Self {
        Self::new(path)
    }

    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols.extend(symbols.into_iter().map(Into::into));
        self
    }

    pub fn with_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for import in imports {
            self.push_import(import.into());
        }
        self
    }

    pub fn with_doc_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.doc_excerpt = excerpt.into();
        self
    }

    /// Append an import target, keeping first-occurrence order and dropping duplicates.
    pub fn push_import(&mut self, target: String) {
        let target = target.trim();
        if target.is_empty() || self.imports.iter().any(|existing| existing == target) {
            return;
        }
        self.imports.push(target.to_string());
    }

    pub fn import_set(&self) -> HashSet<&str> {
        self.imports.iter().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.imports.is_empty() && self.doc_excerpt.is_empty()
    }
}
