//! Structural fact extraction.
//!
//! Each language maps to an [`ExtractionStrategy`]: a lexical rule set when one exists, otherwise
//! the fallback that keeps only a doc excerpt. Adding a language means adding a rule set and a
//! match arm in [`lexical::rules_for`].

pub mod doc;
pub mod lexical;

use crate::error::{RepoLensError, Result};
use crate::types::{LanguageTag, StructuralFacts};

pub use doc::DOC_EXCERPT_MAX_CHARS;
pub use lexical::RuleSet;

#[derive(Debug, Clone, Copy)]
pub enum ExtractionStrategy {
    Lexical(&'static RuleSet),
    /// No symbols or imports; the doc excerpt is the file's leading text.
    Fallback,
}

impl ExtractionStrategy {
    pub fn for_language(language: LanguageTag) -> Self {
        match lexical::rules_for(language) {
            Some(rules) => Self::Lexical(rules),
            None => Self::Fallback,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Lexical(rules) => rules.language.as_str(),
            Self::Fallback => "fallback",
        }
    }

    pub fn apply(&self, path: &str, text: &str) -> StructuralFacts {
        match self {
            Self::Lexical(rules) => rules.apply(path, text),
            Self::Fallback => StructuralFacts::new(path).with_doc_excerpt(doc::leading_text(text)),
        }
    }
}

/// Derive facts from file bytes. Deterministic: identical inputs give identical facts.
///
/// Fails only when the bytes are not text; callers record the failure and index
/// [`StructuralFacts::minimal`] instead.
pub fn extract(path: &str, bytes: &[u8], language: LanguageTag) -> Result<StructuralFacts> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        RepoLensError::extraction(path, format!("not valid UTF-8 (first bad byte at offset {})", e.valid_up_to()))
    })?;
    if text.contains('\0') {
        return Err(RepoLensError::extraction(path, "binary content (NUL byte)"));
    }
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    Ok(ExtractionStrategy::for_language(language).apply(path, text))
}

/// [`extract`], degrading to minimal facts. The error, if any, is returned alongside.
pub fn extract_or_minimal(path: &str, bytes: &[u8], language: LanguageTag) -> (StructuralFacts, Option<RepoLensError>) {
    match extract(path, bytes, language) {
        Ok(facts) => (facts, None),
        Err(err) => (StructuralFacts::minimal(path), Some(err)),
    }
}
