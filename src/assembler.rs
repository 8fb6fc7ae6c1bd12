//! Answer assembly: ranked candidates joined with their records and facts, handed to an
//! [`Explainer`] for prose. Also file-level views (overview, line windows) for the tool surface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::analyzers::extract_or_minimal;
use crate::config::ScanningConfig;
use crate::error::{RepoLensError, Result};
use crate::storage::snapshot::canonical_root;
use crate::storage::IndexStore;
use crate::types::{Candidate, Digest, FileRecord, LanguageTag, StructuralFacts};

pub const PREVIEW_LINES: usize = 25;
pub const DEFAULT_SLICE_LINES: usize = 50;
const OVERVIEW_MAX_IMPORTS: usize = 8;
const OVERVIEW_MAX_SYMBOLS: usize = 12;
const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub candidate: Candidate,
    pub record: FileRecord,
    pub facts: StructuralFacts,
}

/// Everything the explanation collaborator receives for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPackage {
    pub query: String,
    pub candidates: Vec<AnswerEntry>,
}

impl AnswerPackage {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Turns an answer package into prose. Implementations may call out to a language model.
#[async_trait]
pub trait Explainer: Send + Sync {
    fn name(&self) -> &str;

    async fn explain(&self, package: &AnswerPackage) -> Result<String>;
}

/// Deterministic explainer built from the rationale alone.
#[derive(Debug, Clone, Default)]
pub struct TemplateExplainer;

#[async_trait]
impl Explainer for TemplateExplainer {
    fn name(&self) -> &str {
        "template"
    }

    async fn explain(&self, package: &AnswerPackage) -> Result<String> {
        Ok(render_template(package))
    }
}

pub fn render_template(package: &AnswerPackage) -> String {
    if package.is_empty() {
        return format!("No indexed files matched '{}'.", package.query);
    }

    let mut out = format!("Recommended files for: '{}'\n\n", package.query);
    for (i, entry) in package.candidates.iter().enumerate() {
        out.push_str(&format!(
            "  {}. {} (relevance: {:.1})\n",
            i + 1,
            entry.candidate.path,
            entry.candidate.score
        ));

        let reasons: Vec<String> = entry
            .candidate
            .rationale
            .iter()
            .map(|r| format!("{} '{}' +{:.2}", r.signal, r.detail, r.contribution))
            .collect();
        out.push_str(&format!("     why: {}\n", reasons.join(", ")));

        if !entry.facts.doc_excerpt.is_empty() {
            out.push_str(&format!("     about: {}\n", entry.facts.doc_excerpt));
        }
    }
    out.push_str("\nUse explain_file to see what each file contains.");
    out
}

/// Structure summary and preview of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOverview {
    pub path: String,
    pub language: LanguageTag,
    pub extension: Option<String>,
    pub size: u64,
    pub lines: usize,
    pub imports: Vec<String>,
    pub symbols: Vec<String>,
    pub doc_excerpt: String,
    pub preview: Vec<String>,
    /// True when the facts came from the index rather than a fresh extraction.
    pub indexed: bool,
}

impl fmt::Display for FileOverview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.path)?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(
            f,
            "Lines: {} | Extension: {} | Language: {}",
            self.lines,
            self.extension.as_deref().map(|e| format!(".{}", e)).unwrap_or_default(),
            self.language
        )?;
        writeln!(f)?;

        if !self.doc_excerpt.is_empty() {
            writeln!(f, "About: {}", self.doc_excerpt)?;
            writeln!(f)?;
        }
        if !self.imports.is_empty() {
            writeln!(f, "Imports:")?;
            for import in self.imports.iter().take(OVERVIEW_MAX_IMPORTS) {
                writeln!(f, "  - {}", import)?;
            }
            writeln!(f)?;
        }
        if !self.symbols.is_empty() {
            writeln!(f, "Symbols:")?;
            for symbol in self.symbols.iter().take(OVERVIEW_MAX_SYMBOLS) {
                writeln!(f, "  - {}", symbol)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "Preview (first {} lines):", PREVIEW_LINES)?;
        writeln!(f, "{}", "-".repeat(RULE_WIDTH))?;
        write!(f, "{}", self.preview.join("\n"))?;
        if self.lines > self.preview.len() {
            write!(f, "\n\n... ({} more lines)", self.lines - self.preview.len())?;
        }
        Ok(())
    }
}

/// A numbered window of a file's lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSlice {
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub total_lines: usize,
    pub lines: Vec<String>,
}

impl fmt::Display for FileSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (lines {}-{}):", self.path, self.start_line, self.end_line)?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        for (i, line) in self.lines.iter().enumerate() {
            writeln!(f, "{:4} | {}", self.start_line + i, line)?;
        }
        if self.end_line < self.total_lines {
            write!(f, "\n... ({} more lines)", self.total_lines - self.end_line)?;
        }
        Ok(())
    }
}

/// Reads from one repository root and joins ranking output with index contents.
///
/// File reads resolve symlinks and must land inside the root; files above `max_file_size` are
/// refused, matching what the scanner would index.
#[derive(Debug, Clone)]
pub struct AnswerAssembler {
    root: PathBuf,
    max_file_size: u64,
}

impl AnswerAssembler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_file_size: ScanningConfig::default().max_file_size,
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidates whose record vanished since ranking are dropped.
    pub fn assemble(&self, query: &str, candidates: Vec<Candidate>, store: &IndexStore) -> AnswerPackage {
        let candidates = candidates
            .into_iter()
            .filter_map(|candidate| {
                let record = store.lookup(&candidate.path)?.clone();
                let facts = store.facts(&candidate.path)?.clone();
                Some(AnswerEntry {
                    candidate,
                    record,
                    facts,
                })
            })
            .collect();

        AnswerPackage {
            query: query.to_string(),
            candidates,
        }
    }

    /// Overview of `path`. Uses indexed facts when the file is unchanged since indexing,
    /// otherwise extracts afresh.
    pub fn explain_file(&self, path: &str, store: &IndexStore) -> Result<FileOverview> {
        let (rel, bytes) = self.read_file(path)?;
        let text = String::from_utf8_lossy(&bytes);
        let all_lines: Vec<&str> = text.lines().collect();

        let language = LanguageTag::from_path(Path::new(&rel));
        let digest = Digest::of(&bytes);
        let indexed = store
            .lookup(&rel)
            .filter(|record| record.digest == digest)
            .and_then(|_| store.facts(&rel))
            .cloned();
        let (facts, indexed) = match indexed {
            Some(facts) => (facts, true),
            None => (extract_or_minimal(&rel, &bytes, language).0, false),
        };

        let extension = Path::new(&rel)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_string);

        Ok(FileOverview {
            path: rel,
            language,
            extension,
            size: bytes.len() as u64,
            lines: all_lines.len(),
            imports: facts.imports,
            symbols: facts.symbols.into_iter().collect(),
            doc_excerpt: facts.doc_excerpt,
            preview: all_lines.iter().take(PREVIEW_LINES).map(|l| l.to_string()).collect(),
            indexed,
        })
    }

    /// Lines `start_line..start_line + num_lines` (1-based) of `path`.
    pub fn file_slice(&self, path: &str, start_line: usize, num_lines: usize) -> Result<FileSlice> {
        let (rel, bytes) = self.read_file(path)?;
        let text = String::from_utf8_lossy(&bytes);
        let all_lines: Vec<&str> = text.lines().collect();

        let start_idx = start_line.max(1) - 1;
        let end_idx = all_lines.len().min(start_idx.saturating_add(num_lines));
        let lines: Vec<String> = if start_idx < end_idx {
            all_lines[start_idx..end_idx].iter().map(|l| l.to_string()).collect()
        } else {
            Vec::new()
        };

        Ok(FileSlice {
            path: rel,
            start_line: start_idx + 1,
            end_line: start_idx + lines.len(),
            total_lines: all_lines.len(),
            lines,
        })
    }

    fn read_file(&self, path: &str) -> Result<(String, Vec<u8>)> {
        let rel = normalize_relative(path)?;
        let resolved = match fs::canonicalize(self.root.join(&rel)) {
            Ok(resolved) => resolved,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(RepoLensError::access(rel, format!("file not found in {}", self.root.display())));
            }
            Err(err) => return Err(RepoLensError::access(rel, err)),
        };
        if !resolved.starts_with(canonical_root(&self.root)) {
            return Err(RepoLensError::access(rel, "path resolves outside the repository root"));
        }

        let meta = fs::metadata(&resolved).map_err(|e| RepoLensError::access(rel.as_str(), e))?;
        if !meta.is_file() {
            return Err(RepoLensError::access(rel, "is not a file"));
        }
        if meta.len() > self.max_file_size {
            return Err(RepoLensError::access(
                rel,
                format!("{} bytes exceeds the {} byte limit", meta.len(), self.max_file_size),
            ));
        }

        let bytes = fs::read(&resolved).map_err(|e| RepoLensError::access(rel.as_str(), e))?;
        Ok((rel, bytes))
    }
}

/// Root-relative `/`-separated form of a caller-supplied path; refuses to leave the root.
fn normalize_relative(path: &str) -> Result<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(&path.replace('\\', "/")).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(RepoLensError::access(path, "path must stay inside the repository root")),
        }
    }
    if parts.is_empty() {
        return Err(RepoLensError::access(path, "empty path"));
    }
    Ok(parts.join("/"))
}
