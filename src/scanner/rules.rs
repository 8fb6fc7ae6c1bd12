use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{RepoLensError, Result};

/// Caller-supplied glob patterns. `.gitignore` files are applied by the walk itself.
///
/// Each glob is tested against the root-relative path and against the bare entry name, so
/// `node_modules` prunes that directory at any depth while `docs/**/*.md` stays anchored.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    globs: GlobSet,
    patterns: Vec<String>,
}

impl IgnoreRules {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim().trim_end_matches('/');
            if pattern.is_empty() {
                continue;
            }
            let glob = Glob::new(pattern)
                .map_err(|e| RepoLensError::Config(format!("Invalid ignore pattern '{}': {}", pattern, e)))?;
            builder.add(glob);
            kept.push(pattern.to_string());
        }
        let globs = builder
            .build()
            .map_err(|e| RepoLensError::Config(format!("Failed to build ignore rules: {}", e)))?;

        Ok(Self {
            globs,
            patterns: kept,
        })
    }

    pub fn empty() -> Self {
        Self {
            globs: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// `rel_path` is root-relative and `/`-separated.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        if self.globs.is_empty() {
            return false;
        }
        if self.globs.is_match(rel_path) {
            return true;
        }
        let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        self.globs.is_match(name)
    }
}
