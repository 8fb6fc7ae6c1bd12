//! Layered configuration: built-in defaults, an optional TOML file, then `REPOLENS_*` environment
//! overrides (`REPOLENS_RANKING__TOP_K=20`).

use crate::error::{RepoLensError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "REPOLENS";

const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // VCS and editor metadata
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    // Dependency caches and build output
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".next",
    // Binary assets
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.ico",
    "*.bmp",
    "*.pdf",
    "*.zip",
    "*.tar",
    "*.gz",
    "*.7z",
    "*.exe",
    "*.dll",
    "*.so",
    "*.dylib",
    "*.o",
    "*.a",
    "*.class",
    "*.jar",
    "*.pyc",
    "*.wasm",
    "*.woff",
    "*.woff2",
    "*.ttf",
    "*.mp3",
    "*.mp4",
    "*.min.js",
];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoLensConfig {
    pub scanning: ScanningConfig,
    pub indexing: IndexingConfig,
    pub ranking: RankingConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// Glob patterns. A pattern is tested against both the root-relative path and the bare name.
    pub ignore_patterns: Vec<String>,
    pub max_file_size: u64,
    pub max_depth: Option<usize>,
    pub follow_symlinks: bool,
    pub respect_gitignore: bool,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            max_file_size: 1024 * 1024,
            max_depth: None,
            follow_symlinks: false,
            respect_gitignore: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Extraction workers; 0 means one per CPU.
    pub workers: usize,
    /// Generations a removed file's tombstone survives before it is purged.
    pub grace_generations: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            grace_generations: 3,
        }
    }
}

impl IndexingConfig {
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub top_k: usize,
    pub max_query_len: usize,
    /// A candidate seeds topological boosts when its direct score reaches this share of the best one.
    pub seed_ratio: f64,
    pub weights: SignalWeights,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            max_query_len: 512,
            seed_ratio: 0.5,
            weights: SignalWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub symbol_exact: f64,
    pub symbol_partial: f64,
    pub import: f64,
    pub path: f64,
    pub doc: f64,
    /// Fraction of a seed's score granted to structurally related files.
    pub related: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            symbol_exact: 6.0,
            symbol_partial: 3.5,
            import: 2.5,
            path: 1.5,
            doc: 0.75,
            related: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl CacheConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            project_dirs()
                .map(|dirs| dirs.cache_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".repolens-cache"))
        })
    }
}

impl RepoLensConfig {
    /// Load defaults, then `path` (if it exists), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );

        let loaded: RepoLensConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Load from the default location, falling back to defaults when nothing is there.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        Self::load(path.as_deref())
    }

    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.scanning.max_file_size == 0 {
            return Err(RepoLensError::Config("scanning.max_file_size must be positive".into()));
        }
        if self.ranking.top_k == 0 {
            return Err(RepoLensError::Config("ranking.top_k must be positive".into()));
        }
        if self.ranking.max_query_len == 0 {
            return Err(RepoLensError::Config("ranking.max_query_len must be positive".into()));
        }
        if !(self.ranking.seed_ratio > 0.0 && self.ranking.seed_ratio <= 1.0) {
            return Err(RepoLensError::Config("ranking.seed_ratio must be in (0, 1]".into()));
        }

        let w = &self.ranking.weights;
        let all = [w.symbol_exact, w.symbol_partial, w.import, w.path, w.doc, w.related];
        if all.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(RepoLensError::Config("ranking weights must be positive".into()));
        }
        if !(w.symbol_exact > w.symbol_partial && w.symbol_partial > w.import && w.import > w.path) {
            return Err(RepoLensError::Config(
                "ranking weights must satisfy symbol_exact > symbol_partial > import > path".into(),
            ));
        }
        if w.related >= 1.0 {
            return Err(RepoLensError::Config("ranking.weights.related must be below 1.0".into()));
        }
        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "repolens", "repolens")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = RepoLensConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ranking.top_k, 10);
        assert!(config.scanning.ignore_patterns.iter().any(|p| p == "node_modules"));
        assert!(config.indexing.effective_workers() >= 1);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repolens.toml");
        std::fs::write(
            &path,
            "[ranking]\ntop_k = 3\n\n[indexing]\nworkers = 2\ngrace_generations = 0\n",
        )
        .unwrap();

        let config = RepoLensConfig::load(Some(&path)).unwrap();
        assert_eq!(config.ranking.top_k, 3);
        assert_eq!(config.indexing.workers, 2);
        assert_eq!(config.indexing.grace_generations, 0);
        // Untouched sections keep their defaults
        assert_eq!(config.ranking.max_query_len, 512);
        assert!(config.scanning.respect_gitignore);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RepoLensConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.ranking, RankingConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = RepoLensConfig::default();
        config.ranking.top_k = 7;
        config.scanning.max_depth = Some(4);
        config.save(&path).unwrap();

        let loaded = RepoLensConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.ranking.top_k, 7);
        assert_eq!(loaded.scanning.max_depth, Some(4));
    }

    #[test]
    fn test_weight_ordering_is_enforced() {
        let mut config = RepoLensConfig::default();
        config.ranking.weights.path = 10.0;
        assert!(matches!(config.validate(), Err(RepoLensError::Config(_))));

        let mut config = RepoLensConfig::default();
        config.ranking.weights.related = 1.5;
        assert!(config.validate().is_err());

        let mut config = RepoLensConfig::default();
        config.ranking.seed_ratio = 0.0;
        assert!(config.validate().is_err());
    }
}
