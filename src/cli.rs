use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::{
    cli_types::{ConfigArgs, ExplainArgs, FindArgs, QueryArgs, ScanArgs},
    config::RepoLensConfig,
    indexer::IndexReport,
    lens::RepoLens,
    types::Candidate,
};

pub struct CliApp {
    config: RepoLensConfig,
    config_path: Option<PathBuf>,
    verbose: bool,
}

impl CliApp {
    pub fn new(config: RepoLensConfig, config_path: Option<PathBuf>, verbose: bool, colors_enabled: bool) -> Self {
        info!("Initializing repolens CLI");
        if !colors_enabled {
            colored::control::set_override(false);
        }
        Self {
            config,
            config_path,
            verbose,
        }
    }

    /// Load the configuration from `path` (or the default location) and build the app.
    pub fn from_config_file(path: Option<PathBuf>, verbose: bool, colors_enabled: bool) -> Result<Self> {
        let config_path = path.or_else(RepoLensConfig::default_path);
        let config = RepoLensConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
        Ok(Self::new(config, config_path, verbose, colors_enabled))
    }

    pub fn disable_cache(&mut self) {
        self.config.cache.enabled = false;
    }

    fn lens(&self) -> Result<RepoLens> {
        RepoLens::builder()
            .with_config(self.config.clone())
            .build()
            .context("Invalid configuration")
    }

    /// Build a lens and bring its index up to date for `path`.
    async fn scanned_lens(&self, path: &Path) -> Result<(RepoLens, IndexReport)> {
        let lens = self.lens()?;
        let report = lens
            .scan(path)
            .await
            .with_context(|| format!("Failed to scan {}", path.display()))?;
        if self.verbose {
            self.print_info(&format!(
                "Index up to date: {} files, {} changed",
                lens.stats().total_files,
                report.added.len() + report.modified.len() + report.removed.len()
            ));
        }
        Ok((lens, report))
    }

    pub async fn scan(&mut self, args: ScanArgs) -> Result<()> {
        let start_time = Instant::now();

        self.config.scanning.ignore_patterns.extend(args.ignore.iter().cloned());
        if let Some(workers) = args.workers {
            self.config.indexing.workers = workers;
        }

        let lens = self.lens()?;
        let report = match &args.scope {
            // Only the subtree is walked; the rest of the index comes from the snapshot, if any
            Some(scope) => {
                let scoped = lens.clone();
                let root = args.path.clone();
                let scope = scope.clone();
                tokio::task::spawn_blocking(move || {
                    scoped.bind_root(&root)?;
                    scoped.scan_subtree(&scope)
                })
                .await
                .context("Scan task failed")?
                .with_context(|| format!("Failed to scan {}", args.path.display()))?
            }
            None => lens
                .scan(&args.path)
                .await
                .with_context(|| format!("Failed to scan {}", args.path.display()))?,
        };

        if args.json {
            println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize report")?);
            return Ok(());
        }

        self.print_header("Repository Scan");
        self.print_report(&report);
        let stats = lens.stats();
        if self.verbose {
            for (language, count) in &stats.languages {
                self.print_info(&format!("  {}: {} files", language, count));
            }
            if let Some(path) = lens.snapshot_path() {
                self.print_info(&format!("Snapshot: {}", path.display()));
            }
        }
        self.print_success(&format!(
            "{} files indexed, {} symbols, generation {} ({:?})",
            stats.total_files,
            stats.total_symbols,
            stats.generation,
            start_time.elapsed()
        ));
        Ok(())
    }

    pub async fn query(&self, args: QueryArgs) -> Result<()> {
        let (lens, _) = self.scanned_lens(&args.path).await?;

        if args.limit.is_some() || args.folder.is_some() {
            let limit = args.limit.unwrap_or(lens.config().ranking.top_k);
            let candidates = lens.query_in(&args.text, limit, args.folder.as_deref())?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&candidates)?);
            } else {
                self.print_candidates(&args.text, &candidates);
            }
            return Ok(());
        }

        let answer = lens.answer(&args.text).await?;
        if args.json {
            println!("{}", answer.package.to_json()?);
        } else {
            println!("{}", answer.explanation);
        }
        Ok(())
    }

    pub async fn explain(&self, args: ExplainArgs) -> Result<()> {
        let (lens, _) = self.scanned_lens(&args.path).await?;

        match args.start {
            Some(start) => println!("{}", lens.file_slice(&args.file, start, args.lines)?),
            None => println!("{}", lens.explain_file(&args.file)?),
        }
        Ok(())
    }

    pub async fn find(&self, args: FindArgs) -> Result<()> {
        let (lens, _) = self.scanned_lens(&args.path).await?;

        if args.files {
            let matches = lens.fuzzy_find_files_in(&args.pattern, args.limit, args.folder.as_deref())?;
            if matches.is_empty() {
                self.print_warning(&format!("No files match '{}'", args.pattern));
            }
            for (path, score) in matches {
                println!("{}  {}", path.bold(), format!("({})", score).dimmed());
            }
        } else {
            let matches = lens.find_definitions_in(&args.pattern, args.limit, args.folder.as_deref())?;
            if matches.is_empty() {
                self.print_warning(&format!("No definitions match '{}'", args.pattern));
            }
            for found in matches {
                println!("{}  {}", found.symbol.cyan(), found.path);
            }
        }
        Ok(())
    }

    pub async fn show_config(&self, args: ConfigArgs) -> Result<()> {
        self.print_header("Configuration");
        println!("{}", toml::to_string_pretty(&self.config).context("Failed to serialize configuration")?);

        match &self.config_path {
            Some(path) if path.exists() => self.print_info(&format!("Loaded from: {}", path.display())),
            Some(path) => self.print_info(&format!("No file at {} (using defaults)", path.display())),
            None => self.print_info("No config path available (using defaults)"),
        }
        if self.config.cache.enabled {
            self.print_info(&format!("Snapshot cache: {}", self.config.cache.resolved_dir().display()));
        } else {
            self.print_info("Snapshot cache: disabled");
        }

        if args.save {
            let path = self
                .config_path
                .clone()
                .context("No config path available to save to")?;
            self.config.save(&path)?;
            self.print_success(&format!("Saved configuration to {}", path.display()));
        }
        Ok(())
    }

    fn print_report(&self, report: &IndexReport) {
        println!(
            "{} added, {} modified, {} removed, {} unchanged",
            report.added.len().to_string().green(),
            report.modified.len().to_string().yellow(),
            report.removed.len().to_string().red(),
            report.unchanged
        );
        if report.ignored + report.oversized > 0 {
            self.print_info(&format!("Ignored {} paths, {} oversized files", report.ignored, report.oversized));
        }
        for issue in &report.skipped {
            self.print_warning(&format!("Skipped {}: {}", issue.path, issue.reason));
        }
        for issue in &report.degraded {
            self.print_warning(&format!("Indexed {} without structure: {}", issue.path, issue.reason));
        }
        if self.verbose {
            for path in report.added.iter().chain(report.modified.iter()) {
                self.print_info(&format!("  indexed {}", path));
            }
            for path in &report.removed {
                self.print_info(&format!("  removed {}", path));
            }
        }
    }

    fn print_candidates(&self, query: &str, candidates: &[Candidate]) {
        if candidates.is_empty() {
            self.print_warning(&format!("No indexed files matched '{}'", query));
            return;
        }
        for (i, candidate) in candidates.iter().enumerate() {
            println!("{:>3}. {} {}", i + 1, candidate.path.bold(), format!("({:.1})", candidate.score).dimmed());
            if self.verbose {
                for reason in &candidate.rationale {
                    println!("       {} {} (+{:.2})", reason.signal.as_str().cyan(), reason.detail, reason.contribution);
                }
            }
        }
    }

    // Output helpers
    fn print_header(&self, title: &str) {
        println!("{}", title.bold().underline());
    }

    fn print_success(&self, message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    fn print_info(&self, message: &str) {
        println!("{}", message.dimmed());
    }

    fn print_warning(&self, message: &str) {
        eprintln!("{} {}", "!".yellow().bold(), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_app(cache: &TempDir) -> CliApp {
        let mut config = RepoLensConfig::default();
        config.cache.dir = Some(cache.path().to_path_buf());
        config.indexing.workers = 2;
        CliApp::new(config, None, false, false)
    }

    fn create_test_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.rs"), "mod util;\nfn main() { util::helper(); }\n").unwrap();
        fs::write(dir.path().join("util.rs"), "/// Helpers.\npub fn helper() {}\n").unwrap();
        dir
    }

    fn scan_args(path: &Path) -> ScanArgs {
        ScanArgs {
            path: path.to_path_buf(),
            scope: None,
            ignore: vec![],
            workers: None,
            json: false,
        }
    }

    #[tokio::test]
    async fn test_scan_directory() {
        let repo = create_test_repo();
        let cache = TempDir::new().unwrap();
        let mut app = create_test_app(&cache);

        assert!(app.scan(scan_args(repo.path())).await.is_ok());
        // The snapshot lands in the configured cache directory
        assert!(fs::read_dir(cache.path()).unwrap().next().is_some());
    }

    #[tokio::test]
    async fn test_scan_missing_root_fails() {
        let cache = TempDir::new().unwrap();
        let mut app = create_test_app(&cache);
        assert!(app.scan(scan_args(Path::new("/definitely/not/here"))).await.is_err());
    }

    #[tokio::test]
    async fn test_query_explain_find() {
        let repo = create_test_repo();
        let cache = TempDir::new().unwrap();
        let app = create_test_app(&cache);

        let query = QueryArgs {
            path: repo.path().to_path_buf(),
            text: "helper".to_string(),
            limit: None,
            folder: None,
            json: true,
        };
        assert!(app.query(query).await.is_ok());

        let explain = ExplainArgs {
            path: repo.path().to_path_buf(),
            file: "util.rs".to_string(),
            start: None,
            lines: 10,
        };
        assert!(app.explain(explain).await.is_ok());

        let missing = ExplainArgs {
            path: repo.path().to_path_buf(),
            file: "nope.rs".to_string(),
            start: Some(1),
            lines: 10,
        };
        assert!(app.explain(missing).await.is_err());

        let find = FindArgs {
            path: repo.path().to_path_buf(),
            pattern: "helper".to_string(),
            files: false,
            limit: 5,
            folder: None,
        };
        assert!(app.find(find).await.is_ok());
    }

    #[tokio::test]
    async fn test_config_save() {
        let cache = TempDir::new().unwrap();
        let path = cache.path().join("config.toml");
        let app = CliApp::new(RepoLensConfig::default(), Some(path.clone()), false, false);

        app.show_config(ConfigArgs { save: true }).await.unwrap();
        assert_eq!(RepoLensConfig::load(Some(&path)).unwrap(), RepoLensConfig::default());
    }

    #[tokio::test]
    async fn test_scoped_scan_walks_only_the_scope() {
        let repo = create_test_repo();
        fs::create_dir_all(repo.path().join("auth")).unwrap();
        fs::write(repo.path().join("auth/login.py"), "def login(): pass\n").unwrap();
        let cache = TempDir::new().unwrap();
        let mut app = create_test_app(&cache);

        let mut args = scan_args(repo.path());
        args.scope = Some("auth".to_string());
        args.json = true;
        app.scan(args).await.unwrap();

        // The snapshot written by the scoped pass holds only the scope
        let lens = app.lens().unwrap();
        assert!(lens.load_snapshot(repo.path()).unwrap());
        let index = lens.index();
        let store = index.read();
        assert_eq!(store.len(), 1);
        assert!(store.contains("auth/login.py"));
        assert!(!store.contains("main.rs"));
    }

    #[tokio::test]
    async fn test_query_and_find_in_folder() {
        let repo = create_test_repo();
        fs::create_dir_all(repo.path().join("tools")).unwrap();
        fs::write(repo.path().join("tools/gen.rs"), "pub fn helper_gen() {}\n").unwrap();
        let cache = TempDir::new().unwrap();
        let app = create_test_app(&cache);

        let query = QueryArgs {
            path: repo.path().to_path_buf(),
            text: "helper".to_string(),
            limit: None,
            folder: Some("tools".to_string()),
            json: true,
        };
        assert!(app.query(query).await.is_ok());

        let find = FindArgs {
            path: repo.path().to_path_buf(),
            pattern: "helper".to_string(),
            files: false,
            limit: 5,
            folder: Some("missing".to_string()),
        };
        assert!(app.find(find).await.is_err());
    }
}
