use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "repolens", version, about = "Index a repository and ask which files matter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML). Defaults to the per-user config path
    #[arg(short, long, global = true, env = "REPOLENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print extra detail
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Do not read or write the snapshot cache
    #[arg(long, global = true)]
    pub no_cache: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Index a repository, re-extracting only changed files
    Scan(ScanArgs),
    /// Rank the files most relevant to a question
    Query(QueryArgs),
    /// Summarize one file
    Explain(ExplainArgs),
    /// Look up symbol definitions or fuzzy-match file paths
    Find(FindArgs),
    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Repository root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Walk only this root-relative subtree; the rest of the index is kept from the snapshot
    #[arg(long)]
    pub scope: Option<String>,

    /// Additional ignore patterns
    #[arg(short, long = "ignore")]
    pub ignore: Vec<String>,

    /// Extraction workers (0 = one per CPU)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct QueryArgs {
    /// Repository root
    pub path: PathBuf,

    /// The question, e.g. "where is login handled?"
    pub text: String,

    /// Maximum number of files
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Only rank files under this root-relative folder
    #[arg(long)]
    pub folder: Option<String>,

    /// Print the answer package as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ExplainArgs {
    /// Repository root
    pub path: PathBuf,

    /// Root-relative file path
    pub file: String,

    /// Print lines START..START+LINES instead of the overview
    #[arg(long)]
    pub start: Option<usize>,

    #[arg(long, default_value_t = crate::assembler::DEFAULT_SLICE_LINES)]
    pub lines: usize,
}

#[derive(Debug, Clone, Args)]
pub struct FindArgs {
    /// Repository root
    pub path: PathBuf,

    /// Symbol name or path pattern
    pub pattern: String,

    /// Match file paths instead of symbol names
    #[arg(short, long)]
    pub files: bool,

    #[arg(short, long, default_value_t = 20)]
    pub limit: usize,

    /// Only search under this root-relative folder
    #[arg(long)]
    pub folder: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Write the effective configuration to the config file
    #[arg(long)]
    pub save: bool,
}
