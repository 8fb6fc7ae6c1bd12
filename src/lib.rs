//! Repository indexing and question answering for onboarding onto unfamiliar codebases.
//!
//! ```no_run
//! use repolens::RepoLens;
//!
//! # async fn run() -> repolens::Result<()> {
//! let lens = RepoLens::builder().top_k(5).build()?;
//! lens.scan("path/to/repo").await?;
//! for candidate in lens.query("where is login handled?")? {
//!     println!("{} ({:.1})", candidate.path, candidate.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod ai_tools;
pub mod analyzers;
pub mod assembler;
pub mod config;
pub mod error;
pub mod incremental;
pub mod indexer;
pub mod lens;
pub mod ranking;
pub mod scanner;
pub mod storage;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod cli_types;

// Re-export commonly used types
pub use ai_tools::{RepoTools, ToolResult, ToolSchema};
pub use assembler::{AnswerAssembler, AnswerPackage, Explainer, FileOverview, FileSlice, TemplateExplainer};
pub use config::RepoLensConfig;
pub use error::{RepoLensError, Result};
pub use incremental::{ChangeDetector, ChangeSet};
pub use indexer::{CancellationToken, IndexReport, Indexer};
pub use lens::{Answer, RepoLens, RepoLensBuilder};
pub use ranking::QueryRanker;
pub use scanner::RepositoryScanner;
pub use storage::{IndexMetadata, IndexStore, SharedIndex};
pub use types::*;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
