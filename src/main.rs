use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use repolens::cli::CliApp;
use repolens::cli_types::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "repolens=debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut app = CliApp::from_config_file(cli.config, cli.verbose, !cli.no_color)?;
    if cli.no_cache {
        app.disable_cache();
    }

    match cli.command {
        Commands::Scan(args) => app.scan(args).await,
        Commands::Query(args) => app.query(args).await,
        Commands::Explain(args) => app.explain(args).await,
        Commands::Find(args) => app.find(args).await,
        Commands::Config(args) => app.show_config(args).await,
    }
}
