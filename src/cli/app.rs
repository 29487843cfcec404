//! Main CLI application structure

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{config_cmd, export_cmd, import_cmd, lint_cmd};
use crate::storage::Config;

#[derive(Parser)]
#[command(name = "clay")]
#[command(author, version, about = "Export, import and lint content between Clay sites")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export content as dispatches (or a YAML bootstrap) on stdout
    Export(export_cmd::ExportArgs),

    /// Import dispatches or a bootstrap into a site
    Import(import_cmd::ImportArgs),

    /// Check that content and everything it references exists
    Lint(lint_cmd::LintArgs),

    /// Manage key and site aliases
    Config(config_cmd::ConfigArgs),
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = Output::new(cli.format, cli.verbose);

    let config = Config::load()?;
    if let Some(path) = &config.path {
        output.verbose(&format!("Using config: {}", path.display()));
    }

    match cli.command {
        Commands::Export(args) => export_cmd::run(args, &config, &output),
        Commands::Import(args) => import_cmd::run(args, &config, &output),
        Commands::Lint(args) => lint_cmd::run(args, &config, &output),
        Commands::Config(args) => config_cmd::run(args, config, &output),
    }
}

/// Logs to stderr; `RUST_LOG` wins over `--verbose`
fn init_tracing(verbose: bool) {
    let default = if verbose { "claycli=debug" } else { "claycli=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Async runtime for the network-bound commands
pub(super) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

/// Parses repeated `Name: value` header arguments
pub(super) fn parse_headers(headers: &[String]) -> Result<Vec<(String, String)>> {
    headers
        .iter()
        .map(|header| {
            header
                .split_once(':')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| anyhow::anyhow!("Invalid header '{}', expected 'Name: value'", header))
        })
        .collect()
}
