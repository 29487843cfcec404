//! `clay export`

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde_json::Value;

use super::app::{parse_headers, runtime};
use super::output::Output;
use crate::engine::{ExportFormat, ExportOutput, ExportSession, Exporter};
use crate::remote::RemoteClient;
use crate::storage::{write_bootstrap, write_dispatches, Config};

#[derive(Args)]
pub struct ExportArgs {
    /// What to export: a component, page, list, user, uri, a collection of
    /// those, or a public page URL (the site to search with --query)
    pub url: Option<String>,

    /// API key (or key alias), needed for --query
    #[arg(long, short)]
    pub key: Option<String>,

    /// Also export page layouts
    #[arg(long, short)]
    pub layout: bool,

    /// Write a YAML bootstrap instead of dispatches
    #[arg(long, short)]
    pub yaml: bool,

    /// Simultaneous requests (also requests per second)
    #[arg(long, short)]
    pub concurrency: Option<usize>,

    /// Search query file (JSON or YAML); exports every matching page
    #[arg(long, short)]
    pub query: Option<PathBuf>,

    /// Maximum number of pages matched by --query
    #[arg(long, short, requires = "query")]
    pub size: Option<u64>,

    /// Extra header sent with every request (`Name: value`)
    #[arg(long = "header", short = 'H')]
    pub headers: Vec<String>,
}

pub fn run(args: ExportArgs, config: &Config, output: &Output) -> Result<()> {
    let url = config
        .site(args.url.as_deref())
        .ok_or_else(|| anyhow!("Nothing to export: pass a URL or set CLAYCLI_DEFAULT_URL"))?;
    let concurrency = args.concurrency.unwrap_or(config.clay.concurrency);

    let client = RemoteClient::http(concurrency)?.with_headers(parse_headers(&args.headers)?);
    let exporter = Exporter::new(client, concurrency).with_layouts(args.layout);
    let session = ExportSession::new();

    let dispatches = match &args.query {
        Some(path) => {
            let query = read_query(path, args.size)?;
            let key = config.key(args.key.as_deref());
            output.verbose_ctx("export", &format!("Searching {}", url));
            runtime()?.block_on(exporter.export_query(&url, &query, key.as_deref(), &session))?
        }
        None => {
            output.verbose_ctx("export", &format!("Exporting {}", url));
            runtime()?.block_on(exporter.export(&url, &session))?
        }
    };

    output.verbose_ctx("export", &format!("Exported {} items", dispatches.len()));

    let format = if args.yaml {
        ExportFormat::Bootstrap
    } else {
        ExportFormat::Dispatch
    };

    let stdout = io::stdout().lock();
    match ExportOutput::new(dispatches, format).context("Failed to build bootstrap")? {
        ExportOutput::Dispatches(dispatches) => write_dispatches(stdout, &dispatches),
        ExportOutput::Bootstrap(bootstrap) => write_bootstrap(stdout, &bootstrap),
    }
}

/// Reads a query body, optionally capping the number of hits
fn read_query(path: &Path, size: Option<u64>) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read query: {}", path.display()))?;
    let mut query: Value = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse query: {}", path.display()))?;

    if let (Some(size), Value::Object(map)) = (size, &mut query) {
        map.insert("size".to_string(), Value::from(size));
    }
    Ok(query)
}
