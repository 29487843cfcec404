//! `clay import`

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::Args;

use super::app::{parse_headers, runtime};
use super::output::Output;
use crate::domain::Summary;
use crate::engine::{ImportOptions, Importer};
use crate::remote::RemoteClient;
use crate::storage::{parse, read_input, Config, Content, InputFormat};

#[derive(Args)]
pub struct ImportArgs {
    /// Target site (URL or alias)
    pub site: Option<String>,

    /// API key (or key alias) for the target site
    #[arg(long, short)]
    pub key: Option<String>,

    /// Overwrite layouts that already exist on the target
    #[arg(long, short)]
    pub layout: bool,

    /// Treat input as a YAML bootstrap (detected automatically otherwise)
    #[arg(long, short)]
    pub yaml: bool,

    /// Read input from a file instead of stdin
    #[arg(long, conflicts_with = "from")]
    pub file: Option<PathBuf>,

    /// Copy from live source URLs instead of reading input
    #[arg(long, num_args = 1..)]
    pub from: Vec<String>,

    /// Simultaneous requests
    #[arg(long, short)]
    pub concurrency: Option<usize>,

    /// Extra header sent with every request (`Name: value`)
    #[arg(long = "header", short = 'H')]
    pub headers: Vec<String>,
}

pub fn run(args: ImportArgs, config: &Config, output: &Output) -> Result<()> {
    let site = config
        .site(args.site.as_deref())
        .ok_or_else(|| anyhow!("No target site: pass one or set CLAYCLI_DEFAULT_URL"))?;
    let concurrency = args.concurrency.unwrap_or(config.clay.concurrency);

    let options = ImportOptions {
        concurrency,
        key: config.key(args.key.as_deref()),
        headers: parse_headers(&args.headers)?,
        overwrite_layouts: args.layout,
    };
    let importer = Importer::new(RemoteClient::http(concurrency)?, options);

    let results = if args.from.is_empty() {
        let text = read_input(args.file.as_deref())?;
        let format = args.yaml.then_some(InputFormat::Bootstrap);
        let content = parse(&text, format)?;

        let runtime = runtime()?;
        match content {
            Content::Dispatches(dispatches) => {
                output.verbose_ctx("import", &format!("{} dispatches into {}", dispatches.len(), site));
                runtime.block_on(importer.import_dispatches(&dispatches, &site))?
            }
            Content::Bootstrap(bootstrap) => {
                output.verbose_ctx("import", &format!("bootstrap into {}", site));
                runtime.block_on(importer.import_bootstrap(&bootstrap, &site))?
            }
        }
    } else {
        output.verbose_ctx("import", &format!("{} source urls into {}", args.from.len(), site));
        runtime()?.block_on(importer.import_urls(&args.from, &site))?
    };

    for result in &results {
        output.item(result);
    }

    let summary = Summary::from_results(&results);
    output.summary("Imported", &summary);

    if summary.error > 0 {
        bail!("{} of {} items failed to import", summary.error, summary.total());
    }
    Ok(())
}
