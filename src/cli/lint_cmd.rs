//! `clay lint`

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

use super::app::runtime;
use super::output::Output;
use crate::domain::Summary;
use crate::engine::{lint_bootstrap, site_prefix, LintResult, Linter};
use crate::remote::RemoteClient;
use crate::storage::{parse_bootstrap, read_input, Config};

#[derive(Args)]
pub struct LintArgs {
    /// Component or page to check (reads a bootstrap from stdin when omitted)
    pub url: Option<String>,

    /// Check a bootstrap file instead of a URL
    #[arg(long, conflicts_with = "url")]
    pub file: Option<PathBuf>,

    /// Resolve bootstrap references missing from the file against this site
    #[arg(long)]
    pub site: Option<String>,

    /// Simultaneous requests
    #[arg(long, short)]
    pub concurrency: Option<usize>,
}

pub fn run(args: LintArgs, config: &Config, output: &Output) -> Result<()> {
    let concurrency = args.concurrency.unwrap_or(config.clay.concurrency);
    let runtime = runtime()?;

    let results: Vec<LintResult> = match args.url.as_deref() {
        Some(url) => {
            output.verbose_ctx("lint", &format!("Linting {}", url));
            let linter = Linter::new(RemoteClient::http(concurrency)?, concurrency);
            runtime.block_on(linter.lint_url(url))
        }
        None => {
            let bootstrap = parse_bootstrap(&read_input(args.file.as_deref())?)?;
            let site = args
                .site
                .as_deref()
                .and_then(|site| config.site(Some(site)))
                .map(|site| site_prefix(&site));

            let client = RemoteClient::http(concurrency)?;
            let remote = site.as_deref().map(|prefix| (&client, prefix));
            runtime.block_on(lint_bootstrap(&bootstrap, remote))?
        }
    };

    for result in &results {
        if result.is_error() {
            output.item(result);
        } else {
            output.verbose_ctx("lint", &format!("ok {}", result.url));
        }
    }

    let summary = Summary::from_results(&results);
    if summary.error > 0 {
        bail!("{} of {} references failed lint", summary.error, summary.total());
    }

    output.success(&format!("All {} references resolved", summary.total()));
    Ok(())
}
