//! `clay config`

use anyhow::Result;
use clap::{Args, Subcommand};

use super::output::Output;
use crate::storage::{AliasKind, Config};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: Option<ConfigCommands>,

    /// Save an API key under an alias
    #[arg(long, num_args = 2, value_names = ["ALIAS", "KEY"])]
    pub key: Option<Vec<String>>,

    /// Save a site URL under an alias
    #[arg(long, num_args = 2, value_names = ["ALIAS", "URL"])]
    pub site: Option<Vec<String>>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the current configuration
    Show,
}

pub fn run(args: ConfigArgs, mut config: Config, output: &Output) -> Result<()> {
    let updates = [(AliasKind::Key, args.key), (AliasKind::Site, args.site)];
    let mut changed = false;

    for (kind, pair) in updates {
        if let Some([alias, value]) = pair.as_deref() {
            config.set(kind, alias, value)?;
            output.verbose_ctx("config", &format!("Set {} alias '{}'", kind.as_str(), alias));
            changed = true;
        }
    }

    if changed {
        config.save()?;
        output.success("Configuration saved");
        return Ok(());
    }

    match args.command {
        Some(ConfigCommands::Show) | None => show(&config, output),
    }
    Ok(())
}

fn show(config: &Config, output: &Output) {
    let path = config
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none)".to_string());

    if output.is_json() {
        output.data(&serde_json::json!({
            "path": path,
            "concurrency": config.clay.concurrency,
            "keys": config.clay.keys.keys().collect::<Vec<_>>(),
            "sites": config.clay.sites,
        }));
        return;
    }

    println!("Config: {}", path);
    println!("Concurrency: {}", config.clay.concurrency);

    println!("Keys:");
    for alias in config.clay.keys.keys() {
        println!("  {}", alias);
    }

    println!("Sites:");
    for (alias, url) in &config.clay.sites {
        println!("  {} = {}", alias, url);
    }
}
