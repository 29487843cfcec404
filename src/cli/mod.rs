//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Commands
//!
//! | Command | Purpose | Example |
//! |---------|---------|---------|
//! | `export` | Site content to dispatches or a bootstrap | `clay export d.com/_pages/index --layout` |
//! | `import` | Dispatches or a bootstrap into a site | `clay import prod --key prod < content.ndjson` |
//! | `lint` | Find missing references | `clay lint d.com/_pages/index` |
//! | `config` | Key and site aliases | `clay config --site prod https://d.com` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! Exported content always goes to stdout as NDJSON or YAML, so
//! `clay export ... | clay import ...` works.
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output; `RUST_LOG` overrides the log filter:
//! ```bash
//! clay --verbose lint d.com/_pages/index
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod config_cmd;
mod export_cmd;
mod import_cmd;
mod lint_cmd;

pub use app::{Cli, Commands, run};
pub use output::{Output, OutputFormat};
