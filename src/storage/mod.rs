//! # Storage Layer
//!
//! Local files used by claycli.
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Config | TOML | `<config_dir>/claycli/config.toml` or `$CLAYCLI_CONFIG` |
//! | Dispatch streams | NDJSON | file argument or stdin/stdout |
//! | Bootstraps | YAML | file argument or stdin/stdout |
//!
//! Config writes are atomic (temp file + rename) under an `fs2` lock.

mod config;
mod files;

pub use config::{
    AliasKind, ClayConfig, Config, ConfigError, CONFIG_ENV, DEFAULT_KEY_ENV, DEFAULT_URL_ENV,
};
pub use files::{
    parse, parse_bootstrap, parse_dispatches, read_input, write_bootstrap, write_dispatches,
    Content, InputFormat,
};
