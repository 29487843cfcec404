//! Output formatting for CLI commands
//!
//! Status and results go through [`Output`]; exported content is written
//! straight to stdout by the export command so it can be piped into import.

use serde::Serialize;

use crate::domain::{ItemResult, Summary};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Output helper for consistent formatting
pub struct Output {
    format: OutputFormat,
    verbose: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    /// Prints a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Text => println!("{}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "success": true,
                        "message": message
                    })
                );
            }
        }
    }

    /// Prints structured data
    pub fn data<T: Serialize>(&self, data: &T) {
        match self.format {
            OutputFormat::Text => {
                if let Ok(json) = serde_json::to_string_pretty(data) {
                    println!("{}", json);
                }
            }
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string(data) {
                    println!("{}", json);
                }
            }
        }
    }

    /// Prints one per-item result (`status<TAB>url[<TAB>message]` in text mode)
    pub fn item(&self, result: &ItemResult) {
        match self.format {
            OutputFormat::Text => match &result.message {
                Some(message) => println!("{}\t{}\t{}", result.status, result.url, message),
                None => println!("{}\t{}", result.status, result.url),
            },
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string(result) {
                    println!("{}", json);
                }
            }
        }
    }

    /// Prints the totals line closing a batch
    pub fn summary(&self, action: &str, summary: &Summary) {
        match self.format {
            OutputFormat::Text => println!(
                "{} {} items: {} succeeded, {} skipped, {} failed",
                action,
                summary.total(),
                summary.success,
                summary.skipped,
                summary.error
            ),
            OutputFormat::Json => self.data(&serde_json::json!({ "summary": summary })),
        }
    }

    /// Returns true if using JSON format
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Prints a verbose debug message (only when --verbose is set)
    pub fn verbose(&self, message: &str) {
        if self.verbose {
            eprintln!("[verbose] {}", message);
        }
    }

    /// Prints a verbose debug message with context (only when --verbose is set)
    pub fn verbose_ctx(&self, context: &str, message: &str) {
        if self.verbose {
            eprintln!("[verbose:{}] {}", context, message);
        }
    }
}
