//! Export, import and lint pipelines
//!
//! Each engine borrows a [`RemoteClient`](crate::remote::RemoteClient) and
//! fans work out with bounded `futures` streams. Per-item failures come back
//! as [`ItemResult`](crate::domain::ItemResult) values; only run-wide
//! failures are `Err`.

mod export;
mod import;
mod lint;

pub use export::{
    site_prefix, ExportError, ExportFormat, ExportOutput, ExportSession, Exporter, UrlKind,
};
pub use import::{ImportError, ImportOptions, Importer};
pub use lint::{lint_bootstrap, LintResult, Linter};
