//! claycli - Move content between Clay sites
//!
//! Clay content is a graph: pages point at components, components point at
//! child components through `_ref`, and every URI carries the site it lives
//! on. claycli turns that graph into portable, site-agnostic chunks
//! (newline-delimited dispatches or a nested bootstrap) and writes it back
//! into any site, without clobbering layouts or lists already there.

pub mod domain;
pub mod remote;
pub mod engine;
pub mod storage;
pub mod cli;

pub use domain::{Bootstrap, Dispatch, ItemResult, ItemStatus, UriType};
pub use engine::{ExportSession, Exporter, ImportOptions, Importer, Linter};
pub use remote::{MemorySite, RemoteClient};
