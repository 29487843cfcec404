//! Domain models for claycli
//!
//! Pure data shaping for content moving between sites, without any I/O:
//! prefix rewriting, chunk/dispatch/bootstrap conversion, reference walking
//! and the import asset model.

pub mod uri;
pub mod chunk;
pub mod bootstrap;
pub mod refs;
mod asset;

pub use asset::{atomize, dedupe, merge_lists, Asset, ItemResult, ItemStatus, Summary};
pub use bootstrap::{to_bootstrap, Bootstrap};
pub use chunk::{from_chunk, parse_object, to_chunk, validate, ChunkError, Dispatch};
pub use uri::UriType;
