//! Talking to Clay sites
//!
//! [`RemoteClient`] wraps a [`Transport`] with a shared concurrency limit and
//! the Clay conventions for keys, content types and search responses.
//! [`Pacer`] adds per-window rate limiting on top.

mod client;
mod memory;
mod pace;
mod transport;

pub use client::{BodyType, QueryResult, RemoteClient, DEFAULT_CONCURRENCY};
pub use memory::MemorySite;
pub use pace::{Pacer, DEFAULT_WINDOW};
pub use transport::{HttpTransport, Method, Request, Response, Transport};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Invalid response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("An API key is required to {operation}")]
    MissingKey { operation: &'static str },
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }

    /// The URL the failed request was sent to (empty for key errors)
    pub fn url(&self) -> &str {
        match self {
            RemoteError::NotFound { url }
            | RemoteError::Status { url, .. }
            | RemoteError::Transport { url, .. }
            | RemoteError::Decode { url, .. } => url,
            RemoteError::MissingKey { .. } => "",
        }
    }
}
