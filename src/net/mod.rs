//! HTTP fetch capability and URL resolution.
//!
//! The stream pipeline only ever talks to a [`Fetcher`]: a blocking
//! "GET this URL, give me the whole body" capability. [`HttpFetcher`] is the
//! reqwest-backed implementation; tests substitute in-memory fetchers.

mod http;
mod location;

pub use http::HttpFetcher;
pub use location::{base_url_from_manifest, is_absolute_url, UrlResolver};

use bytes::Bytes;
use thiserror::Error;

/// Errors raised while fetching a bootstrap or fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} is {size} bytes, above the {max} byte limit")]
    TooLarge { url: String, size: u64, max: u64 },

    #[error("{url} declared {expected} bytes but only {received} arrived")]
    Truncated {
        url: String,
        expected: u64,
        received: u64,
    },
}

impl FetchError {
    /// Create a transport-level error.
    pub fn request(url: &str, message: impl std::fmt::Display) -> Self {
        Self::Request {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    /// URL of the failed request.
    pub fn url(&self) -> &str {
        match self {
            Self::Request { url, .. }
            | Self::Status { url, .. }
            | Self::TooLarge { url, .. }
            | Self::Truncated { url, .. } => url,
        }
    }
}

/// Blocking whole-body fetch.
///
/// Called from the stream's worker threads, never from the reader.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

impl<F: Fetcher + ?Sized> Fetcher for std::sync::Arc<F> {
    fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        (**self).fetch(url)
    }
}
