//! Remote asset retrieval.
//!
//! [`ResourceFetcher`] is the transport seam (HTTP, `file://`, test doubles). [`AssetFetcher`]
//! layers the retry policy, mirror fallback and local persistence on top of a transport.

use std::fmt;
use std::sync::Arc;

mod assets;
mod http;

pub use assets::AssetFetcher;
pub use http::HttpFetcher;

/// Single-attempt transport failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchFailure {
    /// `true` when another attempt may succeed (timeouts, resets, 5xx).
    pub transient: bool,
    /// Rendered cause.
    pub cause: String,
}

impl FetchFailure {
    /// A failure worth retrying.
    pub fn transient(cause: impl Into<String>) -> Self {
        Self {
            transient: true,
            cause: cause.into(),
        }
    }

    /// A failure retrying cannot fix.
    pub fn permanent(cause: impl Into<String>) -> Self {
        Self {
            transient: false,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cause)
    }
}

/// Fetches the bytes behind a URL with a single attempt.
///
/// Implementations must be `Send + Sync`; one transport is shared by every request thread.
pub trait ResourceFetcher: Send + Sync {
    /// Fetch `url` once. Timeouts are the implementation's responsibility.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchFailure>;
}

impl<T: ResourceFetcher + ?Sized> ResourceFetcher for Arc<T> {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        (**self).fetch(url)
    }
}

/// Join a mirror prefix and a relative path (`append_prefix` for a single prefix).
pub(crate) fn join_url(prefix: &str, rel: &str) -> String {
    if prefix.ends_with('/') {
        format!("{prefix}{rel}")
    } else {
        format!("{prefix}/{rel}")
    }
}
