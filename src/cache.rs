//! Content-addressed render cache keyed by [`Fingerprint`].

mod fingerprint;
mod store;

pub use fingerprint::Fingerprint;
pub use store::{CacheStats, RenderCache};
