use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{FetchFailure, ResourceFetcher, join_url};
use crate::foundation::error::{StickerError, StickerResult};
use crate::foundation::fs::{normalize_rel_path, write_atomic};
use crate::foundation::retry::{AttemptError, RetryPolicy, run_with_retry};

/// Remote directory holding template art, relative to each mirror prefix.
pub const REMOTE_IMAGE_DIR: &str = "public/img/";

/// Retrieves template assets that are not present locally.
///
/// Every mirror prefix is tried in order with the full attempt budget of the policy. Successful
/// downloads are persisted under `local_root` so later lookups of the same reference never touch
/// the network again.
pub struct AssetFetcher {
    transport: Arc<dyn ResourceFetcher>,
    prefixes: Vec<String>,
    policy: RetryPolicy,
    local_root: PathBuf,
    remote_dir: String,
}

impl AssetFetcher {
    /// Build a fetcher persisting into `local_root`.
    pub fn new(
        transport: Arc<dyn ResourceFetcher>,
        prefixes: Vec<String>,
        policy: RetryPolicy,
        local_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            prefixes,
            policy,
            local_root: local_root.into(),
            remote_dir: REMOTE_IMAGE_DIR.to_owned(),
        }
    }

    /// Override the remote directory that `reference`s are resolved against.
    pub fn with_remote_dir(mut self, remote_dir: impl Into<String>) -> Self {
        self.remote_dir = remote_dir.into();
        self
    }

    /// Local directory where fetched assets land.
    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// Path a reference is (or would be) stored at locally.
    pub fn local_path(&self, reference: &str) -> StickerResult<PathBuf> {
        let norm = normalize_rel_path(reference)?;
        Ok(self.local_root.join(Path::new(&norm)))
    }

    /// Return `true` when the reference is already stored locally.
    pub fn is_local(&self, reference: &str) -> bool {
        self.local_path(reference).is_ok_and(|p| p.is_file())
    }

    /// Return the bytes of `reference`, serving the local copy when present.
    #[tracing::instrument(skip(self))]
    pub fn fetch(&self, reference: &str) -> StickerResult<Vec<u8>> {
        let local = self.local_path(reference)?;
        if let Ok(bytes) = std::fs::read(&local) {
            return Ok(bytes);
        }

        let norm = normalize_rel_path(reference)?;
        let bytes = self.fetch_remote(&format!("{}{norm}", self.remote_dir))?;
        write_atomic(&local, &bytes)?;
        tracing::info!(reference, bytes = bytes.len(), "asset stored locally");
        Ok(bytes)
    }

    /// Fetch `remote_path` from the mirrors, bypassing local storage.
    pub fn fetch_remote(&self, remote_path: &str) -> StickerResult<Vec<u8>> {
        if self.prefixes.is_empty() {
            return Err(StickerError::fetch(remote_path, "no asset mirrors configured"));
        }

        let mut last_cause = String::new();
        for prefix in &self.prefixes {
            let url = join_url(prefix, remote_path);
            let out = run_with_retry(&self.policy, &url, |_| {
                self.transport.fetch(&url).map_err(|e: FetchFailure| {
                    if e.transient {
                        AttemptError::Transient(e)
                    } else {
                        AttemptError::Permanent(e)
                    }
                })
            });
            match out {
                Ok(bytes) => return Ok(bytes),
                Err(exhausted) => {
                    tracing::warn!(
                        url = %url,
                        attempts = exhausted.attempts,
                        cause = %exhausted.last,
                        "mirror failed"
                    );
                    last_cause = exhausted.last.cause;
                }
            }
        }
        Err(StickerError::fetch(remote_path, last_cause))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/fetch/assets.rs"]
mod tests;
