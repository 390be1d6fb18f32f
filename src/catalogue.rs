//! Sticker template catalogue.
//!
//! The catalogue is loaded once at startup from a manifest (native JSON or the upstream
//! `characters.json` array) and is immutable afterwards, so it can be shared across request
//! threads behind an `Arc` without locking.

use std::path::{Path, PathBuf};

use crate::fetch::AssetFetcher;
use crate::foundation::core::{Canvas, PixelPoint, Rgb8};
use crate::foundation::error::{StickerError, StickerResult};
use crate::foundation::fs::write_atomic;

mod manifest;
mod store;

pub use manifest::{Manifest, ManifestEntry};
pub use store::{AssetCatalogue, CharacterSummary, MissingImages};

/// Remote location of the upstream manifest, relative to each mirror prefix.
pub const REMOTE_MANIFEST_PATH: &str = "src/characters.json";

/// Identity of a template: the owning character plus its sticker id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateKey {
    /// Character name as written in the manifest.
    pub character: String,
    /// Sticker id, unique across the catalogue.
    pub sticker_id: u32,
}

/// Immutable description of one sticker template.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateMetadata {
    /// Owning character.
    pub character: String,
    /// Catalogue-wide sticker id.
    pub sticker_id: u32,
    /// Human-readable name.
    pub name: String,
    /// Image path relative to the resource directory.
    pub image_ref: String,
    /// Output canvas size.
    pub canvas: Canvas,
    /// Caption used when the request carries none.
    pub default_text: String,
    /// Default text anchor.
    pub default_anchor: PixelPoint,
    /// Default rotation, degrees.
    pub default_rotation_deg: f64,
    /// Default font size, pixels.
    pub default_font_size_px: u32,
    /// Default fill color.
    pub default_color: Rgb8,
}

impl TemplateMetadata {
    /// Identity key of this template.
    pub fn key(&self) -> TemplateKey {
        TemplateKey {
            character: self.character.clone(),
            sticker_id: self.sticker_id,
        }
    }

    pub(crate) fn validate(&self) -> StickerResult<()> {
        let who = format!("sticker {} ({})", self.sticker_id, self.character);
        if self.character.trim().is_empty() {
            return Err(StickerError::catalogue_load(format!(
                "{who}: character must be non-empty"
            )));
        }
        if self.image_ref.trim().is_empty() {
            return Err(StickerError::catalogue_load(format!(
                "{who}: image reference must be non-empty"
            )));
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(StickerError::catalogue_load(format!(
                "{who}: canvas must be non-empty"
            )));
        }
        if !self
            .canvas
            .contains(self.default_anchor.x, self.default_anchor.y)
        {
            return Err(StickerError::catalogue_load(format!(
                "{who}: default anchor ({}, {}) outside {}x{} canvas",
                self.default_anchor.x,
                self.default_anchor.y,
                self.canvas.width,
                self.canvas.height
            )));
        }
        if self.default_font_size_px == 0 {
            return Err(StickerError::catalogue_load(format!(
                "{who}: default font size must be > 0"
            )));
        }
        if !self.default_rotation_deg.is_finite() {
            return Err(StickerError::catalogue_load(format!(
                "{who}: default rotation must be finite"
            )));
        }
        Ok(())
    }
}

/// Where the manifest comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogueSource {
    /// Read a manifest file from disk.
    File(PathBuf),
    /// Download `characters.json` from the mirrors into `local_copy`, falling back to the
    /// existing local copy when every mirror fails.
    Remote {
        /// Persisted copy of the last successful download.
        local_copy: PathBuf,
    },
}

/// Read the manifest bytes for `source`.
///
/// A remote refresh that fails is not fatal as long as an earlier copy exists on disk.
#[tracing::instrument(skip(fetcher))]
pub fn load_manifest_bytes(
    source: &CatalogueSource,
    fetcher: Option<&AssetFetcher>,
) -> StickerResult<Vec<u8>> {
    match source {
        CatalogueSource::File(path) => read_manifest(path),
        CatalogueSource::Remote { local_copy } => {
            let Some(fetcher) = fetcher else {
                return read_manifest(local_copy);
            };
            match fetcher.fetch_remote(REMOTE_MANIFEST_PATH) {
                Ok(bytes) => {
                    write_atomic(local_copy, &bytes)?;
                    tracing::info!(bytes = bytes.len(), "manifest refreshed");
                    Ok(bytes)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "manifest refresh failed, using local copy");
                    read_manifest(local_copy)
                }
            }
        }
    }
}

fn read_manifest(path: &Path) -> StickerResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        StickerError::catalogue_load(format!("read manifest '{}': {e}", path.display()))
    })
}
