use serde::{Deserialize, Serialize};

use crate::foundation::core::{Canvas, PixelPoint, Rgb8};
use crate::foundation::error::{StickerError, StickerResult};

use super::TemplateMetadata;

/// Native manifest: explicit ids, degrees, one shared default canvas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Canvas used by entries that do not override it.
    #[serde(default)]
    pub canvas: Canvas,
    /// Sticker entries.
    pub stickers: Vec<ManifestEntry>,
}

/// One template in the native manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    /// Sticker id, unique across the manifest.
    pub id: u32,
    /// Character the sticker belongs to.
    pub character: String,
    /// Display name. Defaults to `"<character> <id>"`.
    #[serde(default)]
    pub name: Option<String>,
    /// Image path relative to the resource directory.
    pub image: String,
    /// Default caption.
    #[serde(default)]
    pub text: String,
    /// Default text anchor.
    pub x: i64,
    /// Default text anchor.
    pub y: i64,
    /// Default rotation in degrees.
    #[serde(default)]
    pub rotation_deg: f64,
    /// Default font size in pixels.
    pub font_size: u32,
    /// Default fill color.
    pub color: Rgb8,
    /// Per-entry canvas override.
    #[serde(default)]
    pub canvas: Option<Canvas>,
}

/// Upstream `characters.json` entry.
#[derive(Clone, Debug, Deserialize)]
struct UpstreamEntry {
    #[allow(dead_code)]
    id: serde_json::Value,
    name: String,
    character: String,
    img: String,
    color: Rgb8,
    #[serde(rename = "defaultText")]
    default_text: UpstreamText,
}

#[derive(Clone, Debug, Deserialize)]
struct UpstreamText {
    text: String,
    x: i64,
    y: i64,
    /// Rotation in tenths of a radian.
    r: i64,
    /// Font size.
    s: u32,
}

impl Manifest {
    /// Parse either manifest format.
    ///
    /// A top-level JSON array is read as upstream `characters.json`; an object as the native
    /// format.
    pub fn parse(bytes: &[u8]) -> StickerResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| StickerError::catalogue_load(format!("manifest is not JSON: {e}")))?;
        if value.is_array() {
            let entries: Vec<UpstreamEntry> = serde_json::from_value(value).map_err(|e| {
                StickerError::catalogue_load(format!("malformed characters.json: {e}"))
            })?;
            Ok(Self::from_upstream(entries))
        } else {
            serde_json::from_value(value)
                .map_err(|e| StickerError::catalogue_load(format!("malformed manifest: {e}")))
        }
    }

    fn from_upstream(mut entries: Vec<UpstreamEntry>) -> Self {
        // Upstream ids are not stable; order by character and renumber from 1.
        entries.sort_by_key(|e| e.character.to_lowercase());
        let stickers = entries
            .into_iter()
            .zip(1u32..)
            .map(|(e, id)| ManifestEntry {
                id,
                character: e.character,
                name: Some(e.name),
                image: e.img,
                text: e.default_text.text,
                x: e.default_text.x,
                y: e.default_text.y,
                rotation_deg: (e.default_text.r as f64 / 10.0).to_degrees(),
                font_size: e.default_text.s,
                color: e.color,
                canvas: None,
            })
            .collect();
        Self {
            canvas: Canvas::default(),
            stickers,
        }
    }

    /// Convert entries into validated template metadata.
    pub(crate) fn into_templates(self) -> StickerResult<Vec<TemplateMetadata>> {
        let default_canvas = self.canvas;
        self.stickers
            .into_iter()
            .map(|e| {
                let canvas = e.canvas.unwrap_or(default_canvas);
                let name = e
                    .name
                    .unwrap_or_else(|| format!("{} {}", e.character, e.id));
                let t = TemplateMetadata {
                    character: e.character,
                    sticker_id: e.id,
                    name,
                    image_ref: e.image,
                    canvas,
                    default_text: e.text,
                    default_anchor: PixelPoint { x: e.x, y: e.y },
                    default_rotation_deg: e.rotation_deg,
                    default_font_size_px: e.font_size,
                    default_color: e.color,
                };
                t.validate()?;
                Ok(t)
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/catalogue/manifest.rs"]
mod tests;
