//! Parameter resolution.
//!
//! [`Resolver::resolve`] turns raw user input (an id or `random`, optional caption, textual
//! overrides) into a fully populated [`CompositionRequest`]. All defaulting happens here; nothing
//! downstream ever sees an unset field.

use std::sync::Arc;

use crate::catalogue::{AssetCatalogue, TemplateKey, TemplateMetadata};
use crate::config::EngineConfig;
use crate::foundation::core::{Canvas, Rgb8};
use crate::foundation::error::{StickerError, StickerResult};

mod fit;
mod params;

pub use fit::{MIN_FIT_FONT_SIZE_PX, approximate_text_width, fit_font_size};
pub use params::{Overrides, RawId};

/// Default outline width.
pub const DEFAULT_STROKE_WIDTH_PX: u32 = 9;
/// Default outline color.
pub const DEFAULT_STROKE_COLOR: Rgb8 = Rgb8::WHITE;
/// Default line height, in multiples of the font size.
pub const DEFAULT_LINE_SPACING: f64 = 1.3;

const MAX_STROKE_WIDTH_PX: i64 = 64;
const MAX_LINE_SPACING: f64 = 10.0;

/// Fully resolved render input. Every field is populated.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositionRequest {
    /// Template identity.
    pub template: TemplateKey,
    /// Template image reference.
    pub image_ref: String,
    /// Output size.
    pub canvas: Canvas,
    /// Caption, non-empty. Lines are separated by `\n`.
    pub text: String,
    /// Text anchor, inside the canvas.
    pub x: i64,
    /// Text anchor, inside the canvas.
    pub y: i64,
    /// Rotation about the anchor, in `(-360, 360)`.
    pub rotation_deg: f64,
    /// Font size, `1..=max_font_size_px`.
    pub font_size_px: u32,
    /// Fill color.
    pub color: Rgb8,
    /// Outline width; `0` disables the outline.
    pub stroke_width_px: u32,
    /// Outline color.
    pub stroke_color: Rgb8,
    /// Line height in multiples of the font size.
    pub line_spacing: f64,
}

/// Pure function over the catalogue and the request limits.
#[derive(Clone, Debug)]
pub struct Resolver {
    catalogue: Arc<AssetCatalogue>,
    max_text_chars: usize,
    max_font_size_px: u32,
}

impl Resolver {
    /// Build a resolver with explicit limits.
    pub fn new(catalogue: Arc<AssetCatalogue>, max_text_chars: usize, max_font_size_px: u32) -> Self {
        Self {
            catalogue,
            max_text_chars,
            max_font_size_px,
        }
    }

    /// Build a resolver with limits from `config`.
    pub fn from_config(catalogue: Arc<AssetCatalogue>, config: &EngineConfig) -> Self {
        Self::new(catalogue, config.max_text_chars, config.max_font_size_px)
    }

    /// Catalogue this resolver reads.
    pub fn catalogue(&self) -> &Arc<AssetCatalogue> {
        &self.catalogue
    }

    /// Resolve raw input into a [`CompositionRequest`].
    ///
    /// `text = None` takes the template's default caption; an explicitly empty caption is an
    /// error. Unknown ids fail with `NotFound`, every other bad input with a `Validation` error
    /// naming the field.
    #[tracing::instrument(skip(self, text, overrides))]
    pub fn resolve(
        &self,
        raw_id: RawId,
        text: Option<&str>,
        overrides: &Overrides,
    ) -> StickerResult<CompositionRequest> {
        let template = match raw_id {
            RawId::Random => self.catalogue.random_template(),
            RawId::Id(id) => self
                .catalogue
                .get(id)
                .ok_or_else(|| StickerError::not_found(format!("sticker id {id}")))?,
        };
        self.resolve_template(&template, text, overrides)
    }

    /// Resolve against an already selected template.
    pub fn resolve_template(
        &self,
        template: &TemplateMetadata,
        text: Option<&str>,
        overrides: &Overrides,
    ) -> StickerResult<CompositionRequest> {
        let text = self.resolve_text(template, text)?;
        let canvas = template.canvas;

        let x = params::numeric("x", overrides.x.as_deref(), template.default_anchor.x)?;
        let y = params::numeric("y", overrides.y.as_deref(), template.default_anchor.y)?;
        if !(0..i64::from(canvas.width)).contains(&x) {
            return Err(StickerError::validation(
                "x",
                format!("{x} is outside [0, {})", canvas.width),
            ));
        }
        if !(0..i64::from(canvas.height)).contains(&y) {
            return Err(StickerError::validation(
                "y",
                format!("{y} is outside [0, {})", canvas.height),
            ));
        }

        let rotation = params::numeric(
            "rotate",
            overrides.rotate.as_deref(),
            template.default_rotation_deg,
        )?;
        if !rotation.is_finite() {
            return Err(StickerError::validation("rotate", "must be a finite number"));
        }
        let rotation_deg = params::normalize_rotation(rotation);

        let size = params::numeric(
            "size",
            overrides.size.as_deref(),
            i64::from(template.default_font_size_px),
        )?;
        let max = i64::from(self.max_font_size_px);
        if !(1..=max).contains(&size) {
            return Err(StickerError::validation(
                "size",
                format!("{size} is outside [1, {max}]"),
            ));
        }
        let mut font_size_px = u32::try_from(size)
            .map_err(|_| StickerError::validation("size", format!("{size} is out of range")))?;
        if overrides.auto_fit && overrides.size.is_none() {
            font_size_px = fit_font_size(&text, font_size_px, rotation_deg, canvas.width);
        }

        let color = params::color("color", overrides.color.as_deref(), template.default_color)?;
        let stroke_color = params::color(
            "stroke_color",
            overrides.stroke_color.as_deref(),
            DEFAULT_STROKE_COLOR,
        )?;

        let stroke = params::numeric(
            "stroke_width",
            overrides.stroke_width.as_deref(),
            i64::from(DEFAULT_STROKE_WIDTH_PX),
        )?;
        if !(0..=MAX_STROKE_WIDTH_PX).contains(&stroke) {
            return Err(StickerError::validation(
                "stroke_width",
                format!("{stroke} is outside [0, {MAX_STROKE_WIDTH_PX}]"),
            ));
        }
        let stroke_width_px = u32::try_from(stroke).map_err(|_| {
            StickerError::validation("stroke_width", format!("{stroke} is out of range"))
        })?;

        let line_spacing = params::numeric(
            "line_spacing",
            overrides.line_spacing.as_deref(),
            DEFAULT_LINE_SPACING,
        )?;
        if !line_spacing.is_finite() || line_spacing <= 0.0 || line_spacing > MAX_LINE_SPACING {
            return Err(StickerError::validation(
                "line_spacing",
                format!("{line_spacing} is outside (0, {MAX_LINE_SPACING}]"),
            ));
        }

        Ok(CompositionRequest {
            template: template.key(),
            image_ref: template.image_ref.clone(),
            canvas,
            text,
            x,
            y,
            rotation_deg,
            font_size_px,
            color,
            stroke_width_px,
            stroke_color,
            line_spacing,
        })
    }

    fn resolve_text(&self, template: &TemplateMetadata, text: Option<&str>) -> StickerResult<String> {
        let text = match text {
            Some(t) => t.replace("\r\n", "\n"),
            None => template.default_text.clone(),
        };
        if text.trim().is_empty() {
            return Err(StickerError::validation("text", "must not be empty"));
        }
        let len = text.chars().count();
        if len > self.max_text_chars {
            return Err(StickerError::validation(
                "text",
                format!("{len} characters exceeds the limit of {}", self.max_text_chars),
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
#[path = "../tests/unit/resolve/resolver.rs"]
mod tests;
