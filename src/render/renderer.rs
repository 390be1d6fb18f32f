use std::io::Cursor;
use std::sync::Arc;

use super::layout::{TemplateImage, sticker_document};
use super::pool::{SandboxPool, SandboxPoolStats};
use super::sandbox::{SandboxFailure, SandboxLauncher};
use crate::foundation::error::{StickerError, StickerResult};
use crate::foundation::retry::{AttemptError, RetryPolicy, run_with_retry};
use crate::resolve::CompositionRequest;

/// Encoded render output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedImage {
    /// Width in pixels, equal to the request canvas.
    pub width: u32,
    /// Height in pixels, equal to the request canvas.
    pub height: u32,
    /// PNG bytes.
    pub png: Vec<u8>,
}

/// Turns resolved requests into PNG images through pooled sandbox sessions.
pub struct Renderer {
    pool: SandboxPool,
    policy: RetryPolicy,
    font_family: String,
}

impl Renderer {
    /// Build a renderer over a pool of `pool_size` sessions from `launcher`.
    ///
    /// `policy.max_attempts` bounds attempts per render; `policy.per_attempt_timeout` is the
    /// deadline handed to each sandbox call.
    pub fn new(
        launcher: Arc<dyn SandboxLauncher>,
        pool_size: usize,
        policy: RetryPolicy,
        font_family: impl Into<String>,
    ) -> Self {
        Self {
            pool: SandboxPool::new(launcher, pool_size),
            policy,
            font_family: font_family.into(),
        }
    }

    /// Font family the layout requests.
    pub fn font_family(&self) -> &str {
        &self.font_family
    }

    /// Sandbox pool counters.
    pub fn pool_stats(&self) -> SandboxPoolStats {
        self.pool.stats()
    }

    /// Render `req` over `template_bytes` into a PNG of exactly the request canvas.
    ///
    /// A malformed template fails immediately. Sandbox crashes and timeouts are retried on a
    /// fresh session up to the policy's attempt budget.
    #[tracing::instrument(skip_all, fields(sticker = req.template.sticker_id))]
    pub fn render(
        &self,
        req: &CompositionRequest,
        template_bytes: &[u8],
    ) -> StickerResult<RenderedImage> {
        let template = TemplateImage::sniff(template_bytes)?;
        let document = sticker_document(req, &template, &self.font_family);
        let img = self.rasterize(&document, req.canvas.width, req.canvas.height)?;
        encode_png(img)
    }

    /// Rasterize a layout document with the retry policy applied.
    pub fn rasterize(
        &self,
        document: &str,
        width: u32,
        height: u32,
    ) -> StickerResult<image::RgbaImage> {
        let deadline = self.policy.per_attempt_timeout;
        let out = run_with_retry(&self.policy, "sandbox render", |attempt| {
            let mut lease = self
                .pool
                .acquire()
                .map_err(|e| AttemptError::Transient(SandboxFailure::Crashed(e.to_string())))?;
            tracing::debug!(attempt, "rendering");
            match lease.render(document, width, height, deadline) {
                Ok(img) => Ok(img),
                Err(f) if f.is_transient() => Err(AttemptError::Transient(f)),
                Err(f) => Err(AttemptError::Permanent(f)),
            }
        });

        let img = out.map_err(|e| {
            StickerError::render(format!("{} (after {} attempt(s))", e.last, e.attempts))
        })?;
        if img.dimensions() != (width, height) {
            return Err(StickerError::render(format!(
                "sandbox returned {}x{}, expected {width}x{height}",
                img.width(),
                img.height()
            )));
        }
        Ok(img)
    }
}

/// PNG-encode an RGBA image.
pub fn encode_png(img: image::RgbaImage) -> StickerResult<RenderedImage> {
    let (width, height) = img.dimensions();
    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| StickerError::render(format!("png encode failed: {e}")))?;
    Ok(RenderedImage { width, height, png })
}

#[cfg(test)]
#[path = "../../tests/unit/render/renderer.rs"]
mod tests;
