use std::fmt::Write as _;
use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::foundation::error::{StickerError, StickerResult};
use crate::resolve::CompositionRequest;

/// Template image bytes that decoded successfully.
#[derive(Clone, Debug)]
pub struct TemplateImage<'a> {
    /// Encoded bytes, embedded as-is.
    pub bytes: &'a [u8],
    /// MIME type derived from the content.
    pub mime: &'static str,
    /// Intrinsic width.
    pub width: u32,
    /// Intrinsic height.
    pub height: u32,
}

impl<'a> TemplateImage<'a> {
    /// Sniff the format and read the dimensions of `bytes`.
    pub fn sniff(bytes: &'a [u8]) -> StickerResult<Self> {
        let format = image::guess_format(bytes)
            .map_err(|e| StickerError::render(format!("malformed template image: {e}")))?;
        let mime = match format {
            image::ImageFormat::Png => "image/png",
            image::ImageFormat::Jpeg => "image/jpeg",
            image::ImageFormat::Gif => "image/gif",
            image::ImageFormat::WebP => "image/webp",
            other => {
                return Err(StickerError::render(format!(
                    "unsupported template image format {other:?}"
                )));
            }
        };
        let (width, height) = image::ImageReader::with_format(Cursor::new(bytes), format)
            .into_dimensions()
            .map_err(|e| StickerError::render(format!("malformed template image: {e}")))?;
        if width == 0 || height == 0 {
            return Err(StickerError::render("template image is empty"));
        }
        Ok(Self {
            bytes,
            mime,
            width,
            height,
        })
    }

    fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(self.bytes))
    }
}

/// Build the SVG layout document for `req`.
///
/// The template fills the canvas (aspect preserved, centered). The caption is centered on its
/// anchor, rotated about it, outlined under the fill, and never clipped or wrapped.
pub fn sticker_document(
    req: &CompositionRequest,
    template: &TemplateImage<'_>,
    font_family: &str,
) -> String {
    let (w, h) = (req.canvas.width, req.canvas.height);
    let (x, y) = (req.x, req.y);
    let size = req.font_size_px;

    let mut doc = String::with_capacity(template.bytes.len() * 4 / 3 + 1024);
    let _ = write!(
        doc,
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#
    );
    let _ = write!(
        doc,
        r#"<image x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="xMidYMid meet" xlink:href="{}"/>"#,
        template.data_url()
    );

    let _ = write!(
        doc,
        r#"<text x="{x}" y="{y}" transform="rotate({rot} {x} {y})" font-family="{family}" font-size="{size}" fill="{fill}" text-anchor="middle" xml:space="preserve""#,
        rot = req.rotation_deg,
        family = quick_xml::escape::escape(font_family),
        fill = req.color,
    );
    if req.stroke_width_px > 0 {
        let _ = write!(
            doc,
            r#" stroke="{}" stroke-width="{}" stroke-linejoin="round" paint-order="stroke""#,
            req.stroke_color, req.stroke_width_px
        );
    }
    doc.push('>');

    let line_height = f64::from(size) * req.line_spacing;
    for (i, line) in req.text.split('\n').enumerate() {
        let dy = if i == 0 { 0.0 } else { line_height };
        let _ = write!(
            doc,
            r#"<tspan x="{x}" dy="{dy}">{}</tspan>"#,
            quick_xml::escape::escape(line)
        );
    }
    doc.push_str("</text></svg>");
    doc
}

#[cfg(test)]
#[path = "../../tests/unit/render/layout.rs"]
mod tests;
