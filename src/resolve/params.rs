use std::str::FromStr;

use crate::foundation::core::Rgb8;
use crate::foundation::error::{StickerError, StickerResult};

/// Sticker selector as typed by the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RawId {
    /// A concrete catalogue id.
    Id(u32),
    /// Any template, chosen uniformly.
    Random,
}

impl RawId {
    /// Parse `"random"` (or an empty selector) and decimal ids.
    pub fn parse(s: &str) -> StickerResult<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("random") {
            return Ok(Self::Random);
        }
        s.parse::<u32>()
            .map(Self::Id)
            .map_err(|_| StickerError::validation("id", format!("\"{s}\" is not a sticker id")))
    }
}

impl From<u32> for RawId {
    fn from(id: u32) -> Self {
        Self::Id(id)
    }
}

/// Partial parameter overrides, still in their textual form.
///
/// Numeric fields accept a plain value or a `^`-prefixed offset relative to the template default
/// (`"^-10"`). Unset fields take the template default.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Text anchor x.
    pub x: Option<String>,
    /// Text anchor y.
    pub y: Option<String>,
    /// Rotation in degrees.
    pub rotate: Option<String>,
    /// Font size in pixels.
    pub size: Option<String>,
    /// Fill color, hex.
    pub color: Option<String>,
    /// Outline width in pixels.
    pub stroke_width: Option<String>,
    /// Outline color, hex.
    pub stroke_color: Option<String>,
    /// Line height as a multiple of the font size.
    pub line_spacing: Option<String>,
    /// Shrink the default font size until the caption fits the canvas width.
    pub auto_fit: bool,
}

/// Numeric override value that can be offset from its default.
pub(crate) trait Offset: FromStr + Copy {
    /// `self + by`, or `None` when the sum is not representable.
    fn offset(self, by: Self) -> Option<Self>;
}

impl Offset for i64 {
    fn offset(self, by: Self) -> Option<Self> {
        self.checked_add(by)
    }
}

impl Offset for f64 {
    fn offset(self, by: Self) -> Option<Self> {
        let v = self + by;
        v.is_finite().then_some(v)
    }
}

/// Resolve a numeric override against its default.
pub(crate) fn numeric<T: Offset>(
    field: &'static str,
    raw: Option<&str>,
    default: T,
) -> StickerResult<T> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(default);
    };
    let (relative, digits) = match raw.strip_prefix('^') {
        Some(rest) => (true, rest.trim()),
        None => (false, raw),
    };
    let v = digits
        .parse::<T>()
        .map_err(|_| StickerError::validation(field, format!("cannot parse \"{raw}\"")))?;
    if !relative {
        return Ok(v);
    }
    default.offset(v).ok_or_else(|| {
        StickerError::validation(field, format!("offset \"{raw}\" is out of range"))
    })
}

/// Resolve a color override against its default.
pub(crate) fn color(field: &'static str, raw: Option<&str>, default: Rgb8) -> StickerResult<Rgb8> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => Rgb8::parse_hex(s).map_err(|reason| StickerError::validation(field, reason)),
    }
}

/// Fold a rotation into `(-360, 360)`, keeping its sign.
pub(crate) fn normalize_rotation(deg: f64) -> f64 {
    let r = deg % 360.0;
    // Avoid a negative zero leaking into the fingerprint.
    if r == 0.0 { 0.0 } else { r }
}
