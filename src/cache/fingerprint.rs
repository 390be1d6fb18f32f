use std::fmt;

use xxhash_rust::xxh3::Xxh3;

use crate::foundation::core::{Canvas, Rgb8};
use crate::resolve::CompositionRequest;

const XXH3_SEED: u64 = 0x8b5ad4a0c7d8e9f1;

// Bump when the rendered output for an unchanged request changes.
const LAYOUT_VERSION: u32 = 1;

const TAG_STICKER: u8 = 1;
const TAG_SHEET: u8 = 2;

/// Stable 128-bit content key of a render.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    /// High 64 bits.
    pub hi: u64,
    /// Low 64 bits.
    pub lo: u64,
}

impl Fingerprint {
    /// Fingerprint of a resolved sticker request. Every field participates.
    pub fn of_request(req: &CompositionRequest) -> Self {
        let mut h = StableHasher::new(TAG_STICKER);
        h.write_str(&req.template.character);
        h.write_u32(req.template.sticker_id);
        h.write_str(&req.image_ref);
        h.write_canvas(req.canvas);
        h.write_str(&req.text);
        h.write_i64(req.x);
        h.write_i64(req.y);
        h.write_f64(req.rotation_deg);
        h.write_u32(req.font_size_px);
        h.write_rgb(req.color);
        h.write_u32(req.stroke_width_px);
        h.write_rgb(req.stroke_color);
        h.write_f64(req.line_spacing);
        h.finish()
    }

    /// Fingerprint of a contact sheet: its title plus the fingerprint of every tile, in order.
    pub fn of_sheet(title: &str, tiles: impl IntoIterator<Item = Fingerprint>) -> Self {
        let mut h = StableHasher::new(TAG_SHEET);
        h.write_str(title);
        for tile in tiles {
            h.write_u8(1);
            h.write_u64(tile.hi);
            h.write_u64(tile.lo);
        }
        h.write_u8(0);
        h.finish()
    }

    /// 32 lower-case hex digits.
    pub fn to_hex(self) -> String {
        format!("{:016x}{:016x}", self.hi, self.lo)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new(tag: u8) -> Self {
        let mut h = Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        };
        h.write_u8(tag);
        h.write_u32(LAYOUT_VERSION);
        h
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_i64(&mut self, v: i64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    // Length-prefixed so adjacent strings cannot alias.
    fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    fn write_canvas(&mut self, c: Canvas) {
        self.write_u32(c.width);
        self.write_u32(c.height);
    }

    fn write_rgb(&mut self, c: Rgb8) {
        self.write_bytes(&[c.r, c.g, c.b]);
    }

    fn finish(self) -> Fingerprint {
        let v = self.inner.digest128();
        Fingerprint {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/fingerprint.rs"]
mod tests;
