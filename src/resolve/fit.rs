/// Smallest size auto-fit will shrink to.
pub const MIN_FIT_FONT_SIZE_PX: u32 = 8;

const FIT_MULTIPLIER: f64 = 1.2;

/// Rough horizontal extent of rotated single-line text.
///
/// Wide (East Asian) characters count as one em, everything else as half an em.
pub fn approximate_text_width(line: &str, size_px: u32, rotation_deg: f64) -> f64 {
    let size = f64::from(size_px);
    let width: f64 = line
        .chars()
        .map(|c| if is_wide(c) { size } else { size / 2.0 })
        .sum();
    let rad = rotation_deg.to_radians();
    (width * rad.cos()).abs() + (size * rad.sin()).abs()
}

/// Largest size `<= size_px` whose widest line fits `canvas_width` with some slack.
pub fn fit_font_size(text: &str, size_px: u32, rotation_deg: f64, canvas_width: u32) -> u32 {
    let limit = f64::from(canvas_width);
    let mut size = size_px;
    while size > MIN_FIT_FONT_SIZE_PX {
        let widest = text
            .lines()
            .map(|l| approximate_text_width(l, size, rotation_deg))
            .fold(0.0, f64::max);
        if widest * FIT_MULTIPLIER <= limit {
            break;
        }
        size -= 1;
    }
    size
}

// East Asian Wide, Fullwidth and Ambiguous ranges. CJK caption fonts draw ambiguous characters
// at full width, so they count as wide. Blocks that are mostly ambiguous are taken whole.
fn is_wide(c: char) -> bool {
    matches!(c as u32,
        0x00A1..=0x00BF
        | 0x00C6
        | 0x00D0
        | 0x00D7..=0x00D8
        | 0x00DE..=0x00E1
        | 0x00E6
        | 0x00E8..=0x00EA
        | 0x00EC..=0x00ED
        | 0x00F0
        | 0x00F2..=0x00F3
        | 0x00F7..=0x00FA
        | 0x00FC
        | 0x00FE
        | 0x0391..=0x03A9
        | 0x03B1..=0x03C9
        | 0x0401
        | 0x0410..=0x044F
        | 0x0451
        | 0x1100..=0x115F
        | 0x2010..=0x2027
        | 0x2030..=0x203E
        | 0x2103
        | 0x2105
        | 0x2109
        | 0x2113
        | 0x2116
        | 0x2121..=0x2122
        | 0x2126
        | 0x212B
        | 0x2153..=0x2154
        | 0x215B..=0x215E
        | 0x2160..=0x216B
        | 0x2170..=0x2179
        | 0x2190..=0x2199
        | 0x21D2
        | 0x21D4
        | 0x2200..=0x22FF
        | 0x2312
        | 0x231A..=0x231B
        | 0x2329..=0x232A
        | 0x23E9..=0x23EC
        | 0x2460..=0x24FF
        | 0x2500..=0x259F
        | 0x25A0..=0x25FF
        | 0x2605..=0x2606
        | 0x2609
        | 0x260E..=0x260F
        | 0x2614..=0x2615
        | 0x261C
        | 0x261E
        | 0x2640
        | 0x2642
        | 0x2660..=0x266F
        | 0x2776..=0x277F
        | 0x2B1B..=0x2B1C
        | 0x2B50
        | 0x2B55
        | 0x2E80..=0x303E
        | 0x3041..=0x33FF
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xA000..=0xA4CF
        | 0xA960..=0xA97F
        | 0xAC00..=0xD7A3
        | 0xE000..=0xF8FF
        | 0xF900..=0xFAFF
        | 0xFE10..=0xFE19
        | 0xFE30..=0xFE6B
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0xFFFD
        | 0x16FE0..=0x18AFF
        | 0x1B000..=0x1B2FF
        | 0x1F004
        | 0x1F100..=0x1F2FF
        | 0x1F300..=0x1F64F
        | 0x1F680..=0x1F6FF
        | 0x1F900..=0x1F9FF
        | 0x1FA70..=0x1FAFF
        | 0x20000..=0x3FFFD)
}
