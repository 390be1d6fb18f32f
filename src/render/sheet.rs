use image::{Rgba, RgbaImage};

/// Tiles per row at most.
pub const SHEET_COLUMNS: u32 = 5;
const GAP_PX: u32 = 8;
const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Lay `tiles` out on a white grid, each centered in a cell sized to the largest tile.
pub fn compose_sheet(tiles: &[RgbaImage]) -> RgbaImage {
    if tiles.is_empty() {
        return RgbaImage::from_pixel(GAP_PX * 2, GAP_PX * 2, BACKGROUND);
    }
    let cell_w = tiles.iter().map(RgbaImage::width).max().unwrap_or(1);
    let cell_h = tiles.iter().map(RgbaImage::height).max().unwrap_or(1);
    let count = u32::try_from(tiles.len()).unwrap_or(u32::MAX);
    let cols = count.min(SHEET_COLUMNS);
    let rows = count.div_ceil(cols);

    let width = cols * cell_w + (cols + 1) * GAP_PX;
    let height = rows * cell_h + (rows + 1) * GAP_PX;
    let mut sheet = RgbaImage::from_pixel(width, height, BACKGROUND);

    for (i, tile) in (0u32..).zip(tiles) {
        let (col, row) = (i % cols, i / cols);
        let x = GAP_PX + col * (cell_w + GAP_PX) + (cell_w - tile.width()) / 2;
        let y = GAP_PX + row * (cell_h + GAP_PX) + (cell_h - tile.height()) / 2;
        image::imageops::overlay(&mut sheet, tile, i64::from(x), i64::from(y));
    }
    sheet
}
