//! Corner overlays and placeholder panels, drawn with `imageproc`.

use crate::core::CornerSet;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};

/// Row colours for corner overlays, cycled when a board has more rows.
const ROW_COLORS: [[u8; 3]; 7] = [
    [255, 0, 0],
    [255, 128, 0],
    [200, 200, 0],
    [0, 255, 0],
    [0, 200, 200],
    [0, 0, 255],
    [255, 0, 255],
];

pub fn row_color(row: usize) -> Rgb<u8> {
    Rgb(ROW_COLORS[row % ROW_COLORS.len()])
}

/// Diagonal cross of half size `r`.
fn draw_cross(img: &mut RgbImage, (x, y): (f32, f32), r: f32, color: Rgb<u8>) {
    draw_line_segment_mut(img, (x - r, y - r), (x + r, y + r), color);
    draw_line_segment_mut(img, (x - r, y + r), (x + r, y - r), color);
}

/// Mark every corner (circle + cross) and connect consecutive corners,
/// coloured per row. Draws on a copy of `base`.
pub fn draw_chessboard_corners(base: &RgbImage, corners: &CornerSet) -> RgbImage {
    let mut img = base.clone();
    let radius = 5;

    let mut prev: Option<(f32, f32)> = None;
    for (row, points) in corners.rows().enumerate() {
        let color = row_color(row);
        for p in points {
            let (x, y) = (p.x.round() as f32, p.y.round() as f32);
            if let Some(q) = prev {
                draw_line_segment_mut(&mut img, q, (x, y), color);
            }
            draw_hollow_circle_mut(&mut img, (x as i32, y as i32), radius, color);
            draw_cross(&mut img, (x, y), (radius - 1) as f32, color);
            prev = Some((x, y));
        }
    }
    img
}

/// Uniform grey tile with both diagonals crossed out.
pub fn placeholder_tile(width: u32, height: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(width, height, Rgb([96, 96, 96]));
    let (w, h) = (width.saturating_sub(1) as f32, height.saturating_sub(1) as f32);
    let ink = Rgb([160, 160, 160]);
    draw_line_segment_mut(&mut img, (0.0, 0.0), (w, h), ink);
    draw_line_segment_mut(&mut img, (0.0, h), (w, 0.0), ink);
    img
}
