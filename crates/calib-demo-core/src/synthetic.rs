//! Synthetic chessboard renders with known corner positions.
//!
//! Board coordinates are measured in squares: the board covers
//! `[0, squares_x] x [0, squares_y]` and inner corner `(col, row)` sits at
//! `(col + 1, row + 1)`. Object coordinates used for calibration put that
//! same corner at `(col, row, 0)`.

use crate::{GrayImage, Homography, Intrinsics, PatternSize, Pose};
use nalgebra::{Matrix3, Point2};

#[derive(Clone, Copy, Debug)]
pub struct BoardRender {
    pub squares_x: u32,
    pub squares_y: u32,
    pub dark: u8,
    pub light: u8,
    pub background: u8,
    /// Samples per pixel along each axis.
    pub supersample: u32,
}

impl Default for BoardRender {
    fn default() -> Self {
        Self {
            squares_x: 10,
            squares_y: 7,
            dark: 25,
            light: 230,
            background: 230,
            supersample: 4,
        }
    }
}

impl BoardRender {
    /// Board with one more square than inner corners along each axis.
    pub fn for_pattern(pattern: PatternSize) -> Self {
        Self {
            squares_x: pattern.cols() + 1,
            squares_y: pattern.rows() + 1,
            ..Self::default()
        }
    }

    fn shade(&self, bx: f64, by: f64) -> u8 {
        if !(bx >= 0.0 && by >= 0.0 && bx < self.squares_x as f64 && by < self.squares_y as f64)
        {
            return self.background;
        }
        let sx = bx.floor() as i64;
        let sy = by.floor() as i64;
        if (sx + sy) % 2 == 0 {
            self.dark
        } else {
            self.light
        }
    }
}

/// Render a board seen through `h_img_from_board`. Pixel `(x, y)` is centred
/// on integer coordinates, matching [`crate::sample_bilinear`].
pub fn render_chessboard(
    width: usize,
    height: usize,
    h_img_from_board: &Homography,
    render: &BoardRender,
) -> GrayImage {
    let Some(h_board_from_img) = h_img_from_board.inverse() else {
        return GrayImage::filled(width, height, render.background);
    };

    let ss = render.supersample.max(1);
    let step = 1.0 / ss as f64;
    let offsets: Vec<f64> = (0..ss).map(|k| -0.5 + step * (k as f64 + 0.5)).collect();
    let norm = (ss * ss) as f64;

    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for oy in &offsets {
                for ox in &offsets {
                    let b = h_board_from_img.apply(Point2::new(x as f64 + ox, y as f64 + oy));
                    acc += render.shade(b.x, b.y) as f64;
                }
            }
            data.push((acc / norm).round().clamp(0.0, 255.0) as u8);
        }
    }

    GrayImage {
        width,
        height,
        data,
    }
}

/// Ground-truth image positions of the inner corners, row-major.
pub fn inner_corner_positions(
    h_img_from_board: &Homography,
    pattern: PatternSize,
) -> Vec<Point2<f64>> {
    (0..pattern.rows())
        .flat_map(|r| (0..pattern.cols()).map(move |c| (c, r)))
        .map(|(c, r)| h_img_from_board.apply(Point2::new(c as f64 + 1.0, r as f64 + 1.0)))
        .collect()
}

/// A distortion-free pinhole camera looking at a board.
#[derive(Clone, Copy, Debug)]
pub struct SyntheticScene {
    pub intrinsics: Intrinsics,
    /// Object frame (inner corner `(0, 0)` at the origin) into the camera frame.
    pub pose: Pose,
    pub pattern: PatternSize,
}

impl SyntheticScene {
    /// `H = K [r1 r2 t]`, mapping object-plane `(X, Y)` to pixels.
    pub fn h_img_from_object(&self) -> Homography {
        let r = self.pose.rotation.matrix();
        let t = self.pose.translation;
        let rt = Matrix3::from_columns(&[r.column(0).into_owned(), r.column(1).into_owned(), t]);
        Homography::new(self.intrinsics.matrix() * rt)
    }

    pub fn h_img_from_board(&self) -> Homography {
        let shift = Matrix3::new(
            1.0, 0.0, -1.0, //
            0.0, 1.0, -1.0, //
            0.0, 0.0, 1.0,
        );
        Homography::new(self.h_img_from_object().h * shift)
    }

    pub fn render(&self, width: usize, height: usize) -> GrayImage {
        render_chessboard(
            width,
            height,
            &self.h_img_from_board(),
            &BoardRender::for_pattern(self.pattern),
        )
    }

    pub fn ground_truth_corners(&self) -> Vec<Point2<f64>> {
        inner_corner_positions(&self.h_img_from_board(), self.pattern)
    }
}

/// Deterministic uniform noise (xorshift), for "nothing to find" inputs.
pub fn render_noise(width: usize, height: usize, seed: u64) -> GrayImage {
    let mut state = seed.max(1);
    let data = (0..width * height)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 56) as u8
        })
        .collect();
    GrayImage {
        width,
        height,
        data,
    }
}
