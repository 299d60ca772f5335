//! Gradient-based sub-pixel refinement of X-junction corners.
//!
//! At the true corner `q`, every image gradient `g(p)` in a neighbourhood is
//! orthogonal to `p - q`. Stacking `g gᵀ (p - q) = 0` over a Gaussian-weighted
//! window gives a 2×2 linear system that is re-solved until the estimate
//! settles.

use crate::{sample_bilinear, GrayImageView};
use nalgebra::{Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubpixParams {
    /// Half size of the search window in pixels.
    pub half_window: u32,
    pub max_iters: u32,
    /// Stop once an update moves the corner by less than this many pixels.
    pub epsilon: f32,
}

impl Default for SubpixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 20,
            epsilon: 0.01,
        }
    }
}

/// Refine one corner. The initial estimate is returned when the system is
/// singular or the iteration drifts outside the search window.
pub fn refine_corner_subpix(
    img: &GrayImageView<'_>,
    initial: Point2<f32>,
    params: &SubpixParams,
) -> Point2<f32> {
    let w = params.half_window.max(1) as i32;
    let sigma = w as f32 / 2.0;
    let inv_two_sigma2 = 1.0 / (2.0 * sigma * sigma);
    let eps2 = params.epsilon * params.epsilon;

    let mut q = initial;
    for _ in 0..params.max_iters.max(1) {
        let mut a = Matrix2::<f32>::zeros();
        let mut b = Vector2::<f32>::zeros();

        for dy in -w..=w {
            let wy = (-((dy * dy) as f32) * inv_two_sigma2).exp();
            for dx in -w..=w {
                let weight = wy * (-((dx * dx) as f32) * inv_two_sigma2).exp();
                let px = q.x + dx as f32;
                let py = q.y + dy as f32;

                let gx = 0.5 * (sample_bilinear(img, px + 1.0, py) - sample_bilinear(img, px - 1.0, py));
                let gy = 0.5 * (sample_bilinear(img, px, py + 1.0) - sample_bilinear(img, px, py - 1.0));

                let gxx = gx * gx * weight;
                let gxy = gx * gy * weight;
                let gyy = gy * gy * weight;

                a[(0, 0)] += gxx;
                a[(0, 1)] += gxy;
                a[(1, 0)] += gxy;
                a[(1, 1)] += gyy;
                b[0] += gxx * px + gxy * py;
                b[1] += gxy * px + gyy * py;
            }
        }

        let det = a.determinant();
        if det.abs() <= f32::EPSILON * a.norm_squared().max(1.0) {
            return initial;
        }
        let Some(inv) = a.try_inverse() else {
            return initial;
        };
        let next = inv * b;
        let next = Point2::new(next[0], next[1]);
        let step = (next - q).norm_squared();
        q = next;
        if step <= eps2 {
            break;
        }
    }

    if !(q.x.is_finite() && q.y.is_finite()) || (q - initial).abs().max() > w as f32 {
        return initial;
    }
    q
}

/// Refine every corner independently.
pub fn refine_corners_subpix(
    img: &GrayImageView<'_>,
    corners: &[Point2<f32>],
    params: &SubpixParams,
) -> Vec<Point2<f32>> {
    corners
        .iter()
        .map(|&c| refine_corner_subpix(img, c, params))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{render_chessboard, BoardRender};
    use crate::Homography;
    use nalgebra::Matrix3;

    #[test]
    fn refines_offset_guess_towards_true_junction() {
        let h = Homography::new(Matrix3::new(
            24.0, 2.0, 40.0, //
            -1.5, 23.0, 35.0, //
            0.0, 0.0, 1.0,
        ));
        let render = BoardRender {
            squares_x: 6,
            squares_y: 5,
            ..BoardRender::default()
        };
        let img = render_chessboard(200, 180, &h, &render);
        let truth = h.apply(Point2::new(3.0, 2.0));
        let truth = Point2::new(truth.x as f32, truth.y as f32);

        let guess = Point2::new(truth.x + 1.3, truth.y - 0.9);
        let refined = refine_corner_subpix(&img.view(), guess, &SubpixParams::default());
        let err = (refined - truth).norm();
        assert!(err < 0.15, "refined {refined:?} vs truth {truth:?} (err {err})");
    }

    #[test]
    fn flat_region_keeps_initial_estimate() {
        let img = crate::GrayImage::filled(40, 40, 128);
        let p = Point2::new(20.3_f32, 19.7);
        let refined = refine_corner_subpix(&img.view(), p, &SubpixParams::default());
        assert_eq!(refined, p);
    }
}
