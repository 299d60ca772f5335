//! Lens undistortion by inverse remapping.

use crate::core::CameraModel;
use image::{ImageBuffer, Pixel};
use log::debug;
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Remap `src` into an image as seen by a distortion-free camera with the
/// same intrinsic matrix.
///
/// Each destination pixel is normalised with `K`, pushed through the
/// distortion model, projected back with `K` and bilinearly sampled from
/// `src`. Samples outside the source are black. With zero distortion the
/// output equals the input.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(src, model), fields(width = src.width(), height = src.height()))
)]
pub fn undistort_image<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    model: &CameraModel,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = src.dimensions();
    let mut out = ImageBuffer::<P, Vec<u8>>::new(width, height);

    for (x, y, px) in out.enumerate_pixels_mut() {
        let s = model.distort_pixel(Point2::new(x as f64, y as f64));
        sample_bilinear_pixel(src, s.x, s.y, px.channels_mut());
    }

    debug!(
        "undistorted {width}x{height} image with k = {:?}",
        model.distortion.coefficients()
    );
    out
}

/// Bilinear sample of every channel; pixels outside the image count as 0.
fn sample_bilinear_pixel<P>(src: &ImageBuffer<P, Vec<u8>>, x: f64, y: f64, dst: &mut [u8])
where
    P: Pixel<Subpixel = u8>,
{
    dst.fill(0);
    if !x.is_finite() || !y.is_finite() {
        return;
    }
    let (w, h) = (src.width() as i64, src.height() as i64);
    let x0 = x.floor();
    let y0 = y.floor();
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);
    if x0 < -1 || y0 < -1 || x0 >= w || y0 >= h {
        return;
    }

    let fetch = |xi: i64, yi: i64, c: usize| -> f64 {
        if xi < 0 || yi < 0 || xi >= w || yi >= h {
            return 0.0;
        }
        src.get_pixel(xi as u32, yi as u32).channels()[c] as f64
    };

    for (c, out) in dst.iter_mut().enumerate() {
        let a = fetch(x0, y0, c) + fx * (fetch(x0 + 1, y0, c) - fetch(x0, y0, c));
        let b = fetch(x0, y0 + 1, c) + fx * (fetch(x0 + 1, y0 + 1, c) - fetch(x0, y0 + 1, c));
        *out = (a + fy * (b - a)).round().clamp(0.0, 255.0) as u8;
    }
}
