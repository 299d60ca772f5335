#![allow(dead_code)]

use calib_demo::core::synthetic::{render_noise, SyntheticScene};
use calib_demo::core::{GrayImage as CoreGray, Intrinsics, PatternSize, Pose};
use image::{DynamicImage, GrayImage, RgbImage};
use nalgebra::{Point2, Vector3};
use std::path::{Path, PathBuf};

pub const WIDTH: usize = 640;
pub const HEIGHT: usize = 480;

/// A 9x6 board about 40 px per square, slightly tilted.
pub fn scene() -> SyntheticScene {
    SyntheticScene {
        intrinsics: Intrinsics {
            fx: 600.0,
            fy: 600.0,
            cx: 319.5,
            cy: 239.5,
        },
        pose: Pose::from_axis_angle(Vector3::new(0.15, -0.2, 0.05), Vector3::new(-4.0, -2.5, 15.0)),
        pattern: PatternSize::default(),
    }
}

fn to_rgb(img: CoreGray) -> RgbImage {
    let gray = GrayImage::from_raw(img.width as u32, img.height as u32, img.data)
        .expect("buffer length");
    DynamicImage::ImageLuma8(gray).into_rgb8()
}

pub fn board_image() -> (RgbImage, Vec<Point2<f64>>) {
    let scene = scene();
    (to_rgb(scene.render(WIDTH, HEIGHT)), scene.ground_truth_corners())
}

pub fn noise_image() -> RgbImage {
    to_rgb(render_noise(WIDTH, HEIGHT, 0x5eed))
}

pub fn write_png(dir: &Path, name: &str, img: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).expect("write png");
    path
}
