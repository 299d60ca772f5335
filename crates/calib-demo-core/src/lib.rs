//! Core types and utilities for single-view chessboard calibration.
//!
//! This crate is purely geometric. It does *not* depend on any concrete
//! corner detector, image codec or optimizer.

mod camera;
mod corner;
mod homography;
mod image;
mod logger;
mod subpix;
pub mod synthetic;

pub use camera::{BrownConrady5, CameraModel, Intrinsics, Pose};
pub use corner::{Corner, CornerSet, ObjectPointSet, PatternSize, PatternSizeError};
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView};
pub use subpix::{refine_corner_subpix, refine_corners_subpix, SubpixParams};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
