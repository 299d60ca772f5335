//! Single-image chessboard calibration demo.
//!
//! One image goes in; the pipeline
//! 1. finds the inner corners of a known-size chessboard (ChESS corners from
//!    `chess-corners`, grid assembly from `calib-demo-chessboard`, sub-pixel
//!    refinement),
//! 2. fits a pinhole + Brown–Conrady camera model to that single view,
//! 3. undistorts the image with the fitted model,
//! 4. hands the original, the corner overlay and the undistorted image to a
//!    [`display::Display`].
//!
//! ## Quickstart
//!
//! ```no_run
//! use calib_demo::display::ConsoleDisplay;
//! use calib_demo::pipeline::{run, LoadedImage};
//! use calib_demo::PipelineConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let image = LoadedImage::open("board.png")?;
//! let report = run(&image, &PipelineConfig::default());
//! println!("{report}");
//! report.present(&image, &mut ConsoleDisplay::stdout())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `calib_demo::core`: geometric types, homography, sub-pixel refinement.
//! - `calib_demo::chessboard`: grid assembly from raw corners.
//! - [`detect`], [`object_points`], [`calibrate`], [`undistort`]: pipeline stages.
//! - [`pipeline`]: stage sequencing and the run report.
//! - [`display`]: panel renderers.

pub use calib_demo_chessboard as chessboard;
pub use calib_demo_core as core;

pub mod calibrate;
pub mod config;
pub mod detect;
pub mod display;
mod draw;
pub mod object_points;
pub mod pipeline;
pub mod undistort;

pub use calibrate::{calibrate, Calibration, CalibrationError, CalibrationOptions};
pub use config::{ConfigError, PipelineConfig};
pub use detect::{DetectionOutcome, DetectorParams, PatternDetection};
pub use object_points::{object_points, object_points_scaled};
pub use pipeline::{
    CalibrationOutcome, LoadedImage, PipelineError, PipelineReport, PipelineState,
};
pub use undistort::undistort_image;
