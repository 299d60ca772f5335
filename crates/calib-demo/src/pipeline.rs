//! Load -> detect -> calibrate -> undistort -> display, as immutable stage values.

use crate::calibrate::{calibrate, Calibration, CalibrationError};
use crate::config::PipelineConfig;
use crate::detect::{detect_pattern, DetectionOutcome};
use crate::display::{Display, DisplayError};
use crate::object_points::object_points;
use crate::undistort::undistort_image;
use image::{DynamicImage, GrayImage, ImageError, ImageReader, RgbImage};
use log::{info, warn};
use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("failed to load image {}: {source}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
    #[error(transparent)]
    Display(#[from] DisplayError),
}

/// Stages a run passes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Loaded,
    CornersAttempted,
    CornersFound,
    CornersNotFound,
    Calibrated,
    CalibrationFailed,
    Displayed,
}

/// A decoded input image with its grayscale companion.
#[derive(Clone, Debug)]
pub struct LoadedImage {
    pub path: PathBuf,
    pub color: RgbImage,
    pub gray: GrayImage,
}

impl LoadedImage {
    /// Decode any raster format supported by `image`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let decoded = ImageReader::open(path)
            .map_err(ImageError::IoError)
            .and_then(|reader| reader.with_guessed_format().map_err(ImageError::IoError))
            .and_then(|reader| reader.decode())
            .map_err(|source| PipelineError::ImageLoad {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            "loaded {} ({}x{})",
            path.display(),
            decoded.width(),
            decoded.height()
        );
        Ok(Self::from_dynamic(path.to_path_buf(), decoded))
    }

    /// Wrap an in-memory colour image; `label` only names it in reports.
    pub fn from_color(label: impl Into<PathBuf>, color: RgbImage) -> Self {
        Self::from_dynamic(label.into(), DynamicImage::ImageRgb8(color))
    }

    fn from_dynamic(path: PathBuf, img: DynamicImage) -> Self {
        let gray = img.to_luma8();
        let color = img.into_rgb8();
        Self { path, color, gray }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.color.dimensions()
    }
}

#[derive(Clone, Debug)]
pub enum CalibrationOutcome {
    /// Corners were not found, so the solver never ran.
    NotAttempted,
    Calibrated {
        calibration: Calibration,
        undistorted: RgbImage,
    },
    Failed(CalibrationError),
}

/// Everything a run produced before display.
#[derive(Clone, Debug)]
pub struct PipelineReport {
    pub detection: DetectionOutcome,
    pub calibration: CalibrationOutcome,
}

/// Run detection, and calibration plus undistortion when corners are found.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(image, config), fields(path = %image.path.display(), pattern = %config.pattern))
)]
pub fn run(image: &LoadedImage, config: &PipelineConfig) -> PipelineReport {
    let detection = detect_pattern(&image.color, &image.gray, config.pattern, &config.detector);

    let calibration = match &detection {
        DetectionOutcome::NotFound(reason) => {
            info!("skipping calibration: {reason}");
            CalibrationOutcome::NotAttempted
        }
        DetectionOutcome::Found(found) => {
            let objects = object_points(config.pattern);
            match calibrate(
                std::slice::from_ref(&objects),
                std::slice::from_ref(&found.corners),
                image.dimensions(),
                &config.calibration,
            ) {
                Ok(calibration) => {
                    info!("calibrated camera:\n{}", calibration.model);
                    let undistorted = undistort_image(&image.color, &calibration.model);
                    CalibrationOutcome::Calibrated {
                        calibration,
                        undistorted,
                    }
                }
                Err(err) => {
                    warn!("calibration failed: {err}");
                    CalibrationOutcome::Failed(err)
                }
            }
        }
    };

    PipelineReport {
        detection,
        calibration,
    }
}

impl PipelineReport {
    /// Terminal state before display.
    pub fn state(&self) -> PipelineState {
        match (&self.detection, &self.calibration) {
            (DetectionOutcome::NotFound(_), _) => PipelineState::CornersNotFound,
            (_, CalibrationOutcome::Calibrated { .. }) => PipelineState::Calibrated,
            (_, CalibrationOutcome::Failed(_)) => PipelineState::CalibrationFailed,
            (DetectionOutcome::Found(_), CalibrationOutcome::NotAttempted) => {
                PipelineState::CornersFound
            }
        }
    }

    /// Every state visited from loading up to (not including) display.
    pub fn transitions(&self) -> Vec<PipelineState> {
        let mut states = vec![PipelineState::Loaded, PipelineState::CornersAttempted];
        if self.detection.is_found() {
            states.push(PipelineState::CornersFound);
        }
        let last = self.state();
        if states.last() != Some(&last) {
            states.push(last);
        }
        states
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        match &self.calibration {
            CalibrationOutcome::Calibrated { calibration, .. } => Some(calibration),
            _ => None,
        }
    }

    pub fn undistorted(&self) -> Option<&RgbImage> {
        match &self.calibration {
            CalibrationOutcome::Calibrated { undistorted, .. } => Some(undistorted),
            _ => None,
        }
    }

    /// Hand the three panels to `display`.
    pub fn present(
        &self,
        image: &LoadedImage,
        display: &mut dyn Display,
    ) -> Result<PipelineState, PipelineError> {
        let overlay = self.detection.detection().map(|d| &d.overlay);
        display.render(&image.color, overlay, self.undistorted())?;
        Ok(PipelineState::Displayed)
    }
}

/// Console diagnostics for the run.
impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.detection, &self.calibration) {
            (DetectionOutcome::NotFound(reason), _) => {
                write!(f, "Chessboard corners not found ({reason}).")
            }
            (DetectionOutcome::Found(found), CalibrationOutcome::Calibrated { calibration, .. }) => {
                writeln!(f, "Chessboard corners found ({}).", found.corners.len())?;
                writeln!(
                    f,
                    "Calibration succeeded (RMS reprojection error {:.4} px).",
                    calibration.rms_px
                )?;
                write!(f, "{}", calibration.model)
            }
            (DetectionOutcome::Found(found), CalibrationOutcome::Failed(err)) => {
                writeln!(f, "Chessboard corners found ({}).", found.corners.len())?;
                write!(f, "Calibration failed: {err}.")
            }
            (DetectionOutcome::Found(found), CalibrationOutcome::NotAttempted) => {
                write!(f, "Chessboard corners found ({}).", found.corners.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::synthetic::render_noise;
    use crate::display::{RecordingDisplay, CALIBRATION_PLACEHOLDER, CORNERS_PLACEHOLDER};
    use image::{Luma, Rgb};

    #[test]
    fn from_color_derives_gray() {
        let color = RgbImage::from_pixel(8, 4, Rgb([255, 255, 255]));
        let img = LoadedImage::from_color("mem", color);
        assert_eq!(img.dimensions(), (8, 4));
        assert_eq!(img.gray.get_pixel(3, 2), &Luma([255]));
        assert_eq!(img.path, PathBuf::from("mem"));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = LoadedImage::open("/no/such/dir/board.png").unwrap_err();
        assert!(matches!(err, PipelineError::ImageLoad { .. }));
        assert!(err.to_string().contains("board.png"));
    }

    #[test]
    fn noise_is_not_found_and_shows_two_placeholders() {
        let noise = render_noise(160, 120, 3);
        let gray = GrayImage::from_raw(160, 120, noise.data).expect("buffer");
        let img = LoadedImage::from_color("noise", DynamicImage::ImageLuma8(gray).into_rgb8());

        let report = run(&img, &PipelineConfig::default());
        assert_eq!(report.state(), PipelineState::CornersNotFound);
        assert!(matches!(report.calibration, CalibrationOutcome::NotAttempted));
        assert_eq!(
            report.transitions(),
            vec![
                PipelineState::Loaded,
                PipelineState::CornersAttempted,
                PipelineState::CornersNotFound
            ]
        );
        assert!(report.to_string().starts_with("Chessboard corners not found"));

        let mut display = RecordingDisplay::default();
        let state = report.present(&img, &mut display).expect("present");
        assert_eq!(state, PipelineState::Displayed);
        assert_eq!(
            display.placeholders(),
            vec![CORNERS_PLACEHOLDER, CALIBRATION_PLACEHOLDER]
        );
    }
}
