//! Chessboard detection stage: ChESS corners -> grid assembly -> sub-pixel
//! refinement -> overlay.

use crate::chessboard::{ChessboardDetector, ChessboardParams, NotFoundReason};
use crate::core::{self, CornerSet, PatternSize, SubpixParams};
use crate::draw::draw_chessboard_corners;
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use image::RgbImage;
use log::info;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Parameters of the whole detection stage.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// ChESS response threshold relative to the strongest response.
    pub threshold_rel: f32,
    pub chessboard: ChessboardParams,
    pub subpix: SubpixParams,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            chessboard: ChessboardParams::default(),
            subpix: SubpixParams::default(),
        }
    }
}

/// A fully detected board.
#[derive(Clone, Debug)]
pub struct PatternDetection {
    pub corners: CornerSet,
    /// Copy of the colour image with the corners drawn on it.
    pub overlay: RgbImage,
}

#[derive(Clone, Debug)]
pub enum DetectionOutcome {
    Found(PatternDetection),
    NotFound(NotFoundReason),
}

impl DetectionOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, DetectionOutcome::Found(_))
    }

    pub fn detection(&self) -> Option<&PatternDetection> {
        match self {
            DetectionOutcome::Found(d) => Some(d),
            DetectionOutcome::NotFound(_) => None,
        }
    }
}

/// Reasonable default settings for the `chess-corners` ChESS detector.
pub fn default_chess_config() -> ChessConfig {
    chess_config(&DetectorParams::default())
}

pub fn chess_config(params: &DetectorParams) -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = params.threshold_rel as _;
    cfg.params.nms_radius = 2;
    cfg
}

/// Convert an `image::GrayImage` into the lightweight `calib-demo-core` view type.
pub fn gray_view(img: &::image::GrayImage) -> core::GrayImageView<'_> {
    core::GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Detect raw ChESS corners using `chess-corners`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(img, cfg), fields(width = img.width(), height = img.height()))
)]
pub fn detect_chess_corners_raw(
    img: &::image::GrayImage,
    cfg: &ChessConfig,
) -> Vec<CornerDescriptor> {
    find_chess_corners_image(img, cfg)
}

/// Detect ChESS corners and adapt them into `calib-demo-core::Corner`.
pub fn detect_corners(img: &::image::GrayImage, cfg: &ChessConfig) -> Vec<core::Corner> {
    detect_chess_corners_raw(img, cfg)
        .iter()
        .map(adapt_chess_corner)
        .collect()
}

/// Find a `pattern` chessboard in `gray` and draw it onto a copy of `color`.
///
/// `color` and `gray` must be the same picture; only `gray` is analysed.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(color, gray, params),
        fields(width = gray.width(), height = gray.height(), pattern = %pattern)
    )
)]
pub fn detect_pattern(
    color: &RgbImage,
    gray: &::image::GrayImage,
    pattern: PatternSize,
    params: &DetectorParams,
) -> DetectionOutcome {
    let raw = detect_corners(gray, &chess_config(params));
    info!("{} ChESS corners", raw.len());

    let detector = ChessboardDetector::new(pattern, params.chessboard);
    let board = match detector.detect_from_corners(&raw) {
        Ok(board) => board,
        Err(reason) => {
            info!("chessboard {pattern} not found: {reason}");
            return DetectionOutcome::NotFound(reason);
        }
    };

    let initial: Vec<Point2<f32>> = board.corners.iter().map(|c| c.position).collect();
    let refined = core::refine_corners_subpix(&gray_view(gray), &initial, &params.subpix);
    let points: Vec<Point2<f64>> = refined.iter().map(|p| p.cast::<f64>()).collect();

    let Some(corners) = CornerSet::new(pattern, points) else {
        return DetectionOutcome::NotFound(NotFoundReason::NoCompleteGrid {
            best: refined.len(),
        });
    };
    let overlay = draw_chessboard_corners(color, &corners);

    DetectionOutcome::Found(PatternDetection { corners, overlay })
}

fn adapt_chess_corner(c: &CornerDescriptor) -> core::Corner {
    core::Corner::new(c.x, c.y, c.response)
}
