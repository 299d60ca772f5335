//! Presentation of the pipeline result as three titled panels.
//!
//! Missing panels (no corners, no calibration) are replaced by labelled
//! placeholders so every renderer sees the same layout.

use crate::draw::placeholder_tile;
use image::{imageops, Rgb, RgbImage};
use log::info;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const ORIGINAL_TITLE: &str = "Original Image";
pub const CORNERS_TITLE: &str = "With Corners";
pub const UNDISTORTED_TITLE: &str = "Undistorted Image";
pub const CORNERS_PLACEHOLDER: &str = "Corners not found";
pub const CALIBRATION_PLACEHOLDER: &str = "Not Calibrated";

#[derive(thiserror::Error, Debug)]
pub enum DisplayError {
    #[error("failed to write composite {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Receives the three panels of a finished run.
pub trait Display {
    fn render(
        &mut self,
        original: &RgbImage,
        corners_overlay: Option<&RgbImage>,
        undistorted: Option<&RgbImage>,
    ) -> Result<(), DisplayError>;
}

#[derive(Clone, Copy, Debug)]
pub enum PanelContent<'a> {
    Image(&'a RgbImage),
    Placeholder(&'static str),
}

#[derive(Clone, Copy, Debug)]
pub struct Panel<'a> {
    pub title: &'static str,
    pub content: PanelContent<'a>,
}

/// The fixed left-to-right panel layout.
pub fn panels<'a>(
    original: &'a RgbImage,
    corners_overlay: Option<&'a RgbImage>,
    undistorted: Option<&'a RgbImage>,
) -> [Panel<'a>; 3] {
    let content = |img: Option<&'a RgbImage>, label| match img {
        Some(img) => PanelContent::Image(img),
        None => PanelContent::Placeholder(label),
    };
    [
        Panel {
            title: ORIGINAL_TITLE,
            content: PanelContent::Image(original),
        },
        Panel {
            title: CORNERS_TITLE,
            content: content(corners_overlay, CORNERS_PLACEHOLDER),
        },
        Panel {
            title: UNDISTORTED_TITLE,
            content: content(undistorted, CALIBRATION_PLACEHOLDER),
        },
    ]
}

/// Prints one line per panel.
pub struct ConsoleDisplay<W: Write> {
    out: W,
}

impl ConsoleDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Display for ConsoleDisplay<W> {
    fn render(
        &mut self,
        original: &RgbImage,
        corners_overlay: Option<&RgbImage>,
        undistorted: Option<&RgbImage>,
    ) -> Result<(), DisplayError> {
        for panel in panels(original, corners_overlay, undistorted) {
            match panel.content {
                PanelContent::Image(img) => {
                    writeln!(self.out, "[{}] {}x{}", panel.title, img.width(), img.height())?
                }
                PanelContent::Placeholder(label) => {
                    writeln!(self.out, "[{}] {}", panel.title, label)?
                }
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Lays the panels out side by side in one image, optionally saved as PNG.
#[derive(Debug)]
pub struct PanelCompositor {
    output: Option<PathBuf>,
    gap: u32,
    composite: Option<RgbImage>,
}

impl Default for PanelCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelCompositor {
    pub fn new() -> Self {
        Self {
            output: None,
            gap: 8,
            composite: None,
        }
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// The last composite built by [`Display::render`].
    pub fn composite(&self) -> Option<&RgbImage> {
        self.composite.as_ref()
    }

    fn compose(&self, panels: &[Panel<'_>]) -> RgbImage {
        let (w, h) = panels
            .iter()
            .filter_map(|p| match p.content {
                PanelContent::Image(img) => Some(img.dimensions()),
                PanelContent::Placeholder(_) => None,
            })
            .fold((1, 1), |(mw, mh), (iw, ih)| (mw.max(iw), mh.max(ih)));

        let n = panels.len() as u32;
        let width = n * w + n.saturating_sub(1) * self.gap;
        let mut canvas = RgbImage::from_pixel(width, h, Rgb([0, 0, 0]));

        for (k, panel) in panels.iter().enumerate() {
            let x = (k as u32 * (w + self.gap)) as i64;
            match panel.content {
                PanelContent::Image(img) => imageops::replace(&mut canvas, img, x, 0),
                PanelContent::Placeholder(_) => {
                    imageops::replace(&mut canvas, &placeholder_tile(w, h), x, 0)
                }
            }
        }
        canvas
    }
}

impl Display for PanelCompositor {
    fn render(
        &mut self,
        original: &RgbImage,
        corners_overlay: Option<&RgbImage>,
        undistorted: Option<&RgbImage>,
    ) -> Result<(), DisplayError> {
        let layout = panels(original, corners_overlay, undistorted);
        let titles: Vec<String> = layout
            .iter()
            .map(|p| match p.content {
                PanelContent::Image(_) => p.title.to_string(),
                PanelContent::Placeholder(label) => format!("{} ({label})", p.title),
            })
            .collect();
        info!("composite panels: {}", titles.join(" | "));

        let composite = self.compose(&layout);
        if let Some(path) = &self.output {
            composite.save(path).map_err(|source| DisplayError::Save {
                path: path.clone(),
                source,
            })?;
            info!("composite written to {}", path.display());
        }
        self.composite = Some(composite);
        Ok(())
    }
}

/// A panel as captured by [`RecordingDisplay`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedPanel {
    pub title: &'static str,
    pub image: Option<RgbImage>,
    pub placeholder: Option<&'static str>,
}

/// Keeps the panels of the most recent render.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    pub panels: Vec<RecordedPanel>,
    pub renders: usize,
}

impl RecordingDisplay {
    pub fn placeholders(&self) -> Vec<&'static str> {
        self.panels.iter().filter_map(|p| p.placeholder).collect()
    }

    pub fn titles(&self) -> Vec<&'static str> {
        self.panels.iter().map(|p| p.title).collect()
    }
}

impl Display for RecordingDisplay {
    fn render(
        &mut self,
        original: &RgbImage,
        corners_overlay: Option<&RgbImage>,
        undistorted: Option<&RgbImage>,
    ) -> Result<(), DisplayError> {
        self.panels = panels(original, corners_overlay, undistorted)
            .iter()
            .map(|p| match p.content {
                PanelContent::Image(img) => RecordedPanel {
                    title: p.title,
                    image: Some(img.clone()),
                    placeholder: None,
                },
                PanelContent::Placeholder(label) => RecordedPanel {
                    title: p.title,
                    image: None,
                    placeholder: Some(label),
                },
            })
            .collect();
        self.renders += 1;
        Ok(())
    }
}
