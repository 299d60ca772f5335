use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Raw X-junction candidate produced by a corner detector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corner {
    /// Sub-pixel position in image pixels.
    pub position: Point2<f32>,
    /// Detector response; larger is stronger.
    pub strength: f32,
}

impl Corner {
    pub fn new(x: f32, y: f32, strength: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            strength,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("pattern size must have at least 2x2 inner corners (got {cols}x{rows})")]
pub struct PatternSizeError {
    pub cols: u32,
    pub rows: u32,
}

/// Number of *inner* corners of a chessboard, `(cols, rows)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PatternSizeRepr", into = "PatternSizeRepr")]
pub struct PatternSize {
    cols: u32,
    rows: u32,
}

#[derive(Serialize, Deserialize)]
struct PatternSizeRepr {
    cols: u32,
    rows: u32,
}

impl TryFrom<PatternSizeRepr> for PatternSize {
    type Error = PatternSizeError;

    fn try_from(r: PatternSizeRepr) -> Result<Self, Self::Error> {
        PatternSize::new(r.cols, r.rows)
    }
}

impl From<PatternSize> for PatternSizeRepr {
    fn from(p: PatternSize) -> Self {
        Self {
            cols: p.cols,
            rows: p.rows,
        }
    }
}

impl PatternSize {
    pub fn new(cols: u32, rows: u32) -> Result<Self, PatternSizeError> {
        if cols < 2 || rows < 2 {
            return Err(PatternSizeError { cols, rows });
        }
        Ok(Self { cols, rows })
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Total number of inner corners.
    #[inline]
    pub fn len(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major index of `(col, row)`.
    #[inline]
    pub fn index(&self, col: u32, row: u32) -> usize {
        row as usize * self.cols as usize + col as usize
    }
}

impl Default for PatternSize {
    fn default() -> Self {
        Self { cols: 9, rows: 6 }
    }
}

impl std::fmt::Display for PatternSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Detected inner corners in row-major board order.
#[derive(Clone, Debug, PartialEq)]
pub struct CornerSet {
    pattern: PatternSize,
    points: Vec<Point2<f64>>,
}

impl CornerSet {
    /// Returns `None` unless exactly `pattern.len()` points are given.
    pub fn new(pattern: PatternSize, points: Vec<Point2<f64>>) -> Option<Self> {
        (points.len() == pattern.len()).then_some(Self { pattern, points })
    }

    pub fn pattern(&self) -> PatternSize {
        self.pattern
    }

    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, col: u32, row: u32) -> Option<Point2<f64>> {
        if col >= self.pattern.cols() || row >= self.pattern.rows() {
            return None;
        }
        self.points.get(self.pattern.index(col, row)).copied()
    }

    /// Iterate rows of the grid, each a slice of `cols` points.
    pub fn rows(&self) -> impl Iterator<Item = &[Point2<f64>]> {
        self.points.chunks(self.pattern.cols() as usize)
    }
}

/// Planar board points `(col, row, 0)` matching a [`CornerSet`] one-to-one.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectPointSet {
    pattern: PatternSize,
    points: Vec<Point3<f64>>,
}

impl ObjectPointSet {
    pub fn new(pattern: PatternSize, points: Vec<Point3<f64>>) -> Option<Self> {
        (points.len() == pattern.len()).then_some(Self { pattern, points })
    }

    /// Build one point per `(col, row)` in row-major order.
    pub fn from_fn(pattern: PatternSize, f: impl Fn(u32, u32) -> Point3<f64>) -> Self {
        let points = (0..pattern.rows())
            .flat_map(|r| (0..pattern.cols()).map(move |c| (c, r)))
            .map(|(c, r)| f(c, r))
            .collect();
        Self { pattern, points }
    }

    pub fn pattern(&self) -> PatternSize {
        self.pattern
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
