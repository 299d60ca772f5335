//! Board-frame 3D coordinates for the inner corners of a chessboard.

use crate::core::{ObjectPointSet, PatternSize};
use nalgebra::Point3;

/// `(col, row, 0)` for every inner corner, row-major, unit square size.
pub fn object_points(pattern: PatternSize) -> ObjectPointSet {
    object_points_scaled(pattern, 1.0)
}

/// Like [`object_points`] with squares of side `square_size`.
pub fn object_points_scaled(pattern: PatternSize, square_size: f64) -> ObjectPointSet {
    ObjectPointSet::from_fn(pattern, |c, r| {
        Point3::new(c as f64 * square_size, r as f64 * square_size, 0.0)
    })
}
