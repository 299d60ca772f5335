use crate::geom::estimate_grid_axes;
use crate::gridgraph::{
    assign_grid_coordinates, connected_components, nearest_neighbor_edges, GridGraph,
};
use crate::params::ChessboardParams;
use calib_demo_core::{Corner, PatternSize};
use log::{debug, info};
use nalgebra::Vector2;
use std::collections::{HashMap, HashSet};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Why no chessboard could be assembled from a corner cloud.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    #[error("too few corners ({found} found, {required} required)")]
    TooFewCorners { found: usize, required: usize },
    #[error("no dominant grid axes in the corner cloud")]
    NoGridAxes,
    #[error("no complete grid window (best window had {best} corners)")]
    NoCompleteGrid { best: usize },
}

/// A complete `cols x rows` grid in canonical row-major order.
#[derive(Clone, Debug)]
pub struct ChessboardDetection {
    pub pattern: PatternSize,
    /// `pattern.len()` corners, row 0 first; column axis points to +x.
    pub corners: Vec<Corner>,
    /// Index of each output corner in the detector input.
    pub source_indices: Vec<usize>,
    /// Size of the connected component the window was taken from.
    pub component_size: usize,
}

/// Assembles a known-size chessboard from raw X-junction corners.
pub struct ChessboardDetector {
    pub pattern: PatternSize,
    pub params: ChessboardParams,
}

/// Candidate window in BFS grid coordinates.
struct Window {
    i0: i32,
    j0: i32,
    /// Extent along BFS `i`.
    w: i32,
    /// Extent along BFS `j`.
    h: i32,
    score: f32,
    component_size: usize,
    /// Cell -> index into the filtered corner list.
    cells: Vec<usize>,
}

impl Window {
    fn node(&self, a: i32, b: i32) -> usize {
        self.cells[(b * self.w + a) as usize]
    }
}

impl ChessboardDetector {
    pub fn new(pattern: PatternSize, params: ChessboardParams) -> Self {
        Self { pattern, params }
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, corners),
            fields(num_corners = corners.len(), pattern = %self.pattern)
        )
    )]
    pub fn detect_from_corners(
        &self,
        corners: &[Corner],
    ) -> Result<ChessboardDetection, NotFoundReason> {
        let required = self.pattern.len();

        // 1. Filter by strength relative to the strongest response.
        let max_strength = corners
            .iter()
            .map(|c| c.strength)
            .fold(f32::NEG_INFINITY, f32::max);
        let threshold = if max_strength > 0.0 {
            self.params.min_strength_rel * max_strength
        } else {
            f32::NEG_INFINITY
        };
        let (strong, source): (Vec<Corner>, Vec<usize>) = corners
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                c.strength >= threshold && c.position.x.is_finite() && c.position.y.is_finite()
            })
            .map(|(idx, c)| (*c, idx))
            .unzip();

        info!(
            "{} raw corners, {} after strength filter (pattern {})",
            corners.len(),
            strong.len(),
            self.pattern
        );

        if strong.len() < required {
            return Err(NotFoundReason::TooFewCorners {
                found: strong.len(),
                required,
            });
        }

        // 2. Global axes from nearest-neighbour edges.
        let edges = nearest_neighbor_edges(&strong, &self.params.graph);
        let Some(axes) = estimate_grid_axes(&edges) else {
            info!("failed to estimate grid axes from {} edges", edges.len());
            return Err(NotFoundReason::NoGridAxes);
        };
        debug!("grid axes u={:?} v={:?}", axes.0, axes.1);

        // 3. Neighbour graph, components, integer coordinates.
        let graph = GridGraph::new(&strong, &self.params.graph, axes);
        let components = connected_components(&graph);
        debug!("{} connected components", components.len());

        let mut best_window: Option<Window> = None;
        let mut best_partial = 0usize;

        for component in components.iter().filter(|c| c.len() >= 2) {
            let coords = assign_grid_coordinates(&graph, component);
            let (window, partial) = self.search_windows(&strong, &coords, component.len());
            best_partial = best_partial.max(partial);
            if let Some(window) = window {
                let better = best_window
                    .as_ref()
                    .is_none_or(|cur| window.score > cur.score);
                if better {
                    best_window = Some(window);
                }
            }
        }

        let Some(window) = best_window else {
            info!(
                "no complete {} window (best had {best_partial}/{required} corners)",
                self.pattern
            );
            return Err(NotFoundReason::NoCompleteGrid { best: best_partial });
        };

        // 4. Canonical row-major order.
        let order = self.canonical_order(&strong, &window);
        let out_corners = order.iter().map(|&k| strong[k]).collect();
        let source_indices = order.iter().map(|&k| source[k]).collect();

        info!(
            "chessboard {} found in component of {} corners",
            self.pattern, window.component_size
        );

        Ok(ChessboardDetection {
            pattern: self.pattern,
            corners: out_corners,
            source_indices,
            component_size: window.component_size,
        })
    }

    /// Best complete window of one component, plus the largest populated
    /// count seen in any window of the right size.
    fn search_windows(
        &self,
        corners: &[Corner],
        coords: &[(usize, i32, i32)],
        component_size: usize,
    ) -> (Option<Window>, usize) {
        let mut map: HashMap<(i32, i32), usize> = HashMap::new();
        let mut conflicts: HashSet<(i32, i32)> = HashSet::new();
        let (mut min_i, mut min_j, mut max_i, mut max_j) = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);

        for &(idx, i, j) in coords {
            if let Some(&other) = map.get(&(i, j)) {
                if other != idx {
                    conflicts.insert((i, j));
                }
                continue;
            }
            map.insert((i, j), idx);
            min_i = min_i.min(i);
            min_j = min_j.min(j);
            max_i = max_i.max(i);
            max_j = max_j.max(j);
        }
        if map.is_empty() {
            return (None, 0);
        }
        if !conflicts.is_empty() {
            debug!("{} conflicting grid cells", conflicts.len());
        }

        let cols = self.pattern.cols() as i32;
        let rows = self.pattern.rows() as i32;
        let mut shapes = vec![(cols, rows)];
        if cols != rows {
            shapes.push((rows, cols));
        }

        let mut best: Option<Window> = None;
        let mut partial = 0usize;

        for (w, h) in shapes {
            let last_i = min_i.max(max_i - w + 1);
            let last_j = min_j.max(max_j - h + 1);
            for j0 in min_j..=last_j {
                for i0 in min_i..=last_i {
                    let mut cells = Vec::with_capacity((w * h) as usize);
                    let mut score = 0.0f32;
                    for b in 0..h {
                        for a in 0..w {
                            let key = (i0 + a, j0 + b);
                            if conflicts.contains(&key) {
                                continue;
                            }
                            if let Some(&idx) = map.get(&key) {
                                cells.push(idx);
                                score += corners[idx].strength;
                            }
                        }
                    }
                    partial = partial.max(cells.len());
                    if cells.len() != (w * h) as usize {
                        continue;
                    }
                    if best.as_ref().is_none_or(|cur| score > cur.score) {
                        best = Some(Window {
                            i0,
                            j0,
                            w,
                            h,
                            score,
                            component_size,
                            cells,
                        });
                    }
                }
            }
        }

        if let Some(win) = &best {
            debug!(
                "complete {}x{} window at ({}, {}) score {:.3}",
                win.w, win.h, win.i0, win.j0, win.score
            );
        }
        (best, partial)
    }

    /// Map pattern `(col, row)` onto window cells so that the column axis
    /// points to +x (ties broken by +y) and the row axis to +y.
    fn canonical_order(&self, corners: &[Corner], window: &Window) -> Vec<usize> {
        let cols = self.pattern.cols() as i32;
        let rows = self.pattern.rows() as i32;

        let mut layouts = Vec::with_capacity(2);
        if window.w == cols && window.h == rows {
            layouts.push(false);
        }
        if window.w == rows && window.h == cols {
            layouts.push(true);
        }

        let cell = |transposed: bool, c: i32, r: i32| {
            if transposed {
                window.node(r, c)
            } else {
                window.node(c, r)
            }
        };
        let pos = |k: usize| corners[k].position.coords;

        // Mean image direction of increasing col (resp. row).
        let axis_dirs = |transposed: bool| {
            let mut col_dir = Vector2::<f32>::zeros();
            for r in 0..rows {
                col_dir += pos(cell(transposed, cols - 1, r)) - pos(cell(transposed, 0, r));
            }
            let mut row_dir = Vector2::<f32>::zeros();
            for c in 0..cols {
                row_dir += pos(cell(transposed, c, rows - 1)) - pos(cell(transposed, c, 0));
            }
            (col_dir, row_dir)
        };

        let horizontalness = |d: Vector2<f32>| d.x.abs() / d.norm().max(f32::EPSILON);
        let transposed = layouts
            .iter()
            .copied()
            .max_by(|&a, &b| {
                horizontalness(axis_dirs(a).0).total_cmp(&horizontalness(axis_dirs(b).0))
            })
            .unwrap_or(false);

        let (col_dir, row_dir) = axis_dirs(transposed);
        let flip_c = points_backwards(col_dir.x, col_dir.y, col_dir.norm());
        let flip_r = points_backwards(row_dir.y, row_dir.x, row_dir.norm());
        debug!("canonical order: transposed={transposed} flip_c={flip_c} flip_r={flip_r}");

        let mut order = Vec::with_capacity(self.pattern.len());
        for r in 0..rows {
            for c in 0..cols {
                let cc = if flip_c { cols - 1 - c } else { c };
                let rr = if flip_r { rows - 1 - r } else { r };
                order.push(cell(transposed, cc, rr));
            }
        }
        order
    }
}

/// True when the primary component is negative, using the secondary one
/// when the primary is negligible.
fn points_backwards(primary: f32, secondary: f32, norm: f32) -> bool {
    let eps = 1e-3 * norm;
    if primary.abs() > eps {
        primary < 0.0
    } else {
        secondary < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn board_cloud(cols: usize, rows: usize, spacing: f32, angle: f32) -> Vec<Corner> {
        let (s, c) = angle.sin_cos();
        let mut out = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                let x = i as f32 * spacing;
                let y = j as f32 * spacing;
                out.push(Corner::new(
                    200.0 + c * x - s * y,
                    150.0 + s * x + c * y,
                    1.0 + 0.01 * (i + j) as f32,
                ));
            }
        }
        out
    }

    fn detector(cols: u32, rows: u32) -> ChessboardDetector {
        ChessboardDetector::new(
            PatternSize::new(cols, rows).expect("pattern"),
            ChessboardParams::default(),
        )
    }

    fn assert_canonical(det: &ChessboardDetection) {
        let cols = det.pattern.cols() as usize;
        let rows = det.pattern.rows() as usize;
        assert_eq!(det.corners.len(), cols * rows);
        let p = |c: usize, r: usize| det.corners[r * cols + c].position;
        assert!(p(cols - 1, 0).x > p(0, 0).x);
        assert!(p(0, rows - 1).y > p(0, 0).y);
    }

    #[test]
    fn detects_axis_aligned_grid_in_row_major_order() {
        let cloud = board_cloud(9, 6, 20.0, 0.0);
        let det = detector(9, 6).detect_from_corners(&cloud).expect("grid");
        assert_eq!(det.source_indices, (0..54).collect::<Vec<_>>());
        assert_eq!(det.component_size, 54);
        assert_canonical(&det);
    }

    #[test]
    fn detects_rotated_and_shuffled_grid() {
        let mut cloud = board_cloud(9, 6, 18.0, 0.35);
        cloud.reverse();
        let det = detector(9, 6).detect_from_corners(&cloud).expect("grid");
        assert_canonical(&det);

        // Consecutive corners in a row are one spacing apart.
        for r in 0..6 {
            for c in 0..8 {
                let a = det.corners[r * 9 + c].position;
                let b = det.corners[r * 9 + c + 1].position;
                assert_abs_diff_eq!((b - a).norm(), 18.0, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn transposed_board_is_reordered() {
        // 6 columns by 9 rows in the image, searched as 9x6.
        let cloud = board_cloud(6, 9, 20.0, 0.0);
        let det = detector(9, 6).detect_from_corners(&cloud).expect("grid");
        assert_eq!(det.corners.len(), 54);
        let first = det.corners[0].position;
        let second = det.corners[1].position;
        // The 9-long axis runs vertically, so it cannot point to +x.
        assert_abs_diff_eq!(first.x, second.x, epsilon = 1e-3);
        assert!(second.y > first.y);
    }

    #[test]
    fn larger_grid_yields_strongest_window() {
        let cloud = board_cloud(11, 8, 16.0, 0.1);
        let det = detector(9, 6).detect_from_corners(&cloud).expect("grid");
        assert_canonical(&det);
        // Strength grows with i + j, so the window sits in the far corner.
        assert_eq!(*det.source_indices.last().expect("corner"), 11 * 8 - 1);
    }

    #[test]
    fn ignores_isolated_clutter() {
        let mut cloud = board_cloud(9, 6, 20.0, 0.0);
        cloud.push(Corner::new(20.0, 20.0, 5.0));
        cloud.push(Corner::new(600.0, 40.0, 5.0));
        let det = detector(9, 6).detect_from_corners(&cloud).expect("grid");
        assert!(det.source_indices.iter().all(|&i| i < 54));
    }

    #[test]
    fn reports_too_few_corners() {
        let cloud = board_cloud(4, 4, 20.0, 0.0);
        let err = detector(9, 6).detect_from_corners(&cloud).unwrap_err();
        assert_eq!(
            err,
            NotFoundReason::TooFewCorners {
                found: 16,
                required: 54
            }
        );
        assert!(detector(9, 6).detect_from_corners(&[]).is_err());
    }

    #[test]
    fn strength_filter_drops_weak_corners() {
        let mut cloud = board_cloud(9, 6, 20.0, 0.0);
        cloud[10].strength = 0.01;
        let mut det = detector(9, 6);
        det.params.min_strength_rel = 0.5;
        let err = det.detect_from_corners(&cloud).unwrap_err();
        assert_eq!(
            err,
            NotFoundReason::TooFewCorners {
                found: 53,
                required: 54
            }
        );
    }

    #[test]
    fn incomplete_grid_reports_best_window() {
        let mut cloud = board_cloud(10, 7, 20.0, 0.0);
        // Knock out a full interior column so no 9x6 window survives.
        cloud.retain(|c| (c.position.x - 300.0).abs() > 1.0);
        let err = detector(9, 6).detect_from_corners(&cloud).unwrap_err();
        match err {
            NotFoundReason::NoCompleteGrid { best } => assert!(best > 0 && best < 54),
            other => panic!("unexpected {other:?}"),
        }
    }
}
