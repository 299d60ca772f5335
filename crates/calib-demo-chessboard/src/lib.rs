//! Chessboard grid assembly on top of `calib-demo-core`.
//!
//! The detector works on raw X-junction positions only:
//! 1. Drop corners weaker than a fraction of the strongest response.
//! 2. Estimate two global grid axes (u, v) from nearest-neighbour edges.
//! 3. For each corner, pick at most one neighbour per direction (±u, ±v)
//!    from its k nearest neighbours, inside an angular cone and a distance
//!    window relative to its nearest-neighbour spacing. Keep mutual links.
//! 4. BFS each connected component and assign integer coordinates (i, j).
//! 5. Search a fully populated `cols x rows` (or `rows x cols`) window; the
//!    strongest complete window wins.
//! 6. Emit corners row-major with the column axis towards +x.

mod detector;
mod geom;
mod gridgraph;
mod params;

pub use detector::{ChessboardDetection, ChessboardDetector, NotFoundReason};
pub use geom::estimate_grid_axes;
pub use gridgraph::{GridGraph, NeighborDirection, NodeNeighbor};
pub use params::{ChessboardParams, GridGraphParams};
