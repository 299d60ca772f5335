use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    /// Candidates closer than this are treated as duplicates, not neighbours.
    pub min_spacing_pix: f32,
    /// A neighbour may be at most this many times farther than the corner's
    /// nearest neighbour.
    pub max_spacing_ratio: f32,
    pub k_neighbors: usize,
    /// Half-angle of the cone around each grid axis direction.
    pub axis_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 4.0,
            max_spacing_ratio: 1.8,
            k_neighbors: 8,
            axis_tolerance_deg: 30.0,
        }
    }
}

/// Parameters specific to the chessboard detector.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Drop corners weaker than this fraction of the strongest response.
    pub min_strength_rel: f32,
    pub graph: GridGraphParams,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            min_strength_rel: 0.0,
            graph: GridGraphParams::default(),
        }
    }
}
