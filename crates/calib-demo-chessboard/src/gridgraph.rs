use crate::geom::alignment;
use crate::params::GridGraphParams;
use calib_demo_core::Corner;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use std::collections::VecDeque;

/// Direction along the estimated grid axes: `Right = +u`, `Down = +v`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    pub const ALL: [NeighborDirection; 4] = [
        NeighborDirection::Right,
        NeighborDirection::Left,
        NeighborDirection::Up,
        NeighborDirection::Down,
    ];

    pub fn opposite(self) -> Self {
        match self {
            NeighborDirection::Right => NeighborDirection::Left,
            NeighborDirection::Left => NeighborDirection::Right,
            NeighborDirection::Up => NeighborDirection::Down,
            NeighborDirection::Down => NeighborDirection::Up,
        }
    }

    /// Integer grid step `(di, dj)`.
    pub fn step(self) -> (i32, i32) {
        match self {
            NeighborDirection::Right => (1, 0),
            NeighborDirection::Left => (-1, 0),
            NeighborDirection::Up => (0, -1),
            NeighborDirection::Down => (0, 1),
        }
    }

    fn slot(self) -> usize {
        match self {
            NeighborDirection::Right => 0,
            NeighborDirection::Left => 1,
            NeighborDirection::Up => 2,
            NeighborDirection::Down => 3,
        }
    }

    fn unit(self, u: &Vector2<f32>, v: &Vector2<f32>) -> Vector2<f32> {
        match self {
            NeighborDirection::Right => *u,
            NeighborDirection::Left => -*u,
            NeighborDirection::Up => -*v,
            NeighborDirection::Down => *v,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
}

/// 4-connected neighbour graph over corner indices.
#[derive(Debug)]
pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

/// Edge vectors from every corner to its nearest valid neighbour.
pub fn nearest_neighbor_edges(corners: &[Corner], params: &GridGraphParams) -> Vec<Vector2<f32>> {
    if corners.len() < 2 {
        return Vec::new();
    }
    let tree = build_tree(corners);
    let min_sq = params.min_spacing_pix * params.min_spacing_pix;

    corners
        .iter()
        .filter_map(|c| {
            tree.nearest_n::<SquaredEuclidean>(&[c.position.x, c.position.y], 4)
                .into_iter()
                .filter(|nn| nn.distance >= min_sq)
                .min_by(|a, b| a.distance.total_cmp(&b.distance))
                .map(|nn| corners[nn.item as usize].position - c.position)
        })
        .collect()
}

fn build_tree(corners: &[Corner]) -> KdTree<f32, 2> {
    let coords = corners
        .iter()
        .map(|c| [c.position.x, c.position.y])
        .collect::<Vec<_>>();
    (&coords).into()
}

impl GridGraph {
    /// Link every corner to at most one neighbour per axis direction.
    ///
    /// Only mutual links survive: `a -Right-> b` is kept iff `b -Left-> a`.
    pub fn new(
        corners: &[Corner],
        params: &GridGraphParams,
        axes: (Vector2<f32>, Vector2<f32>),
    ) -> Self {
        let n = corners.len();
        if n < 2 {
            return Self {
                neighbors: vec![Vec::new(); n],
            };
        }

        let tree = build_tree(corners);
        let (u, v) = axes;
        let min_cos = params.axis_tolerance_deg.to_radians().cos();
        let k = params.k_neighbors.max(2).min(n);

        let mut best: Vec<[Option<NodeNeighbor>; 4]> = Vec::with_capacity(n);
        for (i, corner) in corners.iter().enumerate() {
            let query = [corner.position.x, corner.position.y];
            let candidates: Vec<(usize, f32)> = tree
                .nearest_n::<SquaredEuclidean>(&query, k)
                .into_iter()
                .map(|nn| (nn.item as usize, nn.distance.sqrt()))
                .filter(|&(j, d)| j != i && d >= params.min_spacing_pix)
                .collect();

            let mut slots: [Option<NodeNeighbor>; 4] = [None; 4];
            let Some(nearest) = candidates.iter().map(|c| c.1).min_by(f32::total_cmp) else {
                best.push(slots);
                continue;
            };
            let max_dist = nearest * params.max_spacing_ratio;

            for (j, distance) in candidates {
                if distance > max_dist {
                    continue;
                }
                let e = (corners[j].position - corner.position) / distance;
                for dir in NeighborDirection::ALL {
                    if alignment(&e, &dir.unit(&u, &v)) < min_cos {
                        continue;
                    }
                    let slot = &mut slots[dir.slot()];
                    let replace = slot.is_none_or(|cur| distance < cur.distance);
                    if replace {
                        *slot = Some(NodeNeighbor {
                            direction: dir,
                            index: j,
                            distance,
                        });
                    }
                }
            }
            best.push(slots);
        }

        let neighbors = best
            .iter()
            .enumerate()
            .map(|(i, slots)| {
                slots
                    .iter()
                    .flatten()
                    .filter(|nb| {
                        best[nb.index][nb.direction.opposite().slot()]
                            .is_some_and(|back| back.index == i)
                    })
                    .copied()
                    .collect()
            })
            .collect();

        Self { neighbors }
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        components.push(component);
    }

    components
}

/// BFS from the first node of `component`, assigning integer `(i, j)` per node.
pub fn assign_grid_coordinates(graph: &GridGraph, component: &[usize]) -> Vec<(usize, i32, i32)> {
    let mut coords = Vec::with_capacity(component.len());
    let Some(&start) = component.first() else {
        return coords;
    };
    let mut visited = vec![false; graph.neighbors.len()];
    let mut queue = VecDeque::new();
    queue.push_back((start, 0, 0));

    while let Some((node_idx, i, j)) = queue.pop_front() {
        if visited[node_idx] {
            continue;
        }
        visited[node_idx] = true;
        coords.push((node_idx, i, j));

        for neighbor in &graph.neighbors[node_idx] {
            let (di, dj) = neighbor.direction.step();
            queue.push_back((neighbor.index, i + di, j + dj));
        }
    }

    coords
}
