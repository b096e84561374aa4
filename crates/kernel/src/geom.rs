//! Geometry primitives consumed by the particle mesh: bounding boxes, the
//! uniform-grid neighbor search and geometric partitioning.

use crate::mesh::PartIndex;

/// Point in 3-D space (meters).
pub type Point = [f32; 3];

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    /// Minimum corner [x, y, z].
    pub min: Point,
    /// Maximum corner [x, y, z].
    pub max: Point,
}

impl BBox {
    /// Box spanning the given corners.
    pub fn new(min: Point, max: Point) -> Self {
        debug_assert!((0..3).all(|axis| min[axis] <= max[axis]));
        Self { min, max }
    }

    /// Smallest box containing every point; degenerate at the origin for
    /// an empty set.
    pub fn around(points: &[Point]) -> Self {
        let Some((&first, rest)) = points.split_first() else {
            return Self { min: [0.0; 3], max: [0.0; 3] };
        };
        let mut bbox = Self { min: first, max: first };
        for point in rest {
            for axis in 0..3 {
                bbox.min[axis] = bbox.min[axis].min(point[axis]);
                bbox.max[axis] = bbox.max[axis].max(point[axis]);
            }
        }
        bbox
    }

    /// Clamp a point into the box.
    pub fn clamp(&self, point: Point) -> Point {
        [
            point[0].clamp(self.min[0], self.max[0]),
            point[1].clamp(self.min[1], self.max[1]),
            point[2].clamp(self.min[2], self.max[2]),
        ]
    }

    /// Edge lengths along each axis.
    pub fn extents(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    /// The axis with the largest extent.
    pub fn widest_axis(&self) -> usize {
        let extents = self.extents();
        let mut widest = 0;
        for axis in 1..3 {
            if extents[axis] > extents[widest] {
                widest = axis;
            }
        }
        widest
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// Spatial search.

/// Spatial index over a fixed set of positions.
pub trait SearchIndex {
    /// Append the ids of all stored positions within `radius` of `point`
    /// to `out`, in unspecified order.
    fn search(&self, point: Point, radius: f32, out: &mut Vec<u32>);
}

/// Factory building a [`SearchIndex`] over a set of positions.
pub trait SearchFunc {
    /// The index type produced.
    type Index: SearchIndex + Sync;

    /// Build an index over `positions`.
    fn build(&self, positions: &[Point]) -> Self::Index;
}

/// Uniform-grid search factory.
///
/// The cell size should be on the order of the typical search radius;
/// queries with larger radii scan proportionally more cells.
#[derive(Debug, Clone, Copy)]
pub struct GridSearch {
    cell_size: f32,
}

impl GridSearch {
    /// Factory producing grids with the given cell edge length.
    pub fn new(cell_size: f32) -> Self {
        assert!(cell_size > 0.0, "cell size must be positive");
        Self { cell_size }
    }
}

impl SearchFunc for GridSearch {
    type Index = GridIndex;

    fn build(&self, positions: &[Point]) -> GridIndex {
        GridIndex::build(self.cell_size, positions)
    }
}

/// Uniform-grid spatial index in compressed layout.
///
/// Cell contents are stored as cell-sorted position ids plus per-cell
/// offset and count arrays, so queries chase no pointers. Query points
/// may lie anywhere, including outside the grid.
pub struct GridIndex {
    cell_size: f32,
    grid_min: Point,
    grid_dims: [u32; 3],
    positions: Vec<Point>,
    sorted_ids: Vec<u32>,
    cell_offsets: Vec<u32>,
    cell_counts: Vec<u32>,
}

impl GridIndex {
    fn build(cell_size: f32, positions: &[Point]) -> Self {
        let bbox = BBox::around(positions);
        let extents = bbox.extents();
        let grid_dims = [
            (extents[0] / cell_size).ceil().max(1.0) as u32,
            (extents[1] / cell_size).ceil().max(1.0) as u32,
            (extents[2] / cell_size).ceil().max(1.0) as u32,
        ];
        let total_cells =
            grid_dims[0] as usize * grid_dims[1] as usize * grid_dims[2] as usize;

        let mut index = Self {
            cell_size,
            grid_min: bbox.min,
            grid_dims,
            positions: positions.to_vec(),
            sorted_ids: vec![0; positions.len()],
            cell_offsets: vec![0; total_cells],
            cell_counts: vec![0; total_cells],
        };

        // Count, prefix-sum, scatter.
        let cells: Vec<u32> = positions
            .iter()
            .map(|&point| index.cell_of(index.clamp_cell(point)))
            .collect();
        for &cell in &cells {
            index.cell_counts[cell as usize] += 1;
        }
        let mut running = 0;
        for cell in 0..total_cells {
            index.cell_offsets[cell] = running;
            running += index.cell_counts[cell];
        }
        let mut write_heads = index.cell_offsets.clone();
        for (id, &cell) in cells.iter().enumerate() {
            index.sorted_ids[write_heads[cell as usize] as usize] = id as u32;
            write_heads[cell as usize] += 1;
        }
        index
    }

    // Cell coordinates of a point, clamped into the grid.
    fn clamp_cell(&self, point: Point) -> [u32; 3] {
        let mut cell = [0; 3];
        for axis in 0..3 {
            cell[axis] = ((point[axis] - self.grid_min[axis]) / self.cell_size)
                .floor()
                .max(0.0)
                .min((self.grid_dims[axis] - 1) as f32) as u32;
        }
        cell
    }

    fn cell_of(&self, cell: [u32; 3]) -> u32 {
        cell[0] + cell[1] * self.grid_dims[0] + cell[2] * self.grid_dims[0] * self.grid_dims[1]
    }
}

impl SearchIndex for GridIndex {
    fn search(&self, point: Point, radius: f32, out: &mut Vec<u32>) {
        debug_assert!(radius > 0.0);
        if self.positions.is_empty() {
            return;
        }
        let low = self.clamp_cell([point[0] - radius, point[1] - radius, point[2] - radius]);
        let high = self.clamp_cell([point[0] + radius, point[1] + radius, point[2] + radius]);
        let radius_sq = radius * radius;

        for cz in low[2]..=high[2] {
            for cy in low[1]..=high[1] {
                for cx in low[0]..=high[0] {
                    let cell = self.cell_of([cx, cy, cz]) as usize;
                    let start = self.cell_offsets[cell] as usize;
                    let count = self.cell_counts[cell] as usize;
                    for &id in &self.sorted_ids[start..start + count] {
                        let stored = self.positions[id as usize];
                        let dx = point[0] - stored[0];
                        let dy = point[1] - stored[1];
                        let dz = point[2] - stored[2];
                        if dx * dx + dy * dy + dz * dz <= radius_sq {
                            out.push(id);
                        }
                    }
                }
            }
        }
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// Geometric partitioning.

/// Geometry partitioner: writes a part id in `[init_part, init_part +
/// num_parts)` for every position.
pub trait GeomPartition {
    /// Partition `positions` into `num_parts` parts starting at
    /// `init_part`.
    fn partition(
        &self,
        positions: &[Point],
        parts: &mut [PartIndex],
        num_parts: usize,
        init_part: PartIndex,
    );
}

impl GeomPartition for crate::graph::partition::UniformPartition {
    fn partition(
        &self,
        positions: &[Point],
        parts: &mut [PartIndex],
        num_parts: usize,
        init_part: PartIndex,
    ) {
        assert_eq!(positions.len(), parts.len(), "parts length must match");
        let quotient = positions.len() / num_parts;
        let remainder = positions.len() % num_parts;
        for part in 0..num_parts {
            let first = part * quotient + part.min(remainder);
            let last = (part + 1) * quotient + (part + 1).min(remainder);
            for position in first..last {
                parts[position] = init_part + part as PartIndex;
            }
        }
    }
}

/// Recursive coordinate bisection.
///
/// Splits the widest bounding-box axis at the weighted median position,
/// dividing the part budget proportionally between the halves. The
/// comparison key carries the position id, so the result is deterministic
/// even for coincident coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecursiveCoordinateBisection;

impl GeomPartition for RecursiveCoordinateBisection {
    fn partition(
        &self,
        positions: &[Point],
        parts: &mut [PartIndex],
        num_parts: usize,
        init_part: PartIndex,
    ) {
        assert!(num_parts > 0, "number of parts must be positive");
        assert_eq!(positions.len(), parts.len(), "parts length must match");
        let mut ids: Vec<u32> = (0..positions.len() as u32).collect();
        bisect(positions, &mut ids, parts, num_parts, init_part);
    }
}

fn bisect(
    positions: &[Point],
    ids: &mut [u32],
    parts: &mut [PartIndex],
    num_parts: usize,
    first_part: PartIndex,
) {
    if num_parts == 1 || ids.len() <= 1 {
        for &id in ids.iter() {
            parts[id as usize] = first_part;
        }
        return;
    }

    // Proportional budget split: the left half takes `left_parts` parts
    // and the matching share of the positions.
    let left_parts = num_parts / 2;
    let right_parts = num_parts - left_parts;
    let split = ids.len() * left_parts / num_parts;

    let bbox = BBox::around(&ids.iter().map(|&id| positions[id as usize]).collect::<Vec<_>>());
    let axis = bbox.widest_axis();
    ids.select_nth_unstable_by(split.max(1) - 1, |&a, &b| {
        positions[a as usize][axis]
            .total_cmp(&positions[b as usize][axis])
            .then(a.cmp(&b))
    });

    let (left, right) = ids.split_at_mut(split.max(1));
    bisect(positions, left, parts, left_parts.max(1), first_part);
    bisect(
        positions,
        right,
        parts,
        right_parts,
        first_part + left_parts.max(1) as PartIndex,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_contains_and_clamps() {
        let bbox = BBox::around(&[[0.0, 1.0, 2.0], [3.0, -1.0, 0.5]]);
        assert_eq!(bbox.min, [0.0, -1.0, 0.5]);
        assert_eq!(bbox.max, [3.0, 1.0, 2.0]);
        assert_eq!(bbox.clamp([5.0, 0.0, 0.0]), [3.0, 0.0, 0.5]);
        assert_eq!(bbox.widest_axis(), 0);
    }

    #[test]
    fn grid_search_finds_close_pairs_only() {
        let positions = vec![
            [0.5, 0.5, 0.5],
            [0.51, 0.5, 0.5],
            [0.9, 0.9, 0.9],
        ];
        let index = GridSearch::new(0.2).build(&positions);

        let mut out = Vec::new();
        index.search(positions[0], 0.2, &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![0, 1]);

        out.clear();
        index.search(positions[2], 0.05, &mut out);
        assert_eq!(out, vec![2]);
    }

    #[test]
    fn grid_search_handles_points_outside_the_grid() {
        let positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let index = GridSearch::new(0.5).build(&positions);
        let mut out = Vec::new();
        // A mirror point below the box still sees its neighborhood.
        index.search([0.0, -0.4, 0.0], 0.5, &mut out);
        assert_eq!(out, vec![0]);
        out.clear();
        index.search([-10.0, 0.0, 0.0], 0.5, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn grid_search_crosses_cell_boundaries() {
        let positions = vec![[0.19, 0.5, 0.5], [0.21, 0.5, 0.5]];
        let index = GridSearch::new(0.2).build(&positions);
        let mut out = Vec::new();
        index.search(positions[0], 0.2, &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![0, 1]);
    }

    #[test]
    fn bisection_separates_clusters() {
        // Four tight clusters at the corners of a square.
        let mut positions = Vec::new();
        for &(cx, cy) in &[(0.0f32, 0.0f32), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)] {
            for i in 0..25 {
                positions.push([cx + (i % 5) as f32 * 0.01, cy + (i / 5) as f32 * 0.01, 0.0]);
            }
        }
        let mut parts = vec![0; positions.len()];
        RecursiveCoordinateBisection.partition(&positions, &mut parts, 4, 0);

        // Every cluster lands in exactly one part, and all parts are used.
        let mut cluster_parts = Vec::new();
        for cluster in 0..4 {
            let slice = &parts[cluster * 25..(cluster + 1) * 25];
            assert!(slice.iter().all(|&p| p == slice[0]));
            cluster_parts.push(slice[0]);
        }
        cluster_parts.sort_unstable();
        assert_eq!(cluster_parts, vec![0, 1, 2, 3]);
    }

    #[test]
    fn bisection_respects_init_part() {
        let positions: Vec<Point> = (0..10).map(|i| [i as f32, 0.0, 0.0]).collect();
        let mut parts = vec![0; 10];
        RecursiveCoordinateBisection.partition(&positions, &mut parts, 2, 4);
        assert!(parts.iter().all(|&p| p == 4 || p == 5));
        assert!(parts.iter().any(|&p| p == 4));
        assert!(parts.iter().any(|&p| p == 5));
    }

    #[test]
    fn bisection_is_balanced() {
        let positions: Vec<Point> = (0..100)
            .map(|i| [(i % 10) as f32, (i / 10) as f32, 0.0])
            .collect();
        let mut parts = vec![0; 100];
        RecursiveCoordinateBisection.partition(&positions, &mut parts, 4, 0);
        let mut counts = [0usize; 4];
        for &p in &parts {
            counts[p as usize] += 1;
        }
        assert_eq!(counts, [25, 25, 25, 25]);
    }
}
