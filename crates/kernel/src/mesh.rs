//! Particle storage and the particle adjacency mesh.
//!
//! The mesh owns the neighbor graph among particles, the interpolation
//! graph used by fixed (boundary) particles, and the block-partitioned
//! edge buckets that let the physics layer iterate interaction pairs
//! without cross-block contention.

use rayon::prelude::*;

use crate::geom::{BBox, GeomPartition, Point, SearchFunc, SearchIndex};
use crate::graph::WeightedGraph;
use crate::multivector::Multivector;
use crate::par;
use crate::profile::{profile_section, stats};

/// Partition index stored in one [`PartVec`] level.
pub type PartIndex = u16;

/// Maximum number of hierarchical partition levels.
pub const MAX_PART_LEVELS: usize = 4;

/// Hierarchical partition label of a particle: one partition index per
/// level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartVec {
    levels: [PartIndex; MAX_PART_LEVELS],
}

impl PartVec {
    /// Label with every level set to `part`.
    pub const fn splat(part: PartIndex) -> Self {
        Self { levels: [part; MAX_PART_LEVELS] }
    }

    /// Partition index at `level`.
    pub fn level(&self, level: usize) -> PartIndex {
        self.levels[level]
    }

    /// Overwrite the partition index at `level`.
    pub fn set_level(&mut self, level: usize, part: PartIndex) {
        self.levels[level] = part;
    }

    /// The partition index shared at the first level on which both labels
    /// agree, or `None` when no level agrees.
    ///
    /// Two particles with a common partition at some level can have their
    /// pair processed inside that partition's block without touching any
    /// other block of the same round.
    pub fn common(a: PartVec, b: PartVec) -> Option<PartIndex> {
        a.levels
            .iter()
            .zip(b.levels.iter())
            .find(|(x, y)| x == y)
            .map(|(&x, _)| x)
    }
}

/// Particle classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum ParticleType {
    /// Regular fluid particle, fully integrated.
    Fluid = 0,
    /// Boundary particle whose state is never integrated; it interacts
    /// with the fluid through mirrored interpolation.
    Fixed = 1,
}

/// Struct-of-arrays particle storage.
///
/// All arrays are parallel: index `i` across every array refers to the
/// same particle. Fluid particles precede fixed particles, so the fixed
/// particles form a contiguous trailing sub-range.
#[derive(Debug, Clone, Default)]
pub struct ParticleArrays {
    /// Positions (meters).
    pub r: Vec<Point>,
    /// Smoothing lengths (meters).
    pub h: Vec<f32>,
    /// Hierarchical partition labels, rewritten by [`ParticleMesh::update`].
    pub parinfo: Vec<PartVec>,
    types: Vec<ParticleType>,
    num_fluid: usize,
}

impl ParticleArrays {
    /// Empty particle collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.r.len()
    }

    /// Whether there are no particles.
    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    /// All particle indices.
    pub fn all(&self) -> std::ops::Range<usize> {
        0..self.len()
    }

    /// The contiguous sub-range of fixed particles.
    pub fn fixed(&self) -> std::ops::Range<usize> {
        self.num_fluid..self.len()
    }

    /// Whether particle `i` has the given type.
    pub fn has_type(&self, i: usize, particle_type: ParticleType) -> bool {
        self.types[i] == particle_type
    }

    /// Append a fluid particle.
    ///
    /// Every fluid particle must be appended before the first fixed one.
    pub fn push_fluid(&mut self, r: Point, h: f32) {
        assert!(
            self.num_fluid == self.len(),
            "fluid particles must precede fixed particles"
        );
        self.push(r, h, ParticleType::Fluid);
        self.num_fluid += 1;
    }

    /// Append a fixed boundary particle.
    pub fn push_fixed(&mut self, r: Point, h: f32) {
        self.push(r, h, ParticleType::Fixed);
    }

    fn push(&mut self, r: Point, h: f32, particle_type: ParticleType) {
        self.r.push(r);
        self.h.push(h);
        self.parinfo.push(PartVec::splat(0));
        self.types.push(particle_type);
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Particle adjacency mesh.
///
/// [`update`](Self::update) rebuilds the neighbor graph from a spatial
/// query per particle, partitions the particles hierarchically across the
/// worker threads and buckets every interaction pair by the partition its
/// endpoints share.
pub struct ParticleMesh<S: SearchFunc, P: GeomPartition, Q: GeomPartition = P> {
    adjacency: WeightedGraph,
    interp_adjacency: Multivector<u32>,
    block_edges: Multivector<(u32, u32)>,
    search_func: S,
    partition_func: P,
    secondary_partition_func: Q,
    domain: BBox,
    num_levels: usize,
}

impl<S: SearchFunc, P: GeomPartition + Clone> ParticleMesh<S, P, P> {
    /// Mesh using `partition_func` for every level.
    pub fn new(search_func: S, partition_func: P, domain: BBox) -> Self {
        let secondary = partition_func.clone();
        Self::with_secondary(search_func, partition_func, secondary, domain)
    }
}

impl<S: SearchFunc, P: GeomPartition, Q: GeomPartition> ParticleMesh<S, P, Q> {
    /// Mesh with a distinct partitioner for the interface levels.
    pub fn with_secondary(
        search_func: S,
        partition_func: P,
        secondary_partition_func: Q,
        domain: BBox,
    ) -> Self {
        Self {
            adjacency: WeightedGraph::new(),
            interp_adjacency: Multivector::new(),
            block_edges: Multivector::new(),
            search_func,
            partition_func,
            secondary_partition_func,
            domain,
            num_levels: 2,
        }
    }

    /// Use `num_levels` hierarchical partition levels instead of the
    /// default two.
    pub fn with_num_levels(mut self, num_levels: usize) -> Self {
        assert!(
            (1..=MAX_PART_LEVELS).contains(&num_levels),
            "level count out of range"
        );
        self.num_levels = num_levels;
        self
    }

    /// Ids of the particles adjacent to particle `a`.
    pub fn adjacent(&self, a: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency.neighbors(a as u32).iter().map(|&b| b as usize)
    }

    /// Non-fixed particles used for the mirror interpolation of fixed
    /// particle `a`.
    pub fn fixed_interp<'a>(
        &'a self,
        particles: &ParticleArrays,
        a: usize,
    ) -> impl Iterator<Item = usize> + 'a {
        assert!(
            particles.has_type(a, ParticleType::Fixed),
            "particle must be of the fixed type"
        );
        let ordinal = a - particles.fixed().start;
        self.interp_adjacency.bucket(ordinal).iter().map(|&b| b as usize)
    }

    /// Unordered unique pairs of adjacent particles.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.adjacency.edges().map(|(a, b)| (a as usize, b as usize))
    }

    /// Blocks of unordered pairs; the endpoints of every pair of a block
    /// share the block's partition.
    pub fn block_pairs(
        &self,
    ) -> impl Iterator<Item = impl Iterator<Item = (usize, usize)> + '_> + '_ {
        self.block_edges
            .buckets()
            .map(|bucket| bucket.iter().map(|&(a, b)| (a as usize, b as usize)))
    }

    /// The particle adjacency as a weighted graph with unit weights.
    pub fn graph(&self) -> &WeightedGraph {
        &self.adjacency
    }

    /// Rebuild the adjacency, interpolation and block structures.
    ///
    /// `radius_func` maps a particle index to its search radius; it must
    /// be positive for every particle.
    pub fn update<F>(&mut self, particles: &mut ParticleArrays, radius_func: F)
    where
        F: Fn(usize) -> f32 + Sync + Send,
    {
        let _profile = profile_section("ParticleMesh::update");
        self.search(particles, &radius_func);
        self.partition(particles);
    }

    fn search<F>(&mut self, particles: &ParticleArrays, radius_func: &F)
    where
        F: Fn(usize) -> f32 + Sync + Send,
    {
        let _profile = profile_section("ParticleMesh::search");
        let index = self.search_func.build(&particles.r);
        let positions = &particles.r;

        // Per-particle neighbor query; results are sorted by id with the
        // particle itself dropped.
        let mut adjacency: Vec<Vec<u32>> = vec![Vec::new(); particles.len()];
        par::for_each(
            adjacency.par_iter_mut().enumerate(),
            |(a, list): (usize, &mut Vec<u32>)| {
                let radius = radius_func(a);
                assert!(radius > 0.0, "search radius must be positive");
                index.search(positions[a], radius, list);
                list.retain(|&b| b as usize != a);
                list.sort_unstable();
            },
        );

        // Adaptive radii make raw query results one-sided; restore the
        // symmetry by unioning the reverse direction in.
        let mut missing = par::fold(
            adjacency.par_iter().enumerate(),
            Vec::new(),
            |mut acc: Vec<(u32, u32)>, (a, list): (usize, &Vec<u32>)| {
                for &b in list {
                    if adjacency[b as usize].binary_search(&(a as u32)).is_err() {
                        acc.push((b, a as u32));
                    }
                }
                acc
            },
            |mut left, mut right| {
                left.append(&mut right);
                left
            },
        );
        par::sort(&mut missing);
        for &(a, b) in &missing {
            let list = &mut adjacency[a as usize];
            if let Err(position) = list.binary_search(&b) {
                list.insert(position, b);
            }
        }

        // Compress into the adjacency graph with unit weights.
        self.adjacency.clear();
        for list in &adjacency {
            self.adjacency.append_node(1, list.iter().map(|&b| (b, 1)));
        }

        // Interpolation neighbors for the fixed particles: search around
        // the mirror point across the domain boundary with a widened
        // radius, keeping only non-fixed hits.
        let fixed_start = particles.fixed().start;
        let domain = self.domain;
        let mut interp: Vec<Vec<u32>> = vec![Vec::new(); particles.fixed().len()];
        par::for_each(
            interp.par_iter_mut().enumerate(),
            |(ordinal, list): (usize, &mut Vec<u32>)| {
                let a = fixed_start + ordinal;
                let search_point = positions[a];
                let on_boundary = domain.clamp(search_point);
                let mirror = [
                    2.0 * on_boundary[0] - search_point[0],
                    2.0 * on_boundary[1] - search_point[1],
                    2.0 * on_boundary[2] - search_point[2],
                ];
                index.search(mirror, 3.0 * radius_func(a), list);
                list.retain(|&b| !particles.has_type(b as usize, ParticleType::Fixed));
                list.sort_unstable();
            },
        );
        self.interp_adjacency.clear();
        for list in &interp {
            self.interp_adjacency.append_bucket(list.iter().copied());
        }
    }

    fn partition(&mut self, particles: &mut ParticleArrays) {
        let _profile = profile_section("ParticleMesh::partition");
        let num_threads = par::num_threads();
        let num_levels = self.num_levels;
        let num_parts = num_levels * num_threads + 1;
        assert!(
            num_parts <= PartIndex::MAX as usize,
            "number of parts is too large"
        );
        let sentinel = (num_parts - 1) as PartIndex;

        // Every label starts at the sentinel; levels that never get
        // partitioned keep it.
        par::for_each(particles.parinfo.par_iter_mut(), |label: &mut PartVec| {
            *label = PartVec::splat(sentinel);
        });

        let positions = &particles.r;
        let adjacency = &self.adjacency;
        let mut level_parts: Vec<PartIndex> = vec![sentinel; particles.len()];
        let mut interface: Vec<u32> = Vec::new();
        for level in 0..num_levels {
            let init_part = (level * num_threads) as PartIndex;
            if level == 0 {
                self.partition_func
                    .partition(positions, &mut level_parts, num_threads, init_part);
            } else {
                // Only the interface particles get a partition on the
                // deeper levels; everything else keeps the sentinel.
                let sub_positions: Vec<Point> =
                    interface.iter().map(|&a| positions[a as usize]).collect();
                let mut sub_parts: Vec<PartIndex> = vec![sentinel; interface.len()];
                self.secondary_partition_func.partition(
                    &sub_positions,
                    &mut sub_parts,
                    num_threads,
                    init_part,
                );
                level_parts.fill(sentinel);
                for (&a, &part) in interface.iter().zip(sub_parts.iter()) {
                    level_parts[a as usize] = part;
                }
            }
            par::for_each(
                particles.parinfo.par_iter_mut().zip(level_parts.par_iter()),
                |(label, &part): (&mut PartVec, &PartIndex)| label.set_level(level, part),
            );

            if level + 1 == num_levels {
                break;
            }

            // Interface particles: at least one neighbor in another part
            // at this level.
            let is_interface = |a: u32| {
                let part = level_parts[a as usize];
                adjacency
                    .neighbors(a)
                    .iter()
                    .any(|&b| level_parts[b as usize] != part)
            };
            if level == 0 {
                let all: Vec<u32> = (0..particles.len() as u32).collect();
                interface.resize(all.len(), 0);
                let count = par::unstable_copy_if(&all, &mut interface, |&a| is_interface(a));
                interface.truncate(count);
                // A deterministic order here makes the deeper levels
                // reproducible regardless of the copy order.
                par::sort(&mut interface);
            } else {
                interface.retain(|&a| is_interface(a));
            }
        }

        // Bucket every interaction pair by the partition its endpoints
        // share; pairs sharing no populated level fall into the sentinel
        // bucket.
        let parinfo = &particles.parinfo;
        let edges: Vec<(u32, u32)> = self.adjacency.edges().collect();
        self.block_edges
            .assign_pairs_par_wide(num_parts, &edges, |&(a, b)| {
                PartVec::common(parinfo[a as usize], parinfo[b as usize])
                    .map_or(num_parts - 1, usize::from)
            });

        stats("ParticleMesh::block_edges", &self.block_edges.bucket_sizes());
    }
}
