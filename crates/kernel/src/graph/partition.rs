//! Graph partitioners and partition refinement.

use std::cmp::Reverse;
use std::collections::VecDeque;

use super::coarsen::Coarsen;
use super::{Node, Weight, WeightedGraph};
use crate::par;
use crate::profile::profile_section;
use crate::util::FlatMap;

/// Partition id within a graph partitioning.
pub type Part = u32;

/// Graph partitioner: writes a part id in `[0, num_parts)` for every node.
pub trait GraphPartition {
    /// Partition `graph` into `num_parts` parts.
    fn partition(&self, graph: &WeightedGraph, parts: &mut [Part], num_parts: usize);
}

/// Total weight of the edges whose endpoints lie in different parts.
pub fn edge_cut(graph: &WeightedGraph, parts: &[Part]) -> Weight {
    graph
        .wedges_all()
        .filter(|&(u, v, _)| parts[u as usize] != parts[v as usize])
        .map(|(_, _, w)| w)
        .sum()
}

/// Per-part node weight totals.
pub fn part_weights(graph: &WeightedGraph, parts: &[Part], num_parts: usize) -> Vec<Weight> {
    let mut weights = vec![0; num_parts];
    for u in graph.nodes() {
        weights[parts[u as usize] as usize] += graph.weight(u);
    }
    weights
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Uniform partitioning into contiguous index ranges of equal size (+-1).
///
/// Ignores the graph structure entirely; the baseline everything else is
/// measured against.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformPartition;

impl GraphPartition for UniformPartition {
    fn partition(&self, graph: &WeightedGraph, parts: &mut [Part], num_parts: usize) {
        let num_nodes = graph.num_nodes();
        let quotient = num_nodes / num_parts;
        let remainder = num_nodes % num_parts;
        for part in 0..num_parts {
            let first = part * quotient + part.min(remainder);
            let last = (part + 1) * quotient + (part + 1).min(remainder);
            for node in first..last {
                parts[node] = part as Part;
            }
        }
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Greedy partitioner for the coarsest graph.
///
/// Parts are grown one at a time by breadth-first search. Each part seeds
/// at the heaviest still-unassigned node (ties to the smallest id) and
/// absorbs discovered nodes until it reaches its weight target,
/// re-seeding when the frontier runs dry before the target is met. The
/// last part absorbs whatever remains. Fully deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyPartition;

impl GraphPartition for GreedyPartition {
    fn partition(&self, graph: &WeightedGraph, parts: &mut [Part], num_parts: usize) {
        let _profile = profile_section("graph::greedy_partition");
        let num_nodes = graph.num_nodes();
        assert!(num_parts > 0, "number of parts must be positive");
        assert!(num_parts <= num_nodes, "cannot have more parts than nodes");
        assert_eq!(parts.len(), num_nodes, "parts length must match the node count");

        let mut seed_order: Vec<Node> = graph.nodes().collect();
        par::sort_by_key(&mut seed_order, |&u| (Reverse(graph.weight(u)), u));
        let mut next_seed = 0;

        let mut assigned = vec![false; num_nodes];
        let mut num_assigned = 0;
        let mut remaining_weight = graph.total_weight();
        let mut queue: VecDeque<Node> = VecDeque::new();

        for part in 0..num_parts {
            let remaining_parts = num_parts - part;
            // Cap the node count so every later part still gets a seed.
            let max_nodes = num_nodes - num_assigned - (remaining_parts - 1);
            let target = remaining_weight.div_ceil(remaining_parts as Weight);

            let mut part_weight: Weight = 0;
            let mut part_nodes = 0;
            queue.clear();

            while part_nodes == 0 || (part_weight < target && part_nodes < max_nodes) {
                let node = match queue.pop_front() {
                    Some(node) if assigned[node as usize] => continue,
                    Some(node) => node,
                    None => {
                        while next_seed < seed_order.len()
                            && assigned[seed_order[next_seed] as usize]
                        {
                            next_seed += 1;
                        }
                        match seed_order.get(next_seed) {
                            Some(&seed) => seed,
                            None => break,
                        }
                    }
                };
                assigned[node as usize] = true;
                parts[node as usize] = part as Part;
                part_weight += graph.weight(node);
                part_nodes += 1;
                num_assigned += 1;
                for &neighbor in graph.neighbors(node) {
                    if !assigned[neighbor as usize] {
                        queue.push_back(neighbor);
                    }
                }
            }
            remaining_weight -= part_weight;
        }

        // Zero-weight leftovers join the last part.
        for u in graph.nodes() {
            if !assigned[u as usize] {
                parts[u as usize] = (num_parts - 1) as Part;
            }
        }
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Fiduccia-Mattheyses-style local refinement.
///
/// Repeatedly moves the highest-gain boundary node into the part that
/// lowers the edge cut the most, subject to a weight-balance bound; moved
/// nodes stay locked for the rest of the pass. Passes repeat until one
/// performs no move. The cut never increases, and part weights stay
/// within the configured tolerance of the balanced share.
#[derive(Debug, Clone, Copy)]
pub struct RefinePartsFM {
    /// Permitted part overweight, in percent of the balanced share.
    pub tolerance_percent: u32,
}

impl Default for RefinePartsFM {
    fn default() -> Self {
        Self { tolerance_percent: 5 }
    }
}

impl RefinePartsFM {
    /// Refine an existing partitioning in place.
    pub fn refine(&self, graph: &WeightedGraph, parts: &mut [Part], num_parts: usize) {
        let _profile = profile_section("graph::refine_fm");
        let num_nodes = graph.num_nodes();
        assert_eq!(parts.len(), num_nodes, "parts length must match the node count");
        if num_parts < 2 || num_nodes == 0 {
            return;
        }

        let total = graph.total_weight();
        let max_part_weight =
            (total * (100 + self.tolerance_percent as Weight)).div_ceil(100 * num_parts as Weight);

        let mut weights = part_weights(graph, parts, num_parts);
        let mut counts = vec![0usize; num_parts];
        for u in graph.nodes() {
            counts[parts[u as usize] as usize] += 1;
        }

        loop {
            let mut locked = vec![false; num_nodes];
            let mut moved = false;
            loop {
                // Best feasible positive-gain move over the boundary.
                // (gain, resulting target weight, node, target part)
                let mut best: Option<(Weight, Weight, Node, Part)> = None;
                for u in graph.nodes() {
                    if locked[u as usize] {
                        continue;
                    }
                    let from = parts[u as usize];
                    if counts[from as usize] <= 1 {
                        continue;
                    }

                    let mut connectivity: FlatMap<Part, Weight, 32> = FlatMap::new();
                    for (v, w) in graph.wedges(u) {
                        *connectivity.entry_or_default(parts[v as usize]) += w;
                    }
                    let internal = connectivity.get(from).copied().unwrap_or(0);
                    for &(to, external) in connectivity.iter() {
                        if to == from || external <= internal {
                            continue;
                        }
                        if weights[to as usize] + graph.weight(u) > max_part_weight {
                            continue;
                        }
                        let gain = external - internal;
                        let resulting = weights[to as usize] + graph.weight(u);
                        let candidate = (gain, resulting, u, to);
                        let better = match best {
                            None => true,
                            Some((best_gain, best_resulting, best_node, best_part)) => {
                                (Reverse(gain), resulting, u, to)
                                    < (Reverse(best_gain), best_resulting, best_node, best_part)
                            }
                        };
                        if better {
                            best = Some(candidate);
                        }
                    }
                }

                let Some((_, _, u, to)) = best else { break };
                let from = parts[u as usize];
                weights[from as usize] -= graph.weight(u);
                weights[to as usize] += graph.weight(u);
                counts[from as usize] -= 1;
                counts[to as usize] += 1;
                parts[u as usize] = to;
                locked[u as usize] = true;
                moved = true;
            }
            if !moved {
                break;
            }
        }
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Multilevel partitioning.
///
/// Recursively coarsens the graph, partitions the coarsest level with the
/// configured partitioner, projects the result back level by level and
/// refines it at every level.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultilevelPartition<P = GreedyPartition> {
    /// Coarsest-level partitioner.
    pub coarsest: P,
    /// Coarsening strategy.
    pub coarsen: Coarsen,
    /// Per-level refinement.
    pub refine: RefinePartsFM,
}

impl<P: GraphPartition> GraphPartition for MultilevelPartition<P> {
    fn partition(&self, graph: &WeightedGraph, parts: &mut [Part], num_parts: usize) {
        let _profile = profile_section("graph::multilevel_partition");
        assert!(num_parts > 0, "number of parts must be positive");
        assert!(num_parts <= graph.num_nodes(), "cannot have more parts than nodes");
        assert_eq!(parts.len(), graph.num_nodes(), "parts length must match the node count");
        self.partition_level(graph, parts, num_parts);
    }
}

impl<P: GraphPartition> MultilevelPartition<P> {
    fn partition_level(&self, fine: &WeightedGraph, fine_parts: &mut [Part], num_parts: usize) {
        let mut coarse = WeightedGraph::new();
        let mut coarse_to_fine = Vec::new();
        let mut fine_to_coarse = Vec::new();
        self.coarsen.apply(fine, &mut coarse, &mut coarse_to_fine, &mut fine_to_coarse);

        if coarse.num_nodes() < num_parts {
            // Coarsening overshot a tiny graph; partition this level
            // directly instead.
            self.coarsest.partition(fine, fine_parts, num_parts);
            self.refine.refine(fine, fine_parts, num_parts);
            return;
        }

        // Stop when the graph is small enough for the coarsest partitioner
        // (15 nodes per part, following Metis) or when coarsening stalls
        // with less than a 20% reduction.
        let stop = coarse.num_nodes() <= 15 * num_parts
            || coarse.num_nodes() * 10 >= fine.num_nodes() * 8;

        let mut coarse_parts = vec![0 as Part; coarse.num_nodes()];
        if stop {
            self.coarsest.partition(&coarse, &mut coarse_parts, num_parts);
        } else {
            self.partition_level(&coarse, &mut coarse_parts, num_parts);
        }

        // Project onto this level, then refine locally.
        par::transform(&fine_to_coarse, fine_parts, |&coarse_node| {
            coarse_parts[coarse_node as usize]
        });
        self.refine.refine(fine, fine_parts, num_parts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::par::set_num_threads;

    fn grid_graph(width: u32, height: u32) -> WeightedGraph {
        let mut edges = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let node = y * width + x;
                if x + 1 < width {
                    edges.push((node, node + 1, 1));
                }
                if y + 1 < height {
                    edges.push((node, node + width, 1));
                }
            }
        }
        WeightedGraph::from_edges(vec![1; (width * height) as usize], &edges)
    }

    fn check_partition(graph: &WeightedGraph, parts: &[Part], num_parts: usize) {
        assert!(parts.iter().all(|&p| (p as usize) < num_parts));
        let weights = part_weights(graph, parts, num_parts);
        assert!(weights.iter().all(|&w| w > 0), "weights = {weights:?}");
    }

    #[test]
    fn uniform_partition_splits_contiguously() {
        set_num_threads(4);
        let graph = grid_graph(10, 1);
        let mut parts = vec![0; 10];
        UniformPartition.partition(&graph, &mut parts, 4);
        assert_eq!(parts, vec![0, 0, 0, 1, 1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn greedy_partition_balances_a_path() {
        set_num_threads(4);
        let graph = grid_graph(12, 1);
        let mut parts = vec![0; 12];
        GreedyPartition.partition(&graph, &mut parts, 3);
        check_partition(&graph, &parts, 3);
        let weights = part_weights(&graph, &parts, 3);
        assert_eq!(weights, vec![4, 4, 4]);
        // Breadth-first growth over a path keeps every part an interval.
        assert_eq!(edge_cut(&graph, &parts), 2);
    }

    #[test]
    fn refine_lowers_the_cut_of_a_bad_split() {
        set_num_threads(4);
        let graph = grid_graph(8, 4);
        // Interleaved columns: close to the worst possible 2-way split.
        let mut parts: Vec<Part> = (0..32).map(|node| (node % 2) as Part).collect();
        let before = edge_cut(&graph, &parts);
        RefinePartsFM::default().refine(&graph, &mut parts, 2);
        let after = edge_cut(&graph, &parts);
        assert!(after <= before);
        check_partition(&graph, &parts, 2);
        // The balance bound still holds after refinement.
        let max_weight = part_weights(&graph, &parts, 2).into_iter().max().unwrap();
        assert!(max_weight <= 17, "max_weight = {max_weight}");
    }

    #[test]
    fn refine_keeps_a_good_split_intact() {
        set_num_threads(4);
        let graph = grid_graph(8, 4);
        // Left/right halves: already optimal for a 2-way split.
        let mut parts: Vec<Part> = (0..32).map(|node| ((node % 8) / 4) as Part).collect();
        let before = edge_cut(&graph, &parts);
        RefinePartsFM::default().refine(&graph, &mut parts, 2);
        assert_eq!(edge_cut(&graph, &parts), before);
    }

    #[test]
    fn multilevel_partition_finds_a_low_cut() {
        set_num_threads(4);
        let graph = grid_graph(32, 32);
        let num_parts = 4;

        let mut parts = vec![0; graph.num_nodes()];
        MultilevelPartition::<GreedyPartition>::default().partition(&graph, &mut parts, num_parts);
        check_partition(&graph, &parts, num_parts);

        // Four horizontal slabs cut 96 edges; anything within 2x of that
        // is a sane partition, while a random assignment cuts ~1500.
        let cut = edge_cut(&graph, &parts);
        assert!(cut <= 192, "cut = {cut}");

        // Loose balance bound: the greedy coarsest partition can overshoot
        // by one coarse node, refinement never worsens it further.
        let weights = part_weights(&graph, &parts, num_parts);
        let share = graph.total_weight() / num_parts as Weight;
        assert!(weights.iter().all(|&w| w <= share * 3 / 2), "weights = {weights:?}");
    }

    #[test]
    fn multilevel_partition_is_deterministic() {
        set_num_threads(4);
        let graph = grid_graph(24, 18);
        for coarsen in [Coarsen::Hem, Coarsen::Gem] {
            let partition = MultilevelPartition {
                coarsest: GreedyPartition,
                coarsen,
                refine: RefinePartsFM::default(),
            };
            let mut first = vec![0; graph.num_nodes()];
            partition.partition(&graph, &mut first, 6);
            let mut second = vec![0; graph.num_nodes()];
            partition.partition(&graph, &mut second, 6);
            assert_eq!(first, second);
            check_partition(&graph, &first, 6);
        }
    }

    #[test]
    #[should_panic(expected = "more parts than nodes")]
    fn multilevel_partition_rejects_too_many_parts() {
        let graph = grid_graph(2, 2);
        let mut parts = vec![0; 4];
        MultilevelPartition::<GreedyPartition>::default().partition(&graph, &mut parts, 5);
    }
}
