//! Graph coarsening by matching.
//!
//! Both strategies fill a coarse graph together with the coarse-to-fine
//! and fine-to-coarse node maps. Fine nodes of one coarse node occupy a
//! contiguous group of `coarse_to_fine`, ordered by coarse id. Random
//! tie-breaks are seeded from the graph size, so coarsening is
//! deterministic for a given input.

use super::{Node, Weight, WeightedGraph, NPOS};
use crate::par;
use crate::profile::profile_section;
use crate::util::{randomized_hash, randomized_hash2, FlatMap, SplitMix64};

/// Coarsening strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coarsen {
    /// Sorted heavy-edge matching, node-driven.
    Hem,
    /// Greedy edge matching, edge-driven.
    #[default]
    Gem,
}

impl Coarsen {
    /// Run the selected strategy.
    pub fn apply(
        self,
        fine: &WeightedGraph,
        coarse: &mut WeightedGraph,
        coarse_to_fine: &mut Vec<Node>,
        fine_to_coarse: &mut Vec<Node>,
    ) {
        match self {
            Coarsen::Hem => coarsen_hem(fine, coarse, coarse_to_fine, fine_to_coarse),
            Coarsen::Gem => coarsen_gem(fine, coarse, coarse_to_fine, fine_to_coarse),
        }
    }
}

/// Coarsen by sorted heavy-edge matching (HEM).
///
/// Nodes are visited from lightest to heaviest; each still-unmatched node
/// pairs with its unmatched neighbor across the heaviest edge. HEM has no
/// optimality bound but avoids enumerating the edges.
pub fn coarsen_hem(
    fine: &WeightedGraph,
    coarse: &mut WeightedGraph,
    coarse_to_fine: &mut Vec<Node>,
    fine_to_coarse: &mut Vec<Node>,
) {
    let _profile = profile_section("graph::coarsen_hem");
    let mut rng = SplitMix64::new(fine.num_nodes() as u64);

    // Visit the lightest nodes first to keep the coarse weight
    // distribution even; equal weights are shuffled by the hash. The node
    // id tail keeps the unstable sort reproducible under hash collisions.
    let mut order: Vec<Node> = fine.nodes().collect();
    par::sort_by_key(&mut order, |&u| {
        (fine.weight(u), randomized_hash(u as u64), u)
    });

    fine_to_coarse.clear();
    fine_to_coarse.resize(fine.num_nodes(), NPOS);
    coarse_to_fine.clear();
    coarse_to_fine.reserve(fine.num_nodes());

    let mut coarse_node: Node = 0;
    for &u in &order {
        if fine_to_coarse[u as usize] != NPOS {
            continue;
        }
        fine_to_coarse[u as usize] = coarse_node;
        coarse_to_fine.push(u);

        // Heaviest edge to a still-unmatched neighbor wins; ties prefer
        // the lighter neighbor, then a seeded coin flip.
        let mut best: Option<(Node, Weight)> = None;
        for (v, edge_weight) in fine.wedges(u) {
            if fine_to_coarse[v as usize] != NPOS {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_node, best_weight)) => {
                    edge_weight > best_weight
                        || (edge_weight == best_weight
                            && (fine.weight(v) < fine.weight(best_node)
                                || (fine.weight(v) == fine.weight(best_node)
                                    && rng.next_bool())))
                }
            };
            if better {
                best = Some((v, edge_weight));
            }
        }
        if let Some((v, _)) = best {
            fine_to_coarse[v as usize] = coarse_node;
            coarse_to_fine.push(v);
        }
        coarse_node += 1;
    }

    build_coarse_graph(fine, coarse, coarse_to_fine, fine_to_coarse);
}

/// Coarsen by greedy edge matching (GEM).
///
/// Edges are visited from heaviest to lightest; both endpoints merge when
/// neither is matched yet. The total matched edge weight is at least half
/// of the maximum-weight matching.
pub fn coarsen_gem(
    fine: &WeightedGraph,
    coarse: &mut WeightedGraph,
    coarse_to_fine: &mut Vec<Node>,
    fine_to_coarse: &mut Vec<Node>,
) {
    let _profile = profile_section("graph::coarsen_gem");

    // Heaviest edges first; equal weights prefer the edge with the
    // lighter endpoint to keep the coarse weights even, then the hash
    // with an endpoint tail for reproducibility.
    let mut edges: Vec<(Node, Node, Weight)> = fine.wedges_all().collect();
    par::sort_by_key(&mut edges, |&(u, v, w)| {
        (
            std::cmp::Reverse(w),
            fine.weight(u).min(fine.weight(v)),
            randomized_hash2(u as u64, v as u64),
            (u, v),
        )
    });

    fine_to_coarse.clear();
    fine_to_coarse.resize(fine.num_nodes(), NPOS);
    coarse_to_fine.clear();
    coarse_to_fine.reserve(fine.num_nodes());

    let mut coarse_node: Node = 0;
    for &(u, v, _) in &edges {
        if fine_to_coarse[u as usize] != NPOS || fine_to_coarse[v as usize] != NPOS {
            continue;
        }
        fine_to_coarse[u as usize] = coarse_node;
        fine_to_coarse[v as usize] = coarse_node;
        coarse_to_fine.push(u);
        coarse_to_fine.push(v);
        coarse_node += 1;
    }

    // Unmatched nodes become singleton coarse nodes.
    for u in fine.nodes() {
        if fine_to_coarse[u as usize] != NPOS {
            continue;
        }
        fine_to_coarse[u as usize] = coarse_node;
        coarse_to_fine.push(u);
        coarse_node += 1;
    }

    build_coarse_graph(fine, coarse, coarse_to_fine, fine_to_coarse);
}

// Assemble the coarse graph: walk the contiguous groups of
// `coarse_to_fine`, sum node weights and accumulate crossing edge weights
// per coarse neighbor.
fn build_coarse_graph(
    fine: &WeightedGraph,
    coarse: &mut WeightedGraph,
    coarse_to_fine: &[Node],
    fine_to_coarse: &[Node],
) {
    coarse.clear();
    let mut group_start = 0;
    while group_start < coarse_to_fine.len() {
        let coarse_node = fine_to_coarse[coarse_to_fine[group_start] as usize];
        let mut group_end = group_start + 1;
        while group_end < coarse_to_fine.len()
            && fine_to_coarse[coarse_to_fine[group_end] as usize] == coarse_node
        {
            group_end += 1;
        }

        let mut coarse_weight: Weight = 0;
        let mut coarse_neighbors: FlatMap<Node, Weight, 32> = FlatMap::new();
        for &fine_node in &coarse_to_fine[group_start..group_end] {
            coarse_weight += fine.weight(fine_node);
            for (fine_neighbor, edge_weight) in fine.wedges(fine_node) {
                *coarse_neighbors.entry_or_default(fine_to_coarse[fine_neighbor as usize]) +=
                    edge_weight;
            }
        }
        coarse.append_node(coarse_weight, coarse_neighbors.iter().copied());
        group_start = group_end;
    }
}
