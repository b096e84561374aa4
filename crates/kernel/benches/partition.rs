//! Multilevel partitioning throughput on structured grid graphs.
//!
//! Run with: cargo bench -p sph-kernel --bench partition

use std::time::Instant;

use kernel::graph::coarsen::Coarsen;
use kernel::graph::partition::{edge_cut, GraphPartition};
use kernel::graph::WeightedGraph;
use kernel::{GreedyPartition, MultilevelPartition, RefinePartsFM};

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

fn main() {
    let threads = std::thread::available_parallelism().map_or(4, |count| count.get());
    kernel::par::set_num_threads(threads);
    let num_parts = threads.max(2);

    println!("=== Multilevel Partition Benchmark ({threads} threads) ===\n");
    println!(
        "{:>8} {:>6} {:>8} {:>12} {:>8}",
        "Nodes", "Parts", "Coarsen", "Time (ms)", "Cut"
    );

    for &(width, height) in &[(32u32, 32u32), (64, 64), (96, 96)] {
        let graph = grid_graph(width, height);
        for coarsen in [Coarsen::Hem, Coarsen::Gem] {
            let partition = MultilevelPartition {
                coarsest: GreedyPartition,
                coarsen,
                refine: RefinePartsFM::default(),
            };
            let mut parts = vec![0; graph.num_nodes()];
            let start = Instant::now();
            partition.partition(&graph, &mut parts, num_parts);
            let elapsed = start.elapsed();
            println!(
                "{:>8} {:>6} {:>8} {:>12.2} {:>8}",
                graph.num_nodes(),
                num_parts,
                format!("{coarsen:?}"),
                elapsed.as_secs_f64() * 1e3,
                edge_cut(&graph, &parts)
            );
        }
    }
}
