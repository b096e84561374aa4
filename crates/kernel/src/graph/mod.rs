//! Weighted graphs in compressed sparse row form, coarsening and
//! partitioning.

pub mod coarsen;
pub mod partition;

/// Node identifier.
pub type Node = u32;

/// Node or edge weight.
pub type Weight = u64;

/// Sentinel node id marking "unassigned".
pub const NPOS: Node = Node::MAX;

/// Undirected weighted graph in compressed sparse row form.
///
/// Nodes are appended in order together with their sorted weighted
/// neighbor lists; every edge `(u, v, w)` must be supplied from both
/// endpoints with the same weight. Self-edges are dropped on append. Once
/// built, the graph is treated as read-only for the rest of the step.
#[derive(Debug, Clone)]
pub struct WeightedGraph {
    node_weights: Vec<Weight>,
    offsets: Vec<usize>,
    neighbors: Vec<Node>,
    edge_weights: Vec<Weight>,
}

impl WeightedGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self {
            node_weights: Vec::new(),
            offsets: vec![0],
            neighbors: Vec::new(),
            edge_weights: Vec::new(),
        }
    }

    /// Remove every node and edge.
    pub fn clear(&mut self) {
        self.node_weights.clear();
        self.offsets.truncate(1);
        self.neighbors.clear();
        self.edge_weights.clear();
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.node_weights.len()
    }

    /// All node ids in order.
    pub fn nodes(&self) -> std::ops::Range<Node> {
        0..self.num_nodes() as Node
    }

    /// Weight of `node`.
    pub fn weight(&self, node: Node) -> Weight {
        self.node_weights[node as usize]
    }

    /// Total node weight.
    pub fn total_weight(&self) -> Weight {
        self.node_weights.iter().sum()
    }

    /// Number of neighbors of `node`.
    pub fn degree(&self, node: Node) -> usize {
        self.offsets[node as usize + 1] - self.offsets[node as usize]
    }

    /// Neighbors of `node`, sorted by id.
    pub fn neighbors(&self, node: Node) -> &[Node] {
        &self.neighbors[self.offsets[node as usize]..self.offsets[node as usize + 1]]
    }

    /// Weighted neighbors of `node`, sorted by neighbor id.
    pub fn wedges(&self, node: Node) -> impl Iterator<Item = (Node, Weight)> + '_ {
        let range = self.offsets[node as usize]..self.offsets[node as usize + 1];
        self.neighbors[range.clone()]
            .iter()
            .copied()
            .zip(self.edge_weights[range].iter().copied())
    }

    /// Every unique edge as `(u, v)` with `u < v`.
    pub fn edges(&self) -> impl Iterator<Item = (Node, Node)> + '_ {
        self.wedges_all().map(|(u, v, _)| (u, v))
    }

    /// Every unique edge as `(u, v, weight)` with `u < v`.
    pub fn wedges_all(&self) -> impl Iterator<Item = (Node, Node, Weight)> + '_ {
        self.nodes().flat_map(move |u| {
            self.wedges(u)
                .filter(move |&(v, _)| u < v)
                .map(move |(v, w)| (u, v, w))
        })
    }

    /// Append a node with the given weight and sorted weighted neighbors.
    ///
    /// A neighbor entry referring to the node itself is skipped.
    pub fn append_node<I>(&mut self, weight: Weight, neighbors: I)
    where
        I: IntoIterator<Item = (Node, Weight)>,
    {
        let node = self.num_nodes() as Node;
        let mut prev = None;
        for (neighbor, edge_weight) in neighbors {
            if neighbor == node {
                continue;
            }
            debug_assert!(
                prev.is_none_or(|p| p < neighbor),
                "neighbors must be sorted and unique"
            );
            prev = Some(neighbor);
            self.neighbors.push(neighbor);
            self.edge_weights.push(edge_weight);
        }
        self.node_weights.push(weight);
        self.offsets.push(self.neighbors.len());
    }

    /// Build a graph from node weights and a unique undirected edge list.
    ///
    /// Convenience for tests and benchmarks; the adjacency is symmetrized
    /// and sorted internally.
    pub fn from_edges(node_weights: Vec<Weight>, edges: &[(Node, Node, Weight)]) -> Self {
        let num_nodes = node_weights.len();
        let mut adjacency: Vec<Vec<(Node, Weight)>> = vec![Vec::new(); num_nodes];
        for &(u, v, w) in edges {
            adjacency[u as usize].push((v, w));
            adjacency[v as usize].push((u, w));
        }
        let mut graph = Self::new();
        for (node, mut list) in adjacency.into_iter().enumerate() {
            list.sort_unstable();
            graph.append_node(node_weights[node], list);
        }
        graph
    }
}

impl Default for WeightedGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph(len: u32) -> WeightedGraph {
        let edges: Vec<(Node, Node, Weight)> = (0..len - 1).map(|u| (u, u + 1, 1)).collect();
        WeightedGraph::from_edges(vec![1; len as usize], &edges)
    }

    #[test]
    fn append_builds_csr() {
        let graph = path_graph(4);
        assert_eq!(graph.num_nodes(), 4);
        assert_eq!(graph.total_weight(), 4);
        assert_eq!(graph.neighbors(0), &[1]);
        assert_eq!(graph.neighbors(1), &[0, 2]);
        assert_eq!(graph.degree(2), 2);
        let wedges: Vec<_> = graph.wedges(1).collect();
        assert_eq!(wedges, vec![(0, 1), (2, 1)]);
    }

    #[test]
    fn edges_are_unique_and_ordered() {
        let graph = path_graph(4);
        let edges: Vec<_> = graph.edges().collect();
        assert_eq!(edges, vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn self_edges_are_dropped() {
        let mut graph = WeightedGraph::new();
        graph.append_node(2, [(0, 5), (1, 3)]);
        graph.append_node(2, [(0, 3), (1, 7)]);
        assert_eq!(graph.neighbors(0), &[1]);
        assert_eq!(graph.neighbors(1), &[0]);
    }
}
