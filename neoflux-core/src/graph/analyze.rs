//! Offline Cycle Analysis
//!
//! A static check over an explicit adjacency map. Unlike the live cycle
//! resolver (which detects cycles via the active evaluation stack), this
//! analysis never executes a computation: it walks the map with a DFS and
//! enumerates every cycle it can reach. Intended for build-time and
//! lint-time validation of a captured graph.

use std::collections::HashMap;

use indexmap::IndexSet;

use super::node::NodeId;

/// Result of an offline graph analysis.
#[derive(Debug, Clone, Default)]
pub struct GraphAnalysis {
    /// Whether any cycle was found.
    pub has_cycles: bool,

    /// Every distinct cycle, as an ordered list of the nodes on it.
    /// Each cycle is reported once, rotated to start at its smallest
    /// node ID so the output is deterministic.
    pub cycles: Vec<Vec<NodeId>>,
}

/// Enumerate all cycles in an explicit adjacency map.
///
/// `adjacency` maps each node to the set of nodes that depend on it
/// (the direction does not matter for cycle detection, but it should be
/// consistent). Nodes mentioned only as targets are treated as having
/// no outgoing edges.
pub fn analyze_dependency_graph(
    adjacency: &HashMap<NodeId, IndexSet<NodeId>>,
) -> GraphAnalysis {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }

    let mut colors: HashMap<NodeId, Color> = HashMap::new();
    let mut path: Vec<NodeId> = Vec::new();
    let mut cycles: Vec<Vec<NodeId>> = Vec::new();

    fn visit(
        node: NodeId,
        adjacency: &HashMap<NodeId, IndexSet<NodeId>>,
        colors: &mut HashMap<NodeId, Color>,
        path: &mut Vec<NodeId>,
        cycles: &mut Vec<Vec<NodeId>>,
    ) {
        colors.insert(node, Color::Grey);
        path.push(node);

        if let Some(targets) = adjacency.get(&node) {
            for &next in targets {
                match colors.get(&next).copied().unwrap_or(Color::White) {
                    Color::White => visit(next, adjacency, colors, path, cycles),
                    Color::Grey => {
                        // Back edge: the slice of the path from `next`
                        // onward is a cycle.
                        if let Some(start) = path.iter().position(|&n| n == next) {
                            cycles.push(canonical(&path[start..]));
                        }
                    }
                    Color::Black => {}
                }
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
    }

    // Deterministic traversal order regardless of HashMap iteration.
    let mut roots: Vec<NodeId> = adjacency.keys().copied().collect();
    roots.sort();
    for root in roots {
        if colors.get(&root).copied().unwrap_or(Color::White) == Color::White {
            visit(root, adjacency, &mut colors, &mut path, &mut cycles);
        }
    }

    cycles.sort();
    cycles.dedup();

    GraphAnalysis {
        has_cycles: !cycles.is_empty(),
        cycles,
    }
}

/// Rotate a cycle so it starts at its smallest node ID.
fn canonical(cycle: &[NodeId]) -> Vec<NodeId> {
    let min = cycle
        .iter()
        .enumerate()
        .min_by_key(|&(_, id)| id)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut rotated = Vec::with_capacity(cycle.len());
    rotated.extend_from_slice(&cycle[min..]);
    rotated.extend_from_slice(&cycle[..min]);
    rotated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_map(edges: &[(u64, u64)]) -> HashMap<NodeId, IndexSet<NodeId>> {
        let mut map: HashMap<NodeId, IndexSet<NodeId>> = HashMap::new();
        for &(from, to) in edges {
            map.entry(NodeId::from(from))
                .or_default()
                .insert(NodeId::from(to));
        }
        map
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let map = edge_map(&[(0, 1), (0, 2), (1, 3), (2, 3)]);

        let analysis = analyze_dependency_graph(&map);

        assert!(!analysis.has_cycles);
        assert!(analysis.cycles.is_empty());
    }

    #[test]
    fn two_node_cycle_is_reported() {
        let map = edge_map(&[(0, 1), (1, 0)]);

        let analysis = analyze_dependency_graph(&map);

        assert!(analysis.has_cycles);
        assert_eq!(analysis.cycles.len(), 1);
        assert_eq!(analysis.cycles[0], vec![NodeId::from(0), NodeId::from(1)]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let map = edge_map(&[(5, 5)]);

        let analysis = analyze_dependency_graph(&map);

        assert!(analysis.has_cycles);
        assert_eq!(analysis.cycles[0], vec![NodeId::from(5)]);
    }

    #[test]
    fn multiple_cycles_are_all_enumerated() {
        // Two disjoint cycles plus an acyclic tail.
        let map = edge_map(&[(0, 1), (1, 0), (2, 3), (3, 4), (4, 2), (4, 9)]);

        let analysis = analyze_dependency_graph(&map);

        assert!(analysis.has_cycles);
        assert_eq!(analysis.cycles.len(), 2);
        assert!(analysis.cycles.contains(&vec![NodeId::from(0), NodeId::from(1)]));
        assert!(analysis
            .cycles
            .contains(&vec![NodeId::from(2), NodeId::from(3), NodeId::from(4)]));
    }

    #[test]
    fn empty_graph_is_clean() {
        let analysis = analyze_dependency_graph(&HashMap::new());
        assert!(!analysis.has_cycles);
    }
}
