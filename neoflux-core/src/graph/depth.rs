//! Depth-Ordered Propagation Planning
//!
//! This module solves the diamond problem. If computation `D` depends on
//! both `B` and `C`, and both depend on signal `A`, a naive propagator
//! invalidates `D` twice (once via each path) and may evaluate `D` after
//! only `B` has updated, reading a stale `C`.
//!
//! # Algorithm
//!
//! 1. Collect every computation reachable from the changed sources
//!    (breadth-first over dependent edges). Each node enters the set
//!    exactly once, no matter how many paths reach it.
//!
//! 2. Compute each affected node's dependency depth: `0` for nodes with
//!    no reactive dependencies, otherwise `1 + max(depth of each
//!    dependency)`. Self-reference during the walk counts as depth `0`
//!    so a transient cycle cannot recurse forever.
//!
//! 3. Sort the affected set by ascending depth (stable, so discovery
//!    order breaks ties deterministically).
//!
//! The propagator then makes two passes over the plan: first marking
//! every node stale without further propagation, then invalidating in
//! the same order. `D` is therefore only processed after both `B` and
//! `C` have already been marked, and pulls fresh values from both.

use std::collections::{HashMap, HashSet, VecDeque};

use super::edges::DependencyGraph;
use super::node::NodeId;

/// An ordered invalidation plan for one propagation pass.
#[derive(Debug, Clone)]
pub struct PropagationPlan {
    /// Affected computations, deduplicated, ascending by dependency depth.
    pub ordered: Vec<NodeId>,
}

impl PropagationPlan {
    /// Whether the pass has any work to do.
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Number of affected computations.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }
}

/// Compute the dependency depth of a node.
///
/// Depth is memoized in `memo` so diamonds are walked once per plan.
/// Nodes currently on the walk (`visiting`) are treated as depth `0`,
/// which terminates transient cycles without recursing.
pub fn dependency_depth(
    graph: &DependencyGraph,
    id: NodeId,
    memo: &mut HashMap<NodeId, usize>,
    visiting: &mut HashSet<NodeId>,
) -> usize {
    if let Some(&depth) = memo.get(&id) {
        return depth;
    }
    if !visiting.insert(id) {
        // Cycle guard: a node reached through itself contributes 0.
        return 0;
    }

    let depth = match graph.dependencies_of(id) {
        None => 0,
        Some(deps) if deps.is_empty() => 0,
        Some(deps) => {
            let mut max = 0;
            for &dep in deps {
                max = max.max(dependency_depth(graph, dep, memo, visiting));
            }
            1 + max
        }
    };

    visiting.remove(&id);
    memo.insert(id, depth);
    depth
}

/// Build the invalidation plan for a set of changed source nodes.
///
/// The changed sources themselves are not part of the plan; only their
/// direct and transitive dependents are.
pub fn plan_propagation(graph: &DependencyGraph, changed: &[NodeId]) -> PropagationPlan {
    let mut affected: Vec<NodeId> = Vec::new();
    let mut seen: HashSet<NodeId> = changed.iter().copied().collect();
    let mut queue: VecDeque<NodeId> = VecDeque::new();

    for &source in changed {
        if let Some(subs) = graph.dependents_of(source) {
            for &sub in subs {
                queue.push_back(sub);
            }
        }
    }

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        affected.push(id);
        if let Some(subs) = graph.dependents_of(id) {
            for &sub in subs {
                queue.push_back(sub);
            }
        }
    }

    let mut memo = HashMap::new();
    let mut visiting = HashSet::new();
    let mut keyed: Vec<(usize, NodeId)> = affected
        .into_iter()
        .map(|id| (dependency_depth(graph, id, &mut memo, &mut visiting), id))
        .collect();
    keyed.sort_by_key(|&(depth, _)| depth);

    PropagationPlan {
        ordered: keyed.into_iter().map(|(_, id)| id).collect(),
    }
}
