//! Edge Table
//!
//! The edge table is the concrete representation of the dependency graph:
//! a bipartite-ish structure of Signal -> Computation and
//! Computation -> Computation edges, maintained in both directions.
//!
//! # Invariants
//!
//! - Edges are stored symmetrically: `a` appears in `b`'s dependency set
//!   exactly when `b` appears in `a`'s dependent set.
//! - A computation's dependency set reflects exactly the sources it read
//!   during its most recent evaluation. The tracker clears the set (via
//!   [`DependencyGraph::clear_dependencies`]) before every re-evaluation,
//!   so a computation that took a different branch does not keep
//!   listening to sources it no longer reads.
//! - Iteration order of every set is insertion order (`IndexSet`), which
//!   keeps propagation deterministic across runs.

use std::collections::HashMap;

use indexmap::IndexSet;

use super::node::{NodeId, NodeKind};

/// The dependency graph shared by all reactive values.
///
/// Forward edges (`dependencies`) answer "what does this computation
/// read?"; reverse edges (`dependents`) answer "who must be invalidated
/// when this node changes?". Both directions are maintained on every
/// mutation so traversal is O(edges) either way.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// What each node reads (parents in the DAG).
    dependencies: HashMap<NodeId, IndexSet<NodeId>>,

    /// Who reads each node (children in the DAG).
    dependents: HashMap<NodeId, IndexSet<NodeId>>,

    /// Node kinds, for diagnostics and offline analysis.
    kinds: HashMap<NodeId, NodeKind>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node with the graph.
    pub fn register_node(&mut self, id: NodeId, kind: NodeKind) {
        self.kinds.insert(id, kind);
    }

    /// Remove a node and every edge involving it.
    ///
    /// Called on disposal. Subscriber sets never keep a disposed
    /// computation alive; removal here is what makes teardown
    /// deterministic.
    pub fn remove_node(&mut self, id: NodeId) {
        if let Some(deps) = self.dependencies.remove(&id) {
            for dep in deps {
                if let Some(subs) = self.dependents.get_mut(&dep) {
                    subs.shift_remove(&id);
                }
            }
        }
        if let Some(subs) = self.dependents.remove(&id) {
            for sub in subs {
                if let Some(deps) = self.dependencies.get_mut(&sub) {
                    deps.shift_remove(&id);
                }
            }
        }
        self.kinds.remove(&id);
    }

    /// Add a dependency edge: `dependent` reads `dependency`.
    ///
    /// Idempotent: reading the same source twice in one evaluation
    /// registers once.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        self.dependents
            .entry(dependency)
            .or_default()
            .insert(dependent);
        self.dependencies
            .entry(dependent)
            .or_default()
            .insert(dependency);
    }

    /// Remove a single dependency edge.
    pub fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(subs) = self.dependents.get_mut(&dependency) {
            subs.shift_remove(&dependent);
        }
        if let Some(deps) = self.dependencies.get_mut(&dependent) {
            deps.shift_remove(&dependency);
        }
    }

    /// Remove `dependent` from every source it currently subscribes to.
    ///
    /// Called by the tracker before each re-evaluation so the
    /// subscription set can be rebuilt from scratch.
    pub fn clear_dependencies(&mut self, dependent: NodeId) {
        if let Some(deps) = self.dependencies.get_mut(&dependent) {
            let old: Vec<NodeId> = deps.drain(..).collect();
            for dep in old {
                if let Some(subs) = self.dependents.get_mut(&dep) {
                    subs.shift_remove(&dependent);
                }
            }
        }
    }

    /// Get the nodes that read directly from `id`.
    pub fn dependents_of(&self, id: NodeId) -> Option<&IndexSet<NodeId>> {
        self.dependents.get(&id)
    }

    /// Get the nodes that `id` reads directly from.
    pub fn dependencies_of(&self, id: NodeId) -> Option<&IndexSet<NodeId>> {
        self.dependencies.get(&id)
    }

    /// Get the kind of a registered node.
    pub fn kind_of(&self, id: NodeId) -> Option<NodeKind> {
        self.kinds.get(&id).copied()
    }

    /// Number of direct subscribers of a node.
    pub fn subscriber_count(&self, id: NodeId) -> usize {
        self.dependents.get(&id).map_or(0, IndexSet::len)
    }

    /// Total number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.kinds.len()
    }

    /// Snapshot the forward adjacency (dependency -> dependents) as a
    /// plain map, for offline cycle analysis.
    pub fn adjacency_snapshot(&self) -> HashMap<NodeId, IndexSet<NodeId>> {
        self.dependents.clone()
    }
}
