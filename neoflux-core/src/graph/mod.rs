//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between reactive values and computations.
//!
//! # Overview
//!
//! The graph is a directed structure where:
//!
//! - Nodes represent reactive values (signals) or computations
//!   (computeds, effects)
//! - Edges represent dependencies: if A depends on B, there is an edge
//!   from B to A
//!
//! When a signal changes, the propagator traverses the graph to find all
//! affected computations, orders them by dependency depth (see
//! [`plan_propagation`]) and marks them stale in two passes so diamonds
//! settle consistently.
//!
//! # Design Decisions
//!
//! 1. We use a centralized graph rather than distributed linked lists:
//!    - It enables depth ordering for whole-batch invalidation
//!    - It simplifies cycle detection and offline analysis
//!    - Disposal is a single `remove_node` that scrubs every edge
//!
//! 2. The graph is indexed by node ID for O(1) lookups.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents)
//!    edges to enable efficient traversal in both directions.
//!
//! The graph must stay acyclic in the steady state. Transient cycles are
//! tolerated only while the cycle resolver is breaking them; the depth
//! computation guards against them instead of recursing forever.

mod analyze;
mod depth;
mod edges;
mod node;

pub use analyze::{analyze_dependency_graph, GraphAnalysis};
pub use depth::{dependency_depth, plan_propagation, PropagationPlan};
pub use edges::DependencyGraph;
pub use node::{NodeId, NodeKind};
