//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals,
//! computeds, and effects. It owns the process-wide dependency graph and
//! drives invalidation when sources change.
//!
//! # How It Works
//!
//! 1. When a computed or effect is created, it registers with the
//!    runtime; signals register their node with the graph.
//!
//! 2. When a computation reads a source during a tracked evaluation,
//!    the runtime records the bidirectional edge.
//!
//! 3. When sources change (one write, or a whole batch), the runtime:
//!    a. Builds a depth-ordered plan over every affected computation
//!    b. Pass 1: marks each one stale, without further propagation
//!    c. Pass 2: re-runs eager computations (effects) in the same order
//!    d. Computeds stay lazy: they recompute on next read
//!
//! The two-pass shape is what makes diamonds glitch-free: by the time
//! any effect runs, every computed it might pull from has already been
//! marked stale, so each read recomputes from fully settled inputs.
//!
//! # Thread Safety
//!
//! The tracking context and batch state are thread-local; the registry
//! and graph are shared behind locks. All locks are released before any
//! user code (effect bodies, computed bodies) runs, so evaluations can
//! freely re-enter the runtime.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock, Weak};

use indexmap::IndexSet;
use tracing::trace;

use super::context::TrackingContext;
use crate::graph::{self, DependencyGraph, NodeId, NodeKind};

/// A computation the runtime can invalidate.
///
/// Implemented by the shared inner state of computeds and effects. The
/// registry holds these weakly; dropping every handle to a computation
/// unregisters it.
pub trait Reactive: Send + Sync {
    /// The computation's node in the dependency graph.
    fn node_id(&self) -> NodeId;

    /// Mark the computation stale without propagating further.
    fn mark_stale(&self);

    /// Re-evaluate now. Only called on eager computations, during
    /// pass 2 of a propagation.
    fn run_eager(&self);

    /// Whether this computation is eager (effect) or lazy (computed).
    fn is_eager(&self) -> bool;
}

/// Handle to a registered computation.
///
/// Dropping this handle unregisters the computation and scrubs its node
/// from the graph, which removes it from every subscriber set. This is
/// what keeps disposal deterministic: no subscriber link ever keeps a
/// dead computation alive.
#[derive(Debug)]
pub struct ReactiveHandle {
    node_id: NodeId,
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.node_id);
    }
}

/// The global reactive runtime.
pub struct Runtime;

static REGISTRY: OnceLock<RwLock<HashMap<NodeId, Weak<dyn Reactive>>>> = OnceLock::new();
static GRAPH: OnceLock<RwLock<DependencyGraph>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<NodeId, Weak<dyn Reactive>>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn shared_graph() -> &'static RwLock<DependencyGraph> {
    GRAPH.get_or_init(|| RwLock::new(DependencyGraph::new()))
}

impl Runtime {
    /// Register a computation with the runtime.
    ///
    /// Returns a handle that unregisters it when dropped.
    pub fn register(reactive: Arc<dyn Reactive>, kind: NodeKind) -> ReactiveHandle {
        let node_id = reactive.node_id();

        registry()
            .write()
            .expect("registry lock poisoned")
            .insert(node_id, Arc::downgrade(&reactive));
        shared_graph()
            .write()
            .expect("graph lock poisoned")
            .register_node(node_id, kind);

        ReactiveHandle { node_id }
    }

    /// Register a source (signal) node with the graph.
    pub(crate) fn register_source(node_id: NodeId) {
        shared_graph()
            .write()
            .expect("graph lock poisoned")
            .register_node(node_id, NodeKind::Source);
    }

    /// Remove a node entirely: registry entry plus every graph edge.
    pub(crate) fn unregister(node_id: NodeId) {
        registry()
            .write()
            .expect("registry lock poisoned")
            .remove(&node_id);
        shared_graph()
            .write()
            .expect("graph lock poisoned")
            .remove_node(node_id);
    }

    /// Record a tracked read of `source`.
    ///
    /// If a computation is currently evaluating on this thread, adds
    /// the bidirectional edge and notes the read in its frame. Outside
    /// any evaluation this is a no-op: plain reads have no side effect.
    pub(crate) fn track_read(source: NodeId) {
        let Some(current) = TrackingContext::current() else {
            return;
        };
        if current == source {
            return;
        }
        shared_graph()
            .write()
            .expect("graph lock poisoned")
            .add_edge(source, current);
        TrackingContext::record_read(source);
    }

    /// Remove a computation from every source it subscribes to.
    ///
    /// Called before each re-evaluation so the subscription set is
    /// rebuilt from exactly the sources the new run reads.
    pub(crate) fn clear_subscriptions(node_id: NodeId) {
        shared_graph()
            .write()
            .expect("graph lock poisoned")
            .clear_dependencies(node_id);
    }

    /// Propagate a change from the given source nodes.
    ///
    /// One call handles one batch: the affected set is deduplicated and
    /// depth-ordered, marked stale in pass 1, and eager computations
    /// re-run in pass 2. All locks are dropped before either pass.
    pub fn propagate(changed: &[NodeId]) {
        if changed.is_empty() {
            return;
        }

        let plan = {
            let graph = shared_graph().read().expect("graph lock poisoned");
            graph::plan_propagation(&graph, changed)
        };
        if plan.is_empty() {
            return;
        }
        trace!(sources = changed.len(), affected = plan.len(), "propagating");

        // Upgrade while holding the registry lock, then release it so
        // effect bodies can register new computations.
        let snapshot: Vec<Arc<dyn Reactive>> = {
            let registry = registry().read().expect("registry lock poisoned");
            plan.ordered
                .iter()
                .filter_map(|id| registry.get(id).and_then(Weak::upgrade))
                .collect()
        };

        // Pass 1: mark everything stale before anything re-evaluates.
        for reactive in &snapshot {
            reactive.mark_stale();
        }

        // Pass 2: re-run eager computations in depth order.
        for reactive in &snapshot {
            if reactive.is_eager() {
                reactive.run_eager();
            }
        }
    }

    /// Number of direct subscribers of a node.
    pub fn subscriber_count(node_id: NodeId) -> usize {
        shared_graph()
            .read()
            .expect("graph lock poisoned")
            .subscriber_count(node_id)
    }

    /// The sources a computation currently subscribes to.
    pub fn subscriptions_of(node_id: NodeId) -> Vec<NodeId> {
        let graph = shared_graph().read().expect("graph lock poisoned");
        graph
            .dependencies_of(node_id)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Snapshot the live graph's adjacency for offline analysis.
    pub fn adjacency_snapshot() -> HashMap<NodeId, IndexSet<NodeId>> {
        shared_graph()
            .read()
            .expect("graph lock poisoned")
            .adjacency_snapshot()
    }
}
