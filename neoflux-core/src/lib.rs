//! Neoflux Core
//!
//! This crate provides the fine-grained reactive engine underlying the
//! Neoflux terminal UI framework. It implements:
//!
//! - Reactive primitives (signals, computeds, effects, scopes)
//! - Automatic dependency tracking with stale-subscription cleanup
//! - Batched, depth-ordered, glitch-free invalidation
//! - Circular-dependency detection and recovery
//!
//! Rendering, layout, and components consume these primitives; they
//! live in separate crates.
//!
//! # Architecture
//!
//! - `reactive`: the primitives and the runtime that invalidates them
//! - `graph`: the dependency graph, depth-ordered propagation planning,
//!   and offline cycle analysis
//!
//! # Example
//!
//! ```rust,ignore
//! use neoflux_core::{batch, computed, effect, signal};
//!
//! let a = signal(1);
//! let b = signal(2);
//!
//! let sum = computed({
//!     let (a, b) = (a.clone(), b.clone());
//!     move || a.get() + b.get()
//! });
//!
//! let _logger = effect({
//!     let sum = sum.clone();
//!     move || println!("sum is {}", sum.get())
//! });
//!
//! // One propagation pass, one effect re-run, no intermediate states:
//! batch(|| {
//!     a.set(10);
//!     b.set(20);
//! });
//! ```

pub mod graph;
pub mod reactive;

pub use graph::{analyze_dependency_graph, GraphAnalysis, NodeId, NodeKind};
pub use reactive::{
    batch, computed, computed_with_options, effect, effect_with_cleanup, in_batch, signal,
    signal_with_equals, CircularDependencyError, CleanupFn, Computed, ComputedOptions,
    CycleConfig, CycleParticipant, CycleResolver, Effect, ReactiveError, Resource,
    ResourceState, Scope, Signal,
};
