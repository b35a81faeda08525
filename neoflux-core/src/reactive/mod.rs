//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds,
//! and effects, plus the machinery that keeps them consistent (tracking
//! context, batch scheduler, cycle resolver).
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is
//! read within a tracking context (such as a computed or effect), the
//! signal automatically registers that context as a dependent. When the
//! value changes, all dependents are invalidated.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies changes, and only when read (lazy).
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change (eager). Effects synchronize reactive state with
//! external systems, such as painting a terminal frame or logging.
//!
//! ## Batches
//!
//! `batch` coalesces several writes into one invalidation pass, so every
//! affected computation settles exactly once against the fully updated
//! inputs.
//!
//! # Implementation Notes
//!
//! Dependency detection is automatic: a thread-local tracking stack
//! records the evaluating computation, and every tracked read registers
//! an edge. This approach ("transparent reactivity") is the one used by
//! SolidJS, Vue 3, and Leptos.

mod batch;
mod context;
mod computed;
mod cycle;
mod effect;
mod resource;
mod runtime;
mod scope;
mod signal;

pub use batch::{batch, in_batch};
pub use computed::{computed, computed_with_options, Computed, ComputedOptions};
pub use context::TrackingContext;
pub use cycle::{
    Admission, CircularDependencyError, CycleConfig, CycleParticipant, CycleResolver,
    ReactiveError,
};
pub use effect::{effect, effect_with_cleanup, CleanupFn, Effect};
pub use resource::{Resource, ResourceState};
pub use runtime::{Reactive, ReactiveHandle, Runtime};
pub use scope::Scope;
pub use signal::{signal, signal_with_equals, Signal};
