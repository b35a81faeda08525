//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the propagator re-runs the effect
//!    during pass 2 of the propagation (eager, unlike computeds).
//!
//! 3. Before re-running, the effect clears its old subscriptions and
//!    tracks new ones during execution.
//!
//! # Cleanup
//!
//! An effect body may return a cleanup function. It runs exactly once,
//! before the next re-run or on disposal, whichever comes first. This
//! is how event listeners, timers, and terminal state get released.
//!
//! # Error Isolation
//!
//! A panic in one effect's body is caught and logged; sibling effects
//! in the same propagation pass still run. The failed effect keeps
//! whatever subscriptions it had established before the panic and will
//! be re-run on the next relevant change.
//!
//! # Re-entrancy
//!
//! An effect body that writes one of its own sources (directly, or
//! through a computed it reads) would re-run itself synchronously from
//! inside `propagate`, recursing without bound. Every run therefore
//! enters the cycle resolver like a computed evaluation does: a run
//! requested while the same effect is already on the active stack is a
//! cycle, and is refused rather than recursed.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{error, warn};

use super::context::TrackingContext;
use super::cycle::{Admission, CycleParticipant, CycleResolver};
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use crate::graph::{NodeId, NodeKind};

/// Cleanup returned by an effect body; runs before the next re-run or
/// on disposal.
pub type CleanupFn = Box<dyn FnOnce() + Send>;

struct EffectInner {
    /// The effect's node in the dependency graph.
    id: NodeId,

    /// The effect body. May return a cleanup to run before the next
    /// execution.
    run: Box<dyn Fn() -> Option<CleanupFn> + Send + Sync>,

    /// Cleanup pending from the previous run.
    cleanup: Mutex<Option<CleanupFn>>,

    /// Whether the effect has been disposed.
    disposed: AtomicBool,

    /// Number of completed runs.
    run_count: AtomicUsize,

    /// Guards against re-entrant runs and runaway depth.
    resolver: CycleResolver,
}

impl EffectInner {
    fn participant(&self) -> CycleParticipant {
        CycleParticipant {
            id: self.id,
            name: None,
            has_default: false,
            optional: false,
        }
    }

    fn run_cleanup(&self) {
        let pending = self
            .cleanup
            .lock()
            .expect("cleanup lock poisoned")
            .take();
        if let Some(cleanup) = pending {
            cleanup();
        }
    }

    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        // A run requested while this effect is already executing (its
        // body wrote one of its own sources) is a cycle; refuse it
        // rather than recurse. Refused runs keep the pending cleanup
        // and the current subscriptions.
        let active = match self.resolver.enter(self.participant()) {
            Ok(Admission::Proceed(active)) => active,
            Ok(Admission::DepthExceeded { depth, max_depth }) => {
                warn!(effect = %self.id, depth, max_depth, "effect run refused at depth limit");
                return;
            }
            Ok(_) => {
                warn!(effect = %self.id, "re-entrant effect run skipped");
                return;
            }
            Err(err) => {
                error!(
                    effect = %self.id,
                    cycle = %err.path(),
                    "effect closed a dependency cycle; run skipped"
                );
                return;
            }
        };

        self.run_cleanup();

        // Rebuild subscriptions from exactly what this run reads.
        Runtime::clear_subscriptions(self.id);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _frame = TrackingContext::enter(self.id);
            let _active = active;
            (self.run)()
        }));

        match outcome {
            Ok(cleanup) => {
                *self.cleanup.lock().expect("cleanup lock poisoned") = cleanup;
                self.run_count.fetch_add(1, Ordering::SeqCst);
            }
            Err(_) => {
                // One bad effect must not abort the rest of the pass.
                error!(effect = %self.id, "effect body panicked; skipping");
            }
        }
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        // Last handle gone without an explicit dispose: still release
        // the pending cleanup.
        if let Ok(mut pending) = self.cleanup.lock() {
            if let Some(cleanup) = pending.take() {
                cleanup();
            }
        }
    }
}

impl Reactive for EffectInner {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn mark_stale(&self) {
        // Effects carry no cache; re-running is the invalidation.
    }

    fn run_eager(&self) {
        self.execute();
    }

    fn is_eager(&self) -> bool {
        true
    }
}

/// An eager side-effecting computation.
///
/// # Example
///
/// ```rust,ignore
/// let count = signal(0);
///
/// let _effect = effect({
///     let count = count.clone();
///     move || println!("count is {}", count.get())
/// });
///
/// count.set(5); // prints "count is 5"
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
    _registration: Arc<ReactiveHandle>,
}

/// Create an effect. Runs immediately, then re-runs on dependency
/// changes.
pub fn effect<F>(run: F) -> Effect
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(run)
}

/// Create an effect whose body returns a cleanup function.
///
/// The cleanup runs before each re-run and when the effect is disposed.
pub fn effect_with_cleanup<F>(run: F) -> Effect
where
    F: Fn() -> CleanupFn + Send + Sync + 'static,
{
    Effect::with_cleanup(run)
}

impl Effect {
    /// Create a new effect. The body runs immediately to establish
    /// initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(Box::new(move || {
            run();
            None
        }))
    }

    /// Create an effect with a cleanup-returning body.
    pub fn with_cleanup<F>(run: F) -> Self
    where
        F: Fn() -> CleanupFn + Send + Sync + 'static,
    {
        Self::build(Box::new(move || Some(run())))
    }

    fn build(run: Box<dyn Fn() -> Option<CleanupFn> + Send + Sync>) -> Self {
        let inner = Arc::new(EffectInner {
            id: NodeId::new(),
            run,
            cleanup: Mutex::new(None),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
            resolver: CycleResolver::global().clone(),
        });
        let registration = Runtime::register(inner.clone(), NodeKind::Effect);

        let effect = Self {
            inner,
            _registration: Arc::new(registration),
        };
        effect.inner.execute();
        effect
    }

    /// The effect's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Dispose of the effect.
    ///
    /// Runs any pending cleanup, removes the effect from every
    /// subscriber set, and prevents further runs.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.run_cleanup();
        Runtime::clear_subscriptions(self.inner.id);
    }

    /// Whether the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// The sources this effect currently subscribes to.
    pub fn subscriptions(&self) -> Vec<NodeId> {
        Runtime::subscriptions_of(self.inner.id)
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _registration: Arc::clone(&self._registration),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
