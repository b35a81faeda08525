//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when one
//! of its dependencies changes.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its body inside a tracking
//!    frame and caches the result.
//!
//! 2. When accessed again while clean, it returns the cached value.
//!
//! 3. When a dependency changes, the propagator marks it stale without
//!    evaluating (lazy). The next read recomputes.
//!
//! 4. Before every re-evaluation the old subscription set is cleared,
//!    so a body that takes a different branch stops listening to the
//!    sources it no longer reads.
//!
//! # Cycles
//!
//! Every evaluation asks the cycle resolver for admission first. A
//! detected cycle resolves to the computed's default value, a skip to
//! the last cached value, or a structured error, depending on policy.
//! The error travels to the reader: `try_get` returns it, `get` panics
//! with it. A body that reads another computed via `get` re-raises the
//! inner error, so the outermost reader always sees the full cycle.
//!
//! # Error Safety
//!
//! A panic in the body leaves the computed stale (it retries on next
//! read); tracking frames and resolver entries are popped by drop
//! guards, so no state is corrupted.

use std::fmt::Debug;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::context::TrackingContext;
use super::cycle::{
    Admission, CircularDependencyError, CycleParticipant, CycleResolver, ReactiveError,
};
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use crate::graph::{NodeId, NodeKind};

/// Construction options for a computed.
#[derive(Clone)]
pub struct ComputedOptions<T> {
    /// Diagnostic name, shown in cycle paths.
    pub name: Option<String>,

    /// Whether this computed may be skipped during cycle recovery.
    pub optional: bool,

    /// Value substituted when a cycle is resolved with defaults.
    pub default: Option<T>,

    /// Resolver instance to use; the process-wide default when absent.
    pub resolver: Option<CycleResolver>,
}

impl<T> Default for ComputedOptions<T> {
    fn default() -> Self {
        Self {
            name: None,
            optional: false,
            default: None,
            resolver: None,
        }
    }
}

struct ComputedInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// The computed's node in the dependency graph.
    id: NodeId,

    /// The computation body.
    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// The cached value (`None` if never successfully evaluated).
    value: RwLock<Option<T>>,

    /// Whether the cache needs refreshing. Starts true.
    stale: AtomicBool,

    /// Number of completed evaluations.
    evaluations: AtomicU64,

    name: Option<String>,
    optional: bool,
    default: Option<T>,
    resolver: CycleResolver,
}

impl<T> ComputedInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn participant(&self) -> CycleParticipant {
        CycleParticipant {
            id: self.id,
            name: self.name.clone(),
            has_default: self.default.is_some(),
            optional: self.optional,
        }
    }

    fn cached(&self) -> Option<T> {
        self.value.read().expect("value lock poisoned").clone()
    }

    /// Recompute, refreshing subscriptions along the way.
    fn evaluate(&self) -> Result<T, ReactiveError> {
        match self.resolver.enter(self.participant())? {
            Admission::Proceed(active) => {
                // Rebuild the subscription set from scratch: stale
                // subscriptions from a previous branch must not leak.
                Runtime::clear_subscriptions(self.id);

                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    let _frame = TrackingContext::enter(self.id);
                    let _active = active;
                    (self.compute)()
                }));

                match outcome {
                    Ok(value) => {
                        *self.value.write().expect("value lock poisoned") = Some(value.clone());
                        self.stale.store(false, Ordering::SeqCst);
                        self.evaluations.fetch_add(1, Ordering::SeqCst);
                        Ok(value)
                    }
                    Err(payload) => {
                        // Still stale: the next read retries. Guards
                        // already unwound the frame and resolver entry.
                        match payload.downcast::<ReactiveError>() {
                            Ok(err) => Err(*err),
                            Err(other) => resume_unwind(other),
                        }
                    }
                }
            }
            Admission::UseDefault => Ok(self
                .default
                .clone()
                .expect("resolver grants defaults only when one exists")),
            Admission::Skip { cycle } => self.fall_back(|| {
                ReactiveError::CircularDependency(CircularDependencyError { cycle })
            }),
            Admission::DepthExceeded { depth, max_depth } => {
                self.fall_back(|| ReactiveError::MaxDepthExceeded { depth, max_depth })
            }
        }
    }

    /// Degraded result for a refused evaluation: last cached value,
    /// then the default, then the error.
    fn fall_back(&self, err: impl FnOnce() -> ReactiveError) -> Result<T, ReactiveError> {
        if let Some(value) = self.cached() {
            return Ok(value);
        }
        if let Some(default) = self.default.clone() {
            return Ok(default);
        }
        Err(err())
    }
}

impl<T> Reactive for ComputedInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn mark_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    fn run_eager(&self) {
        // Computeds are lazy: they recompute on next read.
    }

    fn is_eager(&self) -> bool {
        false
    }
}

/// A read-only, lazily cached derived value.
///
/// # Example
///
/// ```rust,ignore
/// let count = signal(2);
/// let doubled = computed({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(10);
/// assert_eq!(doubled.get(), 20);
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<ComputedInner<T>>,
    _registration: Arc<ReactiveHandle>,
}

/// Create a new computed with the given body.
///
/// The body is not run immediately; it runs on first access.
pub fn computed<T, F>(compute: F) -> Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::new(compute)
}

/// Create a computed with explicit options (name, default, optional,
/// resolver).
pub fn computed_with_options<T, F>(compute: F, options: ComputedOptions<T>) -> Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::with_options(compute, options)
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new computed with default options.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(compute, ComputedOptions::default())
    }

    /// Create a computed with explicit options.
    pub fn with_options<F>(compute: F, options: ComputedOptions<T>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(ComputedInner {
            id: NodeId::new(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            stale: AtomicBool::new(true),
            evaluations: AtomicU64::new(0),
            name: options.name,
            optional: options.optional,
            default: options.default,
            resolver: options
                .resolver
                .unwrap_or_else(|| CycleResolver::global().clone()),
        });
        let registration = Runtime::register(inner.clone(), NodeKind::Derived);

        Self {
            inner,
            _registration: Arc::new(registration),
        }
    }

    /// The computed's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, recomputing if stale.
    ///
    /// Registers this computed as a dependency of the currently
    /// evaluating computation, if any.
    ///
    /// # Panics
    ///
    /// Panics with the underlying [`ReactiveError`] when a cycle is
    /// unrecoverable; use [`Computed::try_get`] for a fallible read.
    pub fn get(&self) -> T {
        self.try_get()
            .unwrap_or_else(|err| std::panic::panic_any(err))
    }

    /// Get the current value, surfacing cycle errors instead of
    /// panicking.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        Runtime::track_read(self.inner.id);

        if !self.inner.stale.load(Ordering::SeqCst) {
            if let Some(value) = self.inner.cached() {
                return Ok(value);
            }
        }
        self.inner.evaluate()
    }

    /// Whether the cache needs refreshing.
    pub fn is_stale(&self) -> bool {
        self.inner.stale.load(Ordering::SeqCst)
    }

    /// Whether the computed has ever evaluated successfully.
    pub fn has_value(&self) -> bool {
        self.inner
            .value
            .read()
            .expect("value lock poisoned")
            .is_some()
    }

    /// Number of completed evaluations.
    pub fn evaluation_count(&self) -> u64 {
        self.inner.evaluations.load(Ordering::SeqCst)
    }

    /// The sources this computed currently subscribes to.
    pub fn subscriptions(&self) -> Vec<NodeId> {
        Runtime::subscriptions_of(self.inner.id)
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _registration: Arc::clone(&self._registration),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("stale", &self.is_stale())
            .field("evaluations", &self.evaluation_count())
            .finish()
    }
}
