//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive: a mutable cell that
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read during a tracked evaluation (computed or
//!    effect body), the reading computation is registered as a
//!    subscriber.
//!
//! 2. When the value changes, the signal hands itself to the batch
//!    scheduler, which triggers (or defers) one propagation pass.
//!
//! 3. A write that leaves the value unchanged under the configured
//!    equality check is a no-op: no version bump, no propagation.
//!
//! # Thread Safety
//!
//! The value sits behind a `RwLock` and handles are cheap clones of a
//! shared inner, so signals can be moved across threads. Propagation
//! runs synchronously on whichever thread performs the write.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::trace;

use super::batch;
use super::runtime::Runtime;
use crate::graph::NodeId;

type EqualsFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

struct SignalInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// The signal's node in the dependency graph.
    id: NodeId,

    /// The current value.
    value: RwLock<T>,

    /// Bumped on every accepted write.
    version: AtomicU64,

    /// Custom equality check; `PartialEq` when absent.
    equals: Option<EqualsFn<T>>,
}

impl<T> SignalInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn unchanged(&self, current: &T, next: &T) -> bool {
        match &self.equals {
            Some(equals) => equals(current, next),
            None => current == next,
        }
    }
}

impl<T> Drop for SignalInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn drop(&mut self) {
        // Last handle gone: take the node (and its subscriber edges)
        // out of the graph.
        Runtime::unregister(self.id);
    }
}

/// A writable reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = signal(0);
///
/// // Read the value (registers a subscriber inside evaluations)
/// let value = count.get();
///
/// // Update the value (propagates to subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<SignalInner<T>>,
}

/// Create a new signal with the given initial value.
pub fn signal<T>(value: T) -> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    Signal::new(value)
}

/// Create a signal with a custom equality check.
///
/// `set` is a no-op whenever `equals(&current, &next)` returns true.
pub fn signal_with_equals<T, F>(value: T, equals: F) -> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    Signal::with_equals(value, equals)
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::build(value, None)
    }

    /// Create a signal with a custom equality check.
    pub fn with_equals<F>(value: T, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self::build(value, Some(Arc::new(equals)))
    }

    fn build(value: T, equals: Option<EqualsFn<T>>) -> Self {
        let id = NodeId::new();
        Runtime::register_source(id);
        Self {
            inner: Arc::new(SignalInner {
                id,
                value: RwLock::new(value),
                version: AtomicU64::new(0),
                equals,
            }),
        }
    }

    /// The signal's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called while a computation is evaluating, registers that
    /// computation as a subscriber (the bidirectional edge). Outside
    /// any evaluation this is a plain read with no side effect.
    pub fn get(&self) -> T {
        Runtime::track_read(self.inner.id);
        self.inner
            .value
            .read()
            .expect("value lock poisoned")
            .clone()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner
            .value
            .read()
            .expect("value lock poisoned")
            .clone()
    }

    /// Set a new value and propagate to subscribers.
    ///
    /// No-op when the new value equals the current one under the
    /// configured equality check. Otherwise the value is stored, the
    /// version bumped, and the signal handed to the batch scheduler.
    pub fn set(&self, value: T) {
        // The equality check runs under the read lock: a panicking
        // custom comparator unwinds without poisoning the write path.
        {
            let guard = self.inner.value.read().expect("value lock poisoned");
            if self.inner.unchanged(&guard, &value) {
                trace!(signal = %self.inner.id, "write unchanged, skipping propagation");
                return;
            }
        }
        *self.inner.value.write().expect("value lock poisoned") = value;
        self.inner.version.fetch_add(1, Ordering::Relaxed);
        batch::enqueue_source(self.inner.id);
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let guard = self.inner.value.read().expect("value lock poisoned");
            f(&guard)
        };
        self.set(next);
    }

    /// Number of accepted writes since creation.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }

    /// Number of computations currently subscribed to this signal.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.id)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("version", &self.version())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
