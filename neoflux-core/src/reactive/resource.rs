//! Async Derived Values
//!
//! A thin asynchronous layer over the synchronous core. A [`Resource`]
//! reads synchronously like any signal: it immediately yields its
//! last-known state (`Loading` until the first fetch lands). Each
//! `refresh` spawns a background task; when the task completes it
//! performs an ordinary `set` on an internal state signal, re-entering
//! the standard propagation path.
//!
//! # Cancellation
//!
//! Refreshes are last-write-wins: a new `refresh` bumps a generation
//! counter, and any in-flight task from an older generation discards
//! its result instead of overwriting the newer state.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::signal::Signal;
use crate::graph::NodeId;

type FetchFn<T> = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = T> + Send>> + Send + Sync>;

/// Lifecycle of an asynchronously derived value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState<T> {
    /// No fetch has completed yet.
    Loading,

    /// The most recent fetch's value.
    Ready(T),
}

/// An asynchronously derived reactive value.
///
/// Must be created and refreshed inside a tokio runtime.
///
/// # Example
///
/// ```rust,ignore
/// let user = Resource::new(|| async { fetch_user().await });
///
/// let _effect = effect({
///     let user = user.clone();
///     move || match user.state() {
///         ResourceState::Loading => render_spinner(),
///         ResourceState::Ready(u) => render_user(&u),
///     }
/// });
/// ```
pub struct Resource<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    state: Signal<ResourceState<T>>,
    fetch: FetchFn<T>,
    generation: Arc<AtomicU64>,
}

impl<T> Resource<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a resource and start its first fetch.
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let resource = Self {
            state: Signal::new(ResourceState::Loading),
            fetch: Arc::new(move || Box::pin(fetch())),
            generation: Arc::new(AtomicU64::new(0)),
        };
        resource.refresh();
        resource
    }

    /// The current state. A tracked read: computations reading it
    /// re-run when the fetch lands.
    pub fn state(&self) -> ResourceState<T> {
        self.state.get()
    }

    /// The last fetched value, if any. Tracked like [`Resource::state`].
    pub fn get(&self) -> Option<T> {
        match self.state.get() {
            ResourceState::Loading => None,
            ResourceState::Ready(value) => Some(value),
        }
    }

    /// Whether a fetch has completed.
    pub fn is_ready(&self) -> bool {
        matches!(self.state.get_untracked(), ResourceState::Ready(_))
    }

    /// Start a new fetch, superseding any in-flight one.
    ///
    /// The completion of an older fetch is discarded (last-write-wins);
    /// a stale result never overwrites a newer state.
    pub fn refresh(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let future = (self.fetch)();
        let state = self.state.clone();
        let latest = Arc::clone(&self.generation);

        tokio::spawn(async move {
            let value = future.await;
            if latest.load(Ordering::SeqCst) == generation {
                state.set(ResourceState::Ready(value));
            } else {
                debug!(generation, "discarding superseded fetch result");
            }
        });
    }

    /// The underlying state signal's node ID.
    pub fn id(&self) -> NodeId {
        self.state.id()
    }
}

impl<T> Clone for Resource<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            fetch: Arc::clone(&self.fetch),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<T> std::fmt::Debug for Resource<T>
where
    T: Clone + Send + Sync + PartialEq + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("state", &self.state.get_untracked())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish()
    }
}
