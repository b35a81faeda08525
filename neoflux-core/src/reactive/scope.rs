//! Ownership Scopes
//!
//! A Scope is an explicit handle that ties reactive resources to a
//! lifetime, typically one UI component. Effects registered with a
//! scope are disposed when the scope is; cleanup callbacks registered
//! via [`Scope::on_cleanup`] run exactly once, in LIFO order, at
//! disposal.
//!
//! The scope is passed explicitly to whoever needs it. There is no
//! implicit "current component" global: creation functions receive the
//! handle and hook registration takes it as an argument, so cleanup
//! ordering does not depend on call-order-sensitive shared state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::effect::Effect;

type Disposer = Box<dyn FnOnce() + Send>;

struct ScopeInner {
    /// Cleanup callbacks, run LIFO on disposal.
    cleanups: Mutex<Vec<Disposer>>,

    /// Effects owned by this scope, disposed LIFO.
    effects: Mutex<Vec<Effect>>,

    disposed: AtomicBool,
}

impl ScopeInner {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut effects = {
            let mut guard = self.effects.lock().expect("effects lock poisoned");
            std::mem::take(&mut *guard)
        };
        while let Some(effect) = effects.pop() {
            effect.dispose();
        }

        let mut cleanups = {
            let mut guard = self.cleanups.lock().expect("cleanups lock poisoned");
            std::mem::take(&mut *guard)
        };
        debug!(cleanups = cleanups.len(), "disposing scope");
        while let Some(cleanup) = cleanups.pop() {
            cleanup();
        }
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// An explicit disposal scope for effects and cleanup callbacks.
///
/// # Example
///
/// ```rust,ignore
/// let scope = Scope::new();
/// scope.own_effect(effect(|| { /* ... */ }));
/// scope.on_cleanup(|| println!("component unmounted"));
///
/// // Later, on unmount:
/// scope.dispose();
/// ```
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Create a new empty scope.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                cleanups: Mutex::new(Vec::new()),
                effects: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a cleanup callback.
    ///
    /// Runs exactly once when the scope is disposed, after callbacks
    /// registered later (LIFO). Registering on an already-disposed
    /// scope runs the callback immediately.
    pub fn on_cleanup<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.disposed.load(Ordering::SeqCst) {
            f();
            return;
        }
        self.inner
            .cleanups
            .lock()
            .expect("cleanups lock poisoned")
            .push(Box::new(f));
    }

    /// Tie an effect's lifetime to this scope.
    ///
    /// The effect is disposed when the scope is. Owning an effect on an
    /// already-disposed scope disposes it immediately.
    pub fn own_effect(&self, effect: Effect) {
        if self.inner.disposed.load(Ordering::SeqCst) {
            effect.dispose();
            return;
        }
        self.inner
            .effects
            .lock()
            .expect("effects lock poisoned")
            .push(effect);
    }

    /// Dispose the scope: effects first, then cleanups, both LIFO.
    /// Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Whether the scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::effect;
    use crate::reactive::signal::signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn cleanups_run_lifo_exactly_once() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let scope = Scope::new();

        for label in ["first", "second", "third"] {
            let order = order.clone();
            scope.on_cleanup(move || order.lock().unwrap().push(label));
        }

        scope.dispose();
        scope.dispose(); // idempotent

        assert_eq!(*order.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[test]
    fn owned_effects_stop_reacting_after_dispose() {
        let source = signal(0);
        let runs = Arc::new(AtomicI32::new(0));
        let scope = Scope::new();

        let source_clone = source.clone();
        let runs_clone = runs.clone();
        scope.own_effect(effect(move || {
            source_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        source.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        scope.dispose();
        source.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn late_registration_on_disposed_scope_runs_immediately() {
        let ran = Arc::new(AtomicBool::new(false));
        let scope = Scope::new();
        scope.dispose();

        let ran_clone = ran.clone();
        scope.on_cleanup(move || ran_clone.store(true, Ordering::SeqCst));

        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn dropping_last_handle_disposes() {
        let ran = Arc::new(AtomicBool::new(false));
        {
            let scope = Scope::new();
            let ran_clone = ran.clone();
            scope.on_cleanup(move || ran_clone.store(true, Ordering::SeqCst));
        }
        assert!(ran.load(Ordering::SeqCst));
    }
}
