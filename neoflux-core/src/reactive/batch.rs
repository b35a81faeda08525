//! Batch Scheduler
//!
//! Coalesces multiple signal writes into a single propagation pass.
//!
//! # How It Works
//!
//! Each thread keeps an open-batch depth and a dirty-source set. While
//! a batch is open, `set` calls park their signal in the dirty set
//! instead of propagating. When the outermost batch closes, the
//! accumulated set is handed to the propagator exactly once.
//!
//! - Nested `batch` calls flatten into the outermost one.
//! - A bare `set` outside any batch is an implicit single-write batch:
//!   it propagates immediately.
//! - The dirty set is an `IndexSet`, so repeated writes to one signal
//!   register once and sources propagate in first-write order.
//!
//! Closing is driven by a drop guard. If the batch body panics, the
//! guard still closes the batch and discards the pending set rather
//! than propagating mid-unwind; the written values remain in place and
//! the graph stays consistent.

use std::cell::RefCell;

use indexmap::IndexSet;

use super::runtime::Runtime;
use crate::graph::NodeId;

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState {
        depth: 0,
        dirty: IndexSet::new(),
    });
}

struct BatchState {
    /// Nesting depth of open batches on this thread.
    depth: usize,
    /// Sources written while the batch has been open, in write order.
    dirty: IndexSet<NodeId>,
}

/// Guard for one open batch level.
struct BatchGuard;

impl BatchGuard {
    fn open() -> Self {
        BATCH.with(|state| state.borrow_mut().depth += 1);
        Self
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let pending: Option<Vec<NodeId>> = BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.depth -= 1;
            if state.depth == 0 {
                Some(state.dirty.drain(..).collect())
            } else {
                None
            }
        });

        if let Some(dirty) = pending {
            if !dirty.is_empty() && !std::thread::panicking() {
                Runtime::propagate(&dirty);
            }
        }
    }
}

/// Run `f` with writes coalesced into one propagation pass.
///
/// Signal writes inside `f` accumulate; when `f` returns (and this is
/// the outermost batch on the thread), every affected computation is
/// invalidated exactly once, observing the fully updated set of new
/// values.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _guard = BatchGuard::open();
    f()
}

/// Whether a batch is currently open on this thread.
pub fn in_batch() -> bool {
    BATCH.with(|state| state.borrow().depth > 0)
}

/// Route a dirty source through the scheduler.
///
/// Inside a batch the source is parked; outside, it propagates
/// immediately (the implicit single-write batch).
pub(crate) fn enqueue_source(source: NodeId) {
    let parked = BATCH.with(|state| {
        let mut state = state.borrow_mut();
        if state.depth > 0 {
            state.dirty.insert(source);
            true
        } else {
            false
        }
    });

    if !parked {
        Runtime::propagate(&[source]);
    }
}
