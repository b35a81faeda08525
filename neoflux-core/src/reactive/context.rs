//! Tracking Context
//!
//! The tracking context records which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. When a computed or effect
//! starts evaluating, it pushes a frame; when the evaluation completes,
//! the frame is popped by a drop guard, so a panic inside the body can
//! never leave a stale frame behind.
//!
//! Nested evaluations (a computed reading another computed) simply stack
//! frames; reads always attribute to the innermost frame.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::NodeId;

thread_local! {
    static TRACKING_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the tracking stack.
#[derive(Debug)]
struct Frame {
    /// The computation currently evaluating.
    node_id: NodeId,
    /// Sources read so far during this evaluation, in read order.
    reads: SmallVec<[NodeId; 8]>,
}

/// Guard for one tracked evaluation.
///
/// Pushes a frame on construction, pops it on drop. The drop runs even
/// when the evaluation body panics, so the stack is always consistent.
#[derive(Debug)]
pub struct TrackingContext {
    node_id: NodeId,
}

impl TrackingContext {
    /// Enter a tracked evaluation for the given computation.
    ///
    /// While the returned guard is alive, any signal or computed read on
    /// this thread registers `node_id` as a subscriber.
    pub fn enter(node_id: NodeId) -> Self {
        TRACKING_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                node_id,
                reads: SmallVec::new(),
            });
        });
        Self { node_id }
    }

    /// Check whether any computation is currently being tracked.
    pub fn is_active() -> bool {
        TRACKING_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The innermost evaluating computation, if any.
    pub fn current() -> Option<NodeId> {
        TRACKING_STACK.with(|stack| stack.borrow().last().map(|frame| frame.node_id))
    }

    /// Record a read of `source` against the innermost frame.
    ///
    /// Called by signals and computeds from their tracked `get`.
    pub fn record_read(source: NodeId) {
        TRACKING_STACK.with(|stack| {
            if let Some(frame) = stack.borrow_mut().last_mut() {
                if !frame.reads.contains(&source) {
                    frame.reads.push(source);
                }
            }
        });
    }

    /// The sources read so far by the innermost frame, in read order.
    pub fn collected_reads() -> Vec<NodeId> {
        TRACKING_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|frame| frame.reads.to_vec())
                .unwrap_or_default()
        })
    }

    /// Run `f` with tracking suppressed on this thread.
    ///
    /// Reads inside `f` behave like plain reads: no subscriber
    /// registration happens even if a computation is evaluating. The
    /// suspended frames are restored by a drop guard, so a panic inside
    /// `f` (caught or not) leaves the enclosing evaluation tracking
    /// exactly as before.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        struct Restore {
            saved: Vec<Frame>,
        }

        impl Drop for Restore {
            fn drop(&mut self) {
                let saved = std::mem::take(&mut self.saved);
                TRACKING_STACK.with(|stack| *stack.borrow_mut() = saved);
            }
        }

        let _restore = Restore {
            saved: TRACKING_STACK.with(|stack| std::mem::take(&mut *stack.borrow_mut())),
        };
        f()
    }
}

impl Drop for TrackingContext {
    fn drop(&mut self) {
        TRACKING_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Catch mismatched enter/exit pairs early in debug builds.
            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame.node_id, self.node_id,
                    "tracking frame mismatch: expected {}, got {}",
                    self.node_id, frame.node_id
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_current_computation() {
        let id = NodeId::new();

        assert!(!TrackingContext::is_active());
        assert!(TrackingContext::current().is_none());

        {
            let _ctx = TrackingContext::enter(id);
            assert!(TrackingContext::is_active());
            assert_eq!(TrackingContext::current(), Some(id));
        }

        assert!(!TrackingContext::is_active());
        assert!(TrackingContext::current().is_none());
    }

    #[test]
    fn context_records_reads_in_order() {
        let id = NodeId::new();
        let a = NodeId::new();
        let b = NodeId::new();
        let _ctx = TrackingContext::enter(id);

        TrackingContext::record_read(a);
        TrackingContext::record_read(b);
        TrackingContext::record_read(a); // duplicate read registers once

        assert_eq!(TrackingContext::collected_reads(), vec![a, b]);
    }

    #[test]
    fn nested_contexts_attribute_to_innermost() {
        let outer = NodeId::new();
        let inner = NodeId::new();
        let dep = NodeId::new();

        let _outer_ctx = TrackingContext::enter(outer);
        TrackingContext::record_read(dep);

        {
            let _inner_ctx = TrackingContext::enter(inner);
            assert_eq!(TrackingContext::current(), Some(inner));
            assert!(TrackingContext::collected_reads().is_empty());
        }

        assert_eq!(TrackingContext::current(), Some(outer));
        assert_eq!(TrackingContext::collected_reads(), vec![dep]);
    }

    #[test]
    fn untracked_suppresses_registration() {
        let id = NodeId::new();
        let dep = NodeId::new();
        let _ctx = TrackingContext::enter(id);

        TrackingContext::untracked(|| {
            assert!(!TrackingContext::is_active());
            TrackingContext::record_read(dep);
        });

        assert!(TrackingContext::collected_reads().is_empty());
        assert_eq!(TrackingContext::current(), Some(id));
    }

    #[test]
    fn untracked_panic_restores_suspended_frames() {
        let id = NodeId::new();
        let dep = NodeId::new();
        let _ctx = TrackingContext::enter(id);

        let result = std::panic::catch_unwind(|| {
            TrackingContext::untracked(|| panic!("lookup failed"));
        });
        assert!(result.is_err());

        // The enclosing frame is back and keeps tracking.
        assert_eq!(TrackingContext::current(), Some(id));
        TrackingContext::record_read(dep);
        assert_eq!(TrackingContext::collected_reads(), vec![dep]);
    }

    #[test]
    fn frame_pops_on_panic() {
        let id = NodeId::new();

        let result = std::panic::catch_unwind(|| {
            let _ctx = TrackingContext::enter(id);
            panic!("evaluation failed");
        });

        assert!(result.is_err());
        assert!(!TrackingContext::is_active());
    }
}
