//! Integration Tests for the Reactive Engine
//!
//! These tests verify that signals, computeds, effects, batching, and
//! cycle resolution work together correctly: glitch-free diamonds,
//! exactly-once invalidation per batch, stale-subscription cleanup,
//! and structured cycle errors.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use neoflux_core::reactive::TrackingContext;
use neoflux_core::{
    analyze_dependency_graph, batch, computed, computed_with_options, effect, signal, Computed,
    ComputedOptions, CycleConfig, CycleResolver, NodeId, ReactiveError,
};

/// End-to-end chain: `doubled` follows `sum` follows two signals, and
/// the intermediate computed evaluates exactly twice total (initial
/// read, one batched update) — not once per write.
#[test]
fn sum_and_doubled_settle_with_two_evaluations() {
    let a = signal(1);
    let b = signal(2);

    let sum = computed({
        let (a, b) = (a.clone(), b.clone());
        move || a.get() + b.get()
    });
    let doubled = computed({
        let sum = sum.clone();
        move || sum.get() * 2
    });

    assert_eq!(doubled.get(), 6);
    assert_eq!(sum.evaluation_count(), 1);

    batch(|| {
        a.set(10);
        b.set(20);
    });

    assert_eq!(doubled.get(), 60);
    assert_eq!(sum.evaluation_count(), 2);
}

/// Diamond: an effect depending on a signal through two computed paths
/// re-runs exactly once per change and never observes a half-updated
/// mix of old and new path states.
#[test]
fn diamond_update_is_glitch_free_and_exactly_once() {
    let a = signal(1);

    let left = computed({
        let a = a.clone();
        move || a.get() + 1
    });
    let right = computed({
        let a = a.clone();
        move || a.get() * 2
    });

    let observations = Arc::new(Mutex::new(Vec::new()));
    let _watcher = effect({
        let (left, right) = (left.clone(), right.clone());
        let observations = observations.clone();
        move || {
            observations.lock().unwrap().push((left.get(), right.get()));
        }
    });

    batch(|| a.set(10));

    let seen = observations.lock().unwrap().clone();
    // Initial run plus exactly one re-run; both observations are
    // internally consistent (computed from a single value of `a`).
    assert_eq!(seen, vec![(2, 2), (11, 20)]);
    assert_eq!(left.evaluation_count(), 2);
    assert_eq!(right.evaluation_count(), 2);
}

/// Third-level chain: a computed over two computeds over one signal
/// must update when the root changes. Deep chains are first-class.
#[test]
fn third_level_chain_updates_from_root() {
    let root = signal(1);

    let a = computed({
        let root = root.clone();
        move || root.get() + 1
    });
    let b = computed({
        let root = root.clone();
        move || root.get() * 2
    });
    let c = computed({
        let (a, b) = (a.clone(), b.clone());
        move || a.get() + b.get()
    });

    assert_eq!(c.get(), 4); // (1+1) + (1*2)

    root.set(5);

    assert_eq!(c.get(), 16); // (5+1) + (5*2)
    assert_eq!(c.evaluation_count(), 2);
}

/// A computed that conditionally reads one of two signals must stop
/// reacting to the branch it no longer reads.
#[test]
fn stale_subscriptions_are_cleaned_on_branch_flip() {
    let cond = signal(true);
    let a = signal(10);
    let b = signal(20);

    let picked = computed({
        let (cond, a, b) = (cond.clone(), a.clone(), b.clone());
        move || if cond.get() { a.get() } else { b.get() }
    });

    assert_eq!(picked.get(), 10);
    assert_eq!(picked.evaluation_count(), 1);

    // `b` is not read; writing it must not invalidate.
    b.set(21);
    assert!(!picked.is_stale());
    assert_eq!(picked.get(), 10);
    assert_eq!(picked.evaluation_count(), 1);

    // Flip the branch: now only `cond` and `b` are subscriptions.
    cond.set(false);
    assert_eq!(picked.get(), 21);
    assert_eq!(picked.evaluation_count(), 2);

    a.set(11);
    assert!(!picked.is_stale());
    assert_eq!(picked.evaluation_count(), 2);

    b.set(22);
    assert_eq!(picked.get(), 22);
    assert_eq!(picked.evaluation_count(), 3);
}

/// Writing a signal's current value is a no-op: no propagation at all.
#[test]
fn noop_write_propagates_nothing() {
    let source = signal(5);
    let runs = Arc::new(AtomicI32::new(0));

    let _watcher = effect({
        let source = source.clone();
        let runs = runs.clone();
        move || {
            source.get();
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    source.set(5);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(source.version(), 0);
}

/// Three writes inside one batch feeding one effect cause exactly one
/// re-run, after the batch body returns.
#[test]
fn batch_coalesces_writes_into_one_pass() {
    let x = signal(0);
    let y = signal(0);
    let z = signal(0);
    let runs = Arc::new(AtomicI32::new(0));

    let _watcher = effect({
        let (x, y, z) = (x.clone(), y.clone(), z.clone());
        let runs = runs.clone();
        move || {
            x.get();
            y.get();
            z.get();
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    batch(|| {
        x.set(1);
        y.set(2);
        z.set(3);
        // Nothing runs while the batch is open.
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    });

    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Nested batches flatten: only the outermost close propagates.
#[test]
fn nested_batches_propagate_once() {
    let source = signal(0);
    let runs = Arc::new(AtomicI32::new(0));

    let _watcher = effect({
        let source = source.clone();
        let runs = runs.clone();
        move || {
            source.get();
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });

    batch(|| {
        source.set(1);
        batch(|| {
            source.set(2);
            batch(|| source.set(3));
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    });

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(source.get_untracked(), 3);
}

fn mutual_cycle(resolver: CycleResolver, x_default: Option<i32>) -> (Computed<i32>, Computed<i32>) {
    let y_slot: Arc<OnceLock<Computed<i32>>> = Arc::new(OnceLock::new());

    let x = computed_with_options(
        {
            let y_slot = y_slot.clone();
            move || match y_slot.get() {
                Some(y) => y.get() + 1,
                None => 0,
            }
        },
        ComputedOptions {
            name: Some("x".into()),
            default: x_default,
            resolver: Some(resolver.clone()),
            ..ComputedOptions::default()
        },
    );
    let y = computed_with_options(
        {
            let x = x.clone();
            move || x.get() + 1
        },
        ComputedOptions {
            name: Some("y".into()),
            resolver: Some(resolver),
            ..ComputedOptions::default()
        },
    );
    let _ = y_slot.set(y.clone());
    (x, y)
}

/// Two computeds reading each other produce a structured error whose
/// cycle names both participants, and the graph survives for later
/// unrelated evaluations.
#[test]
fn mutual_cycle_raises_structured_error() {
    let resolver = CycleResolver::new(CycleConfig::development());
    let (x, y) = mutual_cycle(resolver.clone(), None);

    match x.try_get() {
        Err(ReactiveError::CircularDependency(err)) => {
            assert!(err.contains(x.id()));
            assert!(err.contains(y.id()));
            assert_eq!(err.path(), "x -> y -> x");
        }
        other => panic!("expected cycle error, got {other:?}"),
    }

    // Guaranteed cleanup ran: nothing is left on the active stack and
    // an unrelated computed evaluates normally.
    assert_eq!(resolver.active_depth(), 0);
    let unrelated = computed_with_options(
        || 7,
        ComputedOptions {
            resolver: Some(resolver),
            ..ComputedOptions::default()
        },
    );
    assert_eq!(unrelated.get(), 7);
}

/// Same cyclic shape, but with defaults enabled and a default on the
/// re-entered node: resolves without an error.
#[test]
fn mutual_cycle_recovers_with_default() {
    let mut config = CycleConfig::development();
    config.allow_with_defaults = true;
    let (x, y) = mutual_cycle(CycleResolver::new(config), Some(100));

    // Inner re-entry of `x` yields 100, so y = 101 and x = 102.
    assert_eq!(x.get(), 102);
    assert_eq!(y.get(), 101);
}

/// The offline analysis enumerates cycles from a plain adjacency map
/// without touching any live computation.
#[test]
fn offline_analysis_finds_cycles_in_captured_graph() {
    fn build(
        edges: &[(NodeId, NodeId)],
    ) -> std::collections::HashMap<NodeId, indexmap::IndexSet<NodeId>> {
        let mut map = std::collections::HashMap::<NodeId, indexmap::IndexSet<NodeId>>::new();
        for &(from, to) in edges {
            map.entry(from).or_default().insert(to);
        }
        map
    }

    let a = NodeId::new();
    let b = NodeId::new();
    let c = NodeId::new();

    let acyclic = build(&[(a, b), (b, c)]);
    assert!(!analyze_dependency_graph(&acyclic).has_cycles);

    let cyclic = build(&[(a, b), (b, c), (c, a)]);
    let analysis = analyze_dependency_graph(&cyclic);
    assert!(analysis.has_cycles);
    assert_eq!(analysis.cycles.len(), 1);
    assert_eq!(analysis.cycles[0].len(), 3);
}

/// A cycle routed through an effect — the effect reads a computed over
/// a signal, then writes that signal back — is contained: the nested
/// run is refused instead of recursing, and the graph settles.
#[test]
fn cycle_through_effect_indirection_is_contained() {
    let source = signal(0);
    let next = computed({
        let source = source.clone();
        move || source.get() + 1
    });
    let runs = Arc::new(AtomicI32::new(0));

    let _writer = effect({
        let (source, next) = (source.clone(), next.clone());
        let runs = runs.clone();
        move || {
            let value = next.get();
            runs.fetch_add(1, Ordering::SeqCst);
            source.set(value);
        }
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(source.get_untracked(), 1);

    source.set(5);

    // One re-run per external write; the self-inflicted write inside
    // the body does not cascade.
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(source.get_untracked(), 6);
}

/// Untracked reads inside an effect do not create subscriptions.
#[test]
fn untracked_reads_do_not_subscribe() {
    let tracked = signal(0);
    let ignored = signal(0);
    let runs = Arc::new(AtomicI32::new(0));

    let _watcher = effect({
        let (tracked, ignored) = (tracked.clone(), ignored.clone());
        let runs = runs.clone();
        move || {
            tracked.get();
            TrackingContext::untracked(|| ignored.get());
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    ignored.set(99);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    tracked.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// A caught panic inside `untracked` must not wipe the enclosing
/// evaluation's tracking: reads after the recovery still subscribe.
#[test]
fn caught_untracked_panic_keeps_enclosing_subscriptions() {
    let a = signal(1);
    let b = signal(2);

    let summed = computed({
        let (a, b) = (a.clone(), b.clone());
        move || {
            let _ = std::panic::catch_unwind(|| {
                TrackingContext::untracked(|| panic!("lookup failed"))
            });
            a.get() + b.get()
        }
    });

    assert_eq!(summed.get(), 3);
    assert_eq!(summed.subscriptions().len(), 2);

    a.set(10);
    assert_eq!(summed.get(), 12);
}

/// Effects created inside a batch still run immediately (creation is
/// evaluation, not propagation), and pick up batched writes afterward.
#[test]
fn effect_created_inside_batch_runs_immediately() {
    let source = signal(0);
    let observed = Arc::new(AtomicI32::new(-1));

    batch(|| {
        source.set(1);
        let _watcher = effect({
            let source = source.clone();
            let observed = observed.clone();
            move || observed.store(source.get(), Ordering::SeqCst)
        });
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    });
}
