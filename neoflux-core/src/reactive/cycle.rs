//! Circular Dependency Resolver
//!
//! Detects cycles during evaluation via an explicit active stack (not
//! the call stack) and resolves them according to a configurable policy:
//! substitute a default value, skip an optional node, or raise a
//! structured error carrying the full cycle path.
//!
//! # Protocol
//!
//! Every computed and effect evaluation asks the resolver for admission
//! before running its body. `enter` checks, in order:
//!
//! 1. Max depth exceeded (guards runaway recursive graphs that are not
//!    strict cycles) -> warn and skip the evaluation.
//! 2. Already on the active stack -> cycle found. Record it, then try
//!    recovery: defaults first, optional-skip second, structured error
//!    last.
//! 3. Otherwise push onto the stack and proceed.
//!
//! `exit` is paired with every successful `enter` through a drop guard,
//! so a panic mid-evaluation never leaves a ghost entry that would
//! falsely trigger detection on an unrelated later evaluation.
//!
//! # Policy
//!
//! Development and production want different behavior: development
//! fails loudly with full diagnostics, production degrades gracefully
//! using defaults and skips. Both are plain configurations on the
//! resolver, not hardcoded branches; the process-wide default instance
//! picks one based on `cfg(debug_assertions)`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use thiserror::Error;
use tracing::warn;

use crate::graph::NodeId;

/// Recovery and detection policy for a [`CycleResolver`].
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Resolve a cycle by substituting the entering computation's
    /// default value, when it has one. Only the re-entered
    /// computation's own default is consulted: another participant's
    /// default has a different value type and a different meaning.
    pub allow_with_defaults: bool,

    /// Resolve a cycle by skipping, when some participant is optional.
    pub break_at_optional: bool,

    /// Maximum active-stack depth before an evaluation is skipped.
    /// A safety valve against unbounded recursion, not a wall-clock
    /// timeout.
    pub max_depth: usize,

    /// Emit `tracing` warnings on detection and recovery.
    pub log_warnings: bool,

    /// Raise a [`CircularDependencyError`] when recovery is exhausted
    /// or disabled. When false, the caller falls back to its last
    /// cached value instead.
    pub throw_on_detection: bool,
}

impl CycleConfig {
    /// Fail-loud configuration: surface cycles immediately with full
    /// diagnostics.
    pub fn development() -> Self {
        Self {
            allow_with_defaults: false,
            break_at_optional: false,
            max_depth: 256,
            log_warnings: true,
            throw_on_detection: true,
        }
    }

    /// Degrade-gracefully configuration: prefer defaults and skips,
    /// warn instead of erroring.
    pub fn production() -> Self {
        Self {
            allow_with_defaults: true,
            break_at_optional: true,
            max_depth: 256,
            log_warnings: true,
            throw_on_detection: false,
        }
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::development()
        } else {
            Self::production()
        }
    }
}

/// One computation's identity as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleParticipant {
    /// The computation's graph node.
    pub id: NodeId,

    /// Human-readable name for diagnostics, when the caller gave one.
    pub name: Option<String>,

    /// Whether the computation carries a default value.
    pub has_default: bool,

    /// Whether the computation may be skipped during recovery.
    pub optional: bool,
}

impl fmt::Display for CycleParticipant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.id),
        }
    }
}

/// A circular dependency that could not be recovered.
///
/// Carries the ordered cycle (first re-entered node through the path
/// back to it) for diagnostics. Safe to catch at the boundary of a
/// top-level render or effect pass: the resolver's guaranteed cleanup
/// has already run, so the graph is not corrupted.
#[derive(Debug, Clone, Error)]
#[error("circular dependency detected: {}", self.path())]
pub struct CircularDependencyError {
    /// The participants on the cycle, in evaluation order.
    pub cycle: Vec<CycleParticipant>,
}

impl CircularDependencyError {
    /// Render the cycle as `a -> b -> a`.
    pub fn path(&self) -> String {
        self.cycle
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Whether the given node participates in the cycle.
    pub fn contains(&self, id: NodeId) -> bool {
        self.cycle.iter().any(|p| p.id == id)
    }
}

/// Errors surfaced by a computed's fallible read.
#[derive(Debug, Clone, Error)]
pub enum ReactiveError {
    /// A cycle was detected and no recovery strategy applied.
    #[error(transparent)]
    CircularDependency(#[from] CircularDependencyError),

    /// The active evaluation stack exceeded the configured maximum and
    /// the computation had neither a cached value nor a default.
    #[error("evaluation depth {depth} exceeded the configured maximum of {max_depth}")]
    MaxDepthExceeded {
        /// Stack depth at the point of refusal.
        depth: usize,
        /// The configured limit.
        max_depth: usize,
    },
}

/// The resolver's verdict for one evaluation attempt.
#[derive(Debug)]
pub enum Admission {
    /// Safe to evaluate. The guard exits the stack on drop.
    Proceed(ActiveGuard),

    /// Cycle found; the entering computation should yield its default
    /// value instead of evaluating.
    UseDefault,

    /// Cycle found; the evaluation should be skipped. The caller falls
    /// back to its cached value (or default), or reports the carried
    /// cycle if it has neither.
    Skip {
        /// The detected cycle, for error reporting by the caller.
        cycle: Vec<CycleParticipant>,
    },

    /// The active stack is too deep; skip this evaluation.
    DepthExceeded {
        /// Stack depth at the point of refusal.
        depth: usize,
        /// The configured limit.
        max_depth: usize,
    },
}

/// Exit guard for one admitted evaluation.
///
/// Removes the computation from the active stack on drop, which runs
/// even when the evaluation body panics.
#[derive(Debug)]
pub struct ActiveGuard {
    resolver: CycleResolver,
    id: NodeId,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.resolver.exit(self.id);
    }
}

/// Mutable resolver state, shared between clones.
#[derive(Debug, Default)]
struct ResolverState {
    /// Computations currently being entered, innermost last.
    stack: Vec<CycleParticipant>,

    /// Re-entry count per computation.
    depths: HashMap<NodeId, usize>,

    /// Every cycle detected so far, for diagnostics.
    detected: Vec<Vec<CycleParticipant>>,
}

/// Detects and resolves circular dependencies between computations.
///
/// Cloning shares state: clones observe the same active stack, so a
/// computation handed a clone of the process-wide resolver participates
/// in global detection. Construct a fresh instance per scope for
/// isolation (tests, embedded runtimes).
#[derive(Debug, Clone)]
pub struct CycleResolver {
    state: Arc<RwLock<ResolverState>>,
    config: Arc<RwLock<CycleConfig>>,
}

impl CycleResolver {
    /// Create a resolver with the given policy.
    pub fn new(config: CycleConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(ResolverState::default())),
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// The process-wide default resolver.
    ///
    /// Its policy follows [`CycleConfig::default`]: fail-loud in debug
    /// builds, degrade-gracefully in release builds.
    pub fn global() -> &'static CycleResolver {
        static GLOBAL: OnceLock<CycleResolver> = OnceLock::new();
        GLOBAL.get_or_init(|| CycleResolver::new(CycleConfig::default()))
    }

    /// The current policy.
    pub fn config(&self) -> CycleConfig {
        self.config.read().expect("config lock poisoned").clone()
    }

    /// Replace the policy. Takes effect on the next `enter`.
    pub fn set_config(&self, config: CycleConfig) {
        *self.config.write().expect("config lock poisoned") = config;
    }

    /// Ask for admission to evaluate `participant`.
    ///
    /// See the module docs for the order of checks. An
    /// [`Admission::Proceed`] must be held for the whole evaluation so
    /// the paired exit runs from its drop.
    pub fn enter(
        &self,
        participant: CycleParticipant,
    ) -> Result<Admission, CircularDependencyError> {
        let config = self.config();
        let mut state = self.state.write().expect("resolver state lock poisoned");

        if state.stack.len() >= config.max_depth {
            let depth = state.stack.len();
            if config.log_warnings {
                warn!(
                    computation = %participant,
                    depth,
                    max_depth = config.max_depth,
                    "evaluation depth limit reached, skipping"
                );
            }
            return Ok(Admission::DepthExceeded {
                depth,
                max_depth: config.max_depth,
            });
        }

        if let Some(pos) = state.stack.iter().position(|p| p.id == participant.id) {
            let mut cycle: Vec<CycleParticipant> = state.stack[pos..].to_vec();
            cycle.push(participant.clone());
            state.detected.push(cycle.clone());
            drop(state);

            if config.log_warnings {
                warn!(
                    cycle = %CircularDependencyError { cycle: cycle.clone() }.path(),
                    "circular dependency detected"
                );
            }

            if config.allow_with_defaults && participant.has_default {
                return Ok(Admission::UseDefault);
            }
            if config.break_at_optional && cycle.iter().any(|p| p.optional) {
                return Ok(Admission::Skip { cycle });
            }
            if config.throw_on_detection {
                return Err(CircularDependencyError { cycle });
            }
            // Detection disabled and no recovery applied: let the
            // caller fall back to whatever value it already has.
            return Ok(Admission::Skip { cycle });
        }

        *state.depths.entry(participant.id).or_insert(0) += 1;
        let id = participant.id;
        state.stack.push(participant);
        drop(state);

        Ok(Admission::Proceed(ActiveGuard {
            resolver: self.clone(),
            id,
        }))
    }

    /// Remove a computation from the active stack.
    ///
    /// Called from the admission guard's drop; never call directly.
    fn exit(&self, id: NodeId) {
        let mut state = self.state.write().expect("resolver state lock poisoned");

        if let Some(pos) = state.stack.iter().rposition(|p| p.id == id) {
            state.stack.remove(pos);
        }
        if let Some(depth) = state.depths.get_mut(&id) {
            *depth = depth.saturating_sub(1);
            if *depth == 0 {
                state.depths.remove(&id);
            }
        }
    }

    /// Current active-stack depth.
    pub fn active_depth(&self) -> usize {
        self.state
            .read()
            .expect("resolver state lock poisoned")
            .stack
            .len()
    }

    /// All cycles detected so far, for diagnostics.
    pub fn detected_cycles(&self) -> Vec<Vec<CycleParticipant>> {
        self.state
            .read()
            .expect("resolver state lock poisoned")
            .detected
            .clone()
    }
}

impl Default for CycleResolver {
    fn default() -> Self {
        Self::new(CycleConfig::default())
    }
}
