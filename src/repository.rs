//! The repository: scope owner for arrangements, recorded invocations and
//! mocks.
//!
//! All state sits behind one re-entrant lock. Behaviors run with the lock
//! held but the state borrow released, so a behavior delegate may call back
//! into the same repository (arrange, dispatch, create mocks) on its own
//! thread. Matcher predicates and acceptance guards run while the tree walk
//! holds the borrow; calls they make on the same repository are bypassed.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::ReentrantMutex;

use crate::arrangement::{Arrangement, ArrangementHandle, ArrangementId};
use crate::behavior::{BehaviorContext, Occurs, run_pipeline};
use crate::call_pattern::CallPattern;
use crate::config::EngineConfig;
use crate::context::CallContext;
use crate::dispatch::{self, Resolution};
use crate::dump::{ArrangementDump, DebugDump, InvocationDump};
use crate::error::{AssertionFailure, ConfigurationError, MockError};
use crate::invocation::Invocation;
use crate::matcher::Matcher;
use crate::method::{MethodInfo, MethodRole};
use crate::mixin::{MockBehavior, MockMixin};
use crate::occurrence::OccurrenceCounter;
use crate::tree::{MatchMode, MatcherTree};
use crate::value::{ObjectRef, TypeDesc, Value};

static NEXT_REPOSITORY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Default)]
struct RepositoryState {
    arrangements: MatcherTree<Arc<Arrangement>>,
    invocations: MatcherTree<OccurrenceCounter>,
    next_id: u64,
    /// Keyed by `ObjectRef::id`.
    mixins: HashMap<u64, Arc<MockMixin>>,
}

pub struct Repository {
    id: u64,
    config: EngineConfig,
    parent: Option<Arc<Repository>>,
    state: ReentrantMutex<RefCell<RepositoryState>>,
    /// Set while a tree walk for dispatch is in progress (lock held).
    resolving: AtomicBool,
    last_in_order: AtomicU64,
    retired: AtomicBool,
}

struct ResolvingScope<'a>(&'a AtomicBool);

impl<'a> ResolvingScope<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ResolvingScope<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Repository {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Arc::new(Self::with_state(config, None, RepositoryState::default(), 0))
    }

    fn with_state(
        config: EngineConfig,
        parent: Option<Arc<Repository>>,
        state: RepositoryState,
        last_in_order: u64,
    ) -> Self {
        Self {
            id: NEXT_REPOSITORY_ID.fetch_add(1, Ordering::Relaxed),
            config,
            parent,
            state: ReentrantMutex::new(RefCell::new(state)),
            resolving: AtomicBool::new(false),
            last_in_order: AtomicU64::new(last_in_order),
            retired: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn parent(&self) -> Option<&Arc<Repository>> {
        self.parent.as_ref()
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// A nested scope starting from a copy of this repository's trees.
    /// Arrangements made in the child never reach the parent.
    pub fn child(self: &Arc<Self>) -> Result<Arc<Repository>, ConfigurationError> {
        self.ensure_live()?;
        let state = self.read_state("create a child scope", RepositoryState::clone)?;
        let child = Self::with_state(
            self.config.clone(),
            Some(Arc::clone(self)),
            state,
            self.last_in_order(),
        );
        tracing::debug!(parent = self.id, child = child.id, "child repository created");
        Ok(Arc::new(child))
    }

    fn ensure_live(&self) -> Result<(), ConfigurationError> {
        if self.is_retired() {
            Err(ConfigurationError::RetiredRepository)
        } else {
            Ok(())
        }
    }

    fn read_state<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&RepositoryState) -> R,
    ) -> Result<R, ConfigurationError> {
        let guard = self.state.lock();
        let state = guard
            .try_borrow()
            .map_err(|_| ConfigurationError::Busy { operation })?;
        Ok(f(&state))
    }

    fn write_state<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut RepositoryState) -> R,
    ) -> Result<R, ConfigurationError> {
        let guard = self.state.lock();
        let mut state = guard
            .try_borrow_mut()
            .map_err(|_| ConfigurationError::Busy { operation })?;
        Ok(f(&mut state))
    }

    // ---- mocks ----

    /// Create a mock of `ty`. `None` picks the configured default behavior.
    pub fn create_mock(
        &self,
        ty: &TypeDesc,
        behavior: Option<MockBehavior>,
    ) -> Result<ObjectRef, ConfigurationError> {
        let behavior = behavior.unwrap_or(self.config.default_behavior);
        self.register_mock(ObjectRef::new(ty.clone()), behavior, 0)
    }

    /// Like `create_mock`, with a label used in messages and dumps.
    pub fn create_named_mock(
        &self,
        ty: &TypeDesc,
        label: &str,
        behavior: Option<MockBehavior>,
    ) -> Result<ObjectRef, ConfigurationError> {
        let behavior = behavior.unwrap_or(self.config.default_behavior);
        self.register_mock(ObjectRef::labeled(ty.clone(), label), behavior, 0)
    }

    pub(crate) fn create_sub_mock(
        &self,
        ty: &TypeDesc,
        behavior: MockBehavior,
        depth: usize,
    ) -> Result<ObjectRef, ConfigurationError> {
        self.register_mock(ObjectRef::new(ty.clone()), behavior, depth)
    }

    fn register_mock(
        &self,
        object: ObjectRef,
        behavior: MockBehavior,
        depth: usize,
    ) -> Result<ObjectRef, ConfigurationError> {
        self.ensure_live()?;
        let mixin = Arc::new(MockMixin::new(object.clone(), behavior, depth));
        self.write_state("create a mock", |state| {
            state.mixins.insert(object.id(), mixin);
        })?;
        tracing::debug!(repository = self.id, mock = %object, %behavior, depth, "mock created");
        Ok(object)
    }

    /// The administrative object of `value`, if it is a mock known to this
    /// repository or one of its ancestors.
    pub fn mixin_of(&self, value: &Value) -> Option<Arc<MockMixin>> {
        let object = value.as_object()?;
        let local = self
            .read_state("look up a mock", |state| state.mixins.get(&object.id()).cloned())
            .ok()
            .flatten();
        local.or_else(|| self.parent.as_ref().and_then(|p| p.mixin_of(value)))
    }

    // ---- arrangement ----

    pub fn arrange(
        &self,
        ctx: &CallContext,
        pattern: CallPattern,
    ) -> Result<ArrangementHandle, ConfigurationError> {
        let expression = pattern.to_string();
        self.arrange_described(ctx, pattern, &expression)
    }

    /// Register `pattern`, quoting `expression` in failure messages.
    pub fn arrange_described(
        &self,
        ctx: &CallContext,
        pattern: CallPattern,
        expression: &str,
    ) -> Result<ArrangementHandle, ConfigurationError> {
        self.ensure_live()?;
        check_arrangeable(pattern.method())?;
        let _internal = ctx.enter_internal();
        let arrangement = self.write_state("arrange", |state| {
            state.next_id += 1;
            let id = ArrangementId::new(state.next_id);
            let arrangement = Arc::new(Arrangement::new(
                id,
                pattern,
                expression.to_string(),
                self.config.call_log_limit,
            ));
            state
                .arrangements
                .insert(arrangement.pattern(), Arc::clone(&arrangement));
            arrangement
        })?;
        tracing::debug!(
            repository = self.id,
            arrangement = %arrangement.id(),
            pattern = %arrangement.pattern(),
            "arranged"
        );
        Ok(ArrangementHandle::new(arrangement))
    }

    // ---- dispatch ----

    /// Resolve and run a live call. The interception source reads
    /// `invocation.outcome` afterwards; an `Err` is a fail-fast violation the
    /// source raises in place of the call.
    pub fn dispatch(
        &self,
        ctx: &CallContext,
        invocation: &mut Invocation,
    ) -> Result<Resolution, MockError> {
        if ctx.is_guarded() {
            invocation.outcome.call_original = true;
            return Ok(Resolution::Bypassed);
        }
        let _internal = ctx.enter_internal();
        if self.is_retired() {
            tracing::warn!(repository = self.id, call = %invocation, "call on retired repository");
            invocation.outcome.call_original = true;
            return Ok(Resolution::Bypassed);
        }
        let expected = invocation.method().arg_count();
        if invocation.matched_args().len() != expected {
            return Err(ConfigurationError::ArgumentCountMismatch {
                method: invocation.method().to_string(),
                expected,
                actual: invocation.matched_args().len(),
            }
            .into());
        }

        let guard = self.state.lock();
        if self.resolving.load(Ordering::Acquire) {
            tracing::trace!(call = %invocation, "re-entrant call during resolution bypassed");
            invocation.outcome.call_original = true;
            return Ok(Resolution::Bypassed);
        }

        let call = invocation.to_pattern();
        let winner = {
            let state = guard
                .try_borrow()
                .map_err(|_| ConfigurationError::Busy { operation: "dispatch" })?;
            let _resolving = ResolvingScope::enter(&self.resolving);
            let candidates = dispatch::collect_candidates(&state.arrangements, &call, ctx);
            tracing::trace!(call = %call, candidates = candidates.len(), "dispatch candidates");
            dispatch::select(&candidates, invocation.matched_args(), ctx)
        };
        if let Some(arrangement) = &winner {
            arrangement.mark_used();
        }
        let winner_id = winner.as_ref().map(|a| a.id());

        {
            let mut state = guard
                .try_borrow_mut()
                .map_err(|_| ConfigurationError::Busy { operation: "dispatch" })?;
            for pattern in dispatch::lookup_patterns(&call) {
                state
                    .invocations
                    .get_or_insert_with(&pattern, || OccurrenceCounter::new(pattern.clone()))
                    .record(winner_id);
            }
        }

        let mixin = invocation.receiver().and_then(|r| self.mixin_of(r));
        let cx = BehaviorContext {
            call: ctx,
            repository: self,
            mixin: mixin.as_ref(),
            arrangement: winner_id,
        };

        match winner {
            Some(arrangement) => {
                tracing::debug!(
                    repository = self.id,
                    arrangement = %arrangement.id(),
                    call = %call,
                    "dispatch matched"
                );
                run_pipeline(&arrangement.behaviors(), invocation, &cx)?;
                if let Some(mixin) = &mixin {
                    run_pipeline(&mixin.supplementary(), invocation, &cx)?;
                }
                Ok(Resolution::Matched(arrangement.id()))
            }
            None => {
                tracing::debug!(repository = self.id, call = %call, "dispatch unmatched");
                match &mixin {
                    Some(mixin) => run_pipeline(mixin.fallback(), invocation, &cx)?,
                    None => invocation.outcome.call_original = true,
                }
                Ok(Resolution::Unmatched)
            }
        }
    }

    // ---- bookkeeping queries ----

    /// How many recorded calls `pattern` covers.
    pub fn times_called(
        &self,
        ctx: &CallContext,
        pattern: &CallPattern,
    ) -> Result<usize, ConfigurationError> {
        let _internal = ctx.enter_internal();
        self.read_state("count calls", |state| {
            matching_counters(state, pattern, ctx)
                .iter()
                .map(|c| c.count())
                .sum()
        })
    }

    pub fn last_in_order(&self) -> u64 {
        self.last_in_order.load(Ordering::Acquire)
    }

    pub(crate) fn mark_in_order(&self, id: ArrangementId) {
        self.last_in_order.fetch_max(id.get(), Ordering::AcqRel);
    }

    // ---- assertions ----

    /// With `occurs`, check the number of recorded calls `pattern` covers.
    /// Without, assert every arrangement `pattern` covers (each must have been
    /// called at least once unless it declares its own expectation), or, if
    /// none was arranged, that some matching call happened.
    pub fn assert_pattern(
        &self,
        ctx: &CallContext,
        pattern: &CallPattern,
        occurs: Option<Occurs>,
    ) -> Result<(), MockError> {
        let _internal = ctx.enter_internal();
        let failures = self.read_state("assert", |state| {
            let mut arrangements = match occurs {
                Some(_) => Vec::new(),
                None => state
                    .arrangements
                    .query(pattern, MatchMode::Concretizing, ctx),
            };
            if arrangements.is_empty() {
                let counters = matching_counters(state, pattern, ctx);
                let count = counters.iter().map(|c| c.count()).sum();
                let calls = self.call_log(&counters);
                let occurs = occurs.unwrap_or_else(Occurs::at_least_once);
                return occurs
                    .check(count, Some(pattern.to_string()), calls)
                    .err()
                    .into_iter()
                    .collect::<Vec<_>>();
            }
            arrangements.sort_by_key(|a| a.id());
            arrangements
                .iter()
                .filter_map(|a| a.assert(Some(Occurs::at_least_once())).err())
                .collect::<Vec<_>>()
        })?;
        self.finish_assertion("pattern", failures)
    }

    /// Assert one arrangement; it must have been called at least once
    /// unless it declares its own expectation.
    pub fn assert_arrangement(
        &self,
        ctx: &CallContext,
        handle: &ArrangementHandle,
    ) -> Result<(), MockError> {
        let _internal = ctx.enter_internal();
        let failures = self.read_state("assert", |_| {
            handle
                .arrangement()
                .assert(Some(Occurs::at_least_once()))
                .err()
                .into_iter()
                .collect()
        })?;
        self.finish_assertion("arrangement", failures)
    }

    /// Assert the declared expectations of every arrangement made on
    /// `instance` or credited for calls on it, plus its strict violations.
    pub fn assert_object(&self, ctx: &CallContext, instance: &Value) -> Result<(), MockError> {
        let _internal = ctx.enter_internal();
        let receiver = Matcher::Reference(instance.clone());
        let mut failures = self.read_state("assert", |state| {
            let mut ids: BTreeSet<ArrangementId> = state
                .arrangements
                .query_instance(&receiver, MatchMode::Concretizing, ctx)
                .iter()
                .map(|a| a.id())
                .collect();
            for counter in state
                .invocations
                .query_instance(&receiver, MatchMode::Concretizing, ctx)
            {
                ids.extend(counter.arrangements());
            }
            let mut found: Vec<&Arc<Arrangement>> = state
                .arrangements
                .leaves()
                .filter(|a| ids.contains(&a.id()))
                .collect();
            found.sort_by_key(|a| a.id());
            found
                .iter()
                .filter_map(|a| a.assert(None).err())
                .collect::<Vec<_>>()
        })?;
        if let Some(mixin) = self.mixin_of(instance) {
            failures.extend(mixin.strict_violations());
        }
        self.finish_assertion("object", failures)
    }

    /// Assert the declared expectations of every arrangement and every
    /// strict violation in the repository.
    pub fn assert_all(&self, ctx: &CallContext) -> Result<(), MockError> {
        let _internal = ctx.enter_internal();
        let failures = self.read_state("assert", |state| {
            let mut arrangements: Vec<&Arc<Arrangement>> = state.arrangements.leaves().collect();
            arrangements.sort_by_key(|a| a.id());
            let mut failures: Vec<AssertionFailure> = arrangements
                .iter()
                .filter_map(|a| a.assert(None).err())
                .collect();
            let mut mixins: Vec<&Arc<MockMixin>> = state.mixins.values().collect();
            mixins.sort_by_key(|m| m.object().id());
            for mixin in mixins {
                failures.extend(mixin.strict_violations());
            }
            failures
        })?;
        self.finish_assertion("all", failures)
    }

    fn call_log(&self, counters: &[&OccurrenceCounter]) -> Vec<String> {
        counters
            .iter()
            .take(self.config.call_log_limit)
            .map(|c| match c.count() {
                1 => c.pattern().to_string(),
                n => format!("{} ({n} times)", c.pattern()),
            })
            .collect()
    }

    fn finish_assertion(
        &self,
        scope: &'static str,
        failures: Vec<AssertionFailure>,
    ) -> Result<(), MockError> {
        let Some(mut failure) = AssertionFailure::aggregate(failures) else {
            tracing::debug!(repository = self.id, scope, "assertion passed");
            return Ok(());
        };
        if !self.config.aggregate_failures {
            if let AssertionFailure::Aggregate(inner) = &failure {
                if let Some(first) = inner.first() {
                    failure = first.clone();
                }
            }
        }
        tracing::debug!(repository = self.id, scope, failures = failure.count(), "assertion failed");
        Err(failure.into())
    }

    // ---- lifecycle ----

    /// Drop every arrangement and recorded call; mocks stay but lose their
    /// recorded state.
    pub fn reset(&self, ctx: &CallContext) -> Result<(), ConfigurationError> {
        let _internal = ctx.enter_internal();
        self.write_state("reset", |state| {
            state.arrangements = MatcherTree::new();
            state.invocations = MatcherTree::new();
            for mixin in state.mixins.values() {
                mixin.reset();
            }
        })?;
        self.last_in_order.store(0, Ordering::Release);
        tracing::debug!(repository = self.id, "repository reset");
        Ok(())
    }

    /// End of scope: forget everything and disable interception. Later
    /// calls run their original implementation; later arrangements fail.
    pub fn retire(&self, ctx: &CallContext) -> Result<(), ConfigurationError> {
        let _internal = ctx.enter_internal();
        self.write_state("retire", |state| *state = RepositoryState::default())?;
        self.retired.store(true, Ordering::Release);
        tracing::debug!(repository = self.id, "repository retired");
        Ok(())
    }

    // ---- introspection ----

    pub fn debug_dump(&self, ctx: &CallContext) -> Result<DebugDump, ConfigurationError> {
        let _internal = ctx.enter_internal();
        self.read_state("dump", |state| {
            let mut arrangements: Vec<ArrangementDump> = state
                .arrangements
                .leaves()
                .map(|a| ArrangementDump {
                    id: a.id().get(),
                    expression: a.expression(),
                    sequential: a.is_sequential(),
                    used: a.is_used(),
                    times_called: a.times_called(),
                    behaviors: a.behaviors().iter().map(|b| b.name().to_string()).collect(),
                    assertions: a.debug_views(),
                })
                .collect();
            arrangements.sort_by_key(|a| a.id);
            let invocations = state
                .invocations
                .leaves()
                .map(|c| InvocationDump {
                    declared_on: c.pattern().method().declaring_type().to_string(),
                    call: c.pattern().to_string(),
                    count: c.count(),
                    arrangements: c.arrangements().iter().map(|id| id.get()).collect(),
                })
                .collect();
            DebugDump {
                repository: self.id,
                arrangements,
                invocations,
            }
        })
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("id", &self.id)
            .field("parent", &self.parent.as_ref().map(|p| p.id))
            .field("retired", &self.is_retired())
            .finish_non_exhaustive()
    }
}

/// The equality method of a value type can't be arranged: dispatch itself
/// compares values with it.
fn check_arrangeable(method: &MethodInfo) -> Result<(), ConfigurationError> {
    if *method.role() == MethodRole::Equality && method.declaring_type().is_value_type() {
        return Err(ConfigurationError::IncompatibleMethod {
            method: method.to_string(),
            reason: "equality on a value type cannot be intercepted".to_string(),
        });
    }
    Ok(())
}

fn matching_counters<'a>(
    state: &'a RepositoryState,
    pattern: &CallPattern,
    ctx: &CallContext,
) -> Vec<&'a OccurrenceCounter> {
    state
        .invocations
        .query(pattern, MatchMode::Concretizing, ctx)
        .into_iter()
        .filter(|c| pattern.filter_accepts(c.args(), ctx))
        .collect()
}
