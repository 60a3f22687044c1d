//! Arrangements: registered call patterns with attached behaviors.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

use crate::behavior::{
    Behavior, CallOriginalBehavior, ImplementationBehavior, InOrderBehavior, OccurrenceBehavior,
    Occurs, ReturnsBehavior, ThrowsBehavior,
};
use crate::call_pattern::{ArgFilter, CallPattern};
use crate::context::CallContext;
use crate::error::AssertionFailure;
use crate::value::Value;

/// Per-repository registration index. Strictly increasing; drives both the
/// dispatch tie-break and in-order checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ArrangementId(u64);

impl ArrangementId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ArrangementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Arrangement {
    id: ArrangementId,
    pattern: CallPattern,
    expression: RwLock<String>,
    behaviors: RwLock<Vec<Arc<dyn Behavior>>>,
    occurrence: Arc<OccurrenceBehavior>,
    sequential: AtomicBool,
    used: AtomicBool,
    guard: RwLock<Option<ArgFilter>>,
}

impl Arrangement {
    pub(crate) fn new(id: ArrangementId, pattern: CallPattern, expression: String, log_limit: usize) -> Self {
        let occurrence = Arc::new(OccurrenceBehavior::new(expression.clone(), log_limit));
        let behaviors: Vec<Arc<dyn Behavior>> = vec![occurrence.clone()];
        Self {
            id,
            pattern,
            expression: RwLock::new(expression),
            behaviors: RwLock::new(behaviors),
            occurrence,
            sequential: AtomicBool::new(false),
            used: AtomicBool::new(false),
            guard: RwLock::new(None),
        }
    }

    pub fn id(&self) -> ArrangementId {
        self.id
    }

    pub fn pattern(&self) -> &CallPattern {
        &self.pattern
    }

    pub fn expression(&self) -> String {
        self.expression.read().clone()
    }

    pub fn is_sequential(&self) -> bool {
        self.sequential.load(Ordering::Acquire)
    }

    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }

    pub(crate) fn mark_used(&self) {
        self.used.store(true, Ordering::Release);
    }

    pub fn occurrence(&self) -> &OccurrenceBehavior {
        &self.occurrence
    }

    pub fn times_called(&self) -> usize {
        self.occurrence.calls()
    }

    /// Snapshot of the behavior list, in execution order.
    pub fn behaviors(&self) -> Vec<Arc<dyn Behavior>> {
        self.behaviors.read().clone()
    }

    pub fn add_behavior(&self, behavior: Arc<dyn Behavior>) {
        self.behaviors.write().push(behavior);
    }

    pub fn has_guard(&self) -> bool {
        self.guard.read().is_some()
    }

    /// Evaluate the acceptance guard against the call's arguments. No guard
    /// accepts everything.
    pub fn accepts(&self, args: &[Value], ctx: &CallContext) -> bool {
        let guard = self.guard.read().clone();
        guard.is_none_or(|g| g.accepts(args, ctx))
    }

    /// Assert every assertable behavior, collecting all failures. `fallback`
    /// is the occurrence bound used when none was declared.
    pub fn assert(&self, fallback: Option<Occurs>) -> Result<(), AssertionFailure> {
        let mut failures = Vec::new();
        if let Err(e) = self.occurrence.assert_or(fallback) {
            failures.push(e);
        }
        for behavior in self.behaviors() {
            if std::ptr::addr_eq(Arc::as_ptr(&behavior), Arc::as_ptr(&self.occurrence)) {
                continue;
            }
            if let Some(assertable) = behavior.as_assertable() {
                if let Err(e) = assertable.assert() {
                    failures.push(e);
                }
            }
        }
        match AssertionFailure::aggregate(failures) {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    /// `debug_view` of every assertable behavior.
    pub fn debug_views(&self) -> Vec<String> {
        self.behaviors()
            .iter()
            .filter_map(|b| b.as_assertable().map(|a| a.debug_view()))
            .collect()
    }
}

impl fmt::Debug for Arrangement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arrangement")
            .field("id", &self.id)
            .field("pattern", &self.pattern.to_string())
            .field("sequential", &self.is_sequential())
            .field("used", &self.is_used())
            .finish_non_exhaustive()
    }
}

/// What `Repository::arrange` hands back. Cloning shares the arrangement.
///
/// Every configuration method returns `&Self` so calls chain:
///
/// ```ignore
/// repo.arrange(&ctx, pattern)?.returns(5).occurs(Occurs::exactly(2));
/// ```
#[derive(Clone)]
pub struct ArrangementHandle(Arc<Arrangement>);

impl ArrangementHandle {
    pub(crate) fn new(arrangement: Arc<Arrangement>) -> Self {
        Self(arrangement)
    }

    pub fn id(&self) -> ArrangementId {
        self.0.id
    }

    pub fn arrangement(&self) -> &Arc<Arrangement> {
        &self.0
    }

    pub fn times_called(&self) -> usize {
        self.0.times_called()
    }

    pub fn returns(&self, value: impl Into<Value>) -> &Self {
        self.0.add_behavior(Arc::new(ReturnsBehavior::new(value.into())));
        self
    }

    /// Compute the return value from the call's arguments.
    pub fn returns_with(&self, f: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> &Self {
        self.0
            .add_behavior(Arc::new(ImplementationBehavior::new(move |args| Some(f(args)))));
        self
    }

    pub fn throws(&self, error: impl Into<Value>) -> &Self {
        self.0.add_behavior(Arc::new(ThrowsBehavior::new(error.into())));
        self
    }

    /// Run `f` instead of the original; the return value is left unset.
    pub fn does_instead(&self, f: impl Fn(&[Value]) + Send + Sync + 'static) -> &Self {
        self.0.add_behavior(Arc::new(ImplementationBehavior::new(move |args| {
            f(args);
            None
        })));
        self
    }

    pub fn call_original(&self) -> &Self {
        self.0.add_behavior(Arc::new(CallOriginalBehavior));
        self
    }

    pub fn with_behavior(&self, behavior: Arc<dyn Behavior>) -> &Self {
        self.0.add_behavior(behavior);
        self
    }

    pub fn occurs(&self, occurs: Occurs) -> &Self {
        self.0.occurrence.set_expected(occurs);
        self
    }

    pub fn occurs_once(&self) -> &Self {
        self.occurs(Occurs::once())
    }

    pub fn occurs_never(&self) -> &Self {
        self.occurs(Occurs::never())
    }

    pub fn must_be_called(&self) -> &Self {
        self.occurs(Occurs::at_least_once())
    }

    /// One-shot: consumed by the first matching call, in registration order.
    pub fn in_sequence(&self) -> &Self {
        self.0.sequential.store(true, Ordering::Release);
        self
    }

    /// Must be called after every in-order arrangement registered before it.
    pub fn in_order(&self) -> &Self {
        self.0
            .add_behavior(Arc::new(InOrderBehavior::new(self.0.id, self.0.expression())));
        self
    }

    /// Acceptance guard checked at dispatch time, after the tree walk.
    pub fn when(&self, guard: ArgFilter) -> &Self {
        *self.0.guard.write() = Some(guard);
        self
    }

    /// Expression text quoted in failure messages.
    pub fn with_expression(&self, expression: &str) -> &Self {
        *self.0.expression.write() = expression.to_string();
        self.0.occurrence.set_expression(expression.to_string());
        self
    }
}

impl fmt::Debug for ArrangementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Matcher;
    use crate::testutil::calculator;

    fn arrangement() -> ArrangementHandle {
        let fx = calculator();
        let pattern = CallPattern::any_args(fx.add.clone(), Matcher::Any).unwrap();
        ArrangementHandle::new(Arc::new(Arrangement::new(
            ArrangementId::new(1),
            pattern,
            "calc.add(<any>, <any>)".into(),
            10,
        )))
    }

    #[test]
    fn occurrence_behavior_runs_first() {
        let h = arrangement();
        h.returns(3).throws("boom");
        let names: Vec<_> = h.arrangement().behaviors().iter().map(|b| b.name()).collect();
        assert_eq!(names, ["occurrence", "returns", "throws"]);
    }

    #[test]
    fn guard_is_evaluated_lazily() {
        let h = arrangement();
        let ctx = CallContext::new();
        assert!(h.arrangement().accepts(&[Value::Int(1), Value::Int(2)], &ctx));
        h.when(ArgFilter::new("a > 10", |args| {
            matches!(args.first(), Some(Value::Int(a)) if *a > 10)
        }));
        assert!(h.arrangement().has_guard());
        assert!(!h.arrangement().accepts(&[Value::Int(1), Value::Int(2)], &ctx));
        assert!(h.arrangement().accepts(&[Value::Int(11), Value::Int(2)], &ctx));
    }

    #[test]
    fn assert_uses_fallback_and_expression() {
        let h = arrangement();
        h.with_expression("calc.add(_, _)");
        let err = h.arrangement().assert(Some(Occurs::at_least_once())).unwrap_err();
        assert!(err.to_string().starts_with("calc.add(_, _): occurrence expectation failed"));
        assert!(h.arrangement().assert(None).is_ok());
    }

    #[test]
    fn flags() {
        let h = arrangement();
        assert!(!h.arrangement().is_sequential());
        h.in_sequence();
        assert!(h.arrangement().is_sequential());
        assert!(!h.arrangement().is_used());
        h.arrangement().mark_used();
        assert!(h.arrangement().is_used());
        assert_eq!(h.id().to_string(), "#1");
    }
}
