//! Occurrence expectations and the behavior that enforces them.
//!
//! The upper bound is enforced on every call (fail-fast); the lower bound only
//! when the arrangement is asserted.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::behavior::{AssertableBehavior, Behavior, BehaviorContext};
use crate::error::{AssertionFailure, MockError};
use crate::invocation::Invocation;

/// An inclusive call-count range. `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurs {
    pub lower: Option<usize>,
    pub upper: Option<usize>,
}

impl Occurs {
    pub fn never() -> Self {
        Self::exactly(0)
    }

    pub fn once() -> Self {
        Self::exactly(1)
    }

    pub fn exactly(n: usize) -> Self {
        Self {
            lower: Some(n),
            upper: Some(n),
        }
    }

    pub fn at_least(n: usize) -> Self {
        Self {
            lower: Some(n),
            upper: None,
        }
    }

    pub fn at_least_once() -> Self {
        Self::at_least(1)
    }

    pub fn at_most(n: usize) -> Self {
        Self {
            lower: None,
            upper: Some(n),
        }
    }

    pub fn between(lower: usize, upper: usize) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    pub fn exceeds_upper(&self, count: usize) -> bool {
        self.upper.is_some_and(|upper| count > upper)
    }

    pub fn below_lower(&self, count: usize) -> bool {
        self.lower.is_some_and(|lower| count < lower)
    }

    pub fn contains(&self, count: usize) -> bool {
        !self.exceeds_upper(count) && !self.below_lower(count)
    }

    /// Check `count`, producing the matching failure kind.
    pub fn check(
        &self,
        count: usize,
        expression: Option<String>,
        calls: Vec<String>,
    ) -> Result<(), AssertionFailure> {
        if self.exceeds_upper(count) {
            Err(AssertionFailure::TooManyCalls {
                expected: *self,
                actual: count,
                expression,
                calls,
            })
        } else if self.below_lower(count) {
            Err(AssertionFailure::TooFewCalls {
                expected: *self,
                actual: count,
                expression,
                calls,
            })
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for Occurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.lower, self.upper) {
            (Some(lo), Some(hi)) if lo == hi => write!(f, "exactly {lo}"),
            (Some(lo), Some(hi)) => write!(f, "between {lo} and {hi}"),
            (Some(lo), None) => write!(f, "at least {lo}"),
            (None, Some(hi)) => write!(f, "at most {hi}"),
            (None, None) => f.write_str("any number of calls"),
        }
    }
}

/// Attached to every arrangement: counts calls and enforces the declared
/// `Occurs`, if any.
pub struct OccurrenceBehavior {
    expected: RwLock<Option<Occurs>>,
    calls: AtomicUsize,
    expression: RwLock<String>,
    log: Mutex<VecDeque<String>>,
    log_limit: usize,
}

impl OccurrenceBehavior {
    pub fn new(expression: String, log_limit: usize) -> Self {
        Self {
            expected: RwLock::new(None),
            calls: AtomicUsize::new(0),
            expression: RwLock::new(expression),
            log: Mutex::new(VecDeque::new()),
            log_limit,
        }
    }

    pub fn set_expected(&self, occurs: Occurs) {
        *self.expected.write() = Some(occurs);
    }

    pub fn set_expression(&self, expression: String) {
        *self.expression.write() = expression;
    }

    pub fn expected(&self) -> Option<Occurs> {
        *self.expected.read()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    fn log_snapshot(&self) -> Vec<String> {
        self.log.lock().iter().cloned().collect()
    }

    /// Assert against the declared expectation, or `fallback` when none was
    /// declared. No expectation and no fallback always passes.
    pub fn assert_or(&self, fallback: Option<Occurs>) -> Result<(), AssertionFailure> {
        match self.expected().or(fallback) {
            Some(occurs) => occurs.check(
                self.calls(),
                Some(self.expression.read().clone()),
                self.log_snapshot(),
            ),
            None => Ok(()),
        }
    }
}

impl Behavior for OccurrenceBehavior {
    fn name(&self) -> &'static str {
        "occurrence"
    }

    fn process(&self, invocation: &mut Invocation, _cx: &BehaviorContext<'_>) -> Result<(), MockError> {
        let count = self.calls.fetch_add(1, Ordering::AcqRel) + 1;
        {
            let mut log = self.log.lock();
            if self.log_limit > 0 {
                if log.len() == self.log_limit {
                    log.pop_front();
                }
                log.push_back(invocation.to_string());
            }
        }
        if let Some(expected) = self.expected() {
            if expected.exceeds_upper(count) {
                return Err(AssertionFailure::TooManyCalls {
                    expected,
                    actual: count,
                    expression: Some(self.expression.read().clone()),
                    calls: self.log_snapshot(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn as_assertable(&self) -> Option<&dyn AssertableBehavior> {
        Some(self)
    }
}

impl AssertableBehavior for OccurrenceBehavior {
    fn assert(&self) -> Result<(), AssertionFailure> {
        self.assert_or(None)
    }

    fn debug_view(&self) -> String {
        match self.expected() {
            Some(expected) => format!(
                "Occurrences: {} call(s), expected {expected}",
                self.calls()
            ),
            None => format!("Occurrences: {} call(s), no expectation", self.calls()),
        }
    }
}
