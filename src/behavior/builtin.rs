//! Behaviors behind the `ArrangementHandle` conveniences.

use std::sync::Arc;

use crate::behavior::{Behavior, BehaviorContext};
use crate::error::MockError;
use crate::invocation::Invocation;
use crate::value::Value;

pub struct ReturnsBehavior {
    value: Value,
}

impl ReturnsBehavior {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl Behavior for ReturnsBehavior {
    fn name(&self) -> &'static str {
        "returns"
    }

    fn process(&self, invocation: &mut Invocation, _cx: &BehaviorContext<'_>) -> Result<(), MockError> {
        invocation.outcome.set_return(self.value.clone());
        invocation.outcome.call_original = false;
        Ok(())
    }
}

/// Defers an exception; the interception source raises it after dispatch.
pub struct ThrowsBehavior {
    error: Value,
}

impl ThrowsBehavior {
    pub fn new(error: Value) -> Self {
        Self { error }
    }
}

impl Behavior for ThrowsBehavior {
    fn name(&self) -> &'static str {
        "throws"
    }

    fn process(&self, invocation: &mut Invocation, _cx: &BehaviorContext<'_>) -> Result<(), MockError> {
        invocation.outcome.exception = Some(self.error.clone());
        Ok(())
    }
}

pub struct CallOriginalBehavior;

impl Behavior for CallOriginalBehavior {
    fn name(&self) -> &'static str {
        "call-original"
    }

    fn process(&self, invocation: &mut Invocation, _cx: &BehaviorContext<'_>) -> Result<(), MockError> {
        invocation.outcome.call_original = true;
        Ok(())
    }
}

type ImplementationFn = dyn Fn(&[Value]) -> Option<Value> + Send + Sync;

/// A user-supplied implementation. Runs as external code, so calls it makes
/// on mocks are dispatched normally.
pub struct ImplementationBehavior {
    f: Arc<ImplementationFn>,
}

impl ImplementationBehavior {
    pub fn new(f: impl Fn(&[Value]) -> Option<Value> + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl Behavior for ImplementationBehavior {
    fn name(&self) -> &'static str {
        "implementation"
    }

    fn process(&self, invocation: &mut Invocation, cx: &BehaviorContext<'_>) -> Result<(), MockError> {
        let result = cx.call.run_external(|| (self.f)(invocation.args()));
        invocation.outcome.user_implementation = true;
        invocation.outcome.call_original = false;
        if let Some(value) = result {
            invocation.outcome.set_return(value);
        }
        Ok(())
    }
}
