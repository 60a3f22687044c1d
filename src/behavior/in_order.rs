//! Cross-arrangement call-order checks.

use parking_lot::Mutex;

use crate::arrangement::ArrangementId;
use crate::behavior::{AssertableBehavior, Behavior, BehaviorContext};
use crate::error::{AssertionFailure, MockError};
use crate::invocation::Invocation;

#[derive(Debug, Default)]
struct OrderState {
    called: bool,
    /// Id of the later arrangement that had already run when this one was
    /// called out of order.
    violation: Option<u64>,
}

/// Enforces that arrangements marked "in order" run in registration order
/// across the whole repository.
pub struct InOrderBehavior {
    id: ArrangementId,
    expression: String,
    state: Mutex<OrderState>,
}

impl InOrderBehavior {
    pub fn new(id: ArrangementId, expression: String) -> Self {
        Self {
            id,
            expression,
            state: Mutex::new(OrderState::default()),
        }
    }
}

impl Behavior for InOrderBehavior {
    fn name(&self) -> &'static str {
        "in-order"
    }

    fn process(&self, _invocation: &mut Invocation, cx: &BehaviorContext<'_>) -> Result<(), MockError> {
        let last = cx.repository.last_in_order();
        let mut state = self.state.lock();
        state.called = true;
        if self.id.get() < last {
            state.violation = Some(last);
            tracing::debug!(arrangement = %self.id, last, "out-of-order call");
            return Err(AssertionFailure::OutOfOrder {
                expression: self.expression.clone(),
                last_executed: last,
            }
            .into());
        }
        state.violation = None;
        cx.repository.mark_in_order(self.id);
        Ok(())
    }

    fn as_assertable(&self) -> Option<&dyn AssertableBehavior> {
        Some(self)
    }
}

impl AssertableBehavior for InOrderBehavior {
    fn assert(&self) -> Result<(), AssertionFailure> {
        let state = self.state.lock();
        if let Some(last_executed) = state.violation {
            return Err(AssertionFailure::OutOfOrder {
                expression: self.expression.clone(),
                last_executed,
            });
        }
        if !state.called {
            return Err(AssertionFailure::NeverCalledInOrder {
                expression: self.expression.clone(),
            });
        }
        Ok(())
    }

    fn debug_view(&self) -> String {
        let state = self.state.lock();
        match (state.called, state.violation) {
            (_, Some(last)) => format!("In order: #{} called after #{last}", self.id.get()),
            (true, None) => format!("In order: #{} called in order", self.id.get()),
            (false, None) => format!("In order: #{} not called yet", self.id.get()),
        }
    }
}
