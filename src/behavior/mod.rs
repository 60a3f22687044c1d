//! Behaviors: the effects attached to an arrangement or a mock.
//!
//! A winning arrangement runs its own behaviors in registration order, then
//! the receiver's supplementary behaviors. An unmatched call runs the
//! receiver's fallback behaviors instead. A behavior returning `Err` aborts
//! the rest of the pipeline (fail-fast).

pub mod builtin;
pub mod fallback;
pub mod in_order;
pub mod occurrence;

use std::sync::Arc;

use crate::arrangement::ArrangementId;
use crate::context::CallContext;
use crate::error::{AssertionFailure, MockError};
use crate::invocation::Invocation;
use crate::mixin::MockMixin;
use crate::repository::Repository;

pub use builtin::{CallOriginalBehavior, ImplementationBehavior, ReturnsBehavior, ThrowsBehavior};
pub use fallback::{
    DefaultReturnBehavior, EventStubBehavior, PropertyStoreBehavior, RecursiveMockBehavior,
    StrictBehavior,
};
pub use in_order::InOrderBehavior;
pub use occurrence::{OccurrenceBehavior, Occurs};

/// What a behavior can see besides the invocation itself.
pub struct BehaviorContext<'a> {
    pub call: &'a CallContext,
    pub repository: &'a Repository,
    /// Administrative object of the receiver, when it is a mock.
    pub mixin: Option<&'a Arc<MockMixin>>,
    /// The arrangement being executed; `None` for fallback behaviors.
    pub arrangement: Option<ArrangementId>,
}

/// An effect run against a live invocation. Implementations must be
/// `Send + Sync`: arrangements are shared with calls arriving on any thread.
pub trait Behavior: Send + Sync {
    /// Short name for debug output.
    fn name(&self) -> &'static str;

    fn process(&self, invocation: &mut Invocation, cx: &BehaviorContext<'_>) -> Result<(), MockError>;

    fn as_assertable(&self) -> Option<&dyn AssertableBehavior> {
        None
    }
}

/// A behavior with a post-condition checked at assertion time.
pub trait AssertableBehavior {
    fn assert(&self) -> Result<(), AssertionFailure>;

    fn debug_view(&self) -> String;
}

/// Run `behaviors` in order, stopping at the first error.
pub fn run_pipeline(
    behaviors: &[Arc<dyn Behavior>],
    invocation: &mut Invocation,
    cx: &BehaviorContext<'_>,
) -> Result<(), MockError> {
    for behavior in behaviors {
        behavior.process(invocation, cx)?;
    }
    Ok(())
}
