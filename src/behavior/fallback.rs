//! Behaviors run when no arrangement matched a call on a mock.

use crate::behavior::{Behavior, BehaviorContext};
use crate::error::{AssertionFailure, MockError};
use crate::invocation::Invocation;
use crate::method::MethodRole;
use crate::value::{TypeDesc, TypeKind, Value};

/// Auto-properties: setters store, getters read back what was stored.
pub struct PropertyStoreBehavior;

impl Behavior for PropertyStoreBehavior {
    fn name(&self) -> &'static str {
        "property-store"
    }

    fn process(&self, invocation: &mut Invocation, cx: &BehaviorContext<'_>) -> Result<(), MockError> {
        let Some(mixin) = cx.mixin else {
            return Ok(());
        };
        if invocation.outcome.is_handled() {
            return Ok(());
        }
        match invocation.method().role().clone() {
            MethodRole::PropertyGet(name) => {
                if let Some(value) = mixin.property(&name) {
                    invocation.outcome.set_return(value);
                }
            }
            MethodRole::PropertySet(name) => {
                let value = invocation.args().last().cloned().unwrap_or(Value::Null);
                mixin.set_property(&name, value);
                invocation.outcome.set_return(Value::Null);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Events: add/remove accessors keep a subscriber list instead of running
/// the original.
pub struct EventStubBehavior;

impl Behavior for EventStubBehavior {
    fn name(&self) -> &'static str {
        "event-stub"
    }

    fn process(&self, invocation: &mut Invocation, cx: &BehaviorContext<'_>) -> Result<(), MockError> {
        let Some(mixin) = cx.mixin else {
            return Ok(());
        };
        if invocation.outcome.is_handled() {
            return Ok(());
        }
        let handler = invocation.args().last().cloned().unwrap_or(Value::Null);
        match invocation.method().role() {
            MethodRole::EventAdd(event) => mixin.subscribe(event, handler),
            MethodRole::EventRemove(event) => {
                mixin.unsubscribe(event, &handler);
            }
            _ => return Ok(()),
        }
        invocation.outcome.set_return(Value::Null);
        Ok(())
    }
}

/// Last resort for loose mocks: the return type's default value.
pub struct DefaultReturnBehavior;

impl Behavior for DefaultReturnBehavior {
    fn name(&self) -> &'static str {
        "default-return"
    }

    fn process(&self, invocation: &mut Invocation, _cx: &BehaviorContext<'_>) -> Result<(), MockError> {
        if invocation.outcome.is_handled() {
            return Ok(());
        }
        let value = invocation
            .method()
            .return_type()
            .map_or(Value::Null, TypeDesc::default_value);
        invocation.outcome.set_return(value);
        Ok(())
    }
}

/// Whether a proxy can be synthesized for `ty`.
fn is_mockable(ty: &TypeDesc) -> bool {
    match ty.kind() {
        TypeKind::Interface => true,
        TypeKind::Reference => !ty.is_sealed() && *ty != TypeDesc::object(),
        TypeKind::Value | TypeKind::Nullable(_) => false,
    }
}

/// Hands out a sub-mock for interface and open-class return types, the same
/// one for every call of the same method on the same mock.
pub struct RecursiveMockBehavior;

impl Behavior for RecursiveMockBehavior {
    fn name(&self) -> &'static str {
        "recursive-mock"
    }

    fn process(&self, invocation: &mut Invocation, cx: &BehaviorContext<'_>) -> Result<(), MockError> {
        if invocation.outcome.is_handled() {
            return Ok(());
        }
        let method = invocation.method().clone();
        let Some(return_type) = method.return_type() else {
            invocation.outcome.set_return(Value::Null);
            return Ok(());
        };

        let limit = cx.repository.config().recursion_limit;
        let value = match cx.mixin {
            Some(mixin) if is_mockable(return_type) && mixin.depth() < limit => {
                match mixin.sub_mock(method.key()) {
                    Some(existing) => existing,
                    None => {
                        let sub = cx.repository.create_sub_mock(
                            return_type,
                            mixin.behavior(),
                            mixin.depth() + 1,
                        )?;
                        tracing::debug!(method = %method, sub = %sub, "created recursive mock");
                        let sub = Value::Object(sub);
                        mixin.cache_sub_mock(method.key(), sub.clone());
                        sub
                    }
                }
            }
            _ => return_type.default_value(),
        };
        invocation.outcome.set_return(value);
        Ok(())
    }
}

/// Fails every unarranged non-system call.
pub struct StrictBehavior;

impl Behavior for StrictBehavior {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn process(&self, invocation: &mut Invocation, cx: &BehaviorContext<'_>) -> Result<(), MockError> {
        if invocation.method().role().is_system() {
            return Ok(());
        }
        let Some(mixin) = cx.mixin else {
            return Ok(());
        };
        let failure = AssertionFailure::StrictViolation {
            mock: mixin.object().to_string(),
            call: invocation.to_string(),
        };
        tracing::warn!("{failure}");
        mixin.record_strict_violation(failure.clone());
        Err(failure.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mockable_types() {
        assert!(is_mockable(&TypeDesc::interface("IRepo", vec![])));
        assert!(is_mockable(&TypeDesc::class("Service", vec![])));
        assert!(!is_mockable(&TypeDesc::sealed_class("Token", vec![])));
        assert!(!is_mockable(&TypeDesc::string()));
        assert!(!is_mockable(&TypeDesc::object()));
        assert!(!is_mockable(&TypeDesc::int()));
        assert!(!is_mockable(&TypeDesc::nullable(TypeDesc::int())));
    }
}
