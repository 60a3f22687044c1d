//! The live invocation record handed to behaviors.
//!
//! The call itself (method, receiver, arguments) is read-only; behaviors may
//! only touch the `Outcome`, which the interception source reads back after
//! dispatch to decide what the intercepted call does.

use std::fmt;
use std::sync::Arc;

use crate::call_pattern::CallPattern;
use crate::method::MethodInfo;
use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub struct Outcome {
    return_value: Option<Value>,
    /// Run the original implementation after dispatch returns.
    pub call_original: bool,
    /// A user-supplied implementation produced the result.
    pub user_implementation: bool,
    /// Raised by the interception source after all behaviors ran.
    pub exception: Option<Value>,
}

impl Outcome {
    pub fn set_return(&mut self, value: Value) {
        self.return_value = Some(value);
    }

    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    pub fn is_return_set(&self) -> bool {
        self.return_value.is_some()
    }

    /// Some behavior already decided what the call does.
    pub fn is_handled(&self) -> bool {
        self.return_value.is_some() || self.call_original || self.exception.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Invocation {
    method: Arc<MethodInfo>,
    instance: Option<Value>,
    args: Vec<Value>,
    pub outcome: Outcome,
}

impl Invocation {
    pub fn new(method: Arc<MethodInfo>, instance: Option<Value>, args: Vec<Value>) -> Self {
        Self {
            method,
            instance,
            args,
            outcome: Outcome::default(),
        }
    }

    pub fn method(&self) -> &Arc<MethodInfo> {
        &self.method
    }

    pub fn instance(&self) -> Option<&Value> {
        self.instance.as_ref()
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The effective receiver: the first argument for extension-method calls.
    pub fn receiver(&self) -> Option<&Value> {
        if self.method.is_extension() {
            self.args.first()
        } else {
            self.instance.as_ref()
        }
    }

    /// Arguments as matched against argument matchers (receiver stripped for
    /// extension-method calls).
    pub fn matched_args(&self) -> &[Value] {
        if self.method.is_extension() && !self.args.is_empty() {
            &self.args[1..]
        } else {
            &self.args
        }
    }

    pub fn to_pattern(&self) -> CallPattern {
        CallPattern::concrete(self.method.clone(), self.instance.as_ref(), &self.args)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_pattern())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ObjectRef, TypeDesc};

    #[test]
    fn outcome_flags() {
        let mut outcome = Outcome::default();
        assert!(!outcome.is_handled());
        outcome.set_return(Value::Int(1));
        assert!(outcome.is_return_set());
        assert!(outcome.is_handled());
        let thrown = Outcome {
            exception: Some(Value::str("boom")),
            ..Outcome::default()
        };
        assert!(thrown.is_handled());
    }

    #[test]
    fn extension_receiver_is_first_arg() {
        let ty = TypeDesc::class("Ext", vec![]);
        let m = MethodInfo::builder(&ty, "twice")
            .param("this", TypeDesc::string())
            .extension()
            .build();
        let inv = Invocation::new(m, None, vec![Value::str("x")]);
        assert!(matches!(inv.receiver(), Some(Value::Str(_))));
        assert!(inv.matched_args().is_empty());
    }

    #[test]
    fn display_matches_pattern() {
        let ty = TypeDesc::interface("IGreeter", vec![]);
        let greet = MethodInfo::builder(&ty, "greet")
            .param("name", TypeDesc::string())
            .build();
        let obj = Value::Object(ObjectRef::labeled(ty, "greeter"));
        let inv = Invocation::new(greet, Some(obj), vec![Value::str("bob")]);
        assert_eq!(inv.to_string(), "greeter.greet(\"bob\")");
    }
}
