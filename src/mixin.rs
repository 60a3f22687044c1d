//! The administrative object attached to every mock.
//!
//! A mixin knows which object it administers, which repository-wide fallback
//! flavor it was created with, and carries the per-mock state fallback
//! behaviors need: the property store, event subscribers, cached recursive
//! sub-mocks, and accumulated strict violations.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::behavior::{
    Behavior, CallOriginalBehavior, DefaultReturnBehavior, EventStubBehavior,
    PropertyStoreBehavior, RecursiveMockBehavior, StrictBehavior,
};
use crate::error::AssertionFailure;
use crate::method::MethodKey;
use crate::value::{ObjectRef, Value};

/// What a mock does with calls no arrangement matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockBehavior {
    /// Default values for everything.
    Loose,
    /// Like `Loose`, but interface and open-class returns get a fresh mock.
    #[default]
    RecursiveLoose,
    /// Unarranged non-system calls are failures.
    Strict,
    /// Unarranged calls run the original implementation.
    CallOriginal,
}

impl MockBehavior {
    pub fn as_str(self) -> &'static str {
        match self {
            MockBehavior::Loose => "loose",
            MockBehavior::RecursiveLoose => "recursive_loose",
            MockBehavior::Strict => "strict",
            MockBehavior::CallOriginal => "call_original",
        }
    }

    /// The fallback pipeline for this flavor, in execution order.
    pub fn fallback_behaviors(self) -> Vec<Arc<dyn Behavior>> {
        match self {
            MockBehavior::Loose => vec![
                Arc::new(PropertyStoreBehavior),
                Arc::new(EventStubBehavior),
                Arc::new(DefaultReturnBehavior),
            ],
            MockBehavior::RecursiveLoose => vec![
                Arc::new(PropertyStoreBehavior),
                Arc::new(EventStubBehavior),
                Arc::new(RecursiveMockBehavior),
            ],
            MockBehavior::Strict => vec![
                Arc::new(StrictBehavior),
                Arc::new(PropertyStoreBehavior),
                Arc::new(EventStubBehavior),
                Arc::new(DefaultReturnBehavior),
            ],
            MockBehavior::CallOriginal => vec![Arc::new(CallOriginalBehavior)],
        }
    }
}

impl fmt::Display for MockBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MockBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loose" => Ok(MockBehavior::Loose),
            "recursive_loose" => Ok(MockBehavior::RecursiveLoose),
            "strict" => Ok(MockBehavior::Strict),
            "call_original" => Ok(MockBehavior::CallOriginal),
            other => Err(format!(
                "unknown mock behavior '{other}' (expected loose, recursive_loose, strict or call_original)"
            )),
        }
    }
}

pub struct MockMixin {
    object: ObjectRef,
    behavior: MockBehavior,
    /// How many recursive-mock hops away from a user-created mock.
    depth: usize,
    supplementary: RwLock<Vec<Arc<dyn Behavior>>>,
    fallback: Vec<Arc<dyn Behavior>>,
    properties: Mutex<HashMap<String, Value>>,
    events: Mutex<HashMap<String, Vec<Value>>>,
    sub_mocks: Mutex<HashMap<MethodKey, Value>>,
    strict_violations: Mutex<Vec<AssertionFailure>>,
}

impl MockMixin {
    pub fn new(object: ObjectRef, behavior: MockBehavior, depth: usize) -> Self {
        Self {
            object,
            behavior,
            depth,
            supplementary: RwLock::new(Vec::new()),
            fallback: behavior.fallback_behaviors(),
            properties: Mutex::new(HashMap::new()),
            events: Mutex::new(HashMap::new()),
            sub_mocks: Mutex::new(HashMap::new()),
            strict_violations: Mutex::new(Vec::new()),
        }
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn behavior(&self) -> MockBehavior {
        self.behavior
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Add a mock-wide behavior that runs after every matched arrangement.
    pub fn add_supplementary(&self, behavior: Arc<dyn Behavior>) {
        self.supplementary.write().push(behavior);
    }

    pub fn supplementary(&self) -> Vec<Arc<dyn Behavior>> {
        self.supplementary.read().clone()
    }

    pub fn fallback(&self) -> &[Arc<dyn Behavior>] {
        &self.fallback
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        self.properties.lock().get(name).cloned()
    }

    pub fn set_property(&self, name: &str, value: Value) {
        self.properties.lock().insert(name.to_string(), value);
    }

    pub fn subscribe(&self, event: &str, handler: Value) {
        self.events
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    /// Remove the first subscriber equal to `handler`. Returns whether one
    /// was removed.
    pub fn unsubscribe(&self, event: &str, handler: &Value) -> bool {
        let mut events = self.events.lock();
        let Some(handlers) = events.get_mut(event) else {
            return false;
        };
        match handlers.iter().position(|h| h.structural_eq(handler)) {
            Some(index) => {
                handlers.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn subscribers(&self, event: &str) -> Vec<Value> {
        self.events.lock().get(event).cloned().unwrap_or_default()
    }

    pub fn sub_mock(&self, method: MethodKey) -> Option<Value> {
        self.sub_mocks.lock().get(&method).cloned()
    }

    pub fn cache_sub_mock(&self, method: MethodKey, value: Value) {
        self.sub_mocks.lock().insert(method, value);
    }

    pub fn record_strict_violation(&self, failure: AssertionFailure) {
        self.strict_violations.lock().push(failure);
    }

    pub fn strict_violations(&self) -> Vec<AssertionFailure> {
        self.strict_violations.lock().clone()
    }

    /// Forget everything recorded since creation; supplementary behaviors
    /// stay.
    pub fn reset(&self) {
        self.properties.lock().clear();
        self.events.lock().clear();
        self.sub_mocks.lock().clear();
        self.strict_violations.lock().clear();
    }
}

impl fmt::Debug for MockMixin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockMixin")
            .field("object", &self.object)
            .field("behavior", &self.behavior)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypeDesc;

    fn mixin(behavior: MockBehavior) -> MockMixin {
        MockMixin::new(ObjectRef::new(TypeDesc::interface("IFoo", vec![])), behavior, 0)
    }

    #[test]
    fn fallback_lists_per_flavor() {
        let names = |b: MockBehavior| {
            mixin(b)
                .fallback()
                .iter()
                .map(|x| x.name())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(MockBehavior::Loose), ["property-store", "event-stub", "default-return"]);
        assert_eq!(
            names(MockBehavior::RecursiveLoose),
            ["property-store", "event-stub", "recursive-mock"]
        );
        assert_eq!(names(MockBehavior::Strict)[0], "strict");
        assert_eq!(names(MockBehavior::CallOriginal), ["call-original"]);
    }

    #[test]
    fn parse_round_trip() {
        for b in [
            MockBehavior::Loose,
            MockBehavior::RecursiveLoose,
            MockBehavior::Strict,
            MockBehavior::CallOriginal,
        ] {
            assert_eq!(b.as_str().parse::<MockBehavior>(), Ok(b));
        }
        assert!("lenient".parse::<MockBehavior>().is_err());
        assert_eq!(MockBehavior::default(), MockBehavior::RecursiveLoose);
    }

    #[test]
    fn events_subscribe_and_unsubscribe() {
        let m = mixin(MockBehavior::Loose);
        m.subscribe("changed", Value::str("h1"));
        m.subscribe("changed", Value::str("h2"));
        assert!(m.unsubscribe("changed", &Value::str("h1")));
        assert!(!m.unsubscribe("changed", &Value::str("h1")));
        assert_eq!(m.subscribers("changed").len(), 1);
        assert!(!m.unsubscribe("other", &Value::str("h2")));
    }

    #[test]
    fn reset_clears_state() {
        let m = mixin(MockBehavior::Loose);
        m.set_property("name", Value::str("x"));
        m.reset();
        assert!(m.property("name").is_none());
    }
}
