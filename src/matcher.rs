//! The matcher algebra.
//!
//! A matcher is a predicate over one call-site value (the receiver or one
//! argument) plus a generalization relation over other matchers:
//! `a.matches(b)` asks whether `a` is equal to, or broader than, `b`.
//! Concrete calls are expressed as `Value`/`Reference` matchers, so the same
//! relation covers "does this value satisfy me" and "am I broader than that
//! registered matcher".
//!
//! `equals` is strictly stronger than `matches`: it never runs predicates and
//! is the only relation used when inserting into a tree.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::context::CallContext;
use crate::value::{TypeDesc, Value};

type PredicateFn = dyn Fn(&Value) -> bool + Send + Sync;

/// A user predicate. Two predicates are `equals` only if they are the same
/// closure instance.
#[derive(Clone)]
pub struct Predicate {
    description: Arc<str>,
    f: Arc<PredicateFn>,
}

impl Predicate {
    pub fn new(description: &str, f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self {
            description: Arc::from(description),
            f: Arc::new(f),
        }
    }

    /// Matches string values against `re`; anything else fails.
    pub fn regex(re: Regex) -> Self {
        let description = format!("/{}/", re.as_str());
        Self::new(&description, move |v| v.as_str().is_some_and(|s| re.is_match(s)))
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Evaluate as user code: the re-entrancy guard is lifted meanwhile.
    pub fn call(&self, value: &Value, ctx: &CallContext) -> bool {
        ctx.run_external(|| (self.f)(value))
    }

    pub fn same_instance(&self, other: &Predicate) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.f), Arc::as_ptr(&other.f))
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.description).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    Inclusive,
    Exclusive,
}

#[derive(Debug, Clone)]
pub enum Matcher {
    Any,
    /// Structural equality; element-wise for arrays and records.
    Value(Value),
    /// Identity equality; used for receivers.
    Reference(Value),
    /// Any value assignable to `ty`, optionally filtered by `predicate`.
    Type {
        ty: TypeDesc,
        predicate: Option<Predicate>,
    },
    Range {
        from: Value,
        to: Value,
        kind: RangeKind,
    },
    NullOrEmptyString,
    /// Variadic tail, matched element-wise.
    ParamsArray(Vec<Matcher>),
}

impl Matcher {
    pub fn value(v: impl Into<Value>) -> Self {
        Matcher::Value(v.into())
    }

    pub fn of_type(ty: TypeDesc) -> Self {
        Matcher::Type {
            ty,
            predicate: None,
        }
    }

    pub fn typed_predicate(ty: TypeDesc, predicate: Predicate) -> Self {
        Matcher::Type {
            ty,
            predicate: Some(predicate),
        }
    }

    pub fn inclusive(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Matcher::Range {
            from: from.into(),
            to: to.into(),
            kind: RangeKind::Inclusive,
        }
    }

    pub fn exclusive(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Matcher::Range {
            from: from.into(),
            to: to.into(),
            kind: RangeKind::Exclusive,
        }
    }

    /// Concrete value shapes: the form live calls are expressed in.
    pub fn concrete_value(&self) -> Option<&Value> {
        match self {
            Matcher::Value(v) | Matcher::Reference(v) => Some(v),
            _ => None,
        }
    }

    /// Identity: same kind, same parameters, same predicate instance.
    pub fn equals(&self, other: &Matcher) -> bool {
        match (self, other) {
            (Matcher::Any, Matcher::Any) => true,
            (Matcher::Value(a), Matcher::Value(b)) => a.structural_eq(b),
            (Matcher::Reference(a), Matcher::Reference(b)) => a.same_reference(b),
            (
                Matcher::Type {
                    ty: ta,
                    predicate: pa,
                },
                Matcher::Type {
                    ty: tb,
                    predicate: pb,
                },
            ) => {
                ta == tb
                    && match (pa, pb) {
                        (None, None) => true,
                        (Some(a), Some(b)) => a.same_instance(b),
                        _ => false,
                    }
            }
            (
                Matcher::Range {
                    from: fa,
                    to: ta,
                    kind: ka,
                },
                Matcher::Range {
                    from: fb,
                    to: tb,
                    kind: kb,
                },
            ) => ka == kb && fa.structural_eq(fb) && ta.structural_eq(tb),
            (Matcher::NullOrEmptyString, Matcher::NullOrEmptyString) => true,
            (Matcher::ParamsArray(a), Matcher::ParamsArray(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            _ => false,
        }
    }

    /// Cheap category pre-check: can `self` ever generalize a matcher of
    /// `other`'s kind?
    pub fn can_match(&self, other: &Matcher) -> bool {
        let value_shaped = other.concrete_value().is_some();
        match self {
            Matcher::Any => true,
            Matcher::Value(_) | Matcher::Reference(_) => value_shaped,
            Matcher::Type { .. } => value_shaped || matches!(other, Matcher::Type { .. }),
            Matcher::Range { .. } => value_shaped || matches!(other, Matcher::Range { .. }),
            Matcher::NullOrEmptyString => {
                value_shaped || matches!(other, Matcher::NullOrEmptyString)
            }
            Matcher::ParamsArray(_) => value_shaped || matches!(other, Matcher::ParamsArray(_)),
        }
    }

    /// Is `self` equal to, or a generalization of, `other`?
    pub fn matches(&self, other: &Matcher, ctx: &CallContext) -> bool {
        self.equals(other) || (self.can_match(other) && self.generalizes(other, ctx))
    }

    fn generalizes(&self, other: &Matcher, ctx: &CallContext) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Value(v) => other.concrete_value().is_some_and(|w| v.structural_eq(w)),
            Matcher::Reference(v) => other.concrete_value().is_some_and(|w| v.same_reference(w)),
            Matcher::Type { ty, predicate } => match other {
                Matcher::Type {
                    ty: other_ty,
                    predicate: _,
                } => predicate.is_none() && ty.is_assignable_from(other_ty),
                _ => match other.concrete_value() {
                    Some(w) => {
                        let type_ok = match w.type_desc() {
                            Some(actual) => ty.is_assignable_from(&actual),
                            None => ty.accepts_null(),
                        };
                        type_ok && predicate.as_ref().is_none_or(|p| p.call(w, ctx))
                    }
                    None => false,
                },
            },
            Matcher::Range { from, to, kind } => match other {
                Matcher::Range {
                    from: other_from,
                    to: other_to,
                    kind: other_kind,
                } => {
                    let kind_ok = *kind == RangeKind::Inclusive || *other_kind == RangeKind::Exclusive;
                    kind_ok
                        && is_le(from, other_from)
                        && is_le(other_to, to)
                }
                _ => other
                    .concrete_value()
                    .is_some_and(|w| in_range(w, from, to, *kind)),
            },
            Matcher::NullOrEmptyString => match other.concrete_value() {
                Some(Value::Null) => true,
                Some(Value::Str(s)) => s.is_empty(),
                _ => false,
            },
            Matcher::ParamsArray(elements) => match other {
                Matcher::ParamsArray(other_elements) => {
                    elements.len() == other_elements.len()
                        && elements
                            .iter()
                            .zip(other_elements)
                            .all(|(m, n)| m.matches(n, ctx))
                }
                _ => match other.concrete_value().and_then(Value::as_array) {
                    Some(items) => {
                        elements.len() == items.len()
                            && elements
                                .iter()
                                .zip(items.iter())
                                .all(|(m, item)| m.matches(&Matcher::Value(item.clone()), ctx))
                    }
                    None => false,
                },
            },
        }
    }

    /// Shallow test of one value, for callers that don't hold a matcher.
    pub fn matches_value(&self, value: &Value, ctx: &CallContext) -> bool {
        self.matches(&Matcher::Value(value.clone()), ctx)
    }
}

fn is_le(a: &Value, b: &Value) -> bool {
    matches!(a.compare(b), Some(Ordering::Less | Ordering::Equal))
}

fn in_range(v: &Value, from: &Value, to: &Value, kind: RangeKind) -> bool {
    let (Some(lower), Some(upper)) = (from.compare(v), v.compare(to)) else {
        return false;
    };
    match kind {
        RangeKind::Inclusive => lower != Ordering::Greater && upper != Ordering::Greater,
        RangeKind::Exclusive => lower == Ordering::Less && upper == Ordering::Less,
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Any => f.write_str("<any>"),
            Matcher::Value(v) => write!(f, "{v}"),
            Matcher::Reference(v) => write!(f, "{v}"),
            Matcher::Type {
                ty,
                predicate: None,
            } => write!(f, "<any {ty}>"),
            Matcher::Type {
                ty,
                predicate: Some(p),
            } => write!(f, "<{ty} where {}>", p.description()),
            Matcher::Range { from, to, kind } => match kind {
                RangeKind::Inclusive => write!(f, "[{from}..{to}]"),
                RangeKind::Exclusive => write!(f, "({from}..{to})"),
            },
            Matcher::NullOrEmptyString => f.write_str("<null or empty>"),
            Matcher::ParamsArray(elements) => {
                f.write_str("params [")?;
                for (i, m) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{m}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectRef;

    fn ctx() -> CallContext {
        CallContext::new()
    }

    #[test]
    fn any_generalizes_everything() {
        let ctx = ctx();
        let others = [
            Matcher::value(1),
            Matcher::of_type(TypeDesc::int()),
            Matcher::inclusive(1, 5),
            Matcher::NullOrEmptyString,
            Matcher::ParamsArray(vec![Matcher::Any]),
            Matcher::Any,
        ];
        for other in &others {
            assert!(Matcher::Any.matches(other, &ctx), "Any should match {other}");
        }
        for other in &others[..5] {
            assert!(!other.matches(&Matcher::Any, &ctx), "{other} must not generalize Any");
        }
    }

    #[test]
    fn value_matches_equal_values_only() {
        let ctx = ctx();
        assert!(Matcher::value(3).matches(&Matcher::value(3), &ctx));
        assert!(!Matcher::value(3).matches(&Matcher::value(4), &ctx));
        assert!(!Matcher::value(3).matches(&Matcher::of_type(TypeDesc::int()), &ctx));
    }

    #[test]
    fn value_compares_arrays_element_wise_reference_does_not() {
        let ctx = ctx();
        let a = Value::array(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::array(vec![Value::Int(1), Value::Int(2)]);
        assert!(Matcher::Value(a.clone()).matches(&Matcher::Value(b.clone()), &ctx));
        assert!(!Matcher::Reference(a.clone()).matches(&Matcher::Reference(b), &ctx));
        assert!(Matcher::Reference(a.clone()).matches(&Matcher::Reference(a), &ctx));
    }

    #[test]
    fn type_matcher_checks_assignability() {
        let ctx = ctx();
        let iface = TypeDesc::interface("IShape", vec![]);
        let circle = TypeDesc::class("Circle", vec![iface.clone()]);
        let obj = Value::Object(ObjectRef::new(circle.clone()));
        assert!(Matcher::of_type(iface.clone()).matches(&Matcher::Value(obj.clone()), &ctx));
        assert!(!Matcher::of_type(TypeDesc::int()).matches(&Matcher::Value(obj), &ctx));
        assert!(Matcher::of_type(iface.clone()).matches(&Matcher::of_type(circle.clone()), &ctx));
        assert!(!Matcher::of_type(circle).matches(&Matcher::of_type(iface), &ctx));
    }

    #[test]
    fn type_matcher_null_needs_nullable_target() {
        let ctx = ctx();
        let null = Matcher::Value(Value::Null);
        assert!(Matcher::of_type(TypeDesc::string()).matches(&null, &ctx));
        assert!(Matcher::of_type(TypeDesc::nullable(TypeDesc::int())).matches(&null, &ctx));
        assert!(!Matcher::of_type(TypeDesc::int()).matches(&null, &ctx));
    }

    #[test]
    fn typed_predicate_filters_and_compares_by_instance() {
        let ctx = ctx();
        let even = Predicate::new("even", |v| matches!(v, Value::Int(i) if i % 2 == 0));
        let m = Matcher::typed_predicate(TypeDesc::int(), even.clone());
        assert!(m.matches(&Matcher::value(4), &ctx));
        assert!(!m.matches(&Matcher::value(3), &ctx));
        assert!(m.equals(&Matcher::typed_predicate(TypeDesc::int(), even)));
        let other_even = Predicate::new("even", |v| matches!(v, Value::Int(i) if i % 2 == 0));
        assert!(!m.equals(&Matcher::typed_predicate(TypeDesc::int(), other_even)));
        // A filtered matcher never generalizes a bare type matcher.
        assert!(!m.matches(&Matcher::of_type(TypeDesc::int()), &ctx));
    }

    #[test]
    fn regex_predicate() {
        let ctx = ctx();
        let p = Predicate::regex(Regex::new("^ab+$").unwrap());
        let m = Matcher::typed_predicate(TypeDesc::string(), p);
        assert!(m.matches_value(&Value::str("abbb"), &ctx));
        assert!(!m.matches_value(&Value::str("ac"), &ctx));
        assert!(!m.matches_value(&Value::Int(1), &ctx));
    }

    #[test]
    fn range_contains_values() {
        let ctx = ctx();
        let incl = Matcher::inclusive(1, 3);
        let excl = Matcher::exclusive(1, 3);
        assert!(incl.matches_value(&Value::Int(1), &ctx));
        assert!(incl.matches_value(&Value::Int(3), &ctx));
        assert!(!excl.matches_value(&Value::Int(1), &ctx));
        assert!(excl.matches_value(&Value::Int(2), &ctx));
        assert!(!incl.matches_value(&Value::str("2"), &ctx));
    }

    #[test]
    fn range_superset_rules() {
        let ctx = ctx();
        let wide_incl = Matcher::inclusive(0, 10);
        let narrow_incl = Matcher::inclusive(2, 5);
        let narrow_excl = Matcher::exclusive(2, 5);
        let wide_excl = Matcher::exclusive(0, 10);
        assert!(wide_incl.matches(&narrow_incl, &ctx));
        assert!(wide_incl.matches(&narrow_excl, &ctx));
        assert!(wide_excl.matches(&narrow_excl, &ctx));
        // Exclusive is weaker: it never generalizes an inclusive range.
        assert!(!wide_excl.matches(&narrow_incl, &ctx));
        assert!(!narrow_incl.matches(&wide_incl, &ctx));
        assert!(!Matcher::inclusive(0, 4).matches(&narrow_incl, &ctx));
    }

    #[test]
    fn null_or_empty_string() {
        let ctx = ctx();
        let m = Matcher::NullOrEmptyString;
        assert!(m.matches_value(&Value::Null, &ctx));
        assert!(m.matches_value(&Value::str(""), &ctx));
        assert!(!m.matches_value(&Value::str("x"), &ctx));
        assert!(m.matches(&Matcher::NullOrEmptyString, &ctx));
    }

    #[test]
    fn params_array_matches_arrays_and_params() {
        let ctx = ctx();
        let m = Matcher::ParamsArray(vec![Matcher::value(1), Matcher::of_type(TypeDesc::int())]);
        let arr = Value::array(vec![Value::Int(1), Value::Int(9)]);
        assert!(m.matches_value(&arr, &ctx));
        assert!(!m.matches_value(&Value::array(vec![Value::Int(1)]), &ctx));
        assert!(!m.matches_value(&Value::array(vec![Value::Int(2), Value::Int(9)]), &ctx));
        let narrower = Matcher::ParamsArray(vec![Matcher::value(1), Matcher::value(9)]);
        assert!(m.matches(&narrower, &ctx));
        assert!(!narrower.matches(&m, &ctx));
    }

    #[test]
    fn can_match_prunes_categories() {
        assert!(!Matcher::inclusive(0, 1).can_match(&Matcher::NullOrEmptyString));
        assert!(Matcher::inclusive(0, 1).can_match(&Matcher::value(1)));
        assert!(!Matcher::value(1).can_match(&Matcher::Any));
    }

    #[test]
    fn predicate_runs_unguarded() {
        let ctx = std::sync::Arc::new(CallContext::new());
        let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(usize::MAX));
        let (ctx2, seen2) = (ctx.clone(), seen.clone());
        let p = Predicate::new("recording", move |_| {
            seen2.store(ctx2.depth(), std::sync::atomic::Ordering::SeqCst);
            true
        });
        let m = Matcher::typed_predicate(TypeDesc::int(), p);
        let _scope = ctx.enter_internal();
        assert!(m.matches_value(&Value::Int(1), &ctx));
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(ctx.depth(), 1);
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        fn matcher_strategy() -> impl Strategy<Value = Matcher> {
            prop_oneof![
                Just(Matcher::Any),
                (-50i64..50).prop_map(Matcher::value),
                "[a-z]{0,4}".prop_map(|s| Matcher::value(s.as_str())),
                (-50.0f64..50.0).prop_map(Matcher::value),
                Just(Matcher::value(f64::NAN)),
                Just(Matcher::of_type(TypeDesc::int())),
                Just(Matcher::of_type(TypeDesc::string())),
                (-50i64..50, 0i64..20).prop_map(|(lo, w)| Matcher::inclusive(lo, lo + w)),
                (-50i64..50, 0i64..20).prop_map(|(lo, w)| Matcher::exclusive(lo, lo + w)),
                Just(Matcher::NullOrEmptyString),
            ]
        }

        proptest! {
            #[test]
            fn matches_is_reflexive(m in matcher_strategy()) {
                let ctx = CallContext::new();
                prop_assert!(m.equals(&m));
                prop_assert!(m.matches(&m, &ctx));
            }

            #[test]
            fn any_is_universal(m in matcher_strategy()) {
                let ctx = CallContext::new();
                prop_assert!(Matcher::Any.matches(&m, &ctx));
                if !matches!(m, Matcher::Any) {
                    prop_assert!(!m.matches(&Matcher::Any, &ctx));
                }
            }

            #[test]
            fn inclusive_range_superset(lo in -100i64..100, w in 0i64..50, a in 0i64..50, b in 0i64..50) {
                let ctx = CallContext::new();
                let outer = Matcher::inclusive(lo, lo + w);
                let (ia, ib) = (lo + a.min(w), lo + b.min(w));
                let inner = Matcher::inclusive(ia.min(ib), ia.max(ib));
                prop_assert!(outer.matches(&inner, &ctx));
            }
        }
    }
}
