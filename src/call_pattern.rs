//! Call patterns: a method plus one matcher per call-site slot.
//!
//! The same shape is used to register arrangements (broad matchers) and to
//! describe live invocations (`Reference` receiver, `Value` arguments).

use std::fmt;
use std::sync::Arc;

use crate::context::CallContext;
use crate::error::ConfigurationError;
use crate::matcher::Matcher;
use crate::method::MethodInfo;
use crate::value::Value;

type ArgFilterFn = dyn Fn(&[Value]) -> bool + Send + Sync;

/// A free-form predicate over the evaluated arguments of a recorded call.
/// Applied after the tree walk, never part of the tree key.
#[derive(Clone)]
pub struct ArgFilter {
    description: Arc<str>,
    f: Arc<ArgFilterFn>,
}

impl ArgFilter {
    pub fn new(description: &str, f: impl Fn(&[Value]) -> bool + Send + Sync + 'static) -> Self {
        Self {
            description: Arc::from(description),
            f: Arc::new(f),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn accepts(&self, args: &[Value], ctx: &CallContext) -> bool {
        ctx.run_external(|| (self.f)(args))
    }
}

impl fmt::Debug for ArgFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ArgFilter").field(&self.description).finish()
    }
}

#[derive(Debug, Clone)]
pub struct CallPattern {
    method: Arc<MethodInfo>,
    instance: Matcher,
    args: Vec<Matcher>,
    filter: Option<ArgFilter>,
}

impl CallPattern {
    /// Build and validate a pattern for registration or querying.
    pub fn new(
        method: Arc<MethodInfo>,
        instance: Matcher,
        args: Vec<Matcher>,
    ) -> Result<Self, ConfigurationError> {
        let expected = method.arg_count();
        if args.len() != expected {
            return Err(ConfigurationError::ArgumentCountMismatch {
                method: method.to_string(),
                expected,
                actual: args.len(),
            });
        }

        if !is_instance_matcher(&instance) {
            return Err(ConfigurationError::UnsupportedMatcherPosition {
                method: method.to_string(),
                position: "the instance slot".to_string(),
                matcher: instance.to_string(),
            });
        }

        let params = method.arg_params();
        for (i, (matcher, param)) in args.iter().zip(params).enumerate() {
            if matches!(matcher, Matcher::ParamsArray(_)) && !param.is_params_array {
                return Err(ConfigurationError::UnsupportedMatcherPosition {
                    method: method.to_string(),
                    position: format!("argument {} ({})", i + 1, param.name),
                    matcher: matcher.to_string(),
                });
            }
        }

        Ok(Self {
            method,
            instance,
            args,
            filter: None,
        })
    }

    /// Pattern matching every call of `method` on `instance`.
    pub fn any_args(method: Arc<MethodInfo>, instance: Matcher) -> Result<Self, ConfigurationError> {
        let args = vec![Matcher::Any; method.arg_count()];
        Self::new(method, instance, args)
    }

    /// The concrete pattern for a live call. The receiver becomes a
    /// `Reference` matcher (null for static calls), each argument a `Value`
    /// matcher. Extension-method calls move their first argument into the
    /// receiver slot.
    pub fn concrete(method: Arc<MethodInfo>, instance: Option<&Value>, args: &[Value]) -> Self {
        let (receiver, rest) = if method.is_extension() && !args.is_empty() {
            (Some(&args[0]), &args[1..])
        } else {
            (instance, args)
        };
        Self {
            instance: Matcher::Reference(receiver.cloned().unwrap_or(Value::Null)),
            args: rest.iter().cloned().map(Matcher::Value).collect(),
            method,
            filter: None,
        }
    }

    /// The same matcher sequence under another method of identical shape,
    /// used to look up arrangements made against an implemented interface
    /// method.
    pub(crate) fn retarget(&self, method: Arc<MethodInfo>) -> Self {
        Self {
            method,
            instance: self.instance.clone(),
            args: self.args.clone(),
            filter: self.filter.clone(),
        }
    }

    pub fn with_filter(mut self, filter: ArgFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn method(&self) -> &Arc<MethodInfo> {
        &self.method
    }

    pub fn instance(&self) -> &Matcher {
        &self.instance
    }

    pub fn args(&self) -> &[Matcher] {
        &self.args
    }

    pub fn filter(&self) -> Option<&ArgFilter> {
        self.filter.as_ref()
    }

    /// Number of tree levels below the method root (instance + arguments).
    pub fn depth(&self) -> usize {
        1 + self.args.len()
    }

    /// Matcher at tree depth `d`: 0 is the instance, `k` the k-th argument.
    pub fn matcher_at(&self, d: usize) -> &Matcher {
        if d == 0 {
            &self.instance
        } else {
            &self.args[d - 1]
        }
    }

    /// Argument values, for concrete patterns. Non-value matchers are skipped.
    pub fn arg_values(&self) -> Vec<Value> {
        self.args
            .iter()
            .filter_map(|m| m.concrete_value().cloned())
            .collect()
    }

    /// Whether the filter (if any) accepts the given recorded arguments.
    pub fn filter_accepts(&self, args: &[Value], ctx: &CallContext) -> bool {
        self.filter.as_ref().is_none_or(|f| f.accepts(args, ctx))
    }
}

fn is_instance_matcher(m: &Matcher) -> bool {
    matches!(
        m,
        Matcher::Any | Matcher::Reference(_) | Matcher::Value(_) | Matcher::Type { .. }
    )
}

impl fmt::Display for CallPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Matcher::Reference(Value::Null) => write!(f, "{}", self.method.declaring_type())?,
            other => write!(f, "{other}")?,
        }
        write!(f, ".{}(", self.method.name())?;
        for (i, m) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{m}")?;
        }
        f.write_str(")")?;
        if let Some(filter) = &self.filter {
            write!(f, " where {}", filter.description())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ObjectRef, TypeDesc};

    fn calc() -> (TypeDesc, Arc<MethodInfo>) {
        let ty = TypeDesc::interface("ICalc", vec![]);
        let add = MethodInfo::builder(&ty, "add")
            .param("a", TypeDesc::int())
            .param("b", TypeDesc::int())
            .returns(TypeDesc::int())
            .build();
        (ty, add)
    }

    #[test]
    fn argument_count_is_validated() {
        let (_, add) = calc();
        let err = CallPattern::new(add, Matcher::Any, vec![Matcher::Any]).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::ArgumentCountMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn params_array_only_on_params_slot() {
        let (_, add) = calc();
        let err = CallPattern::new(
            add,
            Matcher::Any,
            vec![Matcher::Any, Matcher::ParamsArray(vec![])],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnsupportedMatcherPosition { .. }));
    }

    #[test]
    fn range_rejected_as_instance() {
        let (_, add) = calc();
        let err = CallPattern::new(add, Matcher::inclusive(1, 2), vec![Matcher::Any, Matcher::Any])
            .unwrap_err();
        assert!(err.to_string().contains("instance slot"));
    }

    #[test]
    fn concrete_pattern_shape() {
        let (ty, add) = calc();
        let obj = Value::Object(ObjectRef::labeled(ty, "calc"));
        let p = CallPattern::concrete(add, Some(&obj), &[Value::Int(1), Value::Int(2)]);
        assert_eq!(p.depth(), 3);
        assert!(matches!(p.matcher_at(0), Matcher::Reference(_)));
        assert!(matches!(p.matcher_at(2), Matcher::Value(Value::Int(2))));
        assert_eq!(p.to_string(), "calc.add(1, 2)");
        assert_eq!(p.arg_values().len(), 2);
    }

    #[test]
    fn extension_call_moves_receiver() {
        let ty = TypeDesc::class("StringExt", vec![]);
        let ext = MethodInfo::builder(&ty, "repeat")
            .param("this", TypeDesc::string())
            .param("n", TypeDesc::int())
            .extension()
            .build();
        let p = CallPattern::concrete(ext, None, &[Value::str("ab"), Value::Int(3)]);
        assert!(matches!(p.instance(), Matcher::Reference(Value::Str(_))));
        assert_eq!(p.args().len(), 1);
    }

    #[test]
    fn static_display_uses_type_name() {
        let ty = TypeDesc::class("Clock", vec![]);
        let now = MethodInfo::builder(&ty, "now").static_method().build();
        let p = CallPattern::concrete(now, None, &[]);
        assert_eq!(p.to_string(), "Clock.now()");
    }

    #[test]
    fn filter_is_applied_to_values() {
        let (_, add) = calc();
        let ctx = CallContext::new();
        let p = CallPattern::any_args(add, Matcher::Any)
            .unwrap()
            .with_filter(ArgFilter::new("a < b", |args| {
                matches!((&args[0], &args[1]), (Value::Int(a), Value::Int(b)) if a < b)
            }));
        assert!(p.filter_accepts(&[Value::Int(1), Value::Int(2)], &ctx));
        assert!(!p.filter_accepts(&[Value::Int(3), Value::Int(2)], &ctx));
        assert!(p.to_string().ends_with("where a < b"));
    }
}
