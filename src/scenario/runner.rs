use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde::Serialize;
use serde_yml::Value as Yaml;

use crate::arrangement::ArrangementHandle;
use crate::call_pattern::{ArgFilter, CallPattern};
use crate::config::EngineConfig;
use crate::context::CallContext;
use crate::dispatch::Resolution;
use crate::dump::DebugDump;
use crate::error::{AssertionFailure, MockError};
use crate::invocation::Invocation;
use crate::matcher::{Matcher, Predicate};
use crate::method::{MethodInfo, MethodKey, MethodRole};
use crate::repository::Repository;
use crate::scenario::model::{
    ArrangeSpec, AssertSpec, CallSpec, CompareSpec, ExpectSpec, MatcherSpec, MethodSpec,
    ParamSpec, Scenario, TaggedMatcher, TypeKindSpec, TypeSpec,
};
use crate::value::{ObjectRef, TypeDesc, Value};

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    pub engine: EngineConfig,
    /// Attach the repository's debug dump to the report.
    pub dump: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Setup,
    Arrange,
    Call,
    Assert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub kind: StepKind,
    pub description: String,
    pub outcome: StepOutcome,
}

impl StepResult {
    fn new(kind: StepKind, description: String, outcome: std::result::Result<(), String>) -> Self {
        Self {
            kind,
            description,
            outcome: match outcome {
                Ok(()) => StepOutcome::Passed,
                Err(msg) => StepOutcome::Failed(msg),
            },
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == StepOutcome::Passed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub path: PathBuf,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump: Option<DebugDump>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.steps.iter().all(StepResult::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| !s.passed())
    }

    /// A scenario that could not be loaded or set up.
    pub fn setup_failure(path: &Path, error: &anyhow::Error) -> Self {
        Self {
            name: default_name(path),
            path: path.to_path_buf(),
            steps: vec![StepResult::new(
                StepKind::Setup,
                "load scenario".to_string(),
                Err(format!("{error:#}")),
            )],
            dump: None,
        }
    }
}

fn default_name(path: &Path) -> String {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    file.trim_end_matches(".yml")
        .trim_end_matches(".yaml")
        .trim_end_matches(".scenario")
        .to_string()
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

/// Load and replay one file. Load and setup errors become a failed report.
pub fn replay_file(path: &Path, options: &ReplayOptions) -> ScenarioReport {
    let result = load_scenario(path).and_then(|scenario| replay(&scenario, path, options));
    match result {
        Ok(report) => report,
        Err(e) => ScenarioReport::setup_failure(path, &e),
    }
}

/// Replay `scenario` against a fresh repository. Step failures are recorded
/// in the report; an `Err` means the scenario itself is malformed.
pub fn replay(scenario: &Scenario, path: &Path, options: &ReplayOptions) -> Result<ScenarioReport> {
    let engine = scenario.config.apply(&options.engine);
    let mut world = World::new(Repository::new(engine));
    world.declare_types(&scenario.types)?;
    for mock in &scenario.mocks {
        let ty = world.resolve_type(&mock.ty)?;
        let object = world.repo.create_named_mock(&ty, &mock.name, mock.behavior)?;
        world.receivers.insert(mock.name.clone(), Value::Object(object));
    }
    for object in &scenario.objects {
        let ty = world.resolve_type(&object.ty)?;
        let value = Value::Object(ObjectRef::labeled(ty, &object.name));
        world.receivers.insert(object.name.clone(), value);
    }

    let mut steps = Vec::new();
    for spec in &scenario.arrange {
        steps.push(world.arrange(spec)?);
    }
    for spec in &scenario.calls {
        steps.push(world.call(spec)?);
    }
    for spec in &scenario.asserts {
        steps.push(world.assert(spec)?);
    }

    let dump = if options.dump {
        Some(world.repo.debug_dump(&world.ctx)?)
    } else {
        None
    };
    world.repo.retire(&world.ctx)?;

    Ok(ScenarioReport {
        name: scenario.name.clone().unwrap_or_else(|| default_name(path)),
        path: path.to_path_buf(),
        steps,
        dump,
    })
}

/// Scripted interception source: owns the repository, the call context and
/// the declared types of one scenario.
struct World {
    repo: Arc<Repository>,
    ctx: CallContext,
    types: HashMap<String, TypeDesc>,
    /// Methods by declaring type name, in declaration order.
    methods: HashMap<String, Vec<Arc<MethodInfo>>>,
    originals: HashMap<MethodKey, Value>,
    receivers: HashMap<String, Value>,
    labels: HashMap<String, ArrangementHandle>,
}

/// A resolved `receiver.method` target.
struct Target {
    method: Arc<MethodInfo>,
    /// The named receiver; `None` when the receiver is a type name.
    receiver: Option<Value>,
}

enum CallResult {
    Returned(Value),
    Original(Value),
    Threw(Value),
}

impl World {
    fn new(repo: Arc<Repository>) -> Self {
        Self {
            repo,
            ctx: CallContext::new(),
            types: HashMap::new(),
            methods: HashMap::new(),
            originals: HashMap::new(),
            receivers: HashMap::new(),
            labels: HashMap::new(),
        }
    }

    // ---- declarations ----

    fn declare_types(&mut self, specs: &[TypeSpec]) -> Result<()> {
        for spec in specs {
            if self.types.contains_key(&spec.name) {
                bail!("type {} is declared twice", spec.name);
            }
            let bases = spec
                .bases
                .iter()
                .map(|b| self.resolve_type(b))
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("in the bases of {}", spec.name))?;
            let ty = match spec.kind {
                TypeKindSpec::Interface => TypeDesc::interface(&spec.name, bases),
                TypeKindSpec::Class => TypeDesc::class(&spec.name, bases),
                TypeKindSpec::SealedClass => TypeDesc::sealed_class(&spec.name, bases),
                TypeKindSpec::Value => TypeDesc::value_type(&spec.name),
            };
            self.types.insert(spec.name.clone(), ty.clone());
            for method in &spec.methods {
                let info = self
                    .declare_method(&ty, method)
                    .with_context(|| format!("in method {}.{}", spec.name, method.name))?;
                self.methods.entry(spec.name.clone()).or_default().push(info);
            }
        }
        Ok(())
    }

    fn declare_method(&mut self, ty: &TypeDesc, spec: &MethodSpec) -> Result<Arc<MethodInfo>> {
        let mut builder = MethodInfo::builder(ty, &spec.name);
        for (i, param) in spec.params.iter().enumerate() {
            builder = match param {
                ParamSpec::Type(t) => builder.param(&format!("arg{i}"), self.resolve_type(t)?),
                ParamSpec::Full { name, ty, params } => {
                    let name = name.clone().unwrap_or_else(|| format!("arg{i}"));
                    let ty = self.resolve_type(ty)?;
                    if *params {
                        builder.params_array(&name, ty)
                    } else {
                        builder.param(&name, ty)
                    }
                }
            };
        }
        if let Some(returns) = spec.returns.as_deref().filter(|r| *r != "void") {
            builder = builder.returns(self.resolve_type(returns)?);
        }
        if spec.extension {
            builder = builder.extension();
        } else if spec.is_static {
            builder = builder.static_method();
        }
        if let Some(role) = &spec.role {
            builder = builder.role(parse_role(role)?);
        }
        for base in &spec.implements {
            builder = builder.implements(&self.qualified_method(base)?);
        }
        let info = builder.build();
        if let Some(original) = &spec.original {
            let value = self.to_value(original)?;
            self.originals.insert(info.key(), value);
        }
        Ok(info)
    }

    fn resolve_type(&self, name: &str) -> Result<TypeDesc> {
        if let Some(inner) = name.strip_suffix('?') {
            return Ok(TypeDesc::nullable(self.resolve_type(inner)?));
        }
        let ty = match name {
            "object" => TypeDesc::object(),
            "bool" => TypeDesc::bool(),
            "int" => TypeDesc::int(),
            "float" => TypeDesc::float(),
            "string" => TypeDesc::string(),
            "array" => TypeDesc::array(),
            "record" => TypeDesc::record(),
            _ => self
                .types
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("unknown type {name}"))?,
        };
        Ok(ty)
    }

    /// `Type.method`, searched on `Type` and then its bases.
    fn qualified_method(&self, path: &str) -> Result<Arc<MethodInfo>> {
        let (type_name, method) = path
            .rsplit_once('.')
            .ok_or_else(|| anyhow!("expected Type.method, got {path}"))?;
        let ty = self.resolve_type(type_name)?;
        self.find_method(&ty, method, None)
            .ok_or_else(|| anyhow!("{type_name} has no method {method}"))
    }

    /// Prefers an overload taking `arity` matchers, then any of that name.
    fn find_method(&self, ty: &TypeDesc, name: &str, arity: Option<usize>) -> Option<Arc<MethodInfo>> {
        self.find_overload(ty, name, arity)
            .or_else(|| arity.and_then(|_| self.find_overload(ty, name, None)))
    }

    fn find_overload(&self, ty: &TypeDesc, name: &str, arity: Option<usize>) -> Option<Arc<MethodInfo>> {
        let mut pending = vec![ty.clone()];
        while let Some(ty) = pending.pop() {
            let found = self.methods.get(ty.name()).and_then(|methods| {
                methods
                    .iter()
                    .find(|m| m.name() == name && arity.is_none_or(|n| n == m.arg_count()))
            });
            if let Some(method) = found {
                return Some(Arc::clone(method));
            }
            pending.extend(ty.bases().iter().rev().cloned());
        }
        None
    }

    /// An extension method named `name` whose receiver parameter accepts `ty`.
    fn find_extension(&self, ty: &TypeDesc, name: &str, arity: Option<usize>) -> Option<Arc<MethodInfo>> {
        let mut type_names: Vec<&String> = self.methods.keys().collect();
        type_names.sort();
        type_names.into_iter().find_map(|t| {
            self.methods[t]
                .iter()
                .find(|m| {
                    m.is_extension()
                        && m.name() == name
                        && m.params().first().is_some_and(|p| p.ty.is_assignable_from(ty))
                        && arity.is_none_or(|n| n == m.arg_count())
                })
                .cloned()
        })
    }

    /// Resolve `receiver.method`. A mock or object name targets that
    /// instance; a type name targets static calls and every instance.
    fn target(&self, call: &str, arity: Option<usize>) -> Result<Target> {
        let (receiver_name, method) = call
            .rsplit_once('.')
            .ok_or_else(|| anyhow!("expected receiver.method, got {call}"))?;
        if let Some(receiver) = self.receivers.get(receiver_name) {
            let ty = receiver
                .type_desc()
                .ok_or_else(|| anyhow!("{receiver_name} has no type"))?;
            let method = self
                .find_method(&ty, method, arity)
                .or_else(|| self.find_extension(&ty, method, arity))
                .ok_or_else(|| anyhow!("{ty} has no method {method}"))?;
            return Ok(Target {
                method,
                receiver: Some(receiver.clone()),
            });
        }
        let ty = self.resolve_type(receiver_name)?;
        let method = self
            .find_method(&ty, method, arity)
            .ok_or_else(|| anyhow!("{ty} has no method {method}"))?;
        Ok(Target {
            method,
            receiver: None,
        })
    }

    fn receiver(&self, name: &str) -> Result<Value> {
        self.receivers
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("unknown mock or object {name}"))
    }

    // ---- values and matchers ----

    fn to_value(&self, yaml: &Yaml) -> Result<Value> {
        let value = match yaml {
            Yaml::Null => Value::Null,
            Yaml::Bool(b) => Value::Bool(*b),
            Yaml::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().ok_or_else(|| anyhow!("unsupported number {n}"))?),
            },
            Yaml::String(s) => Value::str(s),
            Yaml::Sequence(items) => {
                Value::array(items.iter().map(|i| self.to_value(i)).collect::<Result<_>>()?)
            }
            Yaml::Mapping(map) => {
                if map.len() == 1 {
                    if let Some(name) = map.get("ref").and_then(Yaml::as_str) {
                        return self.receiver(name);
                    }
                }
                let mut fields = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let key = key
                        .as_str()
                        .ok_or_else(|| anyhow!("record keys must be strings"))?;
                    fields.push((key.to_string(), self.to_value(value)?));
                }
                Value::record(fields)
            }
            Yaml::Tagged(tagged) => bail!("unsupported YAML tag {}", tagged.tag),
        };
        Ok(value)
    }

    fn matcher(&self, spec: &MatcherSpec) -> Result<Matcher> {
        let tagged = match spec {
            MatcherSpec::Literal(yaml) => return Ok(Matcher::Value(self.to_value(yaml)?)),
            MatcherSpec::Tagged(tagged) => tagged,
        };
        let matcher = match tagged {
            TaggedMatcher::Any => Matcher::Any,
            TaggedMatcher::NullOrEmpty => Matcher::NullOrEmptyString,
            TaggedMatcher::Value(yaml) => Matcher::Value(self.to_value(yaml)?),
            TaggedMatcher::Ref(name) => Matcher::Reference(self.receiver(name)?),
            TaggedMatcher::Type(ty) => Matcher::of_type(self.resolve_type(ty)?),
            TaggedMatcher::Inclusive(from, to) => {
                Matcher::inclusive(self.to_value(from)?, self.to_value(to)?)
            }
            TaggedMatcher::Exclusive(from, to) => {
                Matcher::exclusive(self.to_value(from)?, self.to_value(to)?)
            }
            TaggedMatcher::Matches(pattern) => {
                let re = Regex::new(pattern).with_context(|| format!("invalid regex {pattern}"))?;
                Matcher::typed_predicate(TypeDesc::string(), Predicate::regex(re))
            }
            TaggedMatcher::Where(spec) => {
                let compare = self.comparison(&spec.compare)?;
                let description = compare.to_string();
                let predicate = Predicate::new(&description, move |v| compare.holds(v));
                Matcher::typed_predicate(self.resolve_type(&spec.ty)?, predicate)
            }
            TaggedMatcher::Params(items) => Matcher::ParamsArray(
                items.iter().map(|m| self.matcher(m)).collect::<Result<_>>()?,
            ),
        };
        Ok(matcher)
    }

    fn comparison(&self, spec: &CompareSpec) -> Result<Comparison> {
        let mut bounds = Vec::new();
        for (op, bound) in [
            (CompareOp::Eq, &spec.eq),
            (CompareOp::Ne, &spec.ne),
            (CompareOp::Gt, &spec.gt),
            (CompareOp::Ge, &spec.ge),
            (CompareOp::Lt, &spec.lt),
            (CompareOp::Le, &spec.le),
        ] {
            if let Some(bound) = bound {
                bounds.push((op, self.to_value(bound)?));
            }
        }
        Ok(Comparison(bounds))
    }

    fn pattern(&self, call: &str, args: Option<&[MatcherSpec]>) -> Result<PatternOrRejection> {
        let target = self.target(call, args.map(<[MatcherSpec]>::len))?;
        let instance = target.receiver.map_or(Matcher::Any, Matcher::Reference);
        let built = match args {
            None => CallPattern::any_args(target.method, instance),
            Some(args) => {
                let matchers = args.iter().map(|m| self.matcher(m)).collect::<Result<_>>()?;
                CallPattern::new(target.method, instance, matchers)
            }
        };
        Ok(built.map_err(MockError::from))
    }

    // ---- steps ----

    fn arrange(&mut self, spec: &ArrangeSpec) -> Result<StepResult> {
        let description = format!("arrange {}", spec.expression.as_deref().unwrap_or(&spec.call));
        let arranged = self.pattern(&spec.call, spec.args.as_deref())?.and_then(|pattern| {
            let handle = match &spec.expression {
                Some(expr) => self.repo.arrange_described(&self.ctx, pattern, expr),
                None => self.repo.arrange(&self.ctx, pattern),
            };
            handle.map_err(MockError::from)
        });
        let handle = match (arranged, &spec.rejected) {
            (Ok(handle), None) => handle,
            (Ok(_), Some(expected)) => {
                return Ok(StepResult::new(
                    StepKind::Arrange,
                    description,
                    Err(format!("expected rejection containing {expected:?}, but it was accepted")),
                ));
            }
            (Err(e), expected) => {
                return Ok(StepResult::new(StepKind::Arrange, description, expect_error(&e, expected.as_deref())));
            }
        };

        if let Some(returns) = &spec.returns {
            handle.returns(self.to_value(returns)?);
        }
        if let Some(index) = spec.returns_arg {
            handle.returns_with(move |args| args.get(index).cloned().unwrap_or(Value::Null));
        }
        if let Some(throws) = &spec.throws {
            handle.throws(self.to_value(throws)?);
        }
        if spec.call_original {
            handle.call_original();
        }
        if let Some(occurs) = spec.occurs {
            handle.occurs(occurs.into());
        }
        if spec.must_be_called {
            handle.must_be_called();
        }
        if spec.in_sequence {
            handle.in_sequence();
        }
        if spec.in_order {
            handle.in_order();
        }
        if let Some(guard) = &spec.when {
            let compare = self.comparison(&guard.compare)?;
            let index = guard.arg;
            let description = format!("arg {index} {compare}");
            handle.when(ArgFilter::new(&description, move |args| {
                args.get(index).is_some_and(|v| compare.holds(v))
            }));
        }
        let description = format!("arrange {}", handle.arrangement().expression());
        if let Some(label) = &spec.label {
            self.labels.insert(label.clone(), handle);
        }
        Ok(StepResult::new(StepKind::Arrange, description, Ok(())))
    }

    fn call(&self, spec: &CallSpec) -> Result<StepResult> {
        let target = self.target(&spec.call, Some(spec.args.len()))?;
        let mut args = spec
            .args
            .iter()
            .map(|a| self.to_value(a))
            .collect::<Result<Vec<_>>>()?;
        let instance = if target.method.is_extension() {
            if let Some(receiver) = target.receiver {
                args.insert(0, receiver);
            }
            None
        } else {
            target.receiver
        };
        let shown = Invocation::new(Arc::clone(&target.method), instance.clone(), args.clone());
        let description = match spec.repeat {
            1 => format!("call {shown}"),
            n => format!("call {shown} x{n}"),
        };

        let default_expect = ExpectSpec::default();
        let expect = spec.expect.as_ref().unwrap_or(&default_expect);
        for round in 1..=spec.repeat.max(1) {
            let mut invocation = Invocation::new(Arc::clone(&target.method), instance.clone(), args.clone());
            let dispatched = self.repo.dispatch(&self.ctx, &mut invocation);
            let checked = self.check_call(invocation, dispatched, expect);
            if let Err(msg) = checked {
                let msg = if spec.repeat > 1 {
                    format!("call {round}: {msg}")
                } else {
                    msg
                };
                return Ok(StepResult::new(StepKind::Call, description, Err(msg)));
            }
        }
        Ok(StepResult::new(StepKind::Call, description, Ok(())))
    }

    /// What the intercepted call does once dispatch returns.
    fn complete(&self, invocation: Invocation) -> CallResult {
        let method = Arc::clone(invocation.method());
        let outcome = invocation.outcome;
        if let Some(exception) = outcome.exception {
            return CallResult::Threw(exception);
        }
        if outcome.call_original {
            let value = self.originals.get(&method.key()).cloned().unwrap_or_else(|| {
                method
                    .return_type()
                    .map_or(Value::Null, TypeDesc::default_value)
            });
            return CallResult::Original(value);
        }
        CallResult::Returned(outcome.return_value().cloned().unwrap_or(Value::Null))
    }

    fn check_call(
        &self,
        invocation: Invocation,
        dispatched: std::result::Result<Resolution, MockError>,
        expect: &ExpectSpec,
    ) -> std::result::Result<(), String> {
        let resolution = match dispatched {
            Ok(resolution) => resolution,
            Err(e) => return expect_failure_kind(&e, expect.error.as_deref()),
        };
        if let Some(kind) = &expect.error {
            return Err(format!("expected a {kind} error, but the call succeeded"));
        }
        if expect.unmatched && resolution != Resolution::Unmatched {
            return Err(format!("expected no arrangement to match, got {resolution:?}"));
        }
        if let Some(label) = &expect.arrangement {
            let handle = self
                .labels
                .get(label)
                .ok_or_else(|| format!("unknown arrangement label {label}"))?;
            if resolution.arrangement() != Some(handle.id()) {
                return Err(format!(
                    "expected arrangement {label} ({}) to win, got {resolution:?}",
                    handle.id()
                ));
            }
        }

        let result = self.complete(invocation);
        if let Some(expected) = expect.call_original {
            let ran_original = matches!(result, CallResult::Original(_));
            if expected != ran_original {
                return Err(format!("expected call_original = {expected}, got {ran_original}"));
            }
        }
        if let Some(expected) = &expect.throws {
            let expected = self.to_value(expected).map_err(|e| format!("{e:#}"))?;
            match &result {
                CallResult::Threw(actual) if actual.structural_eq(&expected) => {}
                CallResult::Threw(actual) => return Err(format!("expected to throw {expected}, threw {actual}")),
                _ => return Err(format!("expected to throw {expected}, but nothing was thrown")),
            }
        }
        let returned = match &result {
            CallResult::Returned(v) | CallResult::Original(v) => Some(v),
            CallResult::Threw(_) => None,
        };
        if let Some(expected) = &expect.returns {
            let expected = self.to_value(expected).map_err(|e| format!("{e:#}"))?;
            match returned {
                Some(actual) if actual.structural_eq(&expected) => {}
                Some(actual) => return Err(format!("expected {expected}, got {actual}")),
                None => return Err(format!("expected {expected}, but the call threw")),
            }
        }
        if expect.returns_mock {
            let is_mock = returned.is_some_and(|v| self.repo.mixin_of(v).is_some());
            if !is_mock {
                return Err("expected the call to return a mock".to_string());
            }
        }
        Ok(())
    }

    fn assert(&self, spec: &AssertSpec) -> Result<StepResult> {
        let (description, result) = if spec.all {
            ("assert all".to_string(), self.repo.assert_all(&self.ctx))
        } else if let Some(name) = &spec.object {
            let object = self.receiver(name)?;
            (format!("assert object {name}"), self.repo.assert_object(&self.ctx, &object))
        } else if let Some(label) = &spec.arrangement {
            let handle = self
                .labels
                .get(label)
                .ok_or_else(|| anyhow!("unknown arrangement label {label}"))?;
            (
                format!("assert arrangement {label}"),
                self.repo.assert_arrangement(&self.ctx, handle),
            )
        } else if let Some(call) = &spec.call {
            let pattern = self.pattern(call, spec.args.as_deref())?;
            match pattern {
                Err(e) => (format!("assert {call}"), Err(e)),
                Ok(pattern) => {
                    let description = format!("assert {pattern}");
                    if let Some(expected) = spec.times_called {
                        let outcome = match self.repo.times_called(&self.ctx, &pattern) {
                            Ok(actual) if actual == expected => Ok(()),
                            Ok(actual) => Err(format!("expected {expected} call(s), got {actual}")),
                            Err(e) => Err(e.to_string()),
                        };
                        return Ok(StepResult::new(StepKind::Assert, description, outcome));
                    }
                    let occurs = spec.occurs.map(Into::into);
                    (description, self.repo.assert_pattern(&self.ctx, &pattern, occurs))
                }
            }
        } else {
            bail!("assert step needs one of call, object, arrangement or all");
        };

        let outcome = match (result, &spec.fails) {
            (Ok(()), None) => Ok(()),
            (Ok(()), Some(expected)) => Err(format!(
                "expected a failure containing {expected:?}, but the assertion passed"
            )),
            (Err(e), expected) => expect_error(&e, expected.as_deref()),
        };
        Ok(StepResult::new(StepKind::Assert, description, outcome))
    }
}

type PatternOrRejection = std::result::Result<CallPattern, MockError>;

/// `Err(e)` was expected iff `expected` is given and the message contains it.
fn expect_error(error: &MockError, expected: Option<&str>) -> std::result::Result<(), String> {
    let message = error.to_string();
    match expected {
        Some(fragment) if message.contains(fragment) => Ok(()),
        Some(fragment) => Err(format!("expected an error containing {fragment:?}, got: {message}")),
        None => Err(message),
    }
}

fn expect_failure_kind(error: &MockError, expected: Option<&str>) -> std::result::Result<(), String> {
    let actual = error.as_assertion().map_or("configuration", failure_kind);
    match expected {
        Some(kind) if kind == actual => Ok(()),
        Some(kind) => Err(format!("expected a {kind} error, got: {error}")),
        None => Err(error.to_string()),
    }
}

fn failure_kind(failure: &AssertionFailure) -> &'static str {
    match failure {
        AssertionFailure::TooFewCalls { .. } => "too_few_calls",
        AssertionFailure::TooManyCalls { .. } => "too_many_calls",
        AssertionFailure::OutOfOrder { .. } => "out_of_order",
        AssertionFailure::NeverCalledInOrder { .. } => "never_called_in_order",
        AssertionFailure::StrictViolation { .. } => "strict_violation",
        AssertionFailure::Aggregate(_) => "aggregate",
    }
}

fn parse_role(role: &str) -> Result<MethodRole> {
    let parsed = match role.split_once(':') {
        Some(("get", name)) => MethodRole::PropertyGet(name.to_string()),
        Some(("set", name)) => MethodRole::PropertySet(name.to_string()),
        Some(("add", name)) => MethodRole::EventAdd(name.to_string()),
        Some(("remove", name)) => MethodRole::EventRemove(name.to_string()),
        Some(_) => bail!("unknown method role {role}"),
        None => match role {
            "ordinary" => MethodRole::Ordinary,
            "equality" => MethodRole::Equality,
            "to_string" => MethodRole::ToString,
            "hash_code" => MethodRole::HashCode,
            "finalizer" => MethodRole::Finalizer,
            _ => bail!("unknown method role {role}"),
        },
    };
    Ok(parsed)
}

#[derive(Debug, Clone, Copy)]
enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// Conjunction of comparisons against fixed bounds.
struct Comparison(Vec<(CompareOp, Value)>);

impl Comparison {
    fn holds(&self, value: &Value) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        self.0.iter().all(|(op, bound)| match op {
            CompareOp::Eq => value.structural_eq(bound),
            CompareOp::Ne => !value.structural_eq(bound),
            CompareOp::Gt => value.compare(bound) == Some(Greater),
            CompareOp::Ge => matches!(value.compare(bound), Some(Greater | Equal)),
            CompareOp::Lt => value.compare(bound) == Some(Less),
            CompareOp::Le => matches!(value.compare(bound), Some(Less | Equal)),
        })
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("any");
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(op, bound)| format!("{} {bound}", op.symbol()))
            .collect();
        f.write_str(&parts.join(" && "))
    }
}
