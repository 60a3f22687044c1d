//! YAML scenario format.
//!
//! ```yaml
//! name: sequential returns
//! config:
//!   default_behavior: loose
//! types:
//!   - name: ICalc
//!     kind: interface
//!     methods:
//!       - name: add
//!         params: [int, int]
//!         returns: int
//! mocks:
//!   - name: calc
//!     type: ICalc
//! arrange:
//!   - call: calc.add
//!     args: [{type: int}, any]
//!     returns: 3
//!     in_sequence: true
//! calls:
//!   - call: calc.add
//!     args: [1, 2]
//!     expect: {returns: 3}
//! asserts:
//!   - call: calc.add
//!     args: [any, any]
//!     occurs: {exactly: 1}
//! ```

use serde::Deserialize;
use serde_yml::Value as Yaml;

use crate::behavior::Occurs;
use crate::config::EngineConfig;
use crate::mixin::MockBehavior;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub config: ConfigOverride,
    #[serde(default)]
    pub types: Vec<TypeSpec>,
    #[serde(default)]
    pub mocks: Vec<MockSpec>,
    /// Plain objects: not mocks, so unarranged calls run the original.
    #[serde(default)]
    pub objects: Vec<ObjectSpec>,
    #[serde(default)]
    pub arrange: Vec<ArrangeSpec>,
    #[serde(default)]
    pub calls: Vec<CallSpec>,
    #[serde(default)]
    pub asserts: Vec<AssertSpec>,
}

/// Per-scenario overrides of the file-level engine config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverride {
    pub default_behavior: Option<MockBehavior>,
    pub call_log_limit: Option<usize>,
    pub recursion_limit: Option<usize>,
    pub aggregate_failures: Option<bool>,
}

impl ConfigOverride {
    pub fn apply(&self, base: &EngineConfig) -> EngineConfig {
        EngineConfig {
            default_behavior: self.default_behavior.unwrap_or(base.default_behavior),
            call_log_limit: self.call_log_limit.unwrap_or(base.call_log_limit),
            recursion_limit: self.recursion_limit.unwrap_or(base.recursion_limit),
            aggregate_failures: self.aggregate_failures.unwrap_or(base.aggregate_failures),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKindSpec {
    Interface,
    #[default]
    Class,
    SealedClass,
    Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeSpec {
    pub name: String,
    #[serde(default)]
    pub kind: TypeKindSpec,
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodSpec {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub extension: bool,
    /// `equality`, `to_string`, `hash_code`, `finalizer`, `get:<prop>`,
    /// `set:<prop>`, `add:<event>` or `remove:<event>`.
    #[serde(default)]
    pub role: Option<String>,
    /// `Type.method` entries this method implements.
    #[serde(default)]
    pub implements: Vec<String>,
    /// What the original implementation returns when a call runs it.
    #[serde(default)]
    pub original: Option<Yaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParamSpec {
    /// Just a type name.
    Type(String),
    Full {
        #[serde(default)]
        name: Option<String>,
        #[serde(rename = "type")]
        ty: String,
        #[serde(default)]
        params: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub behavior: Option<MockBehavior>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// An argument matcher. Scalars and sequences are literal values; the
/// keywords `any` and `null_or_empty` and the single-key maps below build
/// the other matcher kinds.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MatcherSpec {
    Tagged(TaggedMatcher),
    Literal(Yaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaggedMatcher {
    Any,
    NullOrEmpty,
    /// `{value: x}`: a literal, even if it looks like a keyword.
    Value(Yaml),
    /// `{ref: name}`: the named mock or object, by identity.
    Ref(String),
    /// `{type: int}`
    Type(String),
    /// `{inclusive: [from, to]}`
    Inclusive(Yaml, Yaml),
    /// `{exclusive: [from, to]}`
    Exclusive(Yaml, Yaml),
    /// `{matches: "^a"}`: strings matching a regex.
    Matches(String),
    /// `{where: {type: int, gt: 3}}`
    Where(WhereSpec),
    /// `{params: [1, any]}`
    Params(Vec<MatcherSpec>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhereSpec {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(flatten)]
    pub compare: CompareSpec,
}

/// Comparison bounds; every bound given must hold.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompareSpec {
    #[serde(default)]
    pub eq: Option<Yaml>,
    #[serde(default)]
    pub ne: Option<Yaml>,
    #[serde(default)]
    pub gt: Option<Yaml>,
    #[serde(default)]
    pub ge: Option<Yaml>,
    #[serde(default)]
    pub lt: Option<Yaml>,
    #[serde(default)]
    pub le: Option<Yaml>,
}

/// Acceptance guard over one argument.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardSpec {
    pub arg: usize,
    #[serde(flatten)]
    pub compare: CompareSpec,
}

/// `never`, `once`, `at_least_once`, or a map of bounds such as
/// `{exactly: 2}` or `{at_least: 1, at_most: 3}`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum OccursSpec {
    Keyword(OccursKeyword),
    Bounds(OccursBounds),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccursKeyword {
    Never,
    Once,
    AtLeastOnce,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OccursBounds {
    #[serde(default)]
    pub exactly: Option<usize>,
    #[serde(default)]
    pub at_least: Option<usize>,
    #[serde(default)]
    pub at_most: Option<usize>,
}

impl From<OccursSpec> for Occurs {
    fn from(spec: OccursSpec) -> Self {
        match spec {
            OccursSpec::Keyword(OccursKeyword::Never) => Occurs::never(),
            OccursSpec::Keyword(OccursKeyword::Once) => Occurs::once(),
            OccursSpec::Keyword(OccursKeyword::AtLeastOnce) => Occurs::at_least_once(),
            OccursSpec::Bounds(OccursBounds {
                exactly: Some(n), ..
            }) => Occurs::exactly(n),
            OccursSpec::Bounds(OccursBounds {
                at_least, at_most, ..
            }) => Occurs {
                lower: at_least,
                upper: at_most,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArrangeSpec {
    /// `receiver.method`; the receiver is a mock or object name, or a type
    /// name to arrange for any instance (and static calls).
    pub call: String,
    /// Argument matchers; omitted means any arguments.
    #[serde(default)]
    pub args: Option<Vec<MatcherSpec>>,
    /// Name other steps use to refer to this arrangement.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub returns: Option<Yaml>,
    /// Return the argument at this index.
    #[serde(default)]
    pub returns_arg: Option<usize>,
    #[serde(default)]
    pub throws: Option<Yaml>,
    #[serde(default)]
    pub call_original: bool,
    #[serde(default)]
    pub occurs: Option<OccursSpec>,
    #[serde(default)]
    pub must_be_called: bool,
    #[serde(default)]
    pub in_sequence: bool,
    #[serde(default)]
    pub in_order: bool,
    #[serde(default)]
    pub when: Option<GuardSpec>,
    /// Expected configuration error (substring of its message).
    #[serde(default)]
    pub rejected: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallSpec {
    pub call: String,
    #[serde(default)]
    pub args: Vec<Yaml>,
    #[serde(default = "one")]
    pub repeat: usize,
    #[serde(default)]
    pub expect: Option<ExpectSpec>,
}

fn one() -> usize {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectSpec {
    #[serde(default)]
    pub returns: Option<Yaml>,
    /// The call returned some mock (recursive mocking).
    #[serde(default)]
    pub returns_mock: bool,
    #[serde(default)]
    pub throws: Option<Yaml>,
    #[serde(default)]
    pub call_original: Option<bool>,
    /// Label of the arrangement that must win.
    #[serde(default)]
    pub arrangement: Option<String>,
    #[serde(default)]
    pub unmatched: bool,
    /// Expected error kind: `too_many_calls`, `out_of_order`,
    /// `strict_violation` or `configuration`.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssertSpec {
    #[serde(default)]
    pub call: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<MatcherSpec>>,
    #[serde(default)]
    pub occurs: Option<OccursSpec>,
    #[serde(default)]
    pub times_called: Option<usize>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub arrangement: Option<String>,
    #[serde(default)]
    pub all: bool,
    /// Expected assertion failure (substring of its message).
    #[serde(default)]
    pub fails: Option<String>,
}
