//! Call-site values and the minimal type model the matchers need.
//!
//! Values are what an interception source hands the engine: the receiver and
//! each actual argument. Primitive values compare by equality, objects by
//! identity, and the built-in sequence and record shapes element-wise.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, LazyLock};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// Copied by value; never null.
    Value,
    /// Class-like; may be null.
    Reference,
    /// Interface; may be null, never instantiated directly.
    Interface,
    /// `Nullable<T>` over a value type.
    Nullable(TypeDesc),
}

#[derive(Debug, PartialEq, Eq)]
struct TypeData {
    name: String,
    kind: TypeKind,
    bases: Vec<TypeDesc>,
    sealed: bool,
}

/// A type handle. Cheap to clone; compared by name and kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDesc(Arc<TypeData>);

static OBJECT: LazyLock<TypeDesc> =
    LazyLock::new(|| TypeDesc::build("object", TypeKind::Reference, Vec::new(), false));
static BOOL: LazyLock<TypeDesc> = LazyLock::new(|| TypeDesc::primitive("bool"));
static INT: LazyLock<TypeDesc> = LazyLock::new(|| TypeDesc::primitive("int"));
static FLOAT: LazyLock<TypeDesc> = LazyLock::new(|| TypeDesc::primitive("double"));
static STRING: LazyLock<TypeDesc> = LazyLock::new(|| {
    TypeDesc::build("string", TypeKind::Reference, vec![TypeDesc::object()], true)
});
static ARRAY: LazyLock<TypeDesc> = LazyLock::new(|| {
    TypeDesc::build("array", TypeKind::Reference, vec![TypeDesc::object()], true)
});
static RECORD: LazyLock<TypeDesc> = LazyLock::new(|| {
    TypeDesc::build("record", TypeKind::Reference, vec![TypeDesc::object()], true)
});

impl TypeDesc {
    fn build(name: &str, kind: TypeKind, bases: Vec<TypeDesc>, sealed: bool) -> Self {
        TypeDesc(Arc::new(TypeData {
            name: name.to_string(),
            kind,
            bases,
            sealed,
        }))
    }

    fn primitive(name: &str) -> Self {
        Self::build(name, TypeKind::Value, vec![TypeDesc::object()], true)
    }

    pub fn object() -> Self {
        OBJECT.clone()
    }

    pub fn bool() -> Self {
        BOOL.clone()
    }

    pub fn int() -> Self {
        INT.clone()
    }

    pub fn float() -> Self {
        FLOAT.clone()
    }

    pub fn string() -> Self {
        STRING.clone()
    }

    pub fn array() -> Self {
        ARRAY.clone()
    }

    pub fn record() -> Self {
        RECORD.clone()
    }

    /// A user value type (struct). Implicitly derives from `object`.
    pub fn value_type(name: &str) -> Self {
        Self::build(name, TypeKind::Value, vec![TypeDesc::object()], true)
    }

    /// A user class with the given base types (base class and interfaces).
    pub fn class(name: &str, bases: Vec<TypeDesc>) -> Self {
        let mut bases = bases;
        if bases.is_empty() {
            bases.push(TypeDesc::object());
        }
        Self::build(name, TypeKind::Reference, bases, false)
    }

    /// A sealed class: can't be proxied, so recursive mocking skips it.
    pub fn sealed_class(name: &str, bases: Vec<TypeDesc>) -> Self {
        let mut bases = bases;
        if bases.is_empty() {
            bases.push(TypeDesc::object());
        }
        Self::build(name, TypeKind::Reference, bases, true)
    }

    pub fn interface(name: &str, bases: Vec<TypeDesc>) -> Self {
        Self::build(name, TypeKind::Interface, bases, false)
    }

    /// `Nullable<T>`; `inner` must be a value type.
    pub fn nullable(inner: TypeDesc) -> Self {
        let name = format!("{}?", inner.name());
        Self::build(&name, TypeKind::Nullable(inner), vec![TypeDesc::object()], true)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0.kind
    }

    pub fn bases(&self) -> &[TypeDesc] {
        &self.0.bases
    }

    pub fn is_value_type(&self) -> bool {
        matches!(self.0.kind, TypeKind::Value)
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.0.kind, TypeKind::Interface)
    }

    pub fn is_sealed(&self) -> bool {
        self.0.sealed
    }

    /// Whether `null` is a legal value of this type.
    pub fn accepts_null(&self) -> bool {
        !self.is_value_type()
    }

    /// Whether a value of type `other` may be stored in a slot of this type.
    pub fn is_assignable_from(&self, other: &TypeDesc) -> bool {
        if self == other {
            return true;
        }
        if let TypeKind::Nullable(inner) = &self.0.kind {
            return inner.is_assignable_from(other);
        }
        other.bases().iter().any(|base| self.is_assignable_from(base))
    }

    /// The value a loose mock hands back when nothing else decided.
    pub fn default_value(&self) -> Value {
        match self.name() {
            "bool" => Value::Bool(false),
            "int" => Value::Int(0),
            "double" => Value::Float(0.0),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
struct ObjectData {
    id: u64,
    ty: TypeDesc,
    label: Option<String>,
}

/// An object reference. Two `ObjectRef`s are the same object iff they came
/// from the same `ObjectRef::new` call.
#[derive(Debug, Clone)]
pub struct ObjectRef(Arc<ObjectData>);

impl ObjectRef {
    pub fn new(ty: TypeDesc) -> Self {
        Self::with_label(ty, None)
    }

    pub fn labeled(ty: TypeDesc, label: &str) -> Self {
        Self::with_label(ty, Some(label.to_string()))
    }

    fn with_label(ty: TypeDesc, label: Option<String>) -> Self {
        let id = NEXT_OBJECT_ID.fetch_add(1, AtomicOrdering::Relaxed);
        ObjectRef(Arc::new(ObjectData { id, ty, label }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn type_desc(&self) -> &TypeDesc {
        &self.0.ty
    }

    pub fn label(&self) -> Option<&str> {
        self.0.label.as_deref()
    }

    pub fn same_object(&self, other: &ObjectRef) -> bool {
        self.0.id == other.0.id
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.label {
            Some(label) => f.write_str(label),
            None => write!(f, "{}#{}", self.0.ty, self.0.id),
        }
    }
}

/// A dynamic call-site value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Array(Arc<[Value]>),
    /// Anonymous record: ordered named fields, compared field-wise.
    Record(Arc<[(String, Value)]>),
    Object(ObjectRef),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::from(items))
    }

    pub fn record(fields: Vec<(String, Value)>) -> Self {
        Value::Record(Arc::from(fields))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Runtime type of the value; `None` for null.
    pub fn type_desc(&self) -> Option<TypeDesc> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(TypeDesc::bool()),
            Value::Int(_) => Some(TypeDesc::int()),
            Value::Float(_) => Some(TypeDesc::float()),
            Value::Str(_) => Some(TypeDesc::string()),
            Value::Array(_) => Some(TypeDesc::array()),
            Value::Record(_) => Some(TypeDesc::record()),
            Value::Object(o) => Some(o.type_desc().clone()),
        }
    }

    /// Structural equality: primitives by value, objects by identity,
    /// arrays and records element-wise.
    pub fn structural_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // NaN equals NaN, as the host's boxed equality has it
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.structural_eq(y))
            }
            (Value::Record(a), Value::Record(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.structural_eq(vb))
            }
            (Value::Object(a), Value::Object(b)) => a.same_object(b),
            _ => false,
        }
    }

    /// Identity comparison: containers must be the very same allocation.
    pub fn same_reference(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Record(a), Value::Record(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => a.same_object(b),
            (Value::Array(_) | Value::Record(_) | Value::Object(_), _)
            | (_, Value::Array(_) | Value::Record(_) | Value::Object(_)) => false,
            _ => self.structural_eq(other),
        }
    }

    /// Ordering between comparable values. Mixed int/float compare numerically.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Record(fields) => {
                f.write_str("{ ")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name} = {value}")?;
                }
                f.write_str(" }")
            }
            Value::Object(o) => write!(f, "{o}"),
        }
    }
}

/// Structural equality; see [`Value::structural_eq`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.structural_eq(other)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}
