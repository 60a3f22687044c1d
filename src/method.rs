//! Resolved method identities.
//!
//! A `MethodInfo` is what the reflection collaborator hands over for a call
//! site: a closed (non-generic-open) method with its declaring type,
//! parameters, role, and the interface/base methods it implements.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::value::TypeDesc;

static NEXT_METHOD_KEY: AtomicU64 = AtomicU64::new(1);

/// Identity of a resolved method; the per-method tree root key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey(u64);

/// What the method is, as far as fallback behaviors and validation care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodRole {
    Ordinary,
    /// `Equals`-derived equality operation.
    Equality,
    ToString,
    HashCode,
    Finalizer,
    PropertyGet(String),
    PropertySet(String),
    EventAdd(String),
    EventRemove(String),
}

impl MethodRole {
    /// System methods a strict mock lets through unarranged.
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            MethodRole::Equality | MethodRole::ToString | MethodRole::HashCode | MethodRole::Finalizer
        )
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeDesc,
    /// Variadic tail (`params T[]`). Only valid on the last parameter.
    pub is_params_array: bool,
}

#[derive(Debug)]
pub struct MethodInfo {
    key: MethodKey,
    declaring_type: TypeDesc,
    name: String,
    params: Vec<Param>,
    return_type: Option<TypeDesc>,
    is_static: bool,
    is_extension: bool,
    role: MethodRole,
    base_chain: Vec<Arc<MethodInfo>>,
}

impl MethodInfo {
    pub fn builder(declaring_type: &TypeDesc, name: &str) -> MethodBuilder {
        MethodBuilder {
            declaring_type: declaring_type.clone(),
            name: name.to_string(),
            params: Vec::new(),
            return_type: None,
            is_static: false,
            is_extension: false,
            role: MethodRole::Ordinary,
            base_chain: Vec::new(),
        }
    }

    pub fn key(&self) -> MethodKey {
        self.key
    }

    pub fn declaring_type(&self) -> &TypeDesc {
        &self.declaring_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn return_type(&self) -> Option<&TypeDesc> {
        self.return_type.as_ref()
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn is_extension(&self) -> bool {
        self.is_extension
    }

    pub fn role(&self) -> &MethodRole {
        &self.role
    }

    /// Interface and base methods this method implements or overrides,
    /// nearest first.
    pub fn base_chain(&self) -> &[Arc<MethodInfo>] {
        &self.base_chain
    }

    /// Number of argument matchers a call pattern for this method carries.
    /// Extension methods move their first parameter into the instance slot.
    pub fn arg_count(&self) -> usize {
        if self.is_extension {
            self.params.len().saturating_sub(1)
        } else {
            self.params.len()
        }
    }

    /// Parameters as seen by argument matchers (receiver stripped for
    /// extension methods).
    pub fn arg_params(&self) -> &[Param] {
        if self.is_extension && !self.params.is_empty() {
            &self.params[1..]
        } else {
            &self.params
        }
    }
}

impl fmt::Display for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.declaring_type, self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if p.is_params_array {
                f.write_str("params ")?;
            }
            write!(f, "{} {}", p.ty, p.name)?;
        }
        f.write_str(")")
    }
}

pub struct MethodBuilder {
    declaring_type: TypeDesc,
    name: String,
    params: Vec<Param>,
    return_type: Option<TypeDesc>,
    is_static: bool,
    is_extension: bool,
    role: MethodRole,
    base_chain: Vec<Arc<MethodInfo>>,
}

impl MethodBuilder {
    pub fn param(mut self, name: &str, ty: TypeDesc) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            ty,
            is_params_array: false,
        });
        self
    }

    pub fn params_array(mut self, name: &str, element: TypeDesc) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            ty: element,
            is_params_array: true,
        });
        self
    }

    pub fn returns(mut self, ty: TypeDesc) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Extension-method shape: static, first parameter is the receiver.
    pub fn extension(mut self) -> Self {
        self.is_static = true;
        self.is_extension = true;
        self
    }

    pub fn role(mut self, role: MethodRole) -> Self {
        self.role = role;
        self
    }

    /// Record that this method implements/overrides `base`. The base's own
    /// chain is appended so the full chain is available from the leaf.
    pub fn implements(mut self, base: &Arc<MethodInfo>) -> Self {
        self.base_chain.push(base.clone());
        for inherited in base.base_chain() {
            if !self.base_chain.iter().any(|m| m.key() == inherited.key()) {
                self.base_chain.push(inherited.clone());
            }
        }
        self
    }

    pub fn build(self) -> Arc<MethodInfo> {
        Arc::new(MethodInfo {
            key: MethodKey(NEXT_METHOD_KEY.fetch_add(1, Ordering::Relaxed)),
            declaring_type: self.declaring_type,
            name: self.name,
            params: self.params,
            return_type: self.return_type,
            is_static: self.is_static,
            is_extension: self.is_extension,
            role: self.role,
            base_chain: self.base_chain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique() {
        let ty = TypeDesc::interface("ICalc", vec![]);
        let a = MethodInfo::builder(&ty, "add").build();
        let b = MethodInfo::builder(&ty, "add").build();
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn extension_strips_receiver() {
        let ty = TypeDesc::class("Ext", vec![]);
        let m = MethodInfo::builder(&ty, "twice")
            .param("this", TypeDesc::string())
            .param("n", TypeDesc::int())
            .extension()
            .build();
        assert_eq!(m.arg_count(), 1);
        assert_eq!(m.arg_params()[0].name, "n");
        assert!(m.is_static());
    }

    #[test]
    fn implements_flattens_chain() {
        let iface = TypeDesc::interface("IRoot", vec![]);
        let mid_ty = TypeDesc::interface("IMid", vec![iface.clone()]);
        let root = MethodInfo::builder(&iface, "run").build();
        let mid = MethodInfo::builder(&mid_ty, "run").implements(&root).build();
        let leaf_ty = TypeDesc::class("Impl", vec![mid_ty]);
        let leaf = MethodInfo::builder(&leaf_ty, "run").implements(&mid).build();
        let keys: Vec<_> = leaf.base_chain().iter().map(|m| m.key()).collect();
        assert_eq!(keys, vec![mid.key(), root.key()]);
    }

    #[test]
    fn display_signature() {
        let ty = TypeDesc::interface("ICalc", vec![]);
        let m = MethodInfo::builder(&ty, "sum")
            .param("seed", TypeDesc::int())
            .params_array("rest", TypeDesc::int())
            .returns(TypeDesc::int())
            .build();
        assert_eq!(m.to_string(), "ICalc.sum(int seed, params int rest)");
    }

    #[test]
    fn system_roles() {
        assert!(MethodRole::Equality.is_system());
        assert!(MethodRole::ToString.is_system());
        assert!(!MethodRole::Ordinary.is_system());
        assert!(!MethodRole::PropertyGet("X".into()).is_system());
    }
}
