//! Shared fixtures for unit tests: a small calculator interface, a class
//! implementing it, and the methods tests dispatch against.

use std::sync::Arc;

use crate::method::{MethodInfo, MethodRole};
use crate::value::{ObjectRef, TypeDesc, Value};

pub struct Calculator {
    /// `ICalc`
    pub iface: TypeDesc,
    /// `Calculator : ICalc`
    pub class: TypeDesc,
    /// `ICalc.add(int a, int b) -> int`
    pub add: Arc<MethodInfo>,
    /// `Calculator.add`, implementing `ICalc.add`.
    pub impl_add: Arc<MethodInfo>,
    /// `ICalc.sum(int seed, params int[] rest) -> int`
    pub sum: Arc<MethodInfo>,
    /// `ICalc.child() -> ICalc`
    pub child: Arc<MethodInfo>,
    /// `ICalc.name { get; set; }`
    pub get_name: Arc<MethodInfo>,
    pub set_name: Arc<MethodInfo>,
    /// `ICalc.changed += / -=`
    pub add_changed: Arc<MethodInfo>,
    pub remove_changed: Arc<MethodInfo>,
    /// `ICalc.ToString()`
    pub to_text: Arc<MethodInfo>,
}

pub fn calculator() -> Calculator {
    let iface = TypeDesc::interface("ICalc", vec![]);
    let class = TypeDesc::class("Calculator", vec![iface.clone()]);

    let add = MethodInfo::builder(&iface, "add")
        .param("a", TypeDesc::int())
        .param("b", TypeDesc::int())
        .returns(TypeDesc::int())
        .build();
    let impl_add = MethodInfo::builder(&class, "add")
        .param("a", TypeDesc::int())
        .param("b", TypeDesc::int())
        .returns(TypeDesc::int())
        .implements(&add)
        .build();
    let sum = MethodInfo::builder(&iface, "sum")
        .param("seed", TypeDesc::int())
        .params_array("rest", TypeDesc::int())
        .returns(TypeDesc::int())
        .build();
    let child = MethodInfo::builder(&iface, "child")
        .returns(iface.clone())
        .build();
    let get_name = MethodInfo::builder(&iface, "get_name")
        .returns(TypeDesc::string())
        .role(MethodRole::PropertyGet("name".into()))
        .build();
    let set_name = MethodInfo::builder(&iface, "set_name")
        .param("value", TypeDesc::string())
        .role(MethodRole::PropertySet("name".into()))
        .build();
    let add_changed = MethodInfo::builder(&iface, "add_changed")
        .param("handler", TypeDesc::object())
        .role(MethodRole::EventAdd("changed".into()))
        .build();
    let remove_changed = MethodInfo::builder(&iface, "remove_changed")
        .param("handler", TypeDesc::object())
        .role(MethodRole::EventRemove("changed".into()))
        .build();
    let to_text = MethodInfo::builder(&iface, "ToString")
        .returns(TypeDesc::string())
        .role(MethodRole::ToString)
        .build();

    Calculator {
        iface,
        class,
        add,
        impl_add,
        sum,
        child,
        get_name,
        set_name,
        add_changed,
        remove_changed,
        to_text,
    }
}

impl Calculator {
    /// A plain (non-mock) `Calculator` object labeled `calc`.
    pub fn instance(&self) -> Value {
        Value::Object(ObjectRef::labeled(self.class.clone(), "calc"))
    }
}
