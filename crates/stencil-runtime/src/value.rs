//! Runtime values flowing through references.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use stencil_reactive::{TagMeta, Trackable, consume_tag, dirty_tag_for, tag_for};

use crate::curry::CurriedComponentDefinition;
use crate::helper::{HelperDefinition, ModifierDefinition};
use crate::manager::ComponentDefinition;

/// Opaque resolution context handed to name lookups
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner(Rc<str>);

impl Owner {
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    List(Rc<Vec<Value>>),
    Object(Rc<ObjectValue>),
    Component(ComponentDefinition),
    Curried(CurriedComponentDefinition),
    Helper(HelperDefinition),
    Modifier(ModifierDefinition),
}

impl Value {
    pub fn string(value: impl Into<Rc<str>>) -> Self {
        Self::String(value.into())
    }

    pub fn number(value: impl Into<f64>) -> Self {
        Self::Number(value.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(Rc::new(items.into_iter().collect()))
    }

    pub fn object(fields: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        Self::Object(Rc::new(ObjectValue::with_fields(fields)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Object(_) => "object",
            Self::Component(_) => "component",
            Self::Curried(_) => "curried component",
            Self::Helper(_) => "helper",
            Self::Modifier(_) => "modifier",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Default truthiness: empty strings, zero, NaN, null and undefined are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(value) => *value,
            Self::Number(value) => *value != 0.0 && !value.is_nan(),
            Self::String(value) => !value.is_empty(),
            _ => true,
        }
    }

    /// Text rendered for this value when appended as content
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined | Self::Null => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    format!("{}", *value as i64)
                } else {
                    value.to_string()
                }
            }
            Self::String(value) => value.to_string(),
            Self::List(items) => items.iter().map(Value::to_display_string).collect::<Vec<_>>().join(","),
            Self::Object(_) => "[object]".to_string(),
            Self::Component(definition) => format!("[component {}]", definition.name()),
            Self::Curried(_) => "[curried component]".to_string(),
            Self::Helper(helper) => format!("[helper {}]", helper.name()),
            Self::Modifier(modifier) => format!("[modifier {}]", modifier.name()),
        }
    }

    /// Identity comparison: primitives by value, everything else by pointer.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Component(a), Self::Component(b)) => ComponentDefinition::ptr_eq(a, b),
            (Self::Curried(a), Self::Curried(b)) => CurriedComponentDefinition::ptr_eq(a, b),
            (Self::Helper(a), Self::Helper(b)) => HelperDefinition::ptr_eq(a, b),
            (Self::Modifier(a), Self::Modifier(b)) => ModifierDefinition::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => a == b,
            _ => self.same_identity(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(value) => write!(f, "Bool({value})"),
            Self::Number(value) => write!(f, "Number({value})"),
            Self::String(value) => write!(f, "String({value:?})"),
            Self::List(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Object(object) => fmt::Debug::fmt(object, f),
            Self::Component(definition) => fmt::Debug::fmt(definition, f),
            Self::Curried(curried) => fmt::Debug::fmt(curried, f),
            Self::Helper(helper) => fmt::Debug::fmt(helper, f),
            Self::Modifier(modifier) => fmt::Debug::fmt(modifier, f),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value.into())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

/// Host object whose fields are tracked one key at a time
#[derive(Default)]
pub struct ObjectValue {
    fields: RefCell<FxHashMap<Rc<str>, Value>>,
    meta: TagMeta,
}

impl ObjectValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fields(fields: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        let object = Self::new();
        object
            .fields
            .borrow_mut()
            .extend(fields.into_iter().map(|(key, value)| (Rc::from(key), value)));
        object
    }

    /// Tracked read
    pub fn get(&self, key: &str) -> Value {
        consume_tag(&tag_for(self, key));
        self.peek(key)
    }

    /// Untracked read
    pub fn peek(&self, key: &str) -> Value {
        self.fields.borrow().get(key).cloned().unwrap_or_default()
    }

    /// Write and invalidate readers of `key`
    pub fn set(&self, key: &str, value: Value) {
        self.fields.borrow_mut().insert(Rc::from(key), value);
        dirty_tag_for(self, key);
    }
}

impl Trackable for ObjectValue {
    fn tag_meta(&self) -> &TagMeta {
        &self.meta
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields.borrow();
        let mut keys: Vec<_> = fields.keys().collect();
        keys.sort();
        f.debug_struct("Object").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stencil_reactive::{track, validate_tag, value_for_tag};

    #[test]
    fn display_strings_follow_template_conventions() {
        assert_eq!(Value::Undefined.to_display_string(), "");
        assert_eq!(Value::number(3).to_display_string(), "3");
        assert_eq!(Value::number(2.5).to_display_string(), "2.5");
        assert_eq!(Value::list([Value::from("a"), Value::from(1)]).to_display_string(), "a,1");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::string("").is_truthy());
        assert!(!Value::number(0).is_truthy());
        assert!(Value::string("x").is_truthy());
        assert!(Value::list([]).is_truthy());
    }

    #[test]
    fn identity_distinguishes_equal_lists() {
        let a = Value::list([Value::from(1)]);
        let b = Value::list([Value::from(1)]);
        assert_eq!(a, b);
        assert!(!a.same_identity(&b));
        assert!(a.same_identity(&a.clone()));
    }

    #[test]
    fn object_fields_are_tracked_per_key() {
        let object = ObjectValue::with_fields([("name", Value::from("Ada")), ("age", Value::from(36))]);
        let (name, tag) = track(|| object.get("name"));
        assert_eq!(name, Value::from("Ada"));

        let snapshot = value_for_tag(&tag);
        object.set("age", Value::from(37));
        assert!(validate_tag(&tag, snapshot));

        object.set("name", Value::from("Grace"));
        assert!(!validate_tag(&tag, snapshot));
    }
}
