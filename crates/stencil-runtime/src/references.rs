//! Value references used by the VM.

use std::rc::Rc;

use stencil_reactive::{Reference, is_unbound_ref, value_for_ref};

use crate::environment::EnvironmentDelegate;
use crate::value::Value;

pub fn undefined_ref() -> Reference<Value> {
    Reference::constant(Value::Undefined)
}

pub fn null_ref() -> Reference<Value> {
    Reference::constant(Value::Null)
}

pub fn primitive_ref(value: impl Into<Value>) -> Reference<Value> {
    Reference::constant(value.into())
}

/// Reference to `parent.key`, read and written through the delegate's path hooks.
pub fn child_ref_for(
    parent: &Reference<Value>,
    key: &str,
    delegate: &Rc<dyn EnvironmentDelegate>,
) -> Reference<Value> {
    let key: Rc<str> = Rc::from(key);
    if is_unbound_ref(parent) {
        let value = delegate.get_path(&value_for_ref(parent), &key);
        return Reference::unbound(value);
    }

    let (read_parent, write_parent) = (parent.clone(), parent.clone());
    let (read_key, write_key) = (key.clone(), key.clone());
    let (read_delegate, write_delegate) = (Rc::clone(delegate), Rc::clone(delegate));
    Reference::compute_with_update(
        move || read_delegate.get_path(&value_for_ref(&read_parent), &read_key),
        move |value| write_delegate.set_path(&value_for_ref(&write_parent), &write_key, value),
    )
    .labeled(format!("path:{key}"))
}

/// Join class values, skipping empty and falsy ones
pub fn class_list_ref(parts: Vec<Reference<Value>>) -> Reference<Value> {
    Reference::compute(move || {
        let classes: Vec<String> = parts
            .iter()
            .map(value_for_ref)
            .filter(Value::is_truthy)
            .map(|value| value.to_display_string())
            .collect();
        if classes.is_empty() {
            Value::Null
        } else {
            Value::string(classes.join(" "))
        }
    })
    .labeled("class")
}
