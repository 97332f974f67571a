//! Deferred attributes of a component's root element.
//!
//! Between opening a component's element and flushing it, attributes from
//! the layout and from the caller are collected here instead of being
//! written straight away. Flushing merges classes, writes `type` last and
//! hands back the modifiers to install.

use std::rc::Rc;

use indexmap::IndexMap;
use stencil_reactive::{Reference, is_const_ref, value_for_ref};

use crate::arguments::CapturedArguments;
use crate::error::Result;
use crate::helper::ModifierDefinition;
use crate::references::{class_list_ref, primitive_ref};
use crate::tree::ElementBuilder;
use crate::value::Value;
use crate::vm::UpdatingOp;

#[derive(Debug, Clone)]
enum AttributeValue {
    Static(Rc<str>),
    Dynamic(Reference<Value>),
}

#[derive(Debug, Clone)]
struct DeferredAttribute {
    value: AttributeValue,
    namespace: Option<Rc<str>>,
    trusting: bool,
}

#[derive(Debug, Default)]
pub struct ComponentElementOperations {
    attributes: IndexMap<Rc<str>, DeferredAttribute>,
    classes: Vec<AttributeValue>,
    modifiers: Vec<(ModifierDefinition, CapturedArguments)>,
}

/// What flushing left for the VM to do
#[derive(Debug, Default)]
pub struct FlushedElement {
    pub updating: Vec<UpdatingOp>,
    pub modifiers: Vec<(ModifierDefinition, CapturedArguments)>,
}

impl ComponentElementOperations {
    pub fn new() -> Self {
        Self::default()
    }

    fn defer(&mut self, name: &str, attribute: DeferredAttribute) {
        if name == "class" {
            self.classes.push(attribute.value);
        } else {
            self.attributes.insert(Rc::from(name), attribute);
        }
    }

    pub fn set_attribute(
        &mut self,
        name: &str,
        reference: Reference<Value>,
        trusting: bool,
        namespace: Option<Rc<str>>,
    ) {
        self.defer(
            name,
            DeferredAttribute {
                value: AttributeValue::Dynamic(reference),
                namespace,
                trusting,
            },
        );
    }

    pub fn set_static_attribute(&mut self, name: &str, value: &str, namespace: Option<Rc<str>>) {
        self.defer(
            name,
            DeferredAttribute {
                value: AttributeValue::Static(Rc::from(value)),
                namespace,
                trusting: false,
            },
        );
    }

    pub fn add_modifier(&mut self, modifier: ModifierDefinition, args: CapturedArguments) {
        self.modifiers.push((modifier, args));
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        if name == "class" {
            return !self.classes.is_empty();
        }
        self.attributes.contains_key(name)
    }

    /// Write every deferred attribute to the element under construction.
    pub fn flush(self, builder: &mut ElementBuilder<'_>) -> Result<FlushedElement> {
        let mut flushed = FlushedElement {
            updating: Vec::new(),
            modifiers: self.modifiers,
        };
        let mut type_attribute = None;
        for (name, attribute) in self.attributes {
            if &*name == "type" {
                type_attribute = Some(attribute);
                continue;
            }
            write_attribute(builder, &name, attribute, &mut flushed.updating)?;
        }
        if let Some(value) = merge_classes(self.classes) {
            let class = DeferredAttribute {
                value,
                namespace: None,
                trusting: false,
            };
            write_attribute(builder, "class", class, &mut flushed.updating)?;
        }
        if let Some(attribute) = type_attribute {
            write_attribute(builder, "type", attribute, &mut flushed.updating)?;
        }
        Ok(flushed)
    }
}

fn merge_classes(classes: Vec<AttributeValue>) -> Option<AttributeValue> {
    match classes.len() {
        0 => None,
        1 => classes.into_iter().next(),
        _ => {
            let statics: Option<Vec<Rc<str>>> = classes
                .iter()
                .map(|class| match class {
                    AttributeValue::Static(value) => Some(value.clone()),
                    AttributeValue::Dynamic(_) => None,
                })
                .collect();
            if let Some(statics) = statics {
                return Some(AttributeValue::Static(Rc::from(statics.join(" "))));
            }
            let parts = classes
                .into_iter()
                .map(|class| match class {
                    AttributeValue::Static(value) => primitive_ref(Value::String(value)),
                    AttributeValue::Dynamic(reference) => reference,
                })
                .collect();
            Some(AttributeValue::Dynamic(class_list_ref(parts)))
        }
    }
}

fn write_attribute(
    builder: &mut ElementBuilder<'_>,
    name: &str,
    attribute: DeferredAttribute,
    updating: &mut Vec<UpdatingOp>,
) -> Result<()> {
    let namespace = attribute.namespace.as_deref();
    match attribute.value {
        AttributeValue::Static(value) => builder.set_static_attribute(name, &value, namespace),
        AttributeValue::Dynamic(reference) => {
            let value = value_for_ref(&reference);
            let id = builder.set_dynamic_attribute(name, &value, attribute.trusting, namespace)?;
            if !is_const_ref(&reference) {
                updating.push(UpdatingOp::UpdateDynamicAttribute {
                    attribute: id,
                    reference,
                    last: value,
                });
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryTree;
    use stencil_reactive::TrackedCell;

    fn flush_into(tree: &mut MemoryTree, operations: ComponentElementOperations) -> FlushedElement {
        let mut builder = ElementBuilder::new(tree);
        builder.open_element("button").unwrap();
        let flushed = operations.flush(&mut builder).unwrap();
        builder.flush_element().unwrap();
        builder.close_element().unwrap();
        flushed
    }

    #[test]
    fn static_classes_are_joined_and_type_goes_last() {
        let mut operations = ComponentElementOperations::new();
        operations.set_static_attribute("type", "submit", None);
        operations.set_static_attribute("class", "btn", None);
        operations.set_static_attribute("id", "save", None);
        operations.set_static_attribute("class", "primary", None);

        let mut tree = MemoryTree::new();
        let flushed = flush_into(&mut tree, operations);
        assert!(flushed.updating.is_empty());
        assert_eq!(
            tree.to_html(),
            r#"<button id="save" class="btn primary" type="submit"></button>"#
        );
    }

    #[test]
    fn dynamic_classes_become_a_tracked_class_list() {
        let cell = Rc::new(TrackedCell::new(Value::from("active")));
        let source = Rc::clone(&cell);
        let mut operations = ComponentElementOperations::new();
        operations.set_static_attribute("class", "btn", None);
        operations.set_attribute("class", Reference::compute(move || source.get()), false, None);

        let mut tree = MemoryTree::new();
        let flushed = flush_into(&mut tree, operations);
        assert_eq!(tree.to_html(), r#"<button class="btn active"></button>"#);
        assert_eq!(flushed.updating.len(), 1);
    }

    #[test]
    fn later_attributes_replace_earlier_ones() {
        let mut operations = ComponentElementOperations::new();
        operations.set_static_attribute("title", "layout", None);
        operations.set_attribute("title", primitive_ref("caller"), false, None);
        assert!(operations.has_attribute("title"));
        assert!(!operations.has_attribute("class"));

        let mut tree = MemoryTree::new();
        let flushed = flush_into(&mut tree, operations);
        assert!(flushed.updating.is_empty());
        assert_eq!(tree.to_html(), r#"<button title="caller"></button>"#);
    }
}
