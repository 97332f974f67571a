//! Rerendering writes only what changed back into the tree.

mod common;

use std::rc::Rc;

use common::*;
use stencil_reactive::{Reference, value_for_ref};
use stencil_runtime::testing::{ScriptedDefinition, ScriptedManager};
use stencil_runtime::{
    CapabilityFlags, ComponentCapabilities, ComponentDefinition, ComponentManager, CreateRequest, Expr, Invocation,
    ObjectValue, ProgramBuilder, ProgramSymbolTable, ResolverRegistry, Template, Value,
};

#[test]
fn text_and_attributes_update_in_place() {
    let mut builder = ProgramBuilder::new();
    let root = root_layout(&mut builder, |layout| {
        layout
            .open_element("p")
            .static_attr("class", "note")
            .dynamic_attr("title", Expr::this().get("title"))
            .flush_element()
            .append(Expr::this().get("name"))
            .close_element();
    });
    let program = builder.build();

    let state = host_state([("title", Value::from("a")), ("name", Value::from("x"))]);
    let mut harness = Harness::new(ResolverRegistry::new());
    let mut result = harness.render(&program, &root, &state).expect("render succeeds");
    assert_eq!(harness.html(), r#"<p class="note" title="a">x</p>"#);

    state.set("title", Value::from("b"));
    harness.rerender(&program, &mut result);
    assert_eq!(harness.html(), r#"<p class="note" title="b">x</p>"#);
    assert_eq!(harness.tree.attribute_updates(), 1);
    assert_eq!(harness.tree.text_updates(), 0);

    state.set("name", Value::from("y"));
    harness.rerender(&program, &mut result);
    assert_eq!(harness.html(), r#"<p class="note" title="b">y</p>"#);
    assert_eq!(harness.tree.attribute_updates(), 1);
    assert_eq!(harness.tree.text_updates(), 1);

    state.set("title", Value::Null);
    harness.rerender(&program, &mut result);
    assert_eq!(harness.html(), r#"<p class="note">y</p>"#);
}

#[test]
fn writing_an_equal_value_leaves_the_tree_alone() {
    let mut builder = ProgramBuilder::new();
    let root = root_layout(&mut builder, |layout| {
        layout.append(Expr::this().get("name"));
    });
    let program = builder.build();

    let state = host_state([("name", Value::from("x"))]);
    let mut harness = Harness::new(ResolverRegistry::new());
    let mut result = harness.render(&program, &root, &state).expect("render succeeds");

    state.set("name", Value::from("x"));
    harness.rerender(&program, &mut result);
    assert_eq!(harness.tree.text_updates(), 0);
    assert_eq!(harness.html(), "x");
}

#[test]
fn constant_content_records_no_updating_ops() {
    let mut builder = ProgramBuilder::new();
    let root = root_layout(&mut builder, |layout| {
        layout
            .open_element("b")
            .dynamic_attr("id", Expr::value("fixed"))
            .flush_element()
            .append(Expr::value(3))
            .close_element();
    });
    let program = builder.build();

    let mut harness = Harness::new(ResolverRegistry::new());
    let result = harness
        .render(&program, &root, &empty_state())
        .expect("render succeeds");
    assert_eq!(harness.html(), r#"<b id="fixed">3</b>"#);
    assert!(result.updating_ops().is_empty());
}

#[test]
fn lists_render_their_items_joined_by_commas() {
    let mut builder = ProgramBuilder::new();
    let root = root_layout(&mut builder, |layout| {
        layout.append(Expr::this().get("items"));
    });
    let program = builder.build();

    let state = host_state([("items", Value::list([Value::from(1), Value::from("two"), Value::from(3)]))]);
    let mut harness = Harness::new(ResolverRegistry::new());
    let mut result = harness.render(&program, &root, &state).expect("render succeeds");
    assert_eq!(harness.html(), "1,two,3");

    state.set("items", Value::list([Value::from(4)]));
    harness.rerender(&program, &mut result);
    assert_eq!(harness.html(), "4");
}

#[test]
fn yielded_blocks_see_their_parameters_and_the_callers_scope() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let layout = builder
        .layout(ProgramSymbolTable::new(["&default"]), |layout| {
            layout
                .text("[")
                .yield_to("default", vec![Expr::value("hi")])
                .text("]");
        })
        .expect("layout compiles");
    let mut registry = ResolverRegistry::new();
    let wrapper = registry.register_component(
        "wrapper",
        ComponentDefinition::new(
            ScriptedManager::<CREATE>::new(&log),
            ScriptedDefinition::new("Wrapper", layout),
        ),
    );
    let root = root_layout(&mut builder, |layout| {
        let block = layout.block(&["item"], |block| {
            block.append(Expr::var("item"));
            block.text(":");
            block.append(Expr::this().get("suffix"));
        });
        layout.invoke_static(wrapper, Invocation::default().block("default", block));
    });
    let program = builder.build();

    let state = host_state([("suffix", Value::from("x"))]);
    let mut harness = Harness::new(registry);
    let mut result = harness.render(&program, &root, &state).expect("render succeeds");
    assert_eq!(harness.html(), "[hi:x]");

    state.set("suffix", Value::from("z"));
    let stats = harness.rerender(&program, &mut result);
    assert_eq!(stats.skipped_groups, 0);
    assert_eq!(harness.html(), "[hi:z]");
}

#[test]
fn missing_blocks_yield_nothing() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let layout = builder
        .layout(ProgramSymbolTable::new(["&default"]), |layout| {
            layout.text("<").yield_to("default", Vec::new()).text(">");
        })
        .expect("layout compiles");
    let mut registry = ResolverRegistry::new();
    let wrapper = registry.register_component(
        "wrapper",
        ComponentDefinition::new(
            ScriptedManager::<CREATE>::new(&log),
            ScriptedDefinition::new("Wrapper", layout),
        ),
    );
    let root = root_layout(&mut builder, |layout| {
        layout.invoke_static(wrapper, Invocation::default());
    });
    let program = builder.build();

    let mut harness = Harness::new(registry);
    harness
        .render(&program, &root, &empty_state())
        .expect("render succeeds");
    assert_eq!(harness.html(), "<>");
}

/// Reads `theme` from the dynamic scope at creation
struct ThemeReader;

impl ComponentManager for ThemeReader {
    type Definition = Template;
    type Instance = Rc<ObjectValue>;

    const CAPABILITIES: ComponentCapabilities = ComponentCapabilities::from_flags(CapabilityFlags::from_bits_retain(
        CREATE | DYNAMIC_SCOPE,
    ));

    fn debug_name(&self, _definition: &Template) -> String {
        "ThemeReader".to_string()
    }

    fn create(&self, _definition: &Template, request: CreateRequest<'_>) -> Rc<ObjectValue> {
        let theme = request
            .dynamic_scope
            .and_then(|scope| scope.get("theme"))
            .map(|reference| value_for_ref(&reference))
            .unwrap_or_default();
        Rc::new(ObjectValue::with_fields([("theme", theme)]))
    }

    fn get_self(&self, instance: Option<&Rc<ObjectValue>>) -> Reference<Value> {
        match instance {
            Some(this) => Reference::constant(Value::Object(Rc::clone(this))),
            None => Reference::constant(Value::Undefined),
        }
    }

    fn get_static_layout(&self, definition: &Template) -> Option<Template> {
        Some(definition.clone())
    }
}

#[test]
fn dynamic_variables_are_scoped_to_their_block() {
    let mut builder = ProgramBuilder::new();
    let layout = root_layout(&mut builder, |layout| {
        layout.append(Expr::this().get("theme"));
    });
    let mut registry = ResolverRegistry::new();
    let reader = registry.register_component(
        "reader",
        ComponentDefinition::new(Rc::new(ThemeReader), Template::new(layout)),
    );
    let root = root_layout(&mut builder, |layout| {
        layout.with_dynamic_vars(vec![("theme", Expr::this().get("theme"))], |layout| {
            layout.invoke_static(reader, Invocation::default());
        });
        layout.text("|");
        layout.invoke_static(reader, Invocation::default());
    });
    let program = builder.build();

    let state = host_state([("theme", Value::from("dark"))]);
    let mut harness = Harness::new(registry);
    harness.render(&program, &root, &state).expect("render succeeds");
    assert_eq!(harness.html(), "dark|");
}
