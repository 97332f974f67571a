//! Layouts that name components, helpers and modifiers by free variable
//! resolve them while the layout is built.

mod common;

use common::*;
use stencil_runtime::references::primitive_ref;
use stencil_runtime::resolution::{ContainingMetadata, FreeVariable, FreeVariableKind};
use stencil_runtime::testing::{CallLog, RecordingModifier, ScriptedDefinition, ScriptedManager};
use stencil_runtime::{
    Args, ComponentDefinition, Expr, HelperDefinition, Invocation, ModifierDefinition, Owner, ProgramBuilder,
    ProgramSymbolTable, ResolverRegistry, Value,
};

fn meta() -> ContainingMetadata {
    ContainingMetadata::new(Owner::new("app"), ["card", "shout", "title", "record", "missing"])
}

fn registry(builder: &mut ProgramBuilder, log: &CallLog) -> ResolverRegistry {
    let layout = echo_layout(builder, &["title"]);
    let mut registry = ResolverRegistry::new();
    registry.register_owned_component(
        &Owner::new("app"),
        "card",
        ComponentDefinition::new(
            ScriptedManager::<{ CREATE | CREATE_ARGS }>::new(log),
            ScriptedDefinition::new("Card", layout),
        ),
    );
    registry.register_helper("shout", HelperDefinition::new("shout", |_| primitive_ref("!")));
    registry.register_modifier("record", ModifierDefinition::new("record", RecordingModifier::new(log)));
    registry
}

#[test]
fn component_heads_invoke_the_owner_registration() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let mut registry = registry(&mut builder, &log);
    let card = FreeVariable::new(FreeVariableKind::AsComponentHead, 0);
    let root = root_layout(&mut builder, |layout| {
        layout.invoke_head(
            &mut registry,
            &meta(),
            &card,
            Invocation::new(Args::new().named("title", Expr::value("hi"))),
        );
    });
    let program = builder.build();

    let mut harness = Harness::new(registry);
    harness
        .render(&program, &root, &empty_state())
        .expect("render succeeds");
    assert_eq!(harness.html(), "hi");
    assert_eq!(entries(&log)[0], "create Card title=hi");
}

#[test]
fn appended_heads_pick_a_component_a_helper_or_the_property() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let mut registry = registry(&mut builder, &log);
    let fallback = FreeVariableKind::AsComponentOrHelperHeadOrThisFallback;
    let root = root_layout(&mut builder, |layout| {
        let meta = meta();
        layout
            .append_head(
                &mut registry,
                &meta,
                &FreeVariable::new(FreeVariableKind::AsComponentOrHelperHead, 0),
                Args::new().named("title", Expr::value("card")),
            )
            .text("|")
            .append_head(&mut registry, &meta, &FreeVariable::new(fallback, 1), Args::new())
            .text("|")
            .append_head(&mut registry, &meta, &FreeVariable::new(fallback, 2), Args::new());
    });
    let program = builder.build();

    let state = host_state([("title", Value::from("from this"))]);
    let mut harness = Harness::new(registry);
    let mut result = harness.render(&program, &root, &state).expect("render succeeds");
    assert_eq!(harness.html(), "card|!|from this");

    state.set("title", Value::from("changed"));
    harness.rerender(&program, &mut result);
    assert_eq!(harness.html(), "card|!|changed");
}

#[test]
fn modifier_heads_install_the_resolved_modifier() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let mut registry = registry(&mut builder, &log);
    let record = FreeVariable::new(FreeVariableKind::AsModifierHead, 3);
    let root = root_layout(&mut builder, |layout| {
        layout
            .open_element("div")
            .modifier_head(&mut registry, &meta(), &record, Args::new().positional(Expr::value("x")))
            .flush_element()
            .close_element();
    });
    let program = builder.build();

    let mut harness = Harness::new(registry);
    harness
        .render(&program, &root, &empty_state())
        .expect("render succeeds");
    assert_eq!(harness.html(), "<div></div>");
    assert_eq!(entries(&log), vec!["install 1 x"]);
}

#[test]
fn a_missing_component_head_fails_the_layout() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let mut registry = registry(&mut builder, &log);
    let missing = FreeVariable::new(FreeVariableKind::AsComponentHead, 4);
    let err = builder
        .layout(ProgramSymbolTable::default(), |layout| {
            layout.invoke_head(&mut registry, &meta(), &missing, Invocation::default());
        })
        .unwrap_err();
    assert!(err.is_resolution());
}

#[test]
fn heads_used_in_the_wrong_position_are_rejected() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let mut registry = registry(&mut builder, &log);
    let card_as_modifier = FreeVariable::new(FreeVariableKind::AsComponentHead, 0);
    let err = builder
        .layout(ProgramSymbolTable::default(), |layout| {
            layout.modifier_head(&mut registry, &meta(), &card_as_modifier, Args::new());
        })
        .unwrap_err();
    assert!(!err.is_resolution());
}
