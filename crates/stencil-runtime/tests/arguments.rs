//! Argument preparation by the manager, and the name-keyed lookup of
//! layouts compiled with eval.

mod common;

use std::rc::Rc;

use common::*;
use stencil_runtime::testing::{ScriptedDefinition, ScriptedManager};
use stencil_runtime::{
    Args, ComponentDefinition, Expr, Invocation, PreparedArguments, ProgramBuilder, ProgramSymbolTable,
    ResolverRegistry, Value,
};

type Preparing = ScriptedManager<{ CREATE | CREATE_ARGS | PREPARE_ARGS }>;

#[test]
fn prepare_args_returning_none_keeps_the_invocation_arguments() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let layout = echo_layout(&mut builder, &["a"]);
    let definition = ScriptedDefinition::new("P", layout).with_prepare_args(|_| None);
    let mut registry = ResolverRegistry::new();
    let p = registry.register_component("p", ComponentDefinition::new(Preparing::new(&log), definition));
    let root = root_layout(&mut builder, |layout| {
        layout.invoke_static(p, Invocation::new(Args::new().named("a", Expr::this().get("a"))));
    });
    let program = builder.build();

    let state = host_state([("a", Value::from(1))]);
    let mut harness = Harness::new(registry);
    harness.render(&program, &root, &state).expect("render succeeds");

    assert_eq!(harness.html(), "1");
    assert_eq!(
        entries(&log),
        vec!["prepare_args P keep", "create P a=1", "did_render_layout P", "did_create P"]
    );
}

#[test]
fn prepare_args_can_rewrite_positional_into_named() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let layout = echo_layout(&mut builder, &["a"]);
    let definition = ScriptedDefinition::new("P", layout).with_prepare_args(|args| {
        Some(PreparedArguments {
            positional: Vec::new(),
            named: vec![(Rc::from("a"), args.positional.at(0))],
        })
    });
    let mut registry = ResolverRegistry::new();
    let p = registry.register_component("p", ComponentDefinition::new(Preparing::new(&log), definition));
    let root = root_layout(&mut builder, |layout| {
        layout.invoke_static(
            p,
            Invocation::new(
                Args::new()
                    .positional(Expr::this().get("v"))
                    .named("a", Expr::value("dropped")),
            ),
        );
    });
    let program = builder.build();

    let state = host_state([("v", Value::from("first"))]);
    let mut harness = Harness::new(registry);
    let mut result = harness.render(&program, &root, &state).expect("render succeeds");
    assert_eq!(harness.html(), "first");
    assert_eq!(&entries(&log)[..2], ["prepare_args P rewrite", "create P a=first"]);

    // the rewritten argument still tracks the positional expression
    state.set("v", Value::from("second"));
    harness.rerender(&program, &mut result);
    assert_eq!(harness.html(), "second");
}

#[test]
fn prepare_args_is_skipped_without_the_capability() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let layout = echo_layout(&mut builder, &["a"]);
    let definition = ScriptedDefinition::new("P", layout).with_prepare_args(|_| Some(PreparedArguments::default()));
    let mut registry = ResolverRegistry::new();
    let p = registry.register_component(
        "p",
        ComponentDefinition::new(ScriptedManager::<{ CREATE | CREATE_ARGS }>::new(&log), definition),
    );
    let root = root_layout(&mut builder, |layout| {
        layout.invoke_static(p, Invocation::new(Args::new().named("a", Expr::value(7))));
    });
    let program = builder.build();

    let mut harness = Harness::new(registry);
    harness
        .render(&program, &root, &empty_state())
        .expect("render succeeds");
    assert_eq!(harness.html(), "7");
    assert_eq!(entries(&log)[0], "create P a=7");
}

#[test]
fn eval_layouts_see_every_named_argument_by_name() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let layout = builder
        .layout(ProgramSymbolTable::new(["@shown"]).with_eval(), |layout| {
            layout
                .append(Expr::var("@shown"))
                .text("|")
                .append(Expr::lookup("@shown"))
                .text("|")
                .append(Expr::lookup("@hidden"))
                .text("|")
                .append(Expr::lookup("@absent"));
        })
        .expect("layout compiles");
    let mut registry = ResolverRegistry::new();
    let e = registry.register_component(
        "e",
        ComponentDefinition::new(
            ScriptedManager::<{ CREATE | CREATE_ARGS }>::new(&log),
            ScriptedDefinition::new("E", layout),
        ),
    );
    let root = root_layout(&mut builder, |layout| {
        layout.invoke_static(
            e,
            Invocation::new(
                Args::new()
                    .named("shown", Expr::value("s"))
                    .named("hidden", Expr::this().get("hidden")),
            ),
        );
    });
    let program = builder.build();

    let state = host_state([("hidden", Value::from("h"))]);
    let mut harness = Harness::new(registry);
    let mut result = harness.render(&program, &root, &state).expect("render succeeds");
    assert_eq!(harness.html(), "s|s|h|");

    // a name without a symbol is still a live reference
    state.set("hidden", Value::from("h2"));
    harness.rerender(&program, &mut result);
    assert_eq!(harness.html(), "s|s|h2|");
}

#[test]
fn layouts_without_eval_have_no_lookup() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let layout = builder
        .layout(ProgramSymbolTable::new(["@shown"]), |layout| {
            layout.append(Expr::var("@shown")).text("|").append(Expr::lookup("@shown"));
        })
        .expect("layout compiles");
    let mut registry = ResolverRegistry::new();
    let e = registry.register_component(
        "e",
        ComponentDefinition::new(
            ScriptedManager::<{ CREATE | CREATE_ARGS }>::new(&log),
            ScriptedDefinition::new("E", layout),
        ),
    );
    let root = root_layout(&mut builder, |layout| {
        layout.invoke_static(e, Invocation::new(Args::new().named("shown", Expr::value("s"))));
    });
    let program = builder.build();

    let mut harness = Harness::new(registry);
    harness
        .render(&program, &root, &empty_state())
        .expect("render succeeds");
    assert_eq!(harness.html(), "s|");
}
