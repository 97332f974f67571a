//! Lifecycle hooks are deferred to the end of the transaction. Siblings
//! commit in the order they were created; children commit before the
//! component that rendered them.

mod common;

use common::*;
use stencil_runtime::testing::{ScriptedDefinition, ScriptedManager};
use stencil_runtime::{
    Args, ComponentDefinition, Expr, Invocation, ProgramBuilder, ProgramSymbolTable, ResolverRegistry, Value,
};

type Lifecycle = ScriptedManager<{ CREATE | UPDATE | WILL_DESTROY }>;

fn count_invocation(expr: Expr) -> Invocation {
    Invocation::new(Args::new().named("count", expr))
}

#[test]
fn sibling_hooks_run_in_creation_order() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let mut registry = ResolverRegistry::new();
    let mut handles = Vec::new();
    for name in ["A", "B"] {
        let layout = echo_layout(&mut builder, &["count"]);
        handles.push(registry.register_component(
            name,
            ComponentDefinition::new(
                Lifecycle::new(&log),
                ScriptedDefinition::new(name, layout).with_will_destroy(),
            ),
        ));
    }
    let root = root_layout(&mut builder, |layout| {
        layout.invoke_static(handles[0], count_invocation(Expr::this().get("count")));
        layout.text(" ");
        layout.invoke_static(handles[1], count_invocation(Expr::this().get("count")));
    });
    let program = builder.build();

    let state = host_state([("count", Value::from(1))]);
    let mut harness = Harness::new(registry);
    let mut result = harness.render(&program, &root, &state).expect("render succeeds");
    assert_eq!(harness.html(), "1 1");
    assert_eq!(
        drain(&log),
        vec![
            "create A -",
            "did_render_layout A",
            "create B -",
            "did_render_layout B",
            "did_create A",
            "did_create B",
        ]
    );

    state.set("count", Value::from(2));
    harness.rerender(&program, &mut result);
    assert_eq!(harness.html(), "2 2");
    assert_eq!(
        drain(&log),
        vec![
            "update A",
            "did_update_layout A",
            "update B",
            "did_update_layout B",
            "did_update A",
            "did_update B",
        ]
    );

    result
        .destroy(&mut harness.env, &mut harness.tree)
        .expect("destroy succeeds");
    assert_eq!(
        drain(&log),
        vec!["will_destroy A", "will_destroy B", "destroy A", "destroy B"]
    );
    assert_eq!(harness.html(), "");
    assert_eq!(harness.env.destructors().live_count(), 0);
    assert!(!harness.env.in_transaction());
}

#[test]
fn children_commit_before_their_parent() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let mut registry = ResolverRegistry::new();

    let child_layout = echo_layout(&mut builder, &["count"]);
    let child = registry.register_component(
        "child",
        ComponentDefinition::new(
            Lifecycle::new(&log),
            ScriptedDefinition::new("C", child_layout).with_will_destroy(),
        ),
    );
    let parent_layout = builder
        .layout(ProgramSymbolTable::new(["@count"]), |layout| {
            layout.append(Expr::var("@count"));
            layout.text("/");
            layout.invoke_static(child, count_invocation(Expr::var("@count")));
        })
        .expect("parent layout compiles");
    let parent = registry.register_component(
        "parent",
        ComponentDefinition::new(
            Lifecycle::new(&log),
            ScriptedDefinition::new("P", parent_layout).with_will_destroy(),
        ),
    );
    let root = root_layout(&mut builder, |layout| {
        layout.invoke_static(parent, count_invocation(Expr::this().get("count")));
    });
    let program = builder.build();

    let state = host_state([("count", Value::from(1))]);
    let mut harness = Harness::new(registry);
    let mut result = harness.render(&program, &root, &state).expect("render succeeds");
    assert_eq!(harness.html(), "1/1");
    assert_eq!(
        drain(&log),
        vec![
            "create P -",
            "create C -",
            "did_render_layout C",
            "did_render_layout P",
            "did_create C",
            "did_create P",
        ]
    );

    state.set("count", Value::from(5));
    let stats = harness.rerender(&program, &mut result);
    assert_eq!(stats.skipped_groups, 0);
    assert_eq!(harness.html(), "5/5");
    assert_eq!(
        drain(&log),
        vec![
            "update P",
            "update C",
            "did_update_layout C",
            "did_update_layout P",
            "did_update C",
            "did_update P",
        ]
    );

    result
        .destroy(&mut harness.env, &mut harness.tree)
        .expect("destroy succeeds");
    assert_eq!(
        drain(&log),
        vec!["will_destroy C", "will_destroy P", "destroy C", "destroy P"]
    );
    assert_eq!(harness.html(), "");
}

#[test]
fn unchanged_rerender_skips_the_outer_group() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let mut registry = ResolverRegistry::new();
    let layout = echo_layout(&mut builder, &["count"]);
    let a = registry.register_component(
        "a",
        ComponentDefinition::new(Lifecycle::new(&log), ScriptedDefinition::new("A", layout)),
    );
    let root = root_layout(&mut builder, |layout| {
        layout.invoke_static(a, count_invocation(Expr::this().get("count")));
    });
    let program = builder.build();

    let state = host_state([("count", Value::from(1))]);
    let mut harness = Harness::new(registry);
    let mut result = harness.render(&program, &root, &state).expect("render succeeds");
    drain(&log);

    state.set("other", Value::from(1));
    let stats = harness.rerender(&program, &mut result);
    assert_eq!(stats.skipped_groups, 1);
    assert_eq!(stats.evaluated, 1);
    assert!(entries(&log).is_empty());
}
