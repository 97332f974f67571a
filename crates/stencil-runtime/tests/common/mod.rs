//! Shared fixtures for the scenario tests.

#![allow(dead_code)]

use std::rc::Rc;

use stencil_reactive::Reference;
use stencil_runtime::program::LayoutBuilder;
use stencil_runtime::testing::{CallLog, MemoryTree};
use stencil_runtime::{
    CapabilityFlags, CompiledLayout, DynamicScope, Environment, ObjectValue, Program, ProgramBuilder,
    ProgramSymbolTable, RenderResult, ResolverRegistry, Value, render_main,
};

pub const CREATE: u32 = CapabilityFlags::CREATE_INSTANCE.bits();
pub const CREATE_ARGS: u32 = CapabilityFlags::CREATE_ARGS.bits();
pub const UPDATE: u32 = CapabilityFlags::UPDATE_HOOK.bits();
pub const DYNAMIC_SCOPE: u32 = CapabilityFlags::DYNAMIC_SCOPE.bits();
pub const WILL_DESTROY: u32 = CapabilityFlags::WILL_DESTROY.bits();
pub const ELEMENT_HOOK: u32 = CapabilityFlags::ELEMENT_HOOK.bits();
pub const DYNAMIC_TAG: u32 = CapabilityFlags::DYNAMIC_TAG.bits();
pub const PREPARE_ARGS: u32 = CapabilityFlags::PREPARE_ARGS.bits();

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn new_log() -> CallLog {
    CallLog::default()
}

pub fn entries(log: &CallLog) -> Vec<String> {
    log.borrow().clone()
}

/// Take everything logged so far
pub fn drain(log: &CallLog) -> Vec<String> {
    std::mem::take(&mut *log.borrow_mut())
}

/// Layout appending each of `args` as text, separated by spaces
pub fn echo_layout(builder: &mut ProgramBuilder, args: &[&str]) -> CompiledLayout {
    let symbols: Vec<String> = args.iter().map(|name| format!("@{name}")).collect();
    builder
        .layout(ProgramSymbolTable::new(symbols.iter().map(String::as_str)), |layout| {
            for (index, name) in args.iter().enumerate() {
                if index > 0 {
                    layout.text(" ");
                }
                layout.append(stencil_runtime::Expr::var(&format!("@{name}")));
            }
        })
        .expect("echo layout compiles")
}

pub fn root_layout(builder: &mut ProgramBuilder, body: impl FnOnce(&mut LayoutBuilder<'_>)) -> CompiledLayout {
    builder
        .layout(ProgramSymbolTable::default(), body)
        .expect("root layout compiles")
}

/// Host state exposed to the root layout as `this`
pub fn host_state(fields: impl IntoIterator<Item = (&'static str, Value)>) -> Rc<ObjectValue> {
    Rc::new(ObjectValue::with_fields(fields))
}

pub fn empty_state() -> Rc<ObjectValue> {
    Rc::new(ObjectValue::new())
}

pub struct Harness {
    pub env: Environment,
    pub registry: ResolverRegistry,
    pub tree: MemoryTree,
}

impl Harness {
    pub fn new(registry: ResolverRegistry) -> Self {
        Self::with_env(Environment::default(), registry)
    }

    pub fn with_env(env: Environment, registry: ResolverRegistry) -> Self {
        init_logging();
        Self {
            env,
            registry,
            tree: MemoryTree::new(),
        }
    }

    pub fn render(
        &mut self,
        program: &Program,
        layout: &CompiledLayout,
        state: &Rc<ObjectValue>,
    ) -> stencil_runtime::Result<RenderResult> {
        render_main(
            &mut self.env,
            program,
            &self.registry,
            &mut self.tree,
            layout,
            Reference::constant(Value::Object(Rc::clone(state))),
            DynamicScope::new(),
        )
    }

    pub fn rerender(&mut self, program: &Program, result: &mut RenderResult) -> stencil_runtime::vm::RerenderStats {
        result
            .rerender(&mut self.env, program, &self.registry, &mut self.tree)
            .expect("rerender succeeds")
    }

    pub fn html(&self) -> String {
        self.tree.to_html()
    }
}
