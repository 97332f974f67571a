//! Render entry points.
//!
//! [`render_main`] renders a compiled layout against a `this` reference;
//! [`render_component`] invokes a component definition through the
//! program's main routine. Both run inside a transaction and hand back a
//! [`RenderResult`] that can rerender or tear the output down.

use stencil_reactive::Reference;

use crate::arguments::CapturedArguments;
use crate::destroyables::DestroyableId;
use crate::environment::{Environment, in_transaction};
use crate::error::Result;
use crate::instance::InstanceDefinition;
use crate::layout::CompiledLayout;
use crate::program::Program;
use crate::resolver::RuntimeResolver;
use crate::scope::{DynamicScope, Scope};
use crate::tree::{Bounds, TreeConstruction};
use crate::value::Value;
use crate::vm::{RerenderStats, StackValue, UpdatingOp, UpdatingVm, Vm};

/// Output of one render and what it needs to update later
#[derive(Debug)]
pub struct RenderResult {
    updating: Vec<UpdatingOp>,
    root: DestroyableId,
    bounds: Bounds,
}

impl RenderResult {
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn root(&self) -> DestroyableId {
        self.root
    }

    pub fn updating_ops(&self) -> &[UpdatingOp] {
        &self.updating
    }

    /// Bring the output up to date with every reference it read. Blocks
    /// whose component changed are rendered again from `program`.
    pub fn rerender(
        &mut self,
        env: &mut Environment,
        program: &Program,
        resolver: &dyn RuntimeResolver,
        tree: &mut dyn TreeConstruction,
    ) -> Result<RerenderStats> {
        let Self { updating, bounds, .. } = self;
        in_transaction(env, |env| UpdatingVm::new(program, resolver, env, tree).execute(updating, bounds))
    }

    /// Destroy everything this render created and remove its output.
    pub fn destroy(self, env: &mut Environment, tree: &mut dyn TreeConstruction) -> Result<()> {
        let root = self.root;
        in_transaction(env, |env| env.destroy(root))?;
        tree.remove(&self.bounds);
        Ok(())
    }
}

pub fn render_main(
    env: &mut Environment,
    program: &Program,
    resolver: &dyn RuntimeResolver,
    tree: &mut dyn TreeConstruction,
    layout: &CompiledLayout,
    self_ref: Reference<Value>,
    dynamic_scope: DynamicScope,
) -> Result<RenderResult> {
    let scope = Scope::root(self_ref, layout.symbol_table.scope_size());
    run(env, program, resolver, tree, dynamic_scope, layout.handle, |vm| {
        vm.push_scope(scope);
    })
}

/// Invoke `definition` with `args` as the root component.
pub fn render_component(
    env: &mut Environment,
    program: &Program,
    resolver: &dyn RuntimeResolver,
    tree: &mut dyn TreeConstruction,
    definition: InstanceDefinition,
    args: CapturedArguments,
    dynamic_scope: DynamicScope,
) -> Result<RenderResult> {
    run(env, program, resolver, tree, dynamic_scope, program.main(), |vm| {
        vm.push_scope(Scope::sized(1));
        vm.push(StackValue::Definition(definition));
        vm.push(StackValue::Captured(args));
    })
}

fn run(
    env: &mut Environment,
    program: &Program,
    resolver: &dyn RuntimeResolver,
    tree: &mut dyn TreeConstruction,
    dynamic_scope: DynamicScope,
    handle: u32,
    setup: impl FnOnce(&mut Vm<'_>),
) -> Result<RenderResult> {
    in_transaction(env, |env| {
        let root = env.destructors_mut().create_root();
        let outcome = {
            let mut vm = Vm::new(program, env, resolver, tree, root, dynamic_scope);
            setup(&mut vm);
            vm.execute(handle)
        };
        match outcome {
            Ok((updating, bounds)) => {
                log::debug!("rendered {} updating ops", updating.len());
                Ok(RenderResult { updating, root, bounds })
            }
            Err(error) => {
                // The transaction is discarded, so no hook ever sees these.
                env.destructors_mut().destroy(root)?;
                Err(error)
            }
        }
    })
}
