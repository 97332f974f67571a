//! Component invocation opcodes.
//!
//! An invocation pushes its instance into `S0` and walks it through
//! resolution, argument preparation, creation, layout lookup and rendering.
//! Every hook call is gated on the definition's capabilities.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use stencil_reactive::{
    Reference, Revision, Tag, begin_track_frame, consume_tag, end_track_frame, is_const_ref, untrack, value_for_ref,
    value_for_tag,
};

use super::{Frame, FrameKind, StackValue, UpdatingOp, Vm};
use crate::arguments::{BlockArguments, NamedArguments, PositionalArguments, VmArguments};
use crate::capabilities::CapabilityFlags;
use crate::checks::require_capability;
use crate::curry::create_curry_component_ref;
use crate::error::{Result, RuntimeError};
use crate::instance::{ComponentInstance, InstanceDefinition};
use crate::manager::CreateRequest;
use crate::program::Register;
use crate::references::{null_ref, primitive_ref};
use crate::render_tree::{CustomRenderNode, RenderNode, RenderNodeType};
use crate::resolver::{resolve_component, resolve_component_handle};
use crate::scope::{Scope, ScopeSlot};
use crate::value::Value;

impl Vm<'_> {
    pub(super) fn curry_component(&mut self, owner: u32) -> Result<()> {
        let captured = self.pop_captured()?;
        let inner = self.pop_ref()?;
        let owner = self.program.constants().get_owner(owner)?.clone();
        let args = (!captured.is_empty()).then_some(captured);
        self.push(StackValue::Ref(create_curry_component_ref(inner, owner, args)));
        Ok(())
    }

    pub(super) fn push_component_definition(&mut self, handle: u32) -> Result<()> {
        let definition = resolve_component_handle(self.resolver, handle)?;
        let instance = ComponentInstance::new(InstanceDefinition::Concrete(definition));
        self.push(StackValue::Instance(instance.into_ref()));
        Ok(())
    }

    /// Resolve a component-valued reference. Later passes reset the
    /// enclosing block when the reference stops holding this value.
    pub(super) fn resolve_dynamic_component(&mut self, owner: u32) -> Result<()> {
        let reference = self.pop_ref()?;
        let value = self.assert_same(reference);
        let definition = match value {
            Value::String(name) => {
                let owner = self.program.constants().get_owner(owner)?;
                InstanceDefinition::Concrete(resolve_component(self.resolver, &name, owner)?)
            }
            other => definition_from_value(other)?,
        };
        self.push(StackValue::Definition(definition));
        Ok(())
    }

    pub(super) fn resolve_curried_component(&mut self) -> Result<()> {
        let reference = self.pop_ref()?;
        let value = self.assert_same(reference);
        let definition = definition_from_value(value)?;
        self.push(StackValue::Definition(definition));
        Ok(())
    }

    fn assert_same(&mut self, reference: Reference<Value>) -> Value {
        let value = value_for_ref(&reference);
        if !is_const_ref(&reference) {
            self.updating.push(UpdatingOp::AssertSame {
                reference,
                last: value.clone(),
            });
        }
        value
    }

    pub(super) fn push_dynamic_component_instance(&mut self) -> Result<()> {
        let definition = self.pop_definition()?;
        let instance = ComponentInstance::new(definition);
        self.push(StackValue::Instance(instance.into_ref()));
        Ok(())
    }

    pub(super) fn push_args(&mut self, names: &[Rc<str>], block_names: &[Rc<str>], positional: u32) -> Result<()> {
        let mut blocks = Vec::with_capacity(block_names.len());
        for name in block_names.iter().rev() {
            blocks.push((name.clone(), self.pop_block()?));
        }
        blocks.reverse();

        let mut named = Vec::with_capacity(names.len());
        for name in names.iter().rev() {
            named.push((name.clone(), self.pop_ref()?));
        }
        named.reverse();

        let mut refs = Vec::with_capacity(positional as usize);
        for _ in 0..positional {
            refs.push(self.pop_ref()?);
        }
        refs.reverse();

        self.push(StackValue::Args(VmArguments::new(
            PositionalArguments::new(refs),
            NamedArguments::new(named),
            BlockArguments::new(blocks),
        )));
        Ok(())
    }

    /// Unwrap a curried instance into its definition and let the manager
    /// rewrite the arguments. Nothing is bound when resolution fails.
    pub(super) fn prepare_args(&mut self) -> Result<()> {
        let instance = self.instance()?;
        let mut args = self.pop_args()?;
        {
            let mut instance = instance.borrow_mut();
            if let InstanceDefinition::Curried(curried) = instance.definition().clone() {
                let definition = curried.unwrap(self.resolver, &mut args)?;
                instance.resolve(definition)?;
            }
            if instance.has(CapabilityFlags::PREPARE_ARGS) {
                let definition = instance.concrete_definition()?;
                if let Some(prepared) = definition.manager().prepare_args(definition.state(), &args)? {
                    args.rewrite(prepared);
                }
            }
        }
        self.push(StackValue::Args(args));
        Ok(())
    }

    /// Open a cache group: a guard patched on commit, then a tracking frame.
    pub(super) fn begin_component_transaction(&mut self) {
        let guard = self.updating.len();
        self.updating.push(UpdatingOp::JumpIfNotModified {
            tag: Tag::constant(),
            snapshot: Revision::CONSTANT,
            target: guard,
        });
        self.updating.push(UpdatingOp::BeginTrackFrame);
        begin_track_frame();
        self.cache_groups.push(guard);
    }

    pub(super) fn commit_component_transaction(&mut self) -> Result<()> {
        let guard = self
            .cache_groups
            .pop()
            .ok_or_else(|| RuntimeError::invariant("commit without a component transaction"))?;
        let tag = end_track_frame()?;
        consume_tag(&tag);
        self.updating.push(UpdatingOp::EndTrackFrame { guard });
        let target = self.updating.len();
        let snapshot = value_for_tag(&tag);
        self.updating[guard] = UpdatingOp::JumpIfNotModified { tag, snapshot, target };
        Ok(())
    }

    pub(super) fn create_component(&mut self, has_default_block: bool) -> Result<()> {
        let instance_ref = self.instance()?;
        let args = self.peek_args()?.clone();
        let parent = self.destroyable()?;
        let id = self.env.destructors_mut().create_child(parent)?;
        self.env
            .destructors_mut()
            .adopt_instance(id, Rc::clone(&instance_ref))?;
        self.destroyables.push(id);

        let mut instance = instance_ref.borrow_mut();
        instance.set_destroyable(id);
        let capabilities = instance.capabilities();
        let definition = instance.concrete_definition()?.clone();

        let dynamic_scope = if capabilities.contains(CapabilityFlags::DYNAMIC_SCOPE) {
            Some(self.dynamic_scope()?.clone())
        } else {
            None
        };
        let caller = if capabilities.contains(CapabilityFlags::CREATE_CALLER) {
            Some(self.scope()?.self_ref())
        } else {
            None
        };
        let create_args = capabilities.contains(CapabilityFlags::CREATE_ARGS);
        if create_args {
            args.consume();
        }
        instance.set_args(args.capture());

        if !capabilities.contains(CapabilityFlags::CREATE_INSTANCE) {
            return Ok(());
        }
        let manager = Rc::clone(definition.manager());
        let state = manager.create(
            definition.state(),
            CreateRequest {
                args: create_args.then_some(&args),
                dynamic_scope: dynamic_scope.as_ref(),
                caller: caller.as_ref(),
                has_default_block,
            },
        )?;
        instance.set_state(state.clone())?;
        log::debug!("created component {}", definition.name());

        if capabilities.contains(CapabilityFlags::UPDATE_HOOK) {
            self.updating.push(UpdatingOp::UpdateComponent {
                manager,
                state,
                dynamic_scope,
                args: create_args.then(|| args.capture()),
            });
        }
        Ok(())
    }

    pub(super) fn register_component_destructor(&mut self) -> Result<()> {
        let instance = self.instance()?;
        let instance = instance.borrow();
        let Some(state) = instance.state() else {
            return Ok(());
        };
        let Some(destroyable) = instance.manager()?.get_destroyable(state)? else {
            return Ok(());
        };
        if destroyable.has_will_destroy() {
            require_capability(instance.capabilities(), CapabilityFlags::WILL_DESTROY, "will_destroy")?;
        }
        let id = instance
            .destroyable()
            .ok_or_else(|| RuntimeError::invariant("component was never created"))?;
        self.env.destructors_mut().associate(id, destroyable)
    }

    pub(super) fn did_create_element(&mut self) -> Result<()> {
        let instance = self.instance()?;
        let instance = instance.borrow();
        if !instance.has(CapabilityFlags::ELEMENT_HOOK) {
            return Ok(());
        }
        let Some(state) = instance.state() else {
            return Ok(());
        };
        let element = self.builder.require_constructing()?;
        let manager = instance.manager()?;
        let operations = self.component_operations()?;
        manager.did_create_element(state, element, operations)
    }

    pub(super) fn get_component_self(&mut self) -> Result<()> {
        let instance = self.instance()?;
        let reference = {
            let instance = instance.borrow();
            instance.manager()?.get_self(instance.state())?
        };
        self.push(StackValue::Ref(reference));
        Ok(())
    }

    pub(super) fn get_component_tag_name(&mut self) -> Result<()> {
        let instance = self.instance()?;
        let tag_name = {
            let instance = instance.borrow();
            if instance.has(CapabilityFlags::DYNAMIC_TAG) {
                instance.manager()?.get_tag_name(instance.state())?
            } else {
                None
            }
        };
        let reference = match tag_name {
            Some(tag_name) => primitive_ref(tag_name),
            None => null_ref(),
        };
        self.push(StackValue::Ref(reference));
        Ok(())
    }

    pub(super) fn get_component_layout(&mut self) -> Result<()> {
        let instance = self.instance()?;
        let layout = {
            let instance = instance.borrow();
            let definition = instance.concrete_definition()?;
            let manager = definition.manager();
            let template = if instance.has(CapabilityFlags::DYNAMIC_LAYOUT) {
                manager.get_dynamic_layout(instance.state(), self.resolver)?
            } else {
                manager.get_static_layout(definition.state())?
            };
            let template = template.ok_or_else(|| {
                RuntimeError::invariant(format!("component `{}` has no layout", definition.name()))
            })?;
            if instance.has(CapabilityFlags::WRAPPED) {
                template.as_wrapped_layout().cloned().ok_or_else(|| {
                    RuntimeError::invariant(format!("component `{}` has no wrapped layout", definition.name()))
                })?
            } else {
                template.as_layout().clone()
            }
        };
        self.push(StackValue::Invocation(layout));
        Ok(())
    }

    /// Entry of the main routine: the host pushed a definition and its
    /// captured arguments.
    pub(super) fn main(&mut self) -> Result<()> {
        let captured = self.pop_captured()?;
        let definition = self.pop_definition()?;
        let instance = ComponentInstance::new(definition).into_ref();
        self.registers[Register::S0.index()] = StackValue::Instance(instance);
        self.push(StackValue::Args(VmArguments::from_captured(&captured)));
        Ok(())
    }

    pub(super) fn populate_layout(&mut self) -> Result<()> {
        let layout = self.pop_invocation()?;
        let handle = layout.handle;
        let instance = self.instance()?;
        let mut instance = instance.borrow_mut();
        instance.populate_layout(layout)?;

        let Some(render_tree) = self.env.debug_render_tree().cloned() else {
            return Ok(());
        };
        let definition = instance.concrete_definition()?.clone();
        let manager = Rc::clone(definition.manager());
        let args = instance.args().cloned().unwrap_or_default();
        let nodes = match manager.get_debug_custom_render_tree(definition.state(), instance.state(), &args)? {
            Some(nodes) => nodes,
            None => {
                let self_ref = manager.get_self(instance.state())?;
                vec![CustomRenderNode {
                    bucket: instance.bucket(),
                    node: RenderNode {
                        kind: RenderNodeType::Component,
                        name: definition.name().to_string(),
                        args,
                        template: Some(handle),
                        instance: untrack(|| value_for_ref(&self_ref)),
                    },
                }]
            }
        };
        for CustomRenderNode { bucket, node } in nodes {
            render_tree.create(bucket, node);
            instance.add_render_bucket(bucket);
            self.updating.push(UpdatingOp::DebugRenderTreeUpdate { bucket });
        }
        Ok(())
    }

    pub(super) fn virtual_root_scope(&mut self) -> Result<()> {
        let self_ref = self.pop_ref()?;
        let size = self.instance()?.borrow().layout()?.symbol_table.scope_size();
        self.scopes.push(Scope::root(self_ref, size));
        Ok(())
    }

    pub(super) fn setup_for_eval(&mut self) -> Result<()> {
        let instance = self.instance()?;
        let mut instance = instance.borrow_mut();
        if !instance.layout()?.symbol_table.has_eval {
            return Ok(());
        }
        let lookup = Rc::new(RefCell::new(FxHashMap::default()));
        self.scope()?.bind_eval_scope(Rc::clone(&lookup));
        instance.set_lookup(lookup);
        Ok(())
    }

    /// Bind each named argument to its `@name` slot, and into the eval
    /// lookup when the layout has one.
    pub(super) fn set_named_variables(&mut self) -> Result<()> {
        let (symbols, lookup) = {
            let instance = self.instance()?;
            let instance = instance.borrow();
            (instance.layout()?.symbol_table.clone(), instance.lookup().cloned())
        };
        let scope = self.scope()?.clone();
        let args = self.peek_args()?;
        for (name, reference) in args.named.iter() {
            let symbol = format!("@{name}");
            if let Some(lookup) = &lookup {
                lookup
                    .borrow_mut()
                    .insert(Rc::from(symbol.as_str()), ScopeSlot::Ref(reference.clone()));
            }
            if let Some(slot) = symbols.slot(&symbol) {
                scope.bind_symbol(slot, reference.clone())?;
            }
        }
        Ok(())
    }

    pub(super) fn set_blocks(&mut self) -> Result<()> {
        let (symbols, lookup) = {
            let instance = self.instance()?;
            let instance = instance.borrow();
            (instance.layout()?.symbol_table.clone(), instance.lookup().cloned())
        };
        let scope = self.scope()?.clone();
        let args = self.peek_args()?;
        for (name, block) in args.blocks.iter() {
            let symbol = format!("&{name}");
            if let Some(lookup) = &lookup {
                lookup
                    .borrow_mut()
                    .insert(Rc::from(symbol.as_str()), ScopeSlot::Block(block.clone()));
            }
            if let Some(slot) = symbols.slot(&symbol) {
                scope.bind_block(slot, block.clone())?;
            }
        }
        Ok(())
    }

    pub(super) fn invoke_component_layout(&mut self) -> Result<()> {
        let handle = self.instance()?.borrow().layout()?.handle;
        self.builder.push_block();
        self.frames.push(Frame {
            ra: self.pc,
            kind: FrameKind::Layout,
        });
        self.pc = handle as usize;
        Ok(())
    }

    pub(super) fn did_render_layout(&mut self) -> Result<()> {
        let bounds = self.builder.pop_block()?;
        let instance = self.instance()?;
        let instance = instance.borrow();
        if let Some(state) = instance.state() {
            let manager = instance.manager()?;
            manager.did_render_layout(state, &bounds)?;
            // queued after the layout rendered, so children commit first
            self.env.did_create(Rc::clone(&manager), state.clone())?;
            if instance.has(CapabilityFlags::UPDATE_HOOK) {
                self.updating.push(UpdatingOp::DidUpdateLayout {
                    manager,
                    state: state.clone(),
                    bounds,
                });
            }
        }
        if let Some(render_tree) = self.env.debug_render_tree().cloned() {
            for &bucket in instance.render_buckets() {
                render_tree.did_render(bucket, &bounds);
                self.updating.push(UpdatingOp::DebugRenderTreeDidRender { bucket, bounds });
            }
        }
        self.destroyables
            .pop()
            .ok_or_else(|| RuntimeError::invariant("destroyable stack underflow"))?;
        Ok(())
    }
}

fn definition_from_value(value: Value) -> Result<InstanceDefinition> {
    match value {
        Value::Component(definition) => Ok(InstanceDefinition::Concrete(definition)),
        Value::Curried(curried) => Ok(InstanceDefinition::Curried(curried)),
        other => Err(RuntimeError::invariant(format!(
            "expected a component definition, found {}",
            other.type_name()
        ))),
    }
}
