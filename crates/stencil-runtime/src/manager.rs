//! Component managers.
//!
//! Hosts implement [`ComponentManager`] with their own definition and
//! instance types. [`ComponentDefinition::new`] wraps the manager in an
//! adapter that erases those types, so the VM only ever talks to
//! [`InternalComponentManager`]. In checked builds the adapter refuses any
//! hook call the manager's capabilities do not cover.

use std::fmt;
use std::rc::Rc;

use stencil_reactive::Reference;

use crate::arguments::{CapturedArguments, PreparedArguments, VmArguments};
use crate::capabilities::{CapabilityFlags, ComponentCapabilities, capability_flags_from};
use crate::checks::require_capability;
use crate::element_operations::ComponentElementOperations;
use crate::error::Result;
use crate::layout::Template;
use crate::references::undefined_ref;
use crate::render_tree::CustomRenderNode;
use crate::resolver::RuntimeResolver;
use crate::scope::DynamicScope;
use crate::state::{DefinitionState, InstanceState};
use crate::tree::{Bounds, NodeId};
use crate::value::Value;

/// Everything `create` may receive. Each field is only populated when the
/// matching capability is declared.
#[derive(Debug, Clone, Copy)]
pub struct CreateRequest<'a> {
    pub args: Option<&'a VmArguments>,
    pub dynamic_scope: Option<&'a DynamicScope>,
    pub caller: Option<&'a Reference<Value>>,
    pub has_default_block: bool,
}

/// Teardown hooks for an instance. `will_destroy` runs before every
/// `destroy` of the same pass.
pub struct Destroyable {
    will_destroy: Option<Box<dyn FnOnce()>>,
    destroy: Box<dyn FnOnce()>,
}

impl Destroyable {
    pub fn new(destroy: impl FnOnce() + 'static) -> Self {
        Self {
            will_destroy: None,
            destroy: Box::new(destroy),
        }
    }

    pub fn with_will_destroy(mut self, will_destroy: impl FnOnce() + 'static) -> Self {
        self.will_destroy = Some(Box::new(will_destroy));
        self
    }

    pub fn has_will_destroy(&self) -> bool {
        self.will_destroy.is_some()
    }

    pub(crate) fn into_hooks(self) -> (Option<Box<dyn FnOnce()>>, Box<dyn FnOnce()>) {
        (self.will_destroy, self.destroy)
    }
}

impl fmt::Debug for Destroyable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destroyable")
            .field("will_destroy", &self.will_destroy.is_some())
            .finish()
    }
}

/// Host-implemented lifecycle of a family of components.
///
/// Only the hooks covered by [`CAPABILITIES`](Self::CAPABILITIES) are ever
/// called; the defaults describe a template-only component.
pub trait ComponentManager: 'static {
    type Definition: 'static;
    type Instance: 'static;

    const CAPABILITIES: ComponentCapabilities;

    fn debug_name(&self, definition: &Self::Definition) -> String;

    fn prepare_args(&self, _definition: &Self::Definition, _args: &VmArguments) -> Option<PreparedArguments> {
        None
    }

    fn create(&self, definition: &Self::Definition, request: CreateRequest<'_>) -> Self::Instance;

    fn update(&self, _instance: &mut Self::Instance, _dynamic_scope: Option<&DynamicScope>) {}

    fn did_create(&self, _instance: &mut Self::Instance) {}

    fn did_update(&self, _instance: &mut Self::Instance) {}

    fn did_render_layout(&self, _instance: &mut Self::Instance, _bounds: &Bounds) {}

    fn did_update_layout(&self, _instance: &mut Self::Instance, _bounds: &Bounds) {}

    fn did_create_element(
        &self,
        _instance: &mut Self::Instance,
        _element: NodeId,
        _operations: &mut ComponentElementOperations,
    ) {
    }

    fn get_self(&self, _instance: Option<&Self::Instance>) -> Reference<Value> {
        undefined_ref()
    }

    fn get_tag_name(&self, _instance: Option<&Self::Instance>) -> Option<String> {
        None
    }

    fn get_static_layout(&self, _definition: &Self::Definition) -> Option<Template> {
        None
    }

    fn get_dynamic_layout(
        &self,
        _instance: Option<&Self::Instance>,
        _resolver: &dyn RuntimeResolver,
    ) -> Option<Template> {
        None
    }

    fn get_destroyable(&self, _instance: &Self::Instance) -> Option<Destroyable> {
        None
    }

    fn get_debug_custom_render_tree(
        &self,
        _definition: &Self::Definition,
        _instance: Option<&Self::Instance>,
        _args: &CapturedArguments,
    ) -> Option<Vec<CustomRenderNode>> {
        None
    }
}

/// Type-erased manager interface the VM calls
pub trait InternalComponentManager {
    fn capabilities(&self) -> ComponentCapabilities;
    fn debug_name(&self, definition: &DefinitionState) -> Result<String>;
    fn prepare_args(&self, definition: &DefinitionState, args: &VmArguments) -> Result<Option<PreparedArguments>>;
    fn create(&self, definition: &DefinitionState, request: CreateRequest<'_>) -> Result<InstanceState>;
    fn update(&self, instance: &InstanceState, dynamic_scope: Option<&DynamicScope>) -> Result<()>;
    fn did_create(&self, instance: &InstanceState) -> Result<()>;
    fn did_update(&self, instance: &InstanceState) -> Result<()>;
    fn did_render_layout(&self, instance: &InstanceState, bounds: &Bounds) -> Result<()>;
    fn did_update_layout(&self, instance: &InstanceState, bounds: &Bounds) -> Result<()>;
    fn did_create_element(
        &self,
        instance: &InstanceState,
        element: NodeId,
        operations: &mut ComponentElementOperations,
    ) -> Result<()>;
    fn get_self(&self, instance: Option<&InstanceState>) -> Result<Reference<Value>>;
    fn get_tag_name(&self, instance: Option<&InstanceState>) -> Result<Option<String>>;
    fn get_static_layout(&self, definition: &DefinitionState) -> Result<Option<Template>>;
    fn get_dynamic_layout(
        &self,
        instance: Option<&InstanceState>,
        resolver: &dyn RuntimeResolver,
    ) -> Result<Option<Template>>;
    fn get_destroyable(&self, instance: &InstanceState) -> Result<Option<Destroyable>>;
    fn get_debug_custom_render_tree(
        &self,
        definition: &DefinitionState,
        instance: Option<&InstanceState>,
        args: &CapturedArguments,
    ) -> Result<Option<Vec<CustomRenderNode>>>;
}

struct ManagerAdapter<M> {
    manager: Rc<M>,
    flags: CapabilityFlags,
}

impl<M: ComponentManager> ManagerAdapter<M> {
    fn new(manager: Rc<M>) -> Self {
        Self {
            manager,
            flags: capability_flags_from(&M::CAPABILITIES),
        }
    }

    fn require(&self, capability: CapabilityFlags, hook: &'static str) -> Result<()> {
        require_capability(self.flags, capability, hook)
    }

    fn with_optional<R>(
        &self,
        instance: Option<&InstanceState>,
        f: impl FnOnce(Option<&M::Instance>) -> R,
    ) -> Result<R> {
        match instance {
            Some(state) => state.with(|instance: &M::Instance| f(Some(instance))),
            None => Ok(f(None)),
        }
    }
}

impl<M: ComponentManager> InternalComponentManager for ManagerAdapter<M> {
    fn capabilities(&self) -> ComponentCapabilities {
        M::CAPABILITIES
    }

    fn debug_name(&self, definition: &DefinitionState) -> Result<String> {
        Ok(self.manager.debug_name(definition.downcast::<M::Definition>()?))
    }

    fn prepare_args(&self, definition: &DefinitionState, args: &VmArguments) -> Result<Option<PreparedArguments>> {
        self.require(CapabilityFlags::PREPARE_ARGS, "prepare_args")?;
        Ok(self.manager.prepare_args(definition.downcast::<M::Definition>()?, args))
    }

    fn create(&self, definition: &DefinitionState, request: CreateRequest<'_>) -> Result<InstanceState> {
        self.require(CapabilityFlags::CREATE_INSTANCE, "create")?;
        let definition = definition.downcast::<M::Definition>()?;
        Ok(InstanceState::new(self.manager.create(definition, request)))
    }

    fn update(&self, instance: &InstanceState, dynamic_scope: Option<&DynamicScope>) -> Result<()> {
        self.require(CapabilityFlags::UPDATE_HOOK, "update")?;
        instance.with_mut(|instance: &mut M::Instance| self.manager.update(instance, dynamic_scope))
    }

    fn did_create(&self, instance: &InstanceState) -> Result<()> {
        self.require(CapabilityFlags::CREATE_INSTANCE, "did_create")?;
        instance.with_mut(|instance: &mut M::Instance| self.manager.did_create(instance))
    }

    fn did_update(&self, instance: &InstanceState) -> Result<()> {
        self.require(CapabilityFlags::UPDATE_HOOK, "did_update")?;
        instance.with_mut(|instance: &mut M::Instance| self.manager.did_update(instance))
    }

    fn did_render_layout(&self, instance: &InstanceState, bounds: &Bounds) -> Result<()> {
        self.require(CapabilityFlags::CREATE_INSTANCE, "did_render_layout")?;
        instance.with_mut(|instance: &mut M::Instance| self.manager.did_render_layout(instance, bounds))
    }

    fn did_update_layout(&self, instance: &InstanceState, bounds: &Bounds) -> Result<()> {
        self.require(CapabilityFlags::UPDATE_HOOK, "did_update_layout")?;
        instance.with_mut(|instance: &mut M::Instance| self.manager.did_update_layout(instance, bounds))
    }

    fn did_create_element(
        &self,
        instance: &InstanceState,
        element: NodeId,
        operations: &mut ComponentElementOperations,
    ) -> Result<()> {
        self.require(CapabilityFlags::ELEMENT_HOOK, "did_create_element")?;
        instance.with_mut(|instance: &mut M::Instance| {
            self.manager.did_create_element(instance, element, operations)
        })
    }

    fn get_self(&self, instance: Option<&InstanceState>) -> Result<Reference<Value>> {
        self.with_optional(instance, |instance| self.manager.get_self(instance))
    }

    fn get_tag_name(&self, instance: Option<&InstanceState>) -> Result<Option<String>> {
        self.require(CapabilityFlags::DYNAMIC_TAG, "get_tag_name")?;
        self.with_optional(instance, |instance| self.manager.get_tag_name(instance))
    }

    fn get_static_layout(&self, definition: &DefinitionState) -> Result<Option<Template>> {
        Ok(self.manager.get_static_layout(definition.downcast::<M::Definition>()?))
    }

    fn get_dynamic_layout(
        &self,
        instance: Option<&InstanceState>,
        resolver: &dyn RuntimeResolver,
    ) -> Result<Option<Template>> {
        self.require(CapabilityFlags::DYNAMIC_LAYOUT, "get_dynamic_layout")?;
        self.with_optional(instance, |instance| self.manager.get_dynamic_layout(instance, resolver))
    }

    fn get_destroyable(&self, instance: &InstanceState) -> Result<Option<Destroyable>> {
        instance.with(|instance: &M::Instance| self.manager.get_destroyable(instance))
    }

    fn get_debug_custom_render_tree(
        &self,
        definition: &DefinitionState,
        instance: Option<&InstanceState>,
        args: &CapturedArguments,
    ) -> Result<Option<Vec<CustomRenderNode>>> {
        let definition = definition.downcast::<M::Definition>()?;
        self.with_optional(instance, |instance| {
            self.manager.get_debug_custom_render_tree(definition, instance, args)
        })
    }
}

struct DefinitionRecord {
    name: String,
    manager: Rc<dyn InternalComponentManager>,
    state: DefinitionState,
    capabilities: CapabilityFlags,
}

/// A resolved component: manager, definition state and folded capabilities
#[derive(Clone)]
pub struct ComponentDefinition(Rc<DefinitionRecord>);

impl ComponentDefinition {
    pub fn new<M: ComponentManager>(manager: Rc<M>, definition: M::Definition) -> Self {
        let name = manager.debug_name(&definition);
        let adapter = ManagerAdapter::new(manager);
        let capabilities = adapter.flags;
        Self(Rc::new(DefinitionRecord {
            name,
            manager: Rc::new(adapter),
            state: DefinitionState::new(definition),
            capabilities,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn manager(&self) -> &Rc<dyn InternalComponentManager> {
        &self.0.manager
    }

    pub fn state(&self) -> &DefinitionState {
        &self.0.state
    }

    pub fn capabilities(&self) -> CapabilityFlags {
        self.0.capabilities
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.0.name)
            .field("capabilities", &self.0.capabilities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::checks_enabled;
    use crate::error::RuntimeError;
    use crate::layout::{CompiledLayout, ProgramSymbolTable};

    struct Counter;

    struct CounterDefinition {
        name: &'static str,
    }

    #[derive(Default)]
    struct CounterInstance {
        updates: u32,
    }

    impl ComponentManager for Counter {
        type Definition = CounterDefinition;
        type Instance = CounterInstance;

        const CAPABILITIES: ComponentCapabilities = ComponentCapabilities {
            create_instance: true,
            ..ComponentCapabilities::NONE
        };

        fn debug_name(&self, definition: &CounterDefinition) -> String {
            definition.name.to_string()
        }

        fn create(&self, _definition: &CounterDefinition, _request: CreateRequest<'_>) -> CounterInstance {
            CounterInstance::default()
        }

        fn update(&self, instance: &mut CounterInstance, _dynamic_scope: Option<&DynamicScope>) {
            instance.updates += 1;
        }

        fn get_static_layout(&self, _definition: &CounterDefinition) -> Option<Template> {
            Some(Template::new(CompiledLayout::new(0, ProgramSymbolTable::default())))
        }
    }

    fn request() -> CreateRequest<'static> {
        CreateRequest {
            args: None,
            dynamic_scope: None,
            caller: None,
            has_default_block: false,
        }
    }

    #[test]
    fn definition_folds_capabilities_once() {
        let definition = ComponentDefinition::new(Rc::new(Counter), CounterDefinition { name: "counter" });
        assert_eq!(definition.name(), "counter");
        assert_eq!(definition.capabilities(), CapabilityFlags::CREATE_INSTANCE);
        assert!(definition.manager().get_static_layout(definition.state()).unwrap().is_some());
    }

    #[test]
    fn undeclared_hooks_are_capability_violations() {
        let definition = ComponentDefinition::new(Rc::new(Counter), CounterDefinition { name: "counter" });
        let instance = definition.manager().create(definition.state(), request()).unwrap();

        let result = definition.manager().update(&instance, None);
        if checks_enabled() {
            assert!(matches!(
                result,
                Err(RuntimeError::CapabilityViolation { hook: "update", .. })
            ));
        } else {
            assert!(result.is_ok());
        }
    }

    #[test]
    fn destroyable_exposes_its_hooks() {
        let destroyable = Destroyable::new(|| {}).with_will_destroy(|| {});
        assert!(destroyable.has_will_destroy());
        let (will_destroy, _destroy) = destroyable.into_hooks();
        assert!(will_destroy.is_some());
    }
}
