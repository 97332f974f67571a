//! Resolver protocol.
//!
//! The host maps names to definitions, scoped by an [`Owner`], and maps the
//! numeric handles a compiled program carries back to values.

use rustc_hash::FxHashMap;

use crate::error::{ResolutionError, Result};
use crate::helper::{HelperDefinition, ModifierDefinition};
use crate::manager::ComponentDefinition;
use crate::value::{Owner, Value};

/// Anything a handle can stand for
#[derive(Debug, Clone)]
pub enum ResolvedValue {
    Component(ComponentDefinition),
    Helper(HelperDefinition),
    Modifier(ModifierDefinition),
    Owner(Owner),
    Value(Value),
}

impl ResolvedValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Component(_) => "component",
            Self::Helper(_) => "helper",
            Self::Modifier(_) => "modifier",
            Self::Owner(_) => "owner",
            Self::Value(_) => "value",
        }
    }
}

pub trait RuntimeResolver {
    fn lookup_component(&self, name: &str, owner: &Owner) -> Option<ComponentDefinition>;
    fn lookup_helper(&self, name: &str, owner: &Owner) -> Option<HelperDefinition>;
    fn lookup_modifier(&self, name: &str, owner: &Owner) -> Option<ModifierDefinition>;
    fn resolve(&self, handle: u32) -> Option<ResolvedValue>;
}

/// Resolver that can also hand out handles while a program is being built
pub trait CompileTimeResolver: RuntimeResolver {
    fn register(&mut self, value: ResolvedValue) -> u32;
}

pub fn resolve_handle(resolver: &dyn RuntimeResolver, handle: u32) -> Result<ResolvedValue> {
    resolver
        .resolve(handle)
        .ok_or_else(|| ResolutionError::UnknownHandle(handle).into())
}

fn unexpected(handle: u32, expected: &'static str, found: &ResolvedValue) -> ResolutionError {
    ResolutionError::UnexpectedHandleKind {
        handle,
        expected,
        found: found.kind_name(),
    }
}

pub fn resolve_component_handle(resolver: &dyn RuntimeResolver, handle: u32) -> Result<ComponentDefinition> {
    match resolve_handle(resolver, handle)? {
        ResolvedValue::Component(definition) => Ok(definition),
        other => Err(unexpected(handle, "component", &other).into()),
    }
}

pub fn resolve_helper_handle(resolver: &dyn RuntimeResolver, handle: u32) -> Result<HelperDefinition> {
    match resolve_handle(resolver, handle)? {
        ResolvedValue::Helper(helper) => Ok(helper),
        other => Err(unexpected(handle, "helper", &other).into()),
    }
}

pub fn resolve_modifier_handle(resolver: &dyn RuntimeResolver, handle: u32) -> Result<ModifierDefinition> {
    match resolve_handle(resolver, handle)? {
        ResolvedValue::Modifier(modifier) => Ok(modifier),
        other => Err(unexpected(handle, "modifier", &other).into()),
    }
}

pub fn resolve_owner_handle(resolver: &dyn RuntimeResolver, handle: u32) -> Result<Owner> {
    match resolve_handle(resolver, handle)? {
        ResolvedValue::Owner(owner) => Ok(owner),
        other => Err(unexpected(handle, "owner", &other).into()),
    }
}

/// Look up a component by name, failing when nothing is registered.
pub fn resolve_component(resolver: &dyn RuntimeResolver, name: &str, owner: &Owner) -> Result<ComponentDefinition> {
    resolver.lookup_component(name, owner).ok_or_else(|| {
        ResolutionError::ComponentNotFound {
            name: name.to_string(),
        }
        .into()
    })
}

type NameKey = (Option<Owner>, String);

/// Map-backed resolver. Owned registrations shadow global ones.
#[derive(Debug, Default)]
pub struct ResolverRegistry {
    components: FxHashMap<NameKey, ComponentDefinition>,
    helpers: FxHashMap<NameKey, HelperDefinition>,
    modifiers: FxHashMap<NameKey, ModifierDefinition>,
    handles: Vec<ResolvedValue>,
}

fn lookup<T: Clone>(map: &FxHashMap<NameKey, T>, name: &str, owner: &Owner) -> Option<T> {
    map.get(&(Some(owner.clone()), name.to_string()))
        .or_else(|| map.get(&(None, name.to_string())))
        .cloned()
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_component(&mut self, name: &str, definition: ComponentDefinition) -> u32 {
        self.components.insert((None, name.to_string()), definition.clone());
        self.register(ResolvedValue::Component(definition))
    }

    pub fn register_owned_component(&mut self, owner: &Owner, name: &str, definition: ComponentDefinition) -> u32 {
        self.components
            .insert((Some(owner.clone()), name.to_string()), definition.clone());
        self.register(ResolvedValue::Component(definition))
    }

    pub fn register_helper(&mut self, name: &str, helper: HelperDefinition) -> u32 {
        self.helpers.insert((None, name.to_string()), helper.clone());
        self.register(ResolvedValue::Helper(helper))
    }

    pub fn register_owned_helper(&mut self, owner: &Owner, name: &str, helper: HelperDefinition) -> u32 {
        self.helpers.insert((Some(owner.clone()), name.to_string()), helper.clone());
        self.register(ResolvedValue::Helper(helper))
    }

    pub fn register_modifier(&mut self, name: &str, modifier: ModifierDefinition) -> u32 {
        self.modifiers.insert((None, name.to_string()), modifier.clone());
        self.register(ResolvedValue::Modifier(modifier))
    }

    pub fn register_owned_modifier(&mut self, owner: &Owner, name: &str, modifier: ModifierDefinition) -> u32 {
        self.modifiers
            .insert((Some(owner.clone()), name.to_string()), modifier.clone());
        self.register(ResolvedValue::Modifier(modifier))
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }
}

impl RuntimeResolver for ResolverRegistry {
    fn lookup_component(&self, name: &str, owner: &Owner) -> Option<ComponentDefinition> {
        lookup(&self.components, name, owner)
    }

    fn lookup_helper(&self, name: &str, owner: &Owner) -> Option<HelperDefinition> {
        lookup(&self.helpers, name, owner)
    }

    fn lookup_modifier(&self, name: &str, owner: &Owner) -> Option<ModifierDefinition> {
        lookup(&self.modifiers, name, owner)
    }

    fn resolve(&self, handle: u32) -> Option<ResolvedValue> {
        self.handles.get(handle as usize).cloned()
    }
}

impl CompileTimeResolver for ResolverRegistry {
    fn register(&mut self, value: ResolvedValue) -> u32 {
        self.handles.push(value);
        self.handles.len() as u32 - 1
    }
}
