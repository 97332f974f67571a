//! Compile-time resolution of free variables.
//!
//! The syntactic position of a free variable decides what it may resolve
//! to. That classification travels with the variable as a
//! [`FreeVariableKind`]; the functions here check it and never guess intent
//! from what the resolver happens to return.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{ResolutionError, Result, RuntimeError};
use crate::helper::{HelperDefinition, ModifierDefinition};
use crate::manager::ComponentDefinition;
use crate::resolver::RuntimeResolver;
use crate::value::Owner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FreeVariableKind {
    /// Strict-mode reference; must be in lexical scope
    Strict,
    /// `<Foo />`
    AsComponentHead,
    /// `(foo)`
    AsHelperHead,
    /// `<div {{foo}}>`
    AsModifierHead,
    /// `{{foo bar}}`
    AsComponentOrHelperHead,
    /// `{{foo.bar}}` in a position that may also be a property fallback
    AsHelperHeadOrThisFallback,
    /// `{{foo}}`
    AsComponentOrHelperHeadOrThisFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeVariable {
    pub kind: FreeVariableKind,
    /// Index into the containing template's upvars
    pub upvar: usize,
}

impl FreeVariable {
    pub fn new(kind: FreeVariableKind, upvar: usize) -> Self {
        Self { kind, upvar }
    }
}

/// What the compiler knows about the template a free variable appears in
#[derive(Debug, Clone, Default)]
pub struct ContainingMetadata {
    pub owner: Option<Owner>,
    pub upvars: Option<Vec<Rc<str>>>,
}

impl ContainingMetadata {
    pub fn new(owner: Owner, upvars: impl IntoIterator<Item = impl Into<Rc<str>>>) -> Self {
        Self {
            owner: Some(owner),
            upvars: Some(upvars.into_iter().map(Into::into).collect()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ComponentOrHelper {
    Component(ComponentDefinition),
    Helper(HelperDefinition),
}

/// Result of an optional resolution: a definition or the name as a literal
#[derive(Debug, Clone)]
pub enum OptionalResolution<T> {
    Resolved(T),
    Literal(Rc<str>),
}

fn lookup_context<'m>(
    variable: &FreeVariable,
    expected: FreeVariableKind,
    meta: &'m ContainingMetadata,
) -> Result<(&'m str, &'m Owner)> {
    if variable.kind == FreeVariableKind::Strict {
        return Err(RuntimeError::invariant(
            "strict mode free variables must be resolved from lexical scope",
        ));
    }
    if variable.kind != expected {
        return Err(RuntimeError::invariant(format!(
            "free variable classified as {:?} was resolved as {expected:?}",
            variable.kind
        )));
    }
    let upvars = meta
        .upvars
        .as_ref()
        .ok_or_else(|| RuntimeError::invariant("free variable resolution requires upvars"))?;
    let owner = meta
        .owner
        .as_ref()
        .ok_or_else(|| RuntimeError::invariant("free variable resolution requires an owner"))?;
    let name = upvars.get(variable.upvar).ok_or_else(|| {
        RuntimeError::invariant(format!("upvar {} is out of range", variable.upvar))
    })?;
    Ok((name, owner))
}

fn component_or_helper(resolver: &dyn RuntimeResolver, name: &str, owner: &Owner) -> Option<ComponentOrHelper> {
    if let Some(definition) = resolver.lookup_component(name, owner) {
        return Some(ComponentOrHelper::Component(definition));
    }
    resolver.lookup_helper(name, owner).map(ComponentOrHelper::Helper)
}

pub fn resolve_component_head(
    resolver: &dyn RuntimeResolver,
    meta: &ContainingMetadata,
    variable: &FreeVariable,
) -> Result<ComponentDefinition> {
    let (name, owner) = lookup_context(variable, FreeVariableKind::AsComponentHead, meta)?;
    resolver.lookup_component(name, owner).ok_or_else(|| {
        ResolutionError::ComponentNotFound {
            name: name.to_string(),
        }
        .into()
    })
}

pub fn resolve_helper_head(
    resolver: &dyn RuntimeResolver,
    meta: &ContainingMetadata,
    variable: &FreeVariable,
) -> Result<HelperDefinition> {
    let (name, owner) = lookup_context(variable, FreeVariableKind::AsHelperHead, meta)?;
    resolver.lookup_helper(name, owner).ok_or_else(|| {
        ResolutionError::HelperNotFound {
            name: name.to_string(),
        }
        .into()
    })
}

pub fn resolve_modifier_head(
    resolver: &dyn RuntimeResolver,
    meta: &ContainingMetadata,
    variable: &FreeVariable,
) -> Result<ModifierDefinition> {
    let (name, owner) = lookup_context(variable, FreeVariableKind::AsModifierHead, meta)?;
    resolver.lookup_modifier(name, owner).ok_or_else(|| {
        ResolutionError::ModifierNotFound {
            name: name.to_string(),
        }
        .into()
    })
}

/// Component first, then helper
pub fn resolve_component_or_helper_head(
    resolver: &dyn RuntimeResolver,
    meta: &ContainingMetadata,
    variable: &FreeVariable,
) -> Result<ComponentOrHelper> {
    let (name, owner) = lookup_context(variable, FreeVariableKind::AsComponentOrHelperHead, meta)?;
    component_or_helper(resolver, name, owner).ok_or_else(|| {
        ResolutionError::ComponentOrHelperNotFound {
            name: name.to_string(),
        }
        .into()
    })
}

pub fn resolve_optional_helper(
    resolver: &dyn RuntimeResolver,
    meta: &ContainingMetadata,
    variable: &FreeVariable,
) -> Result<OptionalResolution<HelperDefinition>> {
    let (name, owner) = lookup_context(variable, FreeVariableKind::AsHelperHeadOrThisFallback, meta)?;
    Ok(match resolver.lookup_helper(name, owner) {
        Some(helper) => OptionalResolution::Resolved(helper),
        None => OptionalResolution::Literal(Rc::from(name)),
    })
}

pub fn resolve_optional_component_or_helper(
    resolver: &dyn RuntimeResolver,
    meta: &ContainingMetadata,
    variable: &FreeVariable,
) -> Result<OptionalResolution<ComponentOrHelper>> {
    let (name, owner) = lookup_context(
        variable,
        FreeVariableKind::AsComponentOrHelperHeadOrThisFallback,
        meta,
    )?;
    Ok(match component_or_helper(resolver, name, owner) {
        Some(found) => OptionalResolution::Resolved(found),
        None => OptionalResolution::Literal(Rc::from(name)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::references::primitive_ref;
    use crate::resolver::ResolverRegistry;

    fn meta() -> ContainingMetadata {
        ContainingMetadata::new(Owner::new("app"), ["format", "missing"])
    }

    fn registry() -> ResolverRegistry {
        let mut registry = ResolverRegistry::new();
        registry.register_helper("format", HelperDefinition::new("format", |_| primitive_ref("x")));
        registry
    }

    #[test]
    fn optional_resolution_falls_back_to_a_literal() {
        let variable = FreeVariable::new(FreeVariableKind::AsComponentOrHelperHeadOrThisFallback, 1);
        match resolve_optional_component_or_helper(&registry(), &meta(), &variable).unwrap() {
            OptionalResolution::Literal(name) => assert_eq!(&*name, "missing"),
            OptionalResolution::Resolved(_) => panic!("nothing is registered as `missing`"),
        }
    }

    #[test]
    fn ambiguous_heads_fall_through_to_helpers() {
        let variable = FreeVariable::new(FreeVariableKind::AsComponentOrHelperHead, 0);
        let found = resolve_component_or_helper_head(&registry(), &meta(), &variable).unwrap();
        assert!(matches!(found, ComponentOrHelper::Helper(_)));
    }

    #[test]
    fn strict_variables_are_rejected() {
        let variable = FreeVariable::new(FreeVariableKind::Strict, 0);
        let err = resolve_helper_head(&registry(), &meta(), &variable).unwrap_err();
        assert!(matches!(err, RuntimeError::InvariantViolation(_)));
    }

    #[test]
    fn mismatched_classification_is_an_invariant_violation() {
        let variable = FreeVariable::new(FreeVariableKind::AsModifierHead, 0);
        let err = resolve_helper_head(&registry(), &meta(), &variable).unwrap_err();
        assert!(matches!(err, RuntimeError::InvariantViolation(_)));
    }

    #[test]
    fn strict_positions_fail_instead_of_falling_back() {
        let variable = FreeVariable::new(FreeVariableKind::AsComponentOrHelperHead, 1);
        let err = resolve_component_or_helper_head(&registry(), &meta(), &variable).unwrap_err();
        assert!(err.is_resolution());
    }

    #[test]
    fn resolution_needs_an_owner() {
        let variable = FreeVariable::new(FreeVariableKind::AsHelperHead, 0);
        let err = resolve_helper_head(&registry(), &ContainingMetadata::default(), &variable).unwrap_err();
        assert!(matches!(err, RuntimeError::InvariantViolation(_)));
    }
}
