//! Curried component definitions.
//!
//! A curried definition pairs a component (a concrete definition, a name to
//! resolve later, or another curried definition) with arguments captured at
//! curry time. Nothing is resolved until the final invocation, which walks
//! the chain from the outermost layer inwards.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use stencil_reactive::{Reference, value_for_ref};

use crate::arguments::{CapturedArguments, VmArguments};
use crate::error::Result;
use crate::manager::ComponentDefinition;
use crate::resolver::{RuntimeResolver, resolve_component};
use crate::value::{Owner, Value};

#[derive(Debug, Clone)]
pub enum CurriedInner {
    Definition(ComponentDefinition),
    Curried(CurriedComponentDefinition),
    /// Name resolved with the owner captured when it was curried
    Named { name: Rc<str>, owner: Owner },
}

struct CurriedRecord {
    inner: CurriedInner,
    args: Option<CapturedArguments>,
}

#[derive(Clone)]
pub struct CurriedComponentDefinition(Rc<CurriedRecord>);

impl CurriedComponentDefinition {
    pub fn new(inner: CurriedInner, args: Option<CapturedArguments>) -> Self {
        Self(Rc::new(CurriedRecord { inner, args }))
    }

    pub fn inner(&self) -> &CurriedInner {
        &self.0.inner
    }

    pub fn args(&self) -> Option<&CapturedArguments> {
        self.0.args.as_ref()
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Walk the chain, folding each layer's arguments into `args`, and return
    /// the concrete definition at its end.
    ///
    /// Layers are visited outermost first. Positional arguments of inner
    /// layers end up in front; for named arguments whatever is already in
    /// `args` wins, so invocation arguments beat outer layers and outer
    /// layers beat inner ones.
    pub fn unwrap(&self, resolver: &dyn RuntimeResolver, args: &mut VmArguments) -> Result<ComponentDefinition> {
        let mut current = self.clone();
        loop {
            if let Some(captured) = &current.0.args {
                args.positional.prepend(&captured.positional);
                args.named.merge(&captured.named);
            }
            let next = match &current.0.inner {
                CurriedInner::Definition(definition) => return Ok(definition.clone()),
                CurriedInner::Named { name, owner } => return resolve_component(resolver, name, owner),
                CurriedInner::Curried(curried) => curried.clone(),
            };
            current = next;
        }
    }

    /// Concrete definition and the merged curried arguments
    pub fn resolve(&self, resolver: &dyn RuntimeResolver) -> Result<(ComponentDefinition, CapturedArguments)> {
        let mut args = VmArguments::empty();
        let definition = self.unwrap(resolver, &mut args)?;
        Ok((definition, args.capture()))
    }
}

impl fmt::Debug for CurriedComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurriedComponentDefinition")
            .field("inner", &self.0.inner)
            .field("args", &self.0.args.is_some())
            .finish()
    }
}

/// Apply `args` to `inner`.
///
/// An absent component stays absent. Currying an already curried definition
/// with no arguments hands back the same definition.
pub fn curry(inner: Option<CurriedInner>, args: Option<CapturedArguments>) -> Option<CurriedComponentDefinition> {
    match (inner?, args) {
        (CurriedInner::Curried(curried), None) => Some(curried),
        (inner, args) => Some(CurriedComponentDefinition::new(inner, args)),
    }
}

/// What a runtime value can be curried from; anything else curries to nothing.
pub fn curried_inner_for(value: &Value, owner: &Owner) -> Option<CurriedInner> {
    match value {
        Value::String(name) => Some(CurriedInner::Named {
            name: name.clone(),
            owner: owner.clone(),
        }),
        Value::Component(definition) => Some(CurriedInner::Definition(definition.clone())),
        Value::Curried(curried) => Some(CurriedInner::Curried(curried.clone())),
        _ => None,
    }
}

/// Reference that curries whatever `inner` currently holds.
///
/// A new curried definition is only built when the identity of the inner
/// value changes, so downstream identity checks stay stable across passes.
pub fn create_curry_component_ref(
    inner: Reference<Value>,
    owner: Owner,
    args: Option<CapturedArguments>,
) -> Reference<Value> {
    let last: RefCell<Option<(Value, Value)>> = RefCell::new(None);
    Reference::compute(move || {
        let value = value_for_ref(&inner);
        if let Some((previous, curried)) = &*last.borrow() {
            if previous.same_identity(&value) {
                return curried.clone();
            }
        }
        let curried = match curry(curried_inner_for(&value, &owner), args.clone()) {
            Some(curried) => Value::Curried(curried),
            None => Value::Null,
        };
        *last.borrow_mut() = Some((value, curried.clone()));
        curried
    })
    .labeled("curry")
}
