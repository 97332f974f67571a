//! Helper and modifier definitions.

use std::fmt;
use std::rc::Rc;

use stencil_reactive::Reference;

use crate::arguments::CapturedArguments;
use crate::error::Result;
use crate::state::ModifierState;
use crate::tree::NodeId;
use crate::value::Value;

type HelperFn = dyn Fn(&CapturedArguments) -> Reference<Value>;

/// A function from captured arguments to a reference
#[derive(Clone)]
pub struct HelperDefinition {
    name: Rc<str>,
    function: Rc<HelperFn>,
}

impl HelperDefinition {
    pub fn new(
        name: impl Into<Rc<str>>,
        function: impl Fn(&CapturedArguments) -> Reference<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            function: Rc::new(function),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, args: &CapturedArguments) -> Reference<Value> {
        (self.function)(args)
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.function, &b.function)
    }
}

impl fmt::Debug for HelperDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Helper({})", self.name)
    }
}

/// Element behaviour installed after the element is in the tree.
///
/// `install` and `update` run inside a tracking frame, so whatever they read
/// decides when `update` runs again.
pub trait ModifierManager: 'static {
    type State: 'static;

    fn create(&self, element: NodeId, args: &CapturedArguments) -> Self::State;
    fn install(&self, state: &mut Self::State);
    fn update(&self, state: &mut Self::State);
    fn destroy(&self, _state: &mut Self::State) {}
}

/// Type-erased modifier manager
pub trait InternalModifierManager {
    fn create(&self, element: NodeId, args: &CapturedArguments) -> ModifierState;
    fn install(&self, state: &ModifierState) -> Result<()>;
    fn update(&self, state: &ModifierState) -> Result<()>;
    fn destroy(&self, state: &ModifierState) -> Result<()>;
}

struct ModifierAdapter<M>(M);

impl<M: ModifierManager> InternalModifierManager for ModifierAdapter<M> {
    fn create(&self, element: NodeId, args: &CapturedArguments) -> ModifierState {
        ModifierState::new(self.0.create(element, args))
    }

    fn install(&self, state: &ModifierState) -> Result<()> {
        state.with_mut(|state: &mut M::State| self.0.install(state))
    }

    fn update(&self, state: &ModifierState) -> Result<()> {
        state.with_mut(|state: &mut M::State| self.0.update(state))
    }

    fn destroy(&self, state: &ModifierState) -> Result<()> {
        state.with_mut(|state: &mut M::State| self.0.destroy(state))
    }
}

#[derive(Clone)]
pub struct ModifierDefinition {
    name: Rc<str>,
    manager: Rc<dyn InternalModifierManager>,
}

impl ModifierDefinition {
    pub fn new<M: ModifierManager>(name: impl Into<Rc<str>>, manager: M) -> Self {
        Self {
            name: name.into(),
            manager: Rc::new(ModifierAdapter(manager)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manager(&self) -> &Rc<dyn InternalModifierManager> {
        &self.manager
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.manager, &b.manager)
    }
}

impl fmt::Debug for ModifierDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modifier({})", self.name)
    }
}
