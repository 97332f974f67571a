//! Lexical and dynamic scopes.
//!
//! A lexical scope is a fixed array of slots addressed by symbol. Slot 0 is
//! `self`. Blocks capture the scope they were created in and yield into a
//! child copy of it. The dynamic scope is a name-keyed map inherited down
//! the invocation stack.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use stencil_reactive::Reference;

use crate::error::{Result, RuntimeError};
use crate::references::undefined_ref;
use crate::value::Value;

/// A block of code closed over the scope it was written in
#[derive(Clone, Debug)]
pub struct ScopeBlock {
    pub handle: u32,
    pub parameters: u32,
    pub scope: Scope,
}

#[derive(Clone, Debug, Default)]
pub enum ScopeSlot {
    #[default]
    Empty,
    Ref(Reference<Value>),
    Block(Option<ScopeBlock>),
}

/// Name-keyed view of a layout's arguments and blocks
pub type EvalLookup = Rc<RefCell<FxHashMap<Rc<str>, ScopeSlot>>>;

struct ScopeFrame {
    slots: Vec<ScopeSlot>,
    eval: Option<EvalLookup>,
}

#[derive(Clone)]
pub struct Scope(Rc<RefCell<ScopeFrame>>);

impl Scope {
    /// Scope with `size` slots and `self_ref` in slot 0
    pub fn root(self_ref: Reference<Value>, size: usize) -> Self {
        let mut slots = vec![ScopeSlot::Empty; size.max(1)];
        slots[0] = ScopeSlot::Ref(self_ref);
        Self(Rc::new(RefCell::new(ScopeFrame { slots, eval: None })))
    }

    pub fn sized(size: usize) -> Self {
        Self::root(undefined_ref(), size)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn self_ref(&self) -> Reference<Value> {
        self.get_symbol(0)
    }

    /// Reference in `slot`; empty and block slots read as undefined
    pub fn get_symbol(&self, slot: usize) -> Reference<Value> {
        match self.0.borrow().slots.get(slot) {
            Some(ScopeSlot::Ref(reference)) => reference.clone(),
            _ => undefined_ref(),
        }
    }

    pub fn get_block(&self, slot: usize) -> Option<ScopeBlock> {
        match self.0.borrow().slots.get(slot) {
            Some(ScopeSlot::Block(block)) => block.clone(),
            _ => None,
        }
    }

    fn bind(&self, slot: usize, value: ScopeSlot) -> Result<()> {
        let mut frame = self.0.borrow_mut();
        let size = frame.slots.len();
        let target = frame.slots.get_mut(slot).ok_or_else(|| {
            RuntimeError::invariant(format!("symbol slot {slot} is outside a scope of {size} slots"))
        })?;
        *target = value;
        Ok(())
    }

    pub fn bind_self(&self, reference: Reference<Value>) -> Result<()> {
        self.bind(0, ScopeSlot::Ref(reference))
    }

    pub fn bind_symbol(&self, slot: usize, reference: Reference<Value>) -> Result<()> {
        self.bind(slot, ScopeSlot::Ref(reference))
    }

    pub fn bind_block(&self, slot: usize, block: Option<ScopeBlock>) -> Result<()> {
        self.bind(slot, ScopeSlot::Block(block))
    }

    pub fn bind_eval_scope(&self, lookup: EvalLookup) {
        self.0.borrow_mut().eval = Some(lookup);
    }

    pub fn eval_scope(&self) -> Option<EvalLookup> {
        self.0.borrow().eval.clone()
    }

    /// Reference bound to `name` in the eval lookup; undefined when the
    /// name or the lookup is missing.
    pub fn lookup(&self, name: &str) -> Reference<Value> {
        let frame = self.0.borrow();
        let slot = frame.eval.as_ref().and_then(|eval| eval.borrow().get(name).cloned());
        match slot {
            Some(ScopeSlot::Ref(reference)) => reference,
            _ => undefined_ref(),
        }
    }

    /// Copy of this scope extended by `extra` empty slots
    pub fn child(&self, extra: usize) -> Self {
        let frame = self.0.borrow();
        let mut slots = frame.slots.clone();
        slots.resize(slots.len() + extra, ScopeSlot::Empty);
        Self(Rc::new(RefCell::new(ScopeFrame {
            slots,
            eval: frame.eval.clone(),
        })))
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.0.borrow();
        f.debug_struct("Scope")
            .field("slots", &frame.slots.len())
            .field("eval", &frame.eval.is_some())
            .finish()
    }
}

/// Name-keyed references visible to every component below the binding point
#[derive(Clone, Default)]
pub struct DynamicScope(Rc<RefCell<FxHashMap<Rc<str>, Reference<Value>>>>);

impl DynamicScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Reference<Value>> {
        self.0.borrow().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<Rc<str>>, reference: Reference<Value>) {
        self.0.borrow_mut().insert(key.into(), reference);
    }

    /// Independent copy: writes to the child do not reach the parent
    pub fn child(&self) -> Self {
        Self(Rc::new(RefCell::new(self.0.borrow().clone())))
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for DynamicScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.0.borrow();
        let mut keys: Vec<_> = map.keys().collect();
        keys.sort();
        f.debug_struct("DynamicScope").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stencil_reactive::value_for_ref;

    #[test]
    fn slot_zero_is_self() {
        let scope = Scope::root(Reference::constant(Value::from("me")), 3);
        assert_eq!(value_for_ref(&scope.self_ref()), Value::from("me"));
        assert_eq!(value_for_ref(&scope.get_symbol(2)), Value::Undefined);
    }

    #[test]
    fn binding_outside_the_scope_is_rejected() {
        let scope = Scope::sized(2);
        assert!(scope.bind_symbol(1, Reference::constant(Value::Null)).is_ok());
        assert!(scope.bind_symbol(2, Reference::constant(Value::Null)).is_err());
    }

    #[test]
    fn child_scope_copies_parent_slots() {
        let parent = Scope::sized(2);
        parent.bind_symbol(1, Reference::constant(Value::from(1))).unwrap();
        let child = parent.child(1);
        child.bind_symbol(2, Reference::constant(Value::from(2))).unwrap();

        assert_eq!(child.len(), 3);
        assert_eq!(value_for_ref(&child.get_symbol(1)), Value::from(1));
        assert_eq!(parent.len(), 2);
    }

    #[test]
    fn dynamic_scope_child_is_isolated() {
        let parent = DynamicScope::new();
        parent.set("theme", Reference::constant(Value::from("dark")));
        let child = parent.child();
        child.set("theme", Reference::constant(Value::from("light")));

        assert_eq!(value_for_ref(&parent.get("theme").unwrap()), Value::from("dark"));
        assert_eq!(value_for_ref(&child.get("theme").unwrap()), Value::from("light"));
    }
}
