//! Type-erased state owned by managers.
//!
//! Managers are statically typed; the VM only moves their definition and
//! instance state around. These handles erase the type at the boundary and
//! the manager adapter restores it with a checked downcast.

use std::any::{Any, type_name};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{Result, RuntimeError};

/// Immutable per-definition state
#[derive(Clone)]
pub struct DefinitionState(Rc<dyn Any>);

impl DefinitionState {
    pub fn new<T: 'static>(state: T) -> Self {
        Self(Rc::new(state))
    }

    pub fn downcast<T: 'static>(&self) -> Result<&T> {
        self.0.downcast_ref::<T>().ok_or_else(|| {
            RuntimeError::invariant(format!("definition state is not a {}", type_name::<T>()))
        })
    }
}

impl fmt::Debug for DefinitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DefinitionState(..)")
    }
}

/// Mutable state of one component instance or modifier installation
#[derive(Clone)]
pub struct OpaqueState(Rc<RefCell<dyn Any>>);

pub type InstanceState = OpaqueState;
pub type ModifierState = OpaqueState;

impl OpaqueState {
    pub fn new<T: 'static>(state: T) -> Self {
        Self(Rc::new(RefCell::new(state)))
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Run `f` against the typed state.
    pub fn with<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let guard = self
            .0
            .try_borrow()
            .map_err(|_| RuntimeError::invariant("state is already mutably borrowed"))?;
        let typed = guard
            .downcast_ref::<T>()
            .ok_or_else(|| RuntimeError::invariant(format!("state is not a {}", type_name::<T>())))?;
        Ok(f(typed))
    }

    /// Run `f` against the typed state, mutably.
    pub fn with_mut<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut guard = self
            .0
            .try_borrow_mut()
            .map_err(|_| RuntimeError::invariant("state is already borrowed"))?;
        let typed = guard
            .downcast_mut::<T>()
            .ok_or_else(|| RuntimeError::invariant(format!("state is not a {}", type_name::<T>())))?;
        Ok(f(typed))
    }
}

impl fmt::Debug for OpaqueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueState({:p})", Rc::as_ptr(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access_round_trips() {
        let state = OpaqueState::new(vec![1, 2]);
        state.with_mut(|items: &mut Vec<i32>| items.push(3)).unwrap();
        assert_eq!(state.with(|items: &Vec<i32>| items.len()).unwrap(), 3);
    }

    #[test]
    fn wrong_type_is_an_invariant_violation() {
        let state = OpaqueState::new(1_u8);
        let err = state.with(|_: &String| ()).unwrap_err();
        assert!(matches!(err, RuntimeError::InvariantViolation(_)));

        let definition = DefinitionState::new("x");
        assert!(definition.downcast::<u32>().is_err());
        assert_eq!(*definition.downcast::<&str>().unwrap(), "x");
    }
}
