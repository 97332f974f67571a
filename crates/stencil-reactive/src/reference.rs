//! References: shared, lazily computed values with tracked dependencies.

use std::fmt;
use std::rc::Rc;

use crate::cache::Cache;
use crate::error::{ReactiveError, Result};
use crate::tag::Tag;

enum Source<T> {
    Constant(T),
    Unbound(T),
    Compute {
        cache: Cache<T>,
        update: Option<Box<dyn Fn(T)>>,
    },
}

struct RefState<T> {
    source: Source<T>,
    label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Constant,
    Unbound,
    Compute,
    Invokable,
}

pub struct Reference<T>(Rc<RefState<T>>);

impl<T> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Clone + 'static> Reference<T> {
    fn from_source(source: Source<T>) -> Self {
        Self(Rc::new(RefState { source, label: None }))
    }

    /// Reference to a value that never changes
    pub fn constant(value: T) -> Self {
        Self::from_source(Source::Constant(value))
    }

    /// Constant reference whose children are constant too
    pub fn unbound(value: T) -> Self {
        Self::from_source(Source::Unbound(value))
    }

    /// Reference computed on demand and memoized until its dependencies change
    pub fn compute(compute: impl Fn() -> T + 'static) -> Self {
        Self::from_source(Source::Compute {
            cache: Cache::new(compute),
            update: None,
        })
    }

    /// Computed reference that also accepts writes
    pub fn compute_with_update(compute: impl Fn() -> T + 'static, update: impl Fn(T) + 'static) -> Self {
        Self::from_source(Source::Compute {
            cache: Cache::new(compute),
            update: Some(Box::new(update)),
        })
    }

    /// Attach a debug label. Only affects a reference nobody else holds yet.
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        if let Some(state) = Rc::get_mut(&mut self.0) {
            state.label = Some(label.into());
        }
        self
    }
}

impl<T> Reference<T> {
    pub fn kind(&self) -> ReferenceKind {
        match &self.0.source {
            Source::Constant(_) => ReferenceKind::Constant,
            Source::Unbound(_) => ReferenceKind::Unbound,
            Source::Compute { update: None, .. } => ReferenceKind::Compute,
            Source::Compute { update: Some(_), .. } => ReferenceKind::Invokable,
        }
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub fn debug_label(&self) -> Option<&str> {
        self.0.label.as_deref()
    }

    /// Tag of the last computation. Constant references report the constant tag;
    /// computed references report `None` until first read.
    pub fn dependent_tag(&self) -> Option<Tag> {
        match &self.0.source {
            Source::Constant(_) | Source::Unbound(_) => Some(Tag::constant()),
            Source::Compute { cache, .. } => cache.tag(),
        }
    }
}

impl<T> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Reference");
        s.field("kind", &self.kind());
        if let Some(label) = &self.0.label {
            s.field("label", label);
        }
        s.finish()
    }
}

/// Current value of a reference, recording its dependencies in the open frame.
pub fn value_for_ref<T: Clone + 'static>(reference: &Reference<T>) -> T {
    match &reference.0.source {
        Source::Constant(value) | Source::Unbound(value) => value.clone(),
        Source::Compute { cache, .. } => cache.get_value(),
    }
}

/// Whether the reference can never produce a different value.
///
/// Computed references qualify once a computation has shown they depend on
/// nothing mutable.
pub fn is_const_ref<T>(reference: &Reference<T>) -> bool {
    match &reference.0.source {
        Source::Constant(_) | Source::Unbound(_) => true,
        Source::Compute { cache, update } => update.is_none() && cache.is_const(),
    }
}

pub fn is_update_ref<T>(reference: &Reference<T>) -> bool {
    matches!(&reference.0.source, Source::Compute { update: Some(_), .. })
}

pub fn is_unbound_ref<T>(reference: &Reference<T>) -> bool {
    matches!(&reference.0.source, Source::Unbound(_))
}

pub fn update_ref<T>(reference: &Reference<T>, value: T) -> Result<()> {
    match &reference.0.source {
        Source::Compute { update: Some(update), .. } => {
            update(value);
            Ok(())
        }
        _ => Err(ReactiveError::ReadOnlyReference {
            label: reference.debug_label().unwrap_or("(anonymous)").to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::TrackedCell;
    use crate::tag::{validate_tag, value_for_tag};
    use crate::tracking::track;

    #[test]
    fn constant_reference_is_const() {
        let reference = Reference::constant(5);
        assert_eq!(value_for_ref(&reference), 5);
        assert!(is_const_ref(&reference));
        assert_eq!(reference.kind(), ReferenceKind::Constant);
    }

    #[test]
    fn computed_reference_follows_its_source() {
        let cell = Rc::new(TrackedCell::new(String::from("a")));
        let source = Rc::clone(&cell);
        let reference = Reference::compute(move || source.get().to_uppercase());

        let (value, tag) = track(|| value_for_ref(&reference));
        assert_eq!(value, "A");
        assert!(!is_const_ref(&reference));

        let snapshot = value_for_tag(&tag);
        cell.set(String::from("b"));
        assert!(!validate_tag(&tag, snapshot));
        assert_eq!(value_for_ref(&reference), "B");
    }

    #[test]
    fn update_ref_writes_through() {
        let cell = Rc::new(TrackedCell::new(1));
        let (read, write) = (Rc::clone(&cell), Rc::clone(&cell));
        let reference = Reference::compute_with_update(move || read.get(), move |value| write.set(value));

        assert!(is_update_ref(&reference));
        update_ref(&reference, 9).unwrap();
        assert_eq!(value_for_ref(&reference), 9);
    }

    #[test]
    fn read_only_reference_rejects_updates() {
        let reference = Reference::compute(|| 1).labeled("one");
        let err = update_ref(&reference, 2).unwrap_err();
        assert_eq!(err, ReactiveError::ReadOnlyReference { label: "one".to_string() });
    }

    #[test]
    fn clones_share_identity() {
        let reference = Reference::constant(());
        let clone = reference.clone();
        assert!(Reference::ptr_eq(&reference, &clone));
        assert!(!Reference::ptr_eq(&reference, &Reference::constant(())));
    }
}
