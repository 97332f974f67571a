//! Tracked storage cells.

use std::cell::RefCell;
use std::fmt;

use crate::tag::{DirtyableTag, Tag};
use crate::tracking::consume_tag;

/// A value whose reads are tracked and whose writes dirty its tag
pub struct TrackedCell<T> {
    value: RefCell<T>,
    tag: DirtyableTag,
}

impl<T> TrackedCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            tag: DirtyableTag::new(),
        }
    }

    /// Replace the value. Always dirties, even when the new value is equal.
    pub fn set(&self, value: T) {
        *self.value.borrow_mut() = value;
        self.tag.dirty();
    }

    /// Mutate in place and dirty
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.value.borrow_mut());
        self.tag.dirty();
    }

    pub fn tag(&self) -> &Tag {
        self.tag.as_tag()
    }
}

impl<T: Clone> TrackedCell<T> {
    /// Read and record the read in the current frame
    pub fn get(&self) -> T {
        consume_tag(self.tag.as_tag());
        self.value.borrow().clone()
    }

    /// Read without tracking
    pub fn peek(&self) -> T {
        self.value.borrow().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for TrackedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedCell")
            .field("value", &self.value.borrow())
            .field("tag", &self.tag)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{validate_tag, value_for_tag};
    use crate::tracking::track;

    #[test]
    fn get_is_tracked_and_set_invalidates() {
        let cell = TrackedCell::new(1);
        let (value, tag) = track(|| cell.get());
        assert_eq!(value, 1);

        let snapshot = value_for_tag(&tag);
        cell.set(2);
        assert!(!validate_tag(&tag, snapshot));
        assert_eq!(cell.peek(), 2);
    }

    #[test]
    fn peek_is_not_tracked() {
        let cell = TrackedCell::new("a");
        let (_, tag) = track(|| cell.peek());
        assert!(tag.is_constant());
    }

    #[test]
    fn update_mutates_in_place() {
        let cell = TrackedCell::new(vec![1]);
        let snapshot = value_for_tag(cell.tag());
        cell.update(|items| items.push(2));
        assert_eq!(cell.peek(), vec![1, 2]);
        assert!(!validate_tag(cell.tag(), snapshot));
    }
}
