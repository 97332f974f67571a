//! Memoized tracked computations.
//!
//! A cache remembers the value of its computation together with the tag of
//! everything the computation read. Later reads re-run the computation only
//! when that tag no longer validates against the stored snapshot.

use std::cell::{Cell, RefCell};
use std::fmt;

use crate::revision::Revision;
use crate::tag::{Tag, validate_tag, value_for_tag};
use crate::tracking::{consume_tag, track};

struct Memo<T> {
    value: T,
    tag: Tag,
    snapshot: Revision,
}

pub struct Cache<T> {
    compute: Box<dyn Fn() -> T>,
    memo: RefCell<Option<Memo<T>>>,
    computations: Cell<u64>,
}

impl<T: Clone + 'static> Cache<T> {
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        Self {
            compute: Box::new(compute),
            memo: RefCell::new(None),
            computations: Cell::new(0),
        }
    }

    /// Current value, recomputed only when a dependency changed.
    ///
    /// The cache's tag is consumed by the enclosing frame either way, so
    /// callers inherit its dependencies.
    pub fn get_value(&self) -> T {
        if let Some((value, tag)) = self.fresh() {
            consume_tag(&tag);
            return value;
        }

        let (value, tag) = track(|| (self.compute)());
        self.computations.set(self.computations.get() + 1);
        let snapshot = value_for_tag(&tag);
        consume_tag(&tag);
        *self.memo.borrow_mut() = Some(Memo {
            value: value.clone(),
            tag,
            snapshot,
        });
        value
    }

    fn fresh(&self) -> Option<(T, Tag)> {
        let memo = self.memo.borrow();
        let memo = memo.as_ref()?;
        if !validate_tag(&memo.tag, memo.snapshot) {
            return None;
        }
        Some((memo.value.clone(), memo.tag.clone()))
    }
}

impl<T> Cache<T> {
    /// Whether the last computation depended on nothing that can change
    pub fn is_const(&self) -> bool {
        self.memo.borrow().as_ref().is_some_and(|memo| memo.tag.is_constant())
    }

    /// Tag of the last computation, if it ran
    pub fn tag(&self) -> Option<Tag> {
        self.memo.borrow().as_ref().map(|memo| memo.tag.clone())
    }

    /// How many times the computation has run
    pub fn computations(&self) -> u64 {
        self.computations.get()
    }
}

impl<T> fmt::Debug for Cache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("computed", &self.memo.borrow().is_some())
            .field("computations", &self.computations.get())
            .finish()
    }
}

pub fn create_cache<T: Clone + 'static>(compute: impl Fn() -> T + 'static) -> Cache<T> {
    Cache::new(compute)
}

pub fn get_value<T: Clone + 'static>(cache: &Cache<T>) -> T {
    cache.get_value()
}

pub fn is_const<T>(cache: &Cache<T>) -> bool {
    cache.is_const()
}
