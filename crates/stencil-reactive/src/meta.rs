//! Per-object, per-key tags.

use std::cell::RefCell;

use rustc_hash::FxHashMap;

use crate::tag::{DirtyableTag, Tag};

/// Lazily created tag table owned by a tracked object
#[derive(Debug, Default)]
pub struct TagMeta {
    tags: RefCell<FxHashMap<Box<str>, DirtyableTag>>,
}

impl TagMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag for `key`, created on first use. The same key always yields the same tag.
    pub fn tag_for(&self, key: &str) -> Tag {
        if let Some(tag) = self.tags.borrow().get(key) {
            return tag.as_tag().clone();
        }
        let tag = DirtyableTag::new();
        let result = tag.as_tag().clone();
        self.tags.borrow_mut().insert(key.into(), tag);
        result
    }

    /// Invalidate `key`. Keys nobody has read yet have no tag to invalidate.
    pub fn dirty_tag_for(&self, key: &str) {
        if let Some(tag) = self.tags.borrow().get(key) {
            tag.dirty();
        }
    }

    pub fn len(&self) -> usize {
        self.tags.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.borrow().is_empty()
    }
}

/// Objects whose properties are individually tracked
pub trait Trackable {
    fn tag_meta(&self) -> &TagMeta;
}

pub fn tag_for<T: Trackable + ?Sized>(object: &T, key: &str) -> Tag {
    object.tag_meta().tag_for(key)
}

pub fn dirty_tag_for<T: Trackable + ?Sized>(object: &T, key: &str) {
    object.tag_meta().dirty_tag_for(key);
}
