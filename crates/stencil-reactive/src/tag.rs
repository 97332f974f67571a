//! Tags.
//!
//! A tag answers one question: at which revision did the state behind it
//! last change? Dirtyable tags are bumped by writes, updatable tags can be
//! re-pointed at a subtag, and combinators report the maximum of their
//! members. Constant, volatile and current tags are shared singletons.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{ReactiveError, Result};
use crate::revision::{Revision, bump_revision, current_revision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Constant,
    Volatile,
    Current,
    Dirtyable,
    Updatable,
    Combinator,
}

struct TagState {
    kind: TagKind,
    revision: Cell<Revision>,
    last_checked: Cell<Revision>,
    last_value: Cell<Revision>,
    subtags: RefCell<SmallVec<[Tag; 4]>>,
    computing: Cell<bool>,
}

/// Shared handle to a tag
#[derive(Clone)]
pub struct Tag(Rc<TagState>);

thread_local! {
    static CONSTANT_TAG: Tag = Tag::with_kind(TagKind::Constant);
    static VOLATILE_TAG: Tag = Tag::with_kind(TagKind::Volatile);
    static CURRENT_TAG: Tag = Tag::with_kind(TagKind::Current);
}

impl Tag {
    fn with_kind(kind: TagKind) -> Self {
        Self(Rc::new(TagState {
            kind,
            revision: Cell::new(Revision::INITIAL),
            last_checked: Cell::new(Revision::CONSTANT),
            last_value: Cell::new(Revision::INITIAL),
            subtags: RefCell::new(SmallVec::new()),
            computing: Cell::new(false),
        }))
    }

    /// Tag that never changes
    pub fn constant() -> Self {
        CONSTANT_TAG.with(Tag::clone)
    }

    /// Tag that is never valid
    pub fn volatile() -> Self {
        VOLATILE_TAG.with(Tag::clone)
    }

    /// Tag that always reports the current clock value
    pub fn current() -> Self {
        CURRENT_TAG.with(Tag::clone)
    }

    pub fn kind(&self) -> TagKind {
        self.0.kind
    }

    pub fn is_constant(&self) -> bool {
        self.0.kind == TagKind::Constant
    }

    pub fn ptr_eq(a: &Tag, b: &Tag) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Stable address used to deduplicate tags inside a tracking frame.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("kind", &self.0.kind)
            .field("last_value", &self.0.last_value.get())
            .field("subtags", &self.0.subtags.borrow().len())
            .finish()
    }
}

/// Tag that can be invalidated by writes
#[derive(Clone, Debug)]
pub struct DirtyableTag(Tag);

impl DirtyableTag {
    pub fn new() -> Self {
        Self(Tag::with_kind(TagKind::Dirtyable))
    }

    /// Record a write: the tag's revision becomes a fresh clock value.
    pub fn dirty(&self) {
        let revision = bump_revision();
        (self.0).0.revision.set(revision);
    }

    pub fn as_tag(&self) -> &Tag {
        &self.0
    }
}

impl Default for DirtyableTag {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for DirtyableTag {
    type Target = Tag;

    fn deref(&self) -> &Tag {
        &self.0
    }
}

/// Dirtyable tag that also follows one replaceable subtag
#[derive(Clone, Debug)]
pub struct UpdatableTag(Tag);

impl UpdatableTag {
    pub fn new() -> Self {
        Self(Tag::with_kind(TagKind::Updatable))
    }

    pub fn dirty(&self) {
        let revision = bump_revision();
        (self.0).0.revision.set(revision);
    }

    /// Replace the followed subtag.
    ///
    /// Swapping in an older subtag never lowers the reported revision, so
    /// readers holding a snapshot are not invalidated by the swap itself.
    pub fn update(&self, subtag: &Tag) -> Result<()> {
        if Tag::ptr_eq(&self.0, subtag) {
            return Err(ReactiveError::TagCycle);
        }
        let state = &(self.0).0;
        {
            let mut subtags = state.subtags.borrow_mut();
            subtags.clear();
            if !subtag.is_constant() {
                subtags.push(subtag.clone());
            }
        }
        let merged = state.last_value.get().max(value_for_tag(subtag));
        state.last_value.set(merged);
        state.last_checked.set(current_revision());
        Ok(())
    }

    pub fn as_tag(&self) -> &Tag {
        &self.0
    }
}

impl Default for UpdatableTag {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for UpdatableTag {
    type Target = Tag;

    fn deref(&self) -> &Tag {
        &self.0
    }
}

pub fn create_tag() -> DirtyableTag {
    DirtyableTag::new()
}

pub fn create_updatable_tag() -> UpdatableTag {
    UpdatableTag::new()
}

pub fn dirty_tag(tag: &DirtyableTag) {
    tag.dirty();
}

pub fn update_tag(tag: &UpdatableTag, subtag: &Tag) -> Result<()> {
    tag.update(subtag)
}

pub fn is_const_tag(tag: &Tag) -> bool {
    tag.is_constant()
}

/// Revision at which the state behind `tag` last changed.
///
/// Results are cached per clock value, so repeated reads without an
/// intervening write return the same revision without walking subtags.
/// The reported revision never decreases.
pub fn value_for_tag(tag: &Tag) -> Revision {
    let state = &*tag.0;
    match state.kind {
        TagKind::Constant => Revision::CONSTANT,
        TagKind::Volatile => Revision::VOLATILE,
        TagKind::Current => current_revision(),
        TagKind::Dirtyable | TagKind::Updatable | TagKind::Combinator => {
            let now = current_revision();
            if state.last_checked.get() != now && !state.computing.get() {
                state.computing.set(true);
                let mut revision = state.revision.get().max(state.last_value.get());
                for subtag in state.subtags.borrow().iter() {
                    revision = revision.max(value_for_tag(subtag));
                }
                state.last_value.set(revision);
                state.last_checked.set(now);
                state.computing.set(false);
            }
            state.last_value.get()
        }
    }
}

/// Whether nothing behind `tag` changed since `snapshot` was taken.
pub fn validate_tag(tag: &Tag, snapshot: Revision) -> bool {
    let value = value_for_tag(tag);
    !value.is_volatile() && snapshot >= value
}

/// Combine tags into one that reports the maximum of its members.
///
/// Constant members are dropped; zero members yield the constant tag and a
/// single member is returned as is.
pub fn combine(tags: impl IntoIterator<Item = Tag>) -> Tag {
    let mut subtags: SmallVec<[Tag; 4]> = tags.into_iter().filter(|tag| !tag.is_constant()).collect();
    match subtags.len() {
        0 => Tag::constant(),
        1 => subtags.swap_remove(0),
        _ => {
            let tag = Tag::with_kind(TagKind::Combinator);
            *tag.0.subtags.borrow_mut() = subtags;
            tag
        }
    }
}
