//! Reactive substrate for the stencil rendering VM.
//!
//! Revisions order writes, tags report when state last changed, tracking
//! frames collect the tags a computation reads, and references package a
//! memoized computation behind a shared handle.

pub mod cache;
pub mod cell;
pub mod error;
pub mod meta;
pub mod reference;
pub mod revision;
pub mod tag;
pub mod tracking;

pub use cache::{Cache, create_cache, get_value, is_const};
pub use cell::TrackedCell;
pub use error::{ReactiveError, Result};
pub use meta::{TagMeta, Trackable, dirty_tag_for, tag_for};
pub use reference::{
    Reference, ReferenceKind, is_const_ref, is_unbound_ref, is_update_ref, update_ref, value_for_ref,
};
pub use revision::{Revision, current_revision};
pub use tag::{
    DirtyableTag, Tag, TagKind, UpdatableTag, combine, create_tag, create_updatable_tag, dirty_tag,
    is_const_tag, update_tag, validate_tag, value_for_tag,
};
pub use tracking::{
    begin_track_frame, consume_tag, end_track_frame, frame_depth, is_tracking, track,
    truncate_frames, untrack,
};
