//! Autotracking.
//!
//! Reads of tracked state call [`consume_tag`]; whatever frame is on top of
//! the thread's frame stack collects those tags. Closing a frame combines
//! everything it saw into one tag that the caller can snapshot and later
//! validate.

use std::cell::RefCell;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::error::{ReactiveError, Result};
use crate::tag::{Tag, combine};

#[derive(Default)]
struct Tracker {
    tags: SmallVec<[Tag; 8]>,
    seen: FxHashSet<usize>,
}

impl Tracker {
    fn add(&mut self, tag: &Tag) {
        if tag.is_constant() || !self.seen.insert(tag.addr()) {
            return;
        }
        self.tags.push(tag.clone());
    }

    fn into_tag(self) -> Tag {
        combine(self.tags)
    }
}

thread_local! {
    static FRAMES: RefCell<Vec<Tracker>> = const { RefCell::new(Vec::new()) };
}

pub fn begin_track_frame() {
    FRAMES.with(|frames| frames.borrow_mut().push(Tracker::default()));
}

/// Close the innermost frame and return the combination of its tags.
pub fn end_track_frame() -> Result<Tag> {
    FRAMES
        .with(|frames| frames.borrow_mut().pop())
        .map(Tracker::into_tag)
        .ok_or(ReactiveError::NoOpenTrackFrame)
}

/// Record a read of `tag` in the innermost open frame, if any.
pub fn consume_tag(tag: &Tag) {
    FRAMES.with(|frames| {
        if let Some(top) = frames.borrow_mut().last_mut() {
            top.add(tag);
        }
    });
}

/// Run `f` inside a fresh frame and return its result with the tag it consumed.
pub fn track<T>(f: impl FnOnce() -> T) -> (T, Tag) {
    begin_track_frame();
    let value = f();
    let tag = FRAMES
        .with(|frames| frames.borrow_mut().pop())
        .map(Tracker::into_tag)
        .unwrap_or_else(Tag::constant);
    (value, tag)
}

/// Run `f` without letting its reads reach the enclosing frame.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    begin_track_frame();
    let value = f();
    FRAMES.with(|frames| frames.borrow_mut().pop());
    value
}

pub fn is_tracking() -> bool {
    FRAMES.with(|frames| !frames.borrow().is_empty())
}

/// Number of open frames on this thread.
pub fn frame_depth() -> usize {
    FRAMES.with(|frames| frames.borrow().len())
}

/// Drop frames opened above `depth`. Used to unwind after an aborted pass.
pub fn truncate_frames(depth: usize) {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        if frames.len() > depth {
            log::debug!("discarding {} open track frames", frames.len() - depth);
            frames.truncate(depth);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{create_tag, dirty_tag, validate_tag, value_for_tag};

    #[test]
    fn track_collects_consumed_tags() {
        let a = create_tag();
        let b = create_tag();
        let ((), tag) = track(|| {
            consume_tag(&a);
            consume_tag(&b);
            consume_tag(&a);
        });

        let snapshot = value_for_tag(&tag);
        dirty_tag(&a);
        assert!(!validate_tag(&tag, snapshot));
    }

    #[test]
    fn untracked_reads_do_not_leak_into_parent() {
        let a = create_tag();
        let ((), tag) = track(|| untrack(|| consume_tag(&a)));
        assert!(tag.is_constant());
    }

    #[test]
    fn consume_without_frame_is_a_no_op() {
        let depth = frame_depth();
        consume_tag(&create_tag());
        assert_eq!(frame_depth(), depth);
        assert!(!is_tracking());
    }

    #[test]
    fn end_without_begin_is_an_error() {
        assert_eq!(end_track_frame().unwrap_err(), ReactiveError::NoOpenTrackFrame);
    }

    #[test]
    fn truncate_unwinds_abandoned_frames() {
        let depth = frame_depth();
        begin_track_frame();
        begin_track_frame();
        truncate_frames(depth);
        assert_eq!(frame_depth(), depth);
    }
}
