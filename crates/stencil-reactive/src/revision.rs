//! Revision clock.
//!
//! One process-wide counter orders every write to tracked state. Tags store
//! the revision at which they last changed and readers compare that against
//! a snapshot taken when they cached their work.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A point on the revision clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(pub u64);

impl Revision {
    /// Revision reported by tags that never change
    pub const CONSTANT: Self = Self(0);
    /// First revision handed out by the clock
    pub const INITIAL: Self = Self(1);
    /// Revision reported by tags that are never valid
    pub const VOLATILE: Self = Self(u64::MAX);

    pub fn is_volatile(self) -> bool {
        self == Self::VOLATILE
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_volatile() {
            f.write_str("r∞")
        } else {
            write!(f, "r{}", self.0)
        }
    }
}

static CLOCK: AtomicU64 = AtomicU64::new(Revision::INITIAL.0);

/// Current value of the revision clock.
pub fn current_revision() -> Revision {
    Revision(CLOCK.load(Ordering::Acquire))
}

/// Advance the clock and return the revision that was just issued.
pub(crate) fn bump_revision() -> Revision {
    Revision(CLOCK.fetch_add(1, Ordering::AcqRel) + 1)
}
