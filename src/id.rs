//! Identity types for taskpipe
//!
//! Work items and owners are compared by identity, never by content.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_WORK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a submitted unit of work
///
/// Two submissions never share an id, even when their tag and priority match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(u64);

impl WorkId {
    /// Allocate a fresh, process-unique work id
    pub fn next() -> Self {
        Self(NEXT_WORK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work-{}", self.0)
    }
}

/// Identity of an owner (screen, panel, dialog) whose lifecycle drives tasks
///
/// Zero is reserved for "unbound", so an `OwnerId` is always non-zero and an
/// unbound task simply holds `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(NonZeroU64);

impl OwnerId {
    /// Wrap a raw identity; returns `None` for 0
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Derive the identity of a live value from its address
    ///
    /// Stable for as long as the value is not moved or dropped.
    pub fn of<T: ?Sized>(owner: &T) -> Self {
        let addr = (owner as *const T).cast::<()>() as usize as u64;
        Self(NonZeroU64::new(addr).unwrap_or(NonZeroU64::MIN))
    }

    /// Raw numeric value
    pub fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner-{:x}", self.0.get())
    }
}
