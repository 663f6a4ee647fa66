//! Executors: admission control layers over the shared worker pool.
//!
//! This module provides:
//! - **WorkerPool**: the shared thread pool every dispatched item runs on.
//! - **BoundedExecutor**: caps how many items run at once, holding the
//!   overflow in a priority queue.
//! - **LaneExecutor**: wraps a bounded executor and serializes (or
//!   deduplicates) items sharing a tag.
//! - **TaskExecutor**: the capability both executors expose, so a task does
//!   not care which scheduling policy it runs under.
//!
//! # Architecture
//!
//! ```text
//! Task ──submit──▶ LaneExecutor ──start──▶ BoundedExecutor ──dispatch──▶ WorkerPool
//!                    ▲  (tag lanes)          (window + queue)                │
//!                    └────── on_finish(tag) ◀── schedule_next ◀── work done ─┘
//! ```
//!
//! Executors are not pools themselves; any number of them may share one pool.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::id::WorkId;
use crate::queue::Priority;

mod bounded;
mod lane;
mod pool;

pub use bounded::{BoundedExecutor, ExecutorStats, RejectionPolicy};
pub use lane::{LaneExecutor, LaneMode};
pub use pool::WorkerPool;

/// Hook invoked with the item's tag once it has finished and the executor's
/// own bookkeeping is up to date.
pub type FinishHook = Arc<dyn Fn(&str) + Send + Sync>;

type Body = Box<dyn FnOnce() + Send>;

/// A unit of work with an identity.
///
/// The body runs at most once. When the executor drops the item without
/// running it (superseded in a dedup lane, rejected for capacity) the abort
/// hook runs instead, so whoever submitted it can observe the cancellation.
pub struct Work {
    id: WorkId,
    body: Body,
    abort: Option<Body>,
}

impl Work {
    /// Wrap a closure under a fresh identity.
    pub fn new(body: impl FnOnce() + Send + 'static) -> Self {
        Self::with_id(WorkId::next(), body)
    }

    /// Wrap a closure under an existing identity.
    pub fn with_id(id: WorkId, body: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            body: Box::new(body),
            abort: None,
        }
    }

    /// Attach a hook that runs if the item is dropped without running.
    pub fn on_abort(mut self, abort: impl FnOnce() + Send + 'static) -> Self {
        self.abort = Some(Box::new(abort));
        self
    }

    pub fn id(&self) -> WorkId {
        self.id
    }

    /// Run the body.
    pub fn run(self) {
        (self.body)();
    }

    /// Drop the body and run the abort hook, if any.
    pub fn abort(self) {
        if let Some(abort) = self.abort {
            abort();
        }
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Work")
            .field("id", &self.id)
            .field("abortable", &self.abort.is_some())
            .finish()
    }
}

/// Scheduling capability shared by bounded and lane executors.
pub trait TaskExecutor: Send + Sync {
    /// Fire and forget: no tag, `Normal` priority.
    fn execute(&self, work: Work) -> Result<()> {
        self.submit(work, "", Priority::Normal, None)
    }

    /// Submit with full scheduling information.
    ///
    /// Returns `TaskError::Rejected` when the capacity policy refuses the item
    /// (its abort hook has already run by then). `on_finish` runs exactly once
    /// per item: after it ran, after it was removed, or after it was refused.
    fn submit(&self, work: Work, tag: &str, priority: Priority, on_finish: Option<FinishHook>) -> Result<()>;

    /// Remove an item still waiting in the priority queue at `priority`.
    ///
    /// Returns `None` once the item has been dispatched.
    fn remove(&self, id: WorkId, priority: Priority) -> Option<Work>;

    /// Move a queued item `delta` levels and return its new priority.
    ///
    /// Returns `priority` unchanged when the item is no longer queued.
    fn change_priority(&self, id: WorkId, priority: Priority, delta: i32) -> Priority;
}
