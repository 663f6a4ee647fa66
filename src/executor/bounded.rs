//! Bounded executor: a concurrency window over the shared pool.
//!
//! At most `window` items are dispatched at once. Overflow waits in a
//! [`PriorityQueue`] and is pulled, highest level first, as running items
//! finish. `Immediate` items skip the window entirely.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{FinishHook, TaskExecutor, Work, WorkerPool};
use crate::config::PipeConfig;
use crate::error::{Result, TaskError};
use crate::id::WorkId;
use crate::queue::{Priority, PriorityQueue};

/// What happens to work submitted once `queued + active` reaches capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionPolicy {
    /// Abort the item and return `TaskError::Rejected` to the caller.
    #[default]
    Abort,
    /// Abort the item, log a warning and report success.
    Discard,
    /// Run the item on the submitting thread, outside the window.
    CallerRuns,
}

/// Point-in-time view of an executor's load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    pub name: String,
    pub window: usize,
    pub capacity: Option<usize>,
    pub active: usize,
    pub queued: usize,
}

struct Pending {
    work: Work,
    tag: String,
    on_finish: Option<FinishHook>,
}

impl Pending {
    /// Refused items still report through their finish hook.
    fn abort(self) {
        let Pending { work, tag, on_finish } = self;
        work.abort();
        if let Some(hook) = on_finish {
            hook(&tag);
        }
    }
}

struct State {
    active: usize,
    queue: PriorityQueue<Pending>,
}

struct Shared {
    name: String,
    window: usize,
    capacity: Option<usize>,
    policy: RejectionPolicy,
    pool: WorkerPool,
    state: Mutex<State>,
}

enum Admission {
    Dispatch(Pending),
    Queued,
    Rejected(Pending),
}

/// Executor admitting at most `window` concurrent items.
///
/// Cloning yields another handle to the same window and queue.
#[derive(Clone)]
pub struct BoundedExecutor {
    shared: Arc<Shared>,
}

impl BoundedExecutor {
    /// Create an executor over `pool`. A window below 1 is raised to 1.
    pub fn new(name: impl Into<String>, config: &PipeConfig, pool: WorkerPool) -> Self {
        let shared = Shared {
            name: name.into(),
            window: config.window.max(1),
            capacity: config.capacity_limit(),
            policy: config.rejection,
            pool,
            state: Mutex::new(State {
                active: 0,
                queue: PriorityQueue::new(),
            }),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn window(&self) -> usize {
        self.shared.window
    }

    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active
    }

    pub fn queued_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn stats(&self) -> ExecutorStats {
        let state = self.shared.state.lock();
        ExecutorStats {
            name: self.shared.name.clone(),
            window: self.shared.window,
            capacity: self.shared.capacity,
            active: state.active,
            queued: state.queue.len(),
        }
    }

    fn reject(&self, pending: Pending) -> Result<()> {
        let capacity = self.shared.capacity.unwrap_or_default();
        match self.shared.policy {
            RejectionPolicy::Abort => {
                tracing::debug!(executor = %self.shared.name, work = %pending.work.id(), "rejected: capacity exceeded");
                pending.abort();
                Err(TaskError::Rejected {
                    executor: self.shared.name.clone(),
                    capacity,
                })
            }
            RejectionPolicy::Discard => {
                tracing::warn!(executor = %self.shared.name, work = %pending.work.id(), capacity, "discarded: capacity exceeded");
                pending.abort();
                Ok(())
            }
            RejectionPolicy::CallerRuns => {
                let Pending { work, tag, on_finish } = pending;
                run_guarded(&self.shared.name, work);
                if let Some(hook) = on_finish {
                    hook(&tag);
                }
                Ok(())
            }
        }
    }
}

impl Shared {
    fn dispatch(self: &Arc<Self>, pending: Pending) {
        let shared = Arc::clone(self);
        self.pool.execute(move || shared.complete(pending));
    }

    /// Runs on a pool thread.
    fn complete(self: Arc<Self>, pending: Pending) {
        let Pending { work, tag, on_finish } = pending;
        run_guarded(&self.name, work);
        self.schedule_next();
        if let Some(hook) = on_finish {
            hook(&tag);
        }
    }

    fn schedule_next(self: &Arc<Self>) {
        let ready = {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
            let mut ready = Vec::new();
            while state.active < self.window {
                let Some(next) = state.queue.poll() else {
                    break;
                };
                state.active += 1;
                ready.push(next);
            }
            ready
        };
        for pending in ready {
            self.dispatch(pending);
        }
    }
}

fn run_guarded(executor: &str, work: Work) {
    let id = work.id();
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| work.run())) {
        tracing::warn!(executor = %executor, work = %id, "work panicked: {}", panic_message(&*payload));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

impl TaskExecutor for BoundedExecutor {
    fn submit(&self, work: Work, tag: &str, priority: Priority, on_finish: Option<FinishHook>) -> Result<()> {
        let pending = Pending {
            work,
            tag: tag.to_string(),
            on_finish,
        };

        let admission = {
            let mut state = self.shared.state.lock();
            let load = state.active + state.queue.len();
            if let Some(capacity) = self.shared.capacity
                && load >= capacity
            {
                Admission::Rejected(pending)
            } else if state.active < self.shared.window || priority.is_immediate() {
                state.active += 1;
                Admission::Dispatch(pending)
            } else {
                state.queue.offer(pending, priority);
                Admission::Queued
            }
        };

        match admission {
            Admission::Dispatch(pending) => {
                self.shared.dispatch(pending);
                Ok(())
            }
            Admission::Queued => Ok(()),
            Admission::Rejected(pending) => self.reject(pending),
        }
    }

    /// Removing an item still runs its finish hook so layered executors
    /// release whatever they hold for it.
    fn remove(&self, id: WorkId, priority: Priority) -> Option<Work> {
        if priority.is_immediate() {
            return None;
        }
        let removed = self
            .shared
            .state
            .lock()
            .queue
            .remove_where(priority, |pending| pending.work.id() == id)?;

        let Pending { work, tag, on_finish } = removed;
        if let Some(hook) = on_finish {
            hook(&tag);
        }
        Some(work)
    }

    fn change_priority(&self, id: WorkId, priority: Priority, delta: i32) -> Priority {
        if priority.is_immediate() {
            return priority;
        }
        let mut state = self.shared.state.lock();
        match state.queue.remove_where(priority, |pending| pending.work.id() == id) {
            Some(pending) => {
                let shifted = priority.shifted(delta);
                state.queue.offer(pending, shifted);
                tracing::debug!(executor = %self.shared.name, work = %id, from = ?priority, to = ?shifted, "priority changed");
                shifted
            }
            None => priority,
        }
    }
}

impl std::fmt::Debug for BoundedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedExecutor")
            .field("name", &self.shared.name)
            .field("window", &self.shared.window)
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}
