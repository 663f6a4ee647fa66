//! Tag lanes layered over a bounded executor.
//!
//! Items sharing a non-empty tag never run at the same time. In
//! [`LaneMode::Dedup`] a tag holds at most one running and one waiting item;
//! later arrivals are aborted. In [`LaneMode::SerializeAll`] every arrival
//! waits its turn in a per-tag FIFO.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{BoundedExecutor, FinishHook, TaskExecutor, Work};
use crate::error::Result;
use crate::id::WorkId;
use crate::queue::{FifoQueue, Priority};

/// How a lane treats work arriving while its tag is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneMode {
    /// Run every same-tag item, one at a time, in arrival order.
    SerializeAll,
    /// Keep at most one waiting item per tag; abort the rest.
    Dedup,
}

struct Waiting {
    work: Work,
    priority: Priority,
    on_finish: Option<FinishHook>,
}

#[derive(Default)]
struct LaneState {
    scheduled: HashMap<String, WorkId>,
    waiting: HashMap<String, Waiting>,
    queues: HashMap<String, FifoQueue<Waiting>>,
}

impl LaneState {
    /// Pop whatever runs next for `tag`, dropping an exhausted FIFO.
    fn take_next(&mut self, mode: LaneMode, tag: &str) -> Option<Waiting> {
        match mode {
            LaneMode::Dedup => self.waiting.remove(tag),
            LaneMode::SerializeAll => {
                let queue = self.queues.get_mut(tag)?;
                let next = queue.poll();
                if queue.is_empty() {
                    self.queues.remove(tag);
                }
                next
            }
        }
    }

    fn waiting_len(&self, mode: LaneMode, tag: &str) -> usize {
        match mode {
            LaneMode::Dedup => usize::from(self.waiting.contains_key(tag)),
            LaneMode::SerializeAll => self.queues.get(tag).map_or(0, FifoQueue::len),
        }
    }
}

enum Admission {
    Start(Waiting),
    Parked,
    Superseded(Waiting),
}

struct LaneInner {
    executor: BoundedExecutor,
    mode: LaneMode,
    state: Mutex<LaneState>,
}

/// Tracks whether a started item finished before its `submit` returned.
#[derive(Default)]
struct StartGate {
    returned: bool,
    finished_inline: bool,
}

impl LaneInner {
    /// Submit `item` below. Returns the item's user hook when it already
    /// finished inside `submit` (refused, discarded or run by the caller);
    /// the caller then owns releasing the tag.
    fn start(self: &Arc<Self>, tag: &str, item: Waiting) -> (Result<()>, Option<Option<FinishHook>>) {
        let Waiting {
            work,
            priority,
            on_finish,
        } = item;
        let gate = Arc::new(Mutex::new(StartGate::default()));
        let lane: Weak<LaneInner> = Arc::downgrade(self);
        let hook_gate = Arc::clone(&gate);
        let user = on_finish.clone();
        let hook: FinishHook = Arc::new(move |tag: &str| {
            {
                let mut gate = hook_gate.lock();
                if !gate.returned {
                    gate.finished_inline = true;
                    return;
                }
            }
            if let Some(lane) = lane.upgrade() {
                lane.release(tag);
            }
            if let Some(user) = &user {
                user(tag);
            }
        });

        let result = self.executor.submit(work, tag, priority, Some(hook));
        let finished_inline = {
            let mut gate = gate.lock();
            gate.returned = true;
            gate.finished_inline
        };
        (result, finished_inline.then_some(on_finish))
    }

    /// Start `item` and keep handing the tag on while starts finish inline.
    fn launch(self: &Arc<Self>, tag: &str, item: Waiting) -> Result<()> {
        let (first, mut finished) = self.start(tag, item);
        while let Some(user) = finished.take() {
            let next = self.advance(tag);
            if let Some(user) = user {
                user(tag);
            }
            let Some(item) = next else {
                break;
            };
            let (result, inline) = self.start(tag, item);
            if let Err(e) = result {
                tracing::warn!(executor = %self.executor.name(), tag = %tag, error = %e, "lane start refused");
            }
            finished = inline;
        }
        first
    }

    /// Free `tag` and claim it for the next waiting item, if any.
    fn advance(&self, tag: &str) -> Option<Waiting> {
        let mut state = self.state.lock();
        state.scheduled.remove(tag);
        let next = state.take_next(self.mode, tag);
        if let Some(item) = &next {
            state.scheduled.insert(tag.to_string(), item.work.id());
        }
        next
    }

    fn release(self: &Arc<Self>, tag: &str) {
        if let Some(item) = self.advance(tag)
            && let Err(e) = self.launch(tag, item)
        {
            tracing::warn!(executor = %self.executor.name(), tag = %tag, error = %e, "lane start refused");
        }
    }
}

/// Executor serializing or deduplicating work per tag.
#[derive(Clone)]
pub struct LaneExecutor {
    inner: Arc<LaneInner>,
}

impl LaneExecutor {
    pub fn new(executor: BoundedExecutor, mode: LaneMode) -> Self {
        Self {
            inner: Arc::new(LaneInner {
                executor,
                mode,
                state: Mutex::new(LaneState::default()),
            }),
        }
    }

    /// Lane keeping at most one waiting item per tag.
    pub fn dedup(executor: BoundedExecutor) -> Self {
        Self::new(executor, LaneMode::Dedup)
    }

    /// Lane running every same-tag item in arrival order.
    pub fn serialize_all(executor: BoundedExecutor) -> Self {
        Self::new(executor, LaneMode::SerializeAll)
    }

    pub fn mode(&self) -> LaneMode {
        self.inner.mode
    }

    /// The bounded executor underneath.
    pub fn executor(&self) -> &BoundedExecutor {
        &self.inner.executor
    }

    /// Whether an item for `tag` is currently started (queued or running below).
    pub fn is_scheduled(&self, tag: &str) -> bool {
        self.inner.state.lock().scheduled.contains_key(tag)
    }

    /// Number of items waiting behind the scheduled one for `tag`.
    pub fn waiting_len(&self, tag: &str) -> usize {
        self.inner.state.lock().waiting_len(self.inner.mode, tag)
    }
}

impl TaskExecutor for LaneExecutor {
    fn submit(&self, work: Work, tag: &str, priority: Priority, on_finish: Option<FinishHook>) -> Result<()> {
        if tag.is_empty() {
            return self.inner.executor.submit(work, tag, priority, on_finish);
        }

        let item = Waiting {
            work,
            priority,
            on_finish,
        };
        let admission = {
            let mut state = self.inner.state.lock();
            if !state.scheduled.contains_key(tag) {
                state.scheduled.insert(tag.to_string(), item.work.id());
                Admission::Start(item)
            } else {
                match self.inner.mode {
                    LaneMode::Dedup if state.waiting.contains_key(tag) => Admission::Superseded(item),
                    LaneMode::Dedup => {
                        state.waiting.insert(tag.to_string(), item);
                        Admission::Parked
                    }
                    LaneMode::SerializeAll => {
                        state.queues.entry(tag.to_string()).or_default().offer(item);
                        Admission::Parked
                    }
                }
            }
        };

        match admission {
            Admission::Start(item) => self.inner.launch(tag, item),
            Admission::Parked => Ok(()),
            Admission::Superseded(item) => {
                tracing::debug!(executor = %self.inner.executor.name(), tag = %tag, work = %item.work.id(), "superseded in dedup lane");
                item.work.abort();
                if let Some(hook) = item.on_finish {
                    hook(tag);
                }
                Ok(())
            }
        }
    }

    fn remove(&self, id: WorkId, priority: Priority) -> Option<Work> {
        self.inner.executor.remove(id, priority)
    }

    fn change_priority(&self, id: WorkId, priority: Priority, delta: i32) -> Priority {
        self.inner.executor.change_priority(id, priority, delta)
    }
}

impl std::fmt::Debug for LaneExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneExecutor")
            .field("executor", &self.inner.executor)
            .field("mode", &self.inner.mode)
            .finish()
    }
}
