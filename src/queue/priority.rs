//! Discrete priority levels and the level-indexed priority queue.
//!
//! Work is stored in one FIFO per queueable level:
//! - `High` drains before `Normal`, `Normal` before `Low`
//! - Submission order is preserved within a level
//! - Removal scans a single level, so a caller must know the level it queued at
//!
//! `Immediate` never enters the queue; executors dispatch it directly.

use serde::{Deserialize, Serialize};

use super::fifo::FifoQueue;

/// Number of queueable levels (Low, Normal, High).
pub const QUEUE_LEVELS: usize = 3;

/// Scheduling priority of a unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    /// Bypasses queueing and the concurrency window. Never clamped or shifted.
    Immediate,
}

impl Priority {
    /// Check if this is the `Immediate` sentinel
    pub fn is_immediate(self) -> bool {
        self == Priority::Immediate
    }

    /// Shift by `delta` steps, clamped to `Low..=High`.
    ///
    /// `Immediate` is returned unchanged.
    pub fn shifted(self, delta: i32) -> Priority {
        if self.is_immediate() {
            return self;
        }
        let level = (self.level() as i32 + delta).clamp(0, QUEUE_LEVELS as i32 - 1);
        Self::from_level(level as usize)
    }

    /// Queue level index; `Immediate` maps onto the `High` level.
    fn level(self) -> usize {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High | Priority::Immediate => 2,
        }
    }

    fn from_level(level: usize) -> Priority {
        match level {
            0 => Priority::Low,
            1 => Priority::Normal,
            _ => Priority::High,
        }
    }
}

/// Priority queue made of one FIFO per queueable level.
#[derive(Debug)]
pub struct PriorityQueue<E> {
    levels: [FifoQueue<E>; QUEUE_LEVELS],
    len: usize,
}

impl<E> Default for PriorityQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> PriorityQueue<E> {
    pub fn new() -> Self {
        Self {
            levels: [FifoQueue::new(), FifoQueue::new(), FifoQueue::new()],
            len: 0,
        }
    }

    /// Append `item` to the FIFO of `priority` (Immediate is clamped to High).
    pub fn offer(&mut self, item: E, priority: Priority) {
        self.levels[priority.level()].offer(item);
        self.len += 1;
    }

    /// Remove the head of the highest non-empty level.
    pub fn poll(&mut self) -> Option<E> {
        if self.len == 0 {
            return None;
        }
        let item = self.levels.iter_mut().rev().find_map(FifoQueue::poll)?;
        self.len -= 1;
        Some(item)
    }

    /// Remove the first item at `priority` accepted by `pred`.
    ///
    /// Only that level is scanned; an item queued at another level is not found.
    pub fn remove_where(&mut self, priority: Priority, pred: impl FnMut(&E) -> bool) -> Option<E> {
        let item = self.levels[priority.level()].remove_where(pred)?;
        self.len -= 1;
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of items waiting at one level.
    pub fn len_at(&self, priority: Priority) -> usize {
        self.levels[priority.level()].len()
    }
}
