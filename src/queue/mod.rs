//! Queue structures used by the executors
//!
//! General-purpose heaps only support removal by value equality over the
//! whole heap. Executors need to pull a specific work item out by identity
//! when it is cancelled or reprioritized, so work is held in small FIFOs
//! indexed by priority level instead.

pub mod fifo;
pub mod priority;

pub use fifo::FifoQueue;
pub use priority::{Priority, PriorityQueue, QUEUE_LEVELS};
