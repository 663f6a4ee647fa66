//! Tasks: jobs bound to an executor, an owner thread and optionally an
//! owner lifecycle.
//!
//! This module provides:
//! - **Job**: the trait a unit of background work implements
//! - **ChainJob**: a job assembled from closures
//! - **Task**: the handle that schedules a job and delivers its callbacks
//! - **MainLoop / MainThread**: the owner-thread callback queue
//! - **CancelSignal**: the cooperative cancellation flag behind a task

mod chain;
mod handle;
mod job;
mod main_loop;
mod signal;

pub use chain::ChainJob;
pub use handle::{Task, TaskEnv, TaskStatus};
pub use job::{Job, WorkerContext};
pub use main_loop::{MainLoop, MainThread};
pub use signal::CancelSignal;
