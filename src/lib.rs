//! taskpipe - priority-aware task scheduling over a shared worker pool
//!
//! Background jobs are submitted through executors that bound concurrency,
//! order waiting work by priority and serialize or deduplicate work sharing a
//! tag. Results and progress are delivered on a single owner thread, and
//! tasks bound to an owner follow its lifecycle.

pub mod center;
pub mod config;
pub mod error;
pub mod executor;
pub mod id;
pub mod lifecycle;
pub mod queue;
pub mod task;

pub use center::SchedulingCenter;
pub use config::SchedulerConfig;
pub use error::{Result, TaskError};
pub use executor::{BoundedExecutor, LaneExecutor, RejectionPolicy, TaskExecutor, Work, WorkerPool};
pub use id::{OwnerId, WorkId};
pub use lifecycle::{LifeEvent, LifecycleListener, LifecycleRegistry};
pub use queue::Priority;
pub use task::{ChainJob, Job, MainLoop, MainThread, Task, TaskStatus, WorkerContext};
