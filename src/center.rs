//! Scheduling center: the composition root.
//!
//! Builds the standard executors over one shared worker pool and hands out
//! tasks wired to them:
//!
//! | executor      | kind                 | backs                  |
//! |---------------|----------------------|------------------------|
//! | `io`          | bounded              | `lane_io`              |
//! | `computation` | bounded              | `lane_cp`              |
//! | `serial`      | serialize-all lane   | its own bounded pipe   |
//! | `lane_io`     | dedup lane           | `io_task`              |
//! | `lane_cp`     | dedup lane           | `cpu_task`             |

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::executor::{BoundedExecutor, ExecutorStats, LaneExecutor, TaskExecutor, WorkerPool};
use crate::id::OwnerId;
use crate::lifecycle::{LifeEvent, LifecycleRegistry};
use crate::task::{Job, MainThread, Task, TaskEnv};

pub struct SchedulingCenter {
    pool: WorkerPool,
    io: BoundedExecutor,
    computation: BoundedExecutor,
    serial: LaneExecutor,
    lane_io: LaneExecutor,
    lane_cp: LaneExecutor,
    lifecycle: Arc<LifecycleRegistry>,
    main: MainThread,
}

impl SchedulingCenter {
    /// Build a center with its own worker pool.
    pub fn new(config: &SchedulerConfig, main: MainThread) -> Result<Self> {
        let pool = WorkerPool::new(&config.pool)?;
        Ok(Self::with_pool(config, pool, main))
    }

    /// Build a center over an existing pool.
    pub fn with_pool(config: &SchedulerConfig, pool: WorkerPool, main: MainThread) -> Self {
        let io = BoundedExecutor::new("io", &config.io, pool.clone());
        let computation = BoundedExecutor::new("computation", &config.computation, pool.clone());
        let serial = LaneExecutor::serialize_all(BoundedExecutor::new("serial", &config.serial, pool.clone()));

        log::info!(
            "Scheduling center ready: io={}, computation={}, serial={}",
            io.window(),
            computation.window(),
            serial.executor().window()
        );

        Self {
            pool,
            lane_io: LaneExecutor::dedup(io.clone()),
            lane_cp: LaneExecutor::dedup(computation.clone()),
            io,
            computation,
            serial,
            lifecycle: Arc::new(LifecycleRegistry::new()),
            main,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn io(&self) -> &BoundedExecutor {
        &self.io
    }

    pub fn computation(&self) -> &BoundedExecutor {
        &self.computation
    }

    pub fn serial(&self) -> &LaneExecutor {
        &self.serial
    }

    pub fn lane_io(&self) -> &LaneExecutor {
        &self.lane_io
    }

    pub fn lane_cp(&self) -> &LaneExecutor {
        &self.lane_cp
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleRegistry> {
        &self.lifecycle
    }

    pub fn main(&self) -> &MainThread {
        &self.main
    }

    /// Task environment for `executor`, sharing this center's owner thread
    /// and registry.
    pub fn env_for(&self, executor: Arc<dyn TaskExecutor>) -> TaskEnv {
        TaskEnv {
            executor,
            main: self.main.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }

    /// Task on an arbitrary executor.
    pub fn task_on<J: Job>(&self, executor: Arc<dyn TaskExecutor>, job: J) -> Task<J> {
        Task::new(job, self.env_for(executor))
    }

    /// IO-bound task: dedup lane over `io`.
    pub fn io_task<J: Job>(&self, job: J) -> Task<J> {
        self.task_on(Arc::new(self.lane_io.clone()), job)
    }

    /// CPU-bound task: dedup lane over `computation`.
    pub fn cpu_task<J: Job>(&self, job: J) -> Task<J> {
        self.task_on(Arc::new(self.lane_cp.clone()), job)
    }

    /// Serial task: same-tag tasks run one at a time, in order.
    pub fn serial_task<J: Job>(&self, job: J) -> Task<J> {
        self.task_on(Arc::new(self.serial.clone()), job)
    }

    /// Forward an owner's lifecycle event to its tasks.
    pub fn notify(&self, owner: OwnerId, event: LifeEvent) -> usize {
        self.lifecycle.notify(owner, event)
    }

    /// Load of every bounded pipe.
    pub fn stats(&self) -> Vec<ExecutorStats> {
        vec![self.io.stats(), self.computation.stats(), self.serial.executor().stats()]
    }
}

impl std::fmt::Debug for SchedulingCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulingCenter")
            .field("io", &self.io)
            .field("computation", &self.computation)
            .field("serial", &self.serial)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipeConfig;
    use crate::task::{ChainJob, MainLoop, TaskStatus};
    use std::time::Duration;

    #[test]
    fn test_center_builds_configured_windows() {
        let (main, _main_loop) = MainLoop::new();
        let mut config = SchedulerConfig::default();
        config.io = PipeConfig::new(3, 0);
        let center = SchedulingCenter::new(&config, main).unwrap();

        assert_eq!(center.io().window(), 3);
        assert_eq!(center.lane_io().executor().name(), "io");
        assert_eq!(center.lane_cp().executor().name(), "computation");
        assert_eq!(center.serial().executor().name(), "serial");
        let names: Vec<_> = center.stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["io", "computation", "serial"]);
    }

    #[test]
    fn test_factories_share_owner_thread() {
        let (main, main_loop) = MainLoop::new();
        let center = SchedulingCenter::new(&SchedulerConfig::default(), main).unwrap();

        let io = center.io_task(ChainJob::<(), (), u8>::new().background(|_, _| Ok(1)));
        let cpu = center.cpu_task(ChainJob::<(), (), u8>::new().background(|_, _| Ok(2)));
        let serial = center.serial_task(ChainJob::<(), (), u8>::new().tag("s").background(|_, _| Ok(3)));
        io.execute(vec![]).unwrap();
        cpu.execute(vec![]).unwrap();
        serial.execute(vec![]).unwrap();

        let finished = main_loop.run_until(Duration::from_secs(5), || {
            [io.status(), cpu.status(), serial.status()]
                .iter()
                .all(|s| *s == TaskStatus::Finished)
        });
        assert!(finished);
        assert_eq!(io.result().unwrap() + cpu.result().unwrap() + serial.result().unwrap(), 6);
    }
}
