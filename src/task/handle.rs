//! Task handle: runs one job through an executor and reports back on the
//! owner thread.
//!
//! # Lifecycle
//!
//! ```text
//! Pending ──execute──▶ Running ──(body done | cancel)──▶ settle ──post──▶ finish ──▶ Finished
//! ```
//!
//! The worker body and `cancel` race for the `invoked` claim. Whoever wins
//! settles the outcome, so completion is posted exactly once.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use log::Level;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use super::{CancelSignal, Job, MainThread, WorkerContext};
use crate::error::{Result, TaskError};
use crate::executor::{TaskExecutor, Work};
use crate::id::{OwnerId, WorkId};
use crate::lifecycle::{LifeEvent, LifecycleListener, LifecycleRegistry};
use crate::queue::Priority;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;

/// Coarse task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Finished,
}

impl TaskStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            PENDING => TaskStatus::Pending,
            RUNNING => TaskStatus::Running,
            _ => TaskStatus::Finished,
        }
    }
}

/// Everything a task needs from its surroundings.
#[derive(Clone)]
pub struct TaskEnv {
    pub executor: Arc<dyn TaskExecutor>,
    pub main: MainThread,
    pub lifecycle: Arc<LifecycleRegistry>,
}

struct Outcome<O> {
    done: bool,
    output: Option<Arc<O>>,
}

struct TaskCore<J: Job> {
    this: Weak<TaskCore<J>>,
    id: WorkId,
    job: J,
    tag: Mutex<Option<String>>,
    priority: Mutex<Priority>,
    owner: Mutex<Option<OwnerId>>,
    status: AtomicU8,
    signal: CancelSignal,
    invoked: AtomicBool,
    params: Mutex<Option<Vec<J::Params>>>,
    outcome: Mutex<Outcome<J::Output>>,
    settled: Condvar,
    submitted_at: Mutex<Option<Instant>>,
    elapsed: Mutex<Option<Duration>>,
    env: TaskEnv,
}

/// Handle to a scheduled job. Clones share the same task.
pub struct Task<J: Job> {
    core: Arc<TaskCore<J>>,
}

impl<J: Job> Clone for Task<J> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<J: Job> Task<J> {
    pub fn new(job: J, env: TaskEnv) -> Self {
        let core = Arc::new_cyclic(|this| TaskCore {
            this: this.clone(),
            id: WorkId::next(),
            job,
            tag: Mutex::new(None),
            priority: Mutex::new(Priority::Normal),
            owner: Mutex::new(None),
            status: AtomicU8::new(PENDING),
            signal: CancelSignal::new(),
            invoked: AtomicBool::new(false),
            params: Mutex::new(None),
            outcome: Mutex::new(Outcome {
                done: false,
                output: None,
            }),
            settled: Condvar::new(),
            submitted_at: Mutex::new(None),
            elapsed: Mutex::new(None),
            env,
        });
        Self { core }
    }

    /// Override the job's lane tag. An empty tag bypasses lanes.
    pub fn tag(&self, tag: impl Into<String>) -> &Self {
        *self.core.tag.lock() = Some(tag.into());
        self
    }

    pub fn priority(&self, priority: Priority) -> &Self {
        *self.core.priority.lock() = priority;
        self
    }

    /// Follow `owner`'s lifecycle: cancelled on destroy, reprioritized on
    /// show and hide.
    pub fn bind_owner(&self, owner: OwnerId) -> &Self {
        let previous = self.core.owner.lock().replace(owner);
        if let Some(previous) = previous
            && previous != owner
        {
            self.core.env.lifecycle.unregister(previous, self.core.as_ref());
        }
        self.core.env.lifecycle.register(owner, &self.core);
        self
    }

    /// Bind to the identity of a live value.
    pub fn bind_to<T: ?Sized>(&self, owner: &T) -> &Self {
        self.bind_owner(OwnerId::of(owner))
    }

    /// Run `on_setup` and submit the body.
    ///
    /// Does nothing unless the task is still pending and not cancelled. A
    /// capacity rejection is returned here; the task then finishes cancelled.
    pub fn execute(&self, params: Vec<J::Params>) -> Result<()> {
        let core = &self.core;
        if core.signal.is_cancelled() {
            log::debug!("Task {} cancelled before execute", core.id);
            return Ok(());
        }
        if core
            .status
            .compare_exchange(PENDING, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("Task {} executed more than once", core.id);
            return Ok(());
        }

        *core.submitted_at.lock() = Some(Instant::now());
        core.job.on_setup();
        *core.params.lock() = Some(params);

        let tag = core.effective_tag();
        let priority = *core.priority.lock();
        let body = {
            let core = Arc::clone(core);
            move || core.run_worker()
        };
        let abort = {
            let core = Arc::clone(core);
            move || {
                core.cancel(false);
            }
        };

        tracing::debug!(task = %core.id, tag = %tag, priority = ?priority, "submitting task");
        core.env
            .executor
            .submit(Work::with_id(core.id, body).on_abort(abort), &tag, priority, None)
    }

    /// Cancel the task. Returns false if it was already cancelled or done.
    ///
    /// With `may_interrupt`, a body blocked in `WorkerContext::sleep` wakes up
    /// with `TaskError::Interrupted`.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        self.core.cancel(may_interrupt)
    }

    /// Block until the body produced a value or the task was cancelled.
    pub fn result(&self) -> Result<J::Output>
    where
        J::Output: Clone,
    {
        let mut outcome = self.core.outcome.lock();
        loop {
            if let Some(result) = self.core.settled_result(&outcome) {
                return result;
            }
            self.core.settled.wait(&mut outcome);
        }
    }

    /// Like [`result`](Self::result) but gives up after `timeout` without
    /// affecting the task.
    pub fn result_timeout(&self, timeout: Duration) -> Result<J::Output>
    where
        J::Output: Clone,
    {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.core.outcome.lock();
        loop {
            if let Some(result) = self.core.settled_result(&outcome) {
                return result;
            }
            if self.core.settled.wait_until(&mut outcome, deadline).timed_out() {
                return self
                    .core
                    .settled_result(&outcome)
                    .unwrap_or(Err(TaskError::Timeout(timeout)));
            }
        }
    }

    pub fn id(&self) -> WorkId {
        self.core.id
    }

    pub fn status(&self) -> TaskStatus {
        self.core.status()
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.signal.is_cancelled()
    }

    /// True once the outcome is settled (body returned, or cancelled before it ran).
    pub fn is_done(&self) -> bool {
        self.core.outcome.lock().done
    }

    pub fn current_priority(&self) -> Priority {
        *self.core.priority.lock()
    }

    pub fn owner(&self) -> Option<OwnerId> {
        *self.core.owner.lock()
    }

    pub fn job(&self) -> &J {
        &self.core.job
    }

    /// Time spent in `background`, once it has returned.
    pub fn elapsed(&self) -> Option<Duration> {
        *self.core.elapsed.lock()
    }
}

impl<J: Job> std::fmt::Debug for Task<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.core.id)
            .field("status", &self.core.status())
            .field("cancelled", &self.core.signal.is_cancelled())
            .finish()
    }
}

impl<J: Job> TaskCore<J> {
    fn status(&self) -> TaskStatus {
        TaskStatus::from_raw(self.status.load(Ordering::SeqCst))
    }

    fn effective_tag(&self) -> String {
        self.tag.lock().clone().unwrap_or_else(|| self.job.tag())
    }

    fn settled_result(&self, outcome: &Outcome<J::Output>) -> Option<Result<J::Output>>
    where
        J::Output: Clone,
    {
        if self.signal.is_cancelled() {
            return Some(Err(TaskError::Cancelled));
        }
        if outcome.done {
            return Some(outcome.output.as_deref().cloned().ok_or(TaskError::Cancelled));
        }
        None
    }

    /// Runs on a pool thread.
    fn run_worker(&self) {
        if self.invoked.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut output = None;
        if !self.signal.is_cancelled() {
            let params = self.params.lock().take().unwrap_or_default();
            let publisher = |values: Vec<J::Progress>| self.post_progress(values);
            let ctx = WorkerContext::new(&self.signal, &publisher);

            let started = Instant::now();
            let result = panic::catch_unwind(AssertUnwindSafe(|| self.job.background(params, &ctx)));
            *self.elapsed.lock() = Some(started.elapsed());

            match result {
                Ok(Ok(value)) => output = Some(Arc::new(value)),
                Ok(Err(e)) => {
                    self.signal.cancel();
                    if log::log_enabled!(Level::Debug) {
                        log::error!("Task {} failed: {:?}", self.id, e);
                    }
                }
                Err(_) => {
                    self.signal.cancel();
                    if log::log_enabled!(Level::Debug) {
                        log::error!("Task {} panicked in background", self.id);
                    }
                }
            }
        }
        self.settle(output);
    }

    fn post_progress(&self, values: Vec<J::Progress>) {
        if self.signal.is_cancelled() {
            return;
        }
        let Some(core) = self.this.upgrade() else {
            return;
        };
        self.env.main.post(move || {
            if !core.signal.is_cancelled() {
                core.job.on_progress(values);
            }
        });
    }

    fn settle(&self, output: Option<Arc<J::Output>>) {
        {
            let mut outcome = self.outcome.lock();
            outcome.done = true;
            outcome.output = output;
        }
        self.settled.notify_all();

        if let Some(core) = self.this.upgrade() {
            self.env.main.post(move || core.finish());
        }
    }

    /// Runs on the owner thread, once.
    fn finish(&self) {
        self.job.on_completing();
        self.detach();

        let cancelled = self.signal.is_cancelled();
        let output = self.outcome.lock().output.clone();
        if cancelled {
            self.job.on_cancelled_with(output.as_deref());
        } else if let Some(output) = &output {
            self.job.on_success(output);
        }

        if log::log_enabled!(Level::Debug)
            && let Some(at) = *self.submitted_at.lock()
        {
            let phase = if cancelled { "cancel" } else { "finish" };
            log::debug!("Task {} {}, execute: {} ms", self.id, phase, at.elapsed().as_millis());
        }
        self.status.store(FINISHED, Ordering::SeqCst);
    }

    fn detach(&self) {
        let owner = self.owner.lock().take();
        if let Some(owner) = owner {
            self.env.lifecycle.unregister(owner, self);
        }
    }

    fn cancel(&self, may_interrupt: bool) -> bool {
        {
            let priority = self.priority.lock();
            if !priority.is_immediate() {
                // Dropping the returned item releases its references to this task
                drop(self.env.executor.remove(self.id, *priority));
            }
        }

        {
            let outcome = self.outcome.lock();
            if outcome.done || self.signal.is_cancelled() {
                return false;
            }
            self.signal.cancel();
        }
        self.settled.notify_all();
        if may_interrupt {
            self.signal.interrupt();
        }

        log::debug!("Task {} cancelled", self.id);
        if !self.invoked.swap(true, Ordering::SeqCst) {
            self.settle(None);
        }
        true
    }
}

impl<J: Job> LifecycleListener for TaskCore<J> {
    fn on_event(&self, event: LifeEvent) {
        match event {
            LifeEvent::Destroy => {
                if self.signal.is_cancelled() || self.status() == TaskStatus::Finished {
                    return;
                }
                // The registry has already forgotten this owner
                *self.owner.lock() = None;
                self.cancel(true);
            }
            LifeEvent::Show | LifeEvent::Hide => {
                let delta = if event == LifeEvent::Show { 1 } else { -1 };
                let mut priority = self.priority.lock();
                *priority = self.env.executor.change_priority(self.id, *priority, delta);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipeConfig, PoolConfig};
    use crate::executor::{BoundedExecutor, WorkerPool};
    use crate::task::{ChainJob, MainLoop};
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(5);

    fn setup(window: usize) -> (TaskEnv, MainLoop, BoundedExecutor) {
        let pool = WorkerPool::new(&PoolConfig::default()).unwrap();
        let executor = BoundedExecutor::new("task-test", &PipeConfig::new(window, 0), pool);
        let (main, main_loop) = MainLoop::new();
        let env = TaskEnv {
            executor: Arc::new(executor.clone()),
            main,
            lifecycle: Arc::new(LifecycleRegistry::new()),
        };
        (env, main_loop, executor)
    }

    #[derive(Default)]
    struct Counters {
        success: AtomicUsize,
        cancelled: AtomicUsize,
        completing: AtomicUsize,
        progress: Mutex<Vec<u32>>,
    }

    struct Counting {
        counters: Arc<Counters>,
        fail: bool,
    }

    impl Job for Counting {
        type Params = u32;
        type Progress = u32;
        type Output = u32;

        fn background(&self, params: Vec<u32>, ctx: &WorkerContext<'_, u32>) -> eyre::Result<u32> {
            if self.fail {
                eyre::bail!("requested failure");
            }
            for p in &params {
                ctx.publish_one(*p);
            }
            Ok(params.iter().sum())
        }

        fn on_progress(&self, values: Vec<u32>) {
            self.counters.progress.lock().extend(values);
        }

        fn on_success(&self, _output: &u32) {
            self.counters.success.fetch_add(1, Ordering::SeqCst);
        }

        fn on_cancelled(&self) {
            self.counters.cancelled.fetch_add(1, Ordering::SeqCst);
        }

        fn on_completing(&self) {
            self.counters.completing.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting(fail: bool) -> (Counting, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (
            Counting {
                counters: counters.clone(),
                fail,
            },
            counters,
        )
    }

    #[test]
    fn test_success_path() {
        let (env, main_loop, _) = setup(2);
        let (job, counters) = counting(false);
        let task = Task::new(job, env);

        task.execute(vec![1, 2, 3]).unwrap();
        assert_eq!(task.result_timeout(WAIT).unwrap(), 6);
        assert!(main_loop.run_until(WAIT, || task.status() == TaskStatus::Finished));

        assert_eq!(counters.success.load(Ordering::SeqCst), 1);
        assert_eq!(counters.cancelled.load(Ordering::SeqCst), 0);
        assert_eq!(counters.completing.load(Ordering::SeqCst), 1);
        assert_eq!(*counters.progress.lock(), vec![1, 2, 3]);
        assert!(task.elapsed().is_some());
    }

    #[test]
    fn test_failure_finishes_cancelled() {
        let (env, main_loop, _) = setup(2);
        let (job, counters) = counting(true);
        let task = Task::new(job, env);

        task.execute(vec![1]).unwrap();
        assert!(matches!(task.result_timeout(WAIT), Err(TaskError::Cancelled)));
        assert!(main_loop.run_until(WAIT, || task.status() == TaskStatus::Finished));
        assert_eq!(counters.success.load(Ordering::SeqCst), 0);
        assert_eq!(counters.cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_body_finishes_cancelled() {
        let (env, main_loop, _) = setup(1);
        let cancelled = Arc::new(AtomicUsize::new(0));
        let counter = cancelled.clone();
        let job: ChainJob<(), (), ()> = ChainJob::new()
            .background(|_, _| panic!("body exploded"))
            .cancelled(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        let task = Task::new(job, env);

        task.execute(vec![]).unwrap();
        assert!(main_loop.run_until(WAIT, || task.status() == TaskStatus::Finished));
        assert!(task.is_cancelled());
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_queued_task_finishes_once() {
        let (env, main_loop, executor) = setup(1);
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        executor
            .execute(Work::new(move || {
                started_tx.send(()).unwrap();
                let _ = gate.recv_timeout(WAIT);
            }))
            .unwrap();
        started_rx.recv_timeout(WAIT).unwrap();

        let (job, counters) = counting(false);
        let task = Task::new(job, env);
        task.execute(vec![5]).unwrap();
        assert_eq!(executor.queued_count(), 1);

        assert!(task.cancel(false));
        assert!(!task.cancel(true));
        assert_eq!(executor.queued_count(), 0);
        assert!(matches!(task.result(), Err(TaskError::Cancelled)));

        release.send(()).unwrap();
        assert!(main_loop.run_until(WAIT, || task.status() == TaskStatus::Finished));
        assert_eq!(counters.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(counters.completing.load(Ordering::SeqCst), 1);
        assert_eq!(counters.success.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_interrupts_sleeping_body() {
        let (env, main_loop, _) = setup(1);
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let started_tx = Mutex::new(started_tx);
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        let job: ChainJob<(), (), ()> = ChainJob::new().background(move |_, ctx| {
            started_tx.lock().send(()).unwrap();
            if let Err(TaskError::Interrupted) = ctx.sleep(Duration::from_secs(30)) {
                flag.store(true, Ordering::SeqCst);
            }
            Ok(())
        });
        let task = Task::new(job, env);

        task.execute(vec![]).unwrap();
        started_rx.recv_timeout(WAIT).unwrap();
        assert!(task.cancel(true));

        assert!(main_loop.run_until(WAIT, || task.status() == TaskStatus::Finished));
        assert!(interrupted.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_after_finish_returns_false() {
        let (env, main_loop, _) = setup(1);
        let (job, _) = counting(false);
        let task = Task::new(job, env);

        task.execute(vec![1]).unwrap();
        assert!(main_loop.run_until(WAIT, || task.status() == TaskStatus::Finished));
        assert!(!task.cancel(true));
        assert!(!task.is_cancelled());
    }

    #[test]
    fn test_execute_twice_is_noop() {
        let (env, main_loop, _) = setup(1);
        let (job, counters) = counting(false);
        let task = Task::new(job, env);

        task.execute(vec![1]).unwrap();
        task.execute(vec![2]).unwrap();
        assert!(main_loop.run_until(WAIT, || task.status() == TaskStatus::Finished));
        assert_eq!(counters.success.load(Ordering::SeqCst), 1);
        assert_eq!(task.result().unwrap(), 1);
    }

    #[test]
    fn test_result_timeout_leaves_task_alone() {
        let (env, main_loop, _) = setup(1);
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let gate = Mutex::new(gate);
        let job: ChainJob<(), (), u8> = ChainJob::new().background(move |_, _| {
            let _ = gate.lock().recv_timeout(WAIT);
            Ok(9)
        });
        let task = Task::new(job, env);

        task.execute(vec![]).unwrap();
        assert!(matches!(
            task.result_timeout(Duration::from_millis(20)),
            Err(TaskError::Timeout(_))
        ));
        assert!(!task.is_cancelled());

        release.send(()).unwrap();
        assert_eq!(task.result_timeout(WAIT).unwrap(), 9);
        assert!(main_loop.run_until(WAIT, || task.status() == TaskStatus::Finished));
    }

    #[test]
    fn test_destroy_cancels_bound_task() {
        let (env, main_loop, executor) = setup(1);
        let lifecycle = env.lifecycle.clone();
        let (release, gate) = std::sync::mpsc::channel::<()>();
        executor
            .execute(Work::new(move || {
                let _ = gate.recv_timeout(WAIT);
            }))
            .unwrap();

        let (job, counters) = counting(false);
        let task = Task::new(job, env);
        let owner = OwnerId::new(42).unwrap();
        task.bind_owner(owner);
        task.execute(vec![1]).unwrap();
        assert_eq!(lifecycle.listener_count(owner), 1);

        assert_eq!(lifecycle.notify(owner, LifeEvent::Destroy), 1);
        assert!(task.is_cancelled());
        assert_eq!(task.owner(), None);

        release.send(()).unwrap();
        assert!(main_loop.run_until(WAIT, || task.status() == TaskStatus::Finished));
        assert_eq!(counters.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.holder_count(), 0);
    }

    #[test]
    fn test_finish_unregisters_from_owner() {
        let (env, main_loop, _) = setup(1);
        let lifecycle = env.lifecycle.clone();
        let (job, _) = counting(false);
        let task = Task::new(job, env);
        let owner = OwnerId::new(7).unwrap();

        task.bind_owner(owner).priority(Priority::High);
        task.execute(vec![]).unwrap();
        assert!(main_loop.run_until(WAIT, || task.status() == TaskStatus::Finished));
        assert_eq!(lifecycle.listener_count(owner), 0);
        assert_eq!(task.owner(), None);
    }

    #[test]
    fn test_hide_and_show_shift_queued_priority() {
        let (env, main_loop, executor) = setup(1);
        let lifecycle = env.lifecycle.clone();
        let (release, gate) = std::sync::mpsc::channel::<()>();
        executor
            .execute(Work::new(move || {
                let _ = gate.recv_timeout(WAIT);
            }))
            .unwrap();

        let (job, _) = counting(false);
        let task = Task::new(job, env);
        let owner = OwnerId::new(9).unwrap();
        task.bind_owner(owner);
        task.execute(vec![]).unwrap();

        lifecycle.notify(owner, LifeEvent::Hide);
        assert_eq!(task.current_priority(), Priority::Low);
        lifecycle.notify(owner, LifeEvent::Show);
        assert_eq!(task.current_priority(), Priority::Normal);

        release.send(()).unwrap();
        assert!(main_loop.run_until(WAIT, || task.status() == TaskStatus::Finished));
    }

    #[test]
    fn test_rejected_task_finishes_cancelled() {
        let pool = WorkerPool::new(&PoolConfig::default()).unwrap();
        let executor = BoundedExecutor::new("tiny", &PipeConfig::new(1, 1), pool);
        let (main, main_loop) = MainLoop::new();
        let env = TaskEnv {
            executor: Arc::new(executor.clone()),
            main,
            lifecycle: Arc::new(LifecycleRegistry::new()),
        };
        let (release, gate) = std::sync::mpsc::channel::<()>();
        executor
            .execute(Work::new(move || {
                let _ = gate.recv_timeout(WAIT);
            }))
            .unwrap();

        let (job, counters) = counting(false);
        let task = Task::new(job, env);
        assert!(matches!(task.execute(vec![1]), Err(TaskError::Rejected { .. })));
        assert!(task.is_cancelled());

        assert!(main_loop.run_until(WAIT, || task.status() == TaskStatus::Finished));
        assert_eq!(counters.cancelled.load(Ordering::SeqCst), 1);
        release.send(()).unwrap();
    }

    #[test]
    fn test_cancel_before_execute() {
        let (env, main_loop, _) = setup(1);
        let (job, counters) = counting(false);
        let task = Task::new(job, env);

        assert!(task.cancel(false));
        task.execute(vec![1]).unwrap();
        assert!(main_loop.run_until(WAIT, || task.status() == TaskStatus::Finished));
        assert_eq!(counters.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(counters.success.load(Ordering::SeqCst), 0);
    }
}
