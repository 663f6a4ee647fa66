//! The unit a task runs: a background step plus owner-thread callbacks.

use std::time::Duration;

use super::CancelSignal;
use crate::error::{Result, TaskError};

/// Work performed by a [`Task`](super::Task).
///
/// `background` runs on a pool thread; every other method runs on the owner
/// thread. Methods take `&self`, so jobs keep mutable state behind their own
/// locks or atomics.
pub trait Job: Send + Sync + 'static {
    type Params: Send + 'static;
    type Progress: Send + 'static;
    type Output: Send + Sync + 'static;

    /// Lane tag used when the task does not set one.
    fn tag(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// Runs synchronously inside `execute`, before submission.
    fn on_setup(&self) {}

    /// The body. An `Err` (or a panic) finishes the task as cancelled.
    fn background(&self, params: Vec<Self::Params>, ctx: &WorkerContext<'_, Self::Progress>) -> eyre::Result<Self::Output>;

    fn on_progress(&self, _values: Vec<Self::Progress>) {}

    fn on_success(&self, _output: &Self::Output) {}

    /// Called instead of `on_success` when the task was cancelled, with the
    /// output if the body still managed to produce one.
    fn on_cancelled_with(&self, _output: Option<&Self::Output>) {
        self.on_cancelled();
    }

    fn on_cancelled(&self) {}

    /// Runs before `on_success` / `on_cancelled_with`.
    fn on_completing(&self) {}
}

/// What a running body can see of its task.
pub struct WorkerContext<'a, P> {
    signal: &'a CancelSignal,
    publisher: &'a dyn Fn(Vec<P>),
}

impl<'a, P> WorkerContext<'a, P> {
    pub fn new(signal: &'a CancelSignal, publisher: &'a dyn Fn(Vec<P>)) -> Self {
        Self { signal, publisher }
    }

    /// Send progress to the owner thread. Dropped once cancelled.
    pub fn publish(&self, values: Vec<P>) {
        if !self.signal.is_cancelled() {
            (self.publisher)(values);
        }
    }

    pub fn publish_one(&self, value: P) {
        self.publish(vec![value]);
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// `Err(TaskError::Cancelled)` once the task is cancelled; meant for `?`.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        Ok(())
    }

    /// Sleep that `cancel(true)` cuts short with `TaskError::Interrupted`.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        self.signal.sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Doubler;

    impl Job for Doubler {
        type Params = u32;
        type Progress = u32;
        type Output = Vec<u32>;

        fn background(&self, params: Vec<u32>, ctx: &WorkerContext<'_, u32>) -> eyre::Result<Vec<u32>> {
            let mut out = Vec::new();
            for p in params {
                ctx.check_cancelled()?;
                ctx.publish_one(p);
                out.push(p * 2);
            }
            Ok(out)
        }
    }

    #[test]
    fn test_default_tag_is_type_name() {
        assert!(Doubler.tag().ends_with("Doubler"));
    }

    #[test]
    fn test_background_publishes_progress() {
        let signal = CancelSignal::new();
        let seen = Mutex::new(Vec::new());
        let publisher = |values: Vec<u32>| seen.lock().extend(values);
        let ctx = WorkerContext::new(&signal, &publisher);

        let out = Doubler.background(vec![1, 2, 3], &ctx).unwrap();
        assert_eq!(out, vec![2, 4, 6]);
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_cancelled_context_stops_body() {
        let signal = CancelSignal::new();
        signal.cancel();
        let seen = Mutex::new(Vec::new());
        let publisher = |values: Vec<u32>| seen.lock().extend(values);
        let ctx = WorkerContext::new(&signal, &publisher);

        ctx.publish(vec![9]);
        assert!(seen.lock().is_empty());
        let err = Doubler.background(vec![1], &ctx).unwrap_err();
        assert!(matches!(err.downcast_ref::<TaskError>(), Some(TaskError::Cancelled)));
    }
}
