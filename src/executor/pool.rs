//! Shared worker pool.
//!
//! Every executor dispatches onto the same pool. Threads are created on
//! demand, up to `max_threads`, and exit after sitting idle for the
//! keep-alive period. The pool is the blocking-thread pool of a tokio
//! runtime, either owned here or borrowed through an existing `Handle`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::config::PoolConfig;
use crate::error::Result;

/// Owned runtime; shut down without waiting so the last handle can be
/// dropped from any thread, including one of its own workers.
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Cheaply cloneable handle to the shared worker pool.
#[derive(Clone)]
pub struct WorkerPool {
    handle: Handle,
    _owned: Option<Arc<OwnedRuntime>>,
}

impl WorkerPool {
    /// Build a dedicated pool from configuration.
    pub fn new(config: &PoolConfig) -> Result<Self> {
        let counter = AtomicUsize::new(1);
        let prefix = config.thread_name.clone();

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.max_threads.max(1))
            .thread_keep_alive(Duration::from_secs(config.keep_alive_secs))
            .thread_name_fn(move || format!("{} #{}", prefix, counter.fetch_add(1, Ordering::Relaxed)))
            .enable_all()
            .build()?;

        log::debug!(
            "Worker pool started (max_threads={}, keep_alive={}s)",
            config.max_threads,
            config.keep_alive_secs
        );

        Ok(Self {
            handle: runtime.handle().clone(),
            _owned: Some(Arc::new(OwnedRuntime(Some(runtime)))),
        })
    }

    /// Reuse the blocking pool of an existing runtime.
    pub fn from_handle(handle: Handle) -> Self {
        Self { handle, _owned: None }
    }

    /// Run `job` on a pool thread.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        // Completion is tracked by the executors, not through the join handle
        drop(self.handle.spawn_blocking(job));
    }

    /// Handle of the underlying runtime.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("owned", &self._owned.is_some())
            .finish()
    }
}
