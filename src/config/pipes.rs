//! Worker pool and executor settings.

use serde::{Deserialize, Serialize};

use crate::executor::RejectionPolicy;

/// Default idle keep-alive for pool threads, in seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

/// Default ceiling on pool threads.
pub const DEFAULT_MAX_THREADS: usize = 512;

/// Shared worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on simultaneously alive worker threads.
    #[serde(rename = "max-threads")]
    pub max_threads: usize,

    /// Seconds an idle worker thread lingers before exiting.
    #[serde(rename = "keep-alive-secs")]
    pub keep_alive_secs: u64,

    /// Thread name prefix; threads are named "<prefix> #<n>".
    #[serde(rename = "thread-name")]
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: DEFAULT_MAX_THREADS,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            thread_name: "Task".to_string(),
        }
    }
}

/// Settings for one bounded executor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipeConfig {
    /// Maximum number of items running at once (values below 1 act as 1).
    pub window: usize,

    /// Maximum queued + running items; 0 means unlimited.
    pub capacity: usize,

    /// What happens to work submitted past capacity.
    pub rejection: RejectionPolicy,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

impl PipeConfig {
    /// Create a pipe config with the default rejection policy.
    pub fn new(window: usize, capacity: usize) -> Self {
        Self {
            window,
            capacity,
            rejection: RejectionPolicy::default(),
        }
    }

    /// Set the rejection policy.
    pub fn with_rejection(mut self, rejection: RejectionPolicy) -> Self {
        self.rejection = rejection;
        self
    }

    /// IO-bound work: wide window.
    pub fn io() -> Self {
        Self::new(16, 512)
    }

    /// CPU-bound work: window follows the core count, between 2 and 6.
    pub fn computation() -> Self {
        Self::new(cpu_count().clamp(2, 6), 256)
    }

    /// Serialized lanes: window follows the core count, between 2 and 4.
    pub fn serial() -> Self {
        Self::new(cpu_count().clamp(2, 4), 512)
    }

    /// Capacity as an option; `None` when unlimited.
    pub fn capacity_limit(&self) -> Option<usize> {
        (self.capacity > 0).then_some(self.capacity)
    }
}

/// Number of available cores, 1 when unknown.
pub fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
