//! Cooperative cancellation flag with an interruptible sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, TaskError};

#[derive(Debug, Default)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    interrupted: Mutex<bool>,
    wake: Condvar,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag; returns true for the call that raised it.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wake every current and future [`sleep`](Self::sleep).
    pub fn interrupt(&self) {
        *self.interrupted.lock() = true;
        self.wake.notify_all();
    }

    pub fn is_interrupted(&self) -> bool {
        *self.interrupted.lock()
    }

    /// Sleep for `duration` unless interrupted first.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        let mut interrupted = self.interrupted.lock();
        while !*interrupted {
            if self.wake.wait_until(&mut interrupted, deadline).timed_out() {
                return if *interrupted { Err(TaskError::Interrupted) } else { Ok(()) };
            }
        }
        Err(TaskError::Interrupted)
    }
}
