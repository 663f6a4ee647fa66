//! Owner thread: a single queue of callbacks run in post order.
//!
//! Completion and progress callbacks of every task are delivered here. The
//! embedding application drives the loop on whichever thread owns its state
//! (or hands it a dedicated thread with [`MainLoop::spawn`]).

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::Result;

type Callback = Box<dyn FnOnce() + Send>;

/// Posting side of the owner thread. Cheap to clone.
#[derive(Clone)]
pub struct MainThread {
    tx: mpsc::Sender<Callback>,
}

impl MainThread {
    /// Queue `callback` for the owner thread.
    ///
    /// When the loop no longer exists the callback runs right here instead,
    /// so a completion is never lost.
    pub fn post(&self, callback: impl FnOnce() + Send + 'static) {
        if let Err(mpsc::SendError(callback)) = self.tx.send(Box::new(callback)) {
            log::warn!("Owner loop is gone, running callback inline");
            callback();
        }
    }
}

impl std::fmt::Debug for MainThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MainThread")
    }
}

/// Receiving side of the owner thread.
pub struct MainLoop {
    rx: mpsc::Receiver<Callback>,
}

impl MainLoop {
    pub fn new() -> (MainThread, MainLoop) {
        let (tx, rx) = mpsc::channel();
        (MainThread { tx }, MainLoop { rx })
    }

    /// Run callbacks until every `MainThread` handle is dropped.
    pub fn run(self) {
        for callback in self.rx.iter() {
            callback();
        }
        log::debug!("Owner loop ended");
    }

    /// Run whatever is queued right now and return how many callbacks ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.rx.try_recv() {
            callback();
            ran += 1;
        }
        ran
    }

    /// Run callbacks until `done` returns true or `timeout` elapses.
    ///
    /// Returns the final value of `done`.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_until_idle();
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.rx.recv_timeout(deadline - now) {
                Ok(callback) => callback(),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return done(),
            }
        }
    }

    /// Move the loop onto a dedicated, named thread.
    pub fn spawn(self, name: &str) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || self.run())?;
        Ok(handle)
    }
}
