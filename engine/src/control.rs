//! Cooperative pause/stop token shared between a running job and its owner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Returned by a checkpoint once a stop has been requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("job was stopped")]
pub struct Interrupted;

/// Pause and stop flags consulted by a job between items.
///
/// A job only observes the flags at its checkpoints, so a single file copy
/// already in flight always runs to completion.
#[derive(Debug)]
pub struct JobControl {
    paused: AtomicBool,
    stopped: AtomicBool,
    poll_interval: Duration,
}

impl Default for JobControl {
    fn default() -> Self {
        JobControl::new(Duration::from_millis(50))
    }
}

impl JobControl {
    pub fn new(poll_interval: Duration) -> Self {
        JobControl {
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            poll_interval,
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Request the job to abort. Also releases a paused checkpoint.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Block while paused, then report whether the job may continue.
    pub fn checkpoint(&self) -> Result<(), Interrupted> {
        loop {
            if self.is_stopped() {
                return Err(Interrupted);
            }
            if !self.is_paused() {
                return Ok(());
            }
            thread::sleep(self.poll_interval);
        }
    }
}
