//! Progress reporting.
//!
//! This module defines the `Notification` stream a job emits while it runs,
//! the `Notifier` handle jobs send through, and `ProgressTracker`, a headless
//! fold over the stream that any front end (CLI, GUI, automation) can use to
//! drive a progress display.
//!
//! Notifications travel over a `crossbeam-channel`, so the producing job
//! thread never blocks on the consumer.

use crossbeam_channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::path::PathBuf;
use uuid::Uuid;

use crate::model::FileCounterResult;

/// Everything a running batch reports to the outside world.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    CreatingDirectory {
        path: PathBuf,
    },
    DirectoryCreated {
        path: PathBuf,
    },
    DirectoryCreationError {
        path: PathBuf,
        error: String,
    },
    DeletingDirectory {
        path: PathBuf,
    },
    DirectoryDeleted {
        path: PathBuf,
    },
    DirectoryDeletionError {
        path: PathBuf,
        error: String,
    },
    CreatingFile {
        source: PathBuf,
        target: PathBuf,
        size: u64,
    },
    FileCreated {
        source: PathBuf,
        target: PathBuf,
        size: u64,
    },
    ModifyingFile {
        source: PathBuf,
        target: PathBuf,
        size: u64,
    },
    FileModified {
        source: PathBuf,
        target: PathBuf,
        size: u64,
    },
    /// Sent after every chunk of a copy; `speed` is in bytes per second
    FileCopyProgress {
        source: PathBuf,
        target: PathBuf,
        transferred_bytes: u64,
        total_bytes: u64,
        speed: u64,
    },
    FileCopyError {
        source: PathBuf,
        target: PathBuf,
        size: u64,
        error: String,
    },
    DeletingFile {
        path: PathBuf,
        size: u64,
    },
    FileDeleted {
        path: PathBuf,
        size: u64,
    },
    FileDeletionError {
        path: PathBuf,
        size: u64,
        error: String,
    },
    /// One source file has been visited, whether or not it was copied
    FileProceeded {
        path: PathBuf,
        size: u64,
    },
    FilesCounted(FileCounterResult),
    JobStarted {
        id: Uuid,
        name: String,
    },
    JobFinished {
        id: Uuid,
        name: String,
        written_bytes: u64,
    },
    AllFinished {
        total_written_bytes: u64,
    },
}

impl Notification {
    /// True for the variants reporting a failed item.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Notification::DirectoryCreationError { .. }
                | Notification::DirectoryDeletionError { .. }
                | Notification::FileCopyError { .. }
                | Notification::FileDeletionError { .. }
        )
    }

    /// True for the variants announcing a change to one of the trees.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Notification::CreatingDirectory { .. }
                | Notification::DeletingDirectory { .. }
                | Notification::CreatingFile { .. }
                | Notification::ModifyingFile { .. }
                | Notification::DeletingFile { .. }
        )
    }
}

/// Sending half of a notification channel.
///
/// A disconnected receiver is not an error: a batch keeps running even when
/// nobody listens.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: Sender<Notification>,
}

impl Notifier {
    pub fn new(sender: Sender<Notification>) -> Self {
        Notifier { sender }
    }

    /// Create an unbounded channel and return both ends.
    pub fn channel() -> (Notifier, Receiver<Notification>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Notifier::new(sender), receiver)
    }

    /// A notifier with no receiver; everything sent through it is dropped.
    pub fn detached() -> Notifier {
        let (notifier, _receiver) = Notifier::channel();
        notifier
    }

    pub fn send(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }
}

/// Rolling arithmetic mean over the most recent speed samples.
#[derive(Debug, Clone)]
pub struct SpeedAverager {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl SpeedAverager {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SpeedAverager {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: u64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Mean of the stored samples, 0 when empty.
    pub fn average(&self) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        let sum: u128 = self.samples.iter().map(|&s| s as u128).sum();
        (sum / self.samples.len() as u128) as u64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Aggregated progress of a batch, built by applying notifications in order.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    counted: FileCounterResult,
    proceeded_files: u64,
    proceeded_bytes: u64,
    current_file_percent: f64,
    errors: u64,
    finished: bool,
    speed: SpeedAverager,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        ProgressTracker::new(500)
    }
}

impl ProgressTracker {
    pub fn new(speed_samples: usize) -> Self {
        ProgressTracker {
            counted: FileCounterResult::default(),
            proceeded_files: 0,
            proceeded_bytes: 0,
            current_file_percent: 0.0,
            errors: 0,
            finished: false,
            speed: SpeedAverager::new(speed_samples),
        }
    }

    /// Fold one notification into the totals.
    pub fn apply(&mut self, notification: &Notification) {
        match notification {
            Notification::FilesCounted(result) => {
                self.counted = *result;
                self.proceeded_files = 0;
                self.proceeded_bytes = 0;
                self.current_file_percent = 0.0;
                self.errors = 0;
                self.finished = false;
                self.speed.clear();
            }
            Notification::FileProceeded { size, .. } => {
                self.proceeded_files += 1;
                let proceeded = self.proceeded_bytes.saturating_add(*size);
                if proceeded > self.counted.counted_bytes {
                    tracing::debug!(
                        proceeded,
                        counted = self.counted.counted_bytes,
                        "proceeded bytes exceed counted bytes, capping"
                    );
                    self.proceeded_bytes = self.counted.counted_bytes;
                } else {
                    self.proceeded_bytes = proceeded;
                }
            }
            Notification::CreatingFile { .. } | Notification::ModifyingFile { .. } => {
                self.current_file_percent = 0.0;
            }
            Notification::FileCopyProgress {
                transferred_bytes,
                total_bytes,
                speed,
                ..
            } => {
                self.current_file_percent = if *total_bytes == 0 {
                    100.0
                } else {
                    *transferred_bytes as f64 / *total_bytes as f64 * 100.0
                };
                self.speed.push(*speed);
            }
            Notification::AllFinished { .. } => {
                self.proceeded_bytes = self.counted.counted_bytes;
                self.current_file_percent = 100.0;
                self.finished = true;
            }
            n if n.is_error() => self.errors += 1,
            _ => {}
        }
    }

    /// Overall completion in percent, 0 while nothing has been counted.
    pub fn percentage(&self) -> f64 {
        if self.counted.counted_bytes == 0 {
            return 0.0;
        }
        self.proceeded_bytes as f64 / self.counted.counted_bytes as f64 * 100.0
    }

    /// Average transfer speed in bytes per second.
    pub fn average_speed(&self) -> u64 {
        self.speed.average()
    }

    pub fn counted(&self) -> FileCounterResult {
        self.counted
    }

    pub fn proceeded_files(&self) -> u64 {
        self.proceeded_files
    }

    pub fn proceeded_bytes(&self) -> u64 {
        self.proceeded_bytes
    }

    pub fn current_file_percent(&self) -> f64 {
        self.current_file_percent
    }

    pub fn error_count(&self) -> u64 {
        self.errors
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
