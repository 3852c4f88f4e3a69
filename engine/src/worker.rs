//! Background execution of a batch of jobs.
//!
//! A `JobWorker` counts the batch on the caller's thread, then hands the queue
//! to a coordinator thread that runs one job at a time, each on its own
//! thread, in submission order.
//!
//! Notifications only flow once a caller subscribes through
//! `notifications()`; a worker nobody listens to buffers nothing.

use crossbeam_channel::Receiver;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::config::EngineOptions;
use crate::control::JobControl;
use crate::counter::FileCounter;
use crate::error::EngineError;
use crate::job::Job;
use crate::model::{FileCounterResult, JobConfiguration};
use crate::progress::{Notification, Notifier, ProgressTracker};

#[derive(Debug, Default)]
struct Queue {
    pending: VecDeque<Job>,
    active: Option<Arc<JobControl>>,
    paused: bool,
    stopped: bool,
}

#[derive(Debug, Default)]
struct Shared {
    queue: Mutex<Queue>,
    counting: AtomicBool,
    running: AtomicBool,
    total_written: AtomicU64,
    counted: Mutex<FileCounterResult>,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, Queue> {
        // A poisoned lock only means a panic elsewhere; the queue itself stays consistent
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Runs batches of jobs sequentially on a background thread.
#[derive(Debug)]
pub struct JobWorker {
    options: EngineOptions,
    notifier: Mutex<Notifier>,
    shared: Arc<Shared>,
    coordinator: Mutex<Option<JoinHandle<u64>>>,
}

impl Default for JobWorker {
    fn default() -> Self {
        JobWorker::new()
    }
}

impl JobWorker {
    pub fn new() -> Self {
        JobWorker::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        JobWorker {
            options,
            notifier: Mutex::new(Notifier::detached()),
            shared: Arc::new(Shared::default()),
            coordinator: Mutex::new(None),
        }
    }

    /// Subscribe to the notifications of the batches started from now on.
    ///
    /// Each call opens a new channel and replaces the previous subscription;
    /// clone the returned receiver to share it. Dropping every receiver makes
    /// later notifications be discarded instead of queued.
    pub fn notifications(&self) -> Receiver<Notification> {
        let (notifier, receiver) = Notifier::channel();
        *self.notifier.lock().unwrap_or_else(|e| e.into_inner()) = notifier;
        receiver
    }

    /// A progress tracker sized by this worker's speed sample window.
    pub fn progress_tracker(&self) -> ProgressTracker {
        ProgressTracker::new(self.options.speed_samples)
    }

    /// Start a batch on the local disk.
    ///
    /// A job previews when either `preview` or its own configuration asks for
    /// it.
    ///
    /// # Errors
    /// Returns `WorkerBusy` while a batch is running, `InvalidOptions` for bad
    /// engine options and `ThreadSpawn` if the coordinator cannot start.
    pub fn start(&self, configs: Vec<JobConfiguration>, preview: bool) -> Result<(), EngineError> {
        let jobs = configs
            .into_iter()
            .map(|config| {
                let preview = preview || config.preview;
                Job::new(config)
                    .with_options(self.options.clone())
                    .with_preview(preview)
            })
            .collect();
        self.start_jobs(jobs)
    }

    /// Start a batch of pre-built jobs.
    pub fn start_jobs(&self, jobs: Vec<Job>) -> Result<(), EngineError> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::WorkerBusy);
        }
        if let Err(e) = self.options.validate() {
            self.shared.running.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.reap();

        // Reset before counting so pause or stop requests made during the count stick
        {
            let mut queue = self.shared.queue();
            queue.pending.clear();
            queue.active = None;
            queue.paused = false;
            queue.stopped = false;
        }
        self.shared.total_written.store(0, Ordering::SeqCst);
        let notifier = self
            .notifier
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        self.shared.counting.store(true, Ordering::SeqCst);
        let counted = FileCounter::count_jobs(&jobs);
        self.shared.counting.store(false, Ordering::SeqCst);
        *self.shared.counted.lock().unwrap_or_else(|e| e.into_inner()) = counted;

        tracing::info!(
            jobs = jobs.len(),
            files = counted.counted_files,
            bytes = counted.counted_bytes,
            "batch counted"
        );
        notifier.send(Notification::FilesCounted(counted));

        {
            let mut queue = self.shared.queue();
            if queue.stopped {
                tracing::info!(dropped = jobs.len(), "batch stopped while counting");
            } else {
                queue.pending = jobs.into();
            }
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("treesync-worker".to_string())
            .spawn(move || coordinate(&shared, &notifier))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.queue().pending.clear();
                EngineError::ThreadSpawn(e)
            })?;

        *self.coordinator.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Hold the active job at its next checkpoint; later jobs start paused.
    pub fn pause(&self) {
        let mut queue = self.shared.queue();
        queue.paused = true;
        if let Some(control) = &queue.active {
            control.pause();
        }
    }

    pub fn resume(&self) {
        let mut queue = self.shared.queue();
        queue.paused = false;
        if let Some(control) = &queue.active {
            control.resume();
        }
    }

    /// Stop the active job and drop every job still queued.
    pub fn stop(&self) {
        let mut queue = self.shared.queue();
        queue.stopped = true;
        let dropped = queue.pending.len();
        queue.pending.clear();
        if let Some(control) = &queue.active {
            control.stop();
        }
        tracing::info!(dropped, "batch stop requested");
    }

    pub fn is_counting(&self) -> bool {
        self.shared.counting.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.queue().paused
    }

    /// Bytes written by the jobs of the current batch that have finished.
    pub fn total_written_bytes(&self) -> u64 {
        self.shared.total_written.load(Ordering::SeqCst)
    }

    pub fn file_counter_result(&self) -> FileCounterResult {
        *self.shared.counted.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until the current batch has ended.
    ///
    /// # Returns
    /// Total bytes written by the batch
    pub fn wait(&self) -> u64 {
        self.reap();
        self.total_written_bytes()
    }

    fn reap(&self) {
        let handle = self
            .coordinator
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("worker coordinator thread panicked");
            }
        }
    }
}

/// Coordinator loop: dequeue, run, accumulate, until the queue is empty.
fn coordinate(shared: &Shared, notifier: &Notifier) -> u64 {
    loop {
        let job = {
            let mut queue = shared.queue();
            if queue.stopped {
                queue.pending.clear();
            }
            let Some(job) = queue.pending.pop_front() else {
                queue.active = None;
                break;
            };
            if queue.paused {
                job.pause();
            }
            queue.active = Some(job.control());
            job
        };

        notifier.send(Notification::JobStarted {
            id: job.id(),
            name: job.name().to_string(),
        });

        let name = job.name().to_string();
        let job_notifier = notifier.clone();
        let spawned = thread::Builder::new()
            .name(format!("treesync-job-{}", name))
            .spawn(move || {
                let mut job = job;
                job.run(&job_notifier)
            });

        let outcome = match spawned {
            Ok(handle) => handle.join(),
            Err(e) => {
                tracing::error!(job = %name, error = %e, "failed to spawn job thread");
                shared.queue().active = None;
                continue;
            }
        };

        match outcome {
            Ok(Ok(written)) => {
                shared.total_written.fetch_add(written, Ordering::SeqCst);
            }
            Ok(Err(e)) => tracing::warn!(job = %name, error = %e, "job did not run"),
            Err(_) => tracing::error!(job = %name, "job thread panicked"),
        }
        shared.queue().active = None;
    }

    let total = shared.total_written.load(Ordering::SeqCst);
    shared.running.store(false, Ordering::SeqCst);
    tracing::info!(total_written_bytes = total, "batch finished");
    notifier.send(Notification::AllFinished {
        total_written_bytes: total,
    });
    total
}
