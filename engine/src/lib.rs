//! # treesync Engine - Directory Reconciliation Library
//!
//! A headless engine that keeps pairs of directory trees in step.
//! Designed as the foundation for multiple front ends (CLI, GUI, automation).
//!
//! ## Overview
//!
//! Given pairs of directories, the engine detects new, modified and orphaned
//! files and reconciles them either one way (backup) or both ways (sync).
//! It features:
//! - Pre-flight counting of every batch to size progress reporting
//! - Sequential job queue with pause, resume and stop
//! - Per-item error isolation: a failed file never aborts a job
//! - Progress reporting via a notification channel (decoupled from UI technology)
//! - Dry-run preview of every decision
//! - Pluggable `FileSystem` adapters per side
//!
//! ## Basic Usage
//!
//! ```no_run
//! use treesync_engine::{JobConfiguration, JobMode, JobWorker, Notification};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let worker = JobWorker::new();
//! let notifications = worker.notifications();
//!
//! worker.start(
//!     vec![JobConfiguration::new("Documents", "/home/me/docs", "/mnt/backup/docs", JobMode::Backup)],
//!     false,
//! )?;
//!
//! let mut tracker = worker.progress_tracker();
//! for notification in notifications.iter() {
//!     tracker.apply(&notification);
//!     if let Notification::AllFinished { total_written_bytes } = notification {
//!         println!("{} bytes written ({:.0}%)", total_written_bytes, tracker.percentage());
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (JobConfiguration, EntryInfo, enums)
//! - **error**: Error types and handling
//! - **config**: Engine tuning options
//! - **fs_ops**: The `FileSystem` trait, local implementation and streaming copy
//! - **control**: Pause/stop token shared with a running job
//! - **progress**: Notifications and the progress tracker
//! - **counter**: Pre-flight file counting
//! - **job**: A single backup or sync job and its reconciliation pass
//! - **worker**: Sequential background execution of job batches

pub mod config;
pub mod control;
pub mod counter;
pub mod error;
pub mod fs_ops;
pub mod job;
pub mod model;
pub mod progress;
pub mod worker;

// Re-export main types
pub use config::EngineOptions;
pub use control::{Interrupted, JobControl};
pub use counter::FileCounter;
pub use error::EngineError;
pub use fs_ops::{copy_file, FileSystem, LocalFileSystem, TransferProgress};
pub use job::Job;
pub use model::{EntryInfo, FileCounterResult, JobConfiguration, JobMode, JobState};
pub use progress::{Notification, Notifier, ProgressTracker, SpeedAverager};
pub use worker::JobWorker;
