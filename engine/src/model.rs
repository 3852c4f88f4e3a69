//! Core data model for reconciliation jobs.
//!
//! This module defines the values that flow between the caller and the engine:
//! - JobConfiguration: what to reconcile and how
//! - JobMode, JobState: enums controlling behavior and reporting lifecycle
//! - EntryInfo: one directory entry as seen through a `FileSystem`
//! - FileCounterResult: totals produced by the pre-flight count

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::path::PathBuf;
use std::time::SystemTime;

/// Caller-supplied description of one job.
///
/// The engine never mutates a configuration; a `Job` keeps its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfiguration {
    /// Display name, echoed back in job notifications
    pub name: String,

    /// First directory; the source of a backup
    pub directory_a: PathBuf,

    /// Second directory; the target of a backup
    pub directory_b: PathBuf,

    /// Backup (A → B) or Sync (A → B, then B → A)
    pub mode: JobMode,

    /// Dry run: report every decision, mutate nothing
    #[serde(default)]
    pub preview: bool,
}

impl JobConfiguration {
    pub fn new(
        name: impl Into<String>,
        directory_a: impl Into<PathBuf>,
        directory_b: impl Into<PathBuf>,
        mode: JobMode,
    ) -> Self {
        JobConfiguration {
            name: name.into(),
            directory_a: directory_a.into(),
            directory_b: directory_b.into(),
            mode,
            preview: false,
        }
    }

    /// Same configuration with preview enabled.
    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }
}

/// How a job reconciles its directory pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    /// One pass, A is the source and B the target
    Backup,
    /// Two passes, A → B then B → A
    Sync,
}

impl std::fmt::Display for JobMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobMode::Backup => write!(f, "Backup"),
            JobMode::Sync => write!(f, "Sync"),
        }
    }
}

/// Lifecycle of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Created, not yet started
    Idle,
    /// Currently traversing
    Running,
    /// Running, but holding at the next checkpoint
    Paused,
    /// Traversal completed (some items may have failed)
    Finished,
    /// Traversal aborted by a stop request
    Stopped,
}

impl JobState {
    /// Returns true if this state is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Stopped)
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// File name relative to the listed directory
    pub name: OsString,

    /// True if this entry is a directory
    pub is_directory: bool,

    /// Length in bytes (0 for directories)
    pub size: u64,

    /// Last write time
    pub modified: SystemTime,
}

impl EntryInfo {
    pub fn file(name: impl Into<OsString>, size: u64, modified: SystemTime) -> Self {
        EntryInfo {
            name: name.into(),
            is_directory: false,
            size,
            modified,
        }
    }

    pub fn directory(name: impl Into<OsString>, modified: SystemTime) -> Self {
        EntryInfo {
            name: name.into(),
            is_directory: true,
            size: 0,
            modified,
        }
    }
}

/// Aggregate totals of the pre-flight count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCounterResult {
    pub counted_files: u64,
    pub counted_bytes: u64,
}

impl FileCounterResult {
    pub fn new(counted_files: u64, counted_bytes: u64) -> Self {
        FileCounterResult {
            counted_files,
            counted_bytes,
        }
    }
}

impl Add for FileCounterResult {
    type Output = FileCounterResult;

    fn add(self, other: FileCounterResult) -> FileCounterResult {
        FileCounterResult {
            counted_files: self.counted_files + other.counted_files,
            counted_bytes: self.counted_bytes + other.counted_bytes,
        }
    }
}

impl AddAssign for FileCounterResult {
    fn add_assign(&mut self, other: FileCounterResult) {
        *self = *self + other;
    }
}

impl Sum for FileCounterResult {
    fn sum<I: Iterator<Item = FileCounterResult>>(iter: I) -> Self {
        iter.fold(FileCounterResult::default(), Add::add)
    }
}
