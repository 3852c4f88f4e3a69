//! Error types for the reconciliation engine.
//!
//! `EngineError` covers both job-level failures (a worker that is already busy,
//! a job run twice) and the per-item I/O failures produced by a `FileSystem`.
//! Per-item failures never abort a job: the traversal turns them into error
//! notifications and moves on to the next sibling.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::JobState;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Directory does not exist (legal for a target side)
    #[error("Directory not found: {}", .path.display())]
    DirectoryNotFound { path: PathBuf },

    /// Failed to list a directory
    #[error("Failed to enumerate directory: {}", .path.display())]
    EnumerationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read from a source file
    #[error("Failed to read file: {}", .path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to a target file
    #[error("Failed to write file: {}", .path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a directory
    #[error("Failed to create directory: {}", .path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to delete a file or directory
    #[error("Failed to delete: {}", .path.display())]
    DeletionFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file on one side has the same name as a directory on the other
    #[error("Type conflict: {} is a file on one side and a directory on the other", .path.display())]
    TypeConflict { path: PathBuf },

    /// Job was asked to run outside of the Idle state
    #[error("Job must be idle to run; current state: {state:?}")]
    InvalidJobState { state: JobState },

    /// Worker was started while a batch is still in progress
    #[error("Job worker is already running a batch")]
    WorkerBusy,

    /// Engine options failed validation
    #[error("Invalid engine options: {0}")]
    InvalidOptions(String),

    /// Could not spawn a worker or job thread
    #[error("Failed to spawn thread")]
    ThreadSpawn(#[source] io::Error),
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::EnumerationFailed { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::DeletionFailed { source, .. }
            | Self::ThreadSpawn(source) => source.raw_os_error(),
            _ => None,
        }
    }

    /// Render the error together with its underlying cause for notifications.
    pub fn detailed(&self) -> String {
        match std::error::Error::source(self) {
            Some(cause) => format!("{}: {}", self, cause),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_directory_not_found_message() {
        let error = EngineError::DirectoryNotFound {
            path: PathBuf::from("/missing/dir"),
        };
        assert!(error.to_string().contains("Directory not found"));
        assert!(error.to_string().contains("/missing/dir"));
        assert_eq!(error.raw_os_error(), None);
    }

    #[test]
    fn test_detailed_includes_io_cause() {
        let error = EngineError::WriteError {
            path: PathBuf::from("target.txt"),
            source: IoError::new(ErrorKind::PermissionDenied, "access is denied"),
        };
        let detailed = error.detailed();
        assert!(detailed.contains("Failed to write file: target.txt"));
        assert!(detailed.contains("access is denied"));
    }

    #[test]
    fn test_raw_os_error_is_extracted() {
        let error = EngineError::DeletionFailed {
            path: PathBuf::from("locked.bin"),
            source: IoError::from_raw_os_error(13),
        };
        assert_eq!(error.raw_os_error(), Some(13));
    }

    #[test]
    fn test_invalid_job_state_mentions_state() {
        let error = EngineError::InvalidJobState {
            state: JobState::Finished,
        };
        assert!(error.to_string().contains("Finished"));
    }
}
