//! Filesystem operations module.
//!
//! This module provides:
//! - The `FileSystem` capability trait every side of a job is accessed through
//! - `LocalFileSystem`, the implementation backed by the local disk
//! - `copy_file`, which streams one file between two sides with progress
//!
//! The engine never touches `std::fs` directly outside of `LocalFileSystem`,
//! so each side of a job can be backed by a different implementation.

use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

use crate::error::EngineError;
use crate::model::EntryInfo;

/// Capability set the engine needs from one side of a job.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// List the immediate children of `path`.
    ///
    /// Returns `EngineError::DirectoryNotFound` if `path` does not exist.
    fn list_entries(&self, path: &Path) -> Result<Vec<EntryInfo>, EngineError>;

    /// Create a directory (and any missing parents).
    fn create_directory(&self, path: &Path) -> Result<(), EngineError>;

    /// Delete a directory, including its contents when `recursive` is set.
    fn delete_directory(&self, path: &Path, recursive: bool) -> Result<(), EngineError>;

    /// Delete a single file.
    fn delete_file(&self, path: &Path) -> Result<(), EngineError>;

    /// Open a file for streaming its contents.
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, EngineError>;

    /// Create or truncate a file for writing.
    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, EngineError>;

    /// Set the last write time of a file.
    fn set_modified(&self, path: &Path, modified: SystemTime) -> Result<(), EngineError>;

    /// Whether names differing only in case refer to the same entry.
    fn is_case_insensitive(&self) -> bool {
        false
    }
}

/// `FileSystem` backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn list_entries(&self, path: &Path) -> Result<Vec<EntryInfo>, EngineError> {
        let entries = fs::read_dir(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                EngineError::DirectoryNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                EngineError::EnumerationFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        let mut items = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::EnumerationFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

            // Links are not followed: a link to an ancestor would recurse forever
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if metadata.file_type().is_symlink() {
                tracing::debug!(path = %entry.path().display(), "skipping symbolic link");
                continue;
            }

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if metadata.is_dir() {
                items.push(EntryInfo::directory(entry.file_name(), modified));
            } else if metadata.is_file() {
                items.push(EntryInfo::file(entry.file_name(), metadata.len(), modified));
            }
        }

        Ok(items)
    }

    fn create_directory(&self, path: &Path) -> Result<(), EngineError> {
        fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn delete_directory(&self, path: &Path, recursive: bool) -> Result<(), EngineError> {
        let result = if recursive {
            fs::remove_dir_all(path)
        } else {
            fs::remove_dir(path)
        };
        result.map_err(|e| EngineError::DeletionFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn delete_file(&self, path: &Path) -> Result<(), EngineError> {
        fs::remove_file(path).map_err(|e| EngineError::DeletionFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, EngineError> {
        let file = fs::File::open(path).map_err(|e| EngineError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Box::new(file))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, EngineError> {
        let file = fs::File::create(path).map_err(|e| EngineError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Box::new(file))
    }

    fn set_modified(&self, path: &Path, modified: SystemTime) -> Result<(), EngineError> {
        filetime::set_file_mtime(path, filetime::FileTime::from_system_time(modified)).map_err(
            |e| EngineError::WriteError {
                path: path.to_path_buf(),
                source: e,
            },
        )
    }

    fn is_case_insensitive(&self) -> bool {
        cfg!(any(windows, target_os = "macos"))
    }
}

/// Progress of a single file transfer, reported after every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes written to the target so far
    pub transferred_bytes: u64,
    /// Expected size of the file
    pub total_bytes: u64,
    /// Throughput of the last chunk, in bytes per second
    pub speed: u64,
}

/// Copy one file from `source` on `source_fs` to `target` on `target_fs`.
///
/// The target is created or truncated, filled chunk by chunk, then stamped
/// with `modified` so that a later comparison sees both sides as equal.
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// Returns `ReadError` / `WriteError` for the side that failed. A target that
/// was not completely written and stamped is removed again, since it would
/// carry a newer timestamp than the source and never be repaired.
#[allow(clippy::too_many_arguments)]
pub fn copy_file(
    source_fs: &dyn FileSystem,
    source: &Path,
    target_fs: &dyn FileSystem,
    target: &Path,
    total_bytes: u64,
    modified: SystemTime,
    buffer_size: usize,
    on_progress: &mut dyn FnMut(TransferProgress),
) -> Result<u64, EngineError> {
    let mut reader = source_fs.open_read(source)?;
    let writer = target_fs.open_write(target)?;

    let result = stream(&mut reader, source, writer, target, total_bytes, buffer_size, on_progress)
        .and_then(|transferred| {
            target_fs
                .set_modified(target, modified)
                .map(|()| transferred)
        });

    if result.is_err() {
        if let Err(cleanup) = target_fs.delete_file(target) {
            tracing::warn!(path = %target.display(), error = %cleanup, "failed to remove partial file");
        }
    }
    result
}

fn stream(
    reader: &mut dyn Read,
    source: &Path,
    mut writer: Box<dyn Write + Send>,
    target: &Path,
    total_bytes: u64,
    buffer_size: usize,
    on_progress: &mut dyn FnMut(TransferProgress),
) -> Result<u64, EngineError> {
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut transferred = 0u64;
    let mut last_chunk = Instant::now();

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(EngineError::ReadError {
                    path: source.to_path_buf(),
                    source: e,
                })
            }
        };

        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| EngineError::WriteError {
                path: target.to_path_buf(),
                source: e,
            })?;
        transferred += bytes_read as u64;

        let now = Instant::now();
        let speed = chunk_speed(bytes_read, now.duration_since(last_chunk));
        last_chunk = now;

        on_progress(TransferProgress {
            transferred_bytes: transferred,
            total_bytes: total_bytes.max(transferred),
            speed,
        });
    }

    writer.flush().map_err(|e| EngineError::WriteError {
        path: target.to_path_buf(),
        source: e,
    })?;

    // The handle is dropped here, before the caller touches metadata (required on Windows)
    Ok(transferred)
}

/// Bytes per second for one chunk. Chunks faster than the clock resolution
/// count as taking a millisecond.
fn chunk_speed(bytes: usize, elapsed: Duration) -> u64 {
    let micros = elapsed.as_micros().max(1_000);
    (bytes as u128 * 1_000_000 / micros) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Local disk whose timestamps cannot be changed.
    #[derive(Debug)]
    struct FrozenTimes;

    impl FileSystem for FrozenTimes {
        fn list_entries(&self, path: &Path) -> Result<Vec<EntryInfo>, EngineError> {
            LocalFileSystem.list_entries(path)
        }
        fn create_directory(&self, path: &Path) -> Result<(), EngineError> {
            LocalFileSystem.create_directory(path)
        }
        fn delete_directory(&self, path: &Path, recursive: bool) -> Result<(), EngineError> {
            LocalFileSystem.delete_directory(path, recursive)
        }
        fn delete_file(&self, path: &Path) -> Result<(), EngineError> {
            LocalFileSystem.delete_file(path)
        }
        fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, EngineError> {
            LocalFileSystem.open_read(path)
        }
        fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, EngineError> {
            LocalFileSystem.open_write(path)
        }
        fn set_modified(&self, path: &Path, _modified: SystemTime) -> Result<(), EngineError> {
            Err(EngineError::WriteError {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only timestamps"),
            })
        }
    }

    #[test]
    fn test_list_entries_reports_files_and_directories() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();

        fs::write(root.join("file1.txt"), b"test data 1").expect("Failed to write file1");
        fs::create_dir(root.join("subdir")).expect("Failed to create subdir");

        let mut entries = LocalFileSystem
            .list_entries(root)
            .expect("Failed to list entries");
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "file1.txt");
        assert!(!entries[0].is_directory);
        assert_eq!(entries[0].size, 11);
        assert_eq!(entries[1].name, "subdir");
        assert!(entries[1].is_directory);
        assert_eq!(entries[1].size, 0);
    }

    #[test]
    fn test_list_missing_directory_is_not_found() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("nonexistent");

        let result = LocalFileSystem.list_entries(&missing);
        assert!(matches!(result, Err(EngineError::DirectoryNotFound { .. })));
    }

    #[test]
    fn test_copy_file_reports_progress_and_stamps_mtime() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("dest.txt");
        fs::write(&src_file, b"test content").expect("Failed to write source");

        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        let mut reports = Vec::new();
        let bytes = copy_file(
            &LocalFileSystem,
            &src_file,
            &LocalFileSystem,
            &dst_file,
            12,
            mtime,
            4,
            &mut |p: TransferProgress| reports.push(p),
        )
        .expect("Failed to copy");

        assert_eq!(bytes, 12);
        assert_eq!(fs::read_to_string(&dst_file).expect("read dest"), "test content");
        assert_eq!(reports.len(), 3, "12 bytes in 4-byte chunks");
        assert_eq!(reports.last().map(|p| p.transferred_bytes), Some(12));
        assert!(reports.iter().all(|p| p.total_bytes == 12));

        let copied_mtime = fs::metadata(&dst_file)
            .expect("dest metadata")
            .modified()
            .expect("dest mtime");
        assert_eq!(copied_mtime, mtime);
    }

    #[test]
    fn test_copy_missing_source_is_read_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = copy_file(
            &LocalFileSystem,
            &temp_dir.path().join("missing.txt"),
            &LocalFileSystem,
            &temp_dir.path().join("dest.txt"),
            0,
            SystemTime::now(),
            1024,
            &mut |_: TransferProgress| {},
        );
        assert!(matches!(result, Err(EngineError::ReadError { .. })));
    }

    #[test]
    fn test_delete_directory_recursive() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let nested = temp_dir.path().join("a").join("b");
        LocalFileSystem
            .create_directory(&nested)
            .expect("Failed to create nested dirs");
        fs::write(nested.join("f.txt"), b"x").expect("Failed to write file");

        let top = temp_dir.path().join("a");
        assert!(LocalFileSystem.delete_directory(&top, false).is_err());
        LocalFileSystem
            .delete_directory(&top, true)
            .expect("Failed to delete recursively");
        assert!(!top.exists());
    }

    #[test]
    fn test_copy_removes_target_when_stamp_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("dest.txt");
        fs::write(&src_file, b"complete body").expect("Failed to write source");

        let result = copy_file(
            &LocalFileSystem,
            &src_file,
            &FrozenTimes,
            &dst_file,
            13,
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_000),
            1024,
            &mut |_: TransferProgress| {},
        );

        assert!(matches!(result, Err(EngineError::WriteError { .. })));
        assert!(!dst_file.exists(), "an unstamped copy must not stay behind");
    }

    #[test]
    fn test_chunk_speed_with_no_elapsed_time() {
        assert_eq!(chunk_speed(1024, Duration::ZERO), 1_024_000);
        assert_eq!(chunk_speed(1024, Duration::from_millis(500)), 2048);
        assert_eq!(chunk_speed(0, Duration::from_secs(1)), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_list_entries_skips_symbolic_links() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        fs::write(root.join("real.txt"), b"data").expect("Failed to write file");
        std::os::unix::fs::symlink(root, root.join("loop")).expect("Failed to link dir");
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("alias.txt"))
            .expect("Failed to link file");

        let entries = LocalFileSystem
            .list_entries(root)
            .expect("Failed to list entries");

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "real.txt");
    }
}
