//! Pre-flight counting of the files a batch will visit.
//!
//! Counting is read-only and never fails: a directory that cannot be listed is
//! logged and left out of the totals.

use std::path::{Path, PathBuf};

use crate::fs_ops::{FileSystem, LocalFileSystem};
use crate::job::Job;
use crate::model::{FileCounterResult, JobConfiguration, JobMode};

/// Sizes a batch before it runs so progress can be reported against totals.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCounter;

impl FileCounter {
    /// Count every configuration on the local disk.
    ///
    /// Backup counts the source tree (A) only; Sync counts both trees.
    pub fn count(configs: &[JobConfiguration]) -> FileCounterResult {
        configs
            .iter()
            .map(|config| {
                Self::count_sides(
                    &LocalFileSystem,
                    &config.directory_a,
                    &LocalFileSystem,
                    &config.directory_b,
                    config.mode,
                )
            })
            .sum()
    }

    /// Count pre-built jobs through each job's own file systems.
    pub fn count_jobs(jobs: &[Job]) -> FileCounterResult {
        jobs.iter()
            .map(|job| {
                let config = job.configuration();
                Self::count_sides(
                    job.side_a(),
                    &config.directory_a,
                    job.side_b(),
                    &config.directory_b,
                    config.mode,
                )
            })
            .sum()
    }

    /// Count the files below `root`, recursively.
    pub fn count_tree(fs: &dyn FileSystem, root: &Path) -> FileCounterResult {
        let mut result = FileCounterResult::default();
        let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let entries = match fs.list_entries(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %dir.display(), error = %e, "skipping directory while counting");
                    continue;
                }
            };

            for entry in entries {
                if entry.is_directory {
                    pending.push(dir.join(&entry.name));
                } else {
                    result.counted_files += 1;
                    result.counted_bytes += entry.size;
                }
            }
        }

        result
    }

    fn count_sides(
        fs_a: &dyn FileSystem,
        directory_a: &Path,
        fs_b: &dyn FileSystem,
        directory_b: &Path,
        mode: JobMode,
    ) -> FileCounterResult {
        let mut result = Self::count_tree(fs_a, directory_a);
        if mode == JobMode::Sync {
            result += Self::count_tree(fs_b, directory_b);
        }
        result
    }
}
