//! Job orchestration module.
//!
//! This module provides the `Job` lifecycle and the reconciliation pass that
//! both job modes share:
//! - Backup runs one pass, A is the source and B the target
//! - Sync runs two passes in order, A → B then B → A
//!
//! A pass walks a directory pair depth-first. For each pair it creates the
//! directories missing on the target side, copies new and newer files,
//! removes target-only files and directories, then descends into the
//! sub-directories both sides now share. Per-item failures become error
//! notifications; only a stop request ends a pass early.

use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::EngineOptions;
use crate::control::{Interrupted, JobControl};
use crate::error::EngineError;
use crate::fs_ops::{self, FileSystem, LocalFileSystem, TransferProgress};
use crate::model::{EntryInfo, JobConfiguration, JobMode, JobState};
use crate::progress::{Notification, Notifier};

/// One reconciliation job over a directory pair.
#[derive(Debug)]
pub struct Job {
    id: Uuid,
    config: JobConfiguration,
    side_a: Arc<dyn FileSystem>,
    side_b: Arc<dyn FileSystem>,
    options: EngineOptions,
    control: Arc<JobControl>,
    preview: bool,
    state: JobState,
    written_bytes: u64,
}

impl Job {
    /// Create an idle job with both sides on the local disk.
    pub fn new(config: JobConfiguration) -> Self {
        Job::with_file_systems(config, Arc::new(LocalFileSystem), Arc::new(LocalFileSystem))
    }

    /// Create an idle job whose sides are accessed through custom adapters.
    pub fn with_file_systems(
        config: JobConfiguration,
        side_a: Arc<dyn FileSystem>,
        side_b: Arc<dyn FileSystem>,
    ) -> Self {
        let options = EngineOptions::default();
        Job {
            id: Uuid::new_v4(),
            preview: config.preview,
            config,
            side_a,
            side_b,
            control: Arc::new(JobControl::new(options.pause_poll_interval)),
            options,
            state: JobState::Idle,
            written_bytes: 0,
        }
    }

    /// Replace the engine options.
    ///
    /// This installs a fresh control token, so call it before handing out
    /// `control()`.
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.control = Arc::new(JobControl::new(options.pause_poll_interval));
        self.options = options;
        self
    }

    /// Override the configuration's preview flag.
    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn configuration(&self) -> &JobConfiguration {
        &self.config
    }

    pub fn side_a(&self) -> &dyn FileSystem {
        self.side_a.as_ref()
    }

    pub fn side_b(&self) -> &dyn FileSystem {
        self.side_b.as_ref()
    }

    pub fn is_preview(&self) -> bool {
        self.preview
    }

    /// Shared pause/stop token, usable while `run` holds the job.
    pub fn control(&self) -> Arc<JobControl> {
        Arc::clone(&self.control)
    }

    pub fn state(&self) -> JobState {
        if self.state == JobState::Running && self.control.is_paused() {
            JobState::Paused
        } else {
            self.state
        }
    }

    /// Bytes written to either tree so far.
    pub fn written_bytes(&self) -> u64 {
        self.written_bytes
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    /// Run the job to completion on the calling thread.
    ///
    /// Transitions the job from Idle to Running, then to Finished, or to
    /// Stopped when a stop request interrupted the traversal. `JobFinished`
    /// is emitted in both cases.
    ///
    /// # Returns
    /// Number of bytes written
    ///
    /// # Errors
    /// Returns `InvalidJobState` if the job is not idle. Item failures are
    /// reported as notifications, never as an error.
    pub fn run(&mut self, notifier: &Notifier) -> Result<u64, EngineError> {
        if self.state != JobState::Idle {
            return Err(EngineError::InvalidJobState {
                state: self.state(),
            });
        }

        self.state = JobState::Running;
        tracing::info!(
            job = %self.config.name,
            mode = %self.config.mode,
            preview = self.preview,
            "job started"
        );

        let control = Arc::clone(&self.control);
        let (outcome, written_bytes) = {
            let a = (self.side_a.as_ref(), self.config.directory_a.as_path());
            let b = (self.side_b.as_ref(), self.config.directory_b.as_path());
            let passes = match self.config.mode {
                JobMode::Backup => vec![(a, b)],
                JobMode::Sync => vec![(a, b), (b, a)],
            };

            let mut reconciler = Reconciler {
                control: &control,
                notifier,
                preview: self.preview,
                buffer_size: self.options.copy_buffer_size,
                written_bytes: 0,
            };

            let mut outcome = Ok(());
            for ((source_fs, source), (target_fs, target)) in passes {
                tracing::debug!(source = %source.display(), target = %target.display(), "reconciling");
                let sides = Sides {
                    source: source_fs,
                    target: target_fs,
                };
                outcome = reconciler.reconcile(&sides, source, target, false);
                if outcome.is_err() {
                    break;
                }
            }
            (outcome, reconciler.written_bytes)
        };

        self.written_bytes = written_bytes;
        self.state = match outcome {
            Ok(()) => JobState::Finished,
            Err(Interrupted) => JobState::Stopped,
        };
        tracing::info!(
            job = %self.config.name,
            state = ?self.state,
            written_bytes,
            "job finished"
        );

        notifier.send(Notification::JobFinished {
            id: self.id,
            name: self.config.name.clone(),
            written_bytes,
        });

        Ok(written_bytes)
    }
}

/// The two sides of one pass.
struct Sides<'a> {
    source: &'a dyn FileSystem,
    target: &'a dyn FileSystem,
}

#[derive(Clone, Copy)]
enum CopyKind {
    Create,
    Modify,
}

/// State carried through the passes of one run.
struct Reconciler<'a> {
    control: &'a JobControl,
    notifier: &'a Notifier,
    preview: bool,
    buffer_size: usize,
    written_bytes: u64,
}

impl Reconciler<'_> {
    /// Reconcile `target` with `source`, then descend.
    ///
    /// `fresh` marks a target directory this pass created (or would have
    /// created in preview); it is known to be empty and is not listed.
    fn reconcile(
        &mut self,
        sides: &Sides<'_>,
        source: &Path,
        target: &Path,
        fresh: bool,
    ) -> Result<(), Interrupted> {
        self.control.checkpoint()?;

        let mut source_entries = match sides.source.list_entries(source) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %source.display(), error = %e, "cannot list source directory, skipping");
                return Ok(());
            }
        };

        let mut target_entries = if fresh {
            Vec::new()
        } else {
            match sides.target.list_entries(target) {
                Ok(entries) => entries,
                Err(EngineError::DirectoryNotFound { .. }) => {
                    if !self.create_directory(sides.target, target) {
                        return Ok(());
                    }
                    Vec::new()
                }
                Err(e) => {
                    tracing::warn!(path = %target.display(), error = %e, "cannot list target directory, skipping");
                    return Ok(());
                }
            }
        };

        source_entries.sort_by(|x, y| x.name.cmp(&y.name));
        target_entries.sort_by(|x, y| x.name.cmp(&y.name));

        // On a case-insensitive target `Readme.txt` and `README.TXT` are one entry
        let fold = sides.target.is_case_insensitive();
        let source_index: HashMap<Cow<'_, OsStr>, &EntryInfo> = source_entries
            .iter()
            .map(|e| (name_key(&e.name, fold), e))
            .collect();
        let target_index: HashMap<Cow<'_, OsStr>, &EntryInfo> = target_entries
            .iter()
            .map(|e| (name_key(&e.name, fold), e))
            .collect();

        // (source name, target name, freshly created)
        let mut descend: Vec<(&OsStr, &OsStr, bool)> = Vec::new();

        // Directories missing on the target side
        for entry in source_entries.iter().filter(|e| e.is_directory) {
            let target_path = target.join(&entry.name);
            match target_index.get(&*name_key(&entry.name, fold)) {
                Some(existing) if existing.is_directory => {
                    descend.push((entry.name.as_os_str(), existing.name.as_os_str(), false))
                }
                Some(_) => {
                    self.control.checkpoint()?;
                    let error = EngineError::TypeConflict {
                        path: target_path.clone(),
                    };
                    tracing::warn!(path = %target_path.display(), "cannot create directory over a file");
                    self.notifier.send(Notification::DirectoryCreationError {
                        path: target_path,
                        error: error.to_string(),
                    });
                }
                None => {
                    self.control.checkpoint()?;
                    if self.create_directory(sides.target, &target_path) {
                        descend.push((entry.name.as_os_str(), entry.name.as_os_str(), true));
                    }
                }
            }
        }

        // Files new or newer on the source side
        for entry in source_entries.iter().filter(|e| !e.is_directory) {
            self.control.checkpoint()?;
            let source_path = source.join(&entry.name);
            let existing = target_index.get(&*name_key(&entry.name, fold));
            let target_name = match existing {
                Some(e) => &e.name,
                None => &entry.name,
            };
            let target_path = target.join(target_name);

            match existing {
                None => self.copy(sides, &source_path, &target_path, entry, CopyKind::Create),
                Some(existing) if existing.is_directory => {
                    let error = EngineError::TypeConflict {
                        path: target_path.clone(),
                    };
                    tracing::warn!(path = %target_path.display(), "cannot copy file over a directory");
                    self.notifier.send(Notification::FileCopyError {
                        source: source_path.clone(),
                        target: target_path,
                        size: entry.size,
                        error: error.to_string(),
                    });
                }
                Some(existing) if entry.modified > existing.modified => {
                    self.copy(sides, &source_path, &target_path, entry, CopyKind::Modify)
                }
                Some(_) => {
                    tracing::debug!(path = %target_path.display(), "up to date");
                }
            }

            self.notifier.send(Notification::FileProceeded {
                path: source_path,
                size: entry.size,
            });
        }

        // Target-only files
        for entry in target_entries.iter().filter(|e| !e.is_directory) {
            let kept = source_index
                .get(&*name_key(&entry.name, fold))
                .is_some_and(|s| !s.is_directory);
            if kept {
                continue;
            }
            self.control.checkpoint()?;
            self.delete_file(sides.target, &target.join(&entry.name), entry.size);
        }

        // Target-only directories
        for entry in target_entries.iter().filter(|e| e.is_directory) {
            let kept = source_index
                .get(&*name_key(&entry.name, fold))
                .is_some_and(|s| s.is_directory);
            if kept {
                continue;
            }
            self.control.checkpoint()?;
            self.delete_directory(sides.target, &target.join(&entry.name));
        }

        for (source_name, target_name, fresh) in descend {
            self.reconcile(
                sides,
                &source.join(source_name),
                &target.join(target_name),
                fresh,
            )?;
        }

        Ok(())
    }

    /// Returns true if the directory exists afterwards (always in preview).
    fn create_directory(&mut self, fs: &dyn FileSystem, path: &Path) -> bool {
        self.notifier.send(Notification::CreatingDirectory {
            path: path.to_path_buf(),
        });

        let result = if self.preview {
            Ok(())
        } else {
            fs.create_directory(path)
        };

        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), preview = self.preview, "directory created");
                self.notifier.send(Notification::DirectoryCreated {
                    path: path.to_path_buf(),
                });
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to create directory");
                self.notifier.send(Notification::DirectoryCreationError {
                    path: path.to_path_buf(),
                    error: e.detailed(),
                });
                false
            }
        }
    }

    fn copy(
        &mut self,
        sides: &Sides<'_>,
        source: &Path,
        target: &Path,
        entry: &EntryInfo,
        kind: CopyKind,
    ) {
        let size = entry.size;
        self.notifier.send(match kind {
            CopyKind::Create => Notification::CreatingFile {
                source: source.to_path_buf(),
                target: target.to_path_buf(),
                size,
            },
            CopyKind::Modify => Notification::ModifyingFile {
                source: source.to_path_buf(),
                target: target.to_path_buf(),
                size,
            },
        });

        if !self.preview {
            let notifier = self.notifier;
            let result = fs_ops::copy_file(
                sides.source,
                source,
                sides.target,
                target,
                size,
                entry.modified,
                self.buffer_size,
                &mut |progress: TransferProgress| {
                    notifier.send(Notification::FileCopyProgress {
                        source: source.to_path_buf(),
                        target: target.to_path_buf(),
                        transferred_bytes: progress.transferred_bytes,
                        total_bytes: progress.total_bytes,
                        speed: progress.speed,
                    })
                },
            );

            match result {
                Ok(written) => self.written_bytes += written,
                Err(e) => {
                    tracing::warn!(source = %source.display(), target = %target.display(), error = %e, "copy failed");
                    self.notifier.send(Notification::FileCopyError {
                        source: source.to_path_buf(),
                        target: target.to_path_buf(),
                        size,
                        error: e.detailed(),
                    });
                    return;
                }
            }
        }

        tracing::debug!(target = %target.display(), size, preview = self.preview, "file copied");
        self.notifier.send(match kind {
            CopyKind::Create => Notification::FileCreated {
                source: source.to_path_buf(),
                target: target.to_path_buf(),
                size,
            },
            CopyKind::Modify => Notification::FileModified {
                source: source.to_path_buf(),
                target: target.to_path_buf(),
                size,
            },
        });
    }

    fn delete_file(&mut self, fs: &dyn FileSystem, path: &Path, size: u64) {
        self.notifier.send(Notification::DeletingFile {
            path: path.to_path_buf(),
            size,
        });

        let result = if self.preview {
            Ok(())
        } else {
            fs.delete_file(path)
        };

        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), preview = self.preview, "file deleted");
                self.notifier.send(Notification::FileDeleted {
                    path: path.to_path_buf(),
                    size,
                });
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to delete file");
                self.notifier.send(Notification::FileDeletionError {
                    path: path.to_path_buf(),
                    size,
                    error: e.detailed(),
                });
            }
        }
    }

    fn delete_directory(&mut self, fs: &dyn FileSystem, path: &Path) {
        self.notifier.send(Notification::DeletingDirectory {
            path: path.to_path_buf(),
        });

        let result = if self.preview {
            Ok(())
        } else {
            fs.delete_directory(path, true)
        };

        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), preview = self.preview, "directory deleted");
                self.notifier.send(Notification::DirectoryDeleted {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to delete directory");
                self.notifier.send(Notification::DirectoryDeletionError {
                    path: path.to_path_buf(),
                    error: e.detailed(),
                });
            }
        }
    }
}

/// Lookup key for an entry name, lowercased when `fold` is set.
fn name_key(name: &OsStr, fold: bool) -> Cow<'_, OsStr> {
    if fold {
        Cow::Owned(OsString::from(name.to_string_lossy().to_lowercase()))
    } else {
        Cow::Borrowed(name)
    }
}
