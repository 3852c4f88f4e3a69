//! End-to-end reconciliation tests
//!
//! Backup and sync runs against real temporary trees, checking the
//! properties every run must hold and the documented scenarios.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use tempfile::TempDir;
use treesync_engine::{Job, JobConfiguration, JobMode, Notification, Notifier};

fn write_file(path: &Path, content: &[u8], mtime_secs: i64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent");
    }
    fs::write(path, content).expect("Failed to write test file");
    filetime::set_file_mtime(path, FileTime::from_unix_time(mtime_secs, 0))
        .expect("Failed to set mtime");
}

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let a = temp_dir.path().join("a");
    let b = temp_dir.path().join("b");
    fs::create_dir(&a).expect("Failed to create a");
    fs::create_dir(&b).expect("Failed to create b");
    (temp_dir, a, b)
}

fn run(a: &Path, b: &Path, mode: JobMode, preview: bool) -> (u64, Vec<Notification>) {
    let (notifier, receiver) = Notifier::channel();
    let config = JobConfiguration::new("test", a, b, mode).with_preview(preview);
    let written = Job::new(config).run(&notifier).expect("Failed to run job");
    (written, receiver.try_iter().collect())
}

/// Relative path -> (content, mtime) for every file, plus directories with no content.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<(Vec<u8>, SystemTime)>> {
    let mut result = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).expect("Failed to read dir") {
            let path = entry.expect("Failed to read entry").path();
            let relative = path.strip_prefix(root).expect("prefix").to_path_buf();
            if path.is_dir() {
                result.insert(relative, None);
                pending.push(path);
            } else {
                let content = fs::read(&path).expect("Failed to read file");
                let mtime = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .expect("Failed to read mtime");
                result.insert(relative, Some((content, mtime)));
            }
        }
    }
    result
}

fn mixed_tree(a: &Path, b: &Path) {
    write_file(&a.join("top.txt"), b"top level", 1_000);
    write_file(&a.join("docs").join("report.txt"), b"quarterly", 2_000);
    write_file(&a.join("docs").join("deep").join("notes.md"), b"# notes", 2_000);
    write_file(&a.join("shared.txt"), b"newer on a", 5_000);
    write_file(&b.join("shared.txt"), b"older", 1_000);
    write_file(&b.join("stale.log"), b"to be removed", 1_000);
    write_file(&b.join("gone").join("old.bin"), b"\x00\x01", 1_000);
}

#[test]
fn test_backup_twice_second_run_is_noop() {
    let (_temp, a, b) = setup();
    mixed_tree(&a, &b);

    let (first_written, first) = run(&a, &b, JobMode::Backup, false);
    assert!(first_written > 0);
    assert!(first.iter().any(Notification::is_mutation));

    let (second_written, second) = run(&a, &b, JobMode::Backup, false);
    assert_eq!(second_written, 0);
    assert!(
        !second.iter().any(Notification::is_mutation),
        "unexpected mutations: {:?}",
        second
    );
    assert_eq!(snapshot(&a), snapshot(&b), "backup mirrors a onto b");
}

#[test]
fn test_sync_twice_second_run_is_noop() {
    let (_temp, a, b) = setup();
    mixed_tree(&a, &b);
    write_file(&b.join("docs").join("report.txt"), b"edited on b", 9_000);

    run(&a, &b, JobMode::Sync, false);
    let (second_written, second) = run(&a, &b, JobMode::Sync, false);

    assert_eq!(second_written, 0);
    assert!(!second.iter().any(Notification::is_mutation));
    assert_eq!(snapshot(&a), snapshot(&b));
    assert_eq!(
        fs::read(a.join("docs").join("report.txt")).expect("read"),
        b"edited on b"
    );
}

#[test]
fn test_written_bytes_match_copied_sizes() {
    let (_temp, a, b) = setup();
    mixed_tree(&a, &b);

    let (written, events) = run(&a, &b, JobMode::Backup, false);

    let copied: u64 = events
        .iter()
        .filter_map(|n| match n {
            Notification::FileCreated { size, .. } | Notification::FileModified { size, .. } => {
                Some(*size)
            }
            _ => None,
        })
        .sum();
    assert_eq!(written, copied);
    assert_eq!(written, 9 + 9 + 7 + 10);
    assert!(matches!(
        events.last(),
        Some(Notification::JobFinished { written_bytes, .. }) if *written_bytes == written
    ));
}

#[test]
fn test_preview_writes_nothing_to_either_tree() {
    let (_temp, a, b) = setup();
    mixed_tree(&a, &b);
    let before = (snapshot(&a), snapshot(&b));

    for mode in [JobMode::Backup, JobMode::Sync] {
        let (written, events) = run(&a, &b, mode, true);
        assert_eq!(written, 0);
        assert!(events.iter().any(Notification::is_mutation));
        assert!(!events.iter().any(Notification::is_error));
    }

    assert_eq!((snapshot(&a), snapshot(&b)), before);
}

#[test]
fn test_new_file_is_created_once() {
    let (_temp, a, b) = setup();
    write_file(&a.join("x.txt"), b"0123456789", 1_000);

    let (written, events) = run(&a, &b, JobMode::Backup, false);

    assert_eq!(written, 10);
    let created: Vec<&Notification> = events
        .iter()
        .filter(|n| matches!(n, Notification::FileCreated { .. }))
        .collect();
    assert_eq!(created.len(), 1);
    assert!(b.join("x.txt").exists());

    // Once the source loses the file, the next backup treats b's copy as an orphan
    fs::remove_file(a.join("x.txt")).expect("Failed to remove x.txt");
    let (written, events) = run(&a, &b, JobMode::Backup, false);

    assert_eq!(written, 0);
    assert!(!a.join("x.txt").exists(), "backup never copies from b to a");
    assert!(!b.join("x.txt").exists());
    assert!(events
        .iter()
        .any(|n| matches!(n, Notification::FileDeleted { size: 10, .. })));
}

#[test]
fn test_newer_target_is_not_overwritten() {
    let (_temp, a, b) = setup();
    write_file(&a.join("x.txt"), b"short", 1_000);
    write_file(&b.join("x.txt"), b"a much longer body", 2_000);

    let (written, events) = run(&a, &b, JobMode::Backup, false);

    assert_eq!(written, 0);
    assert!(!events.iter().any(Notification::is_mutation));
    assert_eq!(fs::read(b.join("x.txt")).expect("read"), b"a much longer body");
}

#[test]
fn test_sync_removes_file_only_on_b() {
    let (_temp, a, b) = setup();
    write_file(&b.join("old.txt"), b"old", 1_000);

    let (written, events) = run(&a, &b, JobMode::Sync, false);

    assert_eq!(written, 0);
    assert!(snapshot(&a).is_empty());
    assert!(snapshot(&b).is_empty());
    assert!(events
        .iter()
        .any(|n| matches!(n, Notification::FileDeleted { path, .. } if path == &b.join("old.txt"))));
}

#[test]
fn test_sync_runs_a_to_b_before_b_to_a() {
    let (_temp, a, b) = setup();
    write_file(&a.join("from_a.txt"), b"a", 1_000);

    let (_written, events) = run(&a, &b, JobMode::Sync, false);

    let proceeded: Vec<PathBuf> = events
        .iter()
        .filter_map(|n| match n {
            Notification::FileProceeded { path, .. } => Some(path.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(proceeded, vec![a.join("from_a.txt"), b.join("from_a.txt")]);
}
