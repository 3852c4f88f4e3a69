//! treesync - Command-line interface for the reconciliation engine.
//!
//! This is a thin headless front end: it turns directory pairs given on the
//! command line into jobs, runs them on a `JobWorker` and renders the
//! notification stream as a progress bar.

use clap::Parser;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use treesync_engine::{
    EngineOptions, JobConfiguration, JobMode, JobWorker, Notification, ProgressTracker,
};

/// treesync - Keep pairs of directory trees in step
#[derive(Parser, Debug)]
#[command(name = "treesync")]
#[command(version)]
#[command(about = "Back up or synchronize pairs of directories")]
struct Args {
    /// Directory pairs: A1 B1 [A2 B2 ...]
    #[arg(value_name = "DIR", required = true, num_args = 2..)]
    dirs: Vec<PathBuf>,

    /// Reconciliation mode: backup (A to B) or sync (both ways)
    #[arg(long, value_name = "MODE", default_value = "backup")]
    mode: String,

    /// Report what would change without touching either tree
    #[arg(long)]
    preview: bool,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,

    /// Copy buffer size in bytes
    #[arg(long, value_name = "BYTES")]
    buffer_size: Option<usize>,
}

/// What a finished batch leaves behind for the exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BatchSummary {
    written_bytes: u64,
    errors: u64,
}

/// Renders notifications on the terminal
struct CliProgress {
    show_actions: bool,
    tracker: ProgressTracker,
    bar: ProgressBar,
    start_time: Instant,
}

impl CliProgress {
    fn new(show_actions: bool, tracker: ProgressTracker) -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template("{bar:30.cyan/blue} {bytes}/{total_bytes} | {msg}") {
            bar.set_style(style.progress_chars("=>-"));
        }

        CliProgress {
            show_actions,
            tracker,
            bar,
            start_time: Instant::now(),
        }
    }

    fn handle(&mut self, notification: &Notification) {
        self.tracker.apply(notification);

        match notification {
            Notification::FilesCounted(counted) => {
                self.bar.set_length(counted.counted_bytes);
                self.bar.println(format!(
                    "Counted {} files ({})",
                    counted.counted_files,
                    HumanBytes(counted.counted_bytes)
                ));
            }
            Notification::JobStarted { name, .. } => {
                self.bar.println(format!("Starting {}", name));
            }
            Notification::JobFinished {
                name,
                written_bytes,
                ..
            } => {
                self.bar.println(format!(
                    "Finished {}: {} written",
                    name,
                    HumanBytes(*written_bytes)
                ));
            }
            n if n.is_error() => {
                if let Some(message) = describe_error(n) {
                    self.bar.println(format!("ERROR {}", message));
                }
            }
            n if self.show_actions => {
                if let Some(action) = describe_action(n) {
                    self.bar.println(action);
                }
            }
            _ => {}
        }

        self.bar.set_position(self.tracker.proceeded_bytes());
        self.bar.set_message(format!(
            "{:.1}% | {}/s",
            self.tracker.percentage(),
            HumanBytes(self.tracker.average_speed())
        ));
    }

    fn finish(self, written_bytes: u64) -> BatchSummary {
        self.bar.finish_and_clear();

        let counted = self.tracker.counted();
        eprintln!(
            "Summary: {} of {} files visited, {} errors",
            self.tracker.proceeded_files(),
            counted.counted_files,
            self.tracker.error_count()
        );
        eprintln!("Bytes written: {}", HumanBytes(written_bytes));
        eprintln!("Elapsed: {:.1}s", self.start_time.elapsed().as_secs_f64());

        BatchSummary {
            written_bytes,
            errors: self.tracker.error_count(),
        }
    }
}

/// One-line description of an item action, if the notification announces one.
fn describe_action(notification: &Notification) -> Option<String> {
    let line = match notification {
        Notification::CreatingDirectory { path } => format!("mkdir  {}", path.display()),
        Notification::CreatingFile { target, size, .. } => {
            format!("create {} ({})", target.display(), HumanBytes(*size))
        }
        Notification::ModifyingFile { target, size, .. } => {
            format!("update {} ({})", target.display(), HumanBytes(*size))
        }
        Notification::DeletingFile { path, .. } => format!("delete {}", path.display()),
        Notification::DeletingDirectory { path } => format!("rmdir  {}", path.display()),
        _ => return None,
    };
    Some(line)
}

fn describe_error(notification: &Notification) -> Option<String> {
    let line = match notification {
        Notification::DirectoryCreationError { path, error }
        | Notification::DirectoryDeletionError { path, error }
        | Notification::FileDeletionError { path, error, .. } => {
            format!("{}: {}", path.display(), error)
        }
        Notification::FileCopyError {
            source,
            target,
            error,
            ..
        } => format!("{} -> {}: {}", source.display(), target.display(), error),
        _ => return None,
    };
    Some(line)
}

/// Parse and validate command-line arguments, then run the batch
fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let exit_code = match run_cli(&args) {
        Ok(summary) if summary.errors > 0 => {
            eprintln!("Error: {} item(s) failed", summary.errors);
            1
        }
        Ok(_) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "treesync=debug" } else { "treesync=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .init();
}

fn parse_mode(mode: &str) -> Result<JobMode, String> {
    match mode.to_lowercase().as_str() {
        "backup" => Ok(JobMode::Backup),
        "sync" => Ok(JobMode::Sync),
        _ => Err(format!(
            "Invalid mode '{}'. Must be 'backup' or 'sync'",
            mode
        )),
    }
}

/// Pair up the positional directories into named job configurations
fn build_configurations(dirs: &[PathBuf], mode: JobMode) -> Result<Vec<JobConfiguration>, String> {
    if dirs.len() % 2 != 0 {
        return Err(format!(
            "Directories must be given in pairs; got {} path(s)",
            dirs.len()
        ));
    }

    dirs.chunks(2)
        .enumerate()
        .map(|(index, pair)| {
            let (a, b) = (&pair[0], &pair[1]);
            if !a.exists() {
                return Err(format!("Directory does not exist: {}", a.display()));
            }
            if !a.is_dir() {
                return Err(format!("Not a directory: {}", a.display()));
            }
            if b.exists() && !b.is_dir() {
                return Err(format!("Not a directory: {}", b.display()));
            }
            Ok(JobConfiguration::new(
                format!("Job {}", index + 1),
                a.clone(),
                b.clone(),
                mode,
            ))
        })
        .collect()
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<BatchSummary, String> {
    let mode = parse_mode(&args.mode)?;
    let configs = build_configurations(&args.dirs, mode)?;

    let mut options = EngineOptions::default();
    if let Some(size) = args.buffer_size {
        options.copy_buffer_size = size;
    }
    options.validate().map_err(|e| e.to_string())?;

    tracing::debug!(jobs = configs.len(), %mode, preview = args.preview, "starting batch");
    let worker = JobWorker::with_options(options);
    let notifications = worker.notifications();
    worker
        .start(configs, args.preview)
        .map_err(|e| format!("Failed to start: {}", e))?;

    let mut progress = CliProgress::new(args.verbose || args.preview, worker.progress_tracker());
    for notification in notifications.iter() {
        progress.handle(&notification);
        if matches!(notification, Notification::AllFinished { .. }) {
            break;
        }
    }

    let written_bytes = worker.wait();
    Ok(progress.finish(written_bytes))
}
