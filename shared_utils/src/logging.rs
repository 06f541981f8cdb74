//! Logging: global tracing setup plus the per-task log lifecycle.
//!
//! The per-task logs are part of the product's data model, not diagnostics
//! plumbing: a task's log file is deleted when the task succeeds, so whatever
//! remains in the log directory after a run is exactly the set of failed
//! files. The orchestrator rescans the directory to build its failure report.

use anyhow::Result;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialise the tracing subscriber for the given program.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks between debug and info.
pub fn init_logging(program_name: &str, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", program_name, default_level)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    Ok(())
}

/// Log file name for a task: a short hash of the relative path (keeps names
/// unique across same-named tracks in different albums) plus the stem for
/// human readability.
pub fn task_log_name(relative: &Path) -> String {
    let digest = md5::compute(relative.to_string_lossy().as_bytes());
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{:x}", digest)[..8].to_string() + " " + &stem + ".log"
}

/// Append-only per-task log whose existence after a run signals failure.
#[derive(Debug, Clone)]
pub struct TaskLog {
    path: PathBuf,
}

impl TaskLog {
    pub fn new(log_dir: &Path, relative: &Path) -> Self {
        Self {
            path: log_dir.join(task_log_name(relative)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line. Logging must never fail the task it describes, so
    /// errors are swallowed after a debug trace.
    pub fn append(&self, line: &str) {
        if let Err(e) = self.try_append(line) {
            tracing::debug!(path = ?self.path, error = %e, "failed to append to task log");
        }
    }

    fn try_append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)
    }

    /// Open an append handle for wiring external tool stderr/stdout into the
    /// log via `Stdio::from`.
    pub fn append_handle(&self) -> std::io::Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }

    /// Separator written before every attempt after the first.
    pub fn retry_separator(&self, attempt: u32) {
        self.append("");
        self.append(&format!("[audio-aac: retrying, below is attempt #{}]", attempt));
    }

    /// Terminal marker for a task that exhausted its retries. The log is
    /// retained afterwards.
    pub fn mark_failed(&self) {
        self.append("[audio-aac: failed]");
    }

    /// Delete the log on success. A missing file is fine (the skip path
    /// never wrote one).
    pub fn discard(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::debug!(path = ?self.path, error = %e, "failed to remove task log");
            }
        }
    }
}

/// Scan the log directory for retained task logs (== failed tasks).
pub fn remaining_logs(log_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return Vec::new();
    };
    let mut logs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("log"))
        .collect();
    logs.sort();
    logs
}
