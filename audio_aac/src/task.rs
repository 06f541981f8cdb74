//! One task = one source file seen through to its mirrored destination,
//! with retries.
//!
//! Nothing escapes a task: every failure ends up as log lines plus a
//! [`TaskOutcome`], and the per-task log survives exactly when the task
//! ultimately failed.
//!
//! Tasks run on rayon pool threads, not separate worker processes. Each
//! task exclusively owns its scratch directory and tag state, the heavy
//! lifting happens in external ffmpeg/qaac child processes, and the
//! progress channel is the only shared state between workers.

use crate::convert::{convert_to_wav, encode_aac};
use crate::probe::{detect_route, Route};
use crate::standardise::{standardise, StandardiseOptions};
use crate::tag_store::open_store;
use crate::transfer::{remux, transfer_fields};
use shared_utils::{
    copy_file, move_file, task_line, terminal_width, PipelineError, ProgressSender, TaskLog,
};
use std::path::{Path, PathBuf};

/// Attempts per task before giving up.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// One unit of batch work.
#[derive(Debug, Clone)]
pub struct Task {
    /// Absolute path of the library file.
    pub source: PathBuf,
    /// Path relative to the source root, mirrored under the destination.
    pub relative: PathBuf,
    /// Mirrored destination path.
    pub output: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct TaskOptions {
    pub max_attempts: u32,
    pub standardise: StandardiseOptions,
}

impl Default for TaskOptions {
    fn default() -> Self {
        TaskOptions {
            max_attempts: MAX_RETRY_ATTEMPTS,
            standardise: StandardiseOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    /// Destination already existed; nothing ran, no log was written.
    Skipped,
    /// All attempts exhausted; the log is retained.
    Failed,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn standardise_target(
    target: &Path,
    source: &Path,
    options: StandardiseOptions,
    log: &TaskLog,
) -> Result<(), PipelineError> {
    let mut store = open_store(target)
        .map_err(|e| PipelineError::standardisation("failed to load target file", e))?;
    standardise(&mut store, source, options, log)
}

struct Stage<'a> {
    name: &'a str,
    progress: &'a ProgressSender,
    total: u64,
    done: u64,
}

impl Stage<'_> {
    fn enter(&mut self, description: &str) {
        self.done += 1;
        self.progress.set_total(self.total);
        self.progress.set_completed(self.done - 1);
        // the spinner template eats a few leading columns
        let width = terminal_width().saturating_sub(6).max(24);
        let right = format!("{} ({}/{})", description, self.done, self.total);
        self.progress.describe(task_line(self.name, &right, width));
    }
}

fn attempt_pass_through(task: &Task, scratch: &Path, options: &TaskOptions, log: &TaskLog, progress: &ProgressSender) -> Result<(), PipelineError> {
    let name = file_name(&task.source);
    let mut stage = Stage {
        name: &name,
        progress,
        total: 2,
        done: 0,
    };
    let intermediate = scratch.join("intermediate.m4a");

    stage.enter("copying");
    copy_file(&task.source, &intermediate)?;

    stage.enter("standardising metadata");
    standardise_target(&intermediate, &task.source, options.standardise, log)?;

    move_file(&intermediate, &task.output)
}

fn attempt_direct_encode(task: &Task, scratch: &Path, options: &TaskOptions, log: &TaskLog, progress: &ProgressSender) -> Result<(), PipelineError> {
    let name = file_name(&task.source);
    let mut stage = Stage {
        name: &name,
        progress,
        total: 3,
        done: 0,
    };
    let encoded = scratch.join("intermediate.metadataless.m4a");
    let finished = scratch.join("intermediate.m4a");

    stage.enter("converting to aac");
    encode_aac(&task.source, &encoded, log)?;

    stage.enter("copying metadata");
    remux(&task.source, &encoded, &finished, log)?;
    transfer_fields(&task.source, &finished, log)?;

    stage.enter("standardising metadata");
    standardise_target(&finished, &task.source, options.standardise, log)?;

    move_file(&finished, &task.output)
}

fn attempt_full_reencode(task: &Task, scratch: &Path, options: &TaskOptions, log: &TaskLog, progress: &ProgressSender) -> Result<(), PipelineError> {
    let name = file_name(&task.source);
    let mut stage = Stage {
        name: &name,
        progress,
        total: 4,
        done: 0,
    };
    let wav = scratch.join("intermediate.wav");
    let encoded = scratch.join("intermediate.metadataless.m4a");
    let finished = scratch.join("intermediate.m4a");

    stage.enter("converting to wav");
    convert_to_wav(&task.source, &wav, log)?;

    stage.enter("converting to aac");
    encode_aac(&wav, &encoded, log)?;

    stage.enter("copying metadata");
    remux(&task.source, &encoded, &finished, log)?;
    transfer_fields(&task.source, &finished, log)?;

    stage.enter("standardising metadata");
    if let Err(e) = standardise_target(&finished, &task.source, options.standardise, log) {
        // an earlier run may have left a half-written destination behind
        if task.output.exists() {
            if let Err(cleanup) = std::fs::remove_file(&task.output) {
                log.append(&format!(
                    "[task] failed to clean up output '{}': {}",
                    task.output.display(),
                    cleanup
                ));
            }
        }
        return Err(e);
    }

    move_file(&finished, &task.output)
}

fn run_attempt(
    task: &Task,
    route: Route,
    options: &TaskOptions,
    log: &TaskLog,
    progress: &ProgressSender,
) -> Result<(), PipelineError> {
    let scratch = tempfile::tempdir().map_err(|e| PipelineError::Io {
        from: task.source.clone(),
        to: task.output.clone(),
        source: e,
    })?;

    match route {
        Route::PassThrough => attempt_pass_through(task, scratch.path(), options, log, progress),
        Route::DirectEncode => attempt_direct_encode(task, scratch.path(), options, log, progress),
        Route::FullReencode => attempt_full_reencode(task, scratch.path(), options, log, progress),
    }
}

/// Drive one task to completion: skip, succeed, or exhaust its attempts.
pub fn run_task(
    task: &Task,
    options: &TaskOptions,
    log: &TaskLog,
    progress: &ProgressSender,
) -> TaskOutcome {
    if task.output.exists() {
        tracing::debug!(output = ?task.output, "destination exists, skipping");
        log.discard();
        progress.remove();
        return TaskOutcome::Skipped;
    }

    let route = detect_route(&task.source);
    log.append(&format!(
        "[task] '{}' routed as {}",
        task.relative.display(),
        route.describe()
    ));

    let mut attempt = 1;
    let outcome = loop {
        if attempt > 1 {
            log.retry_separator(attempt);
        }
        match run_attempt(task, route, options, log, progress) {
            Ok(()) => {
                log.discard();
                break TaskOutcome::Succeeded;
            }
            Err(e) => {
                log.append(&format!("[task] attempt #{attempt} failed: {e}"));
                attempt += 1;
                if attempt > options.max_attempts {
                    log.mark_failed();
                    break TaskOutcome::Failed;
                }
            }
        }
    };

    progress.remove();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_utils::{mirrored_output, progress_channel, TaskLog};
    use std::fs;

    fn fixture(name: &str) -> (tempfile::TempDir, Task, TaskLog) {
        let dir = tempfile::tempdir().unwrap();
        let source_root = dir.path().join("music");
        let dest_root = dir.path().join("converted");
        fs::create_dir_all(source_root.join("album")).unwrap();

        let source = source_root.join("album").join(name);
        fs::write(&source, b"not really audio").unwrap();

        let task = Task {
            relative: PathBuf::from("album").join(name),
            output: mirrored_output(&source, &source_root, &dest_root),
            source,
        };
        let log = TaskLog::new(&dir.path().join("logs"), &task.relative);
        (dir, task, log)
    }

    fn sender() -> shared_utils::ProgressSender {
        let (channel, _agg) = progress_channel();
        channel.sender(1)
    }

    #[test]
    fn existing_destination_skips_without_a_log() {
        let (_dir, task, log) = fixture("one.flac");
        fs::create_dir_all(task.output.parent().unwrap()).unwrap();
        fs::write(&task.output, b"already there").unwrap();

        let outcome = run_task(&task, &TaskOptions::default(), &log, &sender());
        assert_eq!(outcome, TaskOutcome::Skipped);
        assert!(!log.path().exists());
        assert_eq!(fs::read(&task.output).unwrap(), b"already there");
    }

    #[test]
    fn failing_pipeline_is_attempted_exactly_max_times() {
        // an unreadable flac fails the first converter on every attempt
        let (_dir, task, log) = fixture("broken.flac");

        let options = TaskOptions {
            max_attempts: 3,
            ..Default::default()
        };
        let outcome = run_task(&task, &options, &log, &sender());

        assert_eq!(outcome, TaskOutcome::Failed);
        assert!(!task.output.exists());
        assert!(log.path().exists());

        let contents = fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.matches("[task] attempt #").count(), 3, "three failed attempts logged");
        assert_eq!(contents.matches("retrying, below is attempt").count(), 2);
        assert!(contents.trim_end().ends_with("[audio-aac: failed]"));
    }
}
