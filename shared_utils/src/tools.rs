//! External tool plumbing: logged invocation, output verification, file
//! moves, preflight checks and the worker budget.

use crate::app_error::PipelineError;
use crate::logging::TaskLog;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::process::{Command, ExitStatus, Output, Stdio};

/// Run an external tool with stdout and stderr appended to the task log.
///
/// The command line itself is logged first so a retained log shows exactly
/// what was executed.
pub fn run_logged<S: AsRef<OsStr>>(
    tool: &str,
    args: &[S],
    log: &TaskLog,
) -> std::io::Result<ExitStatus> {
    let rendered: Vec<String> = args
        .iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect();
    log.append(&format!("$ {} {}", tool, rendered.join(" ")));

    let status = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.append_handle()?))
        .stderr(Stdio::from(log.append_handle()?))
        .status()?;

    log.append(&format!("[exit: {}]", status));
    Ok(status)
}

/// Run a tool capturing stdout, for probes whose output is parsed rather
/// than logged.
pub fn capture_stdout<S: AsRef<OsStr>>(tool: &str, args: &[S]) -> std::io::Result<Output> {
    Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
}

/// The success contract for converters: a clean exit alone is not enough,
/// the expected output file must also exist.
pub fn produced(status: &ExitStatus, output: &Path) -> bool {
    status.success() && output.is_file()
}

fn io_error(from: &Path, to: &Path, source: std::io::Error) -> PipelineError {
    PipelineError::Io {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    }
}

/// Move a file into place, creating parent directories. Falls back to
/// copy + remove when rename crosses a filesystem boundary.
pub fn move_file(from: &Path, to: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(from, to, e))?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to).map_err(|e| io_error(from, to, e))?;
            fs::remove_file(from).map_err(|e| io_error(from, to, e))?;
            Ok(())
        }
    }
}

/// Copy a file, creating parent directories.
pub fn copy_file(from: &Path, to: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(from, to, e))?;
    }
    fs::copy(from, to).map_err(|e| io_error(from, to, e))?;
    Ok(())
}

/// Verify all required tools resolve on PATH before any work starts.
pub fn require_tools(tools: &[&str]) -> anyhow::Result<()> {
    let missing: Vec<&str> = tools
        .iter()
        .copied()
        .filter(|t| which::which(t).is_err())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("required tools not found on PATH: {}", missing.join(", "))
    }
}

/// Worker count for a saturation factor: `max(1, cores * saturation)`.
pub fn worker_budget(saturation: f64) -> usize {
    let cores = num_cpus::get();
    ((cores as f64 * saturation).floor() as usize).max(1)
}
