//! Shared infrastructure for the audio conversion tools: error taxonomy,
//! batch discovery, task logging, progress aggregation and external tool
//! plumbing.

pub mod app_error;
pub mod batch;
pub mod logging;
pub mod progress;
pub mod tools;

pub use app_error::PipelineError;
pub use batch::{collect_pending, has_extension, mirrored_output, BatchResult, Discovery};
pub use logging::{init_logging, remaining_logs, TaskLog};
pub use progress::{
    progress_channel, task_line, terminal_width, ProgressAggregator, ProgressChannel,
    ProgressSender, ProgressUpdate, OVERALL_KEY,
};
pub use tools::{
    capture_stdout, copy_file, move_file, produced, require_tools, run_logged, worker_budget,
};
