//! PipelineError - unified error type for the conversion pipeline
//!
//! Classifies failures by origin so the retry controller can decide what a
//! failed step means for the task as a whole.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Codec probe failed or returned an unrecognised token. Never fatal:
    /// the router degrades to the full re-encode path instead.
    #[error("probe failed for '{path}': {reason}")]
    Probe { path: PathBuf, reason: String },

    /// An external converter exited non-zero or produced no output file.
    #[error("{tool} failed to convert '{input}': {reason}")]
    Conversion {
        tool: &'static str,
        input: PathBuf,
        reason: String,
    },

    /// The container remux step failed; no destination to map tags onto.
    #[error("metadata copy failed for '{input}': {reason}")]
    MetadataCopy { input: PathBuf, reason: String },

    /// A single field of the mapping pass failed. Logged and counted by the
    /// transfer engine; never aborts the pass.
    #[error("failed to map '{source_field}' to '{dest_field}': {reason}")]
    FieldMapping {
        source_field: String,
        dest_field: String,
        reason: String,
    },

    /// Saving the destination tags after the mapping pass failed. The task
    /// continues against whatever made it to disk.
    #[error("failed to save mapped metadata for '{path}': {reason}")]
    MetadataSave { path: PathBuf, reason: String },

    /// A standardisation step failed. Fatal for the attempt; the destination
    /// file is in an indeterminate state and must not be promoted.
    #[error("standardisation failed ({step}): {reason}")]
    Standardisation { step: String, reason: String },

    /// Moving or copying an intermediate failed.
    #[error("io failure moving '{from}' to '{to}': {source}")]
    Io {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Whether this failure fails the enclosing attempt. Field-level mapping
    /// and save failures are absorbed by the transfer engine.
    pub fn fails_attempt(&self) -> bool {
        !matches!(
            self,
            PipelineError::Probe { .. }
                | PipelineError::FieldMapping { .. }
                | PipelineError::MetadataSave { .. }
        )
    }

    pub fn standardisation(step: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::Standardisation {
            step: step.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversion() -> PipelineError {
        PipelineError::Conversion {
            tool: "ffmpeg",
            input: PathBuf::from("a.flac"),
            reason: "exit code 1".into(),
        }
    }

    #[test]
    fn conversion_fails_attempt() {
        assert!(conversion().fails_attempt());
    }

    #[test]
    fn probe_never_fails_attempt() {
        let e = PipelineError::Probe {
            path: PathBuf::from("a.flac"),
            reason: "exit code 1".into(),
        };
        assert!(!e.fails_attempt());
    }

    #[test]
    fn field_mapping_is_absorbed() {
        let e = PipelineError::FieldMapping {
            source_field: "tracknumber".into(),
            dest_field: "trkn".into(),
            reason: "not a number".into(),
        };
        assert!(!e.fails_attempt());
    }

    #[test]
    fn standardisation_fails_attempt() {
        let e = PipelineError::standardisation("failed to prune tags", "boom");
        assert!(e.fails_attempt());
        assert!(e.to_string().contains("failed to prune tags"));
    }

    #[test]
    fn display_names_the_tool() {
        assert!(conversion().to_string().contains("ffmpeg"));
    }
}
