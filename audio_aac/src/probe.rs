//! Codec probe and route selection.
//!
//! One ffprobe call decides how a source file travels through the pipeline.
//! The probe is advisory: any failure (ffprobe missing, non-zero exit,
//! unparseable output, unknown codec) degrades to the full re-encode route
//! rather than failing the task.

use shared_utils::{capture_stdout, PipelineError};
use std::path::Path;

/// How a source file gets to AAC-in-M4A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Already AAC in an MP4 container: copy, no re-encode.
    PassThrough,
    /// Lossless input qaac decodes natively (ALAC): encode directly.
    DirectEncode,
    /// Everything else: decode to a WAV intermediate first.
    FullReencode,
}

impl Route {
    pub fn describe(&self) -> &'static str {
        match self {
            Route::PassThrough => "pass-through (already AAC)",
            Route::DirectEncode => "direct encode (ALAC)",
            Route::FullReencode => "full re-encode via WAV",
        }
    }
}

/// Codec name of the first audio stream, as ffprobe reports it.
pub fn probe_codec(input: &Path) -> Result<String, PipelineError> {
    let args = [
        "-v".to_string(),
        "error".to_string(),
        "-select_streams".to_string(),
        "a:0".to_string(),
        "-show_entries".to_string(),
        "stream=codec_name".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        input.to_string_lossy().into_owned(),
    ];

    let probe_err = |reason: String| PipelineError::Probe {
        path: input.to_path_buf(),
        reason,
    };

    let output = capture_stdout("ffprobe", &args).map_err(|e| probe_err(e.to_string()))?;
    if !output.status.success() {
        return Err(probe_err(format!(
            "ffprobe exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let codec = String::from_utf8_lossy(&output.stdout).trim().to_lowercase();
    if codec.is_empty() {
        return Err(probe_err("ffprobe reported no audio stream".into()));
    }
    Ok(codec)
}

/// Pick the route for `input` from its probed codec.
pub fn detect_route(input: &Path) -> Route {
    match probe_codec(input) {
        Ok(codec) => route_for_codec(&codec),
        Err(e) => {
            tracing::debug!(path = ?input, error = %e, "probe failed, using full re-encode");
            Route::FullReencode
        }
    }
}

/// Route for a probed codec token.
pub fn route_for_codec(codec: &str) -> Route {
    match codec {
        "aac" => Route::PassThrough,
        "alac" => Route::DirectEncode,
        _ => Route::FullReencode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn known_codecs_map_to_their_routes() {
        assert_eq!(route_for_codec("aac"), Route::PassThrough);
        assert_eq!(route_for_codec("alac"), Route::DirectEncode);
        assert_eq!(route_for_codec("flac"), Route::FullReencode);
        assert_eq!(route_for_codec("mp3"), Route::FullReencode);
        assert_eq!(route_for_codec(""), Route::FullReencode);
    }

    #[test]
    fn probe_failure_degrades_to_full_reencode() {
        // nonexistent file: ffprobe (if present) fails, otherwise the spawn
        // fails; both degrade
        assert_eq!(
            detect_route(&PathBuf::from("/nonexistent/file.m4a")),
            Route::FullReencode
        );
    }
}
