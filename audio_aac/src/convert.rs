//! Format converters: the WAV intermediate decoder and the AAC encoder.
//!
//! Both converters write to an in-flight scratch name next to the requested
//! output, verify the tool's exit status AND that the file actually appeared,
//! then rename into place. The rename keeps half-written files from ever
//! carrying the real output name.

use shared_utils::{move_file, produced, run_logged, PipelineError, TaskLog};
use std::path::{Path, PathBuf};

/// Target sample parameters of the WAV intermediate.
const WAV_SAMPLE_RATE: &str = "44100";
const WAV_CHANNELS: &str = "2";

/// qaac true-VBR quality setting.
const TVBR_QUALITY: &str = "127";

fn inflight_name(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!(".inflight-{name}"))
}

fn conversion_error(tool: &'static str, input: &Path, reason: String) -> PipelineError {
    PipelineError::Conversion {
        tool,
        input: input.to_path_buf(),
        reason,
    }
}

/// Run a tool expected to produce `output`, enforcing the dual success
/// contract. `{output}` in the argument list is substituted with the
/// in-flight scratch path.
pub(crate) fn run_converter(
    tool: &'static str,
    args: &[String],
    input: &Path,
    output: &Path,
    log: &TaskLog,
) -> Result<(), PipelineError> {
    let scratch = inflight_name(output);
    let mut args = args.to_vec();
    for arg in &mut args {
        if arg == "{output}" {
            *arg = scratch.to_string_lossy().into_owned();
        }
    }

    let status = run_logged(tool, &args, log)
        .map_err(|e| conversion_error(tool, input, format!("failed to launch: {e}")))?;

    if !produced(&status, &scratch) {
        let _ = std::fs::remove_file(&scratch);
        let reason = if status.success() {
            "tool exited cleanly but produced no output file".to_string()
        } else {
            format!("tool exited with {status}")
        };
        return Err(conversion_error(tool, input, reason));
    }

    move_file(&scratch, output).map_err(|e| conversion_error(tool, input, e.to_string()))
}

/// Decode anything ffmpeg can read into a 16-bit 44.1 kHz stereo WAV,
/// dropping video/art streams.
pub fn convert_to_wav(input: &Path, output: &Path, log: &TaskLog) -> Result<(), PipelineError> {
    let args = vec![
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-map".to_string(),
        "0:a".to_string(),
        "-c:a".to_string(),
        "pcm_s16le".to_string(),
        "-ar".to_string(),
        WAV_SAMPLE_RATE.to_string(),
        "-ac".to_string(),
        WAV_CHANNELS.to_string(),
        "-vn".to_string(),
        "{output}".to_string(),
    ];
    run_converter("ffmpeg", &args, input, output, log)
}

/// Encode a qaac-decodable input (WAV or ALAC) to AAC in M4A.
pub fn encode_aac(input: &Path, output: &Path, log: &TaskLog) -> Result<(), PipelineError> {
    let args = vec![
        "--tvbr".to_string(),
        TVBR_QUALITY.to_string(),
        "--quality".to_string(),
        "2".to_string(),
        "-o".to_string(),
        "{output}".to_string(),
        input.to_string_lossy().into_owned(),
    ];
    run_converter("qaac", &args, input, output, log)
}
