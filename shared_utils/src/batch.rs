//! Batch discovery over a mirrored source/destination tree.
//!
//! The destination tree reproduces the source tree's relative layout with a
//! fixed `.m4a` extension; a source file is pending exactly when its mirrored
//! output does not exist yet.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Source containers the pipeline accepts.
pub const AUDIO_EXTENSIONS: &[&str] = &["m4a", "mp3", "ogg", "flac"];

/// Fixed output extension of the mirrored tree.
pub const OUTPUT_EXTENSION: &str = "m4a";

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .map(|e| extensions.contains(&e.as_str()))
        .unwrap_or(false)
}

/// Mirrored destination for `source` (relative to `source_root`) under
/// `dest_root`, with the output extension applied.
pub fn mirrored_output(source: &Path, source_root: &Path, dest_root: &Path) -> PathBuf {
    let relative = source.strip_prefix(source_root).unwrap_or(source);
    dest_root.join(relative).with_extension(OUTPUT_EXTENSION)
}

/// Outcome of a discovery sweep.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Files that still need converting.
    pub pending: Vec<PathBuf>,
    /// Supported audio files seen in total, converted or not.
    pub encountered: usize,
}

/// Walk `source_root` collecting supported audio files whose mirrored output
/// under `dest_root` does not exist yet.
pub fn collect_pending(source_root: &Path, dest_root: &Path) -> Discovery {
    let mut discovery = Discovery::default();

    for entry in WalkDir::new(source_root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| has_extension(e.path(), AUDIO_EXTENSIONS))
    {
        discovery.encountered += 1;
        let output = mirrored_output(entry.path(), source_root, dest_root);
        if !output.exists() {
            discovery.pending.push(entry.path().to_path_buf());
        }
    }

    discovery
}

/// Aggregate outcome of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Relative paths of files whose task exhausted its retries.
    pub failures: Vec<PathBuf>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&mut self) {
        self.total += 1;
        self.succeeded += 1;
    }

    pub fn fail(&mut self, relative: PathBuf) {
        self.total += 1;
        self.failed += 1;
        self.failures.push(relative);
    }

    pub fn skip(&mut self) {
        self.total += 1;
        self.skipped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn extension_matching_is_case_insensitive() {
        assert!(has_extension(Path::new("a/b.FLAC"), AUDIO_EXTENSIONS));
        assert!(has_extension(Path::new("b.Mp3"), AUDIO_EXTENSIONS));
        assert!(!has_extension(Path::new("b.wav"), AUDIO_EXTENSIONS));
        assert!(!has_extension(Path::new("noext"), AUDIO_EXTENSIONS));
    }

    #[test]
    fn mirrored_output_swaps_root_and_extension() {
        let out = mirrored_output(
            Path::new("/music/artist/album/track.flac"),
            Path::new("/music"),
            Path::new("/converted"),
        );
        assert_eq!(out, PathBuf::from("/converted/artist/album/track.m4a"));
    }

    #[test]
    fn collect_pending_skips_already_converted() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        fs::create_dir_all(src.path().join("album")).unwrap();
        fs::write(src.path().join("album/one.flac"), b"x").unwrap();
        fs::write(src.path().join("album/two.mp3"), b"x").unwrap();
        fs::write(src.path().join("album/notes.txt"), b"x").unwrap();

        // "one" already has a mirrored output
        fs::create_dir_all(dst.path().join("album")).unwrap();
        fs::write(dst.path().join("album/one.m4a"), b"x").unwrap();

        let discovery = collect_pending(src.path(), dst.path());
        assert_eq!(discovery.encountered, 2);
        assert_eq!(discovery.pending.len(), 1);
        assert!(discovery.pending[0].ends_with("album/two.mp3"));
    }

    #[test]
    fn batch_result_tracks_failures() {
        let mut result = BatchResult::new();
        result.success();
        result.skip();
        result.fail(PathBuf::from("album/two.mp3"));

        assert_eq!(result.total, 3);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures, vec![PathBuf::from("album/two.mp3")]);
    }
}
