//! Metadata standardisation of a finished MP4 file.
//!
//! Runs after the transfer pass, always against the destination's own tags:
//! gate on the minimum tag set, prune to the catalogue, normalise cover art,
//! pull in lyric sidecars, optionally swap artist fields, stamp the encoder
//! and persist. Any failing step aborts with its step description; partial
//! mutations are left as-is and the caller must not promote the file.

use crate::tag_store::{CoverArt, TagStore};
use crate::tags::{minimum_idents, TagValue, CATALOGUE};
use image::{DynamicImage, ImageFormat};
use shared_utils::{PipelineError, TaskLog};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Longest allowed side of embedded cover art, in pixels.
pub const MAX_COVER_DIMENSION: u32 = 500;

const STAMP_NAME: &str = concat!("audio-aac ", env!("CARGO_PKG_VERSION"));

/// Knobs for the standardisation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardiseOptions {
    /// Swap artist/album-artist (and their sort tags) on the way out.
    pub swap_artist_album_artist: bool,
}

/// Decode, fit within the dimension cap and re-encode as JPEG.
fn resize_cover(data: &[u8]) -> Result<Vec<u8>, String> {
    let decoded = image::load_from_memory(data).map_err(|e| e.to_string())?;
    let fitted = decoded.thumbnail(MAX_COVER_DIMENSION, MAX_COVER_DIMENSION);
    let mut encoded = Vec::new();
    DynamicImage::ImageRgb8(fitted.to_rgb8())
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)
        .map_err(|e| e.to_string())?;
    Ok(encoded)
}

fn is_resizable(mime: Option<&str>) -> bool {
    matches!(mime, Some("image/jpeg") | Some("image/png"))
}

/// Case-insensitive `cover.{jpg,jpeg,png}` siblings of `source`, largest
/// file first.
fn nearby_cover(source: &Path) -> Result<Option<PathBuf>, String> {
    let Some(parent) = source.parent() else {
        return Ok(None);
    };
    let entries = std::fs::read_dir(parent).map_err(|e| e.to_string())?;

    let mut best: Option<(u64, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|e| e.to_string())?;
        let path = entry.path();
        let stem_matches = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.eq_ignore_ascii_case("cover"))
            .unwrap_or(false);
        let ext_matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_lowercase();
                e == "jpg" || e == "jpeg" || e == "png"
            })
            .unwrap_or(false);
        if !stem_matches || !ext_matches {
            continue;
        }
        let size = entry.metadata().map_err(|e| e.to_string())?.len();
        if best.as_ref().map(|(s, _)| size > *s).unwrap_or(true) {
            best = Some((size, path));
        }
    }
    Ok(best.map(|(_, path)| path))
}

/// Strip the leading `[mm:ss.xx]` timestamp from each synced-lyric line.
///
/// A bracket pair counts as a timestamp when its contents, minus `:` and
/// `.`, are all digits; anything else (unclosed bracket, words) passes
/// through trimmed.
pub fn clean_up_lyrics(lyrics: &str) -> String {
    let mut cleaned: Vec<String> = Vec::new();
    for line in lyrics.trim().lines() {
        if !line.starts_with('[') || !line.contains(']') {
            cleaned.push(line.trim().to_string());
            continue;
        }
        let close = line.find(']').unwrap_or(0);
        let bracketed = &line[1..close];
        let is_timestamp = bracketed
            .chars()
            .filter(|c| *c != ':' && *c != '.')
            .all(|c| c.is_ascii_digit());
        if is_timestamp {
            cleaned.push(line[close + 1..].trim().to_string());
        } else {
            cleaned.push(line.trim().to_string());
        }
    }
    cleaned.join("\n").trim().to_string()
}

fn swap_fields(store: &mut dyn TagStore, a: &str, b: &str) {
    if let (Some(left), Some(right)) = (store.get(a), store.get(b)) {
        store.set(a, right);
        store.set(b, left);
    }
}

fn step_err(step: &str, reason: impl ToString) -> PipelineError {
    PipelineError::standardisation(step, reason.to_string())
}

/// Run the full standardisation pass over `store`, using `source` (the
/// original library file) to find sidecar covers and lyrics.
pub fn standardise(
    store: &mut dyn TagStore,
    source: &Path,
    options: StandardiseOptions,
    log: &TaskLog,
) -> Result<(), PipelineError> {
    log.append(&format!(
        "[standardise] fields present: {}",
        store.idents().join(", ")
    ));

    // step 0: the minimum set gates everything else
    let missing: Vec<&str> = minimum_idents().filter(|i| !store.contains(i)).collect();
    if !missing.is_empty() {
        return Err(step_err(
            "missing bare minimum tags",
            missing.join(", "),
        ));
    }

    // step 1: prune to the catalogue
    let keep: Vec<&str> = CATALOGUE.iter().map(|e| e.ident).collect();
    store.prune_except(&keep);

    // step 2: resize whatever art is already embedded
    let mut covers = store.covers();
    if !covers.is_empty() {
        for cover in &mut covers {
            if !is_resizable(cover.mime.as_deref()) {
                continue;
            }
            let resized = resize_cover(&cover.data)
                .map_err(|e| step_err("failed to resize existing cover art", e))?;
            cover.data = resized;
            cover.mime = Some("image/jpeg".to_string());
        }
        store.set_covers(covers);
    } else {
        // step 3: no embedded art, look for a sibling cover file
        match nearby_cover(source).map_err(|e| step_err("failed to glob for nearby cover art", e))? {
            Some(path) => {
                let data = std::fs::read(&path)
                    .map_err(|e| step_err("failed to read nearby cover art", e))?;
                let resized = resize_cover(&data)
                    .map_err(|e| step_err("failed to resize nearby cover art", e))?;
                log.append(&format!("[standardise] using cover '{}'", path.display()));
                store.set_covers(vec![CoverArt {
                    data: resized,
                    mime: Some("image/jpeg".to_string()),
                }]);
            }
            None => {
                log.append(&format!(
                    "[standardise] warning: no cover art found nearby '{}'",
                    source.display()
                ));
            }
        }
    }

    // step 4: lyric sidecars; a synced .lrc wins over a plain .txt
    let synced = source.with_extension("lrc");
    let unsynced = source.with_extension("txt");
    if synced.exists() {
        let text = std::fs::read_to_string(&synced)
            .map_err(|e| step_err("failed to read synced lyrics", e))?;
        store.set("\u{a9}lyr", TagValue::Text(text));
    } else if unsynced.exists() {
        let text = std::fs::read_to_string(&unsynced)
            .map_err(|e| step_err("failed to read lyrics", e))?;
        store.set("\u{a9}lyr", TagValue::Text(text));
    }
    if let Some(lyrics) = store.get("\u{a9}lyr") {
        store.set("\u{a9}lyr", TagValue::Text(clean_up_lyrics(&lyrics.join_text())));
    }

    // step 5: optional artist swaps, each leg only when both members exist
    if options.swap_artist_album_artist {
        swap_fields(store, "\u{a9}ART", "aART");
        swap_fields(store, "soar", "soaa");
    }

    // step 6: stamp the encoder chain, preserving the value shape
    if let Some(encoder) = store.get("\u{a9}too") {
        let stamped = match &encoder {
            TagValue::List(items) => {
                let old = items.first().cloned().unwrap_or_default();
                TagValue::List(vec![format!("{STAMP_NAME} via {old}")])
            }
            other => TagValue::Text(format!("{STAMP_NAME} via {}", other.join_text())),
        };
        store.set("\u{a9}too", stamped);
    }

    // step 7: persist
    store
        .save()
        .map_err(|e| step_err("failed to save audio", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag_store::MemoryStore;
    use crate::tags::Scheme;
    use image::{ImageBuffer, Rgb};

    fn minimum_store() -> MemoryStore {
        MemoryStore::new(Scheme::Mp4)
            .with("\u{a9}alb", TagValue::text("Album"))
            .with("\u{a9}ART", TagValue::text("Artist"))
            .with("\u{a9}nam", TagValue::text("Title"))
            .with("trkn", TagValue::Pairs(vec![(1, Some(10))]))
    }

    fn log() -> (tempfile::TempDir, TaskLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = TaskLog::new(dir.path(), Path::new("t.flac"));
        (dir, log)
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb::<u8>([120, 40, 200]));
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn missing_minimum_tags_abort_with_the_step() {
        let mut store = MemoryStore::new(Scheme::Mp4).with("\u{a9}alb", TagValue::text("Album"));
        let (dir, log) = log();

        let err = standardise(
            &mut store,
            &dir.path().join("t.flac"),
            StandardiseOptions::default(),
            &log,
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing bare minimum tags"));
        assert_eq!(store.saves, 0);
    }

    #[test]
    fn unknown_fields_are_pruned() {
        let mut store = minimum_store()
            .with("junk", TagValue::text("x"))
            .with("\u{a9}gen", TagValue::text("Jazz"));
        let (dir, log) = log();

        standardise(
            &mut store,
            &dir.path().join("t.flac"),
            StandardiseOptions::default(),
            &log,
        )
        .unwrap();
        assert!(!store.contains("junk"));
        assert!(store.contains("\u{a9}gen"));
        assert_eq!(store.saves, 1);
    }

    #[test]
    fn oversized_cover_is_fitted_preserving_aspect() {
        let mut store = minimum_store();
        store.set_covers(vec![CoverArt {
            data: png_bytes(2000, 1000),
            mime: Some("image/png".into()),
        }]);
        let (dir, log) = log();

        standardise(
            &mut store,
            &dir.path().join("t.flac"),
            StandardiseOptions::default(),
            &log,
        )
        .unwrap();

        let covers = store.covers();
        assert_eq!(covers.len(), 1);
        assert_eq!(covers[0].mime.as_deref(), Some("image/jpeg"));
        let img = image::load_from_memory(&covers[0].data).unwrap();
        assert_eq!((img.width(), img.height()), (500, 250));
    }

    #[test]
    fn largest_sibling_cover_wins() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("track.flac");
        std::fs::write(&source, b"x").unwrap();
        // the larger file is the higher-resolution art
        std::fs::write(dir.path().join("cover.jpg"), png_bytes(10, 10)).unwrap();
        std::fs::write(dir.path().join("Cover.png"), png_bytes(400, 400)).unwrap();

        let mut store = minimum_store();
        let (_logdir, log) = log();
        standardise(&mut store, &source, StandardiseOptions::default(), &log).unwrap();

        let covers = store.covers();
        assert_eq!(covers.len(), 1);
        let img = image::load_from_memory(&covers[0].data).unwrap();
        assert_eq!((img.width(), img.height()), (400, 400));
    }

    #[test]
    fn undecodable_embedded_cover_is_fatal() {
        let mut store = minimum_store();
        store.set_covers(vec![CoverArt {
            data: vec![0, 1, 2, 3],
            mime: Some("image/jpeg".into()),
        }]);
        let (dir, log) = log();

        let err = standardise(
            &mut store,
            &dir.path().join("t.flac"),
            StandardiseOptions::default(),
            &log,
        )
        .unwrap_err();
        assert!(err.to_string().contains("resize existing cover art"));
    }

    #[test]
    fn lrc_sidecar_wins_and_timestamps_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("track.flac");
        std::fs::write(&source, b"x").unwrap();
        std::fs::write(
            dir.path().join("track.lrc"),
            "[00:01.00] first line\n[00:05.32]second line\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("track.txt"), "plain lyrics").unwrap();

        let mut store = minimum_store();
        let (_logdir, log) = log();
        standardise(&mut store, &source, StandardiseOptions::default(), &log).unwrap();

        assert_eq!(
            store.get("\u{a9}lyr"),
            Some(TagValue::text("first line\nsecond line"))
        );
    }

    #[test]
    fn lyric_cleanup_leaves_non_timestamp_brackets_alone() {
        assert_eq!(clean_up_lyrics("[Chorus] la la"), "[Chorus] la la");
        assert_eq!(clean_up_lyrics("  [00:12.34] hi  "), "hi");
        assert_eq!(clean_up_lyrics("[12:34 unclosed"), "[12:34 unclosed");
        assert_eq!(clean_up_lyrics("plain line"), "plain line");
    }

    #[test]
    fn artist_swap_needs_both_members() {
        let mut store = minimum_store()
            .with("aART", TagValue::text("Album Artist"))
            .with("soar", TagValue::text("Artist, The"));
        let (dir, log) = log();

        standardise(
            &mut store,
            &dir.path().join("t.flac"),
            StandardiseOptions {
                swap_artist_album_artist: true,
            },
            &log,
        )
        .unwrap();

        assert_eq!(store.get("\u{a9}ART"), Some(TagValue::text("Album Artist")));
        assert_eq!(store.get("aART"), Some(TagValue::text("Artist")));
        // soaa was absent, so the sort pair stays untouched
        assert_eq!(store.get("soar"), Some(TagValue::text("Artist, The")));
        assert!(store.get("soaa").is_none());
    }

    #[test]
    fn encoder_stamp_preserves_shape_and_names_the_old_encoder() {
        let mut scalar = minimum_store().with("\u{a9}too", TagValue::text("LAME 3.100"));
        let mut list = minimum_store().with(
            "\u{a9}too",
            TagValue::List(vec!["qaac 2.82".into()]),
        );
        let (dir, log) = log();

        standardise(
            &mut scalar,
            &dir.path().join("t.flac"),
            StandardiseOptions::default(),
            &log,
        )
        .unwrap();
        standardise(
            &mut list,
            &dir.path().join("t.flac"),
            StandardiseOptions::default(),
            &log,
        )
        .unwrap();

        match scalar.get("\u{a9}too") {
            Some(TagValue::Text(s)) => assert!(s.contains("via LAME 3.100")),
            other => panic!("unexpected shape {other:?}"),
        }
        match list.get("\u{a9}too") {
            Some(TagValue::List(items)) => {
                assert_eq!(items.len(), 1);
                assert!(items[0].contains("via qaac 2.82"));
            }
            other => panic!("unexpected shape {other:?}"),
        }
    }
}
