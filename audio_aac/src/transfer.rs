//! Metadata transfer: the container-level remux plus the field-mapping pass
//! that picks up whatever the muxer missed.

use crate::convert::run_converter;
use crate::tag_store::TagStore;
use crate::tags::{always_remapped, catalogue_entry, FieldKind, SchemeMap, SlotKind, TagValue};
use shared_utils::{PipelineError, TaskLog};
use std::path::Path;

/// Remux the freshly-encoded audio into a new container, letting ffmpeg
/// import whatever metadata and cover art it understands from the original
/// source. Ogg sources need stream-addressed metadata mapping; everything
/// else imports container-level metadata.
pub fn remux(
    source: &Path,
    audio: &Path,
    output: &Path,
    log: &TaskLog,
) -> Result<(), PipelineError> {
    let is_ogg = source
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("ogg"))
        .unwrap_or(false);

    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        source.to_string_lossy().into_owned(),
        "-i".to_string(),
        audio.to_string_lossy().into_owned(),
    ];
    if is_ogg {
        args.extend([
            "-codec".to_string(),
            "copy".to_string(),
            "-map".to_string(),
            "1".to_string(),
            "-map_metadata".to_string(),
            "0:s:0".to_string(),
        ]);
    } else {
        args.extend([
            "-map".to_string(),
            "1".to_string(),
            "-codec".to_string(),
            "copy".to_string(),
        ]);
    }
    args.extend([
        "-map".to_string(),
        "0:1?".to_string(),
    ]);
    if !is_ogg {
        args.extend(["-map_metadata".to_string(), "0".to_string()]);
    }
    args.extend([
        "-disposition:0".to_string(),
        "default".to_string(),
        "{output}".to_string(),
    ]);

    run_converter("ffmpeg", &args, source, output, log).map_err(|e| match e {
        PipelineError::Conversion { input, reason, .. } => {
            PipelineError::MetadataCopy { input, reason }
        }
        other => other,
    })
}

/// Outcome counters of one field-mapping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingReport {
    pub attempted: usize,
    pub mapped: usize,
}

fn scalar_text(value: &TagValue) -> Result<String, String> {
    match value {
        TagValue::Text(s) => Ok(s.clone()),
        TagValue::List(items) if items.len() == 1 => Ok(items[0].clone()),
        TagValue::List(items) => Err(format!("expected 1 element, got {}", items.len())),
        TagValue::Int(n) => Ok(n.to_string()),
        TagValue::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        TagValue::Pairs(_) => Err("unexpected composite value".to_string()),
    }
}

fn coerce_int(value: &TagValue) -> Result<u32, String> {
    if let TagValue::Int(n) = value {
        return Ok(*n);
    }
    let text = scalar_text(value)?;
    // numeric-part frames carry "N" or "N/M"; the leading number wins
    let head = text.split('/').next().unwrap_or("").trim();
    head.parse()
        .map_err(|_| format!("'{text}' is not a number"))
}

fn coerce_bool(value: &TagValue) -> Result<bool, String> {
    if let TagValue::Bool(b) = value {
        return Ok(*b);
    }
    Ok(coerce_int(value)? != 0)
}

fn coerce_pair(value: &TagValue) -> Result<TagValue, String> {
    if let TagValue::Pairs(_) = value {
        return Ok(value.clone());
    }
    let text = scalar_text(value)?;
    let (left, right) = text
        .split_once('/')
        .ok_or_else(|| format!("'{text}' is not an 'N/M' composite"))?;
    let number: u32 = left
        .trim()
        .parse()
        .map_err(|_| format!("'{left}' is not a number"))?;
    let total: u32 = right
        .trim()
        .parse()
        .map_err(|_| format!("'{right}' is not a number"))?;
    Ok(TagValue::Pairs(vec![(number, Some(total))]))
}

fn coerce(value: &TagValue, kind: FieldKind) -> Result<TagValue, String> {
    match kind {
        FieldKind::Text => Ok(TagValue::Text(value.join_text())),
        FieldKind::Int => coerce_int(value).map(TagValue::Int),
        FieldKind::Bool => coerce_bool(value).map(TagValue::Bool),
        FieldKind::Pair => coerce_pair(value),
        FieldKind::Cover => Err("cover art is not field-mapped".to_string()),
    }
}

/// Second-half coercion: a multi-valued source contributes its second
/// element when it has one, its only element otherwise.
fn coerce_second(value: &TagValue) -> Result<u32, String> {
    match value {
        TagValue::List(items) if items.is_empty() => Err("empty value list".to_string()),
        TagValue::List(items) => {
            let pick = items[items.len().min(2) - 1].clone();
            coerce_int(&TagValue::Text(pick))
        }
        other => coerce_int(other),
    }
}

/// Map every entry of `map` from `source` onto `dest`, logging and counting
/// per-field failures without ever aborting the pass.
pub fn map_fields(
    source: &dyn TagStore,
    dest: &mut dyn TagStore,
    map: &SchemeMap,
    log: &TaskLog,
) -> MappingReport {
    let mut report = MappingReport::default();

    for entry in map.entries {
        let Some(value) = source.get(entry.source) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }

        let Some(catalogue) = catalogue_entry(entry.dest) else {
            continue;
        };

        let outcome: Result<Option<TagValue>, String> = match entry.slot {
            SlotKind::Replace => {
                if dest.contains(entry.dest) && !always_remapped(entry.dest) {
                    continue;
                }
                report.attempted += 1;
                coerce(&value, catalogue.kind).map(Some)
            }
            SlotKind::FirstOfPair => {
                if dest.contains(entry.dest) {
                    continue;
                }
                report.attempted += 1;
                coerce_int(&value).map(|n| Some(TagValue::Pairs(vec![(n, None)])))
            }
            SlotKind::SecondOfPair => {
                // never invent a total without a current value
                match dest.get(entry.dest) {
                    Some(TagValue::Pairs(pairs)) if !pairs.is_empty() => {
                        report.attempted += 1;
                        coerce_second(&value)
                            .map(|total| Some(TagValue::Pairs(vec![(pairs[0].0, Some(total))])))
                    }
                    Some(TagValue::Pairs(_)) | None => {
                        log.append(&format!(
                            "[map] skipping 2nd value of '{}' (missing first value)",
                            entry.dest
                        ));
                        continue;
                    }
                    Some(_) => {
                        log.append(&format!(
                            "[map] skipping 2nd value of '{}' (existing value is not a composite pair)",
                            entry.dest
                        ));
                        continue;
                    }
                }
            }
        };

        match outcome {
            Ok(Some(mapped)) => {
                log.append(&format!("[map] {} -> {}", entry.source, entry.dest));
                dest.set(entry.dest, mapped);
                report.mapped += 1;
            }
            Ok(None) => {}
            Err(reason) => {
                let failure = PipelineError::FieldMapping {
                    source_field: entry.source.to_string(),
                    dest_field: entry.dest.to_string(),
                    reason,
                };
                log.append(&format!("[map] warning: {failure}"));
            }
        }
    }

    log.append(&format!(
        "[map] mapped {}/{} attempted fields",
        report.mapped, report.attempted
    ));
    report
}

/// Run the mapping pass against on-disk files and persist the result.
///
/// A failed save is logged and absorbed; the task continues against what
/// made it to disk. MP4 sources skip the pass entirely, the muxer already
/// speaks their scheme.
pub fn transfer_fields(
    source_path: &Path,
    dest_path: &Path,
    log: &TaskLog,
) -> Result<MappingReport, PipelineError> {
    let source = crate::tag_store::open_store(source_path)?;
    let mut dest = crate::tag_store::open_store(dest_path)?;

    let Some(map) = SchemeMap::for_scheme(source.scheme()) else {
        log.append("[map] source already uses the target scheme, skipping field mapping");
        return Ok(MappingReport::default());
    };

    let report = map_fields(&source, &mut dest, &map, log);
    if let Err(e) = dest.save() {
        log.append(&format!("[map] warning: {e}"));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag_store::MemoryStore;
    use crate::tags::Scheme;

    fn log() -> (tempfile::TempDir, TaskLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = TaskLog::new(dir.path(), Path::new("t.flac"));
        (dir, log)
    }

    #[test]
    fn vorbis_number_and_total_assemble_one_pair() {
        let source = MemoryStore::new(Scheme::Vorbis)
            .with("tracknumber", TagValue::text("3"))
            .with("tracktotal", TagValue::text("12"));
        let mut dest = MemoryStore::new(Scheme::Mp4);
        let (_dir, log) = log();

        map_fields(&source, &mut dest, &SchemeMap::vorbis(), &log);
        assert_eq!(dest.get("trkn"), Some(TagValue::Pairs(vec![(3, Some(12))])));
    }

    #[test]
    fn id3_slash_frame_splits_into_integer_pair() {
        let source = MemoryStore::new(Scheme::Id3).with("TRCK", TagValue::text("3/12"));
        let mut dest = MemoryStore::new(Scheme::Mp4);
        let (_dir, log) = log();

        map_fields(&source, &mut dest, &SchemeMap::id3(), &log);
        assert_eq!(dest.get("trkn"), Some(TagValue::Pairs(vec![(3, Some(12))])));
    }

    #[test]
    fn id3_track_without_total_is_a_logged_miss() {
        let source = MemoryStore::new(Scheme::Id3).with("TRCK", TagValue::text("3"));
        let mut dest = MemoryStore::new(Scheme::Mp4);
        let (_dir, log) = log();

        let report = map_fields(&source, &mut dest, &SchemeMap::id3(), &log);
        assert_eq!(dest.get("trkn"), None);
        assert_eq!(report.mapped, 0);
        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("warning"));
    }

    #[test]
    fn replace_fields_do_not_overwrite_the_muxer() {
        let source = MemoryStore::new(Scheme::Vorbis).with("album", TagValue::text("From Source"));
        let mut dest = MemoryStore::new(Scheme::Mp4).with("\u{a9}alb", TagValue::text("From Muxer"));
        let (_dir, log) = log();

        map_fields(&source, &mut dest, &SchemeMap::vorbis(), &log);
        assert_eq!(dest.get("\u{a9}alb"), Some(TagValue::text("From Muxer")));
    }

    #[test]
    fn always_remap_fields_overwrite_the_muxer() {
        // the muxer writes compilation flags as text it cannot coerce
        let source = MemoryStore::new(Scheme::Id3).with("TCMP", TagValue::text("1"));
        let mut dest = MemoryStore::new(Scheme::Mp4).with("cpil", TagValue::text("1"));
        let (_dir, log) = log();

        map_fields(&source, &mut dest, &SchemeMap::id3(), &log);
        assert_eq!(dest.get("cpil"), Some(TagValue::Bool(true)));
    }

    #[test]
    fn second_of_pair_never_invents_a_first() {
        let source = MemoryStore::new(Scheme::Vorbis).with("tracktotal", TagValue::text("12"));
        let mut dest = MemoryStore::new(Scheme::Mp4);
        let (_dir, log) = log();

        let report = map_fields(&source, &mut dest, &SchemeMap::vorbis(), &log);
        assert_eq!(dest.get("trkn"), None);
        assert_eq!(report.attempted, 0);
        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("missing first value"));
    }

    #[test]
    fn list_valued_text_joins_with_semicolons() {
        let source = MemoryStore::new(Scheme::Vorbis).with(
            "genre",
            TagValue::List(vec!["Jazz".into(), "Fusion".into()]),
        );
        let mut dest = MemoryStore::new(Scheme::Mp4);
        let (_dir, log) = log();

        map_fields(&source, &mut dest, &SchemeMap::vorbis(), &log);
        assert_eq!(dest.get("\u{a9}gen"), Some(TagValue::text("Jazz; Fusion")));
    }

    #[test]
    fn non_numeric_pair_member_is_absorbed_not_fatal() {
        let source = MemoryStore::new(Scheme::Vorbis)
            .with("tracknumber", TagValue::text("three"))
            .with("album", TagValue::text("Album"));
        let mut dest = MemoryStore::new(Scheme::Mp4);
        let (_dir, log) = log();

        let report = map_fields(&source, &mut dest, &SchemeMap::vorbis(), &log);
        assert_eq!(dest.get("trkn"), None);
        // the pass carried on and mapped the album
        assert_eq!(dest.get("\u{a9}alb"), Some(TagValue::text("Album")));
        assert_eq!(report.mapped, 1);
    }

    #[test]
    fn mapping_pass_is_idempotent_for_replace_fields() {
        let source = MemoryStore::new(Scheme::Vorbis)
            .with("album", TagValue::text("Album"))
            .with("artist", TagValue::text("Artist"));
        let mut dest = MemoryStore::new(Scheme::Mp4);
        let (_dir, log) = log();

        map_fields(&source, &mut dest, &SchemeMap::vorbis(), &log);
        let writes_after_first = dest.sets;
        assert_eq!(writes_after_first, 2);

        // both destinations are populated now, so a second pass writes nothing
        let report = map_fields(&source, &mut dest, &SchemeMap::vorbis(), &log);
        assert_eq!(dest.sets, writes_after_first);
        assert_eq!(report.mapped, 0);
        assert_eq!(dest.get("\u{a9}alb"), Some(TagValue::text("Album")));
        assert_eq!(dest.get("\u{a9}ART"), Some(TagValue::text("Artist")));
    }

    #[test]
    fn vorbis_compilation_text_becomes_a_flag() {
        let source = MemoryStore::new(Scheme::Vorbis).with("compilation", TagValue::text("0"));
        let mut dest = MemoryStore::new(Scheme::Mp4);
        let (_dir, log) = log();

        map_fields(&source, &mut dest, &SchemeMap::vorbis(), &log);
        assert_eq!(dest.get("cpil"), Some(TagValue::Bool(false)));
    }
}
