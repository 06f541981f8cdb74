//! The tag value model, the destination field catalogue and the per-scheme
//! mapping tables.
//!
//! Destinations are MP4 ilst atoms. The catalogue is the whitelist of atoms
//! a finished file may carry (music only, no podcast/audiobook fields); the
//! scheme maps describe how ID3 frames and Vorbis comments land on those
//! atoms.

/// A typed tag value as the pipeline moves it around.
///
/// `Pairs` is the canonical composite shape for track/disc numbers: a list
/// of one `(current, total)` pair, the total optional. `List` only ever
/// appears on read, for multi-valued source tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Text(String),
    List(Vec<String>),
    Int(u32),
    Bool(bool),
    Pairs(Vec<(u32, Option<u32>)>),
}

impl TagValue {
    pub fn text(value: impl Into<String>) -> Self {
        TagValue::Text(value.into())
    }

    /// Scalar text rendering of this value; lists join with `"; "`.
    pub fn join_text(&self) -> String {
        match self {
            TagValue::Text(s) => s.clone(),
            TagValue::List(items) => items.join("; "),
            TagValue::Int(n) => n.to_string(),
            TagValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            TagValue::Pairs(pairs) => pairs
                .iter()
                .map(|(a, b)| match b {
                    Some(b) => format!("{a}/{b}"),
                    None => a.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; "),
        }
    }

    /// True when there is nothing usable in the value.
    pub fn is_empty(&self) -> bool {
        match self {
            TagValue::Text(s) => s.is_empty(),
            TagValue::List(items) => items.is_empty(),
            TagValue::Pairs(pairs) => pairs.is_empty(),
            TagValue::Int(_) | TagValue::Bool(_) => false,
        }
    }
}

/// What type a destination atom stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Int,
    Bool,
    Pair,
    Cover,
}

/// One destination atom the pipeline keeps.
#[derive(Debug, Clone, Copy)]
pub struct CatalogueEntry {
    pub ident: &'static str,
    pub kind: FieldKind,
    /// Part of the minimum set a finished file must carry.
    pub minimum: bool,
}

const fn entry(ident: &'static str, kind: FieldKind) -> CatalogueEntry {
    CatalogueEntry {
        ident,
        kind,
        minimum: false,
    }
}

const fn minimum(ident: &'static str, kind: FieldKind) -> CatalogueEntry {
    CatalogueEntry {
        ident,
        kind,
        minimum: true,
    }
}

/// Atoms kept through standardisation. Anything else on a destination file
/// gets pruned.
pub const CATALOGUE: &[CatalogueEntry] = &[
    minimum("\u{a9}alb", FieldKind::Text), // album
    minimum("\u{a9}ART", FieldKind::Text), // artist
    minimum("\u{a9}nam", FieldKind::Text), // title
    minimum("trkn", FieldKind::Pair),      // track number
    entry("\u{a9}cmt", FieldKind::Text),   // comment
    entry("\u{a9}day", FieldKind::Text),   // year
    entry("\u{a9}gen", FieldKind::Text),   // genre
    entry("\u{a9}lyr", FieldKind::Text),   // lyrics
    entry("\u{a9}mvc", FieldKind::Int),    // movement count
    entry("\u{a9}mvi", FieldKind::Int),    // movement index
    entry("\u{a9}mvn", FieldKind::Text),   // movement
    entry("\u{a9}wrt", FieldKind::Text),   // composer
    entry("\u{a9}too", FieldKind::Text),   // encoder
    entry("aART", FieldKind::Text),        // album artist
    entry("covr", FieldKind::Cover),       // cover art
    entry("cpil", FieldKind::Bool),        // is a compilation?
    entry("cprt", FieldKind::Text),        // copyright
    entry("disk", FieldKind::Pair),        // disc number
    entry("soaa", FieldKind::Text),        // album artist sort order
    entry("soal", FieldKind::Text),        // album sort order
    entry("soar", FieldKind::Text),        // artist sort order
    entry("sonm", FieldKind::Text),        // title sort order
    entry("soco", FieldKind::Text),        // composer sort order
    entry("tmpo", FieldKind::Int),         // bpm
];

pub fn catalogue_entry(ident: &str) -> Option<&'static CatalogueEntry> {
    CATALOGUE.iter().find(|e| e.ident == ident)
}

pub fn minimum_idents() -> impl Iterator<Item = &'static str> {
    CATALOGUE.iter().filter(|e| e.minimum).map(|e| e.ident)
}

/// Numeric composites the muxer cannot coerce itself; replace-kind mappings
/// onto these run even when the destination already has a value.
pub const ALWAYS_REMAP: &[&str] = &["\u{a9}mvc", "tmpo", "cpil", "trkn", "disk"];

pub fn always_remapped(ident: &str) -> bool {
    ALWAYS_REMAP.contains(&ident)
}

/// How a mapping writes its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Whole-value write.
    Replace,
    /// Current half of a composite pair; only into a wholly absent pair.
    FirstOfPair,
    /// Total half of a composite pair; only onto an existing pair.
    SecondOfPair,
}

/// One source field → destination atom mapping.
#[derive(Debug, Clone, Copy)]
pub struct MappingEntry {
    pub source: &'static str,
    pub dest: &'static str,
    pub slot: SlotKind,
}

const fn map(source: &'static str, dest: &'static str, slot: SlotKind) -> MappingEntry {
    MappingEntry { source, dest, slot }
}

/// The tagging scheme a source file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Id3,
    Vorbis,
    Mp4,
}

/// Ordered mapping table for one source scheme.
#[derive(Debug, Clone)]
pub struct SchemeMap {
    pub scheme: Scheme,
    pub entries: &'static [MappingEntry],
}

const VORBIS_ENTRIES: &[MappingEntry] = &[
    map("album", "\u{a9}alb", SlotKind::Replace),
    map("artist", "\u{a9}ART", SlotKind::Replace),
    map("title", "\u{a9}nam", SlotKind::Replace),
    map("tracknumber", "trkn", SlotKind::FirstOfPair),
    map("tracktotal", "trkn", SlotKind::SecondOfPair),
    map("totaltracks", "trkn", SlotKind::SecondOfPair),
    map("comment", "\u{a9}cmt", SlotKind::Replace),
    map("date", "\u{a9}day", SlotKind::Replace),
    map("genre", "\u{a9}gen", SlotKind::Replace),
    map("lyrics", "\u{a9}lyr", SlotKind::Replace),
    map("unsyncedlyrics", "\u{a9}lyr", SlotKind::Replace),
    map("composer", "\u{a9}wrt", SlotKind::Replace),
    map("encoder", "\u{a9}too", SlotKind::Replace),
    map("albumartist", "aART", SlotKind::Replace),
    map("compilation", "cpil", SlotKind::Replace),
    map("copyright", "cprt", SlotKind::Replace),
    map("discnumber", "disk", SlotKind::FirstOfPair),
    map("disctotal", "disk", SlotKind::SecondOfPair),
    map("totaldiscs", "disk", SlotKind::SecondOfPair),
    map("albumartistsort", "soaa", SlotKind::Replace),
    map("albumsort", "soal", SlotKind::Replace),
    map("artistsort", "soar", SlotKind::Replace),
    map("titlesort", "sonm", SlotKind::Replace),
    map("composersort", "soco", SlotKind::Replace),
    map("bpm", "tmpo", SlotKind::Replace),
];

const ID3_ENTRIES: &[MappingEntry] = &[
    map("TALB", "\u{a9}alb", SlotKind::Replace),
    map("TPE1", "\u{a9}ART", SlotKind::Replace),
    map("TIT2", "\u{a9}nam", SlotKind::Replace),
    map("TRCK", "trkn", SlotKind::Replace), // "N/M" frame, split on write
    map("TXXX:TRACKTOTAL", "trkn", SlotKind::SecondOfPair),
    map("COMM", "\u{a9}cmt", SlotKind::Replace),
    map("TDRC", "\u{a9}day", SlotKind::Replace),
    map("TCON", "\u{a9}gen", SlotKind::Replace),
    map("MVIN", "\u{a9}mvc", SlotKind::Replace),
    map("MVNM", "\u{a9}mvn", SlotKind::Replace),
    map("TCOM", "\u{a9}wrt", SlotKind::Replace),
    map("TENC", "\u{a9}too", SlotKind::Replace),
    map("TPE2", "aART", SlotKind::Replace), // band -> album artist
    map("TCMP", "cpil", SlotKind::Replace),
    map("TCOP", "cprt", SlotKind::Replace),
    map("TPOS", "disk", SlotKind::Replace), // part of set, "N/M"
    map("TSO2", "soaa", SlotKind::Replace),
    map("TSOA", "soal", SlotKind::Replace),
    map("TSOP", "soar", SlotKind::Replace),
    map("TSOT", "sonm", SlotKind::Replace),
    map("TSOC", "soco", SlotKind::Replace),
    map("TBPM", "tmpo", SlotKind::Replace),
    map("TXXX:DISCTOTAL", "disk", SlotKind::SecondOfPair),
    map("TXXX:LYRICS", "\u{a9}lyr", SlotKind::Replace),
    map("USLT", "\u{a9}lyr", SlotKind::Replace),
];

impl SchemeMap {
    pub fn vorbis() -> Self {
        SchemeMap {
            scheme: Scheme::Vorbis,
            entries: VORBIS_ENTRIES,
        }
    }

    pub fn id3() -> Self {
        SchemeMap {
            scheme: Scheme::Id3,
            entries: ID3_ENTRIES,
        }
    }

    pub fn for_scheme(scheme: Scheme) -> Option<Self> {
        match scheme {
            Scheme::Id3 => Some(Self::id3()),
            Scheme::Vorbis => Some(Self::vorbis()),
            Scheme::Mp4 => None,
        }
    }
}
