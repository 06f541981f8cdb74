//! Tag storage behind one trait, so the mapping and standardisation logic
//! never touches a concrete tagging library.
//!
//! `LoftyStore` adapts lofty's generic tag layer to the pipeline's
//! ident-based view: idents are MP4 atoms, ID3 frame names or Vorbis comment
//! keys depending on the scheme, and composite track/disc values are
//! normalised on read. `MemoryStore` is the test double; it holds whatever
//! raw shapes a test puts in it.

use crate::tags::{Scheme, TagValue};
use lofty::config::{ParseOptions, WriteOptions};
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{ItemKey, ItemValue, Tag, TagExt, TagType};
use shared_utils::PipelineError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Embedded cover art, library-agnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime: Option<String>,
}

/// Uniform tag access for the transfer engine and the standardiser.
pub trait TagStore {
    fn scheme(&self) -> Scheme;
    fn contains(&self, ident: &str) -> bool;
    fn get(&self, ident: &str) -> Option<TagValue>;
    fn set(&mut self, ident: &str, value: TagValue);
    fn remove(&mut self, ident: &str);
    /// Idents currently present, scheme-native names for unmapped fields
    /// included.
    fn idents(&self) -> Vec<String>;
    /// Drop every field whose ident is not in `keep`. Cover art survives
    /// only when `keep` contains `covr`.
    fn prune_except(&mut self, keep: &[&str]);
    fn covers(&self) -> Vec<CoverArt>;
    /// Replace all embedded art.
    fn set_covers(&mut self, covers: Vec<CoverArt>);
    fn remove_covers(&mut self);
    fn save(&mut self) -> Result<(), PipelineError>;
}

/// How an ident resolves inside lofty's item model.
enum Lookup {
    Key(ItemKey),
    /// (current, total) item pair behind one composite ident.
    Pair(ItemKey, ItemKey),
    Cover,
}

fn lookup(scheme: Scheme, ident: &str) -> Option<Lookup> {
    use ItemKey::*;
    use Lookup::{Cover, Key, Pair};

    let found = match scheme {
        Scheme::Mp4 => match ident {
            "\u{a9}alb" => Key(AlbumTitle),
            "\u{a9}ART" => Key(TrackArtist),
            "\u{a9}nam" => Key(TrackTitle),
            "trkn" => Pair(TrackNumber, TrackTotal),
            "disk" => Pair(DiscNumber, DiscTotal),
            "\u{a9}cmt" => Key(Comment),
            "\u{a9}day" => Key(RecordingDate),
            "\u{a9}gen" => Key(Genre),
            "\u{a9}lyr" => Key(Lyrics),
            "\u{a9}mvc" => Key(MovementTotal),
            "\u{a9}mvi" => Key(MovementNumber),
            "\u{a9}mvn" => Key(Movement),
            "\u{a9}wrt" => Key(Composer),
            "\u{a9}too" => Key(EncoderSoftware),
            "aART" => Key(AlbumArtist),
            "cpil" => Key(FlagCompilation),
            "cprt" => Key(CopyrightMessage),
            "soaa" => Key(AlbumArtistSortOrder),
            "soal" => Key(AlbumTitleSortOrder),
            "soar" => Key(TrackArtistSortOrder),
            "sonm" => Key(TrackTitleSortOrder),
            "soco" => Key(ComposerSortOrder),
            "tmpo" => Key(IntegerBpm),
            "covr" => Cover,
            _ => return None,
        },
        Scheme::Id3 => match ident {
            "TALB" => Key(AlbumTitle),
            "TPE1" => Key(TrackArtist),
            "TIT2" => Key(TrackTitle),
            "TRCK" => Pair(TrackNumber, TrackTotal),
            "TPOS" => Pair(DiscNumber, DiscTotal),
            "TXXX:TRACKTOTAL" => Key(Unknown("TRACKTOTAL".to_string())),
            "TXXX:DISCTOTAL" => Key(Unknown("DISCTOTAL".to_string())),
            "TXXX:LYRICS" => Key(Unknown("LYRICS".to_string())),
            "COMM" => Key(Comment),
            "TDRC" => Key(RecordingDate),
            "TCON" => Key(Genre),
            "MVIN" => Key(MovementNumber),
            "MVNM" => Key(Movement),
            "TCOM" => Key(Composer),
            "TENC" => Key(EncodedBy),
            "TPE2" => Key(AlbumArtist),
            "TCMP" => Key(FlagCompilation),
            "TCOP" => Key(CopyrightMessage),
            "TSO2" => Key(AlbumArtistSortOrder),
            "TSOA" => Key(AlbumTitleSortOrder),
            "TSOP" => Key(TrackArtistSortOrder),
            "TSOT" => Key(TrackTitleSortOrder),
            "TSOC" => Key(ComposerSortOrder),
            "TBPM" => Key(IntegerBpm),
            "USLT" => Key(Lyrics),
            _ => return None,
        },
        Scheme::Vorbis => match ident {
            "album" => Key(AlbumTitle),
            "artist" => Key(TrackArtist),
            "title" => Key(TrackTitle),
            "tracknumber" => Key(TrackNumber),
            "tracktotal" => Key(TrackTotal),
            "totaltracks" => Key(Unknown("TOTALTRACKS".to_string())),
            "comment" => Key(Comment),
            "date" => Key(RecordingDate),
            "genre" => Key(Genre),
            "lyrics" => Key(Lyrics),
            "unsyncedlyrics" => Key(Unknown("UNSYNCEDLYRICS".to_string())),
            "composer" => Key(Composer),
            "encoder" => Key(EncoderSoftware),
            "albumartist" => Key(AlbumArtist),
            "compilation" => Key(FlagCompilation),
            "copyright" => Key(CopyrightMessage),
            "discnumber" => Key(DiscNumber),
            "disctotal" => Key(DiscTotal),
            "totaldiscs" => Key(Unknown("TOTALDISCS".to_string())),
            "albumartistsort" => Key(AlbumArtistSortOrder),
            "albumsort" => Key(AlbumTitleSortOrder),
            "artistsort" => Key(TrackArtistSortOrder),
            "titlesort" => Key(TrackTitleSortOrder),
            "composersort" => Key(ComposerSortOrder),
            "bpm" => Key(Bpm),
            _ => return None,
        },
    };
    Some(found)
}

fn known_idents(scheme: Scheme) -> &'static [&'static str] {
    match scheme {
        Scheme::Mp4 => &[
            "\u{a9}alb", "\u{a9}ART", "\u{a9}nam", "trkn", "disk", "\u{a9}cmt", "\u{a9}day",
            "\u{a9}gen", "\u{a9}lyr", "\u{a9}mvc", "\u{a9}mvi", "\u{a9}mvn", "\u{a9}wrt",
            "\u{a9}too", "aART", "cpil", "cprt", "soaa", "soal", "soar", "sonm", "soco", "tmpo",
            "covr",
        ],
        Scheme::Id3 => &[
            "TALB", "TPE1", "TIT2", "TRCK", "TPOS", "TXXX:TRACKTOTAL", "TXXX:DISCTOTAL",
            "TXXX:LYRICS", "COMM", "TDRC", "TCON", "MVIN", "MVNM", "TCOM", "TENC", "TPE2", "TCMP",
            "TCOP", "TSO2", "TSOA", "TSOP", "TSOT", "TSOC", "TBPM", "USLT",
        ],
        Scheme::Vorbis => &[
            "album", "artist", "title", "tracknumber", "tracktotal", "totaltracks", "comment",
            "date", "genre", "lyrics", "unsyncedlyrics", "composer", "encoder", "albumartist",
            "compilation", "copyright", "discnumber", "disctotal", "totaldiscs", "albumartistsort",
            "albumsort", "artistsort", "titlesort", "composersort", "bpm",
        ],
    }
}

fn mime_to_string(mime: Option<&MimeType>) -> Option<String> {
    mime.map(|m| match m {
        MimeType::Jpeg => "image/jpeg".to_string(),
        MimeType::Png => "image/png".to_string(),
        MimeType::Gif => "image/gif".to_string(),
        MimeType::Bmp => "image/bmp".to_string(),
        MimeType::Tiff => "image/tiff".to_string(),
        other => format!("{other:?}"),
    })
}

fn string_to_mime(mime: &str) -> MimeType {
    match mime {
        "image/jpeg" => MimeType::Jpeg,
        "image/png" => MimeType::Png,
        "image/gif" => MimeType::Gif,
        "image/bmp" => MimeType::Bmp,
        "image/tiff" => MimeType::Tiff,
        other => MimeType::Unknown(other.to_string()),
    }
}

/// Tag access backed by a lofty generic tag read from disk.
pub struct LoftyStore {
    path: PathBuf,
    scheme: Scheme,
    tag: Tag,
}

/// Open the primary tag of `path`, creating an empty one if the file has
/// no tags yet.
pub fn open_store(path: &Path) -> Result<LoftyStore, PipelineError> {
    let copy_err = |reason: String| PipelineError::MetadataCopy {
        input: path.to_path_buf(),
        reason,
    };

    let mut tagged = Probe::open(path)
        .map_err(|e| copy_err(e.to_string()))?
        .options(ParseOptions::new().read_properties(false))
        .read()
        .map_err(|e| copy_err(e.to_string()))?;

    let tag_type = tagged.primary_tag_type();
    let tag = tagged
        .remove(tag_type)
        .or_else(|| tagged.first_tag().cloned())
        .unwrap_or_else(|| Tag::new(tag_type));

    let scheme = match tag.tag_type() {
        TagType::Mp4Ilst => Scheme::Mp4,
        TagType::VorbisComments => Scheme::Vorbis,
        TagType::Id3v2 | TagType::Id3v1 => Scheme::Id3,
        other => {
            return Err(copy_err(format!("unsupported tagging scheme {other:?}")));
        }
    };

    Ok(LoftyStore {
        path: path.to_path_buf(),
        scheme,
        tag,
    })
}

impl LoftyStore {
    fn texts(&self, key: &ItemKey) -> Vec<String> {
        self.tag
            .get_items(key)
            .filter_map(|item| match item.value() {
                ItemValue::Text(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    fn first_int(&self, key: &ItemKey) -> Option<u32> {
        self.texts(key).first().and_then(|s| s.trim().parse().ok())
    }

    fn remove_key(&mut self, key: &ItemKey) {
        self.tag.retain(|item| item.key() != key);
    }

    fn set_key(&mut self, key: ItemKey, value: &TagValue) {
        self.tag.insert_text(key, value.join_text());
    }
}

impl TagStore for LoftyStore {
    fn scheme(&self) -> Scheme {
        self.scheme
    }

    fn contains(&self, ident: &str) -> bool {
        self.get(ident).map(|v| !v.is_empty()).unwrap_or(false)
    }

    fn get(&self, ident: &str) -> Option<TagValue> {
        match lookup(self.scheme, ident)? {
            Lookup::Key(key) => {
                let mut texts = self.texts(&key);
                match texts.len() {
                    0 => None,
                    1 => Some(TagValue::Text(texts.remove(0))),
                    _ => Some(TagValue::List(texts)),
                }
            }
            Lookup::Pair(number_key, total_key) => {
                let number = self.first_int(&number_key)?;
                let total = self.first_int(&total_key);
                match self.scheme {
                    // ID3 frames carry the raw "N/M" shape
                    Scheme::Id3 => Some(TagValue::Text(match total {
                        Some(t) => format!("{number}/{t}"),
                        None => number.to_string(),
                    })),
                    _ => Some(TagValue::Pairs(vec![(number, total)])),
                }
            }
            Lookup::Cover => None,
        }
    }

    fn set(&mut self, ident: &str, value: TagValue) {
        match lookup(self.scheme, ident) {
            Some(Lookup::Key(key)) => {
                self.remove_key(&key);
                self.set_key(key, &value);
            }
            Some(Lookup::Pair(number_key, total_key)) => {
                self.remove_key(&number_key);
                self.remove_key(&total_key);
                match value {
                    TagValue::Pairs(pairs) => {
                        if let Some((number, total)) = pairs.first() {
                            self.tag.insert_text(number_key, number.to_string());
                            if let Some(total) = total {
                                self.tag.insert_text(total_key, total.to_string());
                            }
                        }
                    }
                    other => {
                        self.tag.insert_text(number_key, other.join_text());
                    }
                }
            }
            Some(Lookup::Cover) | None => {}
        }
    }

    fn idents(&self) -> Vec<String> {
        let mut known_unknown_labels: Vec<String> = Vec::new();
        let mut present: Vec<String> = Vec::new();

        for ident in known_idents(self.scheme) {
            match lookup(self.scheme, ident) {
                Some(Lookup::Cover) => {
                    if !self.tag.pictures().is_empty() {
                        present.push(ident.to_string());
                    }
                }
                Some(Lookup::Key(ItemKey::Unknown(label))) => {
                    if self.contains(ident) {
                        present.push(ident.to_string());
                    }
                    known_unknown_labels.push(label);
                }
                _ => {
                    if self.contains(ident) {
                        present.push(ident.to_string());
                    }
                }
            }
        }

        // fields the scheme map does not speak for, by their raw names
        for item in self.tag.items() {
            if let ItemKey::Unknown(label) = item.key() {
                if !known_unknown_labels.contains(label) && !present.contains(label) {
                    present.push(label.clone());
                }
            }
        }
        present
    }

    fn remove(&mut self, ident: &str) {
        match lookup(self.scheme, ident) {
            Some(Lookup::Key(key)) => self.remove_key(&key),
            Some(Lookup::Pair(number_key, total_key)) => {
                self.remove_key(&number_key);
                self.remove_key(&total_key);
            }
            Some(Lookup::Cover) => self.remove_covers(),
            None => {}
        }
    }

    fn prune_except(&mut self, keep: &[&str]) {
        let mut allowed: Vec<ItemKey> = Vec::new();
        for ident in keep {
            match lookup(self.scheme, ident) {
                Some(Lookup::Key(key)) => allowed.push(key),
                Some(Lookup::Pair(number_key, total_key)) => {
                    allowed.push(number_key);
                    allowed.push(total_key);
                }
                Some(Lookup::Cover) | None => {}
            }
        }
        self.tag.retain(|item| allowed.iter().any(|k| k == item.key()));
        if !keep.contains(&"covr") {
            self.remove_covers();
        }
    }

    fn covers(&self) -> Vec<CoverArt> {
        self.tag
            .pictures()
            .iter()
            .map(|pic| CoverArt {
                data: pic.data().to_vec(),
                mime: mime_to_string(pic.mime_type()),
            })
            .collect()
    }

    fn set_covers(&mut self, covers: Vec<CoverArt>) {
        self.remove_covers();
        for cover in covers {
            let mime = cover.mime.as_deref().map(string_to_mime);
            let picture = Picture::new_unchecked(PictureType::CoverFront, mime, None, cover.data);
            self.tag.push_picture(picture);
        }
    }

    fn remove_covers(&mut self) {
        while !self.tag.pictures().is_empty() {
            self.tag.remove_picture(self.tag.pictures().len() - 1);
        }
    }

    fn save(&mut self) -> Result<(), PipelineError> {
        self.tag
            .save_to_path(&self.path, WriteOptions::default())
            .map_err(|e| PipelineError::MetadataSave {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }
}

/// In-memory store for tests: holds exactly what is put into it, raw shapes
/// included, and counts writes and saves instead of touching disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    scheme: Option<Scheme>,
    fields: BTreeMap<String, TagValue>,
    covers: Vec<CoverArt>,
    /// `set` calls since construction.
    pub sets: usize,
    pub saves: usize,
}

impl MemoryStore {
    pub fn new(scheme: Scheme) -> Self {
        MemoryStore {
            scheme: Some(scheme),
            ..Default::default()
        }
    }

    pub fn with(mut self, ident: &str, value: TagValue) -> Self {
        self.fields.insert(ident.to_string(), value);
        self
    }
}

impl TagStore for MemoryStore {
    fn scheme(&self) -> Scheme {
        self.scheme.unwrap_or(Scheme::Mp4)
    }

    fn contains(&self, ident: &str) -> bool {
        self.fields.get(ident).map(|v| !v.is_empty()).unwrap_or(false)
    }

    fn get(&self, ident: &str) -> Option<TagValue> {
        self.fields.get(ident).cloned()
    }

    fn set(&mut self, ident: &str, value: TagValue) {
        self.sets += 1;
        self.fields.insert(ident.to_string(), value);
    }

    fn remove(&mut self, ident: &str) {
        self.fields.remove(ident);
    }

    fn idents(&self) -> Vec<String> {
        let mut idents: Vec<String> = self.fields.keys().cloned().collect();
        if !self.covers.is_empty() {
            idents.push("covr".to_string());
        }
        idents
    }

    fn prune_except(&mut self, keep: &[&str]) {
        self.fields.retain(|ident, _| keep.contains(&ident.as_str()));
        if !keep.contains(&"covr") {
            self.covers.clear();
        }
    }

    fn covers(&self) -> Vec<CoverArt> {
        self.covers.clone()
    }

    fn set_covers(&mut self, covers: Vec<CoverArt>) {
        self.covers = covers;
    }

    fn remove_covers(&mut self) {
        self.covers.clear();
    }

    fn save(&mut self) -> Result<(), PipelineError> {
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_fields() {
        let mut store = MemoryStore::new(Scheme::Mp4);
        store.set("\u{a9}alb", TagValue::text("Album"));
        store.set("trkn", TagValue::Pairs(vec![(3, Some(12))]));

        assert!(store.contains("\u{a9}alb"));
        assert_eq!(store.get("trkn"), Some(TagValue::Pairs(vec![(3, Some(12))])));
        store.remove("\u{a9}alb");
        assert!(!store.contains("\u{a9}alb"));
    }

    #[test]
    fn empty_values_do_not_count_as_present() {
        let store = MemoryStore::new(Scheme::Mp4).with("\u{a9}nam", TagValue::text(""));
        assert!(!store.contains("\u{a9}nam"));
    }

    #[test]
    fn prune_drops_unknown_fields_and_covers() {
        let mut store = MemoryStore::new(Scheme::Mp4)
            .with("\u{a9}alb", TagValue::text("Album"))
            .with("junk", TagValue::text("x"));
        store.set_covers(vec![CoverArt {
            data: vec![1, 2, 3],
            mime: Some("image/jpeg".into()),
        }]);

        store.prune_except(&["\u{a9}alb"]);
        assert!(store.contains("\u{a9}alb"));
        assert!(!store.contains("junk"));
        assert!(store.covers().is_empty());
    }

    #[test]
    fn every_catalogue_ident_resolves_for_mp4() {
        for entry in crate::tags::CATALOGUE {
            assert!(
                lookup(Scheme::Mp4, entry.ident).is_some(),
                "no lookup for {}",
                entry.ident
            );
        }
    }

    #[test]
    fn every_mapping_source_resolves_for_its_scheme() {
        for entry in crate::tags::SchemeMap::id3().entries {
            assert!(
                lookup(Scheme::Id3, entry.source).is_some(),
                "no lookup for {}",
                entry.source
            );
        }
        for entry in crate::tags::SchemeMap::vorbis().entries {
            assert!(
                lookup(Scheme::Vorbis, entry.source).is_some(),
                "no lookup for {}",
                entry.source
            );
        }
    }
}
