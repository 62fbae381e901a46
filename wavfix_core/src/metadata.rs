use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime};

pub const DEFAULT_ARTIST: &str = "Unknown Artist";
pub const DEFAULT_GENRE: &str = "Children's Music";

/// Tags read from a source file, keyed by lower-case tag name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    tags: BTreeMap<String, String>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag. Keys are normalized to lower case; blank values are ignored.
    ///
    /// Text ends at the first NUL, as in RIFF `INFO` strings, and other
    /// control characters become spaces. Values are later passed on a
    /// command line, where a NUL cannot appear.
    pub fn insert<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, value: V) {
        let key = clean_text(key.as_ref()).to_lowercase();
        let value = clean_text(value.as_ref());
        if key.is_empty() || value.is_empty() {
            return;
        }
        self.tags.insert(key, value);
    }

    /// Insert a tag only when no value is present yet.
    pub fn insert_missing<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, value: V) {
        let normalized = clean_text(key.as_ref()).to_lowercase();
        if !self.tags.contains_key(&normalized) {
            self.insert(normalized, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }
}

fn clean_text(text: &str) -> String {
    let text = text.split('\0').next().unwrap_or_default();
    text.chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect::<String>()
        .trim()
        .to_owned()
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for MetadataRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = MetadataRecord::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

/// Fallback values applied when a tag is absent from the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataDefaults {
    pub artist: String,
    pub genre: String,
}

impl Default for MetadataDefaults {
    fn default() -> Self {
        Self {
            artist: DEFAULT_ARTIST.to_owned(),
            genre: DEFAULT_GENRE.to_owned(),
        }
    }
}

/// Fully resolved metadata for one file: every field has a value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub date: String,
    pub genre: String,
    pub track: String,
    pub composer: String,
    pub comment: String,
    pub encoded_by: String,
    pub cut_id: String,
    /// Timestamp captured once per file; used for origination fields.
    pub origination: NaiveDateTime,
}

impl TrackMetadata {
    pub fn resolve(
        record: &MetadataRecord,
        defaults: &MetadataDefaults,
        file_stem: &str,
        origination: NaiveDateTime,
    ) -> Self {
        let text = |keys: &[&str]| record.first_of(keys).unwrap_or_default().to_owned();

        Self {
            title: record.get("title").unwrap_or(file_stem).to_owned(),
            artist: record
                .get("artist")
                .unwrap_or(defaults.artist.as_str())
                .to_owned(),
            album: text(&["album"]),
            date: record
                .first_of(&["date", "date_created"])
                .map(str::to_owned)
                .unwrap_or_else(|| origination.year().to_string()),
            genre: record
                .get("genre")
                .unwrap_or(defaults.genre.as_str())
                .to_owned(),
            track: text(&["track", "tracknumber"]),
            composer: text(&["composer"]),
            comment: text(&["comment"]),
            encoded_by: text(&["encoded_by"]),
            cut_id: record
                .first_of(&["cut_id", "cutid"])
                .unwrap_or(file_stem)
                .to_owned(),
            origination,
        }
    }

    /// Tags handed to the transcoder for the `LIST`/`INFO` chunk, in a fixed order.
    /// Empty values are omitted.
    pub fn info_tags(&self) -> Vec<(&'static str, &str)> {
        [
            ("title", self.title.as_str()),
            ("artist", self.artist.as_str()),
            ("album", self.album.as_str()),
            ("date", self.date.as_str()),
            ("genre", self.genre.as_str()),
            ("track", self.track.as_str()),
            ("composer", self.composer.as_str()),
            ("comment", self.comment.as_str()),
            ("encoded_by", self.encoded_by.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .collect()
    }
}
