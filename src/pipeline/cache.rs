//! Durable per-key item storage
//!
//! Each fetched item's parsed metadata lives in its own plain-text file, one
//! `key<TAB>value` pair per line, addressed by a filename derived from the
//! item key. Raw binary assets staged for upload live alongside. Everything
//! is human-inspectable and safe to hand-edit between runs.

use crate::pipeline::write_atomic;
use crate::{RelayError, Result};
use std::path::{Path, PathBuf};

/// A flat, insertion-ordered string map of item metadata
///
/// Field order is part of the record: downstream page builders iterate the
/// fields in the order the parser emitted them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing an existing value in place (the field keeps
    /// its original position)
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes to the stable on-disk text form
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(&escape(key));
            out.push('\t');
            out.push_str(&escape(value));
            out.push('\n');
        }
        out
    }

    /// Parses the on-disk text form
    pub fn from_text(text: &str) -> Result<Self> {
        let mut metadata = Metadata::new();
        for (number, line) in text.lines().enumerate() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('\t').ok_or_else(|| {
                RelayError::State(format!("metadata line {} has no field separator", number + 1))
            })?;
            metadata.insert(unescape(key), unescape(value));
        }
        Ok(metadata)
    }
}

impl FromIterator<(String, String)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (k, v) in iter {
            metadata.insert(k, v);
        }
        metadata
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Encodes a key into a reversible, filesystem-safe filename stem
///
/// Alphanumerics plus `.`, `_` and `-` pass through; every other byte
/// becomes `%XX`, so distinct keys never collide and `decode_key` can
/// recover the original.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn decode_key(stem: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(stem.len());
    let raw = stem.as_bytes();
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8(bytes).ok()
}

/// Durable per-key storage for fetched/parsed items
///
/// Metadata records live under `<root>/meta/`, raw assets under
/// `<root>/assets/`. The downloader is the only writer for a key's metadata
/// and the uploader the only writer for its asset, per the
/// single-writer-per-key discipline.
pub struct ItemCache {
    meta_dir: PathBuf,
    asset_dir: PathBuf,
}

impl ItemCache {
    /// Opens (creating if needed) a cache rooted at `root`
    pub fn new(root: &Path) -> Result<Self> {
        let meta_dir = root.join("meta");
        let asset_dir = root.join("assets");
        std::fs::create_dir_all(&meta_dir)?;
        std::fs::create_dir_all(&asset_dir)?;
        Ok(Self {
            meta_dir,
            asset_dir,
        })
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.meta_dir.join(format!("{}.meta", encode_key(key)))
    }

    /// Path where the raw asset for `key` is (or would be) staged
    pub fn asset_path(&self, key: &str) -> PathBuf {
        self.asset_dir.join(format!("{}.asset", encode_key(key)))
    }

    /// Whether metadata for `key` is cached
    pub fn has(&self, key: &str) -> bool {
        self.meta_path(key).exists()
    }

    /// Reads the metadata for `key`, if cached
    pub fn get(&self, key: &str) -> Result<Option<Metadata>> {
        match std::fs::read_to_string(self.meta_path(key)) {
            Ok(text) => Ok(Some(Metadata::from_text(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the metadata for `key` atomically
    pub fn put(&self, key: &str, metadata: &Metadata) -> Result<()> {
        write_atomic(&self.meta_path(key), &metadata.to_text())
    }

    /// Removes the metadata and any staged asset for `key`
    pub fn remove(&self, key: &str) -> Result<()> {
        for path in [self.meta_path(key), self.asset_path(key)] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Whether a raw asset for `key` is staged
    pub fn has_asset(&self, key: &str) -> bool {
        self.asset_path(key).exists()
    }

    /// Stages the raw asset bytes for `key`
    pub fn put_asset(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.asset_path(key);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Reads the staged asset for `key`, if present
    pub fn get_asset(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.asset_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All cached keys, sorted
    ///
    /// The sorted order is deterministic across restarts, which makes this a
    /// valid key source for the upload phase.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.meta_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".meta") {
                if let Some(key) = decode_key(stem) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Number of cached metadata records
    pub fn len(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> Metadata {
        let mut m = Metadata::new();
        m.insert("title", "Blue Heron at Dusk");
        m.insert("creator", "J. Audubon");
        m.insert("date", "1838");
        m
    }

    #[test]
    fn test_metadata_preserves_insertion_order() {
        let m = sample_metadata();
        let keys: Vec<&str> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["title", "creator", "date"]);
    }

    #[test]
    fn test_metadata_insert_replaces_in_place() {
        let mut m = sample_metadata();
        m.insert("creator", "John James Audubon");

        assert_eq!(m.len(), 3);
        assert_eq!(m.get("creator"), Some("John James Audubon"));
        let keys: Vec<&str> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["title", "creator", "date"]);
    }

    #[test]
    fn test_metadata_text_round_trip() {
        let mut m = sample_metadata();
        m.insert("notes", "line one\nline two\twith tab");

        let text = m.to_text();
        let parsed = Metadata::from_text(&text).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn test_metadata_rejects_malformed_line() {
        assert!(Metadata::from_text("no separator here").is_err());
    }

    #[test]
    fn test_metadata_skips_comments_and_blanks() {
        let text = "# hand-edited\n\ntitle\tSomething\n";
        let parsed = Metadata::from_text(text).unwrap();
        assert_eq!(parsed.get("title"), Some("Something"));
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_encode_key_reversible() {
        for key in ["plain", "with/slash", "spaces and ümlauts", "100%", "a\tb"] {
            let encoded = encode_key(key);
            assert!(!encoded.contains('/'));
            assert_eq!(decode_key(&encoded).as_deref(), Some(key));
        }
    }

    #[test]
    fn test_cache_put_get_has_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ItemCache::new(dir.path()).unwrap();
        let m = sample_metadata();

        assert!(!cache.has("item/1"));
        cache.put("item/1", &m).unwrap();
        assert!(cache.has("item/1"));
        assert_eq!(cache.get("item/1").unwrap(), Some(m));

        cache.remove("item/1").unwrap();
        assert!(!cache.has("item/1"));
        assert_eq!(cache.get("item/1").unwrap(), None);
    }

    #[test]
    fn test_cache_assets() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ItemCache::new(dir.path()).unwrap();

        assert!(!cache.has_asset("item/1"));
        cache.put_asset("item/1", b"binary bytes").unwrap();
        assert!(cache.has_asset("item/1"));
        assert_eq!(
            cache.get_asset("item/1").unwrap().as_deref(),
            Some(&b"binary bytes"[..])
        );

        // remove clears the asset too
        cache.put("item/1", &sample_metadata()).unwrap();
        cache.remove("item/1").unwrap();
        assert!(!cache.has_asset("item/1"));
    }

    #[test]
    fn test_cache_keys_sorted_and_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ItemCache::new(dir.path()).unwrap();

        cache.put("b/item", &sample_metadata()).unwrap();
        cache.put("a item", &sample_metadata()).unwrap();
        cache.put("c", &sample_metadata()).unwrap();

        assert_eq!(cache.keys().unwrap(), vec!["a item", "b/item", "c"]);
        assert_eq!(cache.len().unwrap(), 3);
    }

    #[test]
    fn test_cache_record_is_hand_editable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ItemCache::new(dir.path()).unwrap();
        cache.put("item", &sample_metadata()).unwrap();

        // Simulate an operator fixing a field in a text editor
        let path = dir.path().join("meta").join("item.meta");
        let edited = std::fs::read_to_string(&path)
            .unwrap()
            .replace("1838", "1839");
        std::fs::write(&path, edited).unwrap();

        assert_eq!(
            cache.get("item").unwrap().unwrap().get("date"),
            Some("1839")
        );
    }
}
