//! The bibliography index.
//!
//! Holds the records parsed from every tracked bibliography file, keyed by
//! the file's normalized path. Files keep the order they were first added in,
//! so listing and key lookup are deterministic.
//!
//! The index is constructed once per session and shared between the watch
//! service (the only writer) and the request handlers (readers) as a
//! [`SharedIndex`].

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexMap;
use itertools::Itertools;
use parking_lot::RwLock;

use crate::bib::CitationRecord;

pub type SharedIndex = Arc<RwLock<BibliographyIndex>>;

#[derive(Debug, Default)]
pub struct BibliographyIndex {
    files: IndexMap<PathBuf, Vec<CitationRecord>>,
}

impl BibliographyIndex {
    pub fn new() -> BibliographyIndex {
        BibliographyIndex::default()
    }

    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(BibliographyIndex::new()))
    }

    /// Replaces everything known about `path`.
    pub fn set_records(&mut self, path: &Path, records: Vec<CitationRecord>) {
        self.files.insert(path.to_path_buf(), records);
    }

    /// Forgets `path`. Returns whether it was present.
    pub fn evict(&mut self, path: &Path) -> bool {
        self.files.shift_remove(path).is_some()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    /// Number of tracked files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn records(&self, path: &Path) -> Option<&[CitationRecord]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Every record of every file, files in insertion order.
    pub fn all_records(&self) -> Vec<&CitationRecord> {
        self.files.values().flatten().collect()
    }

    /// Records paired with their file; all files when `path` is `None`.
    pub fn select_records(&self, path: Option<&Path>) -> Vec<(&Path, &CitationRecord)> {
        self.files
            .iter()
            .filter(|(file, _)| path.map_or(true, |path| file.as_path() == path))
            .flat_map(|(file, records)| records.iter().map(move |record| (file.as_path(), record)))
            .collect()
    }

    /// First record with `key`, searching files in insertion order.
    pub fn find_by_key(&self, key: &str) -> Option<(&Path, &CitationRecord)> {
        self.files.iter().find_map(|(file, records)| {
            records
                .iter()
                .find(|record| record.key == key)
                .map(|record| (file.as_path(), record))
        })
    }

    /// Keys appearing more than once across all files, sorted.
    pub fn duplicate_keys(&self) -> Vec<String> {
        self.files
            .values()
            .flatten()
            .map(|record| record.key.as_str())
            .counts()
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(key, _)| key.to_string())
            .sorted()
            .collect()
    }
}
