// Record model module
// In-memory representation of checksum file entries, keyed by path

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::algorithm::Algorithm;
use crate::codec::DigestEncoding;

/// Raw digest bytes tagged with the algorithm that produced them.
/// Equality is byte-exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestValue {
    pub algorithm: Algorithm,
    pub bytes: Vec<u8>,
}

impl DigestValue {
    pub fn new(algorithm: Algorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    /// Hex rendering for display and reports.
    pub fn to_hex(&self) -> String {
        DigestEncoding::Base16Lower.encode(&self.bytes)
    }
}

impl Serialize for DigestValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("DigestValue", 2)?;
        s.serialize_field("algorithm", self.algorithm.name())?;
        s.serialize_field("digest", &self.to_hex())?;
        s.end()
    }
}

/// Per-file outcome of a run. The three checked statuses (Good, Mismatch,
/// Inaccessible) are mutually exclusive and terminal for a file within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileStatus {
    /// Not yet processed in this run
    Unchecked,
    /// Hashed successfully, or hash matched the stored digest
    Good,
    /// Freshly computed digest differs from the stored digest
    Mismatch,
    /// File could not be opened or read
    Inaccessible,
    /// Listed in the checksum file but absent from the filesystem
    Missing,
}

impl FileStatus {
    pub fn name(&self) -> &'static str {
        match self {
            FileStatus::Unchecked => "unchecked",
            FileStatus::Good => "good",
            FileStatus::Mismatch => "hash mismatch",
            FileStatus::Inaccessible => "no access",
            FileStatus::Missing => "missing",
        }
    }
}

/// One checksum file entry: a storage-form path with one digest per algorithm
/// and optional last-known metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChecksumRecord {
    /// Relative or absolute path in storage form (forward slashes)
    pub path: String,
    /// Digests keyed by algorithm; extension without schema change
    pub digests: BTreeMap<Algorithm, DigestValue>,
    pub size: Option<u64>,
    pub status: FileStatus,
}

impl ChecksumRecord {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            digests: BTreeMap::new(),
            size: None,
            status: FileStatus::Unchecked,
        }
    }

    pub fn with_digest(mut self, digest: DigestValue) -> Self {
        self.digests.insert(digest.algorithm, digest);
        self
    }

    pub fn digest(&self, algorithm: Algorithm) -> Option<&DigestValue> {
        self.digests.get(&algorithm)
    }

    pub fn set_digest(&mut self, digest: DigestValue) {
        self.digests.insert(digest.algorithm, digest);
    }
}

/// Ordered, path-keyed collection of checksum records.
///
/// Insertion order is preserved for stable output formatting but carries no
/// lookup semantics. Re-inserting a path merges digests into the existing
/// record (a later digest supersedes an earlier one per algorithm) and keeps
/// the record's original position.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    entries: Vec<ChecksumRecord>,
    index: HashMap<String, usize>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&ChecksumRecord> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut ChecksumRecord> {
        match self.index.get(path) {
            Some(&i) => Some(&mut self.entries[i]),
            None => None,
        }
    }

    /// Insert a record, merging into any existing record for the same path.
    pub fn insert(&mut self, record: ChecksumRecord) {
        match self.index.get(&record.path) {
            Some(&i) => {
                let existing = &mut self.entries[i];
                for (_, digest) in record.digests {
                    existing.set_digest(digest);
                }
                if record.size.is_some() {
                    existing.size = record.size;
                }
                existing.status = record.status;
            }
            None => {
                self.index.insert(record.path.clone(), self.entries.len());
                self.entries.push(record);
            }
        }
    }

    /// Set one digest for a path, creating the record if needed.
    pub fn upsert_digest(&mut self, path: &str, digest: DigestValue) {
        match self.get_mut(path) {
            Some(record) => record.set_digest(digest),
            None => self.insert(ChecksumRecord::new(path).with_digest(digest)),
        }
    }

    /// Remove the record for a path, preserving the order of the rest.
    pub fn remove(&mut self, path: &str) -> Option<ChecksumRecord> {
        let i = self.index.remove(path)?;
        let record = self.entries.remove(i);
        for (_, slot) in self.index.iter_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(record)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChecksumRecord> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ChecksumRecord> {
        self.entries.iter_mut()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|r| r.path.as_str())
    }
}

impl FromIterator<ChecksumRecord> for RecordSet {
    fn from_iter<T: IntoIterator<Item = ChecksumRecord>>(iter: T) -> Self {
        let mut set = RecordSet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(algorithm: Algorithm, byte: u8) -> DigestValue {
        DigestValue::new(algorithm, vec![byte; algorithm.digest_size()])
    }

    #[test]
    fn later_record_supersedes_earlier() {
        let mut set = RecordSet::new();
        set.insert(ChecksumRecord::new("a.txt").with_digest(digest(Algorithm::Md5, 1)));
        set.insert(ChecksumRecord::new("b.txt").with_digest(digest(Algorithm::Md5, 2)));
        set.insert(ChecksumRecord::new("a.txt").with_digest(digest(Algorithm::Md5, 3)));

        assert_eq!(set.len(), 2);
        assert_eq!(
            set.get("a.txt").unwrap().digest(Algorithm::Md5).unwrap().bytes,
            vec![3u8; 16]
        );
        // superseding keeps the original position
        let order: Vec<_> = set.paths().collect();
        assert_eq!(order, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn reinsert_merges_digest_columns() {
        let mut set = RecordSet::new();
        set.insert(ChecksumRecord::new("a.txt").with_digest(digest(Algorithm::Md5, 1)));
        set.insert(ChecksumRecord::new("a.txt").with_digest(digest(Algorithm::Sha1, 2)));

        let record = set.get("a.txt").unwrap();
        assert_eq!(record.digests.len(), 2);
        assert!(record.digest(Algorithm::Md5).is_some());
        assert!(record.digest(Algorithm::Sha1).is_some());
    }

    #[test]
    fn remove_keeps_index_consistent() {
        let mut set = RecordSet::new();
        for name in ["a", "b", "c"] {
            set.insert(ChecksumRecord::new(name).with_digest(digest(Algorithm::Md5, 9)));
        }
        set.remove("b");
        assert_eq!(set.len(), 2);
        assert!(set.get("a").is_some());
        assert!(set.get("c").is_some());
        assert_eq!(set.get("c").unwrap().path, "c");
    }
}
