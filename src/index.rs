//! Sorted headword index
//!
//! Keys are normalized headwords in ascending byte order; each key carries the
//! ids of every entry that folds to it, in original entry order. Exact lookups
//! are a binary search and prefix lookups a contiguous range of keys.

use crate::normalize::Normalizer;
use crate::types::Entry;

/// Position of an entry in the dictionary's entry table
pub type EntryId = usize;

/// One index key and the entries filed under it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey {
    pub key: String,
    pub entries: Vec<EntryId>,
}

/// Immutable headword index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    keys: Vec<IndexKey>,
    normalizer: Normalizer,
}

impl Index {
    /// Build the index for `entries`.
    ///
    /// Headwords that fold to the empty string are not indexed.
    pub fn build(entries: &[Entry], normalizer: Normalizer) -> Self {
        let mut pairs: Vec<(String, EntryId)> = entries
            .iter()
            .enumerate()
            .map(|(id, entry)| (normalizer.normalize(&entry.headword), id))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        // Stable: homographs keep their entry order
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut keys: Vec<IndexKey> = Vec::new();
        for (key, id) in pairs {
            match keys.last_mut() {
                Some(last) if last.key == key => last.entries.push(id),
                _ => keys.push(IndexKey {
                    key,
                    entries: vec![id],
                }),
            }
        }

        Index { keys, normalizer }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Entries filed under exactly `key`
    pub fn exact(&self, key: &str) -> Option<&[EntryId]> {
        self.keys
            .binary_search_by(|k| k.key.as_str().cmp(key))
            .ok()
            .map(|i| self.keys[i].entries.as_slice())
    }

    /// All keys starting with `prefix`, in sorted order
    pub fn prefix(&self, prefix: &str) -> &[IndexKey] {
        let start = self.keys.partition_point(|k| k.key.as_str() < prefix);
        let len = self.keys[start..]
            .iter()
            .take_while(|k| k.key.starts_with(prefix))
            .count();
        &self.keys[start..start + len]
    }

    pub fn keys(&self) -> &[IndexKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Check that every id points into a table of `entry_count` entries and
    /// that keys are strictly ascending
    pub fn verify(&self, entry_count: usize) -> Result<(), String> {
        for pair in self.keys.windows(2) {
            if pair[0].key >= pair[1].key {
                return Err(format!("keys out of order: {:?} >= {:?}", pair[0].key, pair[1].key));
            }
        }
        match self
            .keys
            .iter()
            .flat_map(|k| k.entries.iter())
            .find(|id| **id >= entry_count)
        {
            Some(id) => Err(format!("entry id {} outside table of {}", id, entry_count)),
            None => Ok(()),
        }
    }
}
