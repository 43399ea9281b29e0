//! Hash to key snapshot of a table.

use std::collections::{hash_map, HashMap, HashSet};

use crate::core::{Row, RowKey};
use crate::error::Result;

use super::{RowHash, RowHasher, TableHash};

/// Mapping from row digest to primary key for one table snapshot.
///
/// Inserting a digest that is already present replaces the previous key. Two
/// distinct rows whose digests collide therefore leave a single entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashIndex {
    entries: HashMap<RowHash, RowKey>,
}

impl HashIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index with room for `capacity` rows.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Hash `rows` and index them by digest.
    pub fn from_rows<'a, I>(hasher: &RowHasher, key_columns: &[String], rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Row>,
    {
        let mut index = Self::new();
        for row in rows {
            let key = RowKey::from_row(row, key_columns)?;
            index.insert(hasher.hash_row(row)?, key);
        }
        Ok(index)
    }

    /// Insert a digest/key pair, returning the key it replaced.
    pub fn insert(&mut self, hash: RowHash, key: RowKey) -> Option<RowKey> {
        self.entries.insert(hash, key)
    }

    /// Key stored for `hash`.
    pub fn get(&self, hash: &RowHash) -> Option<&RowKey> {
        self.entries.get(hash)
    }

    /// Check if `hash` is indexed.
    pub fn contains(&self, hash: &RowHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Number of digests indexed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over digest/key pairs in arbitrary order.
    pub fn iter(&self) -> hash_map::Iter<'_, RowHash, RowKey> {
        self.entries.iter()
    }

    /// Iterate over digests in arbitrary order.
    pub fn hashes(&self) -> hash_map::Keys<'_, RowHash, RowKey> {
        self.entries.keys()
    }

    /// Set of every key in the index.
    pub fn key_set(&self) -> HashSet<&RowKey> {
        self.entries.values().collect()
    }

    /// Aggregate digest of the snapshot.
    pub fn table_hash(&self) -> TableHash {
        TableHash::aggregate(self.entries.keys().copied())
    }
}

impl FromIterator<(RowHash, RowKey)> for HashIndex {
    fn from_iter<I: IntoIterator<Item = (RowHash, RowKey)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<(RowHash, RowKey)> for HashIndex {
    fn extend<I: IntoIterator<Item = (RowHash, RowKey)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl IntoIterator for HashIndex {
    type Item = (RowHash, RowKey);
    type IntoIter = hash_map::IntoIter<RowHash, RowKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a HashIndex {
    type Item = (&'a RowHash, &'a RowKey);
    type IntoIter = hash_map::Iter<'a, RowHash, RowKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;

    #[test]
    fn test_collision_keeps_last_key() {
        let mut index = HashIndex::new();
        let hash = RowHash::digest(b"same");
        assert!(index.insert(hash, RowKey::from(1)).is_none());
        assert_eq!(index.insert(hash, RowKey::from(2)), Some(RowKey::from(1)));
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&hash), Some(&RowKey::from(2)));
    }

    #[test]
    fn test_from_rows() {
        let hasher = RowHasher::new(vec!["id".into(), "name".into()], '#').unwrap();
        let rows = vec![
            Row::from_pairs([("id", SqlValue::Int(1)), ("name", "a".into())]),
            Row::from_pairs([("id", SqlValue::Int(2)), ("name", "b".into())]),
        ];
        let index = HashIndex::from_rows(&hasher, &["id".to_string()], &rows).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&RowHash::digest(b"2#b")), Some(&RowKey::from(2)));
        assert!(index.key_set().contains(&RowKey::from(1)));
    }

    #[test]
    fn test_table_hash_ignores_insertion_order() {
        let a: HashIndex = [(RowHash::digest(b"1"), RowKey::from(1)), (RowHash::digest(b"2"), RowKey::from(2))]
            .into_iter()
            .collect();
        let b: HashIndex = [(RowHash::digest(b"2"), RowKey::from(2)), (RowHash::digest(b"1"), RowKey::from(1))]
            .into_iter()
            .collect();
        assert_eq!(a.table_hash(), b.table_hash());
    }
}
