//! Classification of rows by comparing live and desired hash indexes.
//!
//! A changed row keeps its key but gets a new digest, so it shows up once in
//! `to_delete` (old digest) and once in `to_insert` (new digest). Such keys
//! are called stale. Reconciliation never updates in place: stale rows are
//! deleted and reinserted.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::core::{Row, RowKey, TableSchema};
use crate::error::{Result, SyncError};
use crate::fetch::KeyedFetcher;
use crate::hash::{HashIndex, RowHasher};

/// Keys classified by a diff. Each set is sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    /// Keys whose digest is present on both sides.
    pub unchanged: BTreeSet<RowKey>,
    /// Live keys whose digest is absent from the desired state.
    pub to_delete: BTreeSet<RowKey>,
    /// Desired keys whose digest is absent from the live state.
    pub to_insert: BTreeSet<RowKey>,
}

impl DiffResult {
    /// Keys present in both `to_delete` and `to_insert`: modified rows.
    pub fn stale(&self) -> impl Iterator<Item = &RowKey> {
        self.to_delete.intersection(&self.to_insert)
    }

    /// Keys to delete that have no desired replacement.
    pub fn obsolete(&self) -> impl Iterator<Item = &RowKey> {
        self.to_delete.difference(&self.to_insert)
    }

    /// Keys to insert that are not live yet.
    pub fn new_keys(&self) -> impl Iterator<Item = &RowKey> {
        self.to_insert.difference(&self.to_delete)
    }

    /// Whether the live state already matches the desired state.
    pub fn is_in_sync(&self) -> bool {
        self.to_delete.is_empty() && self.to_insert.is_empty()
    }
}

/// Builds hash indexes for one table and diffs them.
#[derive(Clone)]
pub struct TableDiffEngine {
    fetcher: KeyedFetcher,
    hasher: RowHasher,
}

impl TableDiffEngine {
    /// Create an engine over the table `fetcher` reads.
    pub fn new(fetcher: KeyedFetcher) -> Result<Self> {
        fetcher.schema().require_pk()?;
        let hasher = fetcher.hasher()?;
        Ok(Self { fetcher, hasher })
    }

    /// Schema of the live table.
    pub fn schema(&self) -> &TableSchema {
        self.fetcher.schema()
    }

    /// Digest index of the live table.
    pub async fn live_index(&self) -> Result<HashIndex> {
        self.fetcher.fetch_full_hash_index().await
    }

    /// Digest index of desired rows given in memory.
    ///
    /// Every row must match the table schema exactly, and no two rows may
    /// share a primary key.
    pub fn index_rows(&self, rows: &[Row]) -> Result<HashIndex> {
        let schema = self.fetcher.schema();
        let pk = schema.require_pk()?;
        let mut seen = HashSet::with_capacity(rows.len());
        let mut index = HashIndex::with_capacity(rows.len());
        for row in rows {
            row.check_against(schema)?;
            let key = RowKey::from_row(row, pk)?;
            if !seen.insert(key.clone()) {
                return Err(SyncError::schema_mismatch(format!(
                    "desired rows for {} contain primary key {} more than once",
                    schema.name, key
                )));
            }
            index.insert(self.hasher.hash_row(row)?, key);
        }
        Ok(index)
    }

    /// Classify keys by digest set differences.
    ///
    /// `to_insert` takes its keys from `desired`, `to_delete` and `unchanged`
    /// from `live`.
    pub fn diff(live: &HashIndex, desired: &HashIndex) -> DiffResult {
        let mut result = DiffResult::default();
        for (hash, key) in live {
            if desired.contains(hash) {
                result.unchanged.insert(key.clone());
            } else {
                result.to_delete.insert(key.clone());
            }
        }
        for (hash, key) in desired {
            if !live.contains(hash) {
                result.to_insert.insert(key.clone());
            }
        }
        debug!(
            "diff: {} unchanged, {} to delete, {} to insert",
            result.unchanged.len(),
            result.to_delete.len(),
            result.to_insert.len()
        );
        result
    }

    /// Diff the live table against desired rows.
    pub async fn diff_rows(&self, rows: &[Row]) -> Result<(HashIndex, DiffResult)> {
        let desired = self.index_rows(rows)?;
        let live = self.live_index().await?;
        let diff = Self::diff(&live, &desired);
        info!(
            "{}: {} unchanged, {} to delete, {} to insert",
            self.schema().name,
            diff.unchanged.len(),
            diff.to_delete.len(),
            diff.to_insert.len()
        );
        Ok((live, diff))
    }

    /// Diff the live table against another table holding the desired state.
    ///
    /// Both tables must have the same columns in the same order and the same
    /// primary key, otherwise every digest would differ.
    pub async fn diff_table(&self, source: &KeyedFetcher) -> Result<(HashIndex, DiffResult)> {
        check_compatible(source.schema(), self.schema())?;
        let desired = source.fetch_full_hash_index().await?;
        let live = self.live_index().await?;
        let diff = Self::diff(&live, &desired);
        info!(
            "{} <- {}: {} unchanged, {} to delete, {} to insert",
            self.schema().name,
            source.schema().name,
            diff.unchanged.len(),
            diff.to_delete.len(),
            diff.to_insert.len()
        );
        Ok((live, diff))
    }
}

/// Check that rows of `source` hash comparably to rows of `target`.
pub fn check_compatible(source: &TableSchema, target: &TableSchema) -> Result<()> {
    if source.column_names() != target.column_names() {
        return Err(SyncError::schema_mismatch(format!(
            "columns of {} ({}) differ from {} ({})",
            source.name,
            source.column_names().join(", "),
            target.name,
            target.column_names().join(", ")
        )));
    }
    if source.primary_key != target.primary_key {
        return Err(SyncError::schema_mismatch(format!(
            "primary key of {} ({}) differs from {} ({})",
            source.name,
            source.primary_key.join(", "),
            target.name,
            target.primary_key.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::RowHash;

    fn index(entries: &[(&str, i64)]) -> HashIndex {
        entries
            .iter()
            .map(|(content, key)| (RowHash::digest(content.as_bytes()), RowKey::from(*key)))
            .collect()
    }

    fn keys(ids: &[i64]) -> BTreeSet<RowKey> {
        ids.iter().map(|&id| RowKey::from(id)).collect()
    }

    #[test]
    fn test_scenario_delete_one_insert_one() {
        let live = index(&[("1#a", 1), ("2#b", 2)]);
        let desired = index(&[("2#b", 2), ("3#c", 3)]);
        let diff = TableDiffEngine::diff(&live, &desired);
        assert_eq!(diff.unchanged, keys(&[2]));
        assert_eq!(diff.to_delete, keys(&[1]));
        assert_eq!(diff.to_insert, keys(&[3]));
        assert_eq!(diff.stale().count(), 0);
    }

    #[test]
    fn test_changed_row_is_stale() {
        let live = index(&[("1#a", 1), ("2#b", 2)]);
        let desired = index(&[("1#a", 1), ("2#B", 2)]);
        let diff = TableDiffEngine::diff(&live, &desired);
        assert_eq!(diff.to_delete, keys(&[2]));
        assert_eq!(diff.to_insert, keys(&[2]));
        assert_eq!(diff.stale().cloned().collect::<Vec<_>>(), vec![RowKey::from(2)]);
        assert_eq!(diff.obsolete().count(), 0);
        assert_eq!(diff.new_keys().count(), 0);
    }

    #[test]
    fn test_identical_indexes_are_in_sync() {
        let live = index(&[("1#a", 1)]);
        let diff = TableDiffEngine::diff(&live, &live.clone());
        assert!(diff.is_in_sync());
        assert_eq!(diff.unchanged, keys(&[1]));
    }

    #[test]
    fn test_empty_sides() {
        let live = index(&[("1#a", 1)]);
        let empty = HashIndex::new();
        assert_eq!(TableDiffEngine::diff(&live, &empty).to_delete, keys(&[1]));
        assert_eq!(TableDiffEngine::diff(&empty, &live).to_insert, keys(&[1]));
    }

    #[test]
    fn test_check_compatible() {
        use crate::core::Column;
        let a = TableSchema::new("a", vec![Column::new("id", "int")], vec!["id".into()]).unwrap();
        let b = TableSchema::new(
            "b",
            vec![Column::new("id", "int"), Column::new("x", "int")],
            vec!["id".into()],
        )
        .unwrap();
        assert!(check_compatible(&a, &a).is_ok());
        assert!(matches!(check_compatible(&a, &b), Err(SyncError::SchemaMismatch(_))));
    }
}
