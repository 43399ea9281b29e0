//! Sync orchestrator: diff, then delete before insert.
//!
//! Reconciliation is always delete-then-insert, never in-place update, and
//! never wrapped in a transaction. When an insert chunk fails after deletes
//! have been applied, the affected rows are missing until the sync is run
//! again. Re-running reconverges because the diff is recomputed from the
//! live table every time.

mod report;

pub use report::{SyncPlan, SyncReport};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::core::{Connection, Row, RowKey, SqlValue, TableSchema};
use crate::diff::{DiffResult, TableDiffEngine};
use crate::error::{Result, SyncError};
use crate::fetch::KeyedFetcher;
use crate::hash::HashIndex;
use crate::writer::BatchWriter;

/// Rows affected by one [`SyncOrchestrator::replace`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceOutcome {
    /// Rows the store reported deleted.
    pub deleted: u64,
    /// Rows the store reported inserted.
    pub inserted: u64,
}

/// Composes fetcher, diff engine and writer for one table.
///
/// Not safe for concurrent writes to the same table: callers must ensure a
/// single writer per table at a time.
pub struct SyncOrchestrator {
    schema: Arc<TableSchema>,
    fetcher: KeyedFetcher,
    writer: BatchWriter,
    engine: TableDiffEngine,
}

impl SyncOrchestrator {
    /// Create an orchestrator. Fails with `NoPrimaryKey` when the table has
    /// no primary key.
    pub fn new(conn: Arc<dyn Connection>, schema: Arc<TableSchema>, config: SyncConfig) -> Result<Self> {
        schema.require_pk()?;
        let fetcher = KeyedFetcher::new(conn.clone(), schema.clone(), config);
        let writer = BatchWriter::new(conn, schema.clone(), config.chunk_size);
        let engine = TableDiffEngine::new(fetcher.clone())?;
        Ok(Self {
            schema,
            fetcher,
            writer,
            engine,
        })
    }

    /// Fetcher reading the live table.
    pub fn fetcher(&self) -> &KeyedFetcher {
        &self.fetcher
    }

    /// Delete rows by key, then insert full rows.
    ///
    /// The keys of `rows` are deleted along with `keys`, so replaying the same
    /// call yields the same table and never trips over a duplicate key. Every
    /// delete chunk completes before the first insert chunk starts. Row shapes
    /// are checked before anything is deleted.
    pub async fn replace(&self, keys: &[RowKey], rows: &[Row]) -> Result<ReplaceOutcome> {
        let pk = self.schema.require_pk()?;
        self.writer.validate_rows(rows)?;
        let mut delete: BTreeSet<RowKey> = keys.iter().cloned().collect();
        for row in rows {
            delete.insert(RowKey::from_row(row, pk)?);
        }
        let delete: Vec<RowKey> = delete.into_iter().collect();

        let deleted = self.writer.delete_by_keys(&delete).await?;
        match self.writer.insert_rows(rows).await {
            Ok(inserted) => Ok(ReplaceOutcome { deleted, inserted }),
            Err(e) => {
                if deleted > 0 {
                    warn!(
                        "{}: {} rows deleted but replacement insert failed; re-run sync to restore them",
                        self.schema.name, deleted
                    );
                }
                Err(e)
            }
        }
    }

    /// Plan a sync towards desired rows held in memory.
    pub async fn plan_rows(&self, rows: &[Row]) -> Result<SyncPlan> {
        let (live, diff) = self.engine.diff_rows(rows).await?;

        let pk = self.schema.require_pk()?;
        let columns: Arc<[String]> = self.schema.column_names().into();
        let mut by_key = HashMap::with_capacity(diff.to_insert.len());
        for row in rows {
            let key = RowKey::from_row(row, pk)?;
            if diff.to_insert.contains(&key) {
                by_key.insert(key, row);
            }
        }

        let mut insert_rows = Vec::with_capacity(diff.to_insert.len());
        for key in &diff.to_insert {
            let row = by_key.get(key).ok_or_else(|| {
                SyncError::schema_mismatch(format!("no desired row for key {}", key))
            })?;
            insert_rows.push(in_schema_order(row, &columns)?);
        }

        Ok(build_plan(diff, &live, insert_rows))
    }

    /// Plan a sync towards the contents of another table.
    pub async fn plan_from_table(&self, source: &KeyedFetcher) -> Result<SyncPlan> {
        let (live, diff) = self.engine.diff_table(source).await?;

        let keys: Vec<RowKey> = diff.to_insert.iter().cloned().collect();
        let mut rows = source.fetch_by_keys(&keys).await?;
        if rows.len() != keys.len() {
            warn!(
                "{}: expected {} rows from {}, fetched {}; source changed during sync",
                self.schema.name,
                keys.len(),
                source.schema().name,
                rows.len()
            );
        }

        let pk = self.schema.require_pk()?;
        rows.sort_by_cached_key(|row| RowKey::from_row(row, pk).ok());
        Ok(build_plan(diff, &live, rows))
    }

    /// Apply a plan: delete before insert.
    pub async fn apply(&self, plan: &SyncPlan) -> Result<ReplaceOutcome> {
        if plan.is_empty() {
            info!("{}: already in sync", self.schema.name);
            return Ok(ReplaceOutcome::default());
        }
        let outcome = self.replace(&plan.delete_keys, &plan.insert_rows).await?;
        info!(
            "{}: deleted {} rows, inserted {} rows",
            self.schema.name, outcome.deleted, outcome.inserted
        );
        Ok(outcome)
    }

    /// Reconcile the table with desired rows held in memory.
    pub async fn sync_rows(&self, rows: &[Row]) -> Result<SyncReport> {
        let started_at = Utc::now();
        let plan = self.plan_rows(rows).await?;
        let outcome = self.apply(&plan).await?;
        Ok(SyncReport::new(
            &self.schema.name,
            &plan,
            Some((outcome.deleted, outcome.inserted)),
            started_at,
        ))
    }

    /// Reconcile the table with the contents of another table.
    pub async fn sync_from_table(&self, source: &KeyedFetcher) -> Result<SyncReport> {
        let started_at = Utc::now();
        let plan = self.plan_from_table(source).await?;
        let outcome = self.apply(&plan).await?;
        Ok(SyncReport::new(
            &self.schema.name,
            &plan,
            Some((outcome.deleted, outcome.inserted)),
            started_at,
        ))
    }

    /// Report what [`sync_rows`](Self::sync_rows) would do, without writing.
    pub async fn dry_run_rows(&self, rows: &[Row]) -> Result<SyncReport> {
        let started_at = Utc::now();
        let plan = self.plan_rows(rows).await?;
        Ok(SyncReport::new(&self.schema.name, &plan, None, started_at))
    }

    /// Report what [`sync_from_table`](Self::sync_from_table) would do,
    /// without writing.
    pub async fn dry_run_from_table(&self, source: &KeyedFetcher) -> Result<SyncReport> {
        let started_at = Utc::now();
        let plan = self.plan_from_table(source).await?;
        Ok(SyncReport::new(&self.schema.name, &plan, None, started_at))
    }
}

/// Deletes cover every key whose digest disappears, plus inserted keys that
/// are still live under an old digest.
fn build_plan(diff: DiffResult, live: &HashIndex, insert_rows: Vec<Row>) -> SyncPlan {
    let live_keys = live.key_set();
    let delete_keys: BTreeSet<RowKey> = diff
        .to_delete
        .iter()
        .chain(diff.to_insert.iter().filter(|k| live_keys.contains(k)))
        .cloned()
        .collect();
    SyncPlan {
        delete_keys: delete_keys.into_iter().collect(),
        insert_rows,
        diff,
    }
}

/// Reorder a row already checked against the schema into declaration order.
fn in_schema_order(row: &Row, columns: &Arc<[String]>) -> Result<Row> {
    let values = columns
        .iter()
        .map(|c| row.get(c).cloned().unwrap_or(SqlValue::Null))
        .collect();
    Row::new(columns.clone(), values)
}
