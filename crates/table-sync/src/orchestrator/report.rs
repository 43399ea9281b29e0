//! Sync plans and reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Row, RowKey};
use crate::diff::DiffResult;

/// What a sync would do, computed without writing.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// Key classification the plan was built from.
    pub diff: DiffResult,

    /// Keys to delete: obsolete and stale rows.
    pub delete_keys: Vec<RowKey>,

    /// Rows to insert: new and stale rows, sorted by key.
    pub insert_rows: Vec<Row>,
}

impl SyncPlan {
    /// Whether applying the plan would issue no statement.
    pub fn is_empty(&self) -> bool {
        self.delete_keys.is_empty() && self.insert_rows.is_empty()
    }

    /// Number of modified rows (deleted and reinserted under the same key).
    pub fn stale_count(&self) -> usize {
        self.diff.stale().count()
    }
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Table reconciled.
    pub table: String,

    /// Rows whose digest already matched.
    pub unchanged: usize,

    /// Rows removed because they no longer exist in the desired state.
    pub obsolete: usize,

    /// Rows whose content changed (deleted and reinserted).
    pub stale: usize,

    /// Rows added because they did not exist yet.
    pub new: usize,

    /// Rows the store reported deleted.
    pub rows_deleted: u64,

    /// Rows the store reported inserted.
    pub rows_inserted: u64,

    /// True when nothing was written.
    pub dry_run: bool,

    /// When the sync started.
    pub started_at: DateTime<Utc>,

    /// When the sync completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,
}

impl SyncReport {
    pub(crate) fn new(
        table: &str,
        plan: &SyncPlan,
        written: Option<(u64, u64)>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed_at = Utc::now();
        let (rows_deleted, rows_inserted) = written.unwrap_or_default();
        Self {
            table: table.to_string(),
            unchanged: plan.diff.unchanged.len(),
            obsolete: plan.diff.obsolete().count(),
            stale: plan.stale_count(),
            new: plan.diff.new_keys().count(),
            rows_deleted,
            rows_inserted,
            dry_run: written.is_none(),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
        }
    }

    /// Whether the table needed no change.
    pub fn was_in_sync(&self) -> bool {
        self.obsolete == 0 && self.stale == 0 && self.new == 0
    }
}
