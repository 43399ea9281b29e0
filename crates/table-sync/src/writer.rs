//! Chunked deletes by key set and chunked multi-row inserts.
//!
//! No transaction wraps a batch. A failed chunk aborts the remaining chunks
//! and surfaces the error; chunks already applied stay applied.

use std::sync::Arc;

use tracing::debug;

use crate::core::{Connection, KeyFilter, Row, RowKey, Statement, TableSchema};
use crate::error::{Result, SyncError};

/// Writes to one table in bounded chunks.
#[derive(Clone)]
pub struct BatchWriter {
    conn: Arc<dyn Connection>,
    schema: Arc<TableSchema>,
    chunk_size: usize,
}

impl BatchWriter {
    /// Create a writer for `schema` using `conn`.
    pub fn new(conn: Arc<dyn Connection>, schema: Arc<TableSchema>, chunk_size: usize) -> Self {
        Self {
            conn,
            schema,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Maximum keys or rows per statement.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Delete every row whose primary key is in `keys`.
    ///
    /// One DELETE per chunk of at most `chunk_size` keys; no statement for
    /// empty input. Returns the number of rows the store reported deleted.
    pub async fn delete_by_keys(&self, keys: &[RowKey]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let pk = self.schema.require_pk()?;
        if let Some(bad) = keys.iter().find(|k| k.len() != pk.len()) {
            return Err(SyncError::schema_mismatch(format!(
                "key {} has {} values, primary key of {} has {}",
                bad,
                bad.len(),
                self.schema.name,
                pk.len()
            )));
        }

        let mut deleted = 0;
        for (i, chunk) in keys.chunks(self.chunk_size).enumerate() {
            let statement = Statement::Delete {
                table: self.schema.name.clone(),
                filter: KeyFilter::new(pk.to_vec(), chunk.to_vec()),
            };
            let result = self.conn.execute(&statement).await?;
            deleted += result.affected_rows;
            debug!(
                "{}: delete chunk {} removed {} of {} keys",
                self.schema.name,
                i + 1,
                result.affected_rows,
                chunk.len()
            );
        }
        Ok(deleted)
    }

    /// Check that `rows` can be inserted as one batch.
    ///
    /// The first row's columns are authoritative and must match the table
    /// schema exactly; every other row must carry the same columns in the same
    /// order. Empty input is valid.
    pub fn validate_rows(&self, rows: &[Row]) -> Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        first.check_against(&self.schema)?;
        if let Some((i, _)) = rows.iter().enumerate().find(|(_, r)| !r.same_shape(first)) {
            return Err(SyncError::schema_mismatch(format!(
                "row {} of insert into {} has columns ({}), expected ({})",
                i,
                self.schema.name,
                rows[i].columns().join(", "),
                first.columns().join(", ")
            )));
        }
        Ok(())
    }

    /// Insert `rows`, one multi-row INSERT per chunk of at most `chunk_size`.
    ///
    /// Shape errors from [`validate_rows`](Self::validate_rows) are reported
    /// before any statement is issued.
    pub async fn insert_rows(&self, rows: &[Row]) -> Result<u64> {
        self.validate_rows(rows)?;
        let Some(first) = rows.first() else {
            return Ok(0);
        };

        let columns = first.columns().to_vec();
        let mut inserted = 0;
        for (i, chunk) in rows.chunks(self.chunk_size).enumerate() {
            let statement = Statement::Insert {
                table: self.schema.name.clone(),
                columns: columns.clone(),
                rows: chunk.iter().map(|r| r.values().to_vec()).collect(),
            };
            let result = self.conn.execute(&statement).await?;
            inserted += result.affected_rows;
            debug!(
                "{}: insert chunk {} wrote {} rows",
                self.schema.name,
                i + 1,
                chunk.len()
            );
        }
        Ok(inserted)
    }
}
