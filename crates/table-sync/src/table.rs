//! Handle on one table: cached schema plus every table-level operation.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{validate_sync, SyncConfig};
use crate::core::identifier::check_name;
use crate::core::{Connection, ConnectionFactory, Row, RowKey, TableSchema};
use crate::diff::{DiffResult, TableDiffEngine};
use crate::error::Result;
use crate::fetch::KeyedFetcher;
use crate::hash::{HashIndex, TableHash};
use crate::orchestrator::{ReplaceOutcome, SyncOrchestrator, SyncPlan, SyncReport};
use crate::writer::BatchWriter;

/// One table on one connection.
///
/// The schema is discovered when the handle is opened and cached for its
/// lifetime. After DDL on the table, drop the handle and open a new one.
/// Write operations assume a single writer per table.
pub struct TableConnection {
    conn: Arc<dyn Connection>,
    schema: Arc<TableSchema>,
    config: SyncConfig,
}

impl TableConnection {
    /// Connect through `factory` and load the schema of `table`.
    pub async fn open(factory: &dyn ConnectionFactory, table: &str, config: SyncConfig) -> Result<Self> {
        let conn = factory.connect().await?;
        let handle = Self::with_connection(conn, table, config).await?;
        info!(
            "Opened {} on {} ({} columns)",
            table,
            factory.describe(),
            handle.schema.len()
        );
        Ok(handle)
    }

    /// Load the schema of `table` over an existing connection.
    pub async fn with_connection(
        conn: Arc<dyn Connection>,
        table: &str,
        config: SyncConfig,
    ) -> Result<Self> {
        check_name(table)?;
        validate_sync(&config)?;

        let columns = conn.columns(table).await?;
        let primary_key = conn.primary_key(table).await?;
        let schema = TableSchema::new(table, columns, primary_key)?;
        if !schema.has_pk() {
            warn!(
                "Table {} has no primary key; only full reads, inserts, row counts and table hashes are available",
                table
            );
        }

        Ok(Self {
            conn,
            schema: Arc::new(schema),
            config,
        })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Cached schema.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Whether key-based operations are available.
    pub fn has_primary_key(&self) -> bool {
        self.schema.has_pk()
    }

    /// Sync settings in effect.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Underlying connection.
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// Chunked reader for this table.
    pub fn fetcher(&self) -> KeyedFetcher {
        KeyedFetcher::new(self.conn.clone(), self.schema.clone(), self.config)
    }

    /// Chunked writer for this table.
    pub fn writer(&self) -> BatchWriter {
        BatchWriter::new(self.conn.clone(), self.schema.clone(), self.config.chunk_size)
    }

    /// Diff engine for this table. Requires a primary key.
    pub fn diff_engine(&self) -> Result<TableDiffEngine> {
        TableDiffEngine::new(self.fetcher())
    }

    /// Orchestrator for this table. Requires a primary key.
    pub fn orchestrator(&self) -> Result<SyncOrchestrator> {
        SyncOrchestrator::new(self.conn.clone(), self.schema.clone(), self.config)
    }

    /// Every row. Holds the whole table in memory.
    pub async fn fetch_all_rows(&self) -> Result<Vec<Row>> {
        self.fetcher().fetch_all_rows().await
    }

    /// One LIMIT/OFFSET page.
    pub async fn fetch_range(&self, offset: u64, limit: u64) -> Result<Vec<Row>> {
        self.fetcher().fetch_range(offset, limit).await
    }

    /// Every primary key, in key order.
    pub async fn fetch_primary_key_values(&self) -> Result<Vec<RowKey>> {
        self.fetcher().fetch_primary_key_values().await
    }

    /// Rows for a key set, chunked.
    pub async fn fetch_by_keys(&self, keys: &[RowKey]) -> Result<Vec<Row>> {
        self.fetcher().fetch_by_keys(keys).await
    }

    /// Row digests for a key set, chunked.
    pub async fn fetch_row_hashes(&self, keys: &[RowKey]) -> Result<HashIndex> {
        self.fetcher().fetch_row_hashes(keys).await
    }

    /// Digest-to-key map over the whole table.
    pub async fn fetch_full_hash_index(&self) -> Result<HashIndex> {
        self.fetcher().fetch_full_hash_index().await
    }

    /// Aggregate digest of the whole table.
    pub async fn fetch_table_hash(&self) -> Result<TableHash> {
        self.fetcher().fetch_table_hash().await
    }

    /// Number of rows.
    pub async fn row_count(&self) -> Result<u64> {
        self.fetcher().row_count().await
    }

    /// Chunked delete by key set.
    pub async fn delete_by_keys(&self, keys: &[RowKey]) -> Result<u64> {
        self.writer().delete_by_keys(keys).await
    }

    /// Chunked multi-row insert.
    pub async fn insert_rows(&self, rows: &[Row]) -> Result<u64> {
        self.writer().insert_rows(rows).await
    }

    /// Delete `keys`, then insert `rows`.
    pub async fn replace(&self, keys: &[RowKey], rows: &[Row]) -> Result<ReplaceOutcome> {
        self.orchestrator()?.replace(keys, rows).await
    }

    /// Diff this table against another table.
    pub async fn diff_against(&self, source: &TableConnection) -> Result<DiffResult> {
        let (_, diff) = self.diff_engine()?.diff_table(&source.fetcher()).await?;
        Ok(diff)
    }

    /// Plan a sync from desired rows without writing.
    pub async fn plan_rows(&self, rows: &[Row]) -> Result<SyncPlan> {
        self.orchestrator()?.plan_rows(rows).await
    }

    /// Plan a sync from another table without writing.
    pub async fn plan_from_table(&self, source: &TableConnection) -> Result<SyncPlan> {
        self.orchestrator()?.plan_from_table(&source.fetcher()).await
    }

    /// Make this table hold exactly `rows`.
    pub async fn sync_rows(&self, rows: &[Row]) -> Result<SyncReport> {
        self.orchestrator()?.sync_rows(rows).await
    }

    /// Report what [`sync_rows`](Self::sync_rows) would do.
    pub async fn dry_run_rows(&self, rows: &[Row]) -> Result<SyncReport> {
        self.orchestrator()?.dry_run_rows(rows).await
    }

    /// Make this table hold exactly the rows of `source`.
    pub async fn sync_from_table(&self, source: &TableConnection) -> Result<SyncReport> {
        self.orchestrator()?.sync_from_table(&source.fetcher()).await
    }

    /// Report what [`sync_from_table`](Self::sync_from_table) would do.
    pub async fn dry_run_from_table(&self, source: &TableConnection) -> Result<SyncReport> {
        self.orchestrator()?.dry_run_from_table(&source.fetcher()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, SqlValue};
    use crate::drivers::MemoryDatabase;
    use crate::error::SyncError;
    use crate::hash::HashLocation;

    async fn database() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.create_table(
            TableSchema::new(
                "events",
                vec![Column::new("id", "bigint").not_null(), Column::new("kind", "varchar")],
                vec!["id".into()],
            )
            .unwrap(),
        )
        .await;
        db.create_table(TableSchema::new("audit", vec![Column::new("line", "text")], vec![]).unwrap())
            .await;
        db
    }

    #[tokio::test]
    async fn test_open_caches_schema() {
        let db = database().await;
        let table = TableConnection::open(&db, "events", SyncConfig::default()).await.unwrap();
        assert_eq!(table.name(), "events");
        assert!(table.has_primary_key());
        assert_eq!(table.schema().column_names(), vec!["id", "kind"]);
    }

    #[tokio::test]
    async fn test_open_missing_table() {
        let db = database().await;
        let err = TableConnection::open(&db, "nope", SyncConfig::default()).await;
        assert!(matches!(err, Err(SyncError::SchemaMismatch(_))));
    }

    #[tokio::test]
    async fn test_open_rejects_bad_config() {
        let db = database().await;
        let config = SyncConfig::default().with_chunk_size(0);
        assert!(matches!(
            TableConnection::open(&db, "events", config).await,
            Err(SyncError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_dry_run_rows_leaves_table_alone() {
        let db = database().await;
        let table = TableConnection::open(&db, "events", SyncConfig::default()).await.unwrap();
        let rows = vec![Row::from_pairs([("id", SqlValue::Int(1)), ("kind", SqlValue::from("boot"))])];

        let report = table.dry_run_rows(&rows).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.new, 1);
        assert_eq!(table.row_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_table_without_primary_key() {
        let db = database().await;
        let table = TableConnection::open(&db, "audit", SyncConfig::default()).await.unwrap();
        assert!(!table.has_primary_key());

        let rows = vec![Row::from_pairs([("line", SqlValue::from("boot"))])];
        assert_eq!(table.insert_rows(&rows).await.unwrap(), 1);
        assert_eq!(table.row_count().await.unwrap(), 1);
        assert_eq!(table.fetch_all_rows().await.unwrap(), rows);

        let single = table.fetch_table_hash().await.unwrap();
        assert_eq!(table.insert_rows(&rows).await.unwrap(), 1);
        let doubled = table.fetch_table_hash().await.unwrap();
        assert_ne!(single, doubled);

        let client = TableConnection::open(
            &db,
            "audit",
            SyncConfig::default().with_hash_location(HashLocation::Client),
        )
        .await
        .unwrap();
        assert_eq!(client.fetch_table_hash().await.unwrap(), doubled);

        assert!(matches!(table.fetch_primary_key_values().await, Err(SyncError::NoPrimaryKey(_))));
        assert!(matches!(table.fetch_full_hash_index().await, Err(SyncError::NoPrimaryKey(_))));
        assert!(matches!(table.sync_rows(&rows).await, Err(SyncError::NoPrimaryKey(_))));
    }
}
