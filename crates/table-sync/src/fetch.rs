//! Chunked reads keyed by primary key sets.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::core::{
    Connection, KeyFilter, KeyValue, Page, Row, RowKey, RowSet, SqlValue, Statement, TableSchema,
};
use crate::error::{Result, SyncError};
use crate::hash::{HashIndex, HashLocation, RowHash, RowHasher, TableHash};

/// Reads rows and row digests from one table in bounded chunks.
#[derive(Clone)]
pub struct KeyedFetcher {
    conn: Arc<dyn Connection>,
    schema: Arc<TableSchema>,
    config: SyncConfig,
}

impl KeyedFetcher {
    /// Create a fetcher over `schema` using `conn`.
    pub fn new(conn: Arc<dyn Connection>, schema: Arc<TableSchema>, config: SyncConfig) -> Self {
        Self {
            conn,
            schema,
            config,
        }
    }

    /// Schema of the table read.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Maximum keys per statement.
    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size.max(1)
    }

    /// Hasher over every column of the table.
    pub fn hasher(&self) -> Result<RowHasher> {
        RowHasher::for_schema(&self.schema, self.config.delimiter)
    }

    /// Rows whose primary key is in `keys`.
    ///
    /// Issues one statement per chunk of at most `chunk_size` keys and
    /// concatenates results in chunk order. Row order within a chunk is
    /// whatever the store returns. Empty input issues no statement. Any chunk
    /// failure aborts the whole call and discards rows already fetched.
    pub async fn fetch_by_keys(&self, keys: &[RowKey]) -> Result<Vec<Row>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let pk = self.schema.require_pk()?;

        let mut rows = Vec::with_capacity(keys.len());
        for (i, chunk) in keys.chunks(self.chunk_size()).enumerate() {
            let statement = Statement::Select {
                table: self.schema.name.clone(),
                columns: self.schema.column_names(),
                filter: Some(KeyFilter::new(pk.to_vec(), chunk.to_vec())),
                order_by: Vec::new(),
                page: None,
            };
            let result = self.conn.execute(&statement).await?;
            debug!(
                "{}: chunk {} fetched {} rows for {} keys",
                self.schema.name,
                i + 1,
                result.len(),
                chunk.len()
            );
            rows.extend(result.into_rows()?);
        }
        Ok(rows)
    }

    /// Row digests for the rows whose primary key is in `keys`, chunked like
    /// [`fetch_by_keys`](Self::fetch_by_keys).
    pub async fn fetch_row_hashes(&self, keys: &[RowKey]) -> Result<HashIndex> {
        if keys.is_empty() {
            return Ok(HashIndex::new());
        }
        let pk = self.schema.require_pk()?;

        match self.config.hash_location {
            HashLocation::Server => {
                let mut index = HashIndex::with_capacity(keys.len());
                for chunk in keys.chunks(self.chunk_size()) {
                    let filter = KeyFilter::new(pk.to_vec(), chunk.to_vec());
                    let statement = self.row_hash_statement(pk.to_vec(), Some(filter));
                    let result = self.conn.execute(&statement).await?;
                    index.extend(self.parse_hash_rows(result)?);
                }
                Ok(index)
            }
            HashLocation::Client => {
                let rows = self.fetch_by_keys(keys).await?;
                HashIndex::from_rows(&self.hasher()?, pk, &rows)
            }
        }
    }

    /// Digest-to-key map over the whole table.
    ///
    /// A single unchunked statement: every row has to be visited anyway.
    pub async fn fetch_full_hash_index(&self) -> Result<HashIndex> {
        let pk = self.schema.require_pk()?;
        let start = Instant::now();

        let index = match self.config.hash_location {
            HashLocation::Server => {
                let result = self.conn.execute(&self.row_hash_statement(pk.to_vec(), None)).await?;
                let mut index = HashIndex::with_capacity(result.len());
                index.extend(self.parse_hash_rows(result)?);
                index
            }
            HashLocation::Client => {
                let rows = self.fetch_all_rows().await?;
                HashIndex::from_rows(&self.hasher()?, pk, &rows)?
            }
        };

        info!(
            "{}: indexed {} row hashes ({:?} side) in {:?}",
            self.schema.name,
            index.len(),
            self.config.hash_location,
            start.elapsed()
        );
        Ok(index)
    }

    /// Aggregate digest of the whole table.
    ///
    /// Reads digests only, so it works without a primary key and keeps
    /// duplicate rows of keyless tables in the aggregate.
    pub async fn fetch_table_hash(&self) -> Result<TableHash> {
        let hashes = match self.config.hash_location {
            HashLocation::Server => {
                let statement = self.row_hash_statement(Vec::new(), None);
                let result = self.conn.execute(&statement).await?;
                result
                    .rows
                    .into_iter()
                    .map(|mut values| self.parse_digest(values.pop()))
                    .collect::<Result<Vec<_>>>()?
            }
            HashLocation::Client => {
                let hasher = self.hasher()?;
                self.fetch_all_rows()
                    .await?
                    .iter()
                    .map(|row| hasher.hash_row(row))
                    .collect::<Result<Vec<_>>>()?
            }
        };
        debug!("{}: aggregating {} row hashes", self.schema.name, hashes.len());
        Ok(TableHash::aggregate(hashes))
    }

    /// Every row of the table. Holds the full table in memory.
    pub async fn fetch_all_rows(&self) -> Result<Vec<Row>> {
        let statement = Statement::Select {
            table: self.schema.name.clone(),
            columns: self.schema.column_names(),
            filter: None,
            order_by: Vec::new(),
            page: None,
        };
        self.conn.execute(&statement).await?.into_rows()
    }

    /// One LIMIT/OFFSET page, ordered by primary key when there is one.
    pub async fn fetch_range(&self, offset: u64, limit: u64) -> Result<Vec<Row>> {
        let statement = Statement::Select {
            table: self.schema.name.clone(),
            columns: self.schema.column_names(),
            filter: None,
            order_by: self.schema.primary_key.clone(),
            page: Some(Page { offset, limit }),
        };
        self.conn.execute(&statement).await?.into_rows()
    }

    /// Every primary key in the table, in key order.
    pub async fn fetch_primary_key_values(&self) -> Result<Vec<RowKey>> {
        let pk = self.schema.require_pk()?;
        let statement = Statement::Select {
            table: self.schema.name.clone(),
            columns: pk.to_vec(),
            filter: None,
            order_by: pk.to_vec(),
            page: None,
        };
        let result = self.conn.execute(&statement).await?;
        result
            .rows
            .into_iter()
            .map(|values| key_from_values(pk, values))
            .collect()
    }

    /// Number of rows in the table.
    pub async fn row_count(&self) -> Result<u64> {
        let statement = Statement::Count {
            table: self.schema.name.clone(),
        };
        let result = self.conn.execute(&statement).await?;
        let value = result.rows.into_iter().next().and_then(|r| r.into_iter().next());
        match value {
            Some(SqlValue::Int(n)) if n >= 0 => Ok(n as u64),
            Some(SqlValue::UInt(n)) => Ok(n),
            Some(SqlValue::Text(s)) => s.trim().parse().map_err(|e| {
                SyncError::query_failed(statement.to_string(), format!("bad row count {:?}: {}", s, e))
            }),
            other => Err(SyncError::query_failed(
                statement.to_string(),
                format!("unexpected row count {:?}", other),
            )),
        }
    }

    fn row_hash_statement(&self, key_columns: Vec<String>, filter: Option<KeyFilter>) -> Statement {
        Statement::SelectRowHashes {
            table: self.schema.name.clone(),
            key_columns,
            columns: self.schema.column_names(),
            delimiter: self.config.delimiter,
            filter,
        }
    }

    /// Split `(key..., row_hash)` result rows into digest/key pairs.
    fn parse_hash_rows(&self, result: RowSet) -> Result<Vec<(RowHash, RowKey)>> {
        let pk = &self.schema.primary_key;
        result
            .rows
            .into_iter()
            .map(|mut values| {
                let hash = self.parse_digest(values.pop())?;
                Ok((hash, key_from_values(pk, values)?))
            })
            .collect()
    }

    fn parse_digest(&self, value: Option<SqlValue>) -> Result<RowHash> {
        match value {
            Some(SqlValue::Text(hex)) => hex.parse(),
            Some(SqlValue::Bytes(bytes)) => String::from_utf8_lossy(&bytes).parse(),
            other => Err(SyncError::schema_mismatch(format!(
                "row digest column of {} returned {:?}",
                self.schema.name, other
            ))),
        }
    }
}

fn key_from_values(key_columns: &[String], values: Vec<SqlValue>) -> Result<RowKey> {
    if values.len() != key_columns.len() {
        return Err(SyncError::schema_mismatch(format!(
            "expected {} key values, got {}",
            key_columns.len(),
            values.len()
        )));
    }
    key_columns
        .iter()
        .zip(&values)
        .map(|(column, value)| KeyValue::from_value(column, value))
        .collect::<Result<Vec<_>>>()
        .map(RowKey::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;
    use crate::drivers::MemoryDatabase;

    async fn fixture(rows: i64, config: SyncConfig) -> (MemoryDatabase, KeyedFetcher) {
        let db = MemoryDatabase::new();
        let schema = TableSchema::new(
            "items",
            vec![Column::new("id", "int").not_null(), Column::new("label", "varchar")],
            vec!["id".into()],
        )
        .unwrap();
        db.create_table(schema.clone()).await;
        db.seed(
            "items",
            (1..=rows)
                .map(|i| Row::from_pairs([("id", SqlValue::Int(i)), ("label", format!("item-{i}").into())]))
                .collect(),
        )
        .await
        .unwrap();
        let fetcher = KeyedFetcher::new(Arc::new(db.connection()), Arc::new(schema), config);
        (db, fetcher)
    }

    #[tokio::test]
    async fn test_fetch_by_keys_chunks() {
        let (db, fetcher) = fixture(10, SyncConfig::default().with_chunk_size(3)).await;
        let keys: Vec<RowKey> = (1..=7i64).map(RowKey::from).collect();
        let rows = fetcher.fetch_by_keys(&keys).await.unwrap();
        assert_eq!(rows.len(), 7);

        let counts: Vec<usize> = db.statements().await.iter().map(|s| s.item_count()).collect();
        assert_eq!(counts, vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_empty_keys_issue_nothing() {
        let (db, fetcher) = fixture(3, SyncConfig::default()).await;
        assert!(fetcher.fetch_by_keys(&[]).await.unwrap().is_empty());
        assert!(fetcher.fetch_row_hashes(&[]).await.unwrap().is_empty());
        assert!(db.statements().await.is_empty());
    }

    #[tokio::test]
    async fn test_chunk_failure_discards_everything() {
        let (db, fetcher) = fixture(10, SyncConfig::default().with_chunk_size(2)).await;
        db.fail_on_statement(1).await;
        let keys: Vec<RowKey> = (1..=6i64).map(RowKey::from).collect();
        let err = fetcher.fetch_by_keys(&keys).await.unwrap_err();
        assert!(matches!(err, SyncError::QueryFailed { .. }));
        // Statements after the failing chunk are never issued.
        assert_eq!(db.statements().await.len(), 1);
    }

    #[tokio::test]
    async fn test_server_and_client_hashing_agree() {
        let (_db, server) = fixture(5, SyncConfig::default()).await;
        let (_db, client) =
            fixture(5, SyncConfig::default().with_hash_location(HashLocation::Client)).await;
        let a = server.fetch_full_hash_index().await.unwrap();
        let b = client.fetch_full_hash_index().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert_eq!(
            server.fetch_table_hash().await.unwrap(),
            client.fetch_table_hash().await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_row_hashes_for_keys() {
        let (_db, fetcher) = fixture(5, SyncConfig::default().with_chunk_size(2)).await;
        let index = fetcher
            .fetch_row_hashes(&[RowKey::from(2), RowKey::from(4), RowKey::from(99)])
            .await
            .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&RowHash::digest(b"2#item-2")), Some(&RowKey::from(2)));
    }

    #[tokio::test]
    async fn test_range_keys_and_count() {
        let (_db, fetcher) = fixture(5, SyncConfig::default()).await;
        let page = fetcher.fetch_range(1, 2).await.unwrap();
        assert_eq!(page[0].get("id"), Some(&SqlValue::Int(2)));
        assert_eq!(page.len(), 2);

        let keys = fetcher.fetch_primary_key_values().await.unwrap();
        assert_eq!(keys, (1..=5i64).map(RowKey::from).collect::<Vec<_>>());
        assert_eq!(fetcher.row_count().await.unwrap(), 5);
        assert_eq!(fetcher.fetch_all_rows().await.unwrap().len(), 5);
    }
}
