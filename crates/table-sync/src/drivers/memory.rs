//! In-process store.
//!
//! [`MemoryDatabase`] keeps tables in memory and executes typed statements
//! structurally. It enforces primary key uniqueness and NOT NULL columns the
//! way MySQL does, and records every successful statement so tests can check
//! what reached the store and in which order. Statements are still rendered
//! with the MySQL dialect, so malformed statements fail here exactly as they
//! would against a server, and `QueryFailed` errors carry real SQL text.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::{
    Column, Connection, ConnectionFactory, Dialect, KeyValue, Row, RowKey, RowSet, SchemaProvider,
    SqlValue, Statement, TableSchema,
};
use crate::error::{Result, SyncError};
use crate::hash::normalize::{encode_row, validate_delimiter};
use crate::hash::RowHash;

use super::MysqlDialect;

/// Shared in-memory database. Cloning yields another handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, MemoryTable>,
    log: Vec<Statement>,
    attempts: usize,
    fail_at: Option<usize>,
}

struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Vec<SqlValue>>,
}

type Applied = std::result::Result<RowSet, String>;

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table.
    pub async fn create_table(&self, schema: TableSchema) {
        let mut state = self.inner.lock().await;
        state.tables.insert(
            schema.name.clone(),
            MemoryTable {
                schema,
                rows: Vec::new(),
            },
        );
    }

    /// Load rows without recording statements.
    pub async fn seed(&self, table: &str, rows: Vec<Row>) -> Result<()> {
        let mut state = self.inner.lock().await;
        for row in rows {
            let statement = Statement::Insert {
                table: table.to_string(),
                columns: row.columns().to_vec(),
                rows: vec![row.into_values()],
            };
            state
                .apply(&statement)
                .map_err(|message| SyncError::query_failed(statement.to_string(), message))?;
        }
        Ok(())
    }

    /// Current contents of `table` in schema column order, sorted by
    /// primary key when the table has one.
    pub async fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let state = self.inner.lock().await;
        let t = state
            .tables
            .get(table)
            .ok_or_else(|| SyncError::query_failed(table, missing_table(table)))?;

        let columns: Arc<[String]> = t.schema.column_names().into();
        let mut rows = t
            .rows
            .iter()
            .map(|values| Row::new(columns.clone(), values.clone()))
            .collect::<Result<Vec<_>>>()?;

        if t.schema.has_pk() {
            let pk = &t.schema.primary_key;
            rows.sort_by_cached_key(|row| RowKey::from_row(row, pk).ok());
        }
        Ok(rows)
    }

    /// Statements executed successfully so far, in execution order.
    pub async fn statements(&self) -> Vec<Statement> {
        self.inner.lock().await.log.clone()
    }

    /// Forget recorded statements and reset the attempt counter.
    pub async fn clear_statements(&self) {
        let mut state = self.inner.lock().await;
        state.log.clear();
        state.attempts = 0;
    }

    /// Make the `n`th statement attempt (0-based, counted since the last
    /// [`clear_statements`](Self::clear_statements)) fail with `QueryFailed`.
    pub async fn fail_on_statement(&self, n: usize) {
        self.inner.lock().await.fail_at = Some(n);
    }

    /// Open a connection to this database.
    pub fn connection(&self) -> MemoryConnection {
        MemoryConnection {
            db: self.clone(),
            dialect: MysqlDialect::new(),
        }
    }
}

#[async_trait]
impl ConnectionFactory for MemoryDatabase {
    async fn connect(&self) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(self.connection()))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Connection to a [`MemoryDatabase`].
#[derive(Clone)]
pub struct MemoryConnection {
    db: MemoryDatabase,
    dialect: MysqlDialect,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&self, statement: &Statement) -> Result<RowSet> {
        let sql = self.dialect.render(statement)?;

        let mut state = self.db.inner.lock().await;
        let attempt = state.attempts;
        state.attempts += 1;
        if state.fail_at == Some(attempt) {
            return Err(SyncError::query_failed(sql, "Lost connection to server during query"));
        }

        let result = state
            .apply(statement)
            .map_err(|message| SyncError::query_failed(sql, message))?;
        state.log.push(statement.clone());
        Ok(result)
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SchemaProvider for MemoryConnection {
    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let state = self.db.inner.lock().await;
        Ok(state
            .tables
            .get(table)
            .map(|t| t.schema.columns.clone())
            .unwrap_or_default())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let state = self.db.inner.lock().await;
        Ok(state
            .tables
            .get(table)
            .map(|t| t.schema.primary_key.clone())
            .unwrap_or_default())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let state = self.db.inner.lock().await;
        Ok(state.tables.keys().cloned().collect())
    }
}

impl State {
    fn apply(&mut self, statement: &Statement) -> Applied {
        let table = self
            .tables
            .get_mut(statement.table())
            .ok_or_else(|| missing_table(statement.table()))?;

        match statement {
            Statement::Select {
                columns,
                filter,
                order_by,
                page,
                ..
            } => {
                let projection = table.indices(columns)?;
                let keys = match filter {
                    Some(f) => Some((table.indices(&f.key_columns)?, key_set(&f.keys))),
                    None => None,
                };
                let mut rows: Vec<&Vec<SqlValue>> = table
                    .rows
                    .iter()
                    .filter(|row| matches_keys(row, keys.as_ref()))
                    .collect();

                if !order_by.is_empty() {
                    let order = table.indices(order_by)?;
                    rows.sort_by_cached_key(|row| {
                        order
                            .iter()
                            .map(|&i| KeyValue::from_value("", &row[i]).ok())
                            .collect::<Vec<_>>()
                    });
                }

                let (offset, limit) = match page {
                    Some(p) => (p.offset as usize, p.limit as usize),
                    None => (0, usize::MAX),
                };
                let out = rows
                    .into_iter()
                    .skip(offset)
                    .take(limit)
                    .map(|row| projection.iter().map(|&i| row[i].clone()).collect())
                    .collect();
                Ok(RowSet::with_rows(statement.output_columns(), out))
            }

            Statement::SelectRowHashes {
                key_columns,
                columns,
                delimiter,
                filter,
                ..
            } => {
                let delimiter = validate_delimiter(*delimiter).map_err(|e| e.to_string())?;
                let key_idx = table.indices(key_columns)?;
                let hashed = table.indices(columns)?;
                let keys = match filter {
                    Some(f) => Some((table.indices(&f.key_columns)?, key_set(&f.keys))),
                    None => None,
                };

                let out = table
                    .rows
                    .iter()
                    .filter(|row| matches_keys(row, keys.as_ref()))
                    .map(|row| {
                        let mut values: Vec<SqlValue> =
                            key_idx.iter().map(|&i| row[i].clone()).collect();
                        let encoded = encode_row(hashed.iter().map(|&i| &row[i]), delimiter);
                        values.push(SqlValue::Text(RowHash::digest(&encoded).to_hex()));
                        values
                    })
                    .collect();
                Ok(RowSet::with_rows(statement.output_columns(), out))
            }

            Statement::Count { .. } => Ok(RowSet::with_rows(
                statement.output_columns(),
                vec![vec![SqlValue::from(table.rows.len() as u64)]],
            )),

            Statement::Delete { filter, .. } => {
                let key_idx = table.indices(&filter.key_columns)?;
                let keys = key_set(&filter.keys);
                let before = table.rows.len();
                let filter = Some((key_idx, keys));
                table.rows.retain(|row| !matches_keys(row, filter.as_ref()));
                Ok(RowSet::affected((before - table.rows.len()) as u64))
            }

            Statement::Insert { columns, rows, .. } => {
                let positions = table.indices(columns)?;
                let mut seen = HashSet::new();
                for &p in &positions {
                    if !seen.insert(p) {
                        return Err(format!(
                            "Column '{}' specified twice",
                            table.schema.columns[p].name
                        ));
                    }
                }

                let width = table.schema.columns.len();
                let mut staged = Vec::with_capacity(rows.len());
                for values in rows {
                    let mut full = vec![SqlValue::Null; width];
                    for (&p, value) in positions.iter().zip(values) {
                        full[p] = value.clone();
                    }
                    for (column, value) in table.schema.columns.iter().zip(&full) {
                        if value.is_null() && !column.is_nullable {
                            return Err(format!("Column '{}' cannot be null", column.name));
                        }
                    }
                    staged.push(full);
                }

                if table.schema.has_pk() {
                    let pk = table.indices(&table.schema.primary_key)?;
                    let mut existing: HashSet<Vec<KeyValue>> =
                        table.rows.iter().filter_map(|row| row_key(row, &pk)).collect();
                    for row in &staged {
                        let key = row_key(row, &pk).ok_or_else(|| {
                            format!("Primary key of table '{}' cannot be null", table.schema.name)
                        })?;
                        if !existing.insert(key.clone()) {
                            return Err(format!(
                                "Duplicate entry '{}' for key 'PRIMARY'",
                                RowKey::new(key)
                            ));
                        }
                    }
                }

                let inserted = staged.len() as u64;
                table.rows.extend(staged);
                Ok(RowSet::affected(inserted))
            }
        }
    }
}

impl MemoryTable {
    fn indices(&self, columns: &[String]) -> std::result::Result<Vec<usize>, String> {
        columns
            .iter()
            .map(|c| {
                self.schema
                    .column_index(c)
                    .ok_or_else(|| format!("Unknown column '{}' in 'field list'", c))
            })
            .collect()
    }
}

fn missing_table(table: &str) -> String {
    format!("Table '{}' doesn't exist", table)
}

fn key_set(keys: &[RowKey]) -> HashSet<Vec<KeyValue>> {
    keys.iter().map(|k| k.values().to_vec()).collect()
}

fn row_key(row: &[SqlValue], positions: &[usize]) -> Option<Vec<KeyValue>> {
    positions
        .iter()
        .map(|&i| KeyValue::from_value("", &row[i]).ok())
        .collect()
}

fn matches_keys(row: &[SqlValue], filter: Option<&(Vec<usize>, HashSet<Vec<KeyValue>>)>) -> bool {
    match filter {
        None => true,
        Some((positions, keys)) => row_key(row, positions).is_some_and(|k| keys.contains(&k)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::KeyFilter;

    async fn sites() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.create_table(
            TableSchema::new(
                "sites",
                vec![Column::new("id", "int").not_null(), Column::new("name", "varchar")],
                vec!["id".into()],
            )
            .unwrap(),
        )
        .await;
        db.seed(
            "sites",
            vec![
                Row::from_pairs([("id", SqlValue::Int(1)), ("name", "a".into())]),
                Row::from_pairs([("id", SqlValue::Int(2)), ("name", "b".into())]),
            ],
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let db = sites().await;
        let conn = db.connection();
        let err = conn
            .execute(&Statement::Insert {
                table: "sites".into(),
                columns: vec!["id".into(), "name".into()],
                rows: vec![vec![SqlValue::Int(2), "x".into()]],
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate entry"));
        assert!(matches!(err, SyncError::QueryFailed { ref statement, .. } if statement.starts_with("INSERT INTO `sites`")));
        assert!(db.statements().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_keys() {
        let db = sites().await;
        let conn = db.connection();
        let result = conn
            .execute(&Statement::Delete {
                table: "sites".into(),
                filter: KeyFilter::new(vec!["id".into()], vec![RowKey::from(1), RowKey::from(9)]),
            })
            .await
            .unwrap();
        assert_eq!(result.affected_rows, 1);
        assert_eq!(db.rows("sites").await.unwrap().len(), 1);
        assert_eq!(db.statements().await.len(), 1);
    }

    #[tokio::test]
    async fn test_row_hashes_match_local_encoding() {
        let db = sites().await;
        let result = db
            .connection()
            .execute(&Statement::SelectRowHashes {
                table: "sites".into(),
                key_columns: vec!["id".into()],
                columns: vec!["id".into(), "name".into()],
                delimiter: '#',
                filter: None,
            })
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["id", "row_hash"]);
        assert_eq!(result.rows[0][1], SqlValue::Text(RowHash::digest(b"1#a").to_hex()));
    }

    #[tokio::test]
    async fn test_not_null_enforced() {
        let db = sites().await;
        let err = db
            .connection()
            .execute(&Statement::Insert {
                table: "sites".into(),
                columns: vec!["name".into()],
                rows: vec![vec!["z".into()]],
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot be null"));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let db = sites().await;
        db.fail_on_statement(0).await;
        let conn = db.connection();
        let count = Statement::Count { table: "sites".into() };
        assert!(conn.execute(&count).await.is_err());
        let ok = conn.execute(&count).await.unwrap();
        assert_eq!(ok.rows[0][0], SqlValue::Int(2));
    }

    #[tokio::test]
    async fn test_unknown_table_and_schema_discovery() {
        let db = sites().await;
        let conn = db.connection();
        assert!(conn.execute(&Statement::Count { table: "nope".into() }).await.is_err());
        assert!(conn.columns("nope").await.unwrap().is_empty());
        assert_eq!(conn.primary_key("sites").await.unwrap(), vec!["id"]);
        assert_eq!(conn.table_names().await.unwrap(), vec!["sites"]);
    }
}
