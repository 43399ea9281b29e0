//! Rows, row keys and result sets.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

use super::schema::TableSchema;
use super::value::SqlValue;

/// One component of a primary key.
///
/// Keys need total equality and hashing, so floating point and temporal
/// values are folded into their store text form. Unsigned values that fit an
/// `i64` become `Int` so that `1u64` and `1i64` identify the same row, as the
/// store would.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyValue {
    /// Integer key component.
    Int(i64),
    /// Unsigned key component above `i64::MAX`.
    UInt(u64),
    /// Text key component.
    Text(String),
    /// Binary key component.
    Bytes(Vec<u8>),
}

impl KeyValue {
    /// Convert a column value into a key component.
    ///
    /// Fails with `SchemaMismatch` for NULL, which a primary key cannot hold.
    pub fn from_value(column: &str, value: &SqlValue) -> Result<Self> {
        Ok(match value {
            SqlValue::Null => {
                return Err(SyncError::schema_mismatch(format!(
                    "primary key column '{}' is NULL",
                    column
                )))
            }
            SqlValue::Bool(b) => KeyValue::Int(i64::from(*b)),
            SqlValue::Int(v) => KeyValue::Int(*v),
            SqlValue::UInt(v) => match i64::try_from(*v) {
                Ok(signed) => KeyValue::Int(signed),
                Err(_) => KeyValue::UInt(*v),
            },
            SqlValue::Text(s) => KeyValue::Text(s.clone()),
            SqlValue::Bytes(b) => KeyValue::Bytes(b.clone()),
            other => {
                let text = other.store_text().unwrap_or_default();
                KeyValue::Text(String::from_utf8_lossy(&text).into_owned())
            }
        })
    }

    /// Back-conversion used when a key has to be bound as a column value.
    pub fn to_value(&self) -> SqlValue {
        match self {
            KeyValue::Int(v) => SqlValue::Int(*v),
            KeyValue::UInt(v) => SqlValue::UInt(*v),
            KeyValue::Text(s) => SqlValue::Text(s.clone()),
            KeyValue::Bytes(b) => SqlValue::Bytes(b.clone()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::UInt(v) => write!(f, "{}", v),
            KeyValue::Text(s) => write!(f, "{:?}", s),
            KeyValue::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        KeyValue::Int(v as i64)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Text(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Text(v)
    }
}

/// Ordered primary key value tuple identifying one row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey(pub Vec<KeyValue>);

impl RowKey {
    /// Create a key from its components.
    pub fn new(values: Vec<KeyValue>) -> Self {
        Self(values)
    }

    /// Create a single-column key.
    pub fn single(value: impl Into<KeyValue>) -> Self {
        Self(vec![value.into()])
    }

    /// Extract the key of `row` for the given key columns.
    pub fn from_row(row: &Row, key_columns: &[String]) -> Result<Self> {
        let mut values = Vec::with_capacity(key_columns.len());
        for column in key_columns {
            let value = row.get(column).ok_or_else(|| {
                SyncError::schema_mismatch(format!(
                    "row is missing primary key column '{}'",
                    column
                ))
            })?;
            values.push(KeyValue::from_value(column, value)?);
        }
        Ok(Self(values))
    }

    /// Number of key components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the key has no components.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key components in key-column order.
    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", v)?;
        }
        f.write_str(")")
    }
}

impl From<i64> for RowKey {
    fn from(value: i64) -> Self {
        Self::single(value)
    }
}

impl From<i32> for RowKey {
    fn from(value: i32) -> Self {
        Self::single(value)
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        Self::single(value)
    }
}

/// A row: ordered column names paired with values.
///
/// Column names are shared between rows of the same result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row from shared column names and matching values.
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(SyncError::schema_mismatch(format!(
                "row has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Create a row from `(column, value)` pairs.
    ///
    /// ```rust
    /// use table_sync::core::{Row, SqlValue};
    ///
    /// let row = Row::from_pairs([("id", SqlValue::Int(1)), ("name", "a".into())]);
    /// assert_eq!(row.get("name"), Some(&SqlValue::Text("a".into())));
    /// ```
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, SqlValue)>,
        K: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<SqlValue>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Column names in row order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Shared handle to the column names.
    pub fn shared_columns(&self) -> &Arc<[String]> {
        &self.columns
    }

    /// Values in row order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Consume the row, returning its values.
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Value of a column by name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether two rows carry the same columns in the same order.
    pub fn same_shape(&self, other: &Row) -> bool {
        Arc::ptr_eq(&self.columns, &other.columns) || self.columns == other.columns
    }

    /// Strict structural check against a table schema: the row must carry
    /// every schema column exactly once and nothing else.
    pub fn check_against(&self, schema: &TableSchema) -> Result<()> {
        for (i, column) in self.columns.iter().enumerate() {
            if schema.column_index(column).is_none() {
                return Err(SyncError::schema_mismatch(format!(
                    "column '{}' is not part of table {}",
                    column, schema.name
                )));
            }
            if self.columns[..i].contains(column) {
                return Err(SyncError::schema_mismatch(format!(
                    "column '{}' appears more than once in row",
                    column
                )));
            }
        }
        for column in &schema.columns {
            if !self.columns.contains(&column.name) {
                return Err(SyncError::schema_mismatch(format!(
                    "row is missing column '{}' of table {}",
                    column.name, schema.name
                )));
            }
        }
        Ok(())
    }
}

/// Rows returned by one statement.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    /// Output column names.
    pub columns: Vec<String>,
    /// Row values aligned with `columns`.
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows affected by a write statement.
    pub affected_rows: u64,
}

impl RowSet {
    /// Result of a write statement.
    pub fn affected(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            ..Self::default()
        }
    }

    /// Result of a read statement.
    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows,
            affected_rows: 0,
        }
    }

    /// Number of rows returned.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert into [`Row`]s sharing one column list.
    pub fn into_rows(self) -> Result<Vec<Row>> {
        let columns: Arc<[String]> = self.columns.into();
        self.rows
            .into_iter()
            .map(|values| Row::new(columns.clone(), values))
            .collect()
    }
}
