//! Per-row content digests.

use crate::core::{Row, SqlValue, TableSchema};
use crate::error::{Result, SyncError};

use super::normalize::{encode_row, validate_delimiter, DEFAULT_DELIMITER};
use super::RowHash;

/// Computes [`RowHash`]es over a fixed, ordered column list.
///
/// Deterministic across runs and processes: no seeding, no dependence on the
/// column order of the input row.
#[derive(Debug, Clone)]
pub struct RowHasher {
    columns: Vec<String>,
    delimiter: u8,
}

impl RowHasher {
    /// Create a hasher over `columns` (schema declaration order).
    pub fn new(columns: Vec<String>, delimiter: char) -> Result<Self> {
        if columns.is_empty() {
            return Err(SyncError::schema_mismatch("cannot hash rows with no columns"));
        }
        Ok(Self {
            columns,
            delimiter: validate_delimiter(delimiter)?,
        })
    }

    /// Hasher over every column of `schema`.
    pub fn for_schema(schema: &TableSchema, delimiter: char) -> Result<Self> {
        Self::new(schema.column_names(), delimiter)
    }

    /// Hasher over every column of `schema` with the default delimiter.
    pub fn with_default_delimiter(schema: &TableSchema) -> Result<Self> {
        Self::for_schema(schema, DEFAULT_DELIMITER)
    }

    /// Columns hashed, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Delimiter between encoded values.
    pub fn delimiter(&self) -> char {
        self.delimiter as char
    }

    /// Digest one row.
    ///
    /// The row must carry exactly the hashed columns, in any order. A missing
    /// column, an unknown column or a duplicated column is a `SchemaMismatch`.
    pub fn hash_row(&self, row: &Row) -> Result<RowHash> {
        if row.len() != self.columns.len() {
            return Err(SyncError::schema_mismatch(format!(
                "row has {} columns, expected {} ({})",
                row.len(),
                self.columns.len(),
                self.columns.join(", ")
            )));
        }

        // Fast path for rows already in hashing order.
        if row.columns() == self.columns.as_slice() {
            return Ok(self.hash_values(row.values()));
        }

        let mut ordered: Vec<&SqlValue> = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let value = row.get(column).ok_or_else(|| {
                SyncError::schema_mismatch(format!("row is missing column '{}'", column))
            })?;
            ordered.push(value);
        }
        Ok(RowHash::digest(&encode_row(ordered, self.delimiter)))
    }

    /// Digest values already in hashing order.
    pub fn hash_values(&self, values: &[SqlValue]) -> RowHash {
        RowHash::digest(&encode_row(values, self.delimiter))
    }
}
