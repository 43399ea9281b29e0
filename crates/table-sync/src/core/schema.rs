//! Table schema metadata.
//!
//! A [`TableSchema`] is discovered once when a table is opened and cached for
//! the lifetime of the handle. After DDL on the table the handle must be
//! discarded and reopened.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Column descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Store data type (e.g. `int`, `varchar`, `datetime`).
    pub data_type: String,

    /// Whether the column accepts NULL.
    pub is_nullable: bool,
}

impl Column {
    /// Create a nullable column descriptor.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
        }
    }

    /// Mark the column as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }
}

/// Ordered column list plus ordered primary key column list for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,

    /// Column definitions in declaration order.
    pub columns: Vec<Column>,

    /// Primary key column names in key order. Empty when the table has none.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Build a schema, checking that every key column is a declared column.
    pub fn new(name: impl Into<String>, columns: Vec<Column>, primary_key: Vec<String>) -> Result<Self> {
        let schema = Self {
            name: name.into(),
            columns,
            primary_key,
        };

        if schema.columns.is_empty() {
            return Err(SyncError::schema_mismatch(format!(
                "table {} has no columns",
                schema.name
            )));
        }

        for key in &schema.primary_key {
            if schema.column_index(key).is_none() {
                return Err(SyncError::schema_mismatch(format!(
                    "primary key column '{}' is not a column of table {}",
                    key, schema.name
                )));
            }
        }

        Ok(schema)
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Primary key column names, or `NoPrimaryKey` when there are none.
    pub fn require_pk(&self) -> Result<&[String]> {
        if self.primary_key.is_empty() {
            return Err(SyncError::NoPrimaryKey(self.name.clone()));
        }
        Ok(&self.primary_key)
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Position of a column in declaration order.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
