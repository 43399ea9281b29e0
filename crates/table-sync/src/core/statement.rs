//! Typed statements issued by the sync engine.
//!
//! The engine never builds SQL strings itself. It describes each statement
//! structurally and lets the connection's [`Dialect`](super::traits::Dialect)
//! render it, which keeps escaping in one place and lets the in-memory store
//! execute the same statements without parsing SQL.

use std::fmt;

use super::row::RowKey;
use super::value::SqlValue;

/// Name of the digest column produced by [`Statement::SelectRowHashes`].
pub const ROW_HASH_COLUMN: &str = "row_hash";

/// Membership predicate over the primary key tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFilter {
    /// Primary key column names in key order.
    pub key_columns: Vec<String>,
    /// Key tuples to match.
    pub keys: Vec<RowKey>,
}

impl KeyFilter {
    /// Create a key filter.
    pub fn new(key_columns: Vec<String>, keys: Vec<RowKey>) -> Self {
        Self { key_columns, keys }
    }
}

/// LIMIT/OFFSET window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Rows to skip.
    pub offset: u64,
    /// Maximum rows to return.
    pub limit: u64,
}

/// One statement against a single table.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Read columns, optionally restricted to a key set and/or a page.
    Select {
        table: String,
        columns: Vec<String>,
        filter: Option<KeyFilter>,
        order_by: Vec<String>,
        page: Option<Page>,
    },

    /// Read the key columns plus a server-computed row digest.
    SelectRowHashes {
        table: String,
        key_columns: Vec<String>,
        columns: Vec<String>,
        delimiter: char,
        filter: Option<KeyFilter>,
    },

    /// Count all rows.
    Count { table: String },

    /// Delete every row whose key is in the filter.
    Delete { table: String, filter: KeyFilter },

    /// Multi-row insert.
    Insert {
        table: String,
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
    },
}

impl Statement {
    /// Target table.
    pub fn table(&self) -> &str {
        match self {
            Statement::Select { table, .. }
            | Statement::SelectRowHashes { table, .. }
            | Statement::Count { table }
            | Statement::Delete { table, .. }
            | Statement::Insert { table, .. } => table,
        }
    }

    /// Short verb used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select { .. } => "select",
            Statement::SelectRowHashes { .. } => "select-hashes",
            Statement::Count { .. } => "count",
            Statement::Delete { .. } => "delete",
            Statement::Insert { .. } => "insert",
        }
    }

    /// Whether the statement modifies the table.
    pub fn is_write(&self) -> bool {
        matches!(self, Statement::Delete { .. } | Statement::Insert { .. })
    }

    /// Number of keys or rows this statement carries.
    pub fn item_count(&self) -> usize {
        match self {
            Statement::Select { filter, .. } | Statement::SelectRowHashes { filter, .. } => {
                filter.as_ref().map_or(0, |f| f.keys.len())
            }
            Statement::Count { .. } => 0,
            Statement::Delete { filter, .. } => filter.keys.len(),
            Statement::Insert { rows, .. } => rows.len(),
        }
    }

    /// Column names of the result set a read statement produces.
    pub fn output_columns(&self) -> Vec<String> {
        match self {
            Statement::Select { columns, .. } => columns.clone(),
            Statement::SelectRowHashes { key_columns, .. } => {
                let mut out = key_columns.clone();
                out.push(ROW_HASH_COLUMN.to_string());
                out
            }
            Statement::Count { .. } => vec!["row_count".to_string()],
            Statement::Delete { .. } | Statement::Insert { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on `{}`", self.kind(), self.table())?;
        let items = self.item_count();
        if items > 0 {
            write!(f, " ({} items)", items)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_counts() {
        let delete = Statement::Delete {
            table: "t".into(),
            filter: KeyFilter::new(vec!["id".into()], vec![RowKey::from(1), RowKey::from(2)]),
        };
        assert_eq!(delete.item_count(), 2);
        assert!(delete.is_write());
        assert_eq!(delete.to_string(), "delete on `t` (2 items)");

        let count = Statement::Count { table: "t".into() };
        assert_eq!(count.item_count(), 0);
        assert!(!count.is_write());
    }

    #[test]
    fn test_row_hash_output_columns() {
        let stmt = Statement::SelectRowHashes {
            table: "t".into(),
            key_columns: vec!["a".into(), "b".into()],
            columns: vec!["a".into(), "b".into(), "c".into()],
            delimiter: '#',
            filter: None,
        };
        assert_eq!(stmt.output_columns(), vec!["a", "b", ROW_HASH_COLUMN]);
    }
}
