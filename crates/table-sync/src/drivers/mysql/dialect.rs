//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Renders typed [`Statement`]s to MySQL text. Values are spliced in as
//! escaped literals because statements are sent over the text protocol.

use crate::core::identifier::{escape_literal, quote_name};
use crate::core::{Dialect, KeyFilter, SqlValue, Statement, ROW_HASH_COLUMN};
use crate::error::{Result, SyncError};
use crate::hash::normalize::row_hash_expr;

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn column_list(&self, columns: &[String]) -> Result<String> {
        Ok(columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }

    /// Render a value as a literal. NULL becomes the bare `NULL` keyword.
    pub fn literal(&self, value: &SqlValue) -> Result<String> {
        Ok(match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::UInt(v) => v.to_string(),
            SqlValue::Float(v) if !v.is_finite() => {
                return Err(SyncError::schema_mismatch(format!(
                    "MySQL cannot store non-finite float {}",
                    v
                )))
            }
            SqlValue::Float(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Bytes(b) => format!("X'{}'", hex::encode(b)),
            SqlValue::Text(s) => format!("'{}'", escape_literal(s)),
            other => {
                let text = other.store_text().unwrap_or_default();
                format!("'{}'", escape_literal(&String::from_utf8_lossy(&text)))
            }
        })
    }

    /// Tuple membership predicate.
    ///
    /// Single-column keys use a plain `IN` list; composite keys use a row
    /// constructor: `(`a`, `b`) IN ((1, 'x'), (2, 'y'))`.
    fn key_predicate(&self, filter: &KeyFilter) -> Result<String> {
        if filter.key_columns.is_empty() {
            return Err(SyncError::schema_mismatch("key filter has no key columns"));
        }
        if filter.keys.is_empty() {
            // An empty IN list is a syntax error; match nothing instead.
            return Ok("1 = 0".to_string());
        }

        let width = filter.key_columns.len();
        let mut tuples = Vec::with_capacity(filter.keys.len());
        for key in &filter.keys {
            if key.len() != width {
                return Err(SyncError::schema_mismatch(format!(
                    "key {} has {} values, primary key has {} columns",
                    key,
                    key.len(),
                    width
                )));
            }
            let values = key
                .values()
                .iter()
                .map(|v| self.literal(&v.to_value()))
                .collect::<Result<Vec<_>>>()?;
            tuples.push(if width == 1 {
                values.join("")
            } else {
                format!("({})", values.join(", "))
            });
        }

        let columns = self.column_list(&filter.key_columns)?;
        let lhs = if width == 1 {
            columns
        } else {
            format!("({})", columns)
        };
        Ok(format!("{} IN ({})", lhs, tuples.join(", ")))
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_name(name)
    }

    fn escape_string(&self, value: &str) -> String {
        escape_literal(value)
    }

    fn render(&self, statement: &Statement) -> Result<String> {
        match statement {
            Statement::Select {
                table,
                columns,
                filter,
                order_by,
                page,
            } => {
                let mut sql = format!(
                    "SELECT {} FROM {}",
                    self.column_list(columns)?,
                    self.quote_ident(table)?
                );
                if let Some(filter) = filter {
                    sql.push_str(" WHERE ");
                    sql.push_str(&self.key_predicate(filter)?);
                }
                if !order_by.is_empty() {
                    sql.push_str(" ORDER BY ");
                    sql.push_str(&self.column_list(order_by)?);
                }
                if let Some(page) = page {
                    sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit, page.offset));
                }
                Ok(sql)
            }

            Statement::SelectRowHashes {
                table,
                key_columns,
                columns,
                delimiter,
                filter,
            } => {
                let mut select = self.column_list(key_columns)?;
                if !select.is_empty() {
                    select.push_str(", ");
                }
                let mut sql = format!(
                    "SELECT {}{} AS {} FROM {}",
                    select,
                    row_hash_expr(self, columns, *delimiter)?,
                    self.quote_ident(ROW_HASH_COLUMN)?,
                    self.quote_ident(table)?
                );
                if let Some(filter) = filter {
                    sql.push_str(" WHERE ");
                    sql.push_str(&self.key_predicate(filter)?);
                }
                Ok(sql)
            }

            Statement::Count { table } => Ok(format!(
                "SELECT COUNT(*) AS `row_count` FROM {}",
                self.quote_ident(table)?
            )),

            Statement::Delete { table, filter } => Ok(format!(
                "DELETE FROM {} WHERE {}",
                self.quote_ident(table)?,
                self.key_predicate(filter)?
            )),

            Statement::Insert {
                table,
                columns,
                rows,
            } => {
                if rows.is_empty() {
                    return Err(SyncError::schema_mismatch(format!(
                        "insert into {} carries no rows",
                        table
                    )));
                }
                let mut tuples = Vec::with_capacity(rows.len());
                for row in rows {
                    if row.len() != columns.len() {
                        return Err(SyncError::schema_mismatch(format!(
                            "insert row has {} values for {} columns",
                            row.len(),
                            columns.len()
                        )));
                    }
                    let values = row
                        .iter()
                        .map(|v| self.literal(v))
                        .collect::<Result<Vec<_>>>()?;
                    tuples.push(format!("({})", values.join(", ")));
                }
                Ok(format!(
                    "INSERT INTO {} ({}) VALUES {}",
                    self.quote_ident(table)?,
                    self.column_list(columns)?,
                    tuples.join(", ")
                ))
            }
        }
    }
}
