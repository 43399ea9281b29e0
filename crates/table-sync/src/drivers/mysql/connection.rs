//! MySQL/MariaDB connection over `mysql_async`.
//!
//! Statements go over the text protocol, so every value arrives in the
//! store's own text form. Integers and decimals are parsed, binary columns
//! stay bytes and everything else stays text, which keeps client-side
//! hashing byte-identical to `CONCAT` on the server.

use std::sync::Arc;

use async_trait::async_trait;
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, SslOpts, Value};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::core::{
    Column, Connection, ConnectionFactory, Dialect, RowSet, SchemaProvider, SqlValue, Statement,
};
use crate::error::{Result, SyncError};

use super::MysqlDialect;

/// Character set id MySQL reports for binary strings.
const BINARY_CHARSET: u16 = 63;

/// Creates [`MysqlConnection`]s from a [`ConnectionConfig`].
pub struct MysqlConnectionFactory {
    pool: Pool,
    endpoint: String,
}

impl MysqlConnectionFactory {
    /// Build the connection pool. No connection is opened until
    /// [`connect`](ConnectionFactory::connect).
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let ssl_opts = match config.ssl_mode.to_lowercase().as_str() {
            "disable" => {
                warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
                None
            }
            "prefer" | "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
            "verify-ca" | "verify_ca" | "verify-full" | "verify_identity" => {
                Some(SslOpts::default())
            }
            _ => {
                warn!(
                    "Unknown ssl_mode '{}', defaulting to Preferred",
                    config.ssl_mode
                );
                Some(SslOpts::default().with_danger_accept_invalid_certs(true))
            }
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .db_name(Some(config.database.clone()))
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            // Use utf8mb4 for full Unicode support
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let constraints = PoolConstraints::new(1, config.max_connections).ok_or_else(|| {
            SyncError::Config(format!(
                "invalid pool size for {}: max_connections = {}",
                config.endpoint(),
                config.max_connections
            ))
        })?;
        let opts: Opts = builder
            .pool_opts(PoolOpts::new().with_constraints(constraints))
            .into();

        Ok(Self {
            pool: Pool::new(opts),
            endpoint: config.endpoint(),
        })
    }

    /// Disconnect every pooled connection.
    pub async fn close(self) -> Result<()> {
        self.pool
            .disconnect()
            .await
            .map_err(|e| SyncError::connection(e, format!("closing pool for {}", self.endpoint)))
    }
}

#[async_trait]
impl ConnectionFactory for MysqlConnectionFactory {
    async fn connect(&self) -> Result<Arc<dyn Connection>> {
        let connection = MysqlConnection {
            pool: self.pool.clone(),
            dialect: MysqlDialect::new(),
            endpoint: self.endpoint.clone(),
        };
        connection.ping().await?;
        info!("Connected to MySQL: {}", self.endpoint);
        Ok(Arc::new(connection))
    }

    fn describe(&self) -> String {
        format!("mysql://{}", self.endpoint)
    }
}

/// A pooled MySQL connection.
///
/// Each statement checks a connection out of the pool, runs, and returns it.
/// Callers await each statement before issuing the next, so statement order
/// is preserved even when consecutive statements use different sessions.
pub struct MysqlConnection {
    pool: Pool,
    dialect: MysqlDialect,
    endpoint: String,
}

impl MysqlConnection {
    async fn conn(&self, context: &str) -> Result<mysql_async::Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| SyncError::connection(e, format!("{} on {}", context, self.endpoint)))
    }
}

#[async_trait]
impl Connection for MysqlConnection {
    async fn execute(&self, statement: &Statement) -> Result<RowSet> {
        let sql = self.dialect.render(statement)?;
        let mut conn = self.conn(statement.kind()).await?;
        debug!("MySQL: {}", statement);

        if statement.is_write() {
            conn.query_drop(sql.as_str())
                .await
                .map_err(|e| SyncError::query_failed(sql.as_str(), e))?;
            return Ok(RowSet::affected(conn.affected_rows()));
        }

        let rows: Vec<mysql_async::Row> = conn
            .query(sql.as_str())
            .await
            .map_err(|e| SyncError::query_failed(sql.as_str(), e))?;

        let columns = statement.output_columns();
        let mut out = Vec::with_capacity(rows.len());
        for mut row in rows {
            if row.len() != columns.len() {
                return Err(SyncError::query_failed(
                    sql.as_str(),
                    format!("expected {} columns, got {}", columns.len(), row.len()),
                ));
            }
            let meta = row.columns();
            let mut values = Vec::with_capacity(columns.len());
            for (i, column) in meta.iter().enumerate() {
                let value: Value = row.take(i).unwrap_or(Value::NULL);
                values.push(mysql_to_sql_value(value, column));
            }
            out.push(values);
        }

        Ok(RowSet::with_rows(columns, out))
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn("ping").await?;
        conn.ping()
            .await
            .map_err(|e| SyncError::connection(e, format!("ping on {}", self.endpoint)))
    }
}

#[async_trait]
impl SchemaProvider for MysqlConnection {
    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let sql = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let mut conn = self.conn("loading columns").await?;
        let rows: Vec<(String, String, i64)> = conn
            .exec(sql, (table,))
            .await
            .map_err(|e| SyncError::query_failed(sql.trim(), e))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable)| Column {
                name,
                data_type,
                is_nullable: is_nullable == 1,
            })
            .collect())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let sql = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;

        let mut conn = self.conn("loading primary key").await?;
        conn.exec(sql, (table,))
            .await
            .map_err(|e| SyncError::query_failed(sql.trim(), e))
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let sql = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let mut conn = self.conn("listing tables").await?;
        conn.query(sql)
            .await
            .map_err(|e| SyncError::query_failed(sql.trim(), e))
    }
}

/// Convert one text-protocol value using the column metadata.
fn mysql_to_sql_value(value: Value, column: &mysql_async::Column) -> SqlValue {
    let bytes = match value {
        Value::NULL => return SqlValue::Null,
        Value::Bytes(bytes) => bytes,
        // Binary protocol values; statements here use the text protocol.
        Value::Int(v) => return SqlValue::Int(v),
        Value::UInt(v) => return SqlValue::from(v),
        Value::Float(v) => return SqlValue::Float(f64::from(v)),
        Value::Double(v) => return SqlValue::Float(v),
        other => return SqlValue::Text(other.as_sql(true).trim_matches('\'').to_string()),
    };

    let unsigned = column.flags().contains(ColumnFlags::UNSIGNED_FLAG);
    match column.column_type() {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => {
            let text = String::from_utf8_lossy(&bytes);
            let parsed = if unsigned {
                text.parse::<u64>().ok().map(SqlValue::from)
            } else {
                text.parse::<i64>().ok().map(SqlValue::Int)
            };
            parsed.unwrap_or_else(|| SqlValue::Text(text.into_owned()))
        }
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            let text = String::from_utf8_lossy(&bytes);
            text.parse::<Decimal>()
                .map(SqlValue::Decimal)
                .unwrap_or_else(|_| SqlValue::Text(text.into_owned()))
        }
        ColumnType::MYSQL_TYPE_BIT | ColumnType::MYSQL_TYPE_GEOMETRY => SqlValue::Bytes(bytes),
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_STRING
        | ColumnType::MYSQL_TYPE_VAR_STRING
        | ColumnType::MYSQL_TYPE_VARCHAR
            if column.character_set() == BINARY_CHARSET =>
        {
            SqlValue::Bytes(bytes)
        }
        // FLOAT/DOUBLE stay text: their shortest round-trip form differs
        // between MySQL and Rust for large exponents.
        _ => match String::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text),
            Err(e) => SqlValue::Bytes(e.into_bytes()),
        },
    }
}
