//! Collaborator traits the sync engine depends on.
//!
//! - [`Connection`]: runs one statement and escapes literals
//! - [`SchemaProvider`]: discovers columns and primary keys
//! - [`ConnectionFactory`]: creates connections; injected into every table
//!   handle instead of a process-wide connection registry
//! - [`Dialect`]: SQL syntax strategy used to render [`Statement`]s

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

use super::row::RowSet;
use super::schema::Column;
use super::statement::Statement;

/// SQL syntax strategy for one store.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g. "mysql").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name).
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Escape a string for inclusion between single quotes.
    fn escape_string(&self, value: &str) -> String;

    /// Render a typed statement to SQL text.
    fn render(&self, statement: &Statement) -> Result<String>;
}

/// A live connection to the store.
///
/// Implementations own transport concerns: reconnecting after timeouts,
/// charset negotiation and retrying transient failures all happen below this
/// trait. Statements are executed one at a time in call order.
#[async_trait]
pub trait Connection: SchemaProvider + Send + Sync {
    /// Run one statement. Failures surface as `QueryFailed` carrying the
    /// rendered statement and the store's error text.
    async fn execute(&self, statement: &Statement) -> Result<RowSet>;

    /// SQL dialect used to render statements for this store.
    fn dialect(&self) -> &dyn Dialect;

    /// Store-appropriate literal escaping.
    fn escape(&self, value: &str) -> String {
        self.dialect().escape_string(value)
    }

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<()>;
}

/// Discovers table metadata.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Columns of `table` in declaration order.
    async fn columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Primary key column names of `table` in key order; empty when none.
    async fn primary_key(&self, table: &str) -> Result<Vec<String>>;

    /// Names of all tables in the current database.
    async fn table_names(&self) -> Result<Vec<String>>;
}

/// Creates connections. The caller owns its lifecycle.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a connection.
    async fn connect(&self) -> Result<Arc<dyn Connection>>;

    /// Human-readable description of the endpoint, for logs.
    fn describe(&self) -> String;
}
