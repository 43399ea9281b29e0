//! Store collaborators.
//!
//! - [`mysql`]: MySQL/MariaDB over `mysql_async`
//! - [`memory`]: in-process tables for tests and dry runs
//!
//! Each driver implements [`Connection`](crate::core::Connection),
//! [`SchemaProvider`](crate::core::SchemaProvider) and
//! [`ConnectionFactory`](crate::core::ConnectionFactory).

pub mod memory;
pub mod mysql;

pub use memory::{MemoryConnection, MemoryDatabase};
pub use mysql::{MysqlConnection, MysqlConnectionFactory, MysqlDialect};
