//! MySQL/MariaDB driver.
//!
//! This module provides MySQL-specific implementations for:
//! - [`MysqlDialect`]: renders typed statements to SQL text
//! - [`MysqlConnectionFactory`]: builds a `mysql_async` pool from config
//! - [`MysqlConnection`]: executes statements and discovers schemas
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+ (`SHA2` and row constructors in `IN`)
//! - MariaDB 10.2+

mod connection;
mod dialect;

pub use connection::{MysqlConnection, MysqlConnectionFactory};
pub use dialect::MysqlDialect;
