//! Core abstractions shared by the sync engine and its collaborators.
//!
//! - [`schema`]: table and column metadata
//! - [`value`]: SQL value representation
//! - [`row`]: rows, primary key tuples and result sets
//! - [`statement`]: typed statements rendered by a dialect
//! - [`traits`]: connection, schema provider, factory and dialect traits
//! - [`identifier`]: identifier validation, quoting and string escaping

pub mod identifier;
pub mod row;
pub mod schema;
pub mod statement;
pub mod traits;
pub mod value;

pub use row::{KeyValue, Row, RowKey, RowSet};
pub use schema::{Column, TableSchema};
pub use statement::{KeyFilter, Page, Statement, ROW_HASH_COLUMN};
pub use traits::{Connection, ConnectionFactory, Dialect, SchemaProvider};
pub use value::SqlValue;
