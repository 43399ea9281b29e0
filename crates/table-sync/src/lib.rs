//! # table-sync
//!
//! Content-hash based synchronization of one relational table against a
//! desired state.
//!
//! Every row is reduced to a SHA-256 digest of its canonically encoded
//! column values. Comparing the digest sets of the live table and the
//! desired rows classifies each primary key as unchanged, obsolete, stale or
//! new. Only the rows that differ are then deleted and reinserted:
//!
//! - **Row hashing** with an injective encoding (NULL distinct from `"NULL"`)
//! - **Keyed fetches** chunked to bound statement size
//! - **Diffing** by digest set difference
//! - **Batched writes** with deletes always preceding inserts
//! - **Server-side hashing** on MySQL so only digests cross the wire
//!
//! ## Example
//!
//! ```rust,no_run
//! use table_sync::{Config, MysqlConnectionFactory, TableConnection};
//!
//! #[tokio::main]
//! async fn main() -> table_sync::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let factory = MysqlConnectionFactory::new(&config.target)?;
//!     let table = TableConnection::open(&factory, "customers", config.sync).await?;
//!     println!("{}", table.fetch_table_hash().await?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod diff;
pub mod drivers;
pub mod error;
pub mod fetch;
pub mod hash;
pub mod orchestrator;
pub mod table;
pub mod writer;

// Re-exports for convenient access
pub use crate::config::{Config, ConnectionConfig, SyncConfig};
pub use crate::core::{Column, Connection, ConnectionFactory, Row, RowKey, SqlValue, TableSchema};
pub use crate::diff::{DiffResult, TableDiffEngine};
pub use crate::drivers::{MemoryDatabase, MysqlConnectionFactory};
pub use crate::error::{Result, SyncError};
pub use crate::fetch::KeyedFetcher;
pub use crate::hash::{HashIndex, HashLocation, RowHash, RowHasher, TableHash};
pub use crate::orchestrator::{ReplaceOutcome, SyncOrchestrator, SyncPlan, SyncReport};
pub use crate::table::TableConnection;
pub use crate::writer::BatchWriter;
