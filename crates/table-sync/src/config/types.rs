//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::normalize::DEFAULT_DELIMITER;
use crate::hash::HashLocation;

/// Default number of keys or rows per statement.
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store holding the desired state, for table-to-table sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ConnectionConfig>,

    /// Store holding the table being reconciled.
    pub target: ConnectionConfig,

    /// Sync behavior.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Connection settings for one MySQL/MariaDB store.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Store type (only "mysql" for now; MariaDB uses the same protocol).
    #[serde(default = "default_mysql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never written back out, so it does not end up in
    /// [`Config::hash`](super::Config::hash) or dumped configs.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// TLS mode: disable, prefer, require, verify-ca, verify-full
    /// (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl ConnectionConfig {
    /// Endpoint description for logs, without credentials.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Sync behavior configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Keys or rows per statement (default: 5000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Column delimiter of the canonical row encoding (default: '#').
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Where row digests are computed (default: server).
    #[serde(default)]
    pub hash_location: HashLocation,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            delimiter: DEFAULT_DELIMITER,
            hash_location: HashLocation::default(),
        }
    }
}

impl SyncConfig {
    /// Override the chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Override where row digests are computed.
    pub fn with_hash_location(mut self, hash_location: HashLocation) -> Self {
        self.hash_location = hash_location;
        self
    }

    /// Override the canonical encoding delimiter.
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }
}

fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_delimiter() -> char {
    DEFAULT_DELIMITER
}
