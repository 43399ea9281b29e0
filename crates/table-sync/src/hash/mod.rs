//! Content hashing of rows and tables.
//!
//! - [`RowHasher`] turns a row into a [`RowHash`] using the canonical encoding
//!   from [`normalize`]
//! - [`HashIndex`] maps row digests to primary keys for one table snapshot
//! - [`TableHash`] aggregates every row digest of a table into one value
//!
//! Row digests are SHA-256. Two distinct rows that collide keep only one
//! entry in a [`HashIndex`]; collisions are not detected.

mod hasher;
mod index;
pub mod normalize;

pub use hasher::RowHasher;
pub use index::HashIndex;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{Result, SyncError};

/// Where row digests are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashLocation {
    /// The store computes digests; only keys and digests travel.
    #[default]
    Server,
    /// Full rows are streamed and hashed locally.
    Client,
}

/// SHA-256 digest of one row's canonical encoding.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowHash(pub [u8; 32]);

impl RowHash {
    /// Digest arbitrary canonical bytes.
    pub fn digest(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Lowercase hex form, as produced by `SHA2(..., 256)`.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for RowHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowHash({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for RowHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for RowHash {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes).map_err(|e| {
            SyncError::schema_mismatch(format!("invalid row digest {:?}: {}", s, e))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for RowHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RowHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// SHA-256 aggregate over every row digest of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableHash(pub [u8; 32]);

impl TableHash {
    /// Aggregate row digests.
    ///
    /// Hex digests are sorted before concatenation so the result does not
    /// depend on the order in which the store returned rows.
    pub fn aggregate<I>(hashes: I) -> Self
    where
        I: IntoIterator<Item = RowHash>,
    {
        let mut hashes: Vec<RowHash> = hashes.into_iter().collect();
        hashes.sort_unstable();

        let mut hasher = Sha256::new();
        for hash in &hashes {
            hasher.update(hash.to_hex().as_bytes());
        }
        Self(hasher.finalize().into())
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TableHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for TableHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}
