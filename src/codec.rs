//! Object encoding for the blob column
//!
//! The engine never inspects stored objects; it round-trips them through a
//! [`Codec`] injected at construction. Two codecs are provided: JSON for
//! self-describing, debuggable blobs and bincode for compact binary ones.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, Result};

/// Encodes and decodes one object type to and from the stored blob.
pub trait Codec<T>: Send + Sync {
    /// Serialize an object into bytes for the `object` column.
    fn encode(&self, obj: &T) -> Result<Vec<u8>>;

    /// Deserialize an object from the `object` column.
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON codec. Blobs are human-readable, which makes the database file
/// inspectable with the `sqlite3` shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl<T: Serialize + DeserializeOwned> Codec<T> for JsonCodec {
    fn encode(&self, obj: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(obj).map_err(|e| CacheError::codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::codec(e.to_string()))
    }
}

/// Bincode codec for compact binary blobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    pub fn new() -> Self {
        Self
    }
}

impl<T: Serialize + DeserializeOwned> Codec<T> for BincodeCodec {
    fn encode(&self, obj: &T) -> Result<Vec<u8>> {
        bincode::serialize(obj).map_err(|e| CacheError::codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| CacheError::codec(e.to_string()))
    }
}
