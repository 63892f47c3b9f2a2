mod file;
mod key;

use std::time::Duration;

use bytes::Bytes;

use crate::Result;

pub use file::FileCache;
pub use key::cache_key;

/// Key/value store of raw feed documents with last-write timestamps
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Whether a readable entry exists for the key
    async fn exists(&self, key: &str) -> bool;

    /// Time since the entry was last written; `Error::CacheMiss` if absent
    async fn age(&self, key: &str) -> Result<Duration>;

    /// Entry contents; `Error::CacheMiss` if absent
    async fn read(&self, key: &str) -> Result<Bytes>;

    /// Replace the entry as a whole, or create it
    async fn write(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Remove the entry. Removing a missing entry is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
