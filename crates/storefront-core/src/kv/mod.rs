//! Key-value store abstraction shared by the catalog and the publish scheduler.
//!
//! Backends are allowed to be eventually consistent and offer no
//! compare-and-swap: callers only rely on `get`, `put` (with an optional TTL)
//! and `delete`.

pub mod cloudflare;
pub mod disk;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::config::StoreConfig;
use crate::error::Result;

pub use cloudflare::CloudflareKv;
pub use disk::RedbKv;
pub use memory::MemoryKv;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value. With `ttl`
    /// set the entry disappears once it elapses.
    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// Remove `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Read and decode a JSON value.
pub async fn get_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub async fn put_json<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.put(key, &bytes, ttl).await
}

/// Build the store selected by `config`.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn KvStore>> {
    let store: Arc<dyn KvStore> = match config {
        StoreConfig::Memory => Arc::new(MemoryKv::new()),
        StoreConfig::Redb { path } => Arc::new(RedbKv::open(path)?),
        StoreConfig::Cloudflare {
            account_id,
            namespace_id,
            api_token,
            api_base,
        } => Arc::new(CloudflareKv::new(
            api_base,
            account_id,
            namespace_id,
            api_token,
        )?),
    };
    Ok(store)
}
