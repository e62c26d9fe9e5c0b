//! Durable single-file store backed by redb.
//!
//! # Value layout
//!
//! ```text
//! [ expires_at_ms: u64 big-endian (8 bytes) | payload ]
//! ```
//!
//! `expires_at_ms == 0` means the entry never expires. Expired entries read as
//! absent and are removed on the next read that sees them.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use super::KvStore;
use crate::error::{Result, StorefrontError};

// ---------------------------------------------------------------------------
// Table definition
// ---------------------------------------------------------------------------

/// Key: UTF-8 store key. Value: expiry prefix ++ payload.
const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

const HEADER_LEN: usize = 8;

fn db_err(e: impl std::fmt::Display) -> StorefrontError {
    StorefrontError::Store(e.to_string())
}

fn encode(value: &[u8], ttl: Option<Duration>, now_ms: u64) -> Vec<u8> {
    let expires = match ttl {
        Some(t) => now_ms.saturating_add(t.as_millis() as u64).max(1),
        None => 0,
    };
    let mut buf = Vec::with_capacity(HEADER_LEN + value.len());
    buf.extend_from_slice(&expires.to_be_bytes());
    buf.extend_from_slice(value);
    buf
}

/// Payload of a stored record, or `None` when it has expired by `now_ms`.
fn decode(raw: &[u8], now_ms: u64) -> Result<Option<Vec<u8>>> {
    if raw.len() < HEADER_LEN {
        return Err(StorefrontError::Store("truncated kv record".into()));
    }
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&raw[..HEADER_LEN]);
    let expires = u64::from_be_bytes(header);
    if expires != 0 && now_ms >= expires {
        return Ok(None);
    }
    Ok(Some(raw[HEADER_LEN..].to_vec()))
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

// ---------------------------------------------------------------------------
// RedbKv
// ---------------------------------------------------------------------------

pub struct RedbKv {
    db: Arc<Database>,
}

impl RedbKv {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        // Ensure the table exists before any reads
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(ENTRIES).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn get_blocking(db: &Database, key: &str) -> Result<Option<Vec<u8>>> {
        let now = now_ms();
        let raw = {
            let rt = db.begin_read().map_err(db_err)?;
            let table = rt.open_table(ENTRIES).map_err(db_err)?;
            let guard = table.get(key).map_err(db_err)?;
            guard.map(|g| g.value().to_vec())
        };
        let Some(raw) = raw else {
            return Ok(None);
        };
        match decode(&raw, now)? {
            Some(v) => Ok(Some(v)),
            None => {
                Self::remove_if_expired(db, key)?;
                Ok(None)
            }
        }
    }

    /// Drop `key` only if the stored record is still expired; a concurrent put
    /// may have replaced it since the read.
    fn remove_if_expired(db: &Database, key: &str) -> Result<()> {
        let now = now_ms();
        let wt = db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(ENTRIES).map_err(db_err)?;
            let expired = match table.get(key).map_err(db_err)? {
                Some(g) => decode(g.value(), now)?.is_none(),
                None => false,
            };
            if expired {
                table.remove(key).map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    fn put_blocking(db: &Database, key: &str, record: &[u8]) -> Result<()> {
        let wt = db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(ENTRIES).map_err(db_err)?;
            table.insert(key, record).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    fn delete_blocking(db: &Database, key: &str) -> Result<()> {
        let wt = db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(ENTRIES).map_err(db_err)?;
            table.remove(key).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StorefrontError::Store(format!("task join error: {e}")))?
    }
}

#[async_trait]
impl KvStore for RedbKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.blocking(move |db| Self::get_blocking(db, &key)).await
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let key = key.to_string();
        let record = encode(value, ttl, now_ms());
        self.blocking(move |db| Self::put_blocking(db, &key, &record))
            .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |db| Self::delete_blocking(db, &key)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
