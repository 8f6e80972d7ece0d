//! Remote tier contract.
//!
//! The orchestrator talks to the shared tier only through [`RemoteStore`],
//! so any networked or durable key-value store can back it. A zero TTL on
//! any write means "no expiry".
//!
//! [`MemoryStore`] is an in-process implementation, used in tests and for
//! single-node deployments without Redis.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::cache::error::CacheError;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Unconditional write.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// Write only if `key` exists. Returns whether the write happened.
    async fn set_if_exists(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool, CacheError>;

    /// Write only if `key` is absent. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool, CacheError>;

    /// Fetch `key`, failing with [`CacheError::CacheMiss`] when absent.
    async fn get(&self, key: &str) -> Result<Bytes, CacheError>;

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;

    /// Health check. Stores without a connection to check succeed.
    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[derive(Debug)]
struct StoredValue {
    data: Bytes,
    expire_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Bytes, ttl: Duration) -> Self {
        Self {
            data,
            expire_at: (!ttl.is_zero()).then(|| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expire_at.is_some_and(|at| at <= now)
    }
}

/// In-memory [`RemoteStore`]. Expired keys read as absent and are swept
/// out of the map on every write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, expired ones included until the next write.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remaining TTL of `key`; `Some(None)` for a key that never expires.
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        Some(
            entry
                .expire_at
                .map(|at| at.saturating_duration_since(Instant::now())),
        )
    }

    /// Drop every expired entry.
    fn sweep(entries: &mut HashMap<String, StoredValue>) {
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));
    }

    /// Whether `key` holds an unexpired value, purging it if expired.
    fn live(entries: &mut HashMap<String, StoredValue>, key: &str) -> bool {
        match entries.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                entries.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries);
        entries.insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn set_if_exists(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries);
        if !Self::live(&mut entries, key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(true)
    }

    async fn set_if_absent(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries);
        if Self::live(&mut entries, key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Bytes, CacheError> {
        let mut entries = self.entries.lock();
        if !Self::live(&mut entries, key) {
            return Err(CacheError::CacheMiss);
        }
        entries
            .get(key)
            .map(|entry| entry.data.clone())
            .ok_or(CacheError::CacheMiss)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}
