//! Process-local tier: a mutex-guarded TinyLFU store with per-entry expiry.
//!
//! Entries carry their own deadline. To keep entries written together from
//! expiring together, every TTL is shortened by a random jitter of up to a
//! tenth of its length (at most 10s when the TTL is at or above the tier
//! default).

use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::cache::codec::Codec;
use crate::cache::error::CacheError;
use crate::cache::lfu::TinyLfu;
use crate::cache::raw::RawValue;

/// TTL used when neither the tier nor the caller picks one.
pub const DEFAULT_LOCAL_TTL: Duration = Duration::from_secs(60);

/// Upper bound on the jitter subtracted from TTLs at or above the default.
const MAX_JITTER: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
enum Stored {
    Encoded(Bytes),
    Raw(RawValue),
}

#[derive(Debug)]
struct Entry {
    value: Stored,
    expire_at: Instant,
}

/// Fixed-capacity, approximate-LFU local cache.
pub struct LocalCache {
    store: Mutex<TinyLfu<Entry>>,
    size: usize,
    samples: usize,
    ttl: Duration,
    codec: Codec,
}

impl LocalCache {
    /// Hold up to `size` entries, estimating popularity over `samples` accesses.
    pub fn new(size: usize, samples: usize) -> Self {
        Self {
            store: Mutex::new(TinyLfu::new(size, samples)),
            size,
            samples,
            ttl: DEFAULT_LOCAL_TTL,
            codec: Codec::default(),
        }
    }

    /// Override the default TTL. A zero TTL keeps the current default.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        if !ttl.is_zero() {
            self.ttl = ttl;
        }
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.ttl
    }

    /// Fetch and decode `key`.
    ///
    /// `Ok(None)` means the key holds an empty (nil) value.
    pub fn get<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let stored = {
            let mut store = self.store.lock();
            let now = Instant::now();
            let hit = match store.get(key) {
                None => return Err(CacheError::CacheMiss),
                Some(entry) if entry.expire_at <= now => None,
                Some(entry) => Some(entry.value.clone()),
            };
            match hit {
                Some(stored) => stored,
                None => {
                    store.remove(key);
                    debug!(key = %key, "local entry expired");
                    return Err(CacheError::CacheMiss);
                }
            }
        };

        match stored {
            Stored::Encoded(bytes) => Ok(self.codec.unmarshal(&bytes)?),
            Stored::Raw(raw) => raw.extract().map(Some),
        }
    }

    /// Store already-encoded bytes.
    pub fn set(&self, key: &str, value: Bytes, ttl: Duration) {
        self.insert(key, Stored::Encoded(value), ttl);
    }

    /// Store a native value, bypassing the codec.
    pub fn set_raw(&self, key: &str, value: RawValue, ttl: Duration) {
        self.insert(key, Stored::Raw(value), ttl);
    }

    /// Whether `key` holds an unexpired entry. Does not count as an access.
    pub fn has(&self, key: &str) -> bool {
        let store = self.store.lock();
        store
            .peek(key)
            .is_some_and(|entry| entry.expire_at > Instant::now())
    }

    pub fn del(&self, key: &str) {
        self.store.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Drop every entry, reallocating the store with the same parameters.
    pub fn clean(&self) {
        *self.store.lock() = TinyLfu::new(self.size, self.samples);
    }

    /// Time until `key` expires, if it is present.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let store = self.store.lock();
        store
            .peek(key)
            .map(|entry| entry.expire_at.saturating_duration_since(Instant::now()))
    }

    fn insert(&self, key: &str, value: Stored, ttl: Duration) {
        let expire_at = Instant::now() + self.jittered(ttl);
        let evicted = self
            .store
            .lock()
            .insert(key.to_string(), Entry { value, expire_at });

        if let Some((evicted_key, _)) = evicted {
            debug!(key = %key, evicted = %evicted_key, "local tier evicted entry");
        }
    }

    /// Apply the default to a zero TTL, then subtract a random jitter.
    ///
    /// The result is always in `(ttl - ttl/10, ttl]`, so never zero for a
    /// non-zero TTL.
    pub(crate) fn jittered(&self, ttl: Duration) -> Duration {
        let ttl = if ttl.is_zero() { self.ttl } else { ttl };

        let offset = (ttl / 10).min(MAX_JITTER);
        let span = if ttl >= self.ttl && !offset.is_zero() {
            offset
        } else {
            ttl / 10
        };

        let span_nanos = u64::try_from(span.as_nanos()).unwrap_or(u64::MAX);
        if span_nanos == 0 {
            return ttl;
        }
        let jitter = rand::thread_rng().gen_range(0..span_nanos);
        ttl - Duration::from_nanos(jitter)
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("size", &self.size)
            .field("samples", &self.samples)
            .field("ttl", &self.ttl)
            .finish()
    }
}
