//! Two-tier cache orchestrator.
//!
//! Reads go local first, then remote. A remote hit is copied back into the
//! local tier. Writes encode the value once and store it in every tier the
//! call does not skip. `take` and `once` add get-or-compute on top, with
//! `once` collapsing concurrent misses of a key into a single loader run.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::codec::Codec;
use crate::cache::error::CacheError;
use crate::cache::group::Group;
use crate::cache::local::LocalCache;
use crate::cache::options::{Condition, Item, Options, SkipMode};
use crate::cache::raw::RawValue;
use crate::cache::redis::RedisStore;
use crate::cache::remote::RemoteStore;
use crate::cache::stats::{Stats, StatsSnapshot};
use crate::config::CacheConfig;
use crate::metrics::CacheMetrics;
use crate::registry::Registry;

/// Anything the cache can store: encodable, decodable and shareable across tasks.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Outcome of one coalesced load: the encoded value, shared by every waiter.
type Flight = Result<Bytes, Arc<CacheError>>;

pub struct Cache {
    local: Option<LocalCache>,
    remote: Option<Arc<dyn RemoteStore>>,
    stats: Option<Stats>,
    codec: Codec,
    group: Group<Flight>,
    metrics: Option<CacheMetrics>,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            local: None,
            remote: None,
            stats: None,
            codec: Codec::default(),
            group: Group::new(),
            metrics: None,
        }
    }
}

impl Cache {
    /// A cache with no tiers. Attach at least one before use; otherwise every
    /// operation fails with [`CacheError::Configuration`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local(mut self, local: LocalCache) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Count remote-tier hits and misses.
    pub fn with_stats(mut self) -> Self {
        self.stats = Some(Stats::new());
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build a cache from configuration.
    ///
    /// When `driver_name` is non-empty the cache is also registered in
    /// `registry` under that name.
    pub fn from_config(config: &CacheConfig, registry: &Registry) -> Result<Arc<Self>, CacheError> {
        let codec = Codec::new(config.codec.zstd_level);
        let mut cache = Cache::new().with_codec(codec.clone());

        if config.local.enabled {
            cache = cache.with_local(
                LocalCache::new(config.local.size, config.local.samples)
                    .with_ttl(config.local.ttl())
                    .with_codec(codec),
            );
        }
        if config.remote.enabled {
            cache = cache.with_remote(Arc::new(RedisStore::connect(&config.remote)?));
        }
        if config.stats {
            cache = cache.with_stats();
        }
        match CacheMetrics::new() {
            Ok(metrics) => cache = cache.with_metrics(metrics),
            Err(err) => warn!(error = %err, "cache metrics unavailable"),
        }

        info!(
            driver = %config.driver_name,
            local = config.local.enabled,
            local_size = config.local.size,
            remote = config.remote.enabled,
            stats = config.stats,
            "Cache initialized"
        );

        let cache = Arc::new(cache);
        if !config.driver_name.is_empty() {
            registry.register(&config.driver_name, cache.clone())?;
        }
        Ok(cache)
    }

    pub fn local(&self) -> Option<&LocalCache> {
        self.local.as_ref()
    }

    pub fn metrics(&self) -> Option<&CacheMetrics> {
        self.metrics.as_ref()
    }

    /// Remote hit/miss counts, or `None` when stats are disabled.
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.stats.as_ref().map(Stats::snapshot)
    }

    pub fn reset_stats(&self) {
        if let Some(stats) = &self.stats {
            stats.reset();
        }
    }

    /// Read `key` into `dest`.
    ///
    /// A stored nil value succeeds and leaves `dest` untouched. An absent key
    /// fails with [`CacheError::CacheMiss`].
    pub async fn get<T: CacheValue>(&self, key: &str, dest: &mut T, opts: &Options) -> Result<(), CacheError> {
        if let Some(value) = self.get_value::<T>(key, opts).await? {
            *dest = value;
        }
        Ok(())
    }

    /// Encode `value` and store it in every tier not skipped.
    ///
    /// With [`SkipMode::ALL`] the value is encoded and then dropped, which
    /// validates it without storing anything.
    pub async fn set<T: CacheValue>(&self, key: &str, value: &T, opts: &Options) -> Result<(), CacheError> {
        let data = self.codec.marshal(value)?;
        self.store(key, value, data, opts).await
    }

    /// Whether a read of `key` would succeed.
    pub async fn has(&self, key: &str, opts: &Options) -> bool {
        if opts.skip.is(SkipMode::ALL) || self.check_tiers().is_err() {
            return false;
        }
        if !opts.skip.is(SkipMode::LOCAL) && self.local.as_ref().is_some_and(|l| l.has(key)) {
            return true;
        }
        self.fetch_remote(key, opts).await.is_ok()
    }

    /// Remove `key` from both tiers.
    pub async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.check_tiers()?;
        self.delete_from(key, SkipMode::NONE).await
    }

    /// Check the remote tier is reachable. Succeeds when there is none.
    pub async fn ping(&self) -> Result<(), CacheError> {
        match &self.remote {
            Some(remote) => remote.ping().await,
            None => Ok(()),
        }
    }

    /// Remove `key` from the local tier only.
    pub fn delete_local(&self, key: &str) {
        if let Some(local) = &self.local {
            local.del(key);
        }
    }

    /// Get-or-compute. Every caller that misses runs the loader.
    pub async fn take<T: CacheValue>(&self, item: &Item<T>, dest: &mut T) -> Result<(), CacheError> {
        let key = item.key.as_str();
        let mut healed = false;
        loop {
            match self.get_value::<T>(key, &item.options).await {
                Ok(Some(value)) => {
                    *dest = value;
                    return Ok(());
                }
                Ok(None) => return Ok(()),
                Err(err) if err.is_not_found() => break,
                Err(err) if err.is_corruption() && !healed => {
                    self.heal(key, &item.options, &err).await?;
                    healed = true;
                }
                Err(err) => return Err(err),
            }
        }

        let value = self.produce(item, "take").await?;
        self.set(key, &value, &item.options).await?;
        *dest = value;
        Ok(())
    }

    /// Get-or-compute with concurrent misses of the same key sharing one
    /// loader run.
    pub async fn once<T: CacheValue>(&self, item: &Item<T>, dest: &mut T) -> Result<(), CacheError> {
        let key = item.key.as_str();
        match self.get_value::<T>(key, &item.options).await {
            Ok(Some(value)) => {
                *dest = value;
                return Ok(());
            }
            Ok(None) => return Ok(()),
            // Undecodable entries are dropped inside the flight, by one caller only.
            Err(err) if err.is_not_found() || err.is_corruption() => {}
            Err(err) => return Err(err),
        }

        let (flight, shared) = self.group.work(key, || self.flight(item)).await;
        if shared {
            debug!(key = %key, "joined in-flight load");
        }

        let data = flight.map_err(CacheError::Shared)?;
        if let Some(value) = self.codec.unmarshal::<T>(&data)? {
            *dest = value;
        }
        Ok(())
    }

    /// [`once`](Self::once) when the item asks for coalescing, otherwise
    /// [`take`](Self::take).
    pub async fn load<T: CacheValue>(&self, item: &Item<T>, dest: &mut T) -> Result<(), CacheError> {
        if item.options.group {
            self.once(item, dest).await
        } else {
            self.take(item, dest).await
        }
    }

    fn check_tiers(&self) -> Result<(), CacheError> {
        if self.local.is_none() && self.remote.is_none() {
            return Err(CacheError::Configuration);
        }
        Ok(())
    }

    async fn get_value<T: CacheValue>(&self, key: &str, opts: &Options) -> Result<Option<T>, CacheError> {
        if opts.skip.is(SkipMode::ALL) {
            return Err(CacheError::CacheMiss);
        }
        self.check_tiers()?;

        if !opts.skip.is(SkipMode::LOCAL) {
            if let Some(local) = &self.local {
                match local.get::<T>(key) {
                    Err(err) if err.is_not_found() => {
                        debug!(key = %key, tier = "local", "cache miss");
                        self.record("local", false);
                    }
                    found => {
                        debug!(key = %key, tier = "local", "cache hit");
                        self.record("local", true);
                        return found;
                    }
                }
            }
        }

        let data = self.fetch_remote(key, opts).await?;
        Ok(self.codec.unmarshal::<T>(&data)?)
    }

    /// Remote lookup with stats and local backfill.
    async fn fetch_remote(&self, key: &str, opts: &Options) -> Result<Bytes, CacheError> {
        if opts.skip.is(SkipMode::REMOTE) {
            return Err(CacheError::CacheMiss);
        }
        let Some(remote) = &self.remote else {
            return Err(CacheError::CacheMiss);
        };

        let data = match remote.get(key).await {
            Ok(data) => data,
            Err(err) => {
                if let Some(stats) = &self.stats {
                    stats.record_miss();
                }
                self.record("remote", false);
                if err.is_not_found() {
                    debug!(key = %key, tier = "remote", "cache miss");
                } else {
                    warn!(key = %key, error = %err, "remote tier read failed");
                }
                return Err(err);
            }
        };
        if let Some(stats) = &self.stats {
            stats.record_hit();
        }
        self.record("remote", true);

        if !opts.skip.is(SkipMode::LOCAL) {
            if let Some(local) = &self.local {
                local.set(key, data.clone(), opts.expiration());
                debug!(key = %key, bytes = data.len(), "backfilled local tier");
            }
        }
        Ok(data)
    }

    async fn store<T: CacheValue>(&self, key: &str, value: &T, data: Bytes, opts: &Options) -> Result<(), CacheError> {
        if opts.skip.is(SkipMode::ALL) {
            debug!(key = %key, bytes = data.len(), "dry-run set, nothing stored");
            return Ok(());
        }
        self.check_tiers()?;
        let ttl = opts.expiration();

        if !opts.skip.is(SkipMode::LOCAL) {
            if let Some(local) = &self.local {
                if opts.raw {
                    local.set_raw(key, RawValue::from_value(value), ttl);
                } else {
                    local.set(key, data.clone(), ttl);
                }
            }
        }

        if opts.skip.is(SkipMode::REMOTE) {
            return Ok(());
        }
        let Some(remote) = &self.remote else {
            return Ok(());
        };

        let applied = match opts.condition {
            Condition::Always => {
                remote.set(key, data, ttl).await?;
                true
            }
            Condition::IfExists => remote.set_if_exists(key, data, ttl).await?,
            Condition::IfAbsent => remote.set_if_absent(key, data, ttl).await?,
        };
        if !applied {
            // The remote copy is authoritative; don't serve the rejected value locally.
            self.delete_local(key);
            debug!(key = %key, condition = ?opts.condition, "conditional remote write not applied");
        }
        Ok(())
    }

    async fn delete_from(&self, key: &str, skip: SkipMode) -> Result<(), CacheError> {
        if !skip.is(SkipMode::LOCAL) {
            self.delete_local(key);
        }
        if !skip.is(SkipMode::REMOTE) {
            if let Some(remote) = &self.remote {
                remote.delete(&[key.to_string()]).await?;
            }
        }
        Ok(())
    }

    /// Drop an entry that no longer decodes so the next attempt reloads it.
    async fn heal(&self, key: &str, opts: &Options, err: &CacheError) -> Result<(), CacheError> {
        warn!(key = %key, error = %err, "cached value failed to decode, deleting and reloading");
        if let Some(metrics) = &self.metrics {
            metrics.self_heals_total.inc();
        }
        self.delete_from(key, opts.skip).await
    }

    async fn produce<T: CacheValue>(&self, item: &Item<T>, mode: &str) -> Result<T, CacheError> {
        if let Some(metrics) = &self.metrics {
            metrics.load(mode);
        }
        match &item.loader {
            Some(loader) => Ok(loader().await?),
            None => item.value.clone().ok_or(CacheError::CacheMiss),
        }
    }

    async fn flight<T: CacheValue>(&self, item: &Item<T>) -> Flight {
        self.load_encoded(item).await.map_err(Arc::new)
    }

    /// Body of a coalesced load. Re-reads first so a caller arriving just
    /// after a previous flight finished picks up its result. An entry that
    /// fails to decode is deleted and replaced by a fresh load.
    async fn load_encoded<T: CacheValue>(&self, item: &Item<T>) -> Result<Bytes, CacheError> {
        let key = item.key.as_str();
        match self.get_value::<T>(key, &item.options).await {
            Ok(Some(value)) => return Ok(self.codec.marshal(&value)?),
            Ok(None) => return Ok(Bytes::new()),
            Err(err) if err.is_not_found() => {}
            Err(err) if err.is_corruption() => self.heal(key, &item.options, &err).await?,
            Err(err) => return Err(err),
        }

        let value = self.produce(item, "once").await?;
        let data = self.codec.marshal(&value)?;
        self.store(key, &value, data.clone(), &item.options).await?;
        Ok(data)
    }

    fn record(&self, tier: &str, hit: bool) {
        if let Some(metrics) = &self.metrics {
            if hit {
                metrics.hit(tier);
            } else {
                metrics.miss(tier);
            }
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("local", &self.local)
            .field("remote", &self.remote.is_some())
            .field("stats", &self.stats())
            .field("codec", &self.codec)
            .finish()
    }
}
