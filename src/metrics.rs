//! Prometheus counters for cache traffic.
//!
//! Each [`CacheMetrics`] owns its own registry so several caches (and tests)
//! can coexist in one process without name clashes.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct CacheMetrics {
    registry: Registry,

    /// Hits by tier ("local" / "remote").
    pub hits_total: IntCounterVec,

    /// Misses by tier ("local" / "remote").
    pub misses_total: IntCounterVec,

    /// Loader invocations by mode ("take" / "once").
    pub loads_total: IntCounterVec,

    /// Entries deleted and reloaded after failing to decode.
    pub self_heals_total: IntCounter,
}

impl CacheMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let hits_total = IntCounterVec::new(
            Opts::new("tier_cache_hits_total", "Cache hits by tier"),
            &["tier"],
        )?;
        let misses_total = IntCounterVec::new(
            Opts::new("tier_cache_misses_total", "Cache misses by tier"),
            &["tier"],
        )?;
        let loads_total = IntCounterVec::new(
            Opts::new("tier_cache_loads_total", "Loader invocations by mode"),
            &["mode"],
        )?;
        let self_heals_total = IntCounter::new(
            "tier_cache_self_heals_total",
            "Entries deleted and reloaded after a decode failure",
        )?;

        registry.register(Box::new(hits_total.clone()))?;
        registry.register(Box::new(misses_total.clone()))?;
        registry.register(Box::new(loads_total.clone()))?;
        registry.register(Box::new(self_heals_total.clone()))?;

        Ok(Self {
            registry,
            hits_total,
            misses_total,
            loads_total,
            self_heals_total,
        })
    }

    pub fn hit(&self, tier: &str) {
        self.hits_total.with_label_values(&[tier]).inc();
    }

    pub fn miss(&self, tier: &str) {
        self.misses_total.with_label_values(&[tier]).inc();
    }

    pub fn load(&self, mode: &str) {
        self.loads_total.with_label_values(&[mode]).inc();
    }

    /// Render all counters in the Prometheus text exposition format.
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
