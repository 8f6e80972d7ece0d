//! tier-cache: a two-tier (local + remote) cache.
//!
//! A bounded, frequency-aware in-process tier sits in front of a shared
//! remote tier (Redis). Values are encoded once, compressed above a size
//! threshold, and concurrent misses of the same key can share one load.

pub mod cache;
pub mod config;
pub mod metrics;
pub mod registry;

pub use cache::{is_not_found, Cache, CacheError, Item, Options, SkipMode};
pub use registry::Registry;
