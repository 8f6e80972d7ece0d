//! Two-tier cache.
//!
//! This module contains the cache engine, leaves first:
//! - [`codec`]: value encoding with size-gated zstd compression
//! - [`sketch`]: count-min sketch and doorkeeper for frequency estimation
//! - [`lfu`]: W-TinyLFU admission and eviction
//! - [`local`]: process-local tier with expiry jitter
//! - [`remote`]: remote tier contract and an in-memory implementation
//! - [`redis`]: Redis-backed remote tier
//! - [`group`]: per-key request coalescing
//! - [`tiered`]: the orchestrator combining both tiers

pub mod codec;
pub mod error;
pub mod group;
pub mod lfu;
pub mod local;
pub mod options;
pub mod raw;
pub mod redis;
pub mod remote;
pub mod sketch;
pub mod stats;
pub mod tiered;

pub use error::{is_not_found, CacheError};
pub use local::LocalCache;
pub use options::{Condition, Item, Options, SkipMode};
pub use remote::{MemoryStore, RemoteStore};
pub use stats::StatsSnapshot;
pub use tiered::{Cache, CacheValue};
