//! Error type surfaced by every cache operation.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cache::codec::CodecError;
use crate::registry::RegistryError;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The key is absent (or expired). Expected; not a failure.
    #[error("cache: key is missing")]
    CacheMiss,

    #[error("cache: cannot assign cached {found} to {expected}")]
    InvalidOutput {
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("cache: neither a local nor a remote tier is configured")]
    Configuration,

    #[error("Redis error: {0}")]
    Remote(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Failed to create Redis pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    #[error("Remote tier did not answer within {0:?}")]
    RemoteTimeout(Duration),

    #[error("Loader failed: {0}")]
    Loader(#[from] anyhow::Error),

    /// Outcome of a coalesced load, shared by every waiting caller.
    #[error(transparent)]
    Shared(Arc<CacheError>),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl CacheError {
    /// Whether this error only means "the key is not cached".
    pub fn is_not_found(&self) -> bool {
        match self {
            CacheError::CacheMiss => true,
            CacheError::Shared(inner) => inner.is_not_found(),
            _ => false,
        }
    }

    /// Whether cached bytes could not be turned into the requested type.
    pub(crate) fn is_corruption(&self) -> bool {
        match self {
            CacheError::Codec(_) | CacheError::InvalidOutput { .. } => true,
            CacheError::Shared(inner) => inner.is_corruption(),
            _ => false,
        }
    }
}

/// Returns `true` when `err` reports an absent key.
///
/// This is the only supported way to tell "not cached" apart from a broken
/// tier.
pub fn is_not_found(err: &CacheError) -> bool {
    err.is_not_found()
}
