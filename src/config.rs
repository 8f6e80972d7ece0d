//! Runtime configuration for tier-cache.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! Every field has a default, so a partial file (or none at all) is valid.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::cache::local::DEFAULT_LOCAL_TTL;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "tier-cache", about = "Interactive shell over a two-tier cache")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name the cache registers under. Empty disables self-registration.
    pub driver_name: String,

    /// Collect remote-tier hit/miss statistics.
    pub stats: bool,

    /// Process-local tier.
    pub local: LocalConfig,

    /// Shared remote tier.
    pub remote: RemoteConfig,

    /// Value encoding.
    pub codec: CodecConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver_name: "default".to_string(),
            stats: true,
            local: LocalConfig::default(),
            remote: RemoteConfig::default(),
            codec: CodecConfig::default(),
        }
    }
}

/// Local (in-process) tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub enabled: bool,

    /// Maximum number of entries.
    pub size: usize,

    /// Accesses sampled by the frequency sketch before it ages.
    pub samples: usize,

    /// Default TTL in seconds (0 = tier default of one minute).
    pub ttl_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size: 10_000,
            samples: 100_000,
            ttl_secs: DEFAULT_LOCAL_TTL.as_secs(),
        }
    }
}

impl LocalConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Remote (Redis) tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,

    /// Redis connection URL (e.g. "redis://127.0.0.1:6379").
    pub url: String,

    /// Connection pool size.
    pub pool_size: usize,

    /// Per-command timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 16,
            timeout_ms: 500,
        }
    }
}

/// Codec settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// zstd compression level (1-22).
    pub zstd_level: i32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            zstd_level: zstd::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl CacheConfig {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: CacheConfig = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(CacheConfig::default())
        }
    }
}
