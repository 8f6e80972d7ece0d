//! Named cache drivers.
//!
//! Host applications register one [`Cache`] per backing configuration and
//! look them up by name. The first successful registration becomes the
//! default driver, which the delegating `get`/`set`/`has`/`del` use.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

use crate::cache::error::CacheError;
use crate::cache::options::Options;
use crate::cache::tiered::{Cache, CacheValue};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry: driver name must not be empty")]
    EmptyDriverName,

    #[error("registry: driver {0:?} is already registered")]
    DuplicateDriverName(String),

    #[error("registry: driver {0:?} is not registered")]
    DriverNotRegistered(String),

    #[error("registry: no default driver")]
    NoDefaultDriver,
}

#[derive(Default)]
struct Drivers {
    by_name: HashMap<String, Arc<Cache>>,
    default: Option<String>,
}

#[derive(Default)]
pub struct Registry {
    drivers: RwLock<Drivers>,
}

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

/// Process-wide registry. Drivers live as long as the process.
pub fn global() -> &'static Registry {
    &GLOBAL
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `cache` under `name`. The first driver registered becomes the default.
    pub fn register(&self, name: &str, cache: Arc<Cache>) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyDriverName);
        }

        let mut drivers = self.drivers.write();
        if drivers.by_name.contains_key(name) {
            return Err(RegistryError::DuplicateDriverName(name.to_string()));
        }
        drivers.by_name.insert(name.to_string(), cache);

        let is_default = drivers.default.is_none();
        if is_default {
            drivers.default = Some(name.to_string());
        }
        info!(driver = %name, default = is_default, "Cache driver registered");
        Ok(())
    }

    pub fn cache(&self, name: &str) -> Result<Arc<Cache>, RegistryError> {
        self.drivers
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::DriverNotRegistered(name.to_string()))
    }

    pub fn default_cache(&self) -> Result<Arc<Cache>, RegistryError> {
        let drivers = self.drivers.read();
        drivers
            .default
            .as_ref()
            .and_then(|name| drivers.by_name.get(name))
            .cloned()
            .ok_or(RegistryError::NoDefaultDriver)
    }

    pub fn default_name(&self) -> Option<String> {
        self.drivers.read().default.clone()
    }

    /// Registered driver names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.read().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn get<T: CacheValue>(&self, key: &str, dest: &mut T, opts: &Options) -> Result<(), CacheError> {
        self.default_cache()?.get(key, dest, opts).await
    }

    pub async fn set<T: CacheValue>(&self, key: &str, value: &T, opts: &Options) -> Result<(), CacheError> {
        self.default_cache()?.set(key, value, opts).await
    }

    /// `false` when there is no default driver.
    pub async fn has(&self, key: &str, opts: &Options) -> bool {
        match self.default_cache() {
            Ok(cache) => cache.has(key, opts).await,
            Err(_) => false,
        }
    }

    pub async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.default_cache()?.del(key).await
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .field("default", &self.default_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::local::LocalCache;

    fn local_cache() -> Arc<Cache> {
        Arc::new(Cache::new().with_local(LocalCache::new(16, 128)))
    }

    #[test]
    fn test_first_registration_is_default() {
        let registry = Registry::new();
        assert!(registry.default_name().is_none());

        registry.register("primary", local_cache()).unwrap();
        registry.register("secondary", local_cache()).unwrap();

        assert_eq!(registry.default_name().as_deref(), Some("primary"));
        assert_eq!(registry.names(), vec!["primary", "secondary"]);
    }

    #[test]
    fn test_rejects_bad_names() {
        let registry = Registry::new();
        assert_eq!(
            registry.register("", local_cache()),
            Err(RegistryError::EmptyDriverName)
        );
        registry.register("a", local_cache()).unwrap();
        assert_eq!(
            registry.register("a", local_cache()),
            Err(RegistryError::DuplicateDriverName("a".into()))
        );
        assert!(matches!(
            registry.cache("missing"),
            Err(RegistryError::DriverNotRegistered(_))
        ));
    }

    #[tokio::test]
    async fn test_delegates_to_default() {
        let registry = Registry::new();
        let mut out = String::new();
        let err = registry.get("k", &mut out, &Options::new()).await.unwrap_err();
        assert!(matches!(err, CacheError::Registry(RegistryError::NoDefaultDriver)));

        let cache = local_cache();
        registry.register("main", cache.clone()).unwrap();
        registry.set("k", &"v".to_string(), &Options::new()).await.unwrap();
        assert!(registry.has("k", &Options::new()).await);

        cache.get("k", &mut out, &Options::new()).await.unwrap();
        assert_eq!(out, "v");

        registry.del("k").await.unwrap();
        assert!(!registry.has("k", &Options::new()).await);
    }
}
