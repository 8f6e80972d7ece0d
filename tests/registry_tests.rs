//! Building caches from configuration and resolving them by name.

use tier_cache::cache::{Cache, CacheError, Options};
use tier_cache::config::CacheConfig;
use tier_cache::registry::{Registry, RegistryError};

fn local_only(name: &str) -> CacheConfig {
    let mut config = CacheConfig::default();
    config.driver_name = name.to_string();
    config.local.size = 64;
    config.local.samples = 512;
    config
}

#[tokio::test]
async fn test_from_config_registers_driver() {
    let registry = Registry::new();
    let cache = Cache::from_config(&local_only("sessions"), &registry).unwrap();

    assert_eq!(registry.default_name().as_deref(), Some("sessions"));
    assert!(cache.local().is_some());
    assert!(cache.stats().is_some());

    registry.set("token", &"abc".to_string(), &Options::new()).await.unwrap();
    let mut out = String::new();
    registry.cache("sessions").unwrap().get("token", &mut out, &Options::new()).await.unwrap();
    assert_eq!(out, "abc");
}

#[tokio::test]
async fn test_duplicate_driver_is_rejected() {
    let registry = Registry::new();
    Cache::from_config(&local_only("main"), &registry).unwrap();

    let err = Cache::from_config(&local_only("main"), &registry).unwrap_err();
    assert!(matches!(
        err,
        CacheError::Registry(RegistryError::DuplicateDriverName(ref name)) if name == "main"
    ));
}

#[tokio::test]
async fn test_empty_driver_name_skips_registration() {
    let registry = Registry::new();
    Cache::from_config(&local_only(""), &registry).unwrap();
    assert!(registry.names().is_empty());
    assert!(matches!(
        registry.default_cache(),
        Err(RegistryError::NoDefaultDriver)
    ));
}

#[tokio::test]
async fn test_default_stays_with_first_driver() {
    let registry = Registry::new();
    let first = Cache::from_config(&local_only("first"), &registry).unwrap();
    Cache::from_config(&local_only("second"), &registry).unwrap();

    first.set("k", &1u32, &Options::new()).await.unwrap();
    assert!(registry.has("k", &Options::new()).await);
    assert_eq!(registry.names(), vec!["first", "second"]);
}

#[tokio::test]
async fn test_all_tiers_disabled_fails_on_use() {
    let registry = Registry::new();
    let mut config = local_only("empty");
    config.local.enabled = false;

    let cache = Cache::from_config(&config, &registry).unwrap();
    let err = cache.set("k", &1u32, &Options::new()).await.unwrap_err();
    assert!(matches!(err, CacheError::Configuration));
}
