//! Local tier behaviour: capacity, frequency-aware eviction, expiry.

use std::time::Duration;

use bytes::Bytes;

use tier_cache::cache::lfu::TinyLfu;
use tier_cache::cache::LocalCache;

#[test]
fn test_capacity_is_enforced() {
    let cache = LocalCache::new(100, 1000);
    for i in 0..1_000 {
        cache.set(&format!("k{i}"), Bytes::from_static(b"v"), Duration::ZERO);
    }
    assert!(cache.len() <= 100);
    assert!(!cache.is_empty());
}

#[test]
fn test_frequent_keys_survive_a_scan() {
    let mut lfu: TinyLfu<u32> = TinyLfu::new(100, 10_000);

    for i in 0..100u32 {
        lfu.insert(format!("hot{i}"), i);
    }
    for _ in 0..10 {
        for i in 0..100u32 {
            lfu.get(&format!("hot{i}"));
        }
    }

    // One pass of cold keys, each seen once.
    for i in 0..1_000u32 {
        lfu.insert(format!("cold{i}"), i);
    }

    let survivors = (0..100u32)
        .filter(|i| lfu.contains(&format!("hot{i}")))
        .count();
    assert!(survivors >= 90, "only {survivors} hot keys survived");
    assert!(lfu.len() <= lfu.capacity());
}

#[test]
fn test_replacing_a_key_keeps_one_entry() {
    let cache = LocalCache::new(10, 100);
    cache.set("k", Bytes::from_static(b"one"), Duration::ZERO);
    cache.set("k", Bytes::from_static(b"two"), Duration::ZERO);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get::<String>("k").unwrap().as_deref(), Some("two"));
}

#[test]
fn test_entries_expire() {
    let cache = LocalCache::new(10, 100);
    cache.set("k", Bytes::from_static(b"v"), Duration::from_millis(30));
    assert!(cache.has("k"));
    std::thread::sleep(Duration::from_millis(60));
    assert!(!cache.has("k"));
    assert!(cache.get::<String>("k").unwrap_err().is_not_found());
}

#[test]
fn test_same_ttl_writes_get_different_deadlines() {
    let cache = LocalCache::new(1_000, 10_000);
    for i in 0..50 {
        cache.set(&format!("k{i}"), Bytes::from_static(b"v"), Duration::from_secs(600));
    }

    let mut deadlines: Vec<Duration> = (0..50)
        .filter_map(|i| cache.remaining_ttl(&format!("k{i}")))
        .collect();
    deadlines.sort();
    deadlines.dedup();
    assert!(deadlines.len() > 40);
}
