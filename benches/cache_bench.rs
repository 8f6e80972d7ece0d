//! Benchmarks for the cache engine.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde::{Deserialize, Serialize};

use tier_cache::cache::codec::Codec;
use tier_cache::cache::lfu::TinyLfu;
use tier_cache::cache::LocalCache;

#[derive(Clone, Serialize, Deserialize)]
struct Profile {
    id: u64,
    name: String,
    tags: Vec<String>,
}

fn profile() -> Profile {
    Profile {
        id: 42,
        name: "benchmark user".to_string(),
        tags: (0..16).map(|i| format!("tag-{i}")).collect(),
    }
}

fn bench_codec(c: &mut Criterion) {
    let codec = Codec::default();
    let value = profile();
    let encoded = codec.marshal(&value).unwrap();

    c.bench_function("codec_marshal_compressed", |b| {
        b.iter(|| black_box(codec.marshal(black_box(&value)).unwrap()))
    });

    c.bench_function("codec_unmarshal_compressed", |b| {
        b.iter(|| black_box(codec.unmarshal::<Profile>(black_box(&encoded)).unwrap()))
    });
}

fn bench_local(c: &mut Criterion) {
    let cache = LocalCache::new(10_000, 100_000);
    let encoded = Codec::default().marshal(&profile()).unwrap();
    for i in 0..10_000 {
        cache.set(&format!("k{i}"), encoded.clone(), Duration::from_secs(600));
    }

    let mut i = 0u64;
    c.bench_function("local_get_hit_10k", |b| {
        b.iter(|| {
            i = (i + 1) % 10_000;
            black_box(cache.get::<Profile>(&format!("k{i}")).ok());
        })
    });

    let mut j = 0u64;
    c.bench_function("local_set_churn", |b| {
        b.iter(|| {
            j += 1;
            cache.set(&format!("new{j}"), encoded.clone(), Duration::from_secs(600));
        })
    });
}

fn bench_lfu_insert(c: &mut Criterion) {
    c.bench_function("lfu_insert_100k_into_10k", |b| {
        b.iter(|| {
            let mut lfu = TinyLfu::new(10_000, 100_000);
            for i in 0..100_000u32 {
                black_box(lfu.insert(format!("k{}", i % 30_000), i));
            }
        })
    });
}

criterion_group!(benches, bench_codec, bench_local, bench_lfu_insert);
criterion_main!(benches);
