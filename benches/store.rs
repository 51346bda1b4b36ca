//! Criterion benchmarks for the store's hot paths.
//!
//! Run with:
//!   cargo bench --bench store
//!
//! All benchmarks run against the RAM-backed device, so the numbers
//! measure codec, index, and buffering overhead rather than flash
//! latency.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use norkv::{Config, Geometry, KvStore, MemDevice};

const REGION: u32 = 512 * 1024;

fn open_store() -> KvStore<MemDevice> {
    let device = MemDevice::new(
        REGION,
        Geometry {
            read_size: 4,
            program_size: 256,
            erase_size: 4096,
        },
    );
    KvStore::open(device, Config::new(0, REGION)).unwrap()
}

fn bench_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");

    for &value_size in &[32usize, 1024, 16 * 1024] {
        let value = vec![0x5Au8; value_size];

        // ── write: same key, forcing update records and periodic GC ────────
        {
            let store = open_store();
            group.throughput(Throughput::Bytes(value_size as u64));
            group.bench_with_input(
                BenchmarkId::new("write_update", value_size),
                &value,
                |b, value| {
                    b.iter(|| store.write("bench-key", value).unwrap())
                },
            );
        }

        // ── read: value streamed through the transaction buffer ────────────
        {
            let store = open_store();
            store.write("bench-key", &value).unwrap();
            let mut out = vec![0u8; value_size];
            group.throughput(Throughput::Bytes(value_size as u64));
            group.bench_with_input(
                BenchmarkId::new("read", value_size),
                &(),
                |b, _| {
                    b.iter(|| store.read("bench-key", &mut out).unwrap())
                },
            );
        }
    }

    // ── lookup cost across a populated index ────────────────────────────────
    {
        let store = open_store();
        for i in 0..200u32 {
            store.write(&format!("key-{i:04}"), &i.to_le_bytes()).unwrap();
        }
        group.bench_function("key_exists_200_keys", |b| {
            b.iter(|| store.key_exists("key-0137").unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write_read);
criterion_main!(benches);
