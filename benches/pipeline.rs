//! Benchmarks for the sighting pipeline: beacon classification, rate
//! limiting and the full BLE adapter path from advertisement to event.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::time::Duration;
use tag_bridge::event::Channel;
use tag_bridge::scanner::Advertisement;
use tag_bridge::source::ble::{BleAdapter, DEFAULT_COMPANY_ID};
use tag_bridge::{Broadcaster, RateLimiter, SharedRateLimiter, classify};

fn payload(body: &[u8]) -> Vec<u8> {
    let mut payload = DEFAULT_COMPANY_ID.to_le_bytes().to_vec();
    payload.extend_from_slice(body);
    payload
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    let cases = [
        ("identified", payload(b"UID:04A1B2C3D4E5F6")),
        ("idle", payload(b"IDLE")),
        ("unrecognized", payload(b"\x01\x02\x03\x04\x05\x06\x07\x08")),
        ("late_marker", payload(&[vec![0u8; 20], b"UID:ABCD".to_vec()].concat())),
    ];

    for (name, data) in &cases {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), data, |b, data| {
            b.iter(|| classify(black_box(data)))
        });
    }
    group.finish();
}

fn bench_rate_limiter(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiter");

    for tags in [1usize, 100, 10_000] {
        let ids: Vec<String> = (0..tags).map(|i| format!("{:08X}", i)).collect();
        group.throughput(Throughput::Elements(tags as u64));
        group.bench_with_input(BenchmarkId::new("accept", tags), &ids, |b, ids| {
            let mut limiter = RateLimiter::new(Duration::from_millis(5000));
            let mut now = 0u64;
            b.iter(|| {
                now += 1;
                for id in ids {
                    black_box(limiter.accept(id, now));
                }
            })
        });
    }
    group.finish();
}

fn bench_ble_adapter(c: &mut Criterion) {
    let broadcaster = Broadcaster::default();
    // Keep one subscriber so frames are actually delivered.
    let mut rx = broadcaster.subscribe(Channel::Public);
    let adapter = BleAdapter::new(
        DEFAULT_COMPANY_ID,
        SharedRateLimiter::new(Duration::from_millis(5000)),
        broadcaster,
    );
    let advertisement = Advertisement {
        address: Some("AA:BB:CC:DD:EE:FF".to_string()),
        manufacturer_data: payload(b"UID:04A1B2C3"),
    };

    c.bench_function("ble_adapter_handle", |b| {
        b.iter(|| {
            black_box(adapter.handle(black_box(&advertisement)));
            while rx.try_recv().is_ok() {}
        })
    });
}

criterion_group!(benches, bench_classify, bench_rate_limiter, bench_ble_adapter);
criterion_main!(benches);
