//! Shared memory channel benchmarks.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use shmx_bench::attached_pair;
use shmx_channel::MAX_PACKET_LEN;
use std::hint::black_box;

fn benchmark_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");

    for size in [64usize, 4096, MAX_PACKET_LEN] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("echo_{size}b"), |b| {
            let mut pair = attached_pair().unwrap();
            let payload = vec![0xA5u8; size];
            let mut buf = vec![0u8; MAX_PACKET_LEN];

            b.iter(|| {
                pair.slave.write(black_box(&payload)).unwrap();
                let n = pair.master.read(&mut buf).unwrap();
                pair.master.write(&buf[..n]).unwrap();
                black_box(pair.slave.read(&mut buf).unwrap())
            });
        });
    }

    group.finish();
}

fn benchmark_one_way(c: &mut Criterion) {
    let mut group = c.benchmark_group("one_way");
    group.throughput(Throughput::Elements(1));

    group.bench_function("send_recv_4k", |b| {
        let mut pair = attached_pair().unwrap();
        let payload = vec![0x5Au8; 4096];
        let mut buf = vec![0u8; 4096];

        b.iter(|| {
            pair.slave.write(black_box(&payload)).unwrap();
            black_box(pair.master.read(&mut buf).unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_round_trip, benchmark_one_way);
criterion_main!(benches);
