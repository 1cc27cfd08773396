//! Benchmarks for frame encoding and decoding.
//!
//! Run with: cargo bench -p dramnet-proto

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dramnet_proto::{
    decode_read_response, decode_request, encode_read_response, encode_write_request,
};

fn bench_encode_write_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_write_request");

    for size in [64, 1024, 8192, 32768].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let value = vec![0xA5u8; size];
            b.iter(|| {
                let frame = encode_write_request(1, black_box(b"bench-key"), black_box(&value));
                black_box(frame.unwrap().len())
            });
        });
    }

    group.finish();
}

fn bench_decode_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_request");

    for size in [64, 1024, 8192, 32768].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let value = vec![0xA5u8; size];
            let frame = encode_write_request(1, b"bench-key", &value).unwrap();
            b.iter(|| black_box(decode_request(black_box(&frame)).unwrap()));
        });
    }

    group.finish();
}

fn bench_read_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_response");

    for size in [64, 1024, 8192, 32768].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let value = vec![0x5Au8; size];
            let frame = encode_read_response(1, Some(&value));
            b.iter(|| black_box(decode_read_response(black_box(&frame)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode_write_request,
    bench_decode_request,
    bench_read_response
);
criterion_main!(benches);
