// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Converter Stream Benchmark
//!
//! Measures stream throughput:
//! - identity conversion with direct and buffered paths (read sizes)
//! - deflate compression and decompression through chained streams

#![allow(clippy::cast_possible_truncation)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box as bb;
use xstream::{
    Compression, ConverterInputStream, IdentityConverter, MemoryInput, ZlibCompressor,
    ZlibDecompressor, ZlibFormat,
};

const PAYLOAD: usize = 256 * 1024;

fn payload() -> Vec<u8> {
    (0..PAYLOAD).map(|i| ((i * 31) % 97) as u8).collect()
}

fn drain(stream: &ConverterInputStream, chunk: usize) -> usize {
    let mut buf = vec![0u8; chunk];
    let mut total = 0;
    while let Ok(n) = stream.read(&mut buf, None) {
        if n == 0 {
            break;
        }
        total += n;
    }
    total
}

fn bench_identity(c: &mut Criterion) {
    let data = payload();
    let mut group = c.benchmark_group("identity");
    group.throughput(Throughput::Bytes(PAYLOAD as u64));
    for chunk in [64usize, 4096, 65536] {
        group.bench_with_input(BenchmarkId::new("read", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let stream = ConverterInputStream::new(
                    MemoryInput::from_bytes(&data).with_read_limit(8192),
                    IdentityConverter,
                );
                bb(drain(&stream, chunk))
            });
        });
    }
    group.finish();
}

fn bench_zlib(c: &mut Criterion) {
    let data = payload();
    let compressed = {
        let packed = ConverterInputStream::new(MemoryInput::from_bytes(&data), ZlibCompressor::default());
        let mut out = Vec::new();
        let mut buf = vec![0u8; 16 * 1024];
        while let Ok(n) = packed.read(&mut buf, None) {
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    };

    let mut group = c.benchmark_group("zlib");
    group.throughput(Throughput::Bytes(PAYLOAD as u64));
    group.bench_function("compress_fast", |b| {
        b.iter(|| {
            let stream = ConverterInputStream::new(
                MemoryInput::from_bytes(&data),
                ZlibCompressor::new(ZlibFormat::Zlib, Compression::fast()),
            );
            bb(drain(&stream, 16 * 1024))
        });
    });
    group.bench_function("decompress", |b| {
        b.iter(|| {
            let stream = ConverterInputStream::new(MemoryInput::from_bytes(&compressed), ZlibDecompressor::default());
            bb(drain(&stream, 16 * 1024))
        });
    });
    group.bench_function("round_trip", |b| {
        b.iter(|| {
            let packed = ConverterInputStream::new(MemoryInput::from_bytes(&data), ZlibCompressor::default());
            let stream = ConverterInputStream::new(packed, ZlibDecompressor::default());
            bb(drain(&stream, 16 * 1024))
        });
    });
    group.finish();
}

criterion_group!(benches, bench_identity, bench_zlib);
criterion_main!(benches);
