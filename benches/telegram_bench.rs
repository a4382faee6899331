// SPDX-License-Identifier: Apache-2.0

//! Benchmarks for telegram checksumming and byte-stream parsing.
//!
//! Measures:
//! - CRC-16 throughput over measurement-sized telegram bodies
//! - Full parser throughput feeding measurement telegrams byte by byte,
//!   as the serial read loop does
//!
//! Run with: cargo bench --bench telegram_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use sicklms::telegram::{crc16, Frame, Telegram, TelegramReader, DEVICE_ADDRESS};

/// Build an encoded measurement (0xB0) telegram carrying `count` range
/// values, the dominant traffic on a live link.
fn scan_telegram(count: usize) -> Vec<u8> {
    let mut payload = vec![0xB0];
    payload.extend_from_slice(&(count as u16).to_le_bytes());
    for i in 0..count {
        payload.extend_from_slice(&((i % 8000) as u16).to_le_bytes());
    }
    Telegram {
        address: DEVICE_ADDRESS,
        payload,
    }
    .encode()
}

fn bench_crc16(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc16");

    // 181 values is a 180°/1° scan, 721 is 180°/0.25°.
    for count in [181usize, 361, 721] {
        let telegram = scan_telegram(count);
        let body = &telegram[..telegram.len() - 2];

        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), body, |b, body| {
            b.iter(|| crc16(std::hint::black_box(body)));
        });
    }

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_scan_telegram");

    for count in [181usize, 361, 721] {
        let telegram = scan_telegram(count);

        group.throughput(Throughput::Bytes(telegram.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(count),
            &telegram,
            |b, telegram| {
                let mut reader = TelegramReader::new();
                b.iter(|| {
                    let mut parsed = 0;
                    for &byte in telegram {
                        if let Ok(Some(Frame::Telegram(t))) = reader.push(byte) {
                            parsed += t.payload.len();
                        }
                    }
                    parsed
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_crc16, bench_parse);
criterion_main!(benches);
