//! Protocol encoding/decoding benchmarks.

use chrono::{DateTime, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use layrz_protocol::packet::{
    AcPacket, CommandDefinition, PacketBody, PdPacket, Position,
};
use layrz_protocol::{checksum, ArgumentMap, Decoder, Packet};

fn timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
}

fn create_test_args(count: usize) -> ArgumentMap {
    (0..count)
        .map(|i| match i % 4 {
            0 => (format!("io{}.di", i), i.to_string()),
            1 => (format!("sensor{}.value", i), format!("{}.5", i)),
            2 => (format!("flag{}", i), "true".to_string()),
            _ => (format!("ble.{}.tempc", i), format!("{}.25", i)),
        })
        .collect()
}

fn create_test_pd(arg_count: usize) -> PdPacket {
    PdPacket {
        timestamp: timestamp(),
        position: Position {
            altitude: Some(912.0),
            speed: Some(48.5),
            direction: Some(270.0),
            satellite_count: Some(11),
            hdop: Some(0.8),
            ..Position::new(10.491_234, -66.902_345)
        },
        extra_args: create_test_args(arg_count),
    }
}

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");

    for size in [64, 1000, 10000] {
        let data = vec![b'7'; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| black_box(checksum(data)));
        });
    }

    group.finish();
}

fn bench_args_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("args_parse");

    for count in [4, 32, 256] {
        let raw = create_test_args(count).encode();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &raw, |b, raw| {
            b.iter(|| black_box(ArgumentMap::parse(raw)));
        });
    }

    group.finish();
}

fn bench_pd_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("pd_encode");

    for count in [4, 32, 256] {
        let packet = create_test_pd(count);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), &packet, |b, packet| {
            b.iter(|| black_box(packet.to_packet()));
        });
    }

    group.finish();
}

fn bench_pd_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("pd_decode");

    for count in [4, 32, 256] {
        let raw = create_test_pd(count).to_packet();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), &raw, |b, raw| {
            b.iter(|| black_box(Packet::decode(raw).is_ok()));
        });
    }

    group.finish();
}

fn bench_ac_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("ac_decode");

    for count in [1, 16, 128] {
        let packet = AcPacket {
            commands: (0..count)
                .map(|i| {
                    CommandDefinition::new(i, format!("command_{}", i))
                        .with_args(create_test_args(4))
                })
                .collect(),
        };
        let raw = packet.to_packet();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &raw, |b, raw| {
            b.iter(|| black_box(AcPacket::from_packet(raw).is_ok()));
        });
    }

    group.finish();
}

fn bench_stream_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_decode");

    for batch in [1, 16, 128] {
        let mut stream = Vec::new();
        for _ in 0..batch {
            stream.extend_from_slice(create_test_pd(8).to_packet().as_bytes());
            stream.extend_from_slice(b"\r\n");
        }

        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &stream, |b, stream| {
            b.iter(|| {
                let mut decoder = Decoder::new();
                // Feed in small reads to exercise envelope reassembly.
                for chunk in stream.chunks(512) {
                    decoder.extend(chunk);
                    while let Ok(Some(packet)) = decoder.decode_packet() {
                        black_box(packet);
                    }
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_checksum,
    bench_args_parse,
    bench_pd_encode,
    bench_pd_decode,
    bench_ac_decode,
    bench_stream_decode,
);

criterion_main!(benches);
