use std::hint::black_box;

use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zumq::{network::wire::Frame, Outcome};

pub fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_parse");

    for &size in &[16usize, 256, 4096] {
        let frame = Frame::Transfer {
            handle: 1,
            delivery_id: 42,
            payload: Bytes::from(vec![b'p'; size]),
        };
        let line = frame.to_bytes();
        group.throughput(Throughput::Bytes(line.len() as u64));
        group.bench_with_input(BenchmarkId::new("transfer", size), &line, |b, line| {
            b.iter(|| black_box(Frame::parse(line)));
        });
    }

    let disposition = b"DISPOSITION 1 42 accepted\r\n";
    group.bench_function("disposition", |b| {
        b.iter(|| black_box(Frame::parse(disposition)));
    });
    group.finish();
}

pub fn bench_encode(c: &mut Criterion) {
    let frames = [
        Frame::Flow {
            handle: 3,
            credit: 100,
        },
        Frame::Disposition {
            handle: 3,
            delivery_id: 123_456,
            outcome: Outcome::Released,
        },
        Frame::Transfer {
            handle: 3,
            delivery_id: 7,
            payload: Bytes::from_static(b"order-created"),
        },
    ];

    c.bench_function("frame_encode_batch", |b| {
        let mut buf = BytesMut::with_capacity(256);
        b.iter(|| {
            buf.clear();
            for frame in &frames {
                frame.encode(&mut buf);
            }
            black_box(buf.len())
        });
    });
}

criterion_group!(benches, bench_parse, bench_encode);
criterion_main!(benches);
