use std::{hint::black_box, sync::Arc, time::Duration};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;
use zumq::{Exchange, Message, Queue};

fn payload(size: usize) -> Message {
    Message::new(vec![b'x'; size])
}

/// Вставка до заполнения и полное вычитывание, без ожидания.
pub fn bench_try_enqueue_dequeue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_try_ops");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(3));

    for &capacity in &[16usize, 256, 4096] {
        let message = payload(64);
        group.throughput(Throughput::Elements(capacity as u64));
        group.bench_with_input(
            BenchmarkId::new("fill_drain", capacity),
            &capacity,
            |b, &capacity| {
                let queue = Queue::new("bench", capacity);
                b.iter(|| {
                    for _ in 0..capacity {
                        let _ = queue.try_enqueue(message.clone());
                    }
                    while let Some(m) = queue.try_dequeue() {
                        black_box(m);
                    }
                });
            },
        );
    }

    group.finish();
}

/// Стоимость отказа при переполнении.
pub fn bench_overflow(c: &mut Criterion) {
    let queue = Queue::new("full", 1);
    let _ = queue.try_enqueue(payload(8));
    let message = payload(8);

    c.bench_function("queue_overflow_reject", |b| {
        b.iter(|| black_box(queue.try_enqueue(message.clone()).is_err()));
    });
}

/// Передача через async `dequeue` между двумя задачами.
pub fn bench_async_handoff(c: &mut Criterion) {
    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => panic!("failed to build runtime: {e}"),
    };
    const N: usize = 1_000;

    let mut group = c.benchmark_group("queue_async");
    group.throughput(Throughput::Elements(N as u64));
    group.bench_function("producer_consumer_1k", |b| {
        b.to_async(&rt).iter(|| async {
            let queue = Arc::new(Queue::new("handoff", 64));
            let consumer = {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for _ in 0..N {
                        black_box(queue.dequeue().await);
                    }
                })
            };
            let message = payload(32);
            let mut sent = 0;
            while sent < N {
                if queue.try_enqueue(message.clone()).is_ok() {
                    sent += 1;
                } else {
                    tokio::task::yield_now().await;
                }
            }
            let _ = consumer.await;
        });
    });
    group.finish();
}

/// Поиск и get-or-create в реестре адресов.
pub fn bench_exchange(c: &mut Criterion) {
    let exchange = Exchange::new();
    let addresses: Vec<String> = (0..1024).map(|i| format!("queue.{i}")).collect();
    for address in &addresses {
        exchange.get_or_create(address, 16);
    }

    let mut group = c.benchmark_group("exchange");
    group.bench_function("load_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % addresses.len();
            black_box(exchange.load(&addresses[i]))
        });
    });
    group.bench_function("load_miss", |b| {
        b.iter(|| black_box(exchange.load("missing")));
    });
    group.bench_function("get_or_create_existing", |b| {
        b.iter(|| black_box(exchange.get_or_create("queue.7", 16)));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_try_enqueue_dequeue,
    bench_overflow,
    bench_async_handoff,
    bench_exchange
);
criterion_main!(benches);
