use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use export_ring::BoundedRing;
use std::sync::Arc;
use std::thread;

const MSG_PER_PRODUCER: u64 = 1_000_000;

fn bench_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread");
    group.throughput(Throughput::Elements(1));

    let ring = BoundedRing::<u64>::new(2048).unwrap();
    group.bench_function("add_read", |b| {
        b.iter(|| {
            ring.add(black_box(42));
            black_box(ring.read().unwrap());
        });
    });

    group.finish();
}

fn bench_multi_producer(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_producer");

    for num_producers in [1u64, 2, 4, 8] {
        group.throughput(Throughput::Elements(MSG_PER_PRODUCER * num_producers));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}P_1C", num_producers)),
            &num_producers,
            |b, &n| {
                b.iter(|| {
                    let ring = Arc::new(BoundedRing::<u64>::new(2048).unwrap());

                    let handles: Vec<_> = (0..n)
                        .map(|_| {
                            let ring = Arc::clone(&ring);
                            thread::spawn(move || {
                                for i in 0..MSG_PER_PRODUCER {
                                    while !ring.add(i) {
                                        std::hint::spin_loop();
                                    }
                                }
                            })
                        })
                        .collect();

                    let total = MSG_PER_PRODUCER * n;
                    let mut received = 0u64;
                    while received < total {
                        let drained = ring.drain_up_to(512, |item| {
                            black_box(item);
                        });
                        if drained == 0 {
                            std::hint::spin_loop();
                        }
                        received += drained as u64;
                    }

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_single_thread, bench_multi_producer);
criterion_main!(benches);
