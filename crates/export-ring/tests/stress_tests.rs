//! Multi-core stress tests for `BoundedRing`.
//!
//! Every available core runs a producer; consumers only read when
//! `count() > 0`. Every item must come out exactly once.

use export_ring::BoundedRing;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

const ITEMS_PER_PRODUCER: u64 = 50_000;

fn producer_count() -> u64 {
    thread::available_parallelism().map_or(4, |n| n.get() as u64).max(2)
}

fn encode(producer: u64, seq: u64) -> u64 {
    producer << 32 | seq
}

fn run_stress(capacity: usize, consumers: usize) {
    let producers = producer_count();
    let total = producers * ITEMS_PER_PRODUCER;

    let ring = Arc::new(BoundedRing::new(capacity).unwrap());
    let consumed = Arc::new(AtomicU64::new(0));
    let over_capacity = Arc::new(AtomicBool::new(false));
    let seen = Arc::new(Mutex::new(vec![0u8; total as usize]));

    let producer_handles: Vec<_> = (0..producers)
        .map(|producer| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for seq in 0..ITEMS_PER_PRODUCER {
                    let item = encode(producer, seq);
                    while !ring.add(item) {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let consumer_handles: Vec<_> = (0..consumers)
        .map(|_| {
            let ring = Arc::clone(&ring);
            let consumed = Arc::clone(&consumed);
            let over_capacity = Arc::clone(&over_capacity);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                let mut local = Vec::with_capacity(1024);
                while consumed.load(Ordering::Acquire) < total {
                    if ring.count() > ring.capacity() {
                        over_capacity.store(true, Ordering::Relaxed);
                    }
                    if ring.count() == 0 {
                        thread::yield_now();
                        continue;
                    }
                    // With several consumers another one may win the race.
                    if let Ok(item) = ring.read() {
                        local.push(item);
                        consumed.fetch_add(1, Ordering::AcqRel);
                    }
                    if local.len() == local.capacity() {
                        record(&seen, &mut local);
                    }
                }
                record(&seen, &mut local);
            })
        })
        .collect();

    for handle in producer_handles {
        handle.join().unwrap();
    }
    for handle in consumer_handles {
        handle.join().unwrap();
    }

    assert!(!over_capacity.load(Ordering::Relaxed), "count exceeded capacity");
    assert_eq!(ring.added_count(), total);
    assert_eq!(ring.removed_count(), total);
    assert!(ring.is_empty());

    let seen = seen.lock().unwrap();
    let missing = seen.iter().filter(|&&n| n == 0).count();
    let duplicated = seen.iter().filter(|&&n| n > 1).count();
    assert_eq!(missing, 0, "{} items were lost", missing);
    assert_eq!(duplicated, 0, "{} items were read twice", duplicated);
}

fn record(seen: &Mutex<Vec<u8>>, local: &mut Vec<u64>) {
    let mut seen = seen.lock().unwrap();
    for item in local.drain(..) {
        let producer = item >> 32;
        let seq = item & 0xFFFF_FFFF;
        let index = (producer * ITEMS_PER_PRODUCER + seq) as usize;
        seen[index] = seen[index].saturating_add(1);
    }
}

#[test]
fn stress_all_cores_single_consumer() {
    run_stress(2048, 1);
}

#[test]
fn stress_all_cores_multiple_consumers() {
    run_stress(256, 3);
}

#[test]
fn stress_tiny_ring() {
    run_stress(1, 2);
}
