//! Hand-off queue throughput and round-trip benchmark.
//!
//! Usage:
//!     cargo run --release --bin queue_bench
//!
//! Environment variables:
//!     PRODUCER_CPU=0  Pin the (first) producer to CPU 0 (default: 0)
//!     CONSUMER_CPU=2  Pin the (first) consumer to CPU 2 (default: 2)
//!     PRODUCERS=4     Producer threads for the MPSC runs (default: 4)
//!     CONSUMERS=4     Consumer threads for the SPMC run (default: 4)

use std::env;
use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use handoff::{Offer, Poll, Put, Take, blocking, mpsc, spmc, spsc};
use minstant::Instant;

const QUEUE_SIZE: usize = 1 << 16;
const ITERATIONS: usize = 1 << 22;
const RTT_ITERATIONS: usize = 1 << 18;

type Payload = u64;

fn env_or(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

fn report(name: &str, items: usize, start: Instant) {
    let elapsed = start.elapsed();
    let ops_per_ms = items as u128 * 1_000_000 / elapsed.as_nanos().max(1);
    println!("  {name:<24} {ops_per_ms:>8} ops/ms");
}

fn offer_spin<Q: Offer<Payload>>(queue: &Q, mut item: Payload) {
    while let Err(rejected) = queue.offer(item) {
        item = rejected;
        hint::spin_loop();
    }
}

fn poll_spin<Q: Poll<Payload>>(queue: &Q) -> Payload {
    loop {
        if let Some(value) = queue.poll() {
            return value;
        }
        hint::spin_loop();
    }
}

fn bench_spsc(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let (producer, consumer) = spsc::channel::<Payload>(QUEUE_SIZE).unwrap();
    let ready = Arc::new(AtomicBool::new(false));

    let consumer_thread = {
        let ready = Arc::clone(&ready);
        thread::spawn(move || {
            pin_to_cpu(consumer_cpu);
            ready.store(true, Ordering::Release);
            for expected in 0..ITERATIONS as Payload {
                let value = poll_spin(&consumer);
                assert_eq!(value, expected, "data corruption");
            }
        })
    };

    while !ready.load(Ordering::Acquire) {
        hint::spin_loop();
    }
    pin_to_cpu(producer_cpu);

    let start = Instant::now();
    for i in 0..ITERATIONS as Payload {
        offer_spin(&producer, i);
    }
    consumer_thread.join().unwrap();
    report("spsc throughput", ITERATIONS, start);
}

fn bench_spsc_rtt(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let (ping_tx, ping_rx) = spsc::channel::<Payload>(QUEUE_SIZE).unwrap();
    let (pong_tx, pong_rx) = spsc::channel::<Payload>(QUEUE_SIZE).unwrap();

    let responder = thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        for _ in 0..RTT_ITERATIONS {
            let value = poll_spin(&ping_rx);
            offer_spin(&pong_tx, value);
        }
    });

    pin_to_cpu(producer_cpu);
    let start = Instant::now();
    for i in 0..RTT_ITERATIONS as Payload {
        offer_spin(&ping_tx, i);
        poll_spin(&pong_rx);
    }
    let elapsed = start.elapsed();
    responder.join().unwrap();

    let rtt_ns = elapsed.as_nanos() / RTT_ITERATIONS as u128;
    println!("  {:<24} {rtt_ns:>8} ns", "spsc round trip");
}

fn bench_mpsc(producers: usize, consumer_cpu: Option<usize>) {
    let (producer, consumer) = mpsc::channel::<Payload>(QUEUE_SIZE).unwrap();
    let per_producer = ITERATIONS / producers;
    let total = per_producer * producers;

    let start = Instant::now();
    let handles: Vec<_> = (0..producers)
        .map(|_| {
            let producer = producer.clone();
            thread::spawn(move || {
                for i in 0..per_producer as Payload {
                    offer_spin(&producer, i);
                }
            })
        })
        .collect();

    pin_to_cpu(consumer_cpu);
    let mut received = 0;
    while received < total {
        let drained = consumer.drain(|_| {});
        if drained == 0 {
            hint::spin_loop();
        }
        received += drained;
    }
    for h in handles {
        h.join().unwrap();
    }
    report(&format!("mpsc x{producers} throughput"), total, start);
}

fn bench_spmc(consumers: usize, producer_cpu: Option<usize>) {
    let (producer, consumer) = spmc::channel::<Payload>(QUEUE_SIZE).unwrap();
    let received = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let handles: Vec<_> = (0..consumers)
        .map(|_| {
            let consumer = consumer.clone();
            let received = Arc::clone(&received);
            thread::spawn(move || {
                while received.load(Ordering::Relaxed) < ITERATIONS {
                    let drained = consumer.drain_limit(|_| {}, 64);
                    if drained == 0 {
                        hint::spin_loop();
                    } else {
                        received.fetch_add(drained, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    pin_to_cpu(producer_cpu);
    for i in 0..ITERATIONS as Payload {
        offer_spin(&producer, i);
    }
    for h in handles {
        h.join().unwrap();
    }
    report(&format!("spmc x{consumers} throughput"), ITERATIONS, start);
}

fn bench_blocking(producers: usize) {
    let (producer, consumer) = blocking::channel::<Payload>(QUEUE_SIZE).unwrap();
    let per_producer = ITERATIONS / producers;
    let total = per_producer * producers;

    let start = Instant::now();
    let handles: Vec<_> = (0..producers)
        .map(|_| {
            let producer = producer.clone();
            thread::spawn(move || {
                for i in 0..per_producer as Payload {
                    producer.put(i).unwrap();
                }
            })
        })
        .collect();

    for _ in 0..total {
        consumer.take().unwrap();
    }
    for h in handles {
        h.join().unwrap();
    }
    report(&format!("blocking x{producers} put/take"), total, start);
}

fn main() {
    handoff::init_tracing();

    let producer_cpu = Some(env_or("PRODUCER_CPU", 0));
    let consumer_cpu = Some(env_or("CONSUMER_CPU", 2));
    let producers = env_or("PRODUCERS", 4).max(1);
    let consumers = env_or("CONSUMERS", 4).max(1);

    println!("handoff queues (size={QUEUE_SIZE}, iters={ITERATIONS}):");
    bench_spsc(producer_cpu, consumer_cpu);
    bench_spsc_rtt(producer_cpu, consumer_cpu);
    bench_mpsc(producers, consumer_cpu);
    bench_spmc(consumers, producer_cpu);
    bench_blocking(producers);
}
