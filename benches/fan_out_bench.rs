use criterion::{criterion_group, criterion_main, Criterion};
use multee::MulteeReader;
use std::io::{self, Read};
use std::thread;
use std::time::Duration;

const NUM_CONSUMERS: usize = 5;

fn drain(mut reader: impl Read) {
    let mut sink = io::sink();
    io::copy(&mut reader, &mut sink).expect("in-memory stream drains cleanly");
}

// Compares fanning one in-memory stream out to N threads through multee
// against N threads each reading their own copy of the data. The delta is
// the cost of the round barrier and the shared-buffer copies.
fn benchmark_group(c: &mut Criterion) {
    let sizes = [64 * 1024, 1024 * 1024];

    let mut group = c.benchmark_group(format!("Fan-out (N={})", NUM_CONSUMERS));
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(50);

    for &size in sizes.iter() {
        let data = vec![0x5au8; size];

        group.bench_function(format!("multee_{}", size), |b| {
            b.iter(|| {
                let multee = MulteeReader::new(&data[..]);
                let consumers: Vec<_> =
                    (0..NUM_CONSUMERS).map(|_| multee.new_consumer()).collect();
                thread::scope(|s| {
                    for consumer in consumers {
                        s.spawn(move || drain(consumer));
                    }
                });
            })
        });

        group.bench_function(format!("independent_readers_{}", size), |b| {
            b.iter(|| {
                thread::scope(|s| {
                    for _ in 0..NUM_CONSUMERS {
                        let reader = &data[..];
                        s.spawn(move || drain(reader));
                    }
                });
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_group);
criterion_main!(benches);
