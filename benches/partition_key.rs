use std::sync::Arc;

use criterion::{black_box, BenchmarkId, Criterion};
use criterion::{criterion_group, criterion_main};
use time::macros::datetime;
use time::Duration;

use observa::{MemoryStore, PartitionKeyResolver, RegistrationCatalog, Rollover, Timezone};

fn resolver(rollover: Rollover) -> PartitionKeyResolver {
    let catalog = RegistrationCatalog::open(Arc::new(MemoryStore::new())).expect("catalog");
    catalog
        .register("s1", "temp", "room1", rollover)
        .expect("register");
    PartitionKeyResolver::new(Arc::new(catalog), Timezone::AsiaShanghai)
}

fn bench_partition_key_for(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_key_for");
    for rollover in Rollover::ALL {
        let resolver = resolver(rollover);
        let t = datetime!(2020-02-29 23:59:59 UTC);
        group.bench_with_input(BenchmarkId::from_parameter(rollover), &t, |b, &t| {
            b.iter(|| {
                resolver
                    .partition_key_for("s1", "temp", "room1", black_box(t))
                    .expect("registered")
            });
        });
    }
    group.finish();
}

fn bench_spans(c: &mut Criterion) {
    let resolver = resolver(Rollover::Minute);
    let registration = resolver
        .catalog()
        .resolve("s1", "temp", "room1")
        .expect("registered");
    let from = datetime!(2020-01-01 00:00:30 UTC);
    let to = from + Duration::DAY;
    c.bench_function("spans_minute_day", |b| {
        b.iter(|| resolver.spans(&registration, black_box(from), black_box(to)));
    });
}

criterion_group!(benches, bench_partition_key_for, bench_spans);
criterion_main!(benches);
