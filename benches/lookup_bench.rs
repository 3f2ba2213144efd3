//! Lookup and registration benchmarks.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use frame_registry::{
    FrameRegistry, FrametableBuf, FrametableBuilder, RegistryConfig, SingleUnitWorld,
};

fn populated_registry(records: usize) -> (FrameRegistry, FrametableBuf) {
    let mut builder = FrametableBuilder::new();
    for i in 0..records {
        builder.push_frame(0x10000 + i * 0x40, &[8, 16, 24]);
    }
    let buf = builder.finish();
    let registry = unsafe {
        FrameRegistry::new(
            RegistryConfig::default(),
            Arc::new(SingleUnitWorld),
            &[buf.table()],
        )
    }
    .unwrap();
    (registry, buf)
}

fn bench_lookup_hit(c: &mut Criterion) {
    let (registry, _buf) = populated_registry(1024);
    let mut i = 0usize;
    c.bench_function("lookup_hit_1024", |b| {
        b.iter(|| {
            i = (i + 1) & 1023;
            black_box(registry.find(black_box(0x10000 + i * 0x40)))
        })
    });
}

fn bench_lookup_miss(c: &mut Criterion) {
    let (registry, _buf) = populated_registry(1024);
    c.bench_function("lookup_miss_1024", |b| {
        b.iter(|| black_box(registry.find(black_box(0x900000))))
    });
}

fn bench_incremental_registration(c: &mut Criterion) {
    c.bench_function("register_64_tables", |b| {
        b.iter(|| {
            let registry = unsafe {
                FrameRegistry::new(RegistryConfig::default(), Arc::new(SingleUnitWorld), &[])
            }
            .unwrap();
            let bufs: Vec<FrametableBuf> = (0..64)
                .map(|i| {
                    let mut builder = FrametableBuilder::new();
                    builder.push_frame(0x10000 + i * 0x40, &[8]);
                    builder.finish()
                })
                .collect();
            for buf in &bufs {
                unsafe { registry.register_frametables(&[buf.table()]) }.unwrap();
            }
            black_box(registry.record_count())
        })
    });
}

criterion_group!(
    benches,
    bench_lookup_hit,
    bench_lookup_miss,
    bench_incremental_registration
);
criterion_main!(benches);
