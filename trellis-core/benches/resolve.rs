//! Resolution benchmarks.
//!
//! - Cold: build a point list and resolve its two-dimensional array
//! - Warm: edit one coordinate and re-resolve
//! - Diff: resize a sequence back and forth

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use trellis_core::{ComponentIdx, Engine, SerializedComponent, Value, VariantRequest};

fn point_list(points: usize) -> (Engine, ComponentIdx) {
    let children = (0..points).map(|i| {
        SerializedComponent::new("point")
            .named(format!("p{i}"))
            .attribute("coords", format!("{i} {} {}", i + 1, i + 2))
            .attribute("numDimensions", 3)
    });
    let document = SerializedComponent::new("document")
        .child(SerializedComponent::new("pointList").named("list").children(children));
    let mut engine = Engine::with_builtins();
    engine
        .build(document, VariantRequest::seeded(0))
        .expect("benchmark document builds");
    let list = engine.lookup("list").expect("list exists");
    (engine, list)
}

fn bench_cold_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("cold_resolution");
    for points in [10, 100, 500] {
        group.throughput(Throughput::Elements(points as u64 * 3));
        group.bench_with_input(BenchmarkId::from_parameter(points), &points, |b, &points| {
            b.iter_batched(
                || point_list(points),
                |(mut engine, list)| black_box(engine.resolve(list, "points").expect("resolves")),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_warm_edit(c: &mut Criterion) {
    let mut group = c.benchmark_group("warm_edit");
    for points in [10, 100, 500] {
        let (mut engine, list) = point_list(points);
        engine.resolve(list, "points").expect("resolves");
        let first = engine.lookup("p0").expect("point exists");
        let mut x = 0.0;
        group.bench_with_input(BenchmarkId::from_parameter(points), &points, |b, _| {
            b.iter(|| {
                x += 1.0;
                engine
                    .request_change(first, "x1", Value::Number(x))
                    .expect("change applies");
                black_box(engine.resolve(list, "points").expect("resolves"))
            });
        });
    }
    group.finish();
}

fn bench_sequence_diff(c: &mut Criterion) {
    let mut engine = Engine::with_builtins();
    engine
        .build(
            SerializedComponent::new("document").child(
                SerializedComponent::new("sequence")
                    .named("s")
                    .attribute("from", 1)
                    .attribute("to", 1000),
            ),
            VariantRequest::seeded(0),
        )
        .expect("benchmark document builds");
    let s = engine.lookup("s").expect("sequence exists");
    let mut long = false;

    c.bench_function("sequence_resize", |b| {
        b.iter(|| {
            long = !long;
            let to = if long { 1000 } else { 500 };
            black_box(
                engine
                    .request_change(s, "to", Value::Integer(to))
                    .expect("change applies"),
            )
        });
    });
}

criterion_group!(benches, bench_cold_resolution, bench_warm_edit, bench_sequence_diff);
criterion_main!(benches);
