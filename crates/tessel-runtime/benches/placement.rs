use std::hint::black_box;
use std::time::Duration;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use tessel_geom::{TileBounds, Vec3};
use tessel_runtime::TileWorld;
use tessel_tiles::{MeshMode, Orientation, PlaceRequest, StoreConfig};

fn grid(n: usize) -> Vec<PlaceRequest> {
    (0..n)
        .map(|i| {
            let x = (i % 100) as f32 * 0.5;
            let z = (i / 100) as f32 * 0.5;
            PlaceRequest::new(Vec3::new(x, 0.0, z), MeshMode::Square, Orientation::Floor)
        })
        .collect()
}

fn bench_place(c: &mut Criterion) {
    let mut group = c.benchmark_group("place");
    let reqs = grid(5_000);
    group.bench_function("square_5k_one_region", |b| {
        b.iter_batched(
            || TileWorld::new(StoreConfig::default()).unwrap(),
            |mut w| {
                for r in &reqs {
                    black_box(w.place(*r).unwrap());
                }
                w
            },
            BatchSize::LargeInput,
        )
    });
    group.bench_function("fill_area_100x50", |b| {
        let bounds = TileBounds::new(Vec3::ZERO, Vec3::new(49.5, 0.0, 24.5));
        let template = PlaceRequest::new(Vec3::ZERO, MeshMode::Box, Orientation::Floor);
        b.iter_batched(
            || TileWorld::new(StoreConfig::default()).unwrap(),
            |mut w| {
                black_box(w.fill_area(bounds, 0.5, template).unwrap());
                w
            },
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

fn bench_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove");
    let reqs = grid(5_000);
    let mut seeded = TileWorld::new(StoreConfig::default()).unwrap();
    let keys: Vec<_> = reqs.iter().map(|r| seeded.place(*r).unwrap().key).collect();
    group.bench_function("square_5k_front_to_back", |b| {
        b.iter_batched(
            || seeded.clone(),
            |mut w| {
                for k in &keys {
                    black_box(w.remove(*k));
                }
                w
            },
            BatchSize::LargeInput,
        )
    });
    group.bench_function("rebuild_indexes_5k", |b| {
        b.iter_batched(
            || seeded.clone(),
            |mut w| {
                black_box(w.rebuild_indexes());
                w
            },
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

fn config() -> Criterion {
    Criterion::default()
        .sample_size(20)
        .measurement_time(Duration::from_secs(5))
}

criterion_group! {
    name = benches;
    config = config();
    targets = bench_place, bench_remove
}
criterion_main!(benches);
