use crawl_tracker::models::RoutePoint;
use crawl_tracker::services::distance::miles_walked;
use crawl_tracker::services::StaticBarCatalog;
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

/// A dense catalog: a grid of bars around lower Manhattan.
fn grid_catalog(side: usize) -> StaticBarCatalog {
    let mut features = Vec::with_capacity(side * side);
    for i in 0..side {
        for j in 0..side {
            let lat = 40.70 + i as f64 * 0.0005;
            let lon = -74.02 + j as f64 * 0.0005;
            features.push(format!(
                r#"{{"type":"Feature","geometry":{{"type":"Point","coordinates":[{},{}]}},"properties":{{"id":"bar-{}-{}","name":"Bar {} {}"}}}}"#,
                lon, lat, i, j, i, j
            ));
        }
    }
    let json = format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",")
    );
    StaticBarCatalog::load_from_json(&json).expect("Failed to build catalog")
}

/// A long walk: one fix every ~10 m heading north-east.
fn long_route(points: usize) -> Vec<RoutePoint> {
    (0..points)
        .map(|i| {
            RoutePoint::new(
                40.70 + i as f64 * 0.00009,
                -74.02 + i as f64 * 0.00009,
                i as i64 * 5_000,
            )
        })
        .collect()
}

fn benchmark_proximity(c: &mut Criterion) {
    let builtin = StaticBarCatalog::builtin();
    let grid = grid_catalog(60);

    let mut group = c.benchmark_group("nearby_bars");

    group.bench_function("builtin_catalog", |b| {
        b.iter(|| builtin.nearby(black_box(40.7128), black_box(-74.0060)))
    });

    group.bench_function("grid_3600_bars", |b| {
        b.iter(|| grid.nearby(black_box(40.71), black_box(-74.01)))
    });

    group.finish();
}

fn benchmark_distance(c: &mut Criterion) {
    let route = long_route(2_000);

    c.bench_function("miles_walked_2000_fixes", |b| {
        b.iter(|| miles_walked(black_box(&route)))
    });
}

criterion_group!(benches, benchmark_proximity, benchmark_distance);
criterion_main!(benches);
