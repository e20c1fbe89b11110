//! Benchmarks for interpolation methods

use cheaqi_algorithms::interpolation::{
    build_grid, interpolate, GridSpec, InterpolationMethod, MethodKind, Resolution, SamplePoint,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Pseudo-random stations over a 5° × 5° box with a smooth field
fn create_stations(n: usize) -> Vec<SamplePoint> {
    let mut rng: u64 = 42;
    let mut next = || {
        rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (rng >> 33) as f64 / (1u64 << 31) as f64
    };
    (0..n)
        .map(|_| {
            let x = 29.5 + next() * 5.0;
            let y = -1.5 + next() * 5.0;
            let value = 20.0 + 5.0 * (x * 1.3).sin() + 3.0 * (y * 0.7).cos() + next();
            SamplePoint::new(x, y, value)
        })
        .collect()
}

fn bench_methods(c: &mut Criterion) {
    for kind in [MethodKind::Idw, MethodKind::Kriging, MethodKind::Rbf] {
        let mut group = c.benchmark_group(format!("interpolation/{}", kind));
        let method = InterpolationMethod::from(kind);
        for n in [25, 100, 400] {
            let points = create_stations(n);
            let grid = build_grid(
                &points,
                &GridSpec {
                    resolution: Resolution::Cells(100),
                    ..Default::default()
                },
            )
            .unwrap();
            group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
                b.iter(|| interpolate(black_box(&points), &grid, &method).unwrap())
            });
        }
        group.finish();
    }
}

fn bench_grid(c: &mut Criterion) {
    let points = create_stations(1000);
    c.bench_function("grid/build_400", |b| {
        b.iter(|| {
            build_grid(
                black_box(&points),
                &GridSpec {
                    resolution: Resolution::Cells(10_000),
                    ..Default::default()
                },
            )
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_methods, bench_grid);
criterion_main!(benches);
