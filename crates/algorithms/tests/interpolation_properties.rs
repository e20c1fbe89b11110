//! Properties every interpolation method and grid must satisfy, checked on
//! deterministic pseudo-random sample layouts.

use approx::assert_relative_eq;
use cheaqi_algorithms::interpolation::{
    build_grid, interpolate, GridSpec, IdwParams, InterpolationMethod, KrigingParams, RbfParams,
    Resolution, SamplePoint,
};

// ── Fixtures ──────────────────────────────────────────────────────────

/// Small LCG so layouts are reproducible without a rand dependency
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn layout(seed: u64, n: usize) -> Vec<SamplePoint> {
    let mut rng = Lcg(seed);
    (0..n)
        .map(|_| {
            let x = 29.5 + rng.next() * 5.0;
            let y = -1.5 + rng.next() * 5.5;
            SamplePoint::new(x, y, 10.0 + 3.0 * x - 2.0 * y + rng.next())
        })
        .collect()
}

fn methods() -> Vec<InterpolationMethod> {
    vec![
        InterpolationMethod::Kriging(KrigingParams::default()),
        InterpolationMethod::Idw(IdwParams::default()),
        InterpolationMethod::Rbf(RbfParams::default()),
    ]
}

// ── Grid ──────────────────────────────────────────────────────────────

#[test]
fn grids_contain_samples_and_respect_cap() {
    for seed in 1..20 {
        let points = layout(seed, 5 + seed as usize);
        for resolution in [Resolution::Cells(50), Resolution::Cells(5_000), Resolution::CellSize(0.001)] {
            let spec = GridSpec {
                resolution,
                buffer_fraction: 0.05 + seed as f64 * 0.01,
                ..Default::default()
            };
            let grid = build_grid(&points, &spec).unwrap();

            assert!(grid.width() <= 400 && grid.height() <= 400);
            assert!(grid.width() >= 2 && grid.height() >= 2);
            for p in &points {
                assert!(grid.strictly_contains(p.x, p.y), "seed {}: {:?}", seed, p);
            }
        }
    }
}

// ── Estimates ─────────────────────────────────────────────────────────

#[test]
fn exact_methods_reproduce_samples_on_nodes() {
    // Samples on the grid corners, no buffer: corner nodes coincide with them
    let points = vec![
        SamplePoint::new(32.0, 0.0, 5.0),
        SamplePoint::new(33.0, 0.0, 9.0),
        SamplePoint::new(32.0, 1.0, 13.0),
        SamplePoint::new(33.0, 1.0, 2.0),
        SamplePoint::new(32.4, 0.7, 6.0),
    ];
    let spec = GridSpec {
        resolution: Resolution::Cells(11),
        buffer_fraction: 0.0,
        ..Default::default()
    };
    let grid = build_grid(&points, &spec).unwrap();

    for method in methods() {
        let surface = interpolate(&points, &grid, &method).unwrap();
        let (rows, cols) = grid.shape();
        // Row 0 is north (y = 1.0)
        assert_relative_eq!(surface.estimate[[0, 0]], 13.0, epsilon = 1e-6);
        assert_relative_eq!(surface.estimate[[0, cols - 1]], 2.0, epsilon = 1e-6);
        assert_relative_eq!(surface.estimate[[rows - 1, 0]], 5.0, epsilon = 1e-6);
        assert_relative_eq!(surface.estimate[[rows - 1, cols - 1]], 9.0, epsilon = 1e-6);
    }
}

#[test]
fn surfaces_follow_north_up_order() {
    // Value grows with latitude, so the first row must hold the largest values
    let points: Vec<SamplePoint> = (0..25)
        .map(|i| {
            let x = 32.0 + (i % 5) as f64 * 0.25;
            let y = (i / 5) as f64 * 0.25;
            SamplePoint::new(x, y, 100.0 * y)
        })
        .collect();
    let grid = build_grid(
        &points,
        &GridSpec {
            resolution: Resolution::Cells(30),
            ..Default::default()
        },
    )
    .unwrap();

    for method in methods() {
        let surface = interpolate(&points, &grid, &method).unwrap();
        let rows = surface.estimate.nrows();
        let top = surface.estimate.row(0).mean().unwrap();
        let bottom = surface.estimate.row(rows - 1).mean().unwrap();
        assert!(top > bottom, "{:?}: top {} bottom {}", method.kind(), top, bottom);
    }
}

#[test]
fn estimates_stay_finite_on_random_layouts() {
    for seed in 1..6 {
        let points = layout(seed * 7, 40);
        let grid = build_grid(&points, &GridSpec {
            resolution: Resolution::Cells(40),
            ..Default::default()
        })
        .unwrap();
        for method in methods() {
            let surface = interpolate(&points, &grid, &method).unwrap();
            assert!(surface.estimate.iter().all(|v| v.is_finite()), "{:?}", method.kind());
            if let Some(variance) = &surface.variance {
                assert!(variance.iter().all(|v| v.is_finite() && *v >= -1e-9));
            }
        }
    }
}
