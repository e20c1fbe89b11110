//! Query grid construction
//!
//! The grid covers the sample bounding box plus a buffer on every side.
//! Node coordinates are linearly spaced and include both buffered bounds,
//! so a grid with `n` nodes along an axis has `n - 1` intervals.

use cheaqi_core::{Error, GeoTransform, Result};
use serde::{Deserialize, Serialize};

use super::SamplePoint;

/// How many nodes each grid axis gets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Fixed node count per axis
    Cells(usize),
    /// Target node spacing in coordinate units; `count = ceil(extent / size) + 1`
    CellSize(f64),
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::Cells(100)
    }
}

/// Grid sizing policy
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub resolution: Resolution,
    /// Buffer added on each side, as a fraction of the axis extent (default 0.1)
    pub buffer_fraction: f64,
    /// Absolute buffer for axes whose sample extent is zero (default 0.01).
    /// `None` disables the fallback.
    pub min_buffer: Option<f64>,
    /// Upper bound on nodes per axis (default 400), applied silently
    pub max_cells: usize,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            buffer_fraction: 0.1,
            min_buffer: Some(0.01),
            max_cells: 400,
        }
    }
}

/// Regular 2D lattice of query locations.
///
/// `xs` and `ys` are both ascending. Use [`Grid::node`] to address nodes in
/// raster order, where row 0 is the largest `y`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Grid {
    /// Build a grid from ascending axis coordinates (at least 2 per axis).
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self> {
        if xs.len() < 2 || ys.len() < 2 {
            return Err(Error::InvalidDimensions {
                width: xs.len(),
                height: ys.len(),
            });
        }
        Ok(Self { xs, ys })
    }

    /// Node x coordinates, ascending
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    /// Node y coordinates, ascending
    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    pub fn width(&self) -> usize {
        self.xs.len()
    }

    pub fn height(&self) -> usize {
        self.ys.len()
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    /// Buffered bounds `(min_x, min_y, max_x, max_y)`
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        (
            self.xs[0],
            self.ys[0],
            self.xs[self.xs.len() - 1],
            self.ys[self.ys.len() - 1],
        )
    }

    /// Coordinates of node (row, col) in raster order
    #[inline]
    pub fn node(&self, row: usize, col: usize) -> (f64, f64) {
        (self.xs[col], self.ys[self.ys.len() - 1 - row])
    }

    /// North-up transform mapping the grid shape onto its bounds
    pub fn transform(&self) -> GeoTransform {
        GeoTransform::from_bounds(self.bounds(), self.width(), self.height())
    }

    /// Whether `(x, y)` lies strictly inside the grid bounds
    pub fn strictly_contains(&self, x: f64, y: f64) -> bool {
        let (min_x, min_y, max_x, max_y) = self.bounds();
        x > min_x && x < max_x && y > min_y && y < max_y
    }
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    let step = (end - start) / (n - 1) as f64;
    (0..n)
        .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
        .collect()
}

fn axis_count(resolution: Resolution, extent: f64, max_cells: usize) -> Result<usize> {
    let count = match resolution {
        Resolution::Cells(n) => {
            if n < 2 {
                return Err(Error::InvalidParameter {
                    name: "resolution",
                    value: n.to_string(),
                    reason: "need at least 2 cells per axis".into(),
                });
            }
            n
        }
        Resolution::CellSize(size) => {
            if !(size.is_finite() && size > 0.0) {
                return Err(Error::InvalidParameter {
                    name: "cell_size",
                    value: size.to_string(),
                    reason: "must be a positive number".into(),
                });
            }
            let steps = (extent / size).ceil();
            if steps >= max_cells as f64 {
                max_cells
            } else {
                (steps as usize + 1).max(2)
            }
        }
    };
    Ok(count.min(max_cells))
}

/// Compute the buffered, capped query grid over `points`.
///
/// # Errors
/// - [`Error::InsufficientData`] with fewer than 2 points
/// - [`Error::InsufficientData`] when both axes have zero extent and no
///   `min_buffer` is configured
/// - [`Error::InvalidParameter`] for a negative buffer, bad resolution or
///   non-finite coordinates
pub fn build_grid(points: &[SamplePoint], spec: &GridSpec) -> Result<Grid> {
    if points.len() < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            found: points.len(),
        });
    }
    if !(spec.buffer_fraction.is_finite() && spec.buffer_fraction >= 0.0) {
        return Err(Error::InvalidParameter {
            name: "buffer_fraction",
            value: spec.buffer_fraction.to_string(),
            reason: "must be a non-negative number".into(),
        });
    }
    if spec.max_cells < 2 {
        return Err(Error::InvalidParameter {
            name: "max_cells",
            value: spec.max_cells.to_string(),
            reason: "need at least 2 cells per axis".into(),
        });
    }

    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in points {
        if !(p.x.is_finite() && p.y.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "points",
                value: format!("({}, {})", p.x, p.y),
                reason: "coordinates must be finite".into(),
            });
        }
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }

    let extent_x = max_x - min_x;
    let extent_y = max_y - min_y;

    // A zero-extent axis borrows min_buffer, or failing that the other
    // axis' buffer, so the raster never degenerates to a line.
    let buffer_x = spec.buffer_fraction * extent_x;
    let buffer_y = spec.buffer_fraction * extent_y;
    let fallback = |other: f64| match spec.min_buffer {
        Some(b) if b > 0.0 => b,
        _ => other,
    };
    let (buffer_x, buffer_y) = match (extent_x > 0.0, extent_y > 0.0) {
        (true, true) => (buffer_x, buffer_y),
        (false, false) => match spec.min_buffer {
            Some(b) if b > 0.0 => (b, b),
            _ => {
                return Err(Error::InsufficientData {
                    required: 2,
                    found: 1,
                });
            }
        },
        (false, true) => (fallback(buffer_y), buffer_y),
        (true, false) => (buffer_x, fallback(buffer_x)),
    };

    let (x0, x1) = (min_x - buffer_x, max_x + buffer_x);
    let (y0, y1) = (min_y - buffer_y, max_y + buffer_y);
    if x1 <= x0 || y1 <= y0 {
        return Err(Error::InvalidParameter {
            name: "buffer_fraction",
            value: spec.buffer_fraction.to_string(),
            reason: "a zero-extent axis needs a positive buffer".into(),
        });
    }

    let nx = axis_count(spec.resolution, x1 - x0, spec.max_cells)?;
    let ny = axis_count(spec.resolution, y1 - y0, spec.max_cells)?;

    Grid::new(linspace(x0, x1, nx), linspace(y0, y1, ny))
}
