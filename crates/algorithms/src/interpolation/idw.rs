//! Inverse Distance Weighting (IDW) interpolation
//!
//! Estimates values at unknown locations as a weighted average of all
//! sample points, where weights are inversely proportional to distance
//! raised to a power parameter.
//!
//! Reference:
//! Shepard, D. (1968). A two-dimensional interpolation function for
//! irregularly-spaced data. ACM National Conference.

use crate::maybe_rayon::*;
use cheaqi_core::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{Grid, SamplePoint};

/// Distances below this are treated as coincident with the sample
const MIN_DISTANCE: f64 = 1e-10;

/// Parameters for IDW interpolation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdwParams {
    /// Power parameter (default: 2.0).
    /// Higher values give more weight to nearby points.
    pub power: f64,
}

impl Default for IdwParams {
    fn default() -> Self {
        Self { power: 2.0 }
    }
}

/// Global IDW from scattered points onto `grid`.
///
/// # Algorithm
///
/// ```text
/// z(x,y) = Σ(wi * zi) / Σ(wi)
/// where wi = 1 / max(d(x,y, xi,yi), 1e-10)^p
/// ```
///
/// Every sample contributes to every node. A node within `1e-10` of one or
/// more samples takes their mean value, which is the limit of the weighted
/// average as the floor dominates.
pub fn idw(points: &[SamplePoint], grid: &Grid, params: &IdwParams) -> Result<Array2<f64>> {
    if points.is_empty() {
        return Err(Error::InsufficientData {
            required: 1,
            found: 0,
        });
    }
    if !(params.power.is_finite() && params.power > 0.0) {
        return Err(Error::InvalidParameter {
            name: "idw_power",
            value: params.power.to_string(),
            reason: "must be a positive number".into(),
        });
    }

    let (rows, cols) = grid.shape();
    let half_power = params.power / 2.0;
    let floor_sq = MIN_DISTANCE * MIN_DISTANCE;

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];

            for (col, cell) in row_data.iter_mut().enumerate() {
                let (cx, cy) = grid.node(row, col);

                let mut sum_w = 0.0;
                let mut sum_wz = 0.0;
                let mut snap_sum = 0.0;
                let mut snap_count = 0usize;

                for pt in points {
                    let dsq = pt.dist_sq(cx, cy);
                    if dsq < floor_sq {
                        snap_sum += pt.value;
                        snap_count += 1;
                        continue;
                    }
                    // d^p computed from d² to skip the sqrt
                    let w = 1.0 / dsq.powf(half_power);
                    sum_w += w;
                    sum_wz += w * pt.value;
                }

                if snap_count > 0 {
                    *cell = snap_sum / snap_count as f64;
                } else if sum_w > 0.0 && sum_w.is_finite() {
                    *cell = sum_wz / sum_w;
                }
            }

            row_data
        })
        .collect();

    Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))
}
