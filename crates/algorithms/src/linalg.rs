//! Dense LU factorisation with partial pivoting
//!
//! Kriging and RBF systems are built once per job and then solved for many
//! right-hand sides (kriging) or a single one (RBF). Factoring once keeps the
//! per-cell cost at O(n²).

use cheaqi_core::{Error, Result};

/// LU factors of a square row-major matrix, `P·A = L·U`.
#[derive(Debug, Clone)]
pub(crate) struct LuDecomposition {
    n: usize,
    /// L below the diagonal (unit diagonal implied), U on and above it
    lu: Vec<f64>,
    perm: Vec<usize>,
}

impl LuDecomposition {
    /// Factor an `n × n` row-major matrix.
    ///
    /// Fails with [`Error::Algorithm`] when a pivot falls below
    /// `n · ε · max|aᵢⱼ|`, i.e. the system is numerically singular.
    pub(crate) fn factor(n: usize, mut mat: Vec<f64>) -> Result<Self> {
        if mat.len() != n * n {
            return Err(Error::InvalidDimensions { width: n, height: mat.len() / n.max(1) });
        }

        let scale = mat.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if !scale.is_finite() {
            return Err(Error::Algorithm("system matrix contains non-finite values".into()));
        }
        let tol = (n as f64) * f64::EPSILON * scale.max(f64::MIN_POSITIVE);
        let mut perm: Vec<usize> = (0..n).collect();

        for col in 0..n {
            let mut max_val = mat[col * n + col].abs();
            let mut max_row = col;
            for row in (col + 1)..n {
                let val = mat[row * n + col].abs();
                if val > max_val {
                    max_val = val;
                    max_row = row;
                }
            }

            if max_val <= tol {
                return Err(Error::Algorithm(format!(
                    "singular system (pivot {:.3e} in column {})",
                    max_val, col
                )));
            }

            if max_row != col {
                for j in 0..n {
                    mat.swap(col * n + j, max_row * n + j);
                }
                perm.swap(col, max_row);
            }

            let pivot = mat[col * n + col];
            for row in (col + 1)..n {
                let factor = mat[row * n + col] / pivot;
                mat[row * n + col] = factor;
                for j in (col + 1)..n {
                    mat[row * n + j] -= factor * mat[col * n + j];
                }
            }
        }

        Ok(Self { n, lu: mat, perm })
    }

    /// Solve `A·x = b` with the stored factors.
    pub(crate) fn solve(&self, rhs: &[f64]) -> Vec<f64> {
        let n = self.n;
        let mut x: Vec<f64> = self.perm.iter().map(|&p| rhs[p]).collect();

        // Forward substitution (L has a unit diagonal)
        for i in 0..n {
            let mut sum = x[i];
            for j in 0..i {
                sum -= self.lu[i * n + j] * x[j];
            }
            x[i] = sum;
        }

        // Back substitution
        for i in (0..n).rev() {
            let mut sum = x[i];
            for j in (i + 1)..n {
                sum -= self.lu[i * n + j] * x[j];
            }
            x[i] = sum / self.lu[i * n + i];
        }

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_needs_pivoting() {
        // Zero in the leading position forces a row swap
        let a = vec![0.0, 2.0, 1.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0];
        let lu = LuDecomposition::factor(3, a).unwrap();
        let x = lu.solve(&[7.0, 6.0, 13.0]);

        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reuse_for_several_rhs() {
        let a = vec![4.0, 1.0, 1.0, 3.0];
        let lu = LuDecomposition::factor(2, a).unwrap();

        let x1 = lu.solve(&[1.0, 2.0]);
        let x2 = lu.solve(&[5.0, 4.0]);
        assert_relative_eq!(4.0 * x1[0] + x1[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x1[0] + 3.0 * x1[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(4.0 * x2[0] + x2[1], 5.0, epsilon = 1e-12);
        assert_relative_eq!(x2[0] + 3.0 * x2[1], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix() {
        let a = vec![1.0, 2.0, 2.0, 4.0];
        assert!(matches!(
            LuDecomposition::factor(2, a),
            Err(Error::Algorithm(_))
        ));
    }
}
