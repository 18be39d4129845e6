//! Thin-plate-spline RBF interpolation over 2D reference points.
//!
//! Calibrated targeting maps a normalized bbox position on the source
//! camera to a pan (or tilt) value through scattered reference points. With
//! a linear polynomial term the system is
//!
//! ```text
//! | A  P | | w |   | y |
//! | Pᵀ 0 | | c | = | 0 |
//! ```
//!
//! where `A[i][j] = phi(|p_i - p_j|)`, `phi(r) = r² ln r`, and `P` carries
//! `[1, x, y]` rows.

use nalgebra::{DMatrix, DVector};

use crate::error::{PtzError, PtzResult};

/// Thin-plate kernel.
fn phi(r: f64) -> f64 {
    if r < 1e-12 {
        0.0
    } else {
        r * r * r.ln()
    }
}

fn dist(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// A fitted thin-plate-spline interpolator.
#[derive(Debug, Clone)]
pub struct RbfInterpolator {
    points: Vec<(f64, f64)>,
    /// RBF weights, one per point
    weights: Vec<f64>,
    /// Polynomial coefficients [c0, cx, cy]
    poly: [f64; 3],
}

impl RbfInterpolator {
    /// Fit an interpolator through `points -> values`.
    ///
    /// Needs at least 3 points; fails on coincident points that make the
    /// system singular.
    pub fn fit(points: &[(f64, f64)], values: &[f64]) -> PtzResult<Self> {
        let n = points.len();
        if n < 3 || values.len() != n {
            return Err(PtzError::Interpolation(format!(
                "need at least 3 reference points, got {n}"
            )));
        }

        let size = n + 3;
        let mut m = DMatrix::zeros(size, size);
        let mut rhs = DVector::zeros(size);

        for i in 0..n {
            for j in 0..n {
                m[(i, j)] = phi(dist(points[i], points[j]));
            }
            m[(i, n)] = 1.0;
            m[(i, n + 1)] = points[i].0;
            m[(i, n + 2)] = points[i].1;
            m[(n, i)] = 1.0;
            m[(n + 1, i)] = points[i].0;
            m[(n + 2, i)] = points[i].1;
            rhs[i] = values[i];
        }

        let solution = m
            .lu()
            .solve(&rhs)
            .ok_or_else(|| PtzError::Interpolation("singular RBF system".to_string()))?;

        let weights = (0..n).map(|i| solution[i]).collect();
        let poly = [solution[n], solution[n + 1], solution[n + 2]];

        Ok(Self {
            points: points.to_vec(),
            weights,
            poly,
        })
    }

    /// Evaluate at (x, y).
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        let mut value = self.poly[0] + self.poly[1] * x + self.poly[2] * y;
        for (point, weight) in self.points.iter().zip(self.weights.iter()) {
            value += weight * phi(dist((x, y), *point));
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolates_through_reference_points() {
        let points = vec![(0.1, 0.2), (0.8, 0.3), (0.5, 0.9), (0.2, 0.7)];
        let values = vec![-0.5, 0.6, 0.1, -0.2];

        let interp = RbfInterpolator::fit(&points, &values).unwrap();
        for (p, v) in points.iter().zip(values.iter()) {
            assert!((interp.eval(p.0, p.1) - v).abs() < 1e-6);
        }
    }

    #[test]
    fn test_reproduces_linear_field() {
        // A linear pan field is captured exactly by the polynomial term
        let points = vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)];
        let values: Vec<f64> = points.iter().map(|(x, y)| 0.3 * x - 0.1 * y + 0.05).collect();

        let interp = RbfInterpolator::fit(&points, &values).unwrap();
        let mid = interp.eval(0.5, 0.5);
        assert!((mid - (0.3 * 0.5 - 0.1 * 0.5 + 0.05)).abs() < 1e-6);
    }

    #[test]
    fn test_too_few_points_rejected() {
        let err = RbfInterpolator::fit(&[(0.0, 0.0), (1.0, 1.0)], &[0.0, 1.0]);
        assert!(matches!(err, Err(PtzError::Interpolation(_))));
    }
}
