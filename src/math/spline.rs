//! Natural cubic spline through a set of knots.
//!
//! The second derivatives `M_i` at the interior knots solve the usual
//! tridiagonal system
//!
//! ```text
//! h_{i-1} M_{i-1} + 2 (h_{i-1} + h_i) M_i + h_i M_{i+1}
//!     = 6 ((y_{i+1} - y_i) / h_i - (y_i - y_{i-1}) / h_{i-1})
//! ```
//!
//! with `M_0 = M_{n-1} = 0`. Inside a segment the curve is
//!
//! ```text
//! S(t) = a y_i + b y_{i+1} + ((a^3 - a) M_i + (b^3 - b) M_{i+1}) h^2 / 6
//! ```
//!
//! with `a = (x_{i+1} - t) / h`, `b = (t - x_i) / h`, which reproduces every
//! knot value exactly. Outside the knot span the spline continues linearly
//! with the end-point slope.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplineError {
    #[error("need at least 2 knots, got {0}")]
    TooFewKnots(usize),
    #[error("{knots} knots but {values} values")]
    LengthMismatch { knots: usize, values: usize },
    #[error("knots must be finite and strictly increasing")]
    UnorderedKnots,
    #[error("values must be finite")]
    NonFiniteValue,
    #[error("spline system is singular")]
    Singular,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    second: Vec<f64>,
}

impl CubicSpline {
    pub fn new(knots: &[f64], values: &[f64]) -> Result<Self, SplineError> {
        let n = knots.len();
        if n < 2 {
            return Err(SplineError::TooFewKnots(n));
        }
        if values.len() != n {
            return Err(SplineError::LengthMismatch {
                knots: n,
                values: values.len(),
            });
        }
        if knots.iter().any(|k| !k.is_finite()) || knots.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SplineError::UnorderedKnots);
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SplineError::NonFiniteValue);
        }

        let mut second = vec![0.0; n];
        let m = n - 2;
        if m > 0 {
            let h: Vec<f64> = knots.windows(2).map(|w| w[1] - w[0]).collect();
            let mut a = DMatrix::<f64>::zeros(m, m);
            let mut rhs = DVector::<f64>::zeros(m);
            for row in 0..m {
                let i = row + 1;
                a[(row, row)] = 2.0 * (h[i - 1] + h[i]);
                if row > 0 {
                    a[(row, row - 1)] = h[i - 1];
                }
                if row + 1 < m {
                    a[(row, row + 1)] = h[i];
                }
                rhs[row] = 6.0
                    * ((values[i + 1] - values[i]) / h[i] - (values[i] - values[i - 1]) / h[i - 1]);
            }
            let solved = a.lu().solve(&rhs).ok_or(SplineError::Singular)?;
            for row in 0..m {
                second[row + 1] = solved[row];
            }
        }

        Ok(Self {
            knots: knots.to_vec(),
            values: values.to_vec(),
            second,
        })
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn eval(&self, t: f64) -> f64 {
        let n = self.knots.len();
        let first = self.knots[0];
        let last = self.knots[n - 1];

        if t < first {
            return self.values[0] + self.start_slope() * (t - first);
        }
        if t > last {
            return self.values[n - 1] + self.end_slope() * (t - last);
        }

        // Segment i such that knots[i] <= t <= knots[i + 1].
        let i = (self.knots.partition_point(|&k| k <= t).max(1) - 1).min(n - 2);
        let h = self.knots[i + 1] - self.knots[i];
        let a = (self.knots[i + 1] - t) / h;
        let b = (t - self.knots[i]) / h;
        a * self.values[i]
            + b * self.values[i + 1]
            + ((a * a * a - a) * self.second[i] + (b * b * b - b) * self.second[i + 1]) * h * h / 6.0
    }

    fn start_slope(&self) -> f64 {
        let h = self.knots[1] - self.knots[0];
        (self.values[1] - self.values[0]) / h - h * (2.0 * self.second[0] + self.second[1]) / 6.0
    }

    fn end_slope(&self) -> f64 {
        let n = self.knots.len();
        let h = self.knots[n - 1] - self.knots[n - 2];
        (self.values[n - 1] - self.values[n - 2]) / h
            + h * (self.second[n - 2] + 2.0 * self.second[n - 1]) / 6.0
    }
}
