//! Reference fit engine: deterministic coordinate-wise grid scan.
//!
//! Each sweep visits the parameters in order. For one parameter a linearly
//! spaced grid is laid over its current window (clipped to the bounds) and
//! every candidate is evaluated in parallel; the best candidate wins, ties
//! going to the lowest grid index. A window shrinks when the best point is
//! interior and slides otherwise. The scan has converged once every window is
//! below `tolerance` times its parameter's range.
//!
//! Errors are the square roots of the diagonal of the inverse
//! finite-difference Hessian of the NLL at the minimum.

use nalgebra::DMatrix;
use rayon::prelude::*;
use tracing::debug;

use crate::error::AppError;
use crate::fit::adapter::{EngineResult, FitEngine, FitProblem, FreeParameter};
use crate::math::linspace;

/// Relative finite-difference step for the Hessian.
const HESSIAN_STEP: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridScanEngine {
    /// Candidates per window (at least 3).
    pub steps: usize,
    pub max_sweeps: usize,
    /// Window scale factor after an interior minimum.
    pub shrink: f64,
    /// Relative window width at which the scan stops.
    pub tolerance: f64,
}

impl Default for GridScanEngine {
    fn default() -> Self {
        Self {
            steps: 9,
            max_sweeps: 100,
            shrink: 0.5,
            tolerance: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    idx: usize,
    value: f64,
    nll: f64,
}

impl GridScanEngine {
    fn check(&self) -> Result<(), AppError> {
        if self.steps < 3 {
            return Err(AppError::shape_config("grid-scan", "steps must be >= 3"));
        }
        if !(self.shrink > 0.0 && self.shrink < 1.0) {
            return Err(AppError::shape_config("grid-scan", "shrink must be in (0, 1)"));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(AppError::shape_config("grid-scan", "tolerance must be positive"));
        }
        Ok(())
    }
}

impl FitEngine for GridScanEngine {
    fn minimize(&self, problem: &FitProblem<'_>) -> Result<EngineResult, AppError> {
        self.check()?;
        let params = &problem.parameters;
        for p in params {
            if !(p.lo.is_finite() && p.hi.is_finite() && p.lo < p.hi) {
                return Err(AppError::shape_config(&p.name, "grid scan needs a finite, non-empty range"));
            }
        }

        let mut current: Vec<f64> = params.iter().map(|p| p.init.clamp(p.lo, p.hi)).collect();
        let mut windows: Vec<f64> = params.iter().map(|p| p.hi - p.lo).collect();
        let mut best_nll = problem.eval(&current);
        let mut evaluations = 1usize;
        if !best_nll.is_finite() {
            return Err(AppError::evaluation("objective", format!("non-finite at the start point ({best_nll})")));
        }

        let mut converged = params.is_empty();
        let mut sweeps = 0;
        while !converged && sweeps < self.max_sweeps {
            sweeps += 1;
            for (i, p) in params.iter().enumerate() {
                let half = 0.5 * windows[i];
                let lo = (current[i] - half).max(p.lo);
                let hi = (current[i] + half).min(p.hi);
                let grid = linspace(lo, hi, self.steps);

                // Evaluate each candidate independently (parallel).
                let candidates: Vec<Candidate> = grid
                    .par_iter()
                    .enumerate()
                    .map(|(idx, value)| {
                        let mut point = current.clone();
                        point[i] = *value;
                        let nll = problem.eval(&point);
                        Candidate {
                            idx,
                            value: *value,
                            nll: if nll.is_nan() { f64::INFINITY } else { nll },
                        }
                    })
                    .collect();
                evaluations += candidates.len();

                // Deterministic selection: minimum NLL, ties by grid index.
                let mut best = &candidates[0];
                for c in &candidates[1..] {
                    if c.nll < best.nll || (c.nll == best.nll && c.idx < best.idx) {
                        best = c;
                    }
                }
                if best.nll <= best_nll {
                    current[i] = best.value;
                    best_nll = best.nll;
                }

                let slides = (best.idx == 0 && lo > p.lo) || (best.idx + 1 == self.steps && hi < p.hi);
                if !slides {
                    windows[i] *= self.shrink;
                }
            }
            converged = params
                .iter()
                .zip(&windows)
                .all(|(p, w)| *w <= self.tolerance * (p.hi - p.lo));
            debug!(sweep = sweeps, nll = best_nll, "grid scan sweep");
        }

        let errors = if converged && problem.compute_errors && !params.is_empty() {
            let (errors, used) = hessian_errors(problem, &current, best_nll);
            evaluations += used;
            errors
        } else {
            None
        };

        let message = if converged {
            format!("converged after {sweeps} sweeps")
        } else {
            format!("no convergence after {sweeps} sweeps")
        };
        Ok(EngineResult {
            values: current,
            errors,
            nll: best_nll,
            converged,
            evaluations,
            message,
        })
    }
}

/// `sqrt(diag(H⁻¹))`, or `None` when the Hessian is not positive definite.
fn hessian_errors(problem: &FitProblem<'_>, x: &[f64], f0: f64) -> (Option<Vec<f64>>, usize) {
    let (h, used) = hessian(&problem.parameters, |v| problem.eval(v), x, f0);
    let errors = h.and_then(covariance).map(|cov| (0..x.len()).map(|i| cov[(i, i)].sqrt()).collect());
    (errors, used)
}

/// Central finite-difference Hessian of `objective` at `x` (where it is
/// `f0`), with steps relative to each parameter's range. Returns the matrix
/// (`None` when an entry is not finite) and the number of evaluations.
pub(crate) fn hessian(
    parameters: &[FreeParameter],
    objective: impl Fn(&[f64]) -> f64,
    x: &[f64],
    f0: f64,
) -> (Option<DMatrix<f64>>, usize) {
    let n = x.len();
    let steps: Vec<f64> = parameters.iter().map(|p| HESSIAN_STEP * (p.hi - p.lo)).collect();
    let shifted = |moves: &[(usize, f64)]| {
        let mut point = x.to_vec();
        for (i, d) in moves {
            point[*i] += d;
        }
        objective(&point)
    };

    let mut used = 0;
    let mut h = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        let hi = steps[i];
        let up = shifted(&[(i, hi)]);
        let down = shifted(&[(i, -hi)]);
        used += 2;
        h[(i, i)] = (up - 2.0 * f0 + down) / (hi * hi);
        for j in 0..i {
            let hj = steps[j];
            let pp = shifted(&[(i, hi), (j, hj)]);
            let pm = shifted(&[(i, hi), (j, -hj)]);
            let mp = shifted(&[(i, -hi), (j, hj)]);
            let mm = shifted(&[(i, -hi), (j, -hj)]);
            used += 4;
            let v = (pp - pm - mp + mm) / (4.0 * hi * hj);
            h[(i, j)] = v;
            h[(j, i)] = v;
        }
    }
    if h.iter().any(|v| !v.is_finite()) {
        debug!("hessian has non-finite entries");
        return (None, used);
    }
    (Some(h), used)
}

/// `H⁻¹`, or `None` when `h` is singular or its inverse has a non-positive
/// diagonal.
pub(crate) fn covariance(h: DMatrix<f64>) -> Option<DMatrix<f64>> {
    let Some(cov) = h.try_inverse() else {
        debug!("hessian is singular");
        return None;
    };
    if cov.diagonal().iter().any(|v| !(*v > 0.0)) {
        debug!("hessian is not positive definite");
        return None;
    }
    Some(cov)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, init: f64, lo: f64, hi: f64) -> FreeParameter {
        FreeParameter {
            name: name.into(),
            init,
            lo,
            hi,
        }
    }

    #[test]
    fn finds_quadratic_minimum_with_errors() {
        // NLL = (a-1)^2 / (2 * 0.5^2) + (b+2)^2 / (2 * 2^2)
        let problem = FitProblem {
            parameters: vec![param("a", 0.0, -5.0, 5.0), param("b", 0.0, -10.0, 10.0)],
            compute_errors: true,
            objective: Box::new(|v: &[f64]| {
                (v[0] - 1.0).powi(2) / (2.0 * 0.25) + (v[1] + 2.0).powi(2) / (2.0 * 4.0)
            }),
        };
        let r = GridScanEngine::default().minimize(&problem).unwrap();
        assert!(r.converged, "{}", r.message);
        assert!((r.values[0] - 1.0).abs() < 1e-3);
        assert!((r.values[1] + 2.0).abs() < 1e-3);
        let errors = r.errors.unwrap();
        assert!((errors[0] - 0.5).abs() < 1e-3);
        assert!((errors[1] - 2.0).abs() < 1e-2);
    }

    #[test]
    fn minimum_on_a_bound_is_reached() {
        let problem = FitProblem {
            parameters: vec![param("a", 0.5, 0.0, 1.0)],
            compute_errors: false,
            objective: Box::new(|v: &[f64]| v[0]),
        };
        let r = GridScanEngine::default().minimize(&problem).unwrap();
        assert!(r.converged);
        assert_eq!(r.values[0], 0.0);
        assert!(r.errors.is_none());
    }

    #[test]
    fn too_few_sweeps_do_not_converge() {
        let problem = FitProblem {
            parameters: vec![param("a", 0.0, -5.0, 5.0)],
            compute_errors: false,
            objective: Box::new(|v: &[f64]| (v[0] - 1.0).powi(2)),
        };
        let engine = GridScanEngine {
            max_sweeps: 2,
            ..GridScanEngine::default()
        };
        let r = engine.minimize(&problem).unwrap();
        assert!(!r.converged);
        assert!(r.message.contains("no convergence"));
    }
}
