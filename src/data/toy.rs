//! Toy dataset generation from a registered pdf.
//!
//! Events are drawn by accept-reject inside the box spanned by the pdf's axis
//! ranges. The envelope is the largest value found on a grid over the box,
//! inflated by `ENVELOPE_MARGIN`; a sharper peak between grid points only
//! biases the toy slightly.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Uniform;

use crate::data::Dataset;
use crate::error::AppError;
use crate::math::linspace;
use crate::registry::{Evaluator, Registry};

const ENVELOPE_MARGIN: f64 = 1.2;
const GRID_POINTS: [usize; 3] = [400, 80, 30];
/// Give up after this many proposals per requested event.
const MAX_TRIES_PER_EVENT: usize = 10_000;

/// Draw `events` unweighted rows from `pdf`, one column per axis.
pub fn generate_toy(registry: &Registry, pdf: &str, events: usize, seed: u64) -> Result<Dataset, AppError> {
    if events == 0 {
        return Err(AppError::Dataset("toy event count must be > 0".to_string()));
    }
    registry.pdf(pdf)?;
    let mut ev = Evaluator::new(registry);
    let axes = ev.axes_of(pdf)?;
    if axes.is_empty() || axes.len() > GRID_POINTS.len() {
        return Err(AppError::evaluation(pdf, format!("cannot sample {} axes", axes.len())));
    }

    let mut bounds = Vec::with_capacity(axes.len());
    for axis in &axes {
        let Some(range) = registry.variable(axis)?.range else {
            return Err(AppError::evaluation(pdf, format!("axis '{axis}' is unbounded")));
        };
        bounds.push(range);
    }

    let envelope = scan_max(&mut ev, pdf, &axes, &bounds)? * ENVELOPE_MARGIN;
    if !(envelope.is_finite() && envelope > 0.0) {
        return Err(AppError::evaluation(pdf, format!("cannot sample, maximum is {envelope}")));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let uniforms: Vec<Uniform<f64>> = bounds.iter().map(|(lo, hi)| Uniform::new_inclusive(*lo, *hi)).collect();
    let unit = Uniform::new(0.0, envelope);

    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(events); axes.len()];
    let mut tries = 0usize;
    while columns[0].len() < events {
        tries += 1;
        if tries > events.saturating_mul(MAX_TRIES_PER_EVENT) {
            return Err(AppError::evaluation(pdf, "accept-reject efficiency too low"));
        }
        let point: Vec<f64> = uniforms.iter().map(|u| u.sample(&mut rng)).collect();
        for (axis, v) in axes.iter().zip(&point) {
            ev.set_axis(axis, *v);
        }
        if unit.sample(&mut rng) < ev.value(pdf)? {
            for (col, v) in columns.iter_mut().zip(point) {
                col.push(v);
            }
        }
    }

    Dataset::new(axes.into_iter().zip(columns).collect(), None)
}

fn scan_max(ev: &mut Evaluator<'_>, pdf: &str, axes: &[String], bounds: &[(f64, f64)]) -> Result<f64, AppError> {
    let steps = GRID_POINTS[axes.len() - 1];
    let grids: Vec<Vec<f64>> = bounds.iter().map(|(lo, hi)| linspace(*lo, *hi, steps)).collect();
    let mut index = vec![0usize; axes.len()];
    let mut best = 0.0f64;
    loop {
        for (d, axis) in axes.iter().enumerate() {
            ev.set_axis(axis, grids[d][index[d]]);
        }
        best = best.max(ev.value(pdf)?);

        // odometer increment over the grid
        let mut d = 0;
        loop {
            if d == index.len() {
                return Ok(best);
            }
            index[d] += 1;
            if index[d] < steps {
                break;
            }
            index[d] = 0;
            d += 1;
        }
    }
}
