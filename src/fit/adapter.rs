//! Fit adapter.
//!
//! The adapter prepares a fit and hands it to an external engine:
//!
//! - build the model into the registry when its label is not there yet
//! - collect the free parameters (parameter-role variables only)
//! - wrap the weighted unbinned negative log-likelihood as an objective,
//!   extended with a Poisson term on the total yield for extended sums
//! - write the engine's best values back into the registry
//! - for weighted data, replace the engine's errors with sandwich errors
//!
//! It never optimizes anything itself. Rendering data-vs-model overlays (one
//! projection per axis) is best effort: renderer failures are logged and
//! otherwise ignored.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::data::Dataset;
use crate::error::AppError;
use crate::fit::grid_scan::{covariance, hessian};
use crate::math::linspace;
use crate::models::Model;
use crate::registry::{Evaluator, Node, Registry};

/// Number of bins in rendered overlays.
const OVERLAY_BINS: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct FreeParameter {
    pub name: String,
    pub init: f64,
    pub lo: f64,
    pub hi: f64,
}

/// Objective to minimize over `parameters` (in order).
pub struct FitProblem<'a> {
    pub parameters: Vec<FreeParameter>,
    pub compute_errors: bool,
    pub objective: Box<dyn Fn(&[f64]) -> f64 + Sync + 'a>,
}

impl FitProblem<'_> {
    pub fn eval(&self, values: &[f64]) -> f64 {
        (self.objective)(values)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineResult {
    pub values: Vec<f64>,
    pub errors: Option<Vec<f64>>,
    pub nll: f64,
    pub converged: bool,
    pub evaluations: usize,
    pub message: String,
}

/// A minimizer. Engines must not assume anything about the objective beyond
/// it being deterministic.
pub trait FitEngine {
    fn minimize(&self, problem: &FitProblem<'_>) -> Result<EngineResult, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayBin {
    pub center: f64,
    pub data: f64,
    pub model: f64,
}

/// Binned data and fitted model expectation along one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub name: String,
    pub label: String,
    pub axis: String,
    pub bins: Vec<OverlayBin>,
}

pub trait Renderer {
    fn render(&self, overlay: &Overlay) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FitOptions {
    /// Render data-vs-model overlays after the fit.
    pub save: bool,
    pub compute_errors: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub values: BTreeMap<String, f64>,
    pub errors: BTreeMap<String, f64>,
    pub nll: f64,
    pub converged: bool,
    pub evaluations: usize,
}

/// Fit `model` (built under `label`) to `dataset`.
pub fn fit(
    model: &mut Model,
    registry: &mut Registry,
    dataset: &Dataset,
    label: &str,
    engine: &dyn FitEngine,
    renderer: Option<&dyn Renderer>,
    options: &FitOptions,
) -> Result<FitOutcome, AppError> {
    if !matches!(registry.node(label), Ok(Node::Pdf(_))) {
        model.build(registry, label)?;
    }

    let (axes, data) = fit_data(registry, dataset, label)?;
    let parameters = free_parameters(registry, label)?;
    debug!(
        label,
        events = data.len(),
        parameters = parameters.len(),
        "fit prepared"
    );

    let result = {
        let reg: &Registry = registry;
        let names: Vec<String> = parameters.iter().map(|p| p.name.clone()).collect();
        let problem = FitProblem {
            parameters,
            compute_errors: options.compute_errors,
            objective: Box::new({
                let (axes, data) = (&axes, &data);
                move |values: &[f64]| nll(reg, label, &names, values, axes, data)
            }),
        };
        let result = engine.minimize(&problem)?;
        if result.values.len() != problem.parameters.len() {
            return Err(AppError::FitConvergence {
                label: label.to_string(),
                message: format!(
                    "engine returned {} values for {} parameters",
                    result.values.len(),
                    problem.parameters.len()
                ),
            });
        }
        (result, problem.parameters)
    };
    let (result, parameters) = result;

    if !result.converged {
        return Err(AppError::FitConvergence {
            label: label.to_string(),
            message: result.message,
        });
    }

    let mut values = BTreeMap::new();
    for (p, v) in parameters.iter().zip(&result.values) {
        values.insert(p.name.clone(), registry.set_value(&p.name, *v)?);
    }
    let mut errors = BTreeMap::new();
    if options.compute_errors {
        let errs = if dataset.weights().is_some() {
            debug!(label, "weighted data, using sandwich errors");
            weighted_errors(registry, label, &parameters, &result.values, &axes, &data)
        } else {
            result.errors.clone()
        };
        match errs {
            Some(errs) => {
                for (p, e) in parameters.iter().zip(errs) {
                    errors.insert(p.name.clone(), e);
                }
            }
            None if !parameters.is_empty() => warn!(label, "parameter errors unavailable"),
            None => {}
        }
    }
    info!(
        model = %model.name,
        label,
        nll = result.nll,
        evaluations = result.evaluations,
        "fit converged"
    );

    if options.save {
        if let Some(renderer) = renderer {
            match overlays(registry, dataset, &model.name, label) {
                Ok(overlays) => {
                    for overlay in &overlays {
                        if let Err(err) = renderer.render(overlay) {
                            warn!(label, axis = %overlay.axis, "overlay not rendered: {err}");
                        }
                    }
                }
                Err(err) => warn!(label, "overlays not computed: {err}"),
            }
        }
    }

    Ok(FitOutcome {
        values,
        errors,
        nll: result.nll,
        converged: result.converged,
        evaluations: result.evaluations,
    })
}

/// Row-major `(axis values, weight)` pairs inside the axis ranges.
type Rows = Vec<(Vec<f64>, f64)>;

fn fit_data(registry: &Registry, dataset: &Dataset, label: &str) -> Result<(Vec<String>, Rows), AppError> {
    let axes = Evaluator::new(registry).axes_of(label)?;
    let mut ranges = Vec::with_capacity(axes.len());
    for axis in &axes {
        if let Some(range) = registry.variable(axis)?.range {
            ranges.push((axis.as_str(), range));
        }
    }
    let inside = dataset.restrict(&ranges)?;
    if inside.is_empty() {
        return Err(AppError::Dataset(format!("no events inside the ranges of '{label}'")));
    }
    let columns = axes
        .iter()
        .map(|a| inside.column(a))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = (0..inside.len())
        .map(|i| (columns.iter().map(|c| c[i]).collect(), inside.weight(i)))
        .collect();
    Ok((axes, rows))
}

/// Free parameters of `label` with their current values and ranges.
pub fn free_parameters(registry: &Registry, label: &str) -> Result<Vec<FreeParameter>, AppError> {
    Evaluator::new(registry)
        .free_parameters(label)?
        .into_iter()
        .map(|name| {
            let v = registry.variable(&name)?;
            let (lo, hi) = v.range.unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
            Ok(FreeParameter {
                init: v.value,
                lo,
                hi,
                name,
            })
        })
        .collect()
}

/// `-Σ w ln(p(x) / ∫p)`, plus `ν - (Σ w) ln ν` when `label` is an extended
/// sum with total yield `ν`. Any evaluation failure maps to `+∞`.
fn nll(registry: &Registry, label: &str, names: &[String], values: &[f64], axes: &[String], rows: &Rows) -> f64 {
    let mut ev = Evaluator::new(registry);
    for (name, v) in names.iter().zip(values) {
        ev.set(name, *v);
    }
    let mut total = 0.0;
    let mut sum_w = 0.0;
    for (point, w) in rows {
        for (axis, x) in axes.iter().zip(point) {
            ev.set_axis(axis, *x);
        }
        match ev.density(label) {
            Ok(d) if d > 0.0 => total -= w * d.ln(),
            _ => return f64::INFINITY,
        }
        sum_w += w;
    }
    match ev.expected_events(label) {
        Ok(None) => total,
        Ok(Some(nu)) if nu > 0.0 => total + nu - sum_w * nu.ln(),
        _ => f64::INFINITY,
    }
}

/// `sqrt(diag(V C V))` at `best`, with `V` the inverse Hessian of the
/// weighted NLL and `C` the Hessian of the NLL with squared weights.
fn weighted_errors(
    registry: &Registry,
    label: &str,
    parameters: &[FreeParameter],
    best: &[f64],
    axes: &[String],
    rows: &Rows,
) -> Option<Vec<f64>> {
    let names: Vec<String> = parameters.iter().map(|p| p.name.clone()).collect();
    let weighted = |v: &[f64]| nll(registry, label, &names, v, axes, rows);
    let v = covariance(hessian(parameters, &weighted, best, weighted(best)).0?)?;

    let squared: Rows = rows.iter().map(|(point, w)| (point.clone(), w * w)).collect();
    let squared_nll = |v: &[f64]| nll(registry, label, &names, v, axes, &squared);
    let c = hessian(parameters, &squared_nll, best, squared_nll(best)).0?;

    let sandwich = &v * c * &v;
    let diag = sandwich.diagonal();
    if diag.iter().any(|d| !(*d > 0.0)) {
        debug!(label, "sandwich covariance is not positive");
        return None;
    }
    Some(diag.iter().map(|d| d.sqrt()).collect())
}

/// One data-vs-model histogram per axis of the pdf.
///
/// Data are the events inside every axis range. The model curve is the
/// pdf projected onto the axis, scaled to the expected yield of an extended
/// sum or to the data total otherwise.
fn overlays(registry: &Registry, dataset: &Dataset, name: &str, label: &str) -> Result<Vec<Overlay>, AppError> {
    let mut ev = Evaluator::new(registry);
    let axes = ev.axes_of(label)?;
    let mut ranges = Vec::with_capacity(axes.len());
    for axis in &axes {
        let Some(range) = registry.variable(axis)?.range else {
            return Err(AppError::evaluation(label, format!("axis '{axis}' is unbounded")));
        };
        ranges.push((axis.as_str(), range));
    }
    let inside = dataset.restrict(&ranges)?;
    let total = ev.expected_events(label)?.unwrap_or_else(|| inside.total_weight());

    let mut out = Vec::with_capacity(axes.len());
    for &(axis, (lo, hi)) in &ranges {
        let xs = inside.column(axis)?;
        let width = (hi - lo) / OVERLAY_BINS as f64;
        let edges = linspace(lo, hi, OVERLAY_BINS + 1);
        let mut data = vec![0.0; OVERLAY_BINS];
        for (i, x) in xs.iter().enumerate() {
            let bin = (((x - lo) / width) as usize).min(OVERLAY_BINS - 1);
            data[bin] += inside.weight(i);
        }

        let mut bins = Vec::with_capacity(OVERLAY_BINS);
        for (b, counts) in data.into_iter().enumerate() {
            let center = 0.5 * (edges[b] + edges[b + 1]);
            ev.set_axis(axis, center);
            bins.push(OverlayBin {
                center,
                data: counts,
                model: total * width * ev.marginal_density(label, axis)?,
            });
        }
        out.push(Overlay {
            name: name.to_string(),
            label: label.to_string(),
            axis: axis.to_string(),
            bins,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Axes, ModelSpec, ParamRange, ProductConfig, ShapeConfig, ShapeKind};
    use approx::assert_relative_eq;
    use std::cell::{Cell, RefCell};

    struct FixedEngine {
        converged: bool,
    }

    impl FitEngine for FixedEngine {
        fn minimize(&self, problem: &FitProblem<'_>) -> Result<EngineResult, AppError> {
            let values: Vec<f64> = problem.parameters.iter().map(|p| p.init).collect();
            Ok(EngineResult {
                nll: problem.eval(&values),
                values,
                errors: None,
                converged: self.converged,
                evaluations: 1,
                message: "stopped".to_string(),
            })
        }
    }

    struct FailingRenderer {
        calls: Cell<usize>,
    }

    impl Renderer for FailingRenderer {
        fn render(&self, _overlay: &Overlay) -> Result<(), AppError> {
            self.calls.set(self.calls.get() + 1);
            Err(AppError::Io("disk full".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingRenderer {
        overlays: RefCell<Vec<Overlay>>,
    }

    impl Renderer for RecordingRenderer {
        fn render(&self, overlay: &Overlay) -> Result<(), AppError> {
            self.overlays.borrow_mut().push(overlay.clone());
            Ok(())
        }
    }

    fn gaussian() -> (Model, Registry, Dataset) {
        let spec = ModelSpec::Shape(
            ShapeConfig::fixed(ShapeKind::Gaussian)
                .with_range("mean", ParamRange::new(100.0, 0.0, 200.0))
                .with_range("sigma", ParamRange::new(5.0, 0.0, 20.0)),
        );
        let model = Model::new("sig", Axes::default(), spec).unwrap();
        let mut reg = Registry::new();
        reg.declare_axis("x", 0.0, 200.0).unwrap();
        let data = Dataset::new(vec![("x".into(), vec![95.0, 100.0, 105.0, 250.0])], None).unwrap();
        (model, reg, data)
    }

    #[test]
    fn non_converged_engine_is_surfaced() {
        let (mut model, mut reg, data) = gaussian();
        let err = fit(
            &mut model,
            &mut reg,
            &data,
            "sig",
            &FixedEngine { converged: false },
            None,
            &FitOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::FitConvergence { .. }));
    }

    #[test]
    fn renderer_failure_does_not_change_results() {
        let (mut model, mut reg, data) = gaussian();
        let renderer = FailingRenderer { calls: Cell::new(0) };
        let options = FitOptions {
            save: true,
            compute_errors: false,
        };
        let out = fit(
            &mut model,
            &mut reg,
            &data,
            "sig",
            &FixedEngine { converged: true },
            Some(&renderer),
            &options,
        )
        .unwrap();
        assert_eq!(renderer.calls.get(), 1);
        assert_eq!(out.values["mean_sig"], 100.0);
        assert!(out.nll.is_finite());
        assert!(out.errors.is_empty());
    }

    #[test]
    fn spline_backed_and_fixed_values_are_not_free() {
        let mut reg = Registry::new();
        reg.declare_axis("x", 0.0, 200.0).unwrap();
        reg.declare_expression("m", "SPLINE(MH, {100, 150}, {100, 150})").unwrap();
        reg.declare_expression("g", "Gaussian(x, m, s[5, 1, 20])").unwrap();
        let free = free_parameters(&reg, "g").unwrap();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0], FreeParameter { name: "s".into(), init: 5.0, lo: 1.0, hi: 20.0 });
    }

    #[test]
    fn two_dimensional_fit_renders_one_overlay_per_axis() {
        let mut reg = Registry::new();
        reg.declare_axis("x", 0.0, 200.0).unwrap();
        reg.declare_axis("y", 0.0, 100.0).unwrap();
        reg.declare_expression("gx", "Gaussian(x, mx[100, 0, 200], sx[10])").unwrap();
        reg.declare_expression("gy", "Gaussian(y, my[50, 0, 100], sy[10])").unwrap();
        let mut model = Model::new("p", Axes::default(), ModelSpec::Product(ProductConfig::new(["gx", "gy"]))).unwrap();
        let data = Dataset::new(
            vec![
                ("x".into(), vec![90.0, 95.0, 100.0, 105.0, 110.0, 100.0, 300.0]),
                ("y".into(), vec![40.0, 45.0, 50.0, 55.0, 60.0, 50.0, 50.0]),
            ],
            None,
        )
        .unwrap();
        let renderer = RecordingRenderer::default();
        let options = FitOptions {
            save: true,
            compute_errors: false,
        };
        fit(
            &mut model,
            &mut reg,
            &data,
            "p",
            &FixedEngine { converged: true },
            Some(&renderer),
            &options,
        )
        .unwrap();

        let overlays = renderer.overlays.borrow();
        let axes: Vec<&str> = overlays.iter().map(|o| o.axis.as_str()).collect();
        assert_eq!(axes, ["x", "y"]);
        for overlay in overlays.iter() {
            assert_eq!(overlay.name, "p");
            assert_eq!(overlay.bins.len(), OVERLAY_BINS);
            let data: f64 = overlay.bins.iter().map(|b| b.data).sum();
            let model: f64 = overlay.bins.iter().map(|b| b.model).sum();
            assert_eq!(data, 6.0);
            assert_relative_eq!(model, data, max_relative = 1e-3);
        }
    }
}
