//! Evaluation of registered objects.
//!
//! An `Evaluator` borrows the registry read-only and layers per-evaluation
//! overrides on top of the stored variable values. Shapes evaluate
//! unnormalized; `density` divides by the integral over the pdf's own axes,
//! computed by nested Simpson quadrature and cached for the evaluator's
//! lifetime (overrides invalidate the cache).

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use super::{Function, Node, Pdf, Registry, SumTerm};
use crate::domain::{ShapeKind, SumMode};
use crate::error::AppError;
use crate::math::{self, special};

/// Simpson intervals per axis, by number of axes integrated at once.
const INTERVALS: [usize; 3] = [200, 60, 24];

pub struct Evaluator<'r> {
    registry: &'r Registry,
    overrides: HashMap<String, f64>,
    integrals: RefCell<HashMap<String, f64>>,
}

/// Axis values fixed by an enclosing integration.
type Point<'a> = &'a [(&'a str, f64)];

impl<'r> Evaluator<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            overrides: HashMap::new(),
            integrals: RefCell::new(HashMap::new()),
        }
    }

    /// Override a variable's value for this evaluator (not clamped).
    pub fn set(&mut self, name: &str, value: f64) {
        self.overrides.insert(name.to_string(), value);
        self.integrals.get_mut().clear();
    }

    /// Override an axis value without invalidating cached integrals.
    pub fn set_axis(&mut self, name: &str, value: f64) {
        self.overrides.insert(name.to_string(), value);
    }

    /// Current value of a variable, function, or (unnormalized) pdf.
    pub fn value(&self, name: &str) -> Result<f64, AppError> {
        self.value_at(name, &[])
    }

    /// Normalized density of `name` at the current axis values.
    pub fn density(&self, name: &str) -> Result<f64, AppError> {
        let value = self.value(name)?;
        let norm = self.integral(name)?;
        if !(norm.is_finite() && norm > 0.0) {
            return Err(AppError::evaluation(name, format!("normalization integral is {norm}")));
        }
        let density = value / norm;
        if !density.is_finite() {
            return Err(AppError::evaluation(name, format!("density is {density}")));
        }
        Ok(density)
    }

    /// Integral of `name` over its axes (cached).
    pub fn integral(&self, name: &str) -> Result<f64, AppError> {
        if let Some(v) = self.integrals.borrow().get(name) {
            return Ok(*v);
        }
        let axes = self.axes_of(name)?;
        let (bounds, intervals) = self.bounds(name, &axes)?;
        let mut point = Vec::with_capacity(bounds.len());
        let v = self.integrate(name, &bounds, intervals, &mut point)?;
        self.integrals.borrow_mut().insert(name.to_string(), v);
        Ok(v)
    }

    /// Normalized density of `name` projected onto `axis`.
    ///
    /// `axis` takes its current value; every other axis of the pdf is
    /// integrated out over its range.
    pub fn marginal_density(&self, name: &str, axis: &str) -> Result<f64, AppError> {
        let axes = self.axes_of(name)?;
        if !axes.iter().any(|a| a == axis) {
            return Err(AppError::evaluation(name, format!("pdf does not depend on axis '{axis}'")));
        }
        let others: Vec<String> = axes.into_iter().filter(|a| a != axis).collect();
        let (bounds, intervals) = self.bounds(name, &others)?;
        let at = self.variable_value(axis, &[])?;
        let mut point = Vec::with_capacity(others.len() + 1);
        point.push((axis, at));
        let projected = self.integrate(name, &bounds, intervals, &mut point)?;
        let norm = self.integral(name)?;
        if !(norm.is_finite() && norm > 0.0) {
            return Err(AppError::evaluation(name, format!("normalization integral is {norm}")));
        }
        Ok(projected / norm)
    }

    /// Expected event count of an extended sum (the sum of its yields);
    /// `None` for every other pdf.
    pub fn expected_events(&self, name: &str) -> Result<Option<f64>, AppError> {
        match self.registry.pdf(name)? {
            Pdf::Sum {
                mode: SumMode::Extended,
                terms,
            } => {
                let yields = self.coefficients(SumMode::Extended, terms, &[])?;
                Ok(Some(yields.iter().sum()))
            }
            _ => Ok(None),
        }
    }

    /// Integration ranges of `axes` and the Simpson intervals to use for them.
    fn bounds<'a>(&self, name: &str, axes: &'a [String]) -> Result<(Vec<(&'a str, (f64, f64))>, usize), AppError> {
        let mut bounds = Vec::with_capacity(axes.len());
        for axis in axes {
            let var = self.registry.variable(axis)?;
            let Some(range) = var.range else {
                return Err(AppError::evaluation(
                    name,
                    format!("axis '{axis}' has no range to integrate over"),
                ));
            };
            bounds.push((axis.as_str(), range));
        }
        if bounds.len() > INTERVALS.len() {
            return Err(AppError::evaluation(name, format!("cannot integrate over {} axes", bounds.len())));
        }
        let intervals = if bounds.is_empty() { 0 } else { INTERVALS[bounds.len() - 1] };
        Ok((bounds, intervals))
    }

    fn integrate<'a>(
        &self,
        name: &str,
        bounds: &[(&'a str, (f64, f64))],
        intervals: usize,
        point: &mut Vec<(&'a str, f64)>,
    ) -> Result<f64, AppError> {
        let Some(((axis, (lo, hi)), rest)) = bounds.split_first() else {
            return self.value_at(name, point);
        };
        let mut failure = None;
        let total = math::simpson(
            |x| {
                if failure.is_some() {
                    return 0.0;
                }
                point.push((*axis, x));
                let v = self.integrate(name, rest, intervals, point);
                point.pop();
                v.unwrap_or_else(|e| {
                    failure = Some(e);
                    0.0
                })
            },
            *lo,
            *hi,
            intervals,
        );
        match failure {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }

    fn variable_value(&self, name: &str, point: Point<'_>) -> Result<f64, AppError> {
        if let Some((_, v)) = point.iter().find(|(axis, _)| *axis == name) {
            return Ok(*v);
        }
        if let Some(v) = self.overrides.get(name) {
            return Ok(*v);
        }
        Ok(self.registry.variable(name)?.value)
    }

    fn value_at(&self, name: &str, point: Point<'_>) -> Result<f64, AppError> {
        match self.registry.node(name)? {
            Node::Variable(_) => self.variable_value(name, point),
            Node::Function(Function::Spline(i)) => {
                let t = self.value_at(&i.control, point)?;
                Ok(i.spline.eval(t))
            }
            Node::Function(Function::Shifted { central, terms }) => {
                let mut v = self.value_at(central, point)?;
                for term in terms {
                    let nu = self.value_at(&term.nuisance, point)?;
                    if nu > 0.0 {
                        v += nu * self.value_at(&term.up, point)?;
                    } else if nu < 0.0 {
                        v += nu * self.value_at(&term.down, point)?;
                    }
                }
                Ok(v)
            }
            Node::Pdf(Pdf::Shape {
                kind,
                x,
                params,
                y_max,
            }) => {
                let xv = self.value_at(x, point)?;
                let p = params
                    .iter()
                    .map(|p| self.value_at(p, point))
                    .collect::<Result<Vec<_>, _>>()?;
                self.shape_value(name, *kind, x, xv, &p, *y_max)
            }
            Node::Pdf(Pdf::Sum { mode, terms }) => {
                let coefficients = self.coefficients(*mode, terms, point)?;
                let mut total = 0.0;
                for (c, term) in coefficients.iter().zip(terms) {
                    let norm = self.integral(&term.pdf)?;
                    if !(norm.is_finite() && norm > 0.0) {
                        return Err(AppError::evaluation(
                            &term.pdf,
                            format!("normalization integral is {norm}"),
                        ));
                    }
                    total += c * self.value_at(&term.pdf, point)? / norm;
                }
                Ok(total)
            }
            Node::Pdf(Pdf::Product { factors }) => factors
                .iter()
                .try_fold(1.0, |acc, f| self.value_at(f, point).map(|v| acc * v)),
        }
    }

    fn shape_value(
        &self,
        name: &str,
        kind: ShapeKind,
        axis: &str,
        x: f64,
        p: &[f64],
        y_max: Option<f64>,
    ) -> Result<f64, AppError> {
        let arity = |n: usize| {
            if p.len() == n {
                Ok(())
            } else {
                Err(AppError::evaluation(name, format!("expected {n} parameters, got {}", p.len())))
            }
        };
        let v = match kind {
            ShapeKind::Gaussian => {
                arity(2)?;
                special::gaussian(x, p[0], p[1])
            }
            ShapeKind::BreitWigner => {
                arity(2)?;
                special::breit_wigner(x, p[0], p[1])
            }
            ShapeKind::Voigtian => {
                arity(3)?;
                special::voigtian(x, p[0], p[1], p[2])
            }
            ShapeKind::CrystalBall => {
                arity(4)?;
                special::crystal_ball(x, p[0], p[1], p[2], p[3])
            }
            ShapeKind::DoubleCrystalBall => {
                arity(6)?;
                special::double_crystal_ball(x, p[0], p[1], p[2], p[3], p[4], p[5])
            }
            ShapeKind::DoubleSidedGaussian => {
                arity(3)?;
                special::double_sided_gaussian(x, p[0], p[1], p[2], y_max)
            }
            ShapeKind::DoubleSidedVoigtian => {
                arity(5)?;
                special::double_sided_voigtian(x, p[0], p[1], p[2], p[3], p[4], y_max)
            }
            ShapeKind::Polynomial => math::power_series(x, p),
            ShapeKind::Chebychev => {
                let Some((lo, hi)) = self.registry.variable(axis)?.range else {
                    return Err(AppError::evaluation(
                        name,
                        format!("Chebychev needs a bounded axis, '{axis}' is unbounded"),
                    ));
                };
                math::chebyshev_series(math::to_unit_interval(x, lo, hi), p)
            }
            ShapeKind::Exponential => {
                arity(1)?;
                special::exponential(x, p[0])
            }
            ShapeKind::Erf => {
                arity(2)?;
                special::erf_turn_on(x, p[0], p[1])
            }
        };
        if v.is_nan() {
            return Err(AppError::evaluation(name, format!("{kind:?} evaluated to NaN at {x}")));
        }
        Ok(v)
    }

    fn coefficients(&self, mode: SumMode, terms: &[SumTerm], point: Point<'_>) -> Result<Vec<f64>, AppError> {
        let fraction = |t: &SumTerm| -> Result<f64, AppError> {
            match &t.fraction {
                Some(f) => self.value_at(f, point),
                None => Ok(0.0),
            }
        };
        let n = terms.len();
        let mut out = Vec::with_capacity(n);
        match mode {
            SumMode::Extended => {
                for t in terms {
                    out.push(fraction(t)?);
                }
            }
            SumMode::Plain => {
                let mut used = 0.0;
                for t in &terms[..n.saturating_sub(1)] {
                    let f = fraction(t)?;
                    used += f;
                    out.push(f);
                }
                out.push(1.0 - used);
            }
            SumMode::Recursive => {
                let mut remaining = 1.0;
                for t in &terms[..n.saturating_sub(1)] {
                    let f = fraction(t)?;
                    out.push(remaining * f);
                    remaining *= 1.0 - f;
                }
                out.push(remaining);
            }
        }
        Ok(out)
    }

    /// Mixing coefficients of a sum at the current parameter values.
    ///
    /// Recursive sums always add up to one.
    pub fn sum_coefficients(&self, name: &str) -> Result<Vec<f64>, AppError> {
        match self.registry.pdf(name)? {
            Pdf::Sum { mode, terms } => self.coefficients(*mode, terms, &[]),
            _ => Err(AppError::evaluation(name, "not a sum")),
        }
    }

    /// Axis variables a pdf depends on, sorted.
    pub fn axes_of(&self, name: &str) -> Result<Vec<String>, AppError> {
        let mut axes = BTreeSet::new();
        self.collect_axes(name, &mut axes)?;
        Ok(axes.into_iter().collect())
    }

    fn collect_axes(&self, name: &str, axes: &mut BTreeSet<String>) -> Result<(), AppError> {
        match self.registry.node(name)? {
            Node::Pdf(Pdf::Shape { x, .. }) => {
                axes.insert(x.clone());
            }
            Node::Pdf(Pdf::Sum { terms, .. }) => {
                for t in terms {
                    self.collect_axes(&t.pdf, axes)?;
                }
            }
            Node::Pdf(Pdf::Product { factors }) => {
                for f in factors {
                    self.collect_axes(f, axes)?;
                }
            }
            Node::Variable(_) | Node::Function(_) => {}
        }
        Ok(())
    }

    /// Free parameters reachable from `name`, sorted.
    ///
    /// Only `Parameter`-role variables with a non-degenerate range qualify;
    /// spline-backed values, controls, nuisances and constants never float.
    pub fn free_parameters(&self, name: &str) -> Result<Vec<String>, AppError> {
        let mut found = BTreeSet::new();
        let mut stack = vec![name.to_string()];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            match self.registry.node(&current)? {
                Node::Variable(v) => {
                    if v.is_free() {
                        found.insert(current);
                    }
                }
                Node::Function(Function::Spline(i)) => stack.push(i.control.clone()),
                Node::Function(Function::Shifted { central, terms }) => {
                    stack.push(central.clone());
                    for t in terms {
                        stack.extend([t.nuisance.clone(), t.up.clone(), t.down.clone()]);
                    }
                }
                Node::Pdf(Pdf::Shape { x, params, .. }) => {
                    stack.push(x.clone());
                    stack.extend(params.iter().cloned());
                }
                Node::Pdf(Pdf::Sum { terms, .. }) => {
                    for t in terms {
                        stack.push(t.pdf.clone());
                        stack.extend(t.fraction.iter().cloned());
                    }
                }
                Node::Pdf(Pdf::Product { factors }) => stack.extend(factors.iter().cloned()),
            }
        }
        Ok(found.into_iter().collect())
    }
}
