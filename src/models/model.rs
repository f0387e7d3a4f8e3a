//! Named models.
//!
//! A `Model` pairs a validated `ModelSpec` with axis names. Building it under
//! a label declares everything its `ModelSpec` describes in a registry and records
//! the model's parameter names; building twice under the same label recycles
//! every object.

use tracing::debug;

use crate::domain::{Axes, IntegralSpline, ModelSpec, check_knots};
use crate::error::AppError;
use crate::models::composite::{build_product, build_sum};
use crate::models::shapes::build_shape;
use crate::models::spline::build_interpolant;
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub name: String,
    pub axes: Axes,
    pub spec: ModelSpec,
    pub integral: Option<IntegralSpline>,
    params: Vec<String>,
}

impl Model {
    /// Validate `spec` and wrap it. Bad configurations fail here, before
    /// anything is declared.
    pub fn new(name: &str, axes: Axes, spec: ModelSpec) -> Result<Self, AppError> {
        spec.validate(name)?;
        Ok(Self {
            name: name.to_string(),
            axes,
            spec,
            integral: None,
            params: Vec::new(),
        })
    }

    /// Attach a mass-dependent integral.
    pub fn with_integral(mut self, integral: IntegralSpline) -> Result<Self, AppError> {
        check_knots(&integral.masses).map_err(|m| AppError::shape_config(&self.name, m))?;
        if integral.values.len() != integral.masses.len() {
            return Err(AppError::shape_config(
                &self.name,
                format!(
                    "integral has {} values for {} masses",
                    integral.values.len(),
                    integral.masses.len()
                ),
            ));
        }
        self.integral = Some(integral);
        Ok(self)
    }

    /// Registry names from the last successful build: `<role>_<label>` for
    /// shapes, created fraction variables for sums, nothing for products.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Declare the model under `label` and return the label.
    pub fn build(&mut self, registry: &mut Registry, label: &str) -> Result<String, AppError> {
        debug!(model = %self.name, label, "building model");
        self.params = match &self.spec {
            ModelSpec::Shape(config) => build_shape(registry, label, &self.axes, config)?,
            ModelSpec::Sum(config) => build_sum(registry, label, config)?,
            ModelSpec::Product(config) => build_product(registry, label, config)?,
        };
        Ok(label.to_string())
    }

    /// Register the integral spline (if any) under `name`.
    pub fn build_integral(&self, registry: &mut Registry, name: &str) -> Result<Option<String>, AppError> {
        let Some(integral) = &self.integral else {
            return Ok(None);
        };
        build_interpolant(registry, name, &integral.control, &integral.masses, &integral.values).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DEFAULT_CONTROL, ParamRange, ShapeConfig, ShapeKind, SplineValues};

    #[test]
    fn fixed_gaussian_scenario() {
        let spec = ModelSpec::Shape(
            ShapeConfig::fixed(ShapeKind::Gaussian)
                .with_range("mean", ParamRange::new(100.0, 0.0, 200.0))
                .with_range("sigma", ParamRange::new(5.0, 0.0, 20.0)),
        );
        let mut model = Model::new("sig", Axes::default(), spec).unwrap();
        let mut reg = Registry::new();
        assert_eq!(model.build(&mut reg, "sig").unwrap(), "sig");
        assert_eq!(model.params(), ["mean_sig", "sigma_sig"]);
        assert!(model.params().iter().all(|p| reg.contains(p)));
        assert_eq!(reg.variable("mean_sig").unwrap().value, 100.0);
        assert_eq!(reg.variable("sigma_sig").unwrap().value, 5.0);
        assert!(reg.pdf("sig").is_ok());

        let before = reg.len();
        model.build(&mut reg, "sig").unwrap();
        assert_eq!(reg.len(), before);
    }

    #[test]
    fn degenerate_spline_spec_is_rejected_up_front() {
        let spec = ModelSpec::Shape(
            ShapeConfig::spline(ShapeKind::Gaussian, vec![125.0])
                .with_values("mean", SplineValues::plain(vec![125.0]))
                .with_values("sigma", SplineValues::plain(vec![1.0])),
        );
        assert!(matches!(
            Model::new("sig", Axes::default(), spec),
            Err(AppError::ShapeConfig { .. })
        ));
    }

    #[test]
    fn integral_spline_is_registered_on_request() {
        let spec = ModelSpec::Shape(ShapeConfig::fixed(ShapeKind::Exponential));
        let model = Model::new("bg", Axes::default(), spec)
            .unwrap()
            .with_integral(IntegralSpline {
                control: DEFAULT_CONTROL.to_string(),
                masses: vec![100.0, 150.0],
                values: vec![10.0, 20.0],
            })
            .unwrap();
        let mut reg = Registry::new();
        assert_eq!(
            model.build_integral(&mut reg, "bg_norm").unwrap().as_deref(),
            Some("bg_norm")
        );
        assert!(reg.function("bg_norm").is_ok());

        let plain = Model::new("bg", Axes::default(), ModelSpec::Shape(ShapeConfig::fixed(ShapeKind::Exponential))).unwrap();
        assert_eq!(plain.build_integral(&mut reg, "other").unwrap(), None);
    }
}
