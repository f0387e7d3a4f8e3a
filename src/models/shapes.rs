//! Elementary shape builders.
//!
//! One build function serves every `ShapeKind`; the kind's registration
//! table (`ShapeKind::roles`) supplies parameter names and default ranges.
//! Every parameter is named `<role>_<label>`.

use crate::domain::{Axes, ParamMode, ShapeConfig};
use crate::error::AppError;
use crate::expr::{Ctor, Expr};
use crate::models::spline::build_shifted;
use crate::registry::Registry;

/// Declare the shape `label` and return its parameter names (`<role>_<label>`)
/// in catalogue order.
pub fn build_shape(
    registry: &mut Registry,
    label: &str,
    axes: &Axes,
    config: &ShapeConfig,
) -> Result<Vec<String>, AppError> {
    config.validate(label)?;
    let kind = config.kind;
    let roles = kind.roles(config.order);

    let mut params = Vec::with_capacity(roles.len());
    let mut names = Vec::with_capacity(roles.len());
    for (role, default) in &roles {
        let name = format!("{role}_{label}");
        names.push(name.clone());
        let arg = match &config.params {
            ParamMode::Fixed { params } => Expr::var(name, params.get(role).copied().unwrap_or(*default)),
            ParamMode::Spline {
                control,
                masses,
                params,
            } => {
                let values = params
                    .get(role)
                    .ok_or_else(|| AppError::shape_config(label, format!("missing training values for '{role}'")))?;
                Expr::reference(build_shifted(
                    registry,
                    &name,
                    control,
                    masses,
                    &values.values,
                    &values.shifts,
                )?)
            }
        };
        params.push(arg);
    }

    let mut args = vec![Expr::reference(axes.x.as_str())];
    if kind.is_series() {
        args.push(Expr::List(params));
    } else {
        args.extend(params);
    }
    if let Some(y_max) = config.y_max {
        args.push(Expr::Number(y_max));
    }

    registry.declare_expr(&Expr::call(Ctor::Shape(kind), label, args))?;
    Ok(names)
}
