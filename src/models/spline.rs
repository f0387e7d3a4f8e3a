//! Interpolant builders.
//!
//! A parameter known only at a few control values (masses) becomes a natural
//! cubic spline over the control variable. With systematic shifts the
//! parameter becomes `central + Σ max(0, ν)·up + min(0, ν)·down`, where `up`
//! and `down` are splines of the deltas from the central values.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::{ShiftValues, check_knots};
use crate::error::AppError;
use crate::expr::{Ctor, Expr};
use crate::math::CubicSpline;
use crate::registry::{Function, Interpolant, Node, Registry};

/// Register a spline `name` through `(masses, values)` over `control`.
///
/// The control variable is declared with the knot span as range, or widened
/// to cover it when another spline already shares it.
/// An existing function of the same name is recycled.
pub fn build_interpolant(
    registry: &mut Registry,
    name: &str,
    control: &str,
    masses: &[f64],
    values: &[f64],
) -> Result<String, AppError> {
    check_knots(masses).map_err(|m| AppError::shape_config(name, m))?;
    if values.len() != masses.len() {
        return Err(AppError::shape_config(
            name,
            format!("{} values for {} masses", values.len(), masses.len()),
        ));
    }
    let spline = CubicSpline::new(masses, values).map_err(|e| AppError::shape_config(name, e.to_string()))?;

    let (lo, hi) = (masses[0], masses[masses.len() - 1]);
    registry.ensure_control(control, lo, hi, 0.5 * (lo + hi))?;

    debug!(name, control, knots = masses.len(), "spline");
    let node = Node::Function(Function::Spline(Interpolant {
        control: control.to_string(),
        spline,
    }));
    registry.import_object(name, node, true)?;
    Ok(name.to_string())
}

/// Register `label` as a shift-corrected interpolant.
///
/// Builds `<label>_central` plus `<label>_<shift>Up` / `<label>_<shift>Down`
/// delta splines for each shift, with the shift name as a nuisance variable.
/// Without shifts this is a plain interpolant named `label`.
pub fn build_shifted(
    registry: &mut Registry,
    label: &str,
    control: &str,
    masses: &[f64],
    central: &[f64],
    shifts: &BTreeMap<String, ShiftValues>,
) -> Result<String, AppError> {
    if shifts.is_empty() {
        return build_interpolant(registry, label, control, masses, central);
    }

    let central_name = build_interpolant(registry, &format!("{label}_central"), control, masses, central)?;
    let mut args = vec![Expr::reference(central_name)];
    for (shift, sv) in shifts {
        let delta = |side: &[f64], which: &str| -> Result<Vec<f64>, AppError> {
            if side.len() != central.len() {
                return Err(AppError::shape_config(
                    label,
                    format!("shift '{shift}' {which} has {} values for {} masses", side.len(), central.len()),
                ));
            }
            Ok(side.iter().zip(central).map(|(s, c)| s - c).collect())
        };
        let up = delta(&sv.up, "up")?;
        let down = delta(&sv.down, "down")?;
        let up = build_interpolant(registry, &format!("{label}_{shift}Up"), control, masses, &up)?;
        let down = build_interpolant(registry, &format!("{label}_{shift}Down"), control, masses, &down)?;
        args.push(Expr::List(vec![
            Expr::reference(shift.as_str()),
            Expr::reference(up),
            Expr::reference(down),
        ]));
    }
    registry.declare_expr(&Expr::call(Ctor::Shift, label, args))
}
