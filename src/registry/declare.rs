//! Registration of expression trees.
//!
//! Arguments are declared left to right. References must already exist, with
//! one exception: the first argument of a shape is its axis and is declared
//! (unbounded) when absent.

use tracing::debug;

use super::{Function, Interpolant, Node, Pdf, Registry, ShiftTerm, SumTerm};
use crate::domain::{ParamRange, ShapeKind, SumMode};
use crate::error::{AppError, Warning};
use crate::expr::{Ctor, Expr};
use crate::math::CubicSpline;

fn parse_error(expr: &Expr, message: impl Into<String>) -> AppError {
    AppError::Parse {
        text: expr.to_string(),
        message: message.into(),
    }
}

impl Registry {
    pub(crate) fn declare_term(&mut self, expr: &Expr) -> Result<String, AppError> {
        match expr {
            Expr::Ref(name) => {
                self.node(name)?;
                Ok(name.clone())
            }
            Expr::Number(v) => {
                let name = v.to_string();
                self.declare_variable(&name, *v, *v, *v)?;
                Ok(name)
            }
            Expr::Var { name, values } => {
                let range = ParamRange::from_slice(values).map_err(|message| parse_error(expr, message))?;
                self.declare_variable(name, range.init, range.lo, range.hi)?;
                Ok(name.clone())
            }
            Expr::List(_) | Expr::Scaled(..) => Err(parse_error(expr, "expected a single term")),
            Expr::Call { ctor, name, args } => {
                let Some(name) = name else {
                    return Err(parse_error(expr, format!("{} needs a name", ctor.name())));
                };
                match ctor {
                    Ctor::Shape(kind) => self.declare_shape(expr, name, *kind, args),
                    Ctor::Sum | Ctor::RecursiveSum => self.declare_sum(expr, name, *ctor, args),
                    Ctor::Product => self.declare_product(name, args),
                    Ctor::Spline => self.declare_spline(expr, name, args),
                    Ctor::Shift => self.declare_shift(expr, name, args),
                }
            }
        }
    }

    /// A term usable as a value: a variable or a function.
    fn declare_scalar(&mut self, expr: &Expr) -> Result<String, AppError> {
        let name = self.declare_term(expr)?;
        let node = self.node(&name)?;
        if !node.is_scalar() {
            return Err(AppError::KindConflict {
                name,
                existing: node.kind_name(),
                requested: "variable",
            });
        }
        Ok(name)
    }

    fn declare_pdf_ref(&mut self, expr: &Expr) -> Result<String, AppError> {
        let name = self.declare_term(expr)?;
        self.pdf(&name)?;
        Ok(name)
    }

    fn declare_shape(&mut self, expr: &Expr, name: &str, kind: ShapeKind, args: &[Expr]) -> Result<String, AppError> {
        let Some((axis, rest)) = args.split_first() else {
            return Err(parse_error(expr, "a shape needs an axis"));
        };
        let x = match axis {
            Expr::Ref(axis) => {
                self.ensure_axis(axis)?;
                axis.clone()
            }
            other => self.declare_scalar(other)?,
        };

        let mut y_max = None;
        let params = if kind.is_series() {
            let [Expr::List(coefficients)] = rest else {
                return Err(parse_error(expr, "a series shape takes `{coefficients}`"));
            };
            if coefficients.is_empty() {
                return Err(parse_error(expr, "a series shape needs at least one coefficient"));
            }
            coefficients
                .iter()
                .map(|c| self.declare_scalar(c))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let n_roles = kind.roles(0).len();
            let role_args = match rest {
                [head @ .., Expr::Number(cut)] if kind.takes_y_max() && head.len() == n_roles => {
                    y_max = Some(*cut);
                    head
                }
                _ => rest,
            };
            if role_args.len() != n_roles {
                return Err(parse_error(
                    expr,
                    format!("{} takes {n_roles} parameters, got {}", kind.ctor_name(), role_args.len()),
                ));
            }
            role_args
                .iter()
                .map(|p| self.declare_scalar(p))
                .collect::<Result<Vec<_>, _>>()?
        };

        self.insert_or_recycle(
            name,
            Node::Pdf(Pdf::Shape {
                kind,
                x,
                params,
                y_max,
            }),
        )?;
        Ok(name.to_string())
    }

    fn declare_sum(&mut self, expr: &Expr, name: &str, ctor: Ctor, args: &[Expr]) -> Result<String, AppError> {
        if args.is_empty() {
            return Err(parse_error(expr, "a sum needs at least one term"));
        }
        let all_scaled = args.iter().all(|a| matches!(a, Expr::Scaled(..)));
        let mode = match ctor {
            Ctor::RecursiveSum => SumMode::Recursive,
            _ if all_scaled => SumMode::Extended,
            _ => SumMode::Plain,
        };

        let n = args.len();
        let mut terms = Vec::with_capacity(n);
        for (i, arg) in args.iter().enumerate() {
            let last = i + 1 == n;
            let term = match arg {
                Expr::Scaled(coefficient, pdf) => {
                    let pdf = self.declare_pdf_ref(pdf)?;
                    if last && mode != SumMode::Extended {
                        debug!(sum = name, pdf, "ignoring fraction on the last term");
                        SumTerm { fraction: None, pdf }
                    } else {
                        SumTerm {
                            fraction: Some(self.declare_scalar(coefficient)?),
                            pdf,
                        }
                    }
                }
                other if last => SumTerm {
                    fraction: None,
                    pdf: self.declare_pdf_ref(other)?,
                },
                other => {
                    return Err(parse_error(
                        expr,
                        format!("term '{other}' needs a fraction"),
                    ));
                }
            };
            terms.push(term);
        }

        let inserted = self.insert_or_recycle(name, Node::Pdf(Pdf::Sum { mode, terms }))?;
        if inserted && mode == SumMode::Plain && n > 2 {
            self.record(Warning::CompositionPositivity {
                label: name.to_string(),
                terms: n,
            });
        }
        Ok(name.to_string())
    }

    fn declare_product(&mut self, name: &str, args: &[Expr]) -> Result<String, AppError> {
        let factors = args
            .iter()
            .map(|a| self.declare_pdf_ref(a))
            .collect::<Result<Vec<_>, _>>()?;
        if factors.is_empty() {
            return Err(AppError::shape_config(name, "a product needs at least one factor"));
        }
        self.insert_or_recycle(name, Node::Pdf(Pdf::Product { factors }))?;
        Ok(name.to_string())
    }

    /// `SPLINE::name(control, {knots}, {values})`.
    fn declare_spline(&mut self, expr: &Expr, name: &str, args: &[Expr]) -> Result<String, AppError> {
        let [control, Expr::List(knots), Expr::List(values)] = args else {
            return Err(parse_error(expr, "expected SPLINE(control, {knots}, {values})"));
        };
        let knots = numbers(expr, knots)?;
        let values = numbers(expr, values)?;
        let spline = CubicSpline::new(&knots, &values).map_err(|e| AppError::shape_config(name, e.to_string()))?;

        let control = match control {
            Expr::Ref(control) => {
                let (lo, hi) = (knots[0], knots[knots.len() - 1]);
                self.ensure_control(control, lo, hi, 0.5 * (lo + hi))?;
                control.clone()
            }
            other => self.declare_scalar(other)?,
        };

        self.insert_or_recycle(name, Node::Function(Function::Spline(Interpolant { control, spline })))?;
        Ok(name.to_string())
    }

    /// `SHIFT::name(central, {nuisance, up, down}, ...)`.
    fn declare_shift(&mut self, expr: &Expr, name: &str, args: &[Expr]) -> Result<String, AppError> {
        let Some((central, shifts)) = args.split_first() else {
            return Err(parse_error(expr, "a shift needs a central term"));
        };
        let central = self.declare_scalar(central)?;

        let mut terms = Vec::with_capacity(shifts.len());
        for shift in shifts {
            let Expr::List(parts) = shift else {
                return Err(parse_error(expr, format!("expected {{nuisance, up, down}}, got '{shift}'")));
            };
            let [nuisance, up, down] = parts.as_slice() else {
                return Err(parse_error(expr, format!("expected {{nuisance, up, down}}, got '{shift}'")));
            };
            let nuisance = match nuisance {
                Expr::Ref(nuisance) => {
                    self.ensure_nuisance(nuisance)?;
                    nuisance.clone()
                }
                other => self.declare_scalar(other)?,
            };
            terms.push(ShiftTerm {
                nuisance,
                up: self.declare_scalar(up)?,
                down: self.declare_scalar(down)?,
            });
        }

        self.insert_or_recycle(name, Node::Function(Function::Shifted { central, terms }))?;
        Ok(name.to_string())
    }
}

fn numbers(expr: &Expr, items: &[Expr]) -> Result<Vec<f64>, AppError> {
    items
        .iter()
        .map(|item| match item {
            Expr::Number(v) => Ok(*v),
            other => Err(parse_error(expr, format!("expected a number, got '{other}'"))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::VarRole;

    #[test]
    fn gaussian_declaration_registers_axis_and_parameters() {
        let mut reg = Registry::new();
        let name = reg
            .declare_expression("sig", "Gaussian(x, mean_sig[100, 0, 200], sigma_sig[5, 0, 20])")
            .unwrap();
        assert_eq!(name, "sig");
        assert_eq!(reg.names().collect::<Vec<_>>(), ["x", "mean_sig", "sigma_sig", "sig"]);
        assert_eq!(reg.variable("x").unwrap().role, VarRole::Axis);
        assert_eq!(reg.variable("mean_sig").unwrap().value, 100.0);
    }

    #[test]
    fn identical_declaration_is_idempotent() {
        let mut reg = Registry::new();
        let text = "Gaussian::sig(x, mean_sig[100, 0, 200], sigma_sig[5, 0, 20])";
        reg.declare_expression("sig", text).unwrap();
        let before = reg.len();
        assert_eq!(reg.declare_expression("sig", text).unwrap(), "sig");
        assert_eq!(reg.len(), before);
    }

    #[test]
    fn references_must_exist() {
        let mut reg = Registry::new();
        let err = reg.declare_expression("s", "SUM(f[0, 1]*a, b)").unwrap_err();
        assert!(matches!(err, AppError::NotFound(name) if name == "a"));
    }

    #[test]
    fn sum_modes_follow_scaling() {
        let mut reg = Registry::new();
        reg.declare_expression("a", "Exponential(x, la[-1, -5, 0])").unwrap();
        reg.declare_expression("b", "Exponential(x, lb[-2, -5, 0])").unwrap();

        reg.declare_expression("plain", "SUM(fa[0, 1]*a, b)").unwrap();
        reg.declare_expression("ext", "SUM(na[0, 10]*a, nb[0, 10]*b)").unwrap();
        reg.declare_expression("rec", "RSUM(ra[0, 1]*a, rb[0, 1]*b)").unwrap();

        let mode = |reg: &Registry, n: &str| match reg.pdf(n).unwrap() {
            Pdf::Sum { mode, .. } => *mode,
            _ => panic!("not a sum"),
        };
        assert_eq!(mode(&reg, "plain"), SumMode::Plain);
        assert_eq!(mode(&reg, "ext"), SumMode::Extended);
        assert_eq!(mode(&reg, "rec"), SumMode::Recursive);
        // fraction on the last recursive term is ignored
        assert!(!reg.contains("rb"));
        assert!(reg.warnings().is_empty());
    }

    #[test]
    fn three_term_plain_sum_warns() {
        let mut reg = Registry::new();
        for n in ["a", "b", "c"] {
            reg.declare_expression(n, &format!("Exponential(x, l{n}[-1, -5, 0])"))
                .unwrap();
        }
        reg.declare_expression("s", "SUM(fa[0, 1]*a, fb[0, 1]*b, c)").unwrap();
        assert!(matches!(
            reg.warnings(),
            [Warning::CompositionPositivity { terms: 3, .. }]
        ));
    }

    #[test]
    fn spline_and_shift_declarations() {
        let mut reg = Registry::new();
        reg.declare_expression("m_central", "SPLINE(MH, {100, 125, 150}, {10, 12, 15})")
            .unwrap();
        reg.declare_expression("m_scaleUp", "SPLINE(MH, {100, 125, 150}, {1, 1, 1})")
            .unwrap();
        reg.declare_expression("m_scaleDown", "SPLINE(MH, {100, 125, 150}, {-1, -1, -1})")
            .unwrap();
        reg.declare_expression("m", "SHIFT(m_central, {scale, m_scaleUp, m_scaleDown})")
            .unwrap();
        assert_eq!(reg.variable("MH").unwrap().role, VarRole::Control);
        assert_eq!(reg.variable("scale").unwrap().role, VarRole::Nuisance);
        assert_eq!(reg.variable("scale").unwrap().range, Some((-10.0, 10.0)));
        assert!(matches!(reg.function("m").unwrap(), Function::Shifted { terms, .. } if terms.len() == 1));
    }

    #[test]
    fn double_sided_shape_takes_trailing_y_max() {
        let mut reg = Registry::new();
        reg.declare_expression("d", "DoubleSidedGaussian(x, m[10, 0, 20], s1[1, 0, 5], s2[2, 0, 5], 15)")
            .unwrap();
        let Pdf::Shape { y_max, params, .. } = reg.pdf("d").unwrap() else {
            panic!("not a shape");
        };
        assert_eq!(*y_max, Some(15.0));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn bad_spline_knots_are_shape_config_errors() {
        let mut reg = Registry::new();
        let err = reg
            .declare_expression("s", "SPLINE(MH, {100, 90}, {1, 2})")
            .unwrap_err();
        assert!(matches!(err, AppError::ShapeConfig { .. }));
    }
}
