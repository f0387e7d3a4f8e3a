//! Objects stored in the registry.

use std::fmt;

use crate::domain::{ShapeKind, SumMode};
use crate::math::CubicSpline;

/// What a variable is used for. Only `Parameter` variables float in fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRole {
    Parameter,
    Axis,
    Control,
    Nuisance,
    Constant,
}

impl VarRole {
    pub fn as_str(self) -> &'static str {
        match self {
            VarRole::Parameter => "parameter",
            VarRole::Axis => "axis",
            VarRole::Control => "control",
            VarRole::Nuisance => "nuisance",
            VarRole::Constant => "constant",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: f64,
    /// `None` for unbounded axes.
    pub range: Option<(f64, f64)>,
    pub role: VarRole,
}

impl Variable {
    /// Free to move in a fit: a parameter with a non-degenerate range.
    pub fn is_free(&self) -> bool {
        self.role == VarRole::Parameter && self.range.is_some_and(|(lo, hi)| lo < hi)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        match self.range {
            Some((lo, hi)) => value.clamp(lo, hi),
            None => value,
        }
    }
}

/// Cubic spline over a control variable. Immutable once registered.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolant {
    pub control: String,
    pub spline: CubicSpline,
}

/// One systematic shift: nuisance `ν` selects the up delta for `ν > 0` and
/// the down delta for `ν < 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftTerm {
    pub nuisance: String,
    pub up: String,
    pub down: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    Spline(Interpolant),
    /// `central + Σ max(0, ν)·up + min(0, ν)·down`.
    Shifted { central: String, terms: Vec<ShiftTerm> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SumTerm {
    pub fraction: Option<String>,
    pub pdf: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pdf {
    Shape {
        kind: ShapeKind,
        x: String,
        /// Role arguments in catalogue order (coefficients for series kinds).
        params: Vec<String>,
        y_max: Option<f64>,
    },
    Sum { mode: SumMode, terms: Vec<SumTerm> },
    Product { factors: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Variable(Variable),
    Function(Function),
    Pdf(Pdf),
}

impl Node {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Variable(_) => "variable",
            Node::Function(_) => "function",
            Node::Pdf(_) => "pdf",
        }
    }

    /// Variables and functions can feed shape parameters and sum fractions.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Node::Pdf(_))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Variable(v) => {
                write!(f, "{}", v.value)?;
                if let Some((lo, hi)) = v.range {
                    write!(f, " [{lo}, {hi}]")?;
                }
                write!(f, " ({})", v.role.as_str())
            }
            Node::Function(Function::Spline(i)) => {
                write!(f, "spline({}; {} knots)", i.control, i.spline.knots().len())
            }
            Node::Function(Function::Shifted { central, terms }) => {
                write!(f, "{central}")?;
                for t in terms {
                    write!(f, " + shift({}; {} | {})", t.nuisance, t.up, t.down)?;
                }
                Ok(())
            }
            Node::Pdf(Pdf::Shape {
                kind,
                x,
                params,
                y_max,
            }) => {
                write!(f, "{}({x}; {}", kind.ctor_name(), params.join(", "))?;
                if let Some(y_max) = y_max {
                    write!(f, "; yMax={y_max}")?;
                }
                write!(f, ")")
            }
            Node::Pdf(Pdf::Sum { mode, terms }) => write_sum(f, *mode, terms),
            Node::Pdf(Pdf::Product { factors }) => write!(f, "{}", factors.join(" * ")),
        }
    }
}

fn write_sum(f: &mut fmt::Formatter<'_>, mode: SumMode, terms: &[SumTerm]) -> fmt::Result {
    match mode {
        SumMode::Recursive => write_recursive(f, terms),
        SumMode::Plain | SumMode::Extended => {
            for (i, t) in terms.iter().enumerate() {
                if i > 0 {
                    write!(f, " + ")?;
                }
                match &t.fraction {
                    Some(frac) if mode == SumMode::Extended || i + 1 < terms.len() => {
                        write!(f, "{frac}*{}", t.pdf)?
                    }
                    _ => write!(f, "{}", t.pdf)?,
                }
            }
            Ok(())
        }
    }
}

fn write_recursive(f: &mut fmt::Formatter<'_>, terms: &[SumTerm]) -> fmt::Result {
    match terms {
        [] => Ok(()),
        [last] => write!(f, "{}", last.pdf),
        [head, rest @ ..] => {
            let frac = head.fraction.as_deref().unwrap_or("0");
            write!(f, "{frac}*{} + (1-{frac})*", head.pdf)?;
            if rest.len() > 1 {
                write!(f, "(")?;
                write_recursive(f, rest)?;
                write!(f, ")")
            } else {
                write_recursive(f, rest)
            }
        }
    }
}
