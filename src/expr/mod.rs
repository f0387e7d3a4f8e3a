//! Typed expression tree for registry declarations.
//!
//! Builders assemble an `Expr` instead of formatting factory strings by hand.
//! The tree is rendered to the declarative text grammar only for logging and
//! display (`Display`), and `parse` turns such text back into a tree:
//!
//! ```text
//! Gaussian::sig(x, mean_sig[100, 0, 200], sigma_sig[5, 0, 20])
//! SUM::model(a_frac[0, 1]*a, b)
//! SPLINE::mean_s(MH, {100, 125, 150}, {10, 12, 15})
//! ```

use std::fmt;

use crate::domain::{ParamRange, ShapeKind};

pub mod parse;

pub use parse::parse;

/// Named constructors of the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ctor {
    Shape(ShapeKind),
    /// Plain sum (`SUM`). Extended when every term carries a coefficient.
    Sum,
    /// Recursive sum (`RSUM`).
    RecursiveSum,
    /// Unweighted product (`PROD`).
    Product,
    /// Shift-corrected function (`SHIFT`).
    Shift,
    /// Cubic spline over a control variable (`SPLINE`).
    Spline,
}

impl Ctor {
    pub fn name(self) -> &'static str {
        match self {
            Ctor::Shape(kind) => kind.ctor_name(),
            Ctor::Sum => "SUM",
            Ctor::RecursiveSum => "RSUM",
            Ctor::Product => "PROD",
            Ctor::Shift => "SHIFT",
            Ctor::Spline => "SPLINE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SUM" => Some(Ctor::Sum),
            "RSUM" => Some(Ctor::RecursiveSum),
            "PROD" => Some(Ctor::Product),
            "SHIFT" => Some(Ctor::Shift),
            "SPLINE" => Some(Ctor::Spline),
            other => ShapeKind::from_ctor(other).map(Ctor::Shape),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to an already registered name.
    Ref(String),
    Number(f64),
    /// Inline variable declaration `name[v]`, `name[lo, hi]` or `name[init, lo, hi]`.
    Var { name: String, values: Vec<f64> },
    List(Vec<Expr>),
    /// `coefficient*term`, used for sum fractions.
    Scaled(Box<Expr>, Box<Expr>),
    Call {
        ctor: Ctor,
        name: Option<String>,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn reference(name: impl Into<String>) -> Self {
        Expr::Ref(name.into())
    }

    pub fn var(name: impl Into<String>, range: ParamRange) -> Self {
        Expr::Var {
            name: name.into(),
            values: vec![range.init, range.lo, range.hi],
        }
    }

    pub fn scaled(coefficient: Expr, term: Expr) -> Self {
        Expr::Scaled(Box::new(coefficient), Box::new(term))
    }

    pub fn call(ctor: Ctor, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            ctor,
            name: Some(name.into()),
            args,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ref(name) => write!(f, "{name}"),
            Expr::Number(v) => write!(f, "{v}"),
            Expr::Var { name, values } => {
                write!(f, "{name}[")?;
                write_joined(f, values)?;
                write!(f, "]")
            }
            Expr::List(items) => {
                write!(f, "{{")?;
                write_joined(f, items)?;
                write!(f, "}}")
            }
            Expr::Scaled(coefficient, term) => write!(f, "{coefficient}*{term}"),
            Expr::Call { ctor, name, args } => {
                write!(f, "{}", ctor.name())?;
                if let Some(name) = name {
                    write!(f, "::{name}")?;
                }
                write!(f, "(")?;
                write_joined(f, args)?;
                write!(f, ")")
            }
        }
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_factory_syntax() {
        let e = Expr::call(
            Ctor::Shape(ShapeKind::Gaussian),
            "sig",
            vec![
                Expr::reference("x"),
                Expr::var("mean_sig", ParamRange::new(100.0, 0.0, 200.0)),
                Expr::var("sigma_sig", ParamRange::new(5.0, 0.0, 20.0)),
            ],
        );
        assert_eq!(
            e.to_string(),
            "Gaussian::sig(x, mean_sig[100, 0, 200], sigma_sig[5, 0, 20])"
        );
    }

    #[test]
    fn renders_scaled_terms_and_lists() {
        let e = Expr::call(
            Ctor::Sum,
            "model",
            vec![
                Expr::scaled(Expr::reference("a_frac"), Expr::reference("a")),
                Expr::reference("b"),
            ],
        );
        assert_eq!(e.to_string(), "SUM::model(a_frac*a, b)");
        assert_eq!(Expr::List(vec![Expr::Number(1.0), Expr::Number(2.5)]).to_string(), "{1, 2.5}");
    }

    #[test]
    fn ctor_names_round_trip() {
        for kind in ShapeKind::ALL {
            assert_eq!(Ctor::from_name(kind.ctor_name()), Some(Ctor::Shape(kind)));
        }
        assert_eq!(Ctor::from_name("RSUM"), Some(Ctor::RecursiveSum));
        assert_eq!(Ctor::from_name("mean_sig"), None);
    }
}
