//! Sum and product builders over already registered shapes.

use tracing::debug;

use crate::domain::{ProductConfig, SumConfig, SumMode};
use crate::error::AppError;
use crate::expr::{Ctor, Expr};
use crate::registry::Registry;

/// Declare the sum `label` and return the fraction variables it created.
///
/// Constituents are taken in lexicographic order. Fractions are named
/// `<pdf>_frac`; for non-extended sums the last constituent's fraction is
/// implied and a supplied range for it is ignored.
pub fn build_sum(registry: &mut Registry, label: &str, config: &SumConfig) -> Result<Vec<String>, AppError> {
    config.validate(label)?;
    for pdf in config.constituents.keys() {
        registry.pdf(pdf)?;
    }

    let mode = config.mode();
    let n = config.constituents.len();
    let mut params = Vec::new();
    let mut args = Vec::with_capacity(n);
    for (i, (pdf, fraction)) in config.constituents.iter().enumerate() {
        let last = i + 1 == n;
        match fraction.0 {
            Some(range) if mode == SumMode::Extended || !last => {
                let frac = format!("{pdf}_frac");
                args.push(Expr::scaled(Expr::var(frac.as_str(), range), Expr::reference(pdf.as_str())));
                params.push(frac);
            }
            Some(_) => {
                debug!(sum = label, pdf, "ignoring fraction of the last constituent");
                args.push(Expr::reference(pdf.as_str()));
            }
            None => args.push(Expr::reference(pdf.as_str())),
        }
    }

    let ctor = match mode {
        SumMode::Recursive => Ctor::RecursiveSum,
        SumMode::Plain | SumMode::Extended => Ctor::Sum,
    };
    registry.declare_expr(&Expr::call(ctor, label, args))?;
    Ok(params)
}

/// Declare the unweighted product `label` of `config.factors`, in order.
pub fn build_product(registry: &mut Registry, label: &str, config: &ProductConfig) -> Result<Vec<String>, AppError> {
    config.validate(label)?;
    for pdf in &config.factors {
        registry.pdf(pdf)?;
    }
    let args = config.factors.iter().map(|f| Expr::reference(f.as_str())).collect();
    registry.declare_expr(&Expr::call(Ctor::Product, label, args))?;
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParamRange;
    use crate::error::Warning;
    use crate::registry::{Evaluator, Pdf};
    use approx::assert_relative_eq;

    fn with_shapes(names: &[&str]) -> Registry {
        let mut reg = Registry::new();
        reg.declare_axis("x", 0.0, 10.0).unwrap();
        for n in names {
            reg.declare_expression(n, &format!("Exponential(x, lambda_{n}[-1, -5, 0])"))
                .unwrap();
        }
        reg
    }

    #[test]
    fn plain_sum_creates_only_leading_fractions() {
        let mut reg = with_shapes(&["a", "b"]);
        let cfg = SumConfig::new()
            .with("a", Some(ParamRange::bounded(0.0, 1.0)))
            .with("b", None);
        let params = build_sum(&mut reg, "model", &cfg).unwrap();
        assert_eq!(params, ["a_frac"]);
        assert!(!reg.contains("b_frac"));
        assert_eq!(reg.node("model").unwrap().to_string(), "a_frac*a + b");
    }

    #[test]
    fn extended_sum_gives_every_constituent_a_coefficient() {
        let mut reg = with_shapes(&["a", "b"]);
        let cfg = SumConfig::new()
            .with("a", Some(ParamRange::new(10.0, 0.0, 100.0)))
            .with("b", Some(ParamRange::new(30.0, 0.0, 100.0)))
            .extended();
        let params = build_sum(&mut reg, "model", &cfg).unwrap();
        assert_eq!(params, ["a_frac", "b_frac"]);
        let ev = Evaluator::new(&reg);
        assert_eq!(ev.sum_coefficients("model").unwrap(), [10.0, 30.0]);
    }

    #[test]
    fn last_fraction_of_recursive_sum_is_ignored() {
        let mut reg = with_shapes(&["a", "b"]);
        let cfg = SumConfig::new()
            .with("a", Some(ParamRange::new(0.3, 0.0, 1.0)))
            .with("b", Some(ParamRange::new(0.9, 0.0, 1.0)))
            .recursive();
        let params = build_sum(&mut reg, "model", &cfg).unwrap();
        assert_eq!(params, ["a_frac"]);
        assert!(matches!(reg.pdf("model").unwrap(), Pdf::Sum { mode: SumMode::Recursive, .. }));
    }

    #[test]
    fn three_term_plain_sum_records_positivity_warning() {
        let mut reg = with_shapes(&["a", "b", "c"]);
        let cfg = SumConfig::new()
            .with("a", Some(ParamRange::bounded(0.0, 1.0)))
            .with("b", Some(ParamRange::bounded(0.0, 1.0)))
            .with("c", None);
        build_sum(&mut reg, "model", &cfg).unwrap();
        assert_eq!(
            reg.warnings(),
            [Warning::CompositionPositivity {
                label: "model".into(),
                terms: 3
            }]
        );
    }

    #[test]
    fn unknown_constituent_is_not_found() {
        let mut reg = with_shapes(&["a"]);
        let cfg = SumConfig::new()
            .with("a", Some(ParamRange::bounded(0.0, 1.0)))
            .with("ghost", None);
        assert!(matches!(build_sum(&mut reg, "model", &cfg), Err(AppError::NotFound(n)) if n == "ghost"));
        assert!(!reg.contains("a_frac"));
    }

    #[test]
    fn product_keeps_factor_order() {
        let mut reg = with_shapes(&["b", "a"]);
        build_product(&mut reg, "p", &ProductConfig::new(["b", "a"])).unwrap();
        assert_eq!(reg.node("p").unwrap().to_string(), "b * a");
        assert!(matches!(
            build_product(&mut reg, "q", &ProductConfig::new(["a", "nope"])),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn product_value_and_normalization_factorize() {
        let mut reg = Registry::new();
        reg.declare_axis("x", 0.0, 200.0).unwrap();
        reg.declare_axis("y", 0.0, 100.0).unwrap();
        reg.declare_expression("gx", "Gaussian(x, mx[100, 0, 200], sx[10])").unwrap();
        reg.declare_expression("gy", "Exponential(y, ly[-0.05, -1, 0])").unwrap();
        build_product(&mut reg, "p", &ProductConfig::new(["gx", "gy"])).unwrap();

        let mut ev = Evaluator::new(&reg);
        ev.set_axis("x", 95.0);
        ev.set_axis("y", 20.0);
        let value = ev.value("p").unwrap();
        assert_relative_eq!(value, ev.value("gx").unwrap() * ev.value("gy").unwrap(), max_relative = 1e-12);

        let norm = ev.integral("p").unwrap();
        let factors = ev.integral("gx").unwrap() * ev.integral("gy").unwrap();
        assert_relative_eq!(norm, factors, max_relative = 1e-5);
        assert_relative_eq!(ev.density("p").unwrap(), value / factors, max_relative = 1e-5);
    }
}
