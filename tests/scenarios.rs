use std::collections::{BTreeMap, BTreeSet};

use approx::assert_relative_eq;

use mass_models::data::{generate_toy, Dataset};
use mass_models::domain::{Axes, ModelSpec, ParamRange, ShapeConfig, ShapeKind, ShiftValues, SplineValues, SumConfig};
use mass_models::error::Warning;
use mass_models::fit::{fit, FitOptions, GridScanEngine};
use mass_models::io::parse_model_file;
use mass_models::models::{build_shifted, build_sum, Model};
use mass_models::registry::{Evaluator, Node, Pdf, Registry};

fn fixed_gaussian() -> ModelSpec {
    ModelSpec::Shape(
        ShapeConfig::fixed(ShapeKind::Gaussian)
            .with_range("mean", ParamRange::new(100.0, 0.0, 200.0))
            .with_range("sigma", ParamRange::new(5.0, 0.0, 20.0)),
    )
}

fn exponentials(names: &[&str]) -> Registry {
    let mut reg = Registry::new();
    reg.declare_axis("x", 0.0, 10.0).unwrap();
    for n in names {
        reg.declare_expression(n, &format!("Exponential(x, lambda_{n}[-0.5, -5, 0])"))
            .unwrap();
    }
    reg
}

#[test]
fn fixed_gaussian_build() {
    let mut reg = Registry::new();
    let mut model = Model::new("sig", Axes::default(), fixed_gaussian()).unwrap();
    model.build(&mut reg, "sig").unwrap();

    assert_eq!(reg.variable("mean_sig").unwrap().value, 100.0);
    assert_eq!(reg.variable("sigma_sig").unwrap().value, 5.0);
    let Pdf::Shape { params, .. } = reg.pdf("sig").unwrap() else {
        panic!("expected a shape");
    };
    assert_eq!(params, &["mean_sig", "sigma_sig"]);
}

#[test]
fn plain_sum_of_two_shapes_from_a_model_file() {
    let file = parse_model_file(
        r#"{
            "axes": { "x": [0, 10] },
            "models": [
                { "name": "a", "type": "shape", "kind": "exponential", "mode": "fixed" },
                { "name": "b", "type": "shape", "kind": "exponential", "mode": "fixed" },
                { "name": "model", "type": "sum", "constituents": { "a": [0, 1], "b": [] } }
            ]
        }"#,
    )
    .unwrap();
    let mut reg = Registry::new();
    file.build_all(&mut reg).unwrap();

    let fractions: Vec<&str> = reg.names().filter(|n| n.ends_with("_frac")).collect();
    assert_eq!(fractions, ["a_frac"]);
    assert_eq!(reg.variable("a_frac").unwrap().value, 0.5);
    assert_eq!(reg.node("model").unwrap().to_string(), "a_frac*a + b");
}

#[test]
fn mass_interpolated_crystal_ball() {
    let masses = vec![100.0, 125.0, 150.0];
    let spec = ModelSpec::Shape(
        ShapeConfig::spline(ShapeKind::CrystalBall, masses)
            .with_values("mean", SplineValues::plain(vec![10.0, 12.0, 15.0]))
            .with_values("sigma", SplineValues::plain(vec![1.0, 1.5, 2.0]))
            .with_values("a", SplineValues::plain(vec![1.0, 1.0, 1.0]))
            .with_values("n", SplineValues::plain(vec![2.0, 2.0, 2.0])),
    );
    let mut reg = Registry::new();
    Model::new("sig", Axes::default(), spec)
        .unwrap()
        .build(&mut reg, "sig")
        .unwrap();

    reg.set_value("MH", 125.0).unwrap();
    assert_relative_eq!(Evaluator::new(&reg).value("mean_sig").unwrap(), 12.0, epsilon = 1e-12);

    reg.set_value("MH", 112.5).unwrap();
    let between = Evaluator::new(&reg).value("mean_sig").unwrap();
    assert!(between > 10.0 && between < 12.0, "got {between}");
}

#[test]
fn recursive_sum_weights_are_normalized() {
    let mut reg = exponentials(&["a", "b"]);
    let two = SumConfig::new()
        .with("a", Some(ParamRange::new(0.3, 0.0, 1.0)))
        .with("b", None)
        .recursive();
    build_sum(&mut reg, "two", &two).unwrap();
    let coefficients = Evaluator::new(&reg).sum_coefficients("two").unwrap();
    assert_relative_eq!(coefficients[0], 0.3, epsilon = 1e-12);
    assert_relative_eq!(coefficients[1], 0.7, epsilon = 1e-12);

    let mut reg = exponentials(&["a", "b", "c"]);
    let three = SumConfig::new()
        .with("a", Some(ParamRange::new(0.3, 0.0, 1.0)))
        .with("b", Some(ParamRange::new(0.5, 0.0, 1.0)))
        .with("c", None)
        .recursive();
    build_sum(&mut reg, "three", &three).unwrap();
    let coefficients = Evaluator::new(&reg).sum_coefficients("three").unwrap();
    for (got, want) in coefficients.iter().zip([0.3, 0.35, 0.35]) {
        assert_relative_eq!(*got, want, epsilon = 1e-12);
    }
    assert_relative_eq!(coefficients.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    assert!(reg.warnings().is_empty());
}

#[test]
fn shift_vanishes_at_zero_and_follows_the_nuisance_sign() {
    let masses = [100.0, 125.0, 150.0];
    let shifts = BTreeMap::from([(
        "scale".to_string(),
        ShiftValues {
            up: vec![11.0, 13.0, 16.0],
            down: vec![8.0, 10.0, 13.0],
        },
    )]);
    let mut reg = Registry::new();
    build_shifted(&mut reg, "mean_s", "MH", &masses, &[10.0, 12.0, 15.0], &shifts).unwrap();

    for mass in [100.0, 112.5, 137.0, 150.0] {
        reg.set_value("MH", mass).unwrap();
        let ev = Evaluator::new(&reg);
        assert_eq!(ev.value("mean_s").unwrap(), ev.value("mean_s_central").unwrap());
    }

    reg.set_value("MH", 125.0).unwrap();
    let mut ev = Evaluator::new(&reg);
    // up delta is +1, down delta is -2
    ev.set("scale", 2.0);
    assert_relative_eq!(ev.value("mean_s").unwrap(), 14.0, epsilon = 1e-12);
    ev.set("scale", -0.5);
    assert_relative_eq!(ev.value("mean_s").unwrap(), 13.0, epsilon = 1e-12);
}

#[test]
fn declaration_is_idempotent() {
    let mut reg = Registry::new();
    reg.declare_variable("mean", 1.0, 0.0, 2.0).unwrap();
    let before = reg.len();
    reg.declare_variable("mean", 1.0, 0.0, 2.0).unwrap();
    assert_eq!(reg.len(), before);

    let mut model = Model::new("sig", Axes::default(), fixed_gaussian()).unwrap();
    model.build(&mut reg, "sig").unwrap();
    let before = reg.len();
    model.build(&mut reg, "sig").unwrap();
    assert_eq!(reg.len(), before);
    assert!(reg.warnings().is_empty());
}

#[test]
fn redeclared_bounds_keep_the_first_and_warn() {
    let mut reg = Registry::new();
    reg.declare_variable("v", 0.5, 0.0, 1.0).unwrap();
    let kept = reg.declare_variable("v", 2.0, 0.0, 5.0).unwrap();
    assert_eq!(kept.range, Some((0.0, 1.0)));
    assert_eq!(
        reg.warnings(),
        [Warning::BoundsMismatch {
            name: "v".into(),
            kept: (0.0, 1.0),
            requested: (0.0, 5.0),
        }]
    );
}

#[test]
fn plain_sum_of_three_terms_is_flagged() {
    let mut reg = exponentials(&["a", "b", "c"]);
    reg.declare_expression("m", "SUM(a_frac[0.2, 0, 1]*a, b_frac[0.3, 0, 1]*b, c)")
        .unwrap();
    assert_eq!(
        reg.warnings(),
        [Warning::CompositionPositivity {
            label: "m".into(),
            terms: 3
        }]
    );
    // recycling the sum does not record the warning twice
    reg.declare_expression("m", "SUM(a_frac[0.2, 0, 1]*a, b_frac[0.3, 0, 1]*b, c)")
        .unwrap();
    assert_eq!(reg.warnings().len(), 1);
}

#[test]
fn text_and_typed_declarations_register_the_same_objects() {
    let mut typed = Registry::new();
    Model::new("sig", Axes::default(), fixed_gaussian())
        .unwrap()
        .build(&mut typed, "sig")
        .unwrap();

    let mut text = Registry::new();
    text.declare_expression("sig", "Gaussian(x, mean_sig[100, 0, 200], sigma_sig[5, 0, 20])")
        .unwrap();

    let names = |r: &Registry| r.names().map(str::to_string).collect::<BTreeSet<_>>();
    assert_eq!(names(&typed), names(&text));
    for (name, node) in typed.iter() {
        assert_eq!(node.to_string(), text.node(name).unwrap().to_string(), "{name}");
    }
}

#[test]
fn grid_scan_recovers_a_gaussian_mean_from_a_toy() {
    let mut reg = Registry::new();
    reg.declare_axis("x", 0.0, 200.0).unwrap();
    let spec = ModelSpec::Shape(
        ShapeConfig::fixed(ShapeKind::Gaussian)
            .with_range("mean", ParamRange::new(100.0, 50.0, 150.0))
            .with_range("sigma", ParamRange::fixed(5.0)),
    );
    let mut model = Model::new("sig", Axes::default(), spec).unwrap();
    model.build(&mut reg, "sig").unwrap();
    let toy = generate_toy(&reg, "sig", 500, 7).unwrap();
    let sample_mean = toy.column("x").unwrap().iter().sum::<f64>() / toy.len() as f64;

    reg.set_value("mean_sig", 90.0).unwrap();
    let options = FitOptions {
        save: false,
        compute_errors: true,
    };
    let outcome = fit(&mut model, &mut reg, &toy, "sig", &GridScanEngine::default(), None, &options).unwrap();

    assert!(outcome.converged);
    assert_eq!(outcome.values.keys().collect::<Vec<_>>(), ["mean_sig"]);
    assert_relative_eq!(outcome.values["mean_sig"], sample_mean, epsilon = 0.05);
    let error = outcome.errors["mean_sig"];
    assert!(error > 0.15 && error < 0.3, "got {error}");
    assert_eq!(reg.variable("mean_sig").unwrap().value, outcome.values["mean_sig"]);
    assert!(matches!(reg.node("sigma_sig").unwrap(), Node::Variable(_)));
}

fn fixed_gaussian_pair() -> Registry {
    let mut reg = Registry::new();
    reg.declare_axis("x", 0.0, 200.0).unwrap();
    reg.declare_expression("a", "Gaussian(x, mean_a[50], sigma_a[5])").unwrap();
    reg.declare_expression("b", "Gaussian(x, mean_b[150], sigma_b[5])").unwrap();
    reg
}

#[test]
fn extended_fit_recovers_yields_and_poisson_errors() {
    let mut reg = fixed_gaussian_pair();
    let low = generate_toy(&reg, "a", 100, 11).unwrap();
    let high = generate_toy(&reg, "b", 300, 12).unwrap();
    let xs: Vec<f64> = low.column("x").unwrap().iter().chain(high.column("x").unwrap()).copied().collect();
    let data = Dataset::new(vec![("x".to_string(), xs)], None).unwrap();

    let yields = SumConfig::new()
        .with("a", Some(ParamRange::new(200.0, 0.0, 1000.0)))
        .with("b", Some(ParamRange::new(200.0, 0.0, 1000.0)))
        .extended();
    let mut model = Model::new("yields", Axes::default(), ModelSpec::Sum(yields)).unwrap();
    let options = FitOptions {
        save: false,
        compute_errors: true,
    };
    let outcome = fit(&mut model, &mut reg, &data, "yields", &GridScanEngine::default(), None, &options).unwrap();

    let (na, nb) = (outcome.values["a_frac"], outcome.values["b_frac"]);
    assert_relative_eq!(na, 100.0, epsilon = 0.5);
    assert_relative_eq!(nb, 300.0, epsilon = 0.5);
    assert_relative_eq!(na + nb, 400.0, epsilon = 0.5);
    assert_relative_eq!(outcome.errors["a_frac"], 10.0, max_relative = 0.05);
    assert_relative_eq!(outcome.errors["b_frac"], 300f64.sqrt(), max_relative = 0.05);
}

#[test]
fn uniform_weights_leave_errors_unchanged() {
    let mut reg = Registry::new();
    reg.declare_axis("x", 0.0, 200.0).unwrap();
    let spec = ModelSpec::Shape(
        ShapeConfig::fixed(ShapeKind::Gaussian)
            .with_range("mean", ParamRange::new(100.0, 50.0, 150.0))
            .with_range("sigma", ParamRange::fixed(5.0)),
    );
    let mut model = Model::new("sig", Axes::default(), spec).unwrap();
    model.build(&mut reg, "sig").unwrap();
    let toy = generate_toy(&reg, "sig", 300, 3).unwrap();
    let xs = toy.column("x").unwrap().to_vec();
    let doubled = Dataset::new(vec![("x".to_string(), xs.clone())], Some(vec![2.0; xs.len()])).unwrap();

    let options = FitOptions {
        save: false,
        compute_errors: true,
    };
    let engine = GridScanEngine::default();
    reg.set_value("mean_sig", 90.0).unwrap();
    let plain = fit(&mut model, &mut reg, &toy, "sig", &engine, None, &options).unwrap();
    reg.set_value("mean_sig", 90.0).unwrap();
    let weighted = fit(&mut model, &mut reg, &doubled, "sig", &engine, None, &options).unwrap();

    assert_relative_eq!(weighted.values["mean_sig"], plain.values["mean_sig"], max_relative = 1e-9);
    assert_relative_eq!(weighted.errors["mean_sig"], plain.errors["mean_sig"], max_relative = 1e-6);
}
