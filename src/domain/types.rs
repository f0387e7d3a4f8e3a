//! Shared configuration types.
//!
//! These replace free-form keyword bags with typed, serde-friendly structs so
//! a model description can be:
//!
//! - validated once when a `Model` is constructed
//! - loaded from a JSON model file
//! - built into a registry any number of times

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Default name of the spline control variable (the hypothesis mass).
pub const DEFAULT_CONTROL: &str = "MH";

/// A literal parameter declaration `[init, lo, hi]`.
///
/// In files it is written as an array of one, two or three numbers:
/// `[v]` is a constant, `[lo, hi]` starts at the midpoint, `[init, lo, hi]`
/// is explicit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct ParamRange {
    pub init: f64,
    pub lo: f64,
    pub hi: f64,
}

impl ParamRange {
    pub const fn new(init: f64, lo: f64, hi: f64) -> Self {
        Self { init, lo, hi }
    }

    pub fn bounded(lo: f64, hi: f64) -> Self {
        Self::new(0.5 * (lo + hi), lo, hi)
    }

    pub const fn fixed(value: f64) -> Self {
        Self::new(value, value, value)
    }

    pub fn from_slice(values: &[f64]) -> Result<Self, String> {
        let range = match *values {
            [v] => Self::fixed(v),
            [lo, hi] => Self::bounded(lo, hi),
            [init, lo, hi] => Self::new(init, lo, hi),
            _ => {
                return Err(format!(
                    "expected [value], [lo, hi] or [init, lo, hi], got {} numbers",
                    values.len()
                ));
            }
        };
        range.check()?;
        Ok(range)
    }

    fn check(&self) -> Result<(), String> {
        if !(self.init.is_finite() && self.lo.is_finite() && self.hi.is_finite()) {
            return Err(format!("range [{}, {}, {}] is not finite", self.init, self.lo, self.hi));
        }
        if self.lo > self.hi {
            return Err(format!("lower bound {} exceeds upper bound {}", self.lo, self.hi));
        }
        if self.init < self.lo || self.init > self.hi {
            return Err(format!(
                "initial value {} outside [{}, {}]",
                self.init, self.lo, self.hi
            ));
        }
        Ok(())
    }
}

impl TryFrom<Vec<f64>> for ParamRange {
    type Error = String;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_slice(&values)
    }
}

impl From<ParamRange> for Vec<f64> {
    fn from(value: ParamRange) -> Self {
        vec![value.init, value.lo, value.hi]
    }
}

/// Fraction declaration of a sum constituent: `[]` means "no fraction".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct FractionRange(pub Option<ParamRange>);

impl TryFrom<Vec<f64>> for FractionRange {
    type Error = String;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        if values.is_empty() {
            return Ok(Self(None));
        }
        ParamRange::from_slice(&values).map(|r| Self(Some(r)))
    }
}

impl From<FractionRange> for Vec<f64> {
    fn from(value: FractionRange) -> Self {
        value.0.map(Vec::from).unwrap_or_default()
    }
}

/// The closed set of elementary shape kinds.
///
/// Each kind is described by one row of the registration table below: its
/// constructor name in the declarative grammar and its parameter roles with
/// their default ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Gaussian,
    BreitWigner,
    Voigtian,
    CrystalBall,
    DoubleCrystalBall,
    DoubleSidedGaussian,
    DoubleSidedVoigtian,
    Polynomial,
    #[serde(alias = "chebyshev")]
    Chebychev,
    Exponential,
    Erf,
}

const MEAN: ParamRange = ParamRange::new(1.0, 0.0, 1000.0);
const WIDE: ParamRange = ParamRange::new(1.0, 0.0, 100.0);
const COEFFICIENT: ParamRange = ParamRange::new(0.0, -1.0, 1.0);
const SLOPE: ParamRange = ParamRange::new(-1.0, -5.0, 0.0);
const ERF_SCALE: ParamRange = ParamRange::new(1.0, 0.0, 10.0);
const ERF_SHIFT: ParamRange = ParamRange::new(0.0, 0.0, 100.0);

type RoleTable = &'static [(&'static str, ParamRange)];

impl ShapeKind {
    pub const ALL: [ShapeKind; 11] = [
        ShapeKind::Gaussian,
        ShapeKind::BreitWigner,
        ShapeKind::Voigtian,
        ShapeKind::CrystalBall,
        ShapeKind::DoubleCrystalBall,
        ShapeKind::DoubleSidedGaussian,
        ShapeKind::DoubleSidedVoigtian,
        ShapeKind::Polynomial,
        ShapeKind::Chebychev,
        ShapeKind::Exponential,
        ShapeKind::Erf,
    ];

    /// Constructor name in the declarative grammar.
    pub fn ctor_name(self) -> &'static str {
        match self {
            ShapeKind::Gaussian => "Gaussian",
            ShapeKind::BreitWigner => "BreitWigner",
            ShapeKind::Voigtian => "Voigtian",
            ShapeKind::CrystalBall => "CBShape",
            ShapeKind::DoubleCrystalBall => "DoubleCrystalBall",
            ShapeKind::DoubleSidedGaussian => "DoubleSidedGaussian",
            ShapeKind::DoubleSidedVoigtian => "DoubleSidedVoigtian",
            ShapeKind::Polynomial => "Polynomial",
            ShapeKind::Chebychev => "Chebychev",
            ShapeKind::Exponential => "Exponential",
            ShapeKind::Erf => "Erf",
        }
    }

    pub fn from_ctor(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.ctor_name() == name)
    }

    /// Polynomial-family kinds take an `order` and a coefficient list.
    pub fn is_series(self) -> bool {
        matches!(self, ShapeKind::Polynomial | ShapeKind::Chebychev)
    }

    /// Double-sided kinds carry a fixed (never fitted) `yMax`.
    pub fn takes_y_max(self) -> bool {
        matches!(self, ShapeKind::DoubleSidedGaussian | ShapeKind::DoubleSidedVoigtian)
    }

    fn role_table(self) -> RoleTable {
        match self {
            ShapeKind::Gaussian => &[("mean", MEAN), ("sigma", WIDE)],
            ShapeKind::BreitWigner => &[("mean", MEAN), ("width", WIDE)],
            ShapeKind::Voigtian => &[("mean", MEAN), ("width", WIDE), ("sigma", WIDE)],
            ShapeKind::CrystalBall => &[("mean", MEAN), ("sigma", WIDE), ("a", WIDE), ("n", WIDE)],
            ShapeKind::DoubleCrystalBall => &[
                ("mean", MEAN),
                ("sigma", WIDE),
                ("a1", WIDE),
                ("n1", WIDE),
                ("a2", WIDE),
                ("n2", WIDE),
            ],
            ShapeKind::DoubleSidedGaussian => &[("mean", MEAN), ("sigma1", WIDE), ("sigma2", WIDE)],
            ShapeKind::DoubleSidedVoigtian => &[
                ("mean", MEAN),
                ("sigma1", WIDE),
                ("sigma2", WIDE),
                ("width1", WIDE),
                ("width2", WIDE),
            ],
            ShapeKind::Exponential => &[("lambda", SLOPE)],
            ShapeKind::Erf => &[("erfScale", ERF_SCALE), ("erfShift", ERF_SHIFT)],
            ShapeKind::Polynomial | ShapeKind::Chebychev => &[],
        }
    }

    /// Parameter roles in declaration order, with their default ranges.
    ///
    /// Series kinds have one coefficient role `p<i>` per order.
    pub fn roles(self, order: usize) -> Vec<(String, ParamRange)> {
        if self.is_series() {
            return (0..order).map(|o| (format!("p{o}"), COEFFICIENT)).collect();
        }
        self.role_table()
            .iter()
            .map(|(name, range)| (name.to_string(), *range))
            .collect()
    }
}

/// Training values of one spline-built parameter.
///
/// In files either a plain array (`[10, 12, 15]`) or an object with
/// `values` and optional `shifts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SplineValuesRepr")]
pub struct SplineValues {
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shifts: BTreeMap<String, ShiftValues>,
}

impl SplineValues {
    pub fn plain(values: Vec<f64>) -> Self {
        Self {
            values,
            shifts: BTreeMap::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SplineValuesRepr {
    Plain(Vec<f64>),
    Full {
        values: Vec<f64>,
        #[serde(default)]
        shifts: BTreeMap<String, ShiftValues>,
    },
}

impl From<SplineValuesRepr> for SplineValues {
    fn from(value: SplineValuesRepr) -> Self {
        match value {
            SplineValuesRepr::Plain(values) => SplineValues::plain(values),
            SplineValuesRepr::Full { values, shifts } => SplineValues { values, shifts },
        }
    }
}

/// Up/down training values of one systematic shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftValues {
    pub up: Vec<f64>,
    pub down: Vec<f64>,
}

/// How the parameters of an elementary shape are provided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ParamMode {
    /// Free variables from literal ranges; missing roles use the defaults.
    Fixed {
        #[serde(default)]
        params: BTreeMap<String, ParamRange>,
    },
    /// One interpolant per role over the control variable.
    Spline {
        #[serde(default = "default_control")]
        control: String,
        masses: Vec<f64>,
        params: BTreeMap<String, SplineValues>,
    },
}

fn default_control() -> String {
    DEFAULT_CONTROL.to_string()
}

fn default_order() -> usize {
    1
}

/// Configuration of an elementary shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeConfig {
    pub kind: ShapeKind,
    #[serde(default = "default_order")]
    pub order: usize,
    #[serde(default, rename = "yMax", alias = "y_max")]
    pub y_max: Option<f64>,
    #[serde(flatten)]
    pub params: ParamMode,
}

impl ShapeConfig {
    pub fn fixed(kind: ShapeKind) -> Self {
        Self {
            kind,
            order: 1,
            y_max: None,
            params: ParamMode::Fixed {
                params: BTreeMap::new(),
            },
        }
    }

    pub fn spline(kind: ShapeKind, masses: Vec<f64>) -> Self {
        Self {
            kind,
            order: 1,
            y_max: None,
            params: ParamMode::Spline {
                control: default_control(),
                masses,
                params: BTreeMap::new(),
            },
        }
    }

    /// Set a literal range (fixed mode) for `role`.
    pub fn with_range(mut self, role: &str, range: ParamRange) -> Self {
        if let ParamMode::Fixed { params } = &mut self.params {
            params.insert(role.to_string(), range);
        }
        self
    }

    /// Set training values (spline mode) for `role`.
    pub fn with_values(mut self, role: &str, values: SplineValues) -> Self {
        if let ParamMode::Spline { params, .. } = &mut self.params {
            params.insert(role.to_string(), values);
        }
        self
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn with_y_max(mut self, y_max: f64) -> Self {
        self.y_max = Some(y_max);
        self
    }

    /// Reject configurations that cannot produce a well-defined shape.
    pub fn validate(&self, label: &str) -> Result<(), AppError> {
        let err = |message: String| AppError::shape_config(label, message);

        if self.kind.is_series() && self.order == 0 {
            return Err(err("series order must be at least 1".to_string()));
        }
        if self.y_max.is_some() && !self.kind.takes_y_max() {
            return Err(err(format!("{:?} does not take yMax", self.kind)));
        }
        if let Some(y_max) = self.y_max {
            if !y_max.is_finite() {
                return Err(err(format!("yMax must be finite, got {y_max}")));
            }
        }

        let roles = self.kind.roles(self.order);
        let known = |name: &str| roles.iter().any(|(r, _)| r == name);

        match &self.params {
            ParamMode::Fixed { params } => {
                if let Some(unknown) = params.keys().find(|k| !known(k)) {
                    return Err(err(format!("unknown parameter '{unknown}' for {:?}", self.kind)));
                }
            }
            ParamMode::Spline {
                control,
                masses,
                params,
            } => {
                if control.is_empty() {
                    return Err(err("empty control variable name".to_string()));
                }
                check_knots(masses).map_err(err)?;
                if let Some(unknown) = params.keys().find(|k| !known(k)) {
                    return Err(err(format!("unknown parameter '{unknown}' for {:?}", self.kind)));
                }
                for (role, _) in &roles {
                    let Some(values) = params.get(role) else {
                        return Err(err(format!("missing training values for '{role}'")));
                    };
                    check_len(role, "values", values.values.len(), masses.len()).map_err(err)?;
                    for (shift, sv) in &values.shifts {
                        if shift.is_empty() {
                            return Err(err(format!("empty shift name on '{role}'")));
                        }
                        check_len(role, &format!("{shift} up"), sv.up.len(), masses.len()).map_err(err)?;
                        check_len(role, &format!("{shift} down"), sv.down.len(), masses.len())
                            .map_err(err)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Knots must be finite, strictly increasing, and at least two.
pub fn check_knots(masses: &[f64]) -> Result<(), String> {
    if masses.len() < 2 {
        return Err(format!("need at least 2 masses, got {}", masses.len()));
    }
    if masses.iter().any(|m| !m.is_finite()) {
        return Err("masses must be finite".to_string());
    }
    if masses.windows(2).any(|w| w[1] <= w[0]) {
        return Err("masses must be strictly increasing".to_string());
    }
    Ok(())
}

fn check_len(role: &str, what: &str, got: usize, want: usize) -> Result<(), String> {
    if got != want {
        return Err(format!(
            "'{role}' {what} has {got} entries but there are {want} masses"
        ));
    }
    Ok(())
}

/// How a sum combines its constituents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SumMode {
    /// `c_i = f_i` for all but the last, `c_last = 1 - Σ f_i`.
    Plain,
    /// Nested fractions; always normalized and non-negative.
    Recursive,
    /// One independent coefficient per constituent.
    Extended,
}

/// Configuration of a sum of registered shapes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SumConfig {
    /// Constituent name → fraction declaration. Iteration order is the
    /// lexicographic order of the names.
    pub constituents: BTreeMap<String, FractionRange>,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub extended: bool,
}

impl SumConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, pdf: &str, fraction: Option<ParamRange>) -> Self {
        self.constituents.insert(pdf.to_string(), FractionRange(fraction));
        self
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    pub fn extended(mut self) -> Self {
        self.extended = true;
        self
    }

    pub fn mode(&self) -> SumMode {
        if self.recursive {
            SumMode::Recursive
        } else if self.extended {
            SumMode::Extended
        } else {
            SumMode::Plain
        }
    }

    pub fn validate(&self, label: &str) -> Result<(), AppError> {
        let err = |message: String| AppError::shape_config(label, message);
        if self.recursive && self.extended {
            return Err(err("a sum cannot be both recursive and extended".to_string()));
        }
        if self.constituents.is_empty() {
            return Err(err("a sum needs at least one constituent".to_string()));
        }
        let n = self.constituents.len();
        for (i, (pdf, fraction)) in self.constituents.iter().enumerate() {
            let needs_fraction = self.extended || i + 1 < n;
            if needs_fraction && fraction.0.is_none() {
                return Err(err(format!("constituent '{pdf}' needs a fraction range")));
            }
        }
        Ok(())
    }
}

/// Configuration of an unweighted product of registered shapes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductConfig {
    pub factors: Vec<String>,
}

impl ProductConfig {
    pub fn new<S: Into<String>>(factors: impl IntoIterator<Item = S>) -> Self {
        Self {
            factors: factors.into_iter().map(Into::into).collect(),
        }
    }

    pub fn validate(&self, label: &str) -> Result<(), AppError> {
        if self.factors.is_empty() {
            return Err(AppError::shape_config(label, "a product needs at least one factor"));
        }
        Ok(())
    }
}

/// What a model builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelSpec {
    Shape(ShapeConfig),
    Sum(SumConfig),
    Product(ProductConfig),
}

impl ModelSpec {
    pub fn validate(&self, label: &str) -> Result<(), AppError> {
        match self {
            ModelSpec::Shape(c) => c.validate(label),
            ModelSpec::Sum(c) => c.validate(label),
            ModelSpec::Product(c) => c.validate(label),
        }
    }
}

/// Axis variable names of a model (most shapes only use `x`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axes {
    #[serde(default = "axis_x")]
    pub x: String,
    #[serde(default = "axis_y")]
    pub y: String,
    #[serde(default = "axis_z")]
    pub z: String,
}

fn axis_x() -> String {
    "x".to_string()
}

fn axis_y() -> String {
    "y".to_string()
}

fn axis_z() -> String {
    "z".to_string()
}

impl Default for Axes {
    fn default() -> Self {
        Self {
            x: axis_x(),
            y: axis_y(),
            z: axis_z(),
        }
    }
}

impl Axes {
    pub fn on(x: &str) -> Self {
        Self {
            x: x.to_string(),
            ..Self::default()
        }
    }
}

/// Mass-dependent integral of a model, kept alongside it for downstream
/// normalization bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegralSpline {
    #[serde(default = "default_control")]
    pub control: String,
    pub masses: Vec<f64>,
    pub values: Vec<f64>,
}

/// A full `mm fit` run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub models_path: PathBuf,
    pub model: String,
    pub label: Option<String>,
    pub data_path: PathBuf,
    pub columns: Vec<String>,
    pub weight_column: Option<String>,
    pub compute_errors: bool,
    pub save_dir: Option<PathBuf>,
    pub export: Option<PathBuf>,

    /// Candidate points per parameter window in the grid-scan engine.
    pub scan_steps: usize,
    pub max_sweeps: usize,
    pub tolerance: f64,
}
