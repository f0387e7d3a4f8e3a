//! Named-object registry shared by every builder.
//!
//! A name is declared at most once. Declaring a name again with a compatible
//! kind returns the existing object (declare-or-recycle); declaring it as a
//! different kind fails with `AppError::KindConflict`. Partial state from a
//! failed build is kept.
//!
//! The registry is a plain owned value: builders take `&mut Registry`, while
//! evaluation (`eval::Evaluator`) only needs `&Registry` and can therefore run
//! from several threads at once.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{AppError, Warning};
use crate::expr::{self, Expr};

mod declare;
pub mod eval;
pub mod node;

pub use eval::Evaluator;
pub use node::{Function, Interpolant, Node, Pdf, ShiftTerm, SumTerm, VarRole, Variable};

/// Range of every shift nuisance variable.
pub const NUISANCE_RANGE: (f64, f64) = (-10.0, 10.0);

#[derive(Debug, Clone, Default)]
pub struct Registry {
    nodes: BTreeMap<String, Node>,
    order: Vec<String>,
    warnings: Vec<Warning>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// `(name, node)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.order
            .iter()
            .filter_map(|name| self.nodes.get(name).map(|node| (name.as_str(), node)))
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub(crate) fn record(&mut self, warning: Warning) {
        warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn node(&self, name: &str) -> Result<&Node, AppError> {
        self.nodes
            .get(name)
            .ok_or_else(|| AppError::NotFound(name.to_string()))
    }

    pub fn variable(&self, name: &str) -> Result<&Variable, AppError> {
        match self.node(name)? {
            Node::Variable(v) => Ok(v),
            other => Err(conflict(name, other, "variable")),
        }
    }

    pub fn function(&self, name: &str) -> Result<&Function, AppError> {
        match self.node(name)? {
            Node::Function(f) => Ok(f),
            other => Err(conflict(name, other, "function")),
        }
    }

    pub fn pdf(&self, name: &str) -> Result<&Pdf, AppError> {
        match self.node(name)? {
            Node::Pdf(p) => Ok(p),
            other => Err(conflict(name, other, "pdf")),
        }
    }

    /// Set a variable's value, clamped into its range.
    pub fn set_value(&mut self, name: &str, value: f64) -> Result<f64, AppError> {
        let node = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| AppError::NotFound(name.to_string()))?;
        let Node::Variable(v) = node else {
            return Err(conflict(name, node, "variable"));
        };
        let clamped = v.clamp(value);
        if clamped != value {
            warn!(name, requested = value, set = clamped, range = ?v.range, "value clamped into range");
        }
        v.value = clamped;
        Ok(v.value)
    }

    /// Declare a free parameter `[init, lo, hi]`, or recycle an existing
    /// variable of that name.
    ///
    /// A range with `lo == hi` declares a constant. When an existing variable
    /// has different bounds, the first declaration's bounds are kept and a
    /// `Warning::BoundsMismatch` is recorded.
    pub fn declare_variable(&mut self, name: &str, init: f64, lo: f64, hi: f64) -> Result<&Variable, AppError> {
        let role = if lo == hi {
            VarRole::Constant
        } else {
            VarRole::Parameter
        };
        self.declare_var(name, init, Some((lo, hi)), role, true)
    }

    /// Declare a bounded axis.
    pub fn declare_axis(&mut self, name: &str, lo: f64, hi: f64) -> Result<&Variable, AppError> {
        self.declare_var(name, 0.5 * (lo + hi), Some((lo, hi)), VarRole::Axis, true)
    }

    /// Make sure an axis named `name` exists; an absent axis is declared
    /// unbounded.
    pub fn ensure_axis(&mut self, name: &str) -> Result<&Variable, AppError> {
        self.declare_var(name, 0.0, None, VarRole::Axis, false)
    }

    /// Declare-or-recycle a spline control variable. An existing control's
    /// range is widened to the union with `[lo, hi]`, so every spline sharing
    /// it can reach its whole knot span.
    pub fn ensure_control(&mut self, name: &str, lo: f64, hi: f64, value: f64) -> Result<&Variable, AppError> {
        check_range(name, value, lo, hi)?;
        if let Some(Node::Variable(existing)) = self.nodes.get_mut(name) {
            if existing.role == VarRole::Control {
                if let Some((old_lo, old_hi)) = existing.range {
                    if lo < old_lo || hi > old_hi {
                        let widened = (old_lo.min(lo), old_hi.max(hi));
                        debug!(name, ?widened, "widening control range");
                        existing.range = Some(widened);
                    }
                }
            }
        }
        self.declare_var(name, value, Some((lo, hi)), VarRole::Control, false)
    }

    /// Declare-or-recycle a shift nuisance `[0, -10, 10]`.
    pub fn ensure_nuisance(&mut self, name: &str) -> Result<&Variable, AppError> {
        self.declare_var(name, 0.0, Some(NUISANCE_RANGE), VarRole::Nuisance, false)
    }

    fn declare_var(
        &mut self,
        name: &str,
        value: f64,
        range: Option<(f64, f64)>,
        role: VarRole,
        check_bounds: bool,
    ) -> Result<&Variable, AppError> {
        if let Some((lo, hi)) = range {
            check_range(name, value, lo, hi)?;
        }

        let mismatch = match self.nodes.get(name) {
            Some(Node::Variable(existing)) => {
                debug!(name, "recycling variable");
                match (existing.range, range) {
                    (Some(kept), Some(requested)) if check_bounds && kept != requested => {
                        Some(Warning::BoundsMismatch {
                            name: name.to_string(),
                            kept,
                            requested,
                        })
                    }
                    _ => None,
                }
            }
            Some(other) => return Err(conflict(name, other, "variable")),
            None => {
                let value = match range {
                    Some((lo, hi)) => value.clamp(lo, hi),
                    None => value,
                };
                debug!(name, value, ?range, role = role.as_str(), "declaring variable");
                self.insert(name, Node::Variable(Variable { value, range, role }));
                None
            }
        };
        if let Some(warning) = mismatch {
            self.record(warning);
        }
        self.variable(name)
    }

    /// Parse a declarative expression, name its top-level object `name`, and
    /// register every nested declaration. Returns the registered name.
    pub fn declare_expression(&mut self, name: &str, text: &str) -> Result<String, AppError> {
        let mut parsed = expr::parse(text)?;
        match &mut parsed {
            Expr::Call { name: slot, .. } => *slot = Some(name.to_string()),
            Expr::Var { name: slot, .. } => *slot = name.to_string(),
            _ => {
                return Err(AppError::Parse {
                    text: text.to_string(),
                    message: "expected a constructor call or a variable declaration".to_string(),
                });
            }
        }
        self.declare_expr(&parsed)
    }

    /// Register a typed expression tree. Returns the top-level name.
    pub fn declare_expr(&mut self, expr: &Expr) -> Result<String, AppError> {
        debug!(%expr, "declare");
        self.declare_term(expr)
    }

    /// Insert a precomputed object.
    ///
    /// With `recycle` an existing object of the same kind is kept and the new
    /// one dropped; otherwise any existing name is an error.
    pub fn import_object(&mut self, name: &str, node: Node, recycle: bool) -> Result<&Node, AppError> {
        match self.nodes.get(name) {
            Some(existing) if existing.kind_name() != node.kind_name() => {
                return Err(conflict(name, existing, node.kind_name()));
            }
            Some(_) if recycle => debug!(name, "recycling imported object"),
            Some(_) => return Err(AppError::Duplicate(name.to_string())),
            None => {
                debug!(name, kind = node.kind_name(), "importing object");
                self.insert(name, node);
            }
        }
        self.node(name)
    }

    /// Insert `node` under `name` unless an object of the same kind exists.
    pub(crate) fn insert_or_recycle(&mut self, name: &str, node: Node) -> Result<bool, AppError> {
        match self.nodes.get(name) {
            Some(existing) if existing.kind_name() == node.kind_name() => {
                debug!(name, "recycling");
                Ok(false)
            }
            Some(existing) => Err(conflict(name, existing, node.kind_name())),
            None => {
                self.insert(name, node);
                Ok(true)
            }
        }
    }

    fn insert(&mut self, name: &str, node: Node) {
        self.order.push(name.to_string());
        self.nodes.insert(name.to_string(), node);
    }
}

fn check_range(name: &str, value: f64, lo: f64, hi: f64) -> Result<(), AppError> {
    if !(lo.is_finite() && hi.is_finite() && value.is_finite()) || lo > hi {
        return Err(AppError::shape_config(
            name,
            format!("invalid variable range [{value}, {lo}, {hi}]"),
        ));
    }
    Ok(())
}

fn conflict(name: &str, existing: &Node, requested: &'static str) -> AppError {
    AppError::KindConflict {
        name: name.to_string(),
        existing: existing.kind_name(),
        requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaring_a_variable_recycles_it() {
        let mut reg = Registry::new();
        reg.declare_variable("mean_sig", 100.0, 0.0, 200.0).unwrap();
        let v = reg.declare_variable("mean_sig", 50.0, 0.0, 200.0).unwrap();
        assert_eq!(v.value, 100.0);
        assert_eq!(reg.len(), 1);
        assert!(reg.warnings().is_empty());
    }

    #[test]
    fn bounds_mismatch_keeps_first_and_warns() {
        let mut reg = Registry::new();
        reg.declare_variable("mean_sig", 100.0, 0.0, 200.0).unwrap();
        let v = reg.declare_variable("mean_sig", 50.0, 0.0, 100.0).unwrap();
        assert_eq!(v.range, Some((0.0, 200.0)));
        assert_eq!(
            reg.warnings(),
            [Warning::BoundsMismatch {
                name: "mean_sig".into(),
                kept: (0.0, 200.0),
                requested: (0.0, 100.0),
            }]
        );
    }

    #[test]
    fn kind_conflicts_are_errors() {
        let mut reg = Registry::new();
        reg.declare_expression("g", "Gaussian::g(x, m[0, -1, 1], s[1, 0, 2])")
            .unwrap();
        let err = reg.declare_variable("g", 0.0, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, AppError::KindConflict { existing: "pdf", .. }));
        assert!(matches!(reg.pdf("m"), Err(AppError::KindConflict { .. })));
        assert!(matches!(reg.node("nope"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn set_value_clamps_into_range() {
        let mut reg = Registry::new();
        reg.declare_variable("f", 0.5, 0.0, 1.0).unwrap();
        assert_eq!(reg.set_value("f", 3.0).unwrap(), 1.0);
        assert_eq!(reg.variable("f").unwrap().value, 1.0);
    }

    #[test]
    fn shared_controls_cover_every_span() {
        let mut reg = Registry::new();
        reg.ensure_control("MH", 100.0, 150.0, 100.0).unwrap();
        reg.ensure_control("MH", 120.0, 140.0, 120.0).unwrap();
        assert_eq!(reg.variable("MH").unwrap().range, Some((100.0, 150.0)));
        let v = reg.ensure_control("MH", 50.0, 200.0, 50.0).unwrap();
        assert_eq!(v.range, Some((50.0, 200.0)));
        assert_eq!(v.value, 100.0);
        assert!(reg.warnings().is_empty());
    }

    #[test]
    fn lo_equal_hi_declares_a_constant() {
        let mut reg = Registry::new();
        let v = reg.declare_variable("k", 2.0, 2.0, 2.0).unwrap();
        assert_eq!(v.role, VarRole::Constant);
        assert!(!v.is_free());
    }

    #[test]
    fn import_respects_recycle_flag() {
        let mut reg = Registry::new();
        let node = || {
            Node::Variable(Variable {
                value: 1.0,
                range: None,
                role: VarRole::Constant,
            })
        };
        reg.import_object("c", node(), false).unwrap();
        assert!(reg.import_object("c", node(), true).is_ok());
        assert!(matches!(
            reg.import_object("c", node(), false),
            Err(AppError::Duplicate(_))
        ));
        assert_eq!(reg.names().collect::<Vec<_>>(), ["c"]);
    }
}
