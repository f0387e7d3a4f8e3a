//! Formatted terminal output.
//!
//! Formatting lives here so the registry and fitting code stay free of
//! presentation concerns.

use crate::fit::FitOutcome;
use crate::io::BuiltModel;
use crate::registry::Registry;

/// Table of every registered object in declaration order, then warnings.
pub fn format_registry(registry: &Registry) -> String {
    let mut out = String::new();
    out.push_str(&format!("Registry: {} objects\n", registry.len()));
    out.push_str(format!("{:<28} {:<9} {}", "name", "kind", "definition").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<28} {:-<9} {:-<10}", "", "", "").trim_end());
    out.push('\n');

    for (name, node) in registry.iter() {
        out.push_str(format!("{:<28} {:<9} {node}", truncate(name, 28), node.kind_name()).trim_end());
        out.push('\n');
    }

    if !registry.warnings().is_empty() {
        out.push_str("\nWarnings:\n");
        for w in registry.warnings() {
            out.push_str(&format!("- {w}\n"));
        }
    }
    out
}

/// One line per built model: name, registry label, and parameters.
pub fn format_built(built: &[BuiltModel]) -> String {
    let mut out = String::from("Models:\n");
    for b in built {
        out.push_str(&format!("- {} -> {}", b.model.name, b.label));
        if !b.model.params().is_empty() {
            out.push_str(&format!(" [{}]", b.model.params().join(", ")));
        }
        if let Some(integral) = &b.integral {
            out.push_str(&format!(" (integral: {integral})"));
        }
        out.push('\n');
    }
    out
}

/// Fit summary: status line plus a value/error table.
pub fn format_fit_summary(model: &str, label: &str, outcome: &FitOutcome) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== mm fit: {model} ({label}) ===\n"));
    out.push_str(&format!(
        "NLL={:.6} | evaluations={} | converged={}\n\n",
        outcome.nll, outcome.evaluations, outcome.converged
    ));

    out.push_str(format!("{:<28} {:>14} {:>12}", "parameter", "value", "error").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<28} {:-<14} {:-<12}", "", "", "").trim_end());
    out.push('\n');
    for (name, value) in &outcome.values {
        let error = outcome
            .errors
            .get(name)
            .map(|e| format!("{e:>12.6}"))
            .unwrap_or_default();
        out.push_str(format!("{:<28} {value:>14.6} {error}", truncate(name, 28)).trim_end());
        out.push('\n');
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn registry_table_lists_objects_and_warnings() {
        let mut reg = Registry::new();
        reg.declare_variable("mean", 1.0, 0.0, 2.0).unwrap();
        reg.declare_variable("mean", 1.0, 0.0, 5.0).unwrap();
        let txt = format_registry(&reg);
        assert!(txt.contains("Registry: 1 objects"));
        assert!(txt.contains("mean"));
        assert!(txt.contains("variable"));
        assert!(txt.contains("Warnings:"));
    }

    #[test]
    fn fit_summary_shows_errors_when_present() {
        let outcome = FitOutcome {
            values: BTreeMap::from([("a".to_string(), 1.5), ("b".to_string(), 2.0)]),
            errors: BTreeMap::from([("a".to_string(), 0.25)]),
            nll: 3.0,
            converged: true,
            evaluations: 10,
        };
        let txt = format_fit_summary("sig", "sig", &outcome);
        assert!(txt.contains("converged=true"));
        let a_line = txt.lines().find(|l| l.starts_with("a ")).unwrap();
        assert!(a_line.ends_with("0.250000"));
        let b_line = txt.lines().find(|l| l.starts_with("b ")).unwrap();
        assert!(b_line.ends_with("2.000000"));
    }

    #[test]
    fn truncate_marks_cut_names() {
        assert_eq!(truncate("abcdef", 4), "abc.");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
