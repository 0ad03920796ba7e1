//! Statement-block assembly
//!
//! Composes printed expressions into the statement sequences each section
//! of the generated file needs: CSE temporaries, derivative assignments,
//! Jacobian-vector accumulation, state and parameter extraction, rule
//! bindings, and result-vector plumbing. Mechanical by design — everything
//! interesting happened before the expressions got here.

use crate::codegen::idents::to_identifier;
use crate::codegen::printer::{float_literal, RustPrinter};
use crate::expr::Expr;
use crate::symbolic::JacobianEntry;

/// Generates the per-section statement blocks
#[derive(Debug, Default)]
pub struct BlockGenerator {
    printer: RustPrinter,
}

impl BlockGenerator {
    pub fn new() -> Self {
        Self {
            printer: RustPrinter::new(),
        }
    }

    /// `let x0 = ...;` lines for CSE temporaries, dependency order
    pub fn temp_vars(&self, replacements: &[(String, Expr)]) -> String {
        replacements
            .iter()
            .map(|(name, expr)| format!("        let {} = {};", name, self.printer.render(expr)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `dy[i] = ...;` derivative assignments
    pub fn derivatives(&self, exprs: &[Expr]) -> String {
        exprs
            .iter()
            .enumerate()
            .map(|(i, expr)| format!("        dy[{}] = {};", i, self.printer.render(expr)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `jv[row] += (...) * v[col];` Jacobian-vector product accumulation.
    /// `entries` provides the sparsity pattern, `reduced` the post-CSE
    /// expression for each entry, in the same order.
    pub fn jacobian(&self, entries: &[JacobianEntry], reduced: &[Expr]) -> String {
        entries
            .iter()
            .zip(reduced)
            .map(|(entry, expr)| {
                format!(
                    "        jv[{}] += ({}) * v[{}];",
                    entry.row,
                    self.printer.render(expr),
                    entry.col,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `let A = y[0];` state extraction in declaration order
    pub fn species_extraction(&self, species_order: &[String]) -> String {
        species_order
            .iter()
            .enumerate()
            .map(|(index, id)| format!("        let {} = y[{}];", id, index))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `let k1 = sim_params.k1.unwrap_or(0.5);` parameter extraction with
    /// per-field defaults, supporting partial runtime overrides
    pub fn parameter_extraction(&self, parameters: &[(String, f64)]) -> String {
        parameters
            .iter()
            .map(|(name, default)| {
                format!(
                    "    let {} = sim_params.{}.unwrap_or({});",
                    name,
                    name,
                    float_literal(*default),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Rule bindings in the order the analyzer produced, one `let` each
    pub fn rule_bindings(&self, rules: &[(String, Expr)], indent: &str) -> String {
        rules
            .iter()
            .map(|(variable, expr)| {
                format!("{}let {} = {};", indent, variable, self.printer.render(expr))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Preamble bindings for initial state with per-species overrides:
    /// `let init_a = sim_params.init_a.unwrap_or(1.0);`
    pub fn initial_state_bindings(&self, species: &[(String, f64)]) -> String {
        species
            .iter()
            .map(|(id, value)| {
                let ident = to_identifier(id);
                format!(
                    "    let init_{} = sim_params.init_{}.unwrap_or({});",
                    ident,
                    ident,
                    float_literal(*value),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Initial state assignments inside the init closure
    pub fn initial_state(&self, species: &[(String, f64)]) -> String {
        species
            .iter()
            .enumerate()
            .map(|(index, (id, _))| {
                format!("        y[{}] = init_{};", index, to_identifier(id))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `let mut a = Vec::new();` result-vector initialization
    pub fn result_vectors_init(&self, species_order: &[String]) -> String {
        species_order
            .iter()
            .map(|id| format!("    let mut {} = Vec::new();", to_identifier(id)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Push the current solver state into each result vector
    pub fn result_pushes(&self, species_order: &[String], indent: &str) -> String {
        species_order
            .iter()
            .enumerate()
            .map(|(index, id)| {
                format!(
                    "{}{}.push(solver.state().y[{}]);",
                    indent,
                    to_identifier(id),
                    index,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Collect result vectors into the output map
    pub fn map_inserts(&self, species_order: &[String]) -> String {
        species_order
            .iter()
            .map(|id| {
                let ident = to_identifier(id);
                format!(
                    "    species_map.insert(\"{}\".to_string(), {});",
                    ident, ident,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Default-parameter JSON entries for the introspection endpoint
    pub fn default_parameter_entries(&self, parameters: &[(String, f64)]) -> String {
        parameters
            .iter()
            .map(|(name, value)| {
                format!(
                    "    map.insert(\"{}\".to_string(), {});",
                    name,
                    float_literal(*value),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_vars_render_in_order() {
        let generator = BlockGenerator::new();
        let replacements = vec![
            ("x0".to_string(), Expr::symbol("a") * Expr::symbol("b")),
            ("x1".to_string(), Expr::symbol("x0") + Expr::symbol("c")),
        ];
        let block = generator.temp_vars(&replacements);
        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines[0].trim(), "let x0 = a * b;");
        assert_eq!(lines[1].trim(), "let x1 = x0 + c;");
    }

    #[test]
    fn derivative_block_indexes_states() {
        let generator = BlockGenerator::new();
        let rate = Expr::symbol("k1") * Expr::symbol("A");
        let block = generator.derivatives(&[-rate.clone(), rate]);
        assert!(block.contains("dy[0] = -(k1 * A);"));
        assert!(block.contains("dy[1] = k1 * A;"));
    }

    #[test]
    fn jacobian_block_accumulates_products() {
        let generator = BlockGenerator::new();
        let entries = vec![
            JacobianEntry {
                row: 0,
                col: 0,
                expr: -Expr::symbol("k1"),
            },
            JacobianEntry {
                row: 1,
                col: 0,
                expr: Expr::symbol("k1"),
            },
        ];
        let reduced = vec![-Expr::symbol("k1"), Expr::symbol("k1")];
        let block = generator.jacobian(&entries, &reduced);
        assert!(block.contains("jv[0] += (-k1) * v[0];"));
        assert!(block.contains("jv[1] += (k1) * v[0];"));
    }

    #[test]
    fn species_extraction_uses_declaration_order() {
        let generator = BlockGenerator::new();
        let block = generator
            .species_extraction(&["A".to_string(), "B".to_string()]);
        assert!(block.contains("let A = y[0];"));
        assert!(block.contains("let B = y[1];"));
    }

    #[test]
    fn parameter_extraction_supports_partial_overrides() {
        let generator = BlockGenerator::new();
        let block = generator.parameter_extraction(&[("k1".to_string(), 0.5)]);
        assert_eq!(
            block.trim(),
            "let k1 = sim_params.k1.unwrap_or(0.5);"
        );
    }

    #[test]
    fn initial_state_sanitizes_identifiers() {
        let generator = BlockGenerator::new();
        let bindings =
            generator.initial_state_bindings(&[("Species-1".to_string(), 2.0)]);
        assert!(bindings
            .contains("let init_species_1 = sim_params.init_species_1.unwrap_or(2.0);"));
        let block = generator.initial_state(&[("Species-1".to_string(), 2.0)]);
        assert!(block.contains("y[0] = init_species_1;"));
    }
}
