//! Expression optimization
//!
//! Level 0 passes expressions through untouched, level 1 only folds, and
//! level 2 and above runs common-subexpression elimination over the
//! combined derivative and Jacobian sets so a rate term shared between a
//! derivative and its partials is computed exactly once.
//!
//! Extraction is verbatim-subtree only. Aggressive algebraic rewriting is
//! deliberately off: a rewrite that turns `1/(a+b)` into `(a+b)^-1` moves
//! the division out from under whatever guard surrounded it.
//!
//! After CSE a numeric-safety pass rewrites negative-integer powers whose
//! base can evaluate to exactly zero — a piecewise with a zero branch, or
//! anything built from one — into a guarded conditional with an infinite
//! sentinel, so the generated program returns a bounded value instead of
//! dividing by zero.

use std::collections::BTreeSet;

use crate::expr::{
    eliminate_common_subexpressions, BinOp, Branch, Expr, RelOp, UnOp,
};

/// Jointly optimized derivative and Jacobian expressions
#[derive(Debug, Clone)]
pub struct Optimized {
    /// CSE temporaries in dependency order
    pub replacements: Vec<(String, Expr)>,
    pub reduced_ode: Vec<Expr>,
    pub reduced_jacobian: Vec<Expr>,
}

/// Optimizer with a configurable level (0 = off, 1 = fold, >=2 = CSE)
#[derive(Debug, Clone, Copy)]
pub struct SymbolicOptimizer {
    level: u8,
}

impl Default for SymbolicOptimizer {
    fn default() -> Self {
        Self { level: 2 }
    }
}

impl SymbolicOptimizer {
    pub fn new(level: u8) -> Self {
        Self { level }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// Optimize a single expression list.
    ///
    /// Returns the temporaries and the reduced expressions. Finding no
    /// shared subexpressions is not an error; the output is then just the
    /// (possibly folded) input.
    pub fn optimize(
        &self,
        exprs: &[Expr],
        reserved: &BTreeSet<String>,
    ) -> (Vec<(String, Expr)>, Vec<Expr>) {
        match self.level {
            0 => (Vec::new(), exprs.to_vec()),
            1 => (Vec::new(), exprs.iter().map(Expr::simplify).collect()),
            _ => {
                let result = eliminate_common_subexpressions(exprs, reserved);
                if result.replacements.is_empty() {
                    tracing::debug!("CSE found no shared subexpressions");
                } else {
                    tracing::info!(
                        temporaries = result.replacements.len(),
                        "CSE extracted {} common subexpressions",
                        result.replacements.len()
                    );
                }
                let (replacements, reduced) =
                    apply_safety_rewrites(result.replacements, result.reduced);
                (replacements, reduced)
            }
        }
    }

    /// Optimize derivatives and Jacobian together for maximum sharing,
    /// then split the reduced list back by the original lengths.
    pub fn optimize_combined(
        &self,
        ode: &[Expr],
        jacobian: &[Expr],
        reserved: &BTreeSet<String>,
    ) -> Optimized {
        let mut combined = Vec::with_capacity(ode.len() + jacobian.len());
        combined.extend_from_slice(ode);
        combined.extend_from_slice(jacobian);

        let (replacements, mut reduced) = self.optimize(&combined, reserved);
        let reduced_jacobian = reduced.split_off(ode.len());

        Optimized {
            replacements,
            reduced_ode: reduced,
            reduced_jacobian,
        }
    }
}

/// Rewrite `base^(-k)` into a guarded conditional wherever `base` is
/// zero-capable. Runs bottom-up over the replacement list first, so the
/// zero-capability of every temporary is settled before any expression
/// referencing it is checked.
fn apply_safety_rewrites(
    replacements: Vec<(String, Expr)>,
    reduced: Vec<Expr>,
) -> (Vec<(String, Expr)>, Vec<Expr>) {
    let mut zero_capable: BTreeSet<String> = BTreeSet::new();
    let mut guarded_replacements = Vec::with_capacity(replacements.len());

    for (name, expr) in replacements {
        let rewritten = rewrite_negative_powers(&expr, &zero_capable);
        if is_zero_capable(&rewritten, &zero_capable) {
            zero_capable.insert(name.clone());
        }
        guarded_replacements.push((name, rewritten));
    }

    let guarded_reduced = reduced
        .iter()
        .map(|expr| rewrite_negative_powers(expr, &zero_capable))
        .collect();

    (guarded_replacements, guarded_reduced)
}

/// Whether an expression can evaluate to exactly zero: a zero-valued
/// piecewise branch, a symbol already known to be zero-capable, or an
/// arithmetic compound containing one. Propagation is transitive through
/// the temporary set built up by the caller.
fn is_zero_capable(expr: &Expr, zero_symbols: &BTreeSet<String>) -> bool {
    match expr {
        Expr::Number(n) => *n == 0.0,
        Expr::Symbol(name) => zero_symbols.contains(name),
        Expr::Binary(BinOp::Pow, base, _) => is_zero_capable(base, zero_symbols),
        Expr::Binary(_, lhs, rhs) => {
            is_zero_capable(lhs, zero_symbols) || is_zero_capable(rhs, zero_symbols)
        }
        Expr::Unary(UnOp::Neg, operand) => is_zero_capable(operand, zero_symbols),
        Expr::Unary(UnOp::Not, _) => false,
        Expr::Call(name, args) => match name.as_str() {
            "sqrt" | "abs" => args
                .first()
                .is_some_and(|arg| is_zero_capable(arg, zero_symbols)),
            _ => false,
        },
        Expr::Piecewise { branches, default } => {
            branches
                .iter()
                .any(|branch| is_zero_capable(&branch.value, zero_symbols))
                || default
                    .as_ref()
                    .is_some_and(|d| is_zero_capable(d, zero_symbols))
        }
        Expr::Relation(_, _, _) | Expr::Logical(_, _) => false,
    }
}

fn rewrite_negative_powers(expr: &Expr, zero_symbols: &BTreeSet<String>) -> Expr {
    match expr {
        Expr::Number(_) | Expr::Symbol(_) => expr.clone(),
        Expr::Binary(BinOp::Pow, base, exponent) => {
            let base = rewrite_negative_powers(base, zero_symbols);
            let exponent = rewrite_negative_powers(exponent, zero_symbols);
            let negative_integer =
                exponent.as_integer().map(|n| n < 0).unwrap_or(false);
            if negative_integer && is_zero_capable(&base, zero_symbols) {
                let power = Expr::Binary(
                    BinOp::Pow,
                    Box::new(base.clone()),
                    Box::new(exponent),
                );
                Expr::Piecewise {
                    branches: vec![Branch {
                        value: power,
                        condition: Expr::Relation(
                            RelOp::Ne,
                            Box::new(base),
                            Box::new(Expr::zero()),
                        ),
                    }],
                    default: Some(Box::new(Expr::Number(f64::INFINITY))),
                }
            } else {
                Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent))
            }
        }
        Expr::Binary(op, lhs, rhs) => Expr::Binary(
            *op,
            Box::new(rewrite_negative_powers(lhs, zero_symbols)),
            Box::new(rewrite_negative_powers(rhs, zero_symbols)),
        ),
        Expr::Unary(op, operand) => {
            Expr::Unary(*op, Box::new(rewrite_negative_powers(operand, zero_symbols)))
        }
        Expr::Call(name, args) => Expr::Call(
            name.clone(),
            args.iter()
                .map(|arg| rewrite_negative_powers(arg, zero_symbols))
                .collect(),
        ),
        Expr::Piecewise { branches, default } => Expr::Piecewise {
            branches: branches
                .iter()
                .map(|branch| Branch {
                    value: rewrite_negative_powers(&branch.value, zero_symbols),
                    condition: rewrite_negative_powers(&branch.condition, zero_symbols),
                })
                .collect(),
            default: default
                .as_ref()
                .map(|d| Box::new(rewrite_negative_powers(d, zero_symbols))),
        },
        Expr::Relation(op, lhs, rhs) => Expr::Relation(
            *op,
            Box::new(rewrite_negative_powers(lhs, zero_symbols)),
            Box::new(rewrite_negative_powers(rhs, zero_symbols)),
        ),
        Expr::Logical(op, operands) => Expr::Logical(
            *op,
            operands
                .iter()
                .map(|operand| rewrite_negative_powers(operand, zero_symbols))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserved() -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn zero_branch_piecewise() -> Expr {
        Expr::Piecewise {
            branches: vec![Branch {
                value: Expr::zero(),
                condition: Expr::Relation(
                    RelOp::Lt,
                    Box::new(Expr::symbol("t")),
                    Box::new(Expr::number(5.0)),
                ),
            }],
            default: Some(Box::new(Expr::symbol("x"))),
        }
    }

    #[test]
    fn level_zero_is_a_no_op() {
        let optimizer = SymbolicOptimizer::new(0);
        let exprs = vec![Expr::symbol("a") * Expr::symbol("b")];
        let (replacements, reduced) = optimizer.optimize(&exprs, &reserved());
        assert!(replacements.is_empty());
        assert_eq!(reduced, exprs);
    }

    #[test]
    fn combined_optimization_shares_across_ode_and_jacobian() {
        let ab = Expr::symbol("a") * Expr::symbol("b");
        let ode = vec![ab.clone() + Expr::symbol("c")];
        let jacobian = vec![ab.clone() - Expr::symbol("d")];

        let optimized =
            SymbolicOptimizer::default().optimize_combined(&ode, &jacobian, &reserved());

        assert_eq!(optimized.replacements.len(), 1);
        assert_eq!(optimized.replacements[0].1, ab);
        assert_eq!(optimized.reduced_ode.len(), 1);
        assert_eq!(optimized.reduced_jacobian.len(), 1);
    }

    #[test]
    fn negative_power_over_zero_branch_piecewise_is_guarded() {
        let base = zero_branch_piecewise();
        let expr = base.clone().pow(Expr::number(-1.0));
        let (_, reduced) =
            SymbolicOptimizer::default().optimize(&[expr], &reserved());

        match &reduced[0] {
            Expr::Piecewise { branches, default } => {
                assert!(matches!(
                    branches[0].condition,
                    Expr::Relation(RelOp::Ne, _, _)
                ));
                assert_eq!(
                    **default.as_ref().unwrap(),
                    Expr::Number(f64::INFINITY)
                );
            }
            other => panic!("expected guarded conditional, got {other}"),
        }
    }

    #[test]
    fn zero_capability_propagates_through_temporaries() {
        // The piecewise is shared so CSE names it; the negative power over
        // the temporary must still be guarded.
        let base = zero_branch_piecewise();
        let shared = base.clone() * Expr::symbol("y");
        let exprs = vec![
            shared.clone() + Expr::symbol("z"),
            shared.clone().pow(Expr::number(-2.0)),
        ];
        let (replacements, reduced) =
            SymbolicOptimizer::default().optimize(&exprs, &reserved());

        assert!(!replacements.is_empty());
        // the reduced power expression is a guard, not a bare power
        match &reduced[1] {
            Expr::Piecewise { default, .. } => {
                assert_eq!(
                    **default.as_ref().unwrap(),
                    Expr::Number(f64::INFINITY)
                );
            }
            other => panic!("expected guarded conditional, got {other}"),
        }
    }

    #[test]
    fn positive_powers_are_left_alone() {
        let base = zero_branch_piecewise();
        let expr = base.pow(Expr::number(2.0));
        let (_, reduced) =
            SymbolicOptimizer::default().optimize(&[expr.clone()], &reserved());
        assert_eq!(reduced[0], expr);
    }

    #[test]
    fn safe_bases_are_left_alone() {
        let expr = Expr::symbol("x").pow(Expr::number(-1.0));
        let (_, reduced) =
            SymbolicOptimizer::default().optimize(&[expr.clone()], &reserved());
        assert_eq!(reduced[0], expr);
    }

    #[test]
    fn arithmetic_compound_of_zero_capable_is_flagged() {
        let compound = zero_branch_piecewise() + Expr::symbol("y");
        assert!(is_zero_capable(&compound, &BTreeSet::new()));
        let product = Expr::symbol("y") * zero_branch_piecewise();
        assert!(is_zero_capable(&product, &BTreeSet::new()));
    }
}
