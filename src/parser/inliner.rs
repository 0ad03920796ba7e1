//! User-defined function inlining
//!
//! Call sites of model function definitions are replaced by the callee
//! body with each formal parameter substituted by the corresponding
//! argument subtree. Substitution happens on the tree, keyed by formal
//! symbol name, so identifier-prefix collisions and nested parentheses —
//! the classic failure modes of textual splicing — cannot occur.
//!
//! Bodies may call other user functions, so inlining iterates to a fixed
//! point, bounded by [`MAX_INLINE_DEPTH`] to stay terminating on
//! self-referential definitions. A call still unresolved at the bound is
//! left in place rather than looping forever.

use std::collections::HashMap;

use crate::expr::{Branch, Expr};

/// Iteration bound guarding against recursive definitions
pub const MAX_INLINE_DEPTH: usize = 10;

/// A function definition with its body already parsed
#[derive(Debug, Clone)]
pub struct ParsedFunction {
    pub arguments: Vec<String>,
    pub body: Expr,
}

/// Inliner over a table of parsed function definitions
#[derive(Debug)]
pub struct FunctionInliner<'a> {
    functions: &'a HashMap<String, ParsedFunction>,
}

impl<'a> FunctionInliner<'a> {
    pub fn new(functions: &'a HashMap<String, ParsedFunction>) -> Self {
        Self { functions }
    }

    /// Inline every resolvable call site, iterating until nothing changes
    /// or the depth bound is reached.
    pub fn inline(&self, expr: &Expr) -> Expr {
        let mut current = expr.clone();
        for _ in 0..MAX_INLINE_DEPTH {
            let mut substituted = false;
            current = self.inline_pass(&current, &mut substituted);
            if !substituted {
                break;
            }
        }
        current
    }

    /// One bottom-up pass: arguments are rewritten before the call itself
    /// so nested custom calls resolve inside-out.
    fn inline_pass(&self, expr: &Expr, substituted: &mut bool) -> Expr {
        match expr {
            Expr::Number(_) | Expr::Symbol(_) => expr.clone(),
            Expr::Binary(op, lhs, rhs) => Expr::Binary(
                *op,
                Box::new(self.inline_pass(lhs, substituted)),
                Box::new(self.inline_pass(rhs, substituted)),
            ),
            Expr::Unary(op, operand) => {
                Expr::Unary(*op, Box::new(self.inline_pass(operand, substituted)))
            }
            Expr::Call(name, args) => {
                let args: Vec<Expr> = args
                    .iter()
                    .map(|arg| self.inline_pass(arg, substituted))
                    .collect();
                if let Some(function) = self.functions.get(name) {
                    *substituted = true;
                    let substitutions: HashMap<String, Expr> = function
                        .arguments
                        .iter()
                        .cloned()
                        .zip(args.iter().cloned())
                        .collect();
                    function.body.substitute_map(&substitutions)
                } else {
                    Expr::Call(name.clone(), args)
                }
            }
            Expr::Piecewise { branches, default } => Expr::Piecewise {
                branches: branches
                    .iter()
                    .map(|branch| Branch {
                        value: self.inline_pass(&branch.value, substituted),
                        condition: self.inline_pass(&branch.condition, substituted),
                    })
                    .collect(),
                default: default
                    .as_ref()
                    .map(|d| Box::new(self.inline_pass(d, substituted))),
            },
            Expr::Relation(op, lhs, rhs) => Expr::Relation(
                *op,
                Box::new(self.inline_pass(lhs, substituted)),
                Box::new(self.inline_pass(rhs, substituted)),
            ),
            Expr::Logical(op, operands) => Expr::Logical(
                *op,
                operands
                    .iter()
                    .map(|operand| self.inline_pass(operand, substituted))
                    .collect(),
            ),
        }
    }
}
