//! Common-subexpression extraction
//!
//! Repeated compound subtrees across a set of expressions are pulled out
//! into named temporaries, each defined once and referenced by symbol. The
//! extraction is verbatim: subtrees must match structurally, and no
//! algebraic rewriting is attempted first. That keeps the pass from
//! legally restructuring a guarded division into an unguarded power.

use std::collections::{BTreeSet, HashMap};

use super::{Expr, UnOp};

/// Replacements plus the reduced originals referencing them
#[derive(Debug, Clone)]
pub struct CseResult {
    /// `(temporary name, defining expression)` in dependency order: a
    /// definition only ever references temporaries introduced before it.
    pub replacements: Vec<(String, Expr)>,
    /// The input expressions with extracted subtrees replaced by symbols
    pub reduced: Vec<Expr>,
}

/// Extract subtrees occurring at least twice across `exprs`.
///
/// `reserved` holds every identifier already meaningful in the model so
/// that generated temporary names cannot shadow a species or parameter.
pub fn eliminate_common_subexpressions(
    exprs: &[Expr],
    reserved: &BTreeSet<String>,
) -> CseResult {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for expr in exprs {
        count_subtrees(expr, &mut counts);
    }

    let candidates: BTreeSet<String> = counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .map(|(key, _)| key)
        .collect();

    let mut extractor = Extractor {
        candidates,
        assigned: HashMap::new(),
        replacements: Vec::new(),
        reserved,
        next_index: 0,
    };

    let reduced = exprs.iter().map(|expr| extractor.reduce(expr)).collect();

    CseResult {
        replacements: extractor.replacements,
        reduced,
    }
}

/// Whether a node is worth naming: compound, numeric-valued, and not a
/// bare constant. Relations and logicals stay inline because a temporary
/// binding would change their type in the emitted code.
fn extractable(expr: &Expr) -> bool {
    match expr {
        Expr::Number(_) | Expr::Symbol(_) => false,
        Expr::Relation(_, _, _) | Expr::Logical(_, _) | Expr::Unary(UnOp::Not, _) => false,
        _ => !expr.free_symbols().is_empty(),
    }
}

fn key_of(expr: &Expr) -> String {
    format!("{:?}", expr)
}

fn count_subtrees(expr: &Expr, counts: &mut HashMap<String, usize>) {
    if extractable(expr) {
        *counts.entry(key_of(expr)).or_insert(0) += 1;
    }
    match expr {
        Expr::Number(_) | Expr::Symbol(_) => {}
        Expr::Binary(_, lhs, rhs) | Expr::Relation(_, lhs, rhs) => {
            count_subtrees(lhs, counts);
            count_subtrees(rhs, counts);
        }
        Expr::Unary(_, operand) => count_subtrees(operand, counts),
        Expr::Call(_, args) | Expr::Logical(_, args) => {
            for arg in args {
                count_subtrees(arg, counts);
            }
        }
        Expr::Piecewise { branches, default } => {
            for branch in branches {
                count_subtrees(&branch.value, counts);
                count_subtrees(&branch.condition, counts);
            }
            if let Some(default) = default {
                count_subtrees(default, counts);
            }
        }
    }
}

struct Extractor<'a> {
    candidates: BTreeSet<String>,
    assigned: HashMap<String, String>,
    replacements: Vec<(String, Expr)>,
    reserved: &'a BTreeSet<String>,
    next_index: usize,
}

impl Extractor<'_> {
    fn fresh_name(&mut self) -> String {
        loop {
            let name = format!("x{}", self.next_index);
            self.next_index += 1;
            if !self.reserved.contains(&name) {
                return name;
            }
        }
    }

    /// Rebuild `expr` bottom-up. Children are reduced before their parent
    /// is registered, which is what guarantees the dependency ordering of
    /// the replacement list.
    fn reduce(&mut self, expr: &Expr) -> Expr {
        let rebuilt = match expr {
            Expr::Number(_) | Expr::Symbol(_) => expr.clone(),
            Expr::Binary(op, lhs, rhs) => Expr::Binary(
                *op,
                Box::new(self.reduce(lhs)),
                Box::new(self.reduce(rhs)),
            ),
            Expr::Unary(op, operand) => Expr::Unary(*op, Box::new(self.reduce(operand))),
            Expr::Call(name, args) => Expr::Call(
                name.clone(),
                args.iter().map(|arg| self.reduce(arg)).collect(),
            ),
            Expr::Piecewise { branches, default } => Expr::Piecewise {
                branches: branches
                    .iter()
                    .map(|branch| super::Branch {
                        value: self.reduce(&branch.value),
                        condition: self.reduce(&branch.condition),
                    })
                    .collect(),
                default: default.as_ref().map(|d| Box::new(self.reduce(d))),
            },
            Expr::Relation(op, lhs, rhs) => Expr::Relation(
                *op,
                Box::new(self.reduce(lhs)),
                Box::new(self.reduce(rhs)),
            ),
            Expr::Logical(op, operands) => Expr::Logical(
                *op,
                operands.iter().map(|operand| self.reduce(operand)).collect(),
            ),
        };

        let key = key_of(expr);
        if self.candidates.contains(&key) {
            if let Some(name) = self.assigned.get(&key) {
                return Expr::Symbol(name.clone());
            }
            let name = self.fresh_name();
            self.assigned.insert(key, name.clone());
            self.replacements.push((name.clone(), rebuilt));
            return Expr::Symbol(name);
        }
        rebuilt
    }
}
