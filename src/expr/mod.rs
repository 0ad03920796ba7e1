//! Algebraic intermediate representation for model math
//!
//! Every expression a model carries (rate laws, rules, triggers) is parsed
//! into [`Expr`], a closed tagged tree. The tree is immutable once built:
//! all transformations (substitution, differentiation, simplification,
//! CSE) produce new trees. Exhaustive matching over the variants is what
//! lets differentiation and printing prove they cover the whole grammar.

mod cse;
mod diff;
mod simplify;

pub use cse::{eliminate_common_subexpressions, CseResult};

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt;

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl RelOp {
    /// The operator token in the target language
    pub fn symbol(&self) -> &'static str {
        match self {
            RelOp::Gt => ">",
            RelOp::Lt => "<",
            RelOp::Ge => ">=",
            RelOp::Le => "<=",
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
        }
    }
}

/// Logical connectives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOp {
    And,
    Or,
}

impl LogOp {
    /// The operator token in the target language
    pub fn symbol(&self) -> &'static str {
        match self {
            LogOp::And => "&&",
            LogOp::Or => "||",
        }
    }
}

/// One `(value, condition)` branch of a piecewise expression
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub value: Expr,
    pub condition: Expr,
}

/// A symbolic expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric constant
    Number(f64),
    /// Named identifier (species, parameter, compartment, time, temporary)
    Symbol(String),
    /// Binary arithmetic
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Unary operation
    Unary(UnOp, Box<Expr>),
    /// Function application (builtin or not-yet-inlined user function)
    Call(String, Vec<Expr>),
    /// Ordered conditional branches with an optional unconditional default
    Piecewise {
        branches: Vec<Branch>,
        default: Option<Box<Expr>>,
    },
    /// Comparison producing a boolean
    Relation(RelOp, Box<Expr>, Box<Expr>),
    /// Boolean connective over two or more operands
    Logical(LogOp, Vec<Expr>),
}

impl Expr {
    /// The zero constant, used as the empty-expression parse result and as
    /// the initial value of every derivative accumulator.
    pub fn zero() -> Expr {
        Expr::Number(0.0)
    }

    /// Numeric constant
    pub fn number(value: f64) -> Expr {
        Expr::Number(value)
    }

    /// Named symbol
    pub fn symbol(name: impl Into<String>) -> Expr {
        Expr::Symbol(name.into())
    }

    /// `base ^ exponent`
    pub fn pow(self, exponent: Expr) -> Expr {
        Expr::Binary(BinOp::Pow, Box::new(self), Box::new(exponent))
    }

    /// Structural zero test (after folding this is the "proven zero" test
    /// the sparse Jacobian relies on)
    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Number(n) if *n == 0.0)
    }

    /// Structural one test
    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Number(n) if *n == 1.0)
    }

    /// If this is a numeric constant holding an integer value, return it
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Expr::Number(n) if n.fract() == 0.0 && n.abs() <= i32::MAX as f64 => Some(*n as i32),
            _ => None,
        }
    }

    /// Every symbol name referenced anywhere in the tree
    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Symbol(name) => {
                out.insert(name.clone());
            }
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_symbols(out);
                rhs.collect_symbols(out);
            }
            Expr::Unary(_, operand) => operand.collect_symbols(out),
            Expr::Call(_, args) => {
                for arg in args {
                    arg.collect_symbols(out);
                }
            }
            Expr::Piecewise { branches, default } => {
                for branch in branches {
                    branch.value.collect_symbols(out);
                    branch.condition.collect_symbols(out);
                }
                if let Some(default) = default {
                    default.collect_symbols(out);
                }
            }
            Expr::Relation(_, lhs, rhs) => {
                lhs.collect_symbols(out);
                rhs.collect_symbols(out);
            }
            Expr::Logical(_, operands) => {
                for operand in operands {
                    operand.collect_symbols(out);
                }
            }
        }
    }

    /// Replace every occurrence of the named symbol with a subtree
    pub fn substitute(&self, name: &str, replacement: &Expr) -> Expr {
        self.map_symbols(&|sym| {
            if sym == name {
                Some(replacement.clone())
            } else {
                None
            }
        })
    }

    /// Replace symbols from a map in one traversal
    pub fn substitute_map(&self, substitutions: &HashMap<String, Expr>) -> Expr {
        self.map_symbols(&|sym| substitutions.get(sym).cloned())
    }

    /// Rebuild the tree, replacing any symbol for which `lookup` returns a
    /// subtree and keeping everything else structurally intact
    pub fn map_symbols(&self, lookup: &dyn Fn(&str) -> Option<Expr>) -> Expr {
        match self {
            Expr::Number(_) => self.clone(),
            Expr::Symbol(name) => lookup(name).unwrap_or_else(|| self.clone()),
            Expr::Binary(op, lhs, rhs) => Expr::Binary(
                *op,
                Box::new(lhs.map_symbols(lookup)),
                Box::new(rhs.map_symbols(lookup)),
            ),
            Expr::Unary(op, operand) => Expr::Unary(*op, Box::new(operand.map_symbols(lookup))),
            Expr::Call(name, args) => Expr::Call(
                name.clone(),
                args.iter().map(|arg| arg.map_symbols(lookup)).collect(),
            ),
            Expr::Piecewise { branches, default } => Expr::Piecewise {
                branches: branches
                    .iter()
                    .map(|branch| Branch {
                        value: branch.value.map_symbols(lookup),
                        condition: branch.condition.map_symbols(lookup),
                    })
                    .collect(),
                default: default
                    .as_ref()
                    .map(|default| Box::new(default.map_symbols(lookup))),
            },
            Expr::Relation(op, lhs, rhs) => Expr::Relation(
                *op,
                Box::new(lhs.map_symbols(lookup)),
                Box::new(rhs.map_symbols(lookup)),
            ),
            Expr::Logical(op, operands) => Expr::Logical(
                *op,
                operands
                    .iter()
                    .map(|operand| operand.map_symbols(lookup))
                    .collect(),
            ),
        }
    }

    /// True if any `Call` node anywhere in the tree has the given name
    pub fn contains_call(&self, name: &str) -> bool {
        match self {
            Expr::Number(_) | Expr::Symbol(_) => false,
            Expr::Binary(_, lhs, rhs) => lhs.contains_call(name) || rhs.contains_call(name),
            Expr::Unary(_, operand) => operand.contains_call(name),
            Expr::Call(call_name, args) => {
                call_name == name || args.iter().any(|arg| arg.contains_call(name))
            }
            Expr::Piecewise { branches, default } => {
                branches
                    .iter()
                    .any(|b| b.value.contains_call(name) || b.condition.contains_call(name))
                    || default.as_ref().is_some_and(|d| d.contains_call(name))
            }
            Expr::Relation(_, lhs, rhs) => lhs.contains_call(name) || rhs.contains_call(name),
            Expr::Logical(_, operands) => operands.iter().any(|o| o.contains_call(name)),
        }
    }

    /// True if the tree contains a piecewise node
    pub fn contains_piecewise(&self) -> bool {
        match self {
            Expr::Number(_) | Expr::Symbol(_) => false,
            Expr::Binary(_, lhs, rhs) => lhs.contains_piecewise() || rhs.contains_piecewise(),
            Expr::Unary(_, operand) => operand.contains_piecewise(),
            Expr::Call(_, args) => args.iter().any(|arg| arg.contains_piecewise()),
            Expr::Piecewise { .. } => true,
            Expr::Relation(_, lhs, rhs) => lhs.contains_piecewise() || rhs.contains_piecewise(),
            Expr::Logical(_, operands) => operands.iter().any(|o| o.contains_piecewise()),
        }
    }

    /// Numerically evaluate the tree with the given symbol values.
    ///
    /// Relations and logicals evaluate to 1.0 / 0.0. Returns `None` when a
    /// symbol is missing, a call is not a known builtin, or a piecewise has
    /// no matching branch and no default. Primarily exercised by tests to
    /// check that transformed trees stay numerically equivalent.
    pub fn eval(&self, values: &HashMap<String, f64>) -> Option<f64> {
        match self {
            Expr::Number(n) => Some(*n),
            Expr::Symbol(name) => values.get(name).copied(),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = lhs.eval(values)?;
                let rhs = rhs.eval(values)?;
                Some(match op {
                    BinOp::Add => lhs + rhs,
                    BinOp::Sub => lhs - rhs,
                    BinOp::Mul => lhs * rhs,
                    BinOp::Div => lhs / rhs,
                    BinOp::Pow => lhs.powf(rhs),
                })
            }
            Expr::Unary(op, operand) => {
                let operand = operand.eval(values)?;
                Some(match op {
                    UnOp::Neg => -operand,
                    UnOp::Not => {
                        if operand != 0.0 {
                            0.0
                        } else {
                            1.0
                        }
                    }
                })
            }
            Expr::Call(name, args) => {
                let arg0 = args.first()?.eval(values)?;
                match (name.as_str(), args.len()) {
                    ("sqrt", 1) => Some(arg0.sqrt()),
                    ("exp", 1) => Some(arg0.exp()),
                    ("log", 1) | ("ln", 1) => Some(arg0.ln()),
                    ("sin", 1) => Some(arg0.sin()),
                    ("cos", 1) => Some(arg0.cos()),
                    ("tan", 1) => Some(arg0.tan()),
                    ("abs", 1) => Some(arg0.abs()),
                    ("signum", 1) => Some(arg0.signum()),
                    _ => None,
                }
            }
            Expr::Piecewise { branches, default } => {
                for branch in branches {
                    if branch.condition.eval(values)? != 0.0 {
                        return branch.value.eval(values);
                    }
                }
                default.as_ref().and_then(|default| default.eval(values))
            }
            Expr::Relation(op, lhs, rhs) => {
                let lhs = lhs.eval(values)?;
                let rhs = rhs.eval(values)?;
                let holds = match op {
                    RelOp::Gt => lhs > rhs,
                    RelOp::Lt => lhs < rhs,
                    RelOp::Ge => lhs >= rhs,
                    RelOp::Le => lhs <= rhs,
                    RelOp::Eq => lhs == rhs,
                    RelOp::Ne => lhs != rhs,
                };
                Some(if holds { 1.0 } else { 0.0 })
            }
            Expr::Logical(op, operands) => {
                let mut acc = match op {
                    LogOp::And => true,
                    LogOp::Or => false,
                };
                for operand in operands {
                    let truth = operand.eval(values)? != 0.0;
                    acc = match op {
                        LogOp::And => acc && truth,
                        LogOp::Or => acc || truth,
                    };
                }
                Some(if acc { 1.0 } else { 0.0 })
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Symbol(name) => write!(f, "{}", name),
            Expr::Binary(op, lhs, rhs) => {
                let op = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::Pow => "^",
                };
                write!(f, "({} {} {})", lhs, op, rhs)
            }
            Expr::Unary(UnOp::Neg, operand) => write!(f, "(-{})", operand),
            Expr::Unary(UnOp::Not, operand) => write!(f, "(!{})", operand),
            Expr::Call(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Piecewise { branches, default } => {
                write!(f, "piecewise(")?;
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}, {}", branch.value, branch.condition)?;
                }
                if let Some(default) = default {
                    if !branches.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", default)?;
                }
                write!(f, ")")
            }
            Expr::Relation(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Logical(op, operands) => {
                write!(f, "(")?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", op.symbol())?;
                    }
                    write!(f, "{}", operand)?;
                }
                write!(f, ")")
            }
        }
    }
}

// Operator overloads build folded trees so that accumulating reaction terms
// starting from the zero expression never wraps real terms in `0 + x` noise.

impl std::ops::Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        simplify::fold_binary(BinOp::Add, self, rhs)
    }
}

impl std::ops::Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        simplify::fold_binary(BinOp::Sub, self, rhs)
    }
}

impl std::ops::Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        simplify::fold_binary(BinOp::Mul, self, rhs)
    }
}

impl std::ops::Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        simplify::fold_binary(BinOp::Div, self, rhs)
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        match self {
            Expr::Number(n) => Expr::Number(-n),
            Expr::Unary(UnOp::Neg, inner) => *inner,
            other => Expr::Unary(UnOp::Neg, Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn values(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn free_symbols_cover_all_positions() {
        let expr = Expr::Piecewise {
            branches: vec![Branch {
                value: Expr::symbol("a") * Expr::symbol("b"),
                condition: Expr::Relation(
                    RelOp::Gt,
                    Box::new(Expr::symbol("t")),
                    Box::new(Expr::number(5.0)),
                ),
            }],
            default: Some(Box::new(Expr::symbol("c"))),
        };
        let symbols = expr.free_symbols();
        assert_eq!(
            symbols.into_iter().collect::<Vec<_>>(),
            vec!["a", "b", "c", "t"]
        );
    }

    #[test]
    fn substitution_replaces_whole_identifiers_only() {
        let expr = Expr::symbol("ka") + Expr::symbol("k");
        let result = expr.substitute("k", &Expr::number(2.0));
        assert_eq!(result, Expr::symbol("ka") + Expr::number(2.0));
    }

    #[test]
    fn operator_overloads_fold_zero_accumulators() {
        let rate = Expr::symbol("k1") * Expr::symbol("A");
        let accumulated = Expr::zero() - (Expr::number(1.0) * rate.clone());
        assert_eq!(accumulated, -rate);
    }

    #[test]
    fn eval_piecewise_picks_first_matching_branch() {
        let expr = Expr::Piecewise {
            branches: vec![Branch {
                value: Expr::number(10.0),
                condition: Expr::Relation(
                    RelOp::Lt,
                    Box::new(Expr::symbol("t")),
                    Box::new(Expr::number(1.0)),
                ),
            }],
            default: Some(Box::new(Expr::number(20.0))),
        };
        assert_relative_eq!(expr.eval(&values(&[("t", 0.5)])).unwrap(), 10.0);
        assert_relative_eq!(expr.eval(&values(&[("t", 2.0)])).unwrap(), 20.0);
    }

    #[test]
    fn eval_builtin_calls() {
        let expr = Expr::Call("exp".into(), vec![Expr::symbol("x")]);
        assert_relative_eq!(
            expr.eval(&values(&[("x", 1.0)])).unwrap(),
            std::f64::consts::E
        );
    }
}
