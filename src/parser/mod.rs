//! Expression parsing
//!
//! Turns a model's raw math — MathML or plain formula text — into the
//! expression tree the symbolic stages consume. Parsing is staged: unit
//! tokens are stripped from formula text, the selected front-end builds a
//! raw tree, user-defined functions are inlined structurally, and builtin
//! call forms are canonicalized into their dedicated node kinds. Every
//! stage is idempotent on its own output.
//!
//! The parse context is built once per model compilation and is immutable
//! afterwards; nothing here touches process-wide state, so distinct model
//! compilations are independent.

pub mod formula;
pub mod inliner;
pub mod mathml;

pub use inliner::{FunctionInliner, ParsedFunction, MAX_INLINE_DEPTH};

use std::collections::{BTreeSet, HashMap};

use lazy_static::lazy_static;

use crate::error::SbmlSolError;
use crate::expr::{BinOp, Branch, Expr, LogOp, RelOp, UnOp};
use crate::model::{MergedParameters, ModelData};

lazy_static! {
    /// Unit names stripped from formula text, longest first so that a
    /// shorter unit never eats part of a longer one.
    static ref UNIT_NAMES: Vec<&'static str> = {
        let mut units = vec![
            "dimensionless",
            "litre",
            "liter",
            "mole",
            "gram",
            "second",
            "minute",
            "hour",
            "day",
            "kilogram",
            "milligram",
            "microgram",
            "millilitre",
            "milliliter",
            "nanomole",
            "picomole",
            "micromole",
            "millimole",
            "per_second",
            "per_minute",
            "per_hour",
        ];
        units.sort_by_key(|unit| std::cmp::Reverse(unit.len()));
        units
    };

    /// Builtin functions that survive canonicalization as calls
    static ref BUILTIN_FUNCTIONS: BTreeSet<&'static str> = {
        ["sqrt", "exp", "log", "ln", "sin", "cos", "tan", "abs", "signum"]
            .into_iter()
            .collect()
    };
}

/// Avogadro's number, substituted for the MathML avogadro csymbol
pub const AVOGADRO: f64 = 6.02214179e23;

/// Immutable symbol table for one model compilation
#[derive(Debug, Clone)]
pub struct ParseContext {
    symbols: BTreeSet<String>,
    functions: HashMap<String, ParsedFunction>,
}

impl ParseContext {
    /// The canonical time symbol; the textual aliases `t` and `time` and
    /// the MathML time csymbol all resolve to it.
    pub const TIME: &'static str = "t";

    /// Build a context from explicit symbol names and raw function bodies
    pub fn new(
        symbols: impl IntoIterator<Item = String>,
        raw_functions: &[(String, Vec<String>, String)],
    ) -> Result<Self, SbmlSolError> {
        let symbols: BTreeSet<String> = symbols.into_iter().collect();
        let mut functions = HashMap::new();
        for (id, arguments, body) in raw_functions {
            let body = formula::parse(body)?;
            functions.insert(
                id.clone(),
                ParsedFunction {
                    arguments: arguments.clone(),
                    body,
                },
            );
        }
        Ok(Self { symbols, functions })
    }

    /// Build the context for a whole model: species, merged parameters
    /// (including unqualified reaction-local names, renamed after parse),
    /// compartments, and rule-target variables.
    pub fn for_model(
        model: &ModelData,
        merged: &MergedParameters,
    ) -> Result<Self, SbmlSolError> {
        let mut symbols: BTreeSet<String> = BTreeSet::new();
        symbols.extend(model.species.keys().map(str::to_string));
        symbols.extend(model.compartments.keys().map(str::to_string));
        symbols.extend(merged.parameters.iter().map(|(name, _)| name.clone()));
        for reaction in model.reactions.values() {
            symbols.extend(reaction.rxn_parameters.iter().map(|(id, _)| id.clone()));
        }
        for rule in model
            .assignment_rules
            .values()
            .chain(model.initial_assignments.values())
        {
            symbols.insert(rule.variable.clone());
        }

        let raw_functions: Vec<(String, Vec<String>, String)> = model
            .functions
            .iter()
            .map(|(id, function)| {
                (
                    id.to_string(),
                    function.arguments.clone(),
                    function.math_string.clone(),
                )
            })
            .collect();

        Self::new(symbols, &raw_functions)
    }

    pub fn knows(&self, name: &str) -> bool {
        name == Self::TIME || self.symbols.contains(name)
    }

    pub fn symbols(&self) -> &BTreeSet<String> {
        &self.symbols
    }

    pub fn functions(&self) -> &HashMap<String, ParsedFunction> {
        &self.functions
    }
}

/// Parser facade tying the stages together
#[derive(Debug)]
pub struct SbmlExpressionParser<'a> {
    context: &'a ParseContext,
}

impl<'a> SbmlExpressionParser<'a> {
    pub fn new(context: &'a ParseContext) -> Self {
        Self { context }
    }

    /// Parse raw math into an expression tree.
    ///
    /// Empty or missing expressions parse to the constant zero, by
    /// contract. Everything else either produces a tree over known
    /// symbols or fails with the offending fragment attached.
    pub fn parse(&self, raw: &str) -> Result<Expr, SbmlSolError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "None" {
            return Ok(Expr::zero());
        }

        let parsed = if trimmed.starts_with('<') {
            mathml::translate(trimmed)?
        } else {
            let stripped = strip_units(trimmed);
            let cleaned = cleanup_operators(&stripped);
            if cleaned.trim().is_empty() {
                return Ok(Expr::zero());
            }
            formula::parse(&cleaned)?
        };

        let inlined = FunctionInliner::new(&self.context.functions).inline(&parsed);
        let canonical = self.canonicalize(&inlined, trimmed)?;
        self.check_symbols(&canonical, trimmed)?;
        Ok(canonical)
    }

    /// Rewrite builtin call forms into their node kinds: `piecewise` into
    /// branch nodes, comparison and logic calls into relations/logicals,
    /// `pow` into the power operator. Time aliases and known constants
    /// resolve here as well.
    fn canonicalize(&self, expr: &Expr, fragment: &str) -> Result<Expr, SbmlSolError> {
        let expr = match expr {
            Expr::Number(_) => expr.clone(),
            Expr::Symbol(name) => match name.as_str() {
                "time" => Expr::Symbol(ParseContext::TIME.to_string()),
                "pi" => Expr::Number(std::f64::consts::PI),
                "avogadro" => Expr::Number(AVOGADRO),
                _ => expr.clone(),
            },
            Expr::Binary(op, lhs, rhs) => Expr::Binary(
                *op,
                Box::new(self.canonicalize(lhs, fragment)?),
                Box::new(self.canonicalize(rhs, fragment)?),
            ),
            Expr::Unary(UnOp::Neg, operand) => -self.canonicalize(operand, fragment)?,
            Expr::Unary(UnOp::Not, operand) => Expr::Unary(
                UnOp::Not,
                Box::new(self.canonicalize(operand, fragment)?),
            ),
            Expr::Call(name, args) => {
                let args: Vec<Expr> = args
                    .iter()
                    .map(|arg| self.canonicalize(arg, fragment))
                    .collect::<Result<_, _>>()?;
                return self.canonicalize_call(name, args, fragment);
            }
            Expr::Piecewise { branches, default } => {
                let branches = branches
                    .iter()
                    .map(|branch| {
                        Ok(Branch {
                            value: self.canonicalize(&branch.value, fragment)?,
                            condition: self.canonicalize(&branch.condition, fragment)?,
                        })
                    })
                    .collect::<Result<Vec<_>, SbmlSolError>>()?;
                let default = match default {
                    Some(default) => Some(Box::new(self.canonicalize(default, fragment)?)),
                    None => None,
                };
                normalize_piecewise(branches, default)
            }
            Expr::Relation(op, lhs, rhs) => Expr::Relation(
                *op,
                Box::new(self.canonicalize(lhs, fragment)?),
                Box::new(self.canonicalize(rhs, fragment)?),
            ),
            Expr::Logical(op, operands) => Expr::Logical(
                *op,
                operands
                    .iter()
                    .map(|operand| self.canonicalize(operand, fragment))
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(expr)
    }

    fn canonicalize_call(
        &self,
        name: &str,
        args: Vec<Expr>,
        fragment: &str,
    ) -> Result<Expr, SbmlSolError> {
        let relation = |op: RelOp, mut args: Vec<Expr>| -> Result<Expr, SbmlSolError> {
            if args.len() != 2 {
                return Err(SbmlSolError::parse(
                    fragment,
                    format!("comparison takes two arguments, got {}", args.len()),
                ));
            }
            let rhs = args.pop().expect("len checked");
            let lhs = args.pop().expect("len checked");
            Ok(Expr::Relation(op, Box::new(lhs), Box::new(rhs)))
        };

        match name {
            "piecewise" => {
                let mut branches = Vec::new();
                let mut iter = args.into_iter().peekable();
                let mut default = None;
                while let Some(value) = iter.next() {
                    match iter.next() {
                        Some(condition) => branches.push(Branch { value, condition }),
                        // odd trailing argument is the unconditional default
                        None => default = Some(Box::new(value)),
                    }
                }
                Ok(normalize_piecewise(branches, default))
            }
            "pow" => {
                if args.len() != 2 {
                    return Err(SbmlSolError::parse(
                        fragment,
                        format!("pow takes two arguments, got {}", args.len()),
                    ));
                }
                let mut args = args;
                let exponent = args.pop().expect("len checked");
                let base = args.pop().expect("len checked");
                Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)))
            }
            "gt" => relation(RelOp::Gt, args),
            "lt" => relation(RelOp::Lt, args),
            "ge" | "geq" => relation(RelOp::Ge, args),
            "le" | "leq" => relation(RelOp::Le, args),
            "eq" => relation(RelOp::Eq, args),
            "neq" => relation(RelOp::Ne, args),
            "and" => Ok(Expr::Logical(LogOp::And, args)),
            "or" => Ok(Expr::Logical(LogOp::Or, args)),
            "not" => {
                let mut args = args;
                match (args.pop(), args.is_empty()) {
                    (Some(operand), true) => Ok(Expr::Unary(UnOp::Not, Box::new(operand))),
                    _ => Err(SbmlSolError::parse(fragment, "not takes one argument")),
                }
            }
            _ if BUILTIN_FUNCTIONS.contains(name) => Ok(Expr::Call(name.to_string(), args)),
            // An un-inlined user function left behind by the depth bound
            // stays in place rather than failing the parse.
            _ if self.context.functions.contains_key(name) => {
                Ok(Expr::Call(name.to_string(), args))
            }
            // `A(x)` where A is a plain symbol is implicit multiplication
            // that the formula grammar read as a call.
            _ if self.context.knows(name) && args.len() == 1 => {
                let mut args = args;
                let factor = args.pop().expect("len checked");
                Ok(Expr::Symbol(name.to_string()) * factor)
            }
            _ => Err(SbmlSolError::unknown_identifier(name, fragment)),
        }
    }

    fn check_symbols(&self, expr: &Expr, fragment: &str) -> Result<(), SbmlSolError> {
        for symbol in expr.free_symbols() {
            if !self.context.knows(&symbol) {
                return Err(SbmlSolError::unknown_identifier(symbol, fragment));
            }
        }
        Ok(())
    }
}

/// Constant-condition branches collapse at build time: an always-true
/// condition becomes the default (later branches are unreachable), an
/// always-false branch disappears.
fn normalize_piecewise(branches: Vec<Branch>, default: Option<Box<Expr>>) -> Expr {
    let mut kept = Vec::new();
    let mut default = default;
    for branch in branches {
        match branch.condition {
            Expr::Number(n) if n == 0.0 => continue,
            Expr::Number(_) => {
                default = Some(Box::new(branch.value));
                break;
            }
            _ => kept.push(branch),
        }
    }
    if kept.is_empty() {
        return match default {
            Some(default) => *default,
            None => Expr::zero(),
        };
    }
    Expr::Piecewise {
        branches: kept,
        default,
    }
}

/// Strip unit-name tokens from formula text: word-boundary matched,
/// case-insensitive, longest unit first.
pub fn strip_units(text: &str) -> String {
    let mut result = text.to_string();
    for unit in UNIT_NAMES.iter() {
        result = remove_word(&result, unit);
    }
    result
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn remove_word(text: &str, word: &str) -> String {
    let haystack = text.to_ascii_lowercase();
    let needle = word.to_ascii_lowercase();
    let bytes = haystack.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        if haystack[i..].starts_with(&needle) {
            let end = i + needle.len();
            let before_ok = i == 0 || !is_word_char(bytes[i - 1] as char);
            let after_ok = end >= bytes.len() || !is_word_char(bytes[end] as char);
            if before_ok && after_ok {
                i = end;
                continue;
            }
        }
        let c = text[i..].chars().next().expect("in-bounds index");
        out.push(c);
        i += c.len_utf8();
    }
    out
}

/// Repair operators left dangling by unit removal.
///
/// Works on an operator-token view so the two-character `**` exponent is
/// never split or accidentally formed. Unary signs survive: only a
/// following `*`, `/`, `^` triggers pair collapsing.
pub fn cleanup_operators(text: &str) -> String {
    #[derive(Debug, Clone, PartialEq)]
    enum Item {
        Op(&'static str),
        Char(char),
        Space,
    }

    let mut items = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                items.push(Item::Op("**"));
                i += 2;
            }
            '*' => {
                items.push(Item::Op("*"));
                i += 1;
            }
            '/' => {
                items.push(Item::Op("/"));
                i += 1;
            }
            '^' => {
                items.push(Item::Op("^"));
                i += 1;
            }
            '+' => {
                items.push(Item::Op("+"));
                i += 1;
            }
            '-' => {
                items.push(Item::Op("-"));
                i += 1;
            }
            c if c.is_whitespace() => {
                items.push(Item::Space);
                i += 1;
            }
            c => {
                items.push(Item::Char(c));
                i += 1;
            }
        }
    }

    let multiplicative = |op: &str| matches!(op, "*" | "/" | "^" | "**");

    // Collapse until stable; each pass can expose a new dangling operator.
    loop {
        let mut changed = false;
        let mut out: Vec<Item> = Vec::with_capacity(items.len());
        let mut index = 0;
        while index < items.len() {
            if let Item::Op(op) = &items[index] {
                let next = items[index + 1..]
                    .iter()
                    .find(|item| !matches!(item, Item::Space));
                let prev = out.iter().rev().find(|item| !matches!(item, Item::Space));

                let at_start = prev.is_none() || matches!(prev, Some(Item::Char('(')));
                let at_end = next.is_none() || matches!(next, Some(Item::Char(')')));

                // multiplicative operator with nothing usable on its left
                if multiplicative(*op) && at_start {
                    changed = true;
                    index += 1;
                    continue;
                }
                // any operator with nothing on its right
                if at_end {
                    changed = true;
                    index += 1;
                    continue;
                }
                // "a * <gone> * b": additive keeps itself and drops the
                // follower, multiplicative yields to the follower
                if let Some(Item::Op(next_op)) = next {
                    if multiplicative(*next_op) {
                        changed = true;
                        if multiplicative(*op) {
                            index += 1; // drop this op, keep the follower
                        } else {
                            // drop the follower, keep this op
                            out.push(items[index].clone());
                            index += 1;
                            while index < items.len() {
                                match &items[index] {
                                    Item::Space => {
                                        out.push(Item::Space);
                                        index += 1;
                                    }
                                    Item::Op(_) => {
                                        index += 1;
                                        break;
                                    }
                                    _ => break,
                                }
                            }
                        }
                        continue;
                    }
                }
            }
            out.push(items[index].clone());
            index += 1;
        }
        items = out;
        if !changed {
            break;
        }
    }

    let mut result = String::new();
    for item in items {
        match item {
            Item::Op(op) => result.push_str(op),
            Item::Char(c) => result.push(c),
            Item::Space => result.push(' '),
        }
    }
    result.trim().to_string()
}
