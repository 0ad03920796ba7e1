//! Expression rendering
//!
//! Depth-first pretty-printer from the expression tree into target-language
//! source text. Re-parsing the output must reproduce an equivalent tree, so
//! the printer is conservative: operands are parenthesized whenever the
//! surrounding operator binds tighter, and it never relies on the reader
//! inferring precedence.
//!
//! Two numeric policies hold everywhere. Every numeric literal renders in
//! float form — the runtime numeric type is uniformly `f64` and implicit
//! int/float coercion is never relied upon (the one deliberate exception is
//! the `powi` argument, which is an `i32` by signature). And a literal
//! negative-integer power whose base is a piecewise that can be exactly
//! zero renders as a guarded conditional instead of a bare power call; this
//! is the terminal case of the optimizer's safety rewrite, catching bases
//! the CSE pass never named.

use crate::expr::{BinOp, Branch, Expr, UnOp};

// Binding strengths for parenthesization decisions
const PREC_NONE: u8 = 0;
const PREC_ADD: u8 = 1;
const PREC_MUL: u8 = 2;
const PREC_UNARY: u8 = 3;

/// Renders expression trees as target-language source text
#[derive(Debug, Default, Clone, Copy)]
pub struct RustPrinter;

impl RustPrinter {
    pub fn new() -> Self {
        Self
    }

    /// Render an expression as a value of type `f64`
    pub fn render(&self, expr: &Expr) -> String {
        self.render_prec(expr, PREC_NONE)
    }

    /// Render an expression used as a boolean condition
    pub fn render_condition(&self, expr: &Expr) -> String {
        match expr {
            // constant conditions only reach here through hand-built trees
            Expr::Number(n) => {
                if *n == 0.0 {
                    "false".to_string()
                } else {
                    "true".to_string()
                }
            }
            // operands at additive strength so an if-chain operand gets
            // the parentheses Rust requires in condition position
            Expr::Relation(op, lhs, rhs) => format!(
                "{} {} {}",
                self.render_prec(lhs, PREC_ADD),
                op.symbol(),
                self.render_prec(rhs, PREC_ADD),
            ),
            Expr::Logical(op, operands) => operands
                .iter()
                .map(|operand| format!("({})", self.render_condition(operand)))
                .collect::<Vec<_>>()
                .join(&format!(" {} ", op.symbol())),
            Expr::Unary(UnOp::Not, operand) => {
                format!("!({})", self.render_condition(operand))
            }
            // a numeric expression in condition position: nonzero is true
            other => format!("{} != 0.0", self.render_prec(other, PREC_MUL)),
        }
    }

    fn render_prec(&self, expr: &Expr, parent: u8) -> String {
        match expr {
            Expr::Number(n) => float_literal(*n),
            Expr::Symbol(name) => name.clone(),
            Expr::Binary(BinOp::Pow, base, exponent) => self.render_pow(base, exponent),
            Expr::Binary(op, lhs, rhs) => {
                let (prec, token) = match op {
                    BinOp::Add => (PREC_ADD, "+"),
                    BinOp::Sub => (PREC_ADD, "-"),
                    BinOp::Mul => (PREC_MUL, "*"),
                    BinOp::Div => (PREC_MUL, "/"),
                    BinOp::Pow => unreachable!("handled above"),
                };
                // right operand of - and / needs parens at equal precedence
                let right_floor = match op {
                    BinOp::Sub | BinOp::Div => prec + 1,
                    _ => prec,
                };
                let rendered = format!(
                    "{} {} {}",
                    self.render_prec(lhs, prec),
                    token,
                    self.render_prec(rhs, right_floor),
                );
                if prec < parent {
                    format!("({})", rendered)
                } else {
                    rendered
                }
            }
            Expr::Unary(UnOp::Neg, operand) => {
                let rendered = format!("-{}", self.render_prec(operand, PREC_UNARY));
                if PREC_UNARY < parent {
                    format!("({})", rendered)
                } else {
                    rendered
                }
            }
            Expr::Unary(UnOp::Not, _) => {
                // boolean in value position: bridge through the condition form
                format!("(if {} {{ 1.0 }} else {{ 0.0 }})", self.render_condition(expr))
            }
            Expr::Call(name, args) => self.render_call(name, args),
            Expr::Piecewise { .. } => {
                let chain = self.render_piecewise(expr);
                if parent == PREC_NONE {
                    chain
                } else {
                    format!("({})", chain)
                }
            }
            Expr::Relation(_, _, _) | Expr::Logical(_, _) => {
                format!("(if {} {{ 1.0 }} else {{ 0.0 }})", self.render_condition(expr))
            }
        }
    }

    /// Receiver of a method call: atomic forms stay bare, anything else is
    /// parenthesized (`(a + b).powi(2)`, `(-1.0).exp()`).
    fn render_receiver(&self, expr: &Expr) -> String {
        match expr {
            Expr::Symbol(name) => name.clone(),
            Expr::Number(n) if n.is_finite() && *n >= 0.0 => float_literal(*n),
            Expr::Call(_, _) => self.render_prec(expr, PREC_NONE),
            other => format!("({})", self.render_prec(other, PREC_NONE)),
        }
    }

    fn render_pow(&self, base: &Expr, exponent: &Expr) -> String {
        let receiver = self.render_receiver(base);
        match exponent.as_integer() {
            Some(n) => {
                // the safety net of last resort: a literal piecewise base
                // that can be zero must not reach a bare negative power
                if n < 0 && has_zero_branch(base) {
                    format!(
                        "(if {receiver} != 0.0 {{ {receiver}.powi({n}) }} else {{ f64::INFINITY }})"
                    )
                } else {
                    format!("{receiver}.powi({n})")
                }
            }
            None => {
                let exponent = self.render_prec(exponent, PREC_NONE);
                format!("{receiver}.powf({exponent})")
            }
        }
    }

    fn render_call(&self, name: &str, args: &[Expr]) -> String {
        let method = match name {
            "sqrt" => "sqrt",
            "exp" => "exp",
            "log" | "ln" => "ln",
            "sin" => "sin",
            "cos" => "cos",
            "tan" => "tan",
            "abs" => "abs",
            "signum" => "signum",
            _ => {
                // un-inlined user function: plain call form
                let args: Vec<String> = args.iter().map(|arg| self.render(arg)).collect();
                return format!("{}({})", name, args.join(", "));
            }
        };
        match args.first() {
            Some(receiver) => format!("{}.{}()", self.render_receiver(receiver), method),
            None => format!("0.0_f64.{}()", method),
        }
    }

    /// Branches render as a cascading `if / else if / else` chain in
    /// declaration order. A piecewise without an unconditional default gets
    /// a trailing `else { 0.0 }`, keeping every emitted chain total.
    fn render_piecewise(&self, expr: &Expr) -> String {
        let Expr::Piecewise { branches, default } = expr else {
            unreachable!("caller matched piecewise");
        };

        let mut out = String::new();
        for (i, Branch { value, condition }) in branches.iter().enumerate() {
            let keyword = if i == 0 { "if" } else { " else if" };
            out.push_str(&format!(
                "{} {} {{ {} }}",
                keyword,
                self.render_condition(condition),
                self.render_prec(value, PREC_NONE),
            ));
        }
        match default {
            Some(default) => out.push_str(&format!(
                " else {{ {} }}",
                self.render_prec(default, PREC_NONE)
            )),
            None => out.push_str(" else { 0.0 }"),
        }
        out
    }
}

/// Render a constant in float-literal form: `5` becomes `"5.0"`, and the
/// non-finite values map onto their named constants.
pub fn float_literal(value: f64) -> String {
    if value.is_nan() {
        return "f64::NAN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            "f64::INFINITY".to_string()
        } else {
            "f64::NEG_INFINITY".to_string()
        };
    }
    let text = format!("{}", value);
    if text.contains('.') || text.contains('e') || text.contains('E') {
        text
    } else {
        format!("{}.0", text)
    }
}

fn has_zero_branch(expr: &Expr) -> bool {
    match expr {
        Expr::Piecewise { branches, default } => {
            branches.iter().any(|branch| branch.value.is_zero())
                || default.as_ref().is_some_and(|d| d.is_zero())
                || branches
                    .iter()
                    .any(|branch| has_zero_branch(&branch.value))
        }
        Expr::Binary(_, lhs, rhs) => has_zero_branch(lhs) || has_zero_branch(rhs),
        Expr::Unary(_, operand) => has_zero_branch(operand),
        Expr::Call(_, args) => args.iter().any(has_zero_branch),
        _ => false,
    }
}
