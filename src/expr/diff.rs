//! Symbolic differentiation
//!
//! Recursive application of the calculus rules over the closed expression
//! enum. Results are built through the folding operators, so a partial that
//! vanishes comes back as the structural zero the Jacobian builder tests.

use super::{BinOp, Branch, Expr, UnOp};

impl Expr {
    /// Differentiate with respect to the named symbol.
    ///
    /// Piecewise differentiates branch-wise with conditions untouched;
    /// relations and logicals are treated as constants (their derivative is
    /// zero), which matches treating triggers as non-state quantities.
    pub fn diff(&self, var: &str) -> Expr {
        match self {
            Expr::Number(_) => Expr::zero(),
            Expr::Symbol(name) => {
                if name == var {
                    Expr::Number(1.0)
                } else {
                    Expr::zero()
                }
            }
            Expr::Binary(BinOp::Add, lhs, rhs) => lhs.diff(var) + rhs.diff(var),
            Expr::Binary(BinOp::Sub, lhs, rhs) => lhs.diff(var) - rhs.diff(var),
            Expr::Binary(BinOp::Mul, lhs, rhs) => {
                lhs.diff(var) * (**rhs).clone() + (**lhs).clone() * rhs.diff(var)
            }
            Expr::Binary(BinOp::Div, lhs, rhs) => {
                let numerator =
                    lhs.diff(var) * (**rhs).clone() - (**lhs).clone() * rhs.diff(var);
                let denominator = (**rhs).clone().pow(Expr::Number(2.0));
                numerator / denominator
            }
            Expr::Binary(BinOp::Pow, base, exponent) => {
                let db = base.diff(var);
                if let Expr::Number(n) = **exponent {
                    // d/dx b^n = n * b^(n-1) * b'
                    return Expr::Number(n)
                        * (**base).clone().pow(Expr::Number(n - 1.0))
                        * db;
                }
                let de = exponent.diff(var);
                if de.is_zero() {
                    // constant (symbolic) exponent: e * b^(e-1) * b'
                    return (**exponent).clone()
                        * (**base)
                            .clone()
                            .pow((**exponent).clone() - Expr::Number(1.0))
                        * db;
                }
                // general case: b^e * (e' ln b + e b'/b)
                let outer = (**base).clone().pow((**exponent).clone());
                let inner = de * Expr::Call("ln".into(), vec![(**base).clone()])
                    + (**exponent).clone() * db / (**base).clone();
                outer * inner
            }
            Expr::Unary(UnOp::Neg, operand) => -operand.diff(var),
            Expr::Unary(UnOp::Not, _) => Expr::zero(),
            Expr::Call(name, args) => self.diff_call(name, args, var),
            Expr::Piecewise { branches, default } => {
                let branches: Vec<Branch> = branches
                    .iter()
                    .map(|branch| Branch {
                        value: branch.value.diff(var),
                        condition: branch.condition.clone(),
                    })
                    .collect();
                let default = default.as_ref().map(|d| Box::new(d.diff(var)));
                // A piecewise whose every branch vanished is just zero.
                if branches.iter().all(|b| b.value.is_zero())
                    && default.as_deref().is_none_or(|d| d.is_zero())
                {
                    Expr::zero()
                } else {
                    Expr::Piecewise { branches, default }
                }
            }
            Expr::Relation(_, _, _) | Expr::Logical(_, _) => Expr::zero(),
        }
    }

    fn diff_call(&self, name: &str, args: &[Expr], var: &str) -> Expr {
        let arg = match args.first() {
            Some(arg) => arg,
            None => return Expr::zero(),
        };
        let da = arg.diff(var);
        if da.is_zero() {
            return Expr::zero();
        }
        match name {
            "sqrt" => {
                da / (Expr::Number(2.0) * Expr::Call("sqrt".into(), vec![arg.clone()]))
            }
            "exp" => Expr::Call("exp".into(), vec![arg.clone()]) * da,
            "log" | "ln" => da / arg.clone(),
            "sin" => Expr::Call("cos".into(), vec![arg.clone()]) * da,
            "cos" => -(Expr::Call("sin".into(), vec![arg.clone()]) * da),
            "tan" => {
                let sec2 = Expr::Number(1.0)
                    + Expr::Call("tan".into(), vec![arg.clone()]).pow(Expr::Number(2.0));
                sec2 * da
            }
            "abs" => Expr::Call("signum".into(), vec![arg.clone()]) * da,
            // Unknown calls are opaque; their dependence on state cannot be
            // expressed, so the conservative derivative is zero. Inlining
            // runs before differentiation, so this only covers functions
            // left unresolved by the depth bound.
            _ => Expr::zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::RelOp;

    #[test]
    fn linear_rate_differentiates_to_coefficient() {
        // d/dA (k1 * A) = k1
        let rate = Expr::symbol("k1") * Expr::symbol("A");
        assert_eq!(rate.diff("A"), Expr::symbol("k1"));
    }

    #[test]
    fn unrelated_symbol_has_zero_derivative() {
        let rate = Expr::symbol("k1") * Expr::symbol("A");
        assert!(rate.diff("B").is_zero());
    }

    #[test]
    fn product_rule() {
        // d/dx (x * y) = y
        let expr = Expr::symbol("x") * Expr::symbol("y");
        assert_eq!(expr.diff("x"), Expr::symbol("y"));
    }

    #[test]
    fn quotient_rule_michaelis_menten() {
        // d/dS (Vmax*S / (Km + S)) is nonzero and references Km
        let rate = Expr::symbol("Vmax") * Expr::symbol("S")
            / (Expr::symbol("Km") + Expr::symbol("S"));
        let derivative = rate.diff("S");
        assert!(!derivative.is_zero());
        assert!(derivative.free_symbols().contains("Km"));
    }

    #[test]
    fn integer_power_rule() {
        // d/dx x^3 = 3 * x^2
        let expr = Expr::symbol("x").pow(Expr::Number(3.0));
        let expected =
            Expr::Number(3.0) * Expr::symbol("x").pow(Expr::Number(2.0)) * Expr::Number(1.0);
        assert_eq!(expr.diff("x"), expected);
    }

    #[test]
    fn exp_chain_rule() {
        // d/dx exp(2x) = exp(2x) * 2
        let expr = Expr::Call(
            "exp".into(),
            vec![Expr::Number(2.0) * Expr::symbol("x")],
        );
        let derivative = expr.diff("x");
        assert_eq!(
            derivative,
            Expr::Call("exp".into(), vec![Expr::Number(2.0) * Expr::symbol("x")])
                * Expr::Number(2.0)
        );
    }

    #[test]
    fn piecewise_differentiates_branchwise() {
        let expr = Expr::Piecewise {
            branches: vec![Branch {
                value: Expr::symbol("k") * Expr::symbol("x"),
                condition: Expr::Relation(
                    RelOp::Gt,
                    Box::new(Expr::symbol("t")),
                    Box::new(Expr::Number(5.0)),
                ),
            }],
            default: Some(Box::new(Expr::zero())),
        };
        let derivative = expr.diff("x");
        match derivative {
            Expr::Piecewise { branches, default } => {
                assert_eq!(branches[0].value, Expr::symbol("k"));
                assert!(default.unwrap().is_zero());
            }
            other => panic!("expected piecewise derivative, got {other}"),
        }
    }

    #[test]
    fn piecewise_of_constants_vanishes() {
        let expr = Expr::Piecewise {
            branches: vec![Branch {
                value: Expr::Number(4.0),
                condition: Expr::Relation(
                    RelOp::Lt,
                    Box::new(Expr::symbol("t")),
                    Box::new(Expr::Number(1.0)),
                ),
            }],
            default: Some(Box::new(Expr::Number(2.0))),
        };
        assert!(expr.diff("x").is_zero());
    }
}
