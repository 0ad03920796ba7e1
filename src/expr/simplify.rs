//! Algebraic simplification
//!
//! Folding happens in two places: `fold_binary` is the smart constructor
//! behind the operator overloads, applied as trees are built, and
//! [`Expr::simplify`] re-folds a whole tree bottom-up. Keeping derivatives
//! folded is what makes the structural zero test meaningful — the sparse
//! Jacobian omits an entry exactly when the folded partial is `Number(0.0)`.

use super::{BinOp, Branch, Expr, UnOp};

/// Build `lhs op rhs` with constant folding and identity elimination.
pub(super) fn fold_binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    if let (Expr::Number(a), Expr::Number(b)) = (&lhs, &rhs) {
        let folded = match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            // Constant division and powers stay symbolic unless exact, so
            // that printed code keeps the literal form of the model.
            BinOp::Div => {
                if *b != 0.0 && (a / b).fract() == 0.0 {
                    a / b
                } else {
                    return Expr::Binary(op, Box::new(lhs), Box::new(rhs));
                }
            }
            BinOp::Pow => {
                return Expr::Binary(op, Box::new(lhs), Box::new(rhs));
            }
        };
        return Expr::Number(folded);
    }

    match op {
        BinOp::Add => {
            if lhs.is_zero() {
                return rhs;
            }
            if rhs.is_zero() {
                return lhs;
            }
        }
        BinOp::Sub => {
            if rhs.is_zero() {
                return lhs;
            }
            if lhs.is_zero() {
                return -rhs;
            }
        }
        BinOp::Mul => {
            if lhs.is_zero() || rhs.is_zero() {
                return Expr::zero();
            }
            if lhs.is_one() {
                return rhs;
            }
            if rhs.is_one() {
                return lhs;
            }
        }
        BinOp::Div => {
            if lhs.is_zero() {
                return Expr::zero();
            }
            if rhs.is_one() {
                return lhs;
            }
        }
        BinOp::Pow => {
            if rhs.is_zero() {
                return Expr::Number(1.0);
            }
            if rhs.is_one() {
                return lhs;
            }
            if lhs.is_one() {
                return Expr::Number(1.0);
            }
        }
    }

    Expr::Binary(op, Box::new(lhs), Box::new(rhs))
}

impl Expr {
    /// Bottom-up constant folding and identity elimination.
    ///
    /// Structure-preserving only: no distribution, no reassociation, no
    /// rewriting of divisions into negative powers. Anything stronger could
    /// change which sub-term is evaluated at runtime and silently undo the
    /// guarded-division protection applied later in the pipeline.
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Number(_) | Expr::Symbol(_) => self.clone(),
            Expr::Binary(op, lhs, rhs) => fold_binary(*op, lhs.simplify(), rhs.simplify()),
            Expr::Unary(UnOp::Neg, operand) => -operand.simplify(),
            Expr::Unary(UnOp::Not, operand) => {
                Expr::Unary(UnOp::Not, Box::new(operand.simplify()))
            }
            Expr::Call(name, args) => Expr::Call(
                name.clone(),
                args.iter().map(|arg| arg.simplify()).collect(),
            ),
            Expr::Piecewise { branches, default } => Expr::Piecewise {
                branches: branches
                    .iter()
                    .map(|branch| Branch {
                        value: branch.value.simplify(),
                        condition: branch.condition.simplify(),
                    })
                    .collect(),
                default: default.as_ref().map(|d| Box::new(d.simplify())),
            },
            Expr::Relation(op, lhs, rhs) => {
                Expr::Relation(*op, Box::new(lhs.simplify()), Box::new(rhs.simplify()))
            }
            Expr::Logical(op, operands) => Expr::Logical(
                *op,
                operands.iter().map(|operand| operand.simplify()).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_addition_folds() {
        let expr = Expr::number(2.0) + Expr::number(3.0);
        assert_eq!(expr, Expr::number(5.0));
    }

    #[test]
    fn multiplication_by_zero_collapses() {
        let expr = Expr::symbol("k") * Expr::zero();
        assert!(expr.is_zero());
    }

    #[test]
    fn power_identities() {
        let expr = Expr::symbol("x").pow(Expr::number(1.0)).simplify();
        assert_eq!(expr, Expr::symbol("x"));
        let expr = Expr::symbol("x").pow(Expr::zero()).simplify();
        assert_eq!(expr, Expr::number(1.0));
    }

    #[test]
    fn inexact_constant_division_stays_symbolic() {
        let expr = Expr::number(1.0) / Expr::number(3.0);
        assert!(matches!(expr, Expr::Binary(BinOp::Div, _, _)));
        let expr = Expr::number(6.0) / Expr::number(3.0);
        assert_eq!(expr, Expr::number(2.0));
    }

    #[test]
    fn simplify_folds_nested_trees() {
        // (x * 1) + (0 / y) -> x
        let expr = Expr::Binary(
            BinOp::Add,
            Box::new(Expr::Binary(
                BinOp::Mul,
                Box::new(Expr::symbol("x")),
                Box::new(Expr::number(1.0)),
            )),
            Box::new(Expr::Binary(
                BinOp::Div,
                Box::new(Expr::number(0.0)),
                Box::new(Expr::symbol("y")),
            )),
        );
        assert_eq!(expr.simplify(), Expr::symbol("x"));
    }
}
