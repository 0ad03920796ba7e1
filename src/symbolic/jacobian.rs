//! Jacobian construction by symbolic differentiation

use crate::expr::Expr;

/// One structurally nonzero partial derivative
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianEntry {
    pub row: usize,
    pub col: usize,
    pub expr: Expr,
}

/// Differentiates the derivative vector with respect to each state
pub struct JacobianBuilder<'a> {
    species_order: &'a [String],
}

impl<'a> JacobianBuilder<'a> {
    pub fn new(species_order: &'a [String]) -> Self {
        Self { species_order }
    }

    /// Sparse Jacobian: only entries whose folded partial is not the zero
    /// expression. Omission of a pair means the partial is proven zero.
    pub fn sparse(&self, ode: &[Expr]) -> Vec<JacobianEntry> {
        let n = self.species_order.len();
        let mut entries = Vec::new();

        for (row, derivative) in ode.iter().enumerate() {
            for (col, species) in self.species_order.iter().enumerate() {
                let partial = derivative.diff(species).simplify();
                if !partial.is_zero() {
                    entries.push(JacobianEntry {
                        row,
                        col,
                        expr: partial,
                    });
                }
            }
        }

        tracing::info!(
            nonzero = entries.len(),
            total = n * n,
            "Jacobian sparsity {}/{}",
            entries.len(),
            n * n
        );
        entries
    }

    /// Dense form for diagnostics and testing; downstream code generation
    /// consumes the sparse form.
    pub fn dense(&self, ode: &[Expr]) -> Vec<Vec<Expr>> {
        ode.iter()
            .map(|derivative| {
                self.species_order
                    .iter()
                    .map(|species| derivative.diff(species).simplify())
                    .collect()
            })
            .collect()
    }

    /// Fraction of structurally nonzero entries, in `[0, 1]`
    pub fn sparsity(&self, ode: &[Expr]) -> f64 {
        let n = self.species_order.len();
        if n == 0 {
            return 0.0;
        }
        self.sparse(ode).len() as f64 / (n * n) as f64
    }
}
