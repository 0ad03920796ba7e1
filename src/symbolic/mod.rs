//! Symbolic construction of the ODE system
//!
//! Consumes parsed reactions and produces the derivative expressions, the
//! sparse Jacobian, and the CSE-optimized form that code generation
//! renders.

mod jacobian;
mod ode;
mod optimizer;

pub use jacobian::{JacobianBuilder, JacobianEntry};
pub use ode::OdeSystemBuilder;
pub use optimizer::{Optimized, SymbolicOptimizer};
