//! Model-to-Code Compilation for Reaction Networks
//!
//! This crate compiles a biochemical reaction-network model — species,
//! compartments, parameters, reactions, assignment rules, events — into a
//! self-contained numerical-simulation source file: a closed-form ODE
//! right-hand side, its Jacobian-vector product, and the state-extraction
//! and result-serialization code around them.
//!
//! # Overview
//!
//! The input is the structured record an external SBML reader produces
//! ([`ModelData`]); the output is a Rust module driving a stiff BDF
//! integration. In between sits a small compiler:
//!
//! 1. **Expression parsing** — MathML or formula text into the algebraic
//!    intermediate representation ([`Expr`]), with unit stripping and
//!    structural inlining of user-defined functions.
//! 2. **Rule classification** — assignment rules split into static rules
//!    (hoisted out of the integration loop) and dynamic rules (recomputed
//!    every solver evaluation), dependency-ordered.
//! 3. **ODE construction** — stoichiometry-weighted rate accumulation per
//!    state variable.
//! 4. **Jacobian construction** — symbolic differentiation, sparse.
//! 5. **Optimization** — common-subexpression elimination jointly over
//!    derivatives and Jacobian, plus a numeric-safety rewrite guarding
//!    negative powers of zero-capable bases.
//! 6. **Emission** — precedence-safe printing and file assembly.
//!
//! Compilation is synchronous and CPU-bound, and every `compile` call owns
//! its symbol table: compiling distinct models from distinct threads is
//! safe, while no single component supports concurrent mutation.
//!
//! # Quick Start
//!
//! ```ignore
//! use sbmlsol::{compile_json, CodegenOptions};
//!
//! let model = std::fs::read_to_string("model.json")?;
//! let generated = compile_json(&model, &CodegenOptions::default())?;
//! std::fs::write("src/model.rs", &generated.source)?;
//! ```
//!
//! # Supported subset
//!
//! Assignment rules, initial assignments, user-defined functions, events
//! with trigger-time semantics, and piecewise math are compiled. Rate
//! rules and algebraic rules are rejected at validation; event delays are
//! surfaced as warnings and ignored. These are deliberate, documented
//! boundaries — nothing is dropped silently.

pub mod analysis;
pub mod codegen;
pub mod error;
pub mod expr;
pub mod model;
pub mod parser;
pub mod symbolic;

pub use codegen::{CodeGenerator, CodegenOptions, GeneratedCode};
pub use error::SbmlSolError;
pub use expr::Expr;
pub use model::{ModelData, ModelInfo, ValidatedModel, Validator};

/// Parse a model record from the reader's JSON document
pub fn parse_model(json: &str) -> Result<ModelData, SbmlSolError> {
    ModelData::from_json_str(json)
}

/// Parse and validate a model record
pub fn validate_model(json: &str) -> Result<ValidatedModel, SbmlSolError> {
    let model = ModelData::from_json_str(json)?;
    Validator::new().validate(&model)
}

/// Compile a validated model into simulation source code
pub fn compile(
    model: &ValidatedModel,
    options: &CodegenOptions,
) -> Result<GeneratedCode, SbmlSolError> {
    CodeGenerator::new(model, options.clone()).generate()
}

/// Parse, validate, and compile a model record in one call
pub fn compile_json(
    json: &str,
    options: &CodegenOptions,
) -> Result<GeneratedCode, SbmlSolError> {
    let validated = validate_model(json)?;
    compile(&validated, options)
}

/// Summary information about a model record
pub fn model_info(model: &ModelData) -> ModelInfo {
    ModelInfo::of(model)
}
