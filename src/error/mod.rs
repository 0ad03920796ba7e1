//! Error types for model compilation

use thiserror::Error;

/// Errors that can occur while compiling a model to simulation code
#[derive(Debug, Error)]
pub enum SbmlSolError {
    // ─────────────────────────────────────────────────────────────────────────
    // Expression Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Malformed expression text or MathML
    #[error("Failed to parse expression: {message} (in `{fragment}`)")]
    ParseError { fragment: String, message: String },

    /// An expression references an identifier absent from every namespace
    #[error("Unknown identifier '{name}' in {context}")]
    UnknownIdentifier { name: String, context: String },

    /// Malformed MathML input
    #[error("Failed to read MathML: {0}")]
    MathMlError(#[from] quick_xml::Error),

    // ─────────────────────────────────────────────────────────────────────────
    // Model Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to parse the model record JSON
    #[error("Failed to parse model JSON: {0}")]
    ModelJson(#[from] serde_json::Error),

    /// A model construct outside the supported subset
    #[error("Unsupported construct: {construct} ({detail})")]
    UnsupportedConstruct { construct: String, detail: String },

    /// Duplicate identifier after reaction-parameter qualification
    #[error("Duplicate parameter id '{0}'")]
    DuplicateParameter(String),

    // ─────────────────────────────────────────────────────────────────────────
    // Analysis Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Topological sort failed on a required dependency graph
    #[error("Circular dependency among rules: {0:?}")]
    CircularDependency(Vec<String>),

    // ─────────────────────────────────────────────────────────────────────────
    // Code Generation Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Code generation failed
    #[error("Code generation failed: {0}")]
    CodeGenError(String),
}

impl SbmlSolError {
    /// Create a parse error carrying the offending fragment
    pub fn parse(fragment: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            fragment: fragment.into(),
            message: message.into(),
        }
    }

    /// Create an unknown-identifier error
    pub fn unknown_identifier(name: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UnknownIdentifier {
            name: name.into(),
            context: context.into(),
        }
    }

    /// Create an unsupported-construct error
    pub fn unsupported(construct: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnsupportedConstruct {
            construct: construct.into(),
            detail: detail.into(),
        }
    }
}
