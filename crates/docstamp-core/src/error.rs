//! Error types for template stamping

use docstamp_ooxml::OoxmlError;
use thiserror::Error;

/// Errors that can occur while stamping a template
#[derive(Error, Debug)]
pub enum StampError {
    /// Comment markers nest ambiguously, so containment cannot be decided
    #[error("Malformed directive: {0}")]
    MalformedDirective(String),

    /// An expression produced no usable value
    #[error("Unresolved expression '{expression}': {reason}")]
    UnresolvedExpression { expression: String, reason: String },

    /// A directive was attached to the wrong kind of container
    #[error("Structural mismatch: {0}")]
    StructuralMismatch(String),

    /// A nested sub-document stamping call failed
    #[error("Sub-document stamping failed: {0}")]
    SubDocument(#[source] Box<StampError>),

    /// The sub-document worker thread panicked
    #[error("Sub-document worker panicked")]
    WorkerPanic,

    /// Error reading or writing the package
    #[error("Package error: {0}")]
    Ooxml(#[from] OoxmlError),

    /// Error reading or writing files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or input data
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StampError {
    /// Shorthand for an unresolved expression
    pub fn unresolved(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnresolvedExpression {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for stamping operations
pub type Result<T> = std::result::Result<T, StampError>;
