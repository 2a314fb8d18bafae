//! Code generation error type

use crate::diagnostics::Diagnostic;

/// Error type for code generation operations.
///
/// Lets the walker propagate both semantic errors (carrying a positioned
/// diagnostic) and formatting errors from `write!` with `?`.
#[derive(Debug)]
pub enum CodeGenError {
    Logic(Box<Diagnostic>),
    Format(std::fmt::Error),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Logic(diagnostic) => write!(f, "{}", diagnostic),
            CodeGenError::Format(e) => write!(f, "code generation write error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<Diagnostic> for CodeGenError {
    fn from(diagnostic: Diagnostic) -> Self {
        CodeGenError::Logic(Box::new(diagnostic))
    }
}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}
