//! Formula error types

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur during formula parsing or evaluation.
///
/// Parse errors reject the edit that submitted the formula; evaluation
/// errors are normally surfaced as cell-level error *values* instead of
/// this type.
#[derive(Debug, Error)]
pub enum FormulaError {
    /// Formula parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Formula evaluation error
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Unknown function
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },
}
