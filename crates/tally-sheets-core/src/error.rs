//! Error types for tally-sheets-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Command-plane errors.
///
/// These reject a command outright: the workbook is unchanged and nothing
/// is added to the undo history. Evaluation-time errors (`#REF!`,
/// `#DIV/0!`, ...) are cell *values* instead; see
/// [`CellError`](crate::CellError).
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid cell address text
    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    /// Invalid cell range text
    #[error("Invalid cell range: {0}")]
    InvalidRange(String),

    /// Row index out of bounds
    #[error("Row index {0} out of bounds (max: {1})")]
    RowOutOfBounds(u32, u32),

    /// Column index out of bounds
    #[error("Column index {0} out of bounds (max: {1})")]
    ColumnOutOfBounds(u16, u16),

    /// Sheet index out of bounds
    #[error("Sheet index {0} out of bounds (count: {1})")]
    SheetOutOfBounds(usize, usize),

    /// Sheet not found by name
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// Duplicate sheet name
    #[error("Sheet name already exists: {0}")]
    DuplicateSheetName(String),

    /// Named range already defined in the same scope
    #[error("Name already defined in this scope: {0}")]
    DuplicateName(String),

    /// Invalid named-range name
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Range overlaps an existing merged region
    #[error("Range {0} conflicts with a merged region")]
    MergedCellConflict(String),

    /// Malformed formula text; the edit is rejected and the cell keeps
    /// its previous content
    #[error("Formula parse error: {0}")]
    FormulaParse(String),

    /// Edit attempted on a locked cell while sheet protection is active
    #[error("Cell {0} is locked by sheet protection")]
    ProtectionViolation(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}
