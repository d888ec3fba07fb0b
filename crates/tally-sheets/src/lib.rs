//! # tally-sheets
//!
//! An in-memory spreadsheet computation engine: a sparse grid of cells
//! holding literals or formulas, a dependency graph that keeps derived
//! values consistent, structural row/column mutation with formula
//! reference rewriting, and a transactional undo/redo log.
//!
//! ## Example
//!
//! ```rust
//! use tally_sheets::Engine;
//!
//! let mut engine = Engine::new();
//! engine.set_cell_value(0, "A1", "10").unwrap();
//! engine.set_cell_value(0, "A2", "20").unwrap();
//! engine.set_cell_value(0, "B1", "=A1+A2").unwrap();
//! assert_eq!(engine.display_value(0, "B1").unwrap(), "30");
//!
//! // Structural edits rewrite references and are one undo step
//! engine.insert_rows(0, 1, 1).unwrap();
//! assert_eq!(engine.raw_input(0, "B1").unwrap(), Some("=A1+A3"));
//! engine.undo();
//! assert_eq!(engine.raw_input(0, "B1").unwrap(), Some("=A1+A2"));
//! ```

pub mod engine;
pub mod history;
mod recalc;
mod structural;

pub use engine::Engine;
pub use history::{
    CellEdit, Command, History, StructuralOp, StructuralSnapshot, StyleEdit,
    DEFAULT_HISTORY_DEPTH,
};

// Re-export core types
pub use tally_sheets_core::{
    format_value, parse_user_input, CellAddress, CellComment, CellData, CellError, CellRange,
    CellValue, DateOrder, Error, FreezePanes, HiddenKind, Locale, NameScope, NamedRange,
    NumberFormat, PopupAttachment, Result, SharedString, SheetProtection, Style, Workbook,
    Worksheet, MAX_COLS, MAX_ROWS,
};

// Re-export formula types
pub use tally_sheets_formula::{
    evaluate, parse_formula, CellKey, DependencyGraph, EvaluationContext, FormulaError,
    FormulaExpr, FormulaResult, FormulaValue,
};
