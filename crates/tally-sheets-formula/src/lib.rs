//! # tally-sheets-formula
//!
//! Formula support for the tally-sheets spreadsheet engine:
//! - [`parse_formula`] - parse formula text into a [`FormulaExpr`] tree
//! - [`evaluate`] - evaluate an expression against a workbook
//! - [`DependencyGraph`] - precedent/dependent tracking for incremental
//!   recalculation
//! - [`rewrite`] - reference rewriting for structural mutation and paste
//!
//! ## Example
//!
//! ```rust
//! use tally_sheets_core::Workbook;
//! use tally_sheets_formula::{evaluate, parse_formula, EvaluationContext, FormulaValue};
//!
//! let mut workbook = Workbook::new();
//! workbook.worksheet_mut(0).unwrap().set_cell_value_at(0, 0, 20.0).unwrap();
//!
//! let ast = parse_formula("=A1*2+1").unwrap();
//! let ctx = EvaluationContext::new(&workbook, 0);
//! assert_eq!(evaluate(&ast, &ctx).unwrap(), FormulaValue::Number(41.0));
//! ```

pub mod ast;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod rewrite;

pub use ast::{BinaryOperator, CellReference, FormulaExpr, RangeReference, UnaryOperator};
pub use dependency::{CellKey, DependencyGraph, RangeKey, ReferenceTarget, ShiftOp};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{coerce_number, evaluate, EvaluationContext, FormulaValue};
pub use parser::parse_formula;
pub use rewrite::{rebase, shift_cols, shift_rows, sheet_invalidated, Rewritten, ShiftTarget};
