//! # tally-sheets-core
//!
//! Core data structures for the tally-sheets spreadsheet engine.
//!
//! This crate provides the fundamental types used throughout tally-sheets:
//! - [`CellValue`] - cell contents (numbers, strings, booleans, errors, formulas)
//! - [`CellAddress`] and [`CellRange`] - cell addressing and ranges
//! - [`Workbook`], [`Worksheet`] - the document structures
//! - [`Locale`] and the value codec - locale-aware parsing and display
//!
//! ## Example
//!
//! ```rust
//! use tally_sheets_core::{Workbook, CellValue};
//!
//! let mut workbook = Workbook::new();
//! let sheet = workbook.worksheet_mut(0).unwrap();
//!
//! sheet.set_cell_value_at(0, 0, "Hello").unwrap();
//! sheet.set_cell_value_at(0, 1, 42.0).unwrap();
//! assert_eq!(sheet.get_value("B1").unwrap(), CellValue::Number(42.0));
//! ```

pub mod cell;
pub mod comment;
pub mod error;
pub mod locale;
pub mod named_range;
pub mod style;
pub mod workbook;
pub mod worksheet;

// Re-exports for convenience
pub use cell::{CellAddress, CellData, CellError, CellRange, CellRangeIter, CellStorage, CellValue, SharedString};
pub use comment::{CellComment, PopupAttachment};
pub use error::{Error, Result};
pub use locale::{
    date_to_serial, format_value, parse_user_input, serial_to_date, DateOrder, Locale, ParsedInput,
};
pub use named_range::{NameScope, NamedRange, NamedRangeCollection};
pub use style::{NumberFormat, Style, StylePool};
pub use workbook::Workbook;
pub use worksheet::{FreezePanes, HiddenKind, SheetProtection, Worksheet};

/// Maximum number of rows in a worksheet
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
