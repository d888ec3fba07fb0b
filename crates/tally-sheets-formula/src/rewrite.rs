//! Reference rewriting
//!
//! Structural row/column mutation rewrites every formula in the
//! workbook: references past the mutation point shift, ranges straddling
//! it grow or shrink, and references into a deleted band are replaced by
//! a `#REF!` token embedded in the regenerated formula text. The token
//! is sticky: it survives recalculation and later structural edits until
//! the user re-enters the formula.
//!
//! Structural shifts move *position identity*, so absolute references
//! shift exactly like relative ones. The `$` flags matter only to
//! [`rebase`], which relocates a formula for paste.

use crate::ast::{CellReference, FormulaExpr, RangeReference};
use crate::dependency::ShiftOp;
use tally_sheets_core::{CellAddress, CellError, CellRange, MAX_COLS, MAX_ROWS};

/// Which sheet's references a structural shift applies to.
///
/// An unqualified reference resolves against the sheet the formula lives
/// on; a qualified one names its sheet explicitly.
#[derive(Debug, Clone, Copy)]
pub struct ShiftTarget<'a> {
    /// Name of the sheet whose rows/columns moved
    pub sheet_name: &'a str,
    /// Whether the formula being rewritten lives on that sheet
    pub formula_on_target: bool,
}

impl ShiftTarget<'_> {
    fn matches(&self, sheet: Option<&str>) -> bool {
        match sheet {
            None => self.formula_on_target,
            Some(name) => name == self.sheet_name,
        }
    }
}

/// A rewritten expression plus whether anything actually changed
#[derive(Debug, Clone, PartialEq)]
pub struct Rewritten {
    pub expr: FormulaExpr,
    pub changed: bool,
}

/// Rewrite references for a row insertion or deletion on the target
/// sheet
pub fn shift_rows(expr: &FormulaExpr, target: &ShiftTarget, op: ShiftOp) -> Rewritten {
    let mut changed = false;
    let expr = map_refs(expr, &mut changed, &mut |cell| {
        if !target.matches(cell.sheet.as_deref()) {
            return None;
        }
        Some(match op.apply(cell.address.row) {
            Some(row) if row == cell.address.row => return None,
            Some(row) => FormulaExpr::CellRef(CellReference {
                sheet: cell.sheet.clone(),
                address: CellAddress { row, ..cell.address },
            }),
            None => FormulaExpr::Error(CellError::Ref),
        })
    }, &mut |range| {
        if !target.matches(range.sheet.as_deref()) {
            return None;
        }
        Some(match op.apply_span(range.range.start.row, range.range.end.row) {
            Some((start, end))
                if start == range.range.start.row && end == range.range.end.row =>
            {
                return None
            }
            Some((start, end)) => {
                let mut shifted = range.range;
                shifted.start.row = start;
                shifted.end.row = end;
                FormulaExpr::RangeRef(RangeReference {
                    sheet: range.sheet.clone(),
                    range: shifted,
                })
            }
            None => FormulaExpr::Error(CellError::Ref),
        })
    });
    Rewritten { expr, changed }
}

/// Rewrite references for a column insertion or deletion on the target
/// sheet
pub fn shift_cols(expr: &FormulaExpr, target: &ShiftTarget, op: ShiftOp) -> Rewritten {
    let mut changed = false;
    let expr = map_refs(expr, &mut changed, &mut |cell| {
        if !target.matches(cell.sheet.as_deref()) {
            return None;
        }
        Some(match op.apply(cell.address.col as u32) {
            Some(col) if col == cell.address.col as u32 => return None,
            Some(col) => FormulaExpr::CellRef(CellReference {
                sheet: cell.sheet.clone(),
                address: CellAddress {
                    col: col as u16,
                    ..cell.address
                },
            }),
            None => FormulaExpr::Error(CellError::Ref),
        })
    }, &mut |range| {
        if !target.matches(range.sheet.as_deref()) {
            return None;
        }
        Some(
            match op.apply_span(range.range.start.col as u32, range.range.end.col as u32) {
                Some((start, end))
                    if start == range.range.start.col as u32
                        && end == range.range.end.col as u32 =>
                {
                    return None
                }
                Some((start, end)) => {
                    let mut shifted = range.range;
                    shifted.start.col = start as u16;
                    shifted.end.col = end as u16;
                    FormulaExpr::RangeRef(RangeReference {
                        sheet: range.sheet.clone(),
                        range: shifted,
                    })
                }
                None => FormulaExpr::Error(CellError::Ref),
            },
        )
    });
    Rewritten { expr, changed }
}

/// Replace every reference into a removed sheet with an embedded `#REF!`
pub fn sheet_invalidated(expr: &FormulaExpr, sheet_name: &str) -> Rewritten {
    let mut changed = false;
    let expr = map_refs(expr, &mut changed, &mut |cell| {
        (cell.sheet.as_deref() == Some(sheet_name)).then_some(FormulaExpr::Error(CellError::Ref))
    }, &mut |range| {
        (range.sheet.as_deref() == Some(sheet_name)).then_some(FormulaExpr::Error(CellError::Ref))
    });
    Rewritten { expr, changed }
}

/// Relocate a formula by a (row, column) offset for paste.
///
/// Only relative components move; `$`-anchored rows/columns stay put. A
/// reference pushed outside the grid becomes `#REF!`.
pub fn rebase(expr: &FormulaExpr, row_delta: i64, col_delta: i64) -> FormulaExpr {
    let mut changed = false;
    map_refs(expr, &mut changed, &mut |cell| {
        Some(match rebase_address(cell.address, row_delta, col_delta) {
            Some(address) if address == cell.address => return None,
            Some(address) => FormulaExpr::CellRef(CellReference {
                sheet: cell.sheet.clone(),
                address,
            }),
            None => FormulaExpr::Error(CellError::Ref),
        })
    }, &mut |range| {
        let start = rebase_address(range.range.start, row_delta, col_delta);
        let end = rebase_address(range.range.end, row_delta, col_delta);
        Some(match (start, end) {
            (Some(start), Some(end))
                if start == range.range.start && end == range.range.end =>
            {
                return None
            }
            (Some(start), Some(end)) => FormulaExpr::RangeRef(RangeReference {
                sheet: range.sheet.clone(),
                range: CellRange { start, end },
            }),
            _ => FormulaExpr::Error(CellError::Ref),
        })
    })
}

fn rebase_address(addr: CellAddress, row_delta: i64, col_delta: i64) -> Option<CellAddress> {
    let row = if addr.row_absolute {
        addr.row
    } else {
        let row = addr.row as i64 + row_delta;
        if row < 0 || row >= MAX_ROWS as i64 {
            return None;
        }
        row as u32
    };
    let col = if addr.col_absolute {
        addr.col
    } else {
        let col = addr.col as i64 + col_delta;
        if col < 0 || col >= MAX_COLS as i64 {
            return None;
        }
        col as u16
    };
    Some(CellAddress { row, col, ..addr })
}

/// Walk an expression, replacing cell and range references through the
/// two callbacks (`None` = keep as-is). Everything else is rebuilt
/// unchanged.
fn map_refs(
    expr: &FormulaExpr,
    changed: &mut bool,
    on_cell: &mut impl FnMut(&CellReference) -> Option<FormulaExpr>,
    on_range: &mut impl FnMut(&RangeReference) -> Option<FormulaExpr>,
) -> FormulaExpr {
    match expr {
        FormulaExpr::CellRef(cell) => match on_cell(cell) {
            Some(replaced) => {
                *changed = true;
                replaced
            }
            None => expr.clone(),
        },
        FormulaExpr::RangeRef(range) => match on_range(range) {
            Some(replaced) => {
                *changed = true;
                replaced
            }
            None => expr.clone(),
        },
        FormulaExpr::BinaryOp { op, left, right } => FormulaExpr::BinaryOp {
            op: *op,
            left: Box::new(map_refs(left, changed, on_cell, on_range)),
            right: Box::new(map_refs(right, changed, on_cell, on_range)),
        },
        FormulaExpr::UnaryOp { op, operand } => FormulaExpr::UnaryOp {
            op: *op,
            operand: Box::new(map_refs(operand, changed, on_cell, on_range)),
        },
        FormulaExpr::Function { name, args } => FormulaExpr::Function {
            name: name.clone(),
            args: args
                .iter()
                .map(|arg| map_refs(arg, changed, on_cell, on_range))
                .collect(),
        },
        FormulaExpr::Number(_)
        | FormulaExpr::String(_)
        | FormulaExpr::Boolean(_)
        | FormulaExpr::Error(_)
        | FormulaExpr::NameRef(_) => expr.clone(),
    }
}
