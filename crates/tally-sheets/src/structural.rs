//! Structural row/column mutation
//!
//! Insertion and deletion shift cell storage, attachments, merges, and
//! hidden flags through the worksheet, shift dependency-graph nodes and
//! range bounds in place, rewrite formula references workbook-wide, and
//! move named ranges anchored on the mutated sheet. The caller captures
//! a [`StructuralSnapshot`] first; undo restores it wholesale rather
//! than inverting the rewrite formula-by-formula.

use crate::history::{StructuralOp, StructuralSnapshot};
use crate::recalc::{collect_targets, ParsedFormulas};
use tally_sheets_core::{CellValue, NameScope, NamedRangeCollection, Workbook};
use tally_sheets_formula::{
    rewrite, CellKey, DependencyGraph, FormulaExpr, ShiftOp, ShiftTarget,
};

fn shift_of(op: StructuralOp) -> (bool, ShiftOp) {
    match op {
        StructuralOp::InsertRows { at, count } => (true, ShiftOp::Insert { at, count }),
        StructuralOp::DeleteRows { at, count } => (true, ShiftOp::Delete { at, count }),
        StructuralOp::InsertCols { at, count } => (
            false,
            ShiftOp::Insert { at: at as u32, count: count as u32 },
        ),
        StructuralOp::DeleteCols { at, count } => (
            false,
            ShiftOp::Delete { at: at as u32, count: count as u32 },
        ),
    }
}

/// Capture everything a structural undo needs, before mutating
pub(crate) fn capture_snapshot(workbook: &Workbook, sheet: usize) -> StructuralSnapshot {
    let mut snapshot = StructuralSnapshot {
        named_ranges: workbook.named_ranges().iter().cloned().collect(),
        ..StructuralSnapshot::default()
    };

    if let Some(ws) = workbook.worksheet(sheet) {
        snapshot.cells = ws
            .iter_cells()
            .map(|(row, col, data)| (row, col, data.clone()))
            .collect();
        snapshot.comments = ws
            .comments()
            .map(|((row, col), comment)| (row, col, comment.clone()))
            .collect();
        snapshot.popups = ws
            .popups()
            .map(|((row, col), popup)| (row, col, popup.clone()))
            .collect();
        snapshot.merged_regions = ws.merged_regions().to_vec();
        snapshot.hidden_rows = ws.hidden_rows().collect();
        snapshot.hidden_cols = ws.hidden_cols().collect();
    }

    // Formula cells elsewhere may get their references rewritten; keep
    // their exact pre-rewrite state
    for other in 0..workbook.sheet_count() {
        if other == sheet {
            continue;
        }
        let Some(ws) = workbook.worksheet(other) else {
            continue;
        };
        for (row, col, data) in ws.iter_cells() {
            if data.value.is_formula() {
                snapshot
                    .foreign_formulas
                    .push((CellKey::new(other, row, col), data.clone()));
            }
        }
    }

    snapshot
}

/// Restore a sheet (and rewritten foreign formulas) from a snapshot.
///
/// The caller rebuilds the dependency graph and recalculates afterwards.
pub(crate) fn restore_snapshot(
    workbook: &mut Workbook,
    sheet: usize,
    snapshot: &StructuralSnapshot,
) {
    if let Some(ws) = workbook.worksheet_mut(sheet) {
        let stale: Vec<(u32, u16)> = ws.iter_cells().map(|(row, col, _)| (row, col)).collect();
        for (row, col) in stale {
            ws.clear_cell_at(row, col);
        }
        let stale: Vec<(u32, u16)> = ws.comments().map(|(pos, _)| pos).collect();
        for (row, col) in stale {
            ws.remove_comment_at(row, col);
        }
        let stale: Vec<(u32, u16)> = ws.popups().map(|(pos, _)| pos).collect();
        for (row, col) in stale {
            ws.remove_popup_at(row, col);
        }
        let stale: Vec<u32> = ws.hidden_rows().map(|(row, _)| row).collect();
        for row in stale {
            ws.set_row_hidden(row, None);
        }
        let stale: Vec<u16> = ws.hidden_cols().map(|(col, _)| col).collect();
        for col in stale {
            ws.set_col_hidden(col, None);
        }

        for (row, col, data) in &snapshot.cells {
            let _ = ws.set_cell_data_at(*row, *col, data.clone());
        }
        for (row, col, comment) in &snapshot.comments {
            ws.set_comment_at(*row, *col, comment.clone());
        }
        for (row, col, popup) in &snapshot.popups {
            ws.set_popup_at(*row, *col, popup.clone());
        }
        ws.set_merged_regions(snapshot.merged_regions.clone());
        for (row, kind) in &snapshot.hidden_rows {
            ws.set_row_hidden(*row, Some(*kind));
        }
        for (col, kind) in &snapshot.hidden_cols {
            ws.set_col_hidden(*col, Some(*kind));
        }
    }

    for (key, data) in &snapshot.foreign_formulas {
        if let Some(ws) = workbook.worksheet_mut(key.sheet) {
            let _ = ws.set_cell_data_at(key.row, key.col, data.clone());
        }
    }

    let mut names = NamedRangeCollection::new();
    for named in &snapshot.named_ranges {
        let _ = names.define(named.clone());
    }
    *workbook.named_ranges_mut() = names;
}

/// Apply a structural mutation: shift storage and graph, rewrite formula
/// references everywhere, move named ranges. The caller recalculates.
pub(crate) fn apply(
    workbook: &mut Workbook,
    graph: &mut DependencyGraph,
    parsed: &mut ParsedFormulas,
    sheet: usize,
    op: StructuralOp,
) {
    let sheet_name = match workbook.worksheet(sheet) {
        Some(ws) => ws.name().to_string(),
        None => return,
    };
    let (row_axis, shift) = shift_of(op);

    // Cell storage, comments, popups, merges, hidden flags move together
    if let Some(ws) = workbook.worksheet_mut(sheet) {
        match op {
            StructuralOp::InsertRows { at, count } => ws.insert_rows(at, count),
            StructuralOp::DeleteRows { at, count } => ws.delete_rows(at, count),
            StructuralOp::InsertCols { at, count } => ws.insert_cols(at, count),
            StructuralOp::DeleteCols { at, count } => ws.delete_cols(at, count),
        }
    }

    // Graph nodes and range bounds shift in place; per-cell edges are
    // not rebuilt
    if row_axis {
        graph.shift_rows(sheet, shift);
    } else {
        graph.shift_cols(sheet, shift);
    }

    // The parsed-AST cache moves with its cells
    *parsed = std::mem::take(parsed)
        .into_iter()
        .filter_map(|(key, ast)| {
            if key.sheet != sheet {
                return Some((key, ast));
            }
            if row_axis {
                shift.apply(key.row).map(|row| (CellKey { row, ..key }, ast))
            } else {
                shift
                    .apply(key.col as u32)
                    .map(|col| (CellKey { col: col as u16, ..key }, ast))
            }
        })
        .collect();

    shift_named_ranges(workbook, sheet, row_axis, shift);

    // Rewrite references in every formula that resolves into the
    // mutated sheet; deleted references become embedded #REF! tokens
    let rewrites: Vec<(CellKey, FormulaExpr, String)> = parsed
        .iter()
        .filter_map(|(&key, ast)| {
            let target = ShiftTarget {
                sheet_name: &sheet_name,
                formula_on_target: key.sheet == sheet,
            };
            let rewritten = if row_axis {
                rewrite::shift_rows(ast, &target, shift)
            } else {
                rewrite::shift_cols(ast, &target, shift)
            };
            rewritten.changed.then(|| {
                let text = rewritten.expr.to_formula_text();
                (key, rewritten.expr, text)
            })
        })
        .collect();

    let changed: Vec<CellKey> = rewrites.iter().map(|(key, _, _)| *key).collect();
    for (key, ast, text) in rewrites {
        if let Some(ws) = workbook.worksheet_mut(key.sheet) {
            if let Some(cell) = ws.cell_at_mut(key.row, key.col) {
                cell.value = CellValue::formula(text.clone());
                cell.raw_input = Some(text);
            }
        }
        parsed.insert(key, ast);
    }

    // Rewritten formulas need fresh edges (an embedded #REF! drops its
    // edge; untouched formulas were already shifted in the graph)
    for key in changed {
        if let Some(ast) = parsed.get(&key) {
            let targets = collect_targets(ast, key.sheet, workbook);
            graph.set_dependencies(key, targets);
        }
    }
}

/// Move named ranges anchored on the mutated sheet; a name whose whole
/// range is deleted is dropped.
fn shift_named_ranges(workbook: &mut Workbook, sheet: usize, row_axis: bool, shift: ShiftOp) {
    let mut doomed: Vec<(String, NameScope)> = Vec::new();
    for named in workbook.named_ranges_mut().iter_mut() {
        if named.sheet != sheet {
            continue;
        }
        let span = if row_axis {
            shift.apply_span(named.range.start.row, named.range.end.row)
        } else {
            shift.apply_span(named.range.start.col as u32, named.range.end.col as u32)
        };
        match span {
            Some((start, end)) => {
                if row_axis {
                    named.range.start.row = start;
                    named.range.end.row = end;
                } else {
                    named.range.start.col = start as u16;
                    named.range.end.col = end as u16;
                }
            }
            None => doomed.push((named.name.clone(), named.scope)),
        }
    }
    for (name, scope) in doomed {
        workbook.named_ranges_mut().remove(&name, scope);
    }
}
