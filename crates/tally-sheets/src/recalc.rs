//! Incremental recalculation
//!
//! Every mutating command funnels through here before it returns: the
//! dirty closure of the edit is computed, topologically ordered, and
//! evaluated into the formula caches, so no stale value is ever
//! observable between commands. Cycle members are pinned to the
//! circular error before evaluation starts, which lets downstream
//! formulas read and propagate (or tolerate) it like any other error
//! value.

use ahash::AHashMap;
use tally_sheets_core::{CellError, CellRange, CellValue, Workbook};
use tally_sheets_formula::{
    evaluate, parse_formula, CellKey, DependencyGraph, EvaluationContext, FormulaExpr, RangeKey,
    ReferenceTarget,
};

/// Parsed-AST cache, keyed like the dependency graph
pub(crate) type ParsedFormulas = AHashMap<CellKey, FormulaExpr>;

/// Collect the reference targets a formula holds.
///
/// A range reference contributes one range-node target; a name
/// contributes its symbolic target plus the resolved cell/range so the
/// recalculation order sees through it. References naming an unknown
/// sheet contribute nothing (they evaluate to `#REF!`).
pub(crate) fn collect_targets(
    expr: &FormulaExpr,
    current_sheet: usize,
    workbook: &Workbook,
) -> Vec<ReferenceTarget> {
    let mut targets = Vec::new();
    collect_into(expr, current_sheet, workbook, &mut targets);
    targets
}

fn resolve_sheet(sheet: Option<&str>, current_sheet: usize, workbook: &Workbook) -> Option<usize> {
    match sheet {
        Some(name) => workbook.sheet_index(name),
        None => Some(current_sheet),
    }
}

fn range_target(sheet: usize, range: &CellRange) -> ReferenceTarget {
    if range.cell_count() == 1 {
        ReferenceTarget::Cell(CellKey::new(sheet, range.start.row, range.start.col))
    } else {
        ReferenceTarget::Range(RangeKey::new(sheet, range))
    }
}

fn collect_into(
    expr: &FormulaExpr,
    current_sheet: usize,
    workbook: &Workbook,
    targets: &mut Vec<ReferenceTarget>,
) {
    match expr {
        FormulaExpr::CellRef(cell) => {
            if let Some(sheet) = resolve_sheet(cell.sheet.as_deref(), current_sheet, workbook) {
                targets.push(ReferenceTarget::Cell(CellKey::new(
                    sheet,
                    cell.address.row,
                    cell.address.col,
                )));
            }
        }
        FormulaExpr::RangeRef(range) => {
            if let Some(sheet) = resolve_sheet(range.sheet.as_deref(), current_sheet, workbook) {
                targets.push(range_target(sheet, &range.range));
            }
        }
        FormulaExpr::NameRef(name) => {
            targets.push(ReferenceTarget::Name(name.clone()));
            if let Some(named) = workbook.resolve_name(name, current_sheet) {
                targets.push(range_target(named.sheet, &named.range));
            }
        }
        FormulaExpr::BinaryOp { left, right, .. } => {
            collect_into(left, current_sheet, workbook, targets);
            collect_into(right, current_sheet, workbook, targets);
        }
        FormulaExpr::UnaryOp { operand, .. } => {
            collect_into(operand, current_sheet, workbook, targets);
        }
        FormulaExpr::Function { args, .. } => {
            for arg in args {
                collect_into(arg, current_sheet, workbook, targets);
            }
        }
        FormulaExpr::Number(_)
        | FormulaExpr::String(_)
        | FormulaExpr::Boolean(_)
        | FormulaExpr::Error(_) => {}
    }
}

/// Rebuild the parsed-AST cache and dependency graph from the workbook.
///
/// Used after structural undo and sheet removal, where positions and
/// texts changed wholesale.
pub(crate) fn rebuild(
    workbook: &Workbook,
    graph: &mut DependencyGraph,
    parsed: &mut ParsedFormulas,
) {
    graph.clear();
    parsed.clear();
    for sheet_idx in 0..workbook.sheet_count() {
        let Some(sheet) = workbook.worksheet(sheet_idx) else {
            continue;
        };
        for (row, col, text) in sheet.formula_cells() {
            let key = CellKey::new(sheet_idx, row, col);
            match parse_formula(text) {
                Ok(ast) => {
                    let targets = collect_targets(&ast, sheet_idx, workbook);
                    graph.set_dependencies(key, targets);
                    parsed.insert(key, ast);
                }
                Err(e) => {
                    log::warn!(
                        "skipping unparseable formula at sheet {} ({}, {}): {}",
                        sheet_idx,
                        row,
                        col,
                        e
                    );
                }
            }
        }
    }
}

/// Recalculate the dirty closure of `seeds` into the formula caches
pub(crate) fn recalculate(
    workbook: &mut Workbook,
    graph: &DependencyGraph,
    parsed: &ParsedFormulas,
    seeds: impl IntoIterator<Item = CellKey>,
) {
    let dirty = graph.dirty_closure(seeds);
    let (order, cycles) = graph.recalc_order(&dirty);

    // Pin circular results first so dependents read them during the pass
    for &key in &cycles {
        if parsed.contains_key(&key) {
            store_result(workbook, key, CellValue::Error(CellError::Circular));
        }
    }

    for key in order {
        // Literal seeds have no AST and nothing to evaluate
        let Some(ast) = parsed.get(&key) else {
            continue;
        };
        let result = {
            let ctx = EvaluationContext::new(workbook, key.sheet);
            match evaluate(ast, &ctx) {
                Ok(value) => CellValue::from(value),
                Err(e) => {
                    log::warn!(
                        "evaluation failed at sheet {} ({}, {}): {}",
                        key.sheet,
                        key.row,
                        key.col,
                        e
                    );
                    CellValue::Error(CellError::Value)
                }
            }
        };
        store_result(workbook, key, result);
    }
}

/// Recalculate every formula in the workbook
pub(crate) fn recalculate_all(
    workbook: &mut Workbook,
    graph: &DependencyGraph,
    parsed: &ParsedFormulas,
) {
    let seeds: Vec<CellKey> = parsed.keys().copied().collect();
    recalculate(workbook, graph, parsed, seeds);
}

fn store_result(workbook: &mut Workbook, key: CellKey, value: CellValue) {
    if let Some(sheet) = workbook.worksheet_mut(key.sheet) {
        if let Err(e) = sheet.set_formula_cache(key.row, key.col, value) {
            log::warn!(
                "could not store result at sheet {} ({}, {}): {}",
                key.sheet,
                key.row,
                key.col,
                e
            );
        }
    }
}
