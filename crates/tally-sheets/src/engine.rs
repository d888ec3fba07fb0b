//! The spreadsheet engine
//!
//! [`Engine`] owns the workbook, the dependency graph, a parsed-AST
//! cache, and the undo/redo history, and exposes the command and query
//! surface external callers drive. Commands are processed one at a
//! time; every mutating command finishes a synchronous incremental
//! recalculation before it returns, so callers never observe stale
//! values. Rejected commands (bad address, parse error, protection)
//! change nothing and leave no history entry.

use crate::history::{CellEdit, Command, History, StructuralOp, StyleEdit};
use crate::recalc::{self, ParsedFormulas};
use crate::structural;
use tally_sheets_core::{
    format_value, parse_user_input, CellAddress, CellComment, CellData, CellError, CellRange,
    CellValue, Error, HiddenKind, Locale, NameScope, NamedRange, NumberFormat, PopupAttachment,
    Result, Workbook, Worksheet, MAX_COLS, MAX_ROWS,
};
use tally_sheets_formula::{parse_formula, rewrite, CellKey, DependencyGraph};

/// An in-memory spreadsheet computation engine.
///
/// # Example
///
/// ```rust
/// use tally_sheets::Engine;
///
/// let mut engine = Engine::new();
/// engine.set_cell_value(0, "A1", "10").unwrap();
/// engine.set_cell_value(0, "A2", "20").unwrap();
/// engine.set_cell_value(0, "A3", "=A1+A2").unwrap();
/// assert_eq!(engine.display_value(0, "A3").unwrap(), "30");
///
/// engine.undo();
/// assert_eq!(engine.display_value(0, "A3").unwrap(), "");
/// ```
pub struct Engine {
    workbook: Workbook,
    graph: DependencyGraph,
    parsed: ParsedFormulas,
    history: History,
}

impl Engine {
    /// Create an engine with one worksheet and en-US conventions
    pub fn new() -> Self {
        Self::with_workbook(Workbook::new())
    }

    /// Create an engine with the given locale
    pub fn with_locale(locale: Locale) -> Self {
        Self::with_workbook(Workbook::with_locale(locale))
    }

    /// Wrap an existing workbook (e.g. populated by an importer); its
    /// formulas are parsed and calculated before the engine is returned
    pub fn with_workbook(workbook: Workbook) -> Self {
        let mut engine = Self {
            workbook,
            graph: DependencyGraph::new(),
            parsed: ParsedFormulas::new(),
            history: History::default(),
        };
        recalc::rebuild(&engine.workbook, &mut engine.graph, &mut engine.parsed);
        engine.recalc_all();
        engine
    }

    /// The underlying workbook
    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    /// The workbook locale
    pub fn locale(&self) -> &Locale {
        self.workbook.locale()
    }

    fn sheet(&self, sheet: usize) -> Result<&Worksheet> {
        self.workbook
            .worksheet(sheet)
            .ok_or(Error::SheetOutOfBounds(sheet, self.workbook.sheet_count()))
    }

    // === Edit commands ===

    /// Set a cell from user-entered text.
    ///
    /// A leading `=` enters a formula (rejected outright on a parse
    /// error, keeping the prior content); anything else goes through the
    /// locale codec. Locked cells under active protection reject the
    /// edit.
    pub fn set_cell_value(&mut self, sheet: usize, address: &str, input: &str) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        let ws = self.sheet(sheet)?;
        if ws.edit_blocked_at(addr.row, addr.col) {
            return Err(Error::ProtectionViolation(addr.to_a1_string()));
        }
        let before = ws.cell_at(addr.row, addr.col).cloned();
        let mut style_index = before.as_ref().map(|c| c.style_index).unwrap_or(0);

        let trimmed = input.trim();
        let after: Option<CellData> = if trimmed.starts_with('=') {
            parse_formula(trimmed).map_err(|e| Error::FormulaParse(e.to_string()))?;
            Some(CellData {
                value: CellValue::formula(trimmed),
                style_index,
                raw_input: Some(input.to_string()),
            })
        } else {
            let entry = parse_user_input(input, self.workbook.locale());
            if entry.value.is_empty() {
                // Clearing by entering nothing keeps explicit formatting
                (style_index != 0).then(|| CellData {
                    value: CellValue::Empty,
                    style_index,
                    raw_input: None,
                })
            } else {
                if let Some(format) = entry.suggested_format {
                    style_index = self.adopt_format(sheet, style_index, format);
                }
                Some(CellData {
                    value: entry.value,
                    style_index,
                    raw_input: Some(input.to_string()),
                })
            }
        };

        if before.is_none() && after.is_none() {
            return Ok(());
        }
        let key = CellKey::new(sheet, addr.row, addr.col);
        self.install_cell_state(key, after.as_ref());
        self.history.record(Command::SetCell {
            sheet,
            row: addr.row,
            col: addr.col,
            before,
            after,
        });
        self.recalc_from(vec![key]);
        Ok(())
    }

    /// Clear a cell's content, keeping its formatting
    pub fn clear_cell(&mut self, sheet: usize, address: &str) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        let ws = self.sheet(sheet)?;
        if ws.edit_blocked_at(addr.row, addr.col) {
            return Err(Error::ProtectionViolation(addr.to_a1_string()));
        }
        let Some(before) = ws.cell_at(addr.row, addr.col).cloned() else {
            return Ok(());
        };
        let after = (before.style_index != 0).then(|| CellData {
            value: CellValue::Empty,
            style_index: before.style_index,
            raw_input: None,
        });

        let key = CellKey::new(sheet, addr.row, addr.col);
        self.install_cell_state(key, after.as_ref());
        self.history.record(Command::SetCell {
            sheet,
            row: addr.row,
            col: addr.col,
            before: Some(before),
            after,
        });
        self.recalc_from(vec![key]);
        Ok(())
    }

    /// Copy a rectangular region to a new anchor on the same sheet.
    ///
    /// Relative formula references are rebased by the move; `$`-anchored
    /// components stay put. The whole paste is one history entry.
    pub fn paste_region(&mut self, sheet: usize, source: &str, dest: &str) -> Result<()> {
        let src = CellRange::parse(source)?;
        let anchor = CellAddress::parse(dest)?;
        let ws = self.sheet(sheet)?;

        let row_delta = anchor.row as i64 - src.start.row as i64;
        let col_delta = anchor.col as i64 - src.start.col as i64;
        let end_row = src.end.row as i64 + row_delta;
        let end_col = src.end.col as i64 + col_delta;
        if end_row >= MAX_ROWS as i64 {
            return Err(Error::RowOutOfBounds(end_row as u32, MAX_ROWS - 1));
        }
        if end_col >= MAX_COLS as i64 {
            return Err(Error::ColumnOutOfBounds(end_col as u16, MAX_COLS - 1));
        }

        // Validate every destination cell before touching anything
        for addr in src.cells() {
            let dest_row = (addr.row as i64 + row_delta) as u32;
            let dest_col = (addr.col as i64 + col_delta) as u16;
            if ws.edit_blocked_at(dest_row, dest_col) {
                return Err(Error::ProtectionViolation(
                    CellAddress::new(dest_row, dest_col).to_a1_string(),
                ));
            }
        }

        // Snapshot the source first so overlapping regions paste cleanly
        let mut edits = Vec::with_capacity(src.cell_count() as usize);
        for addr in src.cells() {
            let dest_row = (addr.row as i64 + row_delta) as u32;
            let dest_col = (addr.col as i64 + col_delta) as u16;
            let after = ws
                .cell_at(addr.row, addr.col)
                .map(|data| rebase_cell(data, row_delta, col_delta));
            let before = ws.cell_at(dest_row, dest_col).cloned();
            edits.push(CellEdit {
                row: dest_row,
                col: dest_col,
                before,
                after,
            });
        }

        let mut seeds = Vec::with_capacity(edits.len());
        for edit in &edits {
            let key = CellKey::new(sheet, edit.row, edit.col);
            self.install_cell_state(key, edit.after.as_ref());
            seeds.push(key);
        }
        self.history.record(Command::Paste { sheet, edits });
        self.recalc_from(seeds);
        Ok(())
    }

    /// Insert `count` rows at `at`
    pub fn insert_rows(&mut self, sheet: usize, at: u32, count: u32) -> Result<()> {
        if at >= MAX_ROWS {
            return Err(Error::RowOutOfBounds(at, MAX_ROWS - 1));
        }
        self.structural_edit(sheet, StructuralOp::InsertRows { at, count })
    }

    /// Delete the row band `[at, at + count)`
    pub fn delete_rows(&mut self, sheet: usize, at: u32, count: u32) -> Result<()> {
        if at >= MAX_ROWS {
            return Err(Error::RowOutOfBounds(at, MAX_ROWS - 1));
        }
        self.structural_edit(sheet, StructuralOp::DeleteRows { at, count })
    }

    /// Insert `count` columns at `at`
    pub fn insert_cols(&mut self, sheet: usize, at: u16, count: u16) -> Result<()> {
        if at >= MAX_COLS {
            return Err(Error::ColumnOutOfBounds(at, MAX_COLS - 1));
        }
        self.structural_edit(sheet, StructuralOp::InsertCols { at, count })
    }

    /// Delete the column band `[at, at + count)`
    pub fn delete_cols(&mut self, sheet: usize, at: u16, count: u16) -> Result<()> {
        if at >= MAX_COLS {
            return Err(Error::ColumnOutOfBounds(at, MAX_COLS - 1));
        }
        self.structural_edit(sheet, StructuralOp::DeleteCols { at, count })
    }

    fn structural_edit(&mut self, sheet: usize, op: StructuralOp) -> Result<()> {
        self.sheet(sheet)?;
        let empty = matches!(
            op,
            StructuralOp::InsertRows { count: 0, .. }
                | StructuralOp::DeleteRows { count: 0, .. }
                | StructuralOp::InsertCols { count: 0, .. }
                | StructuralOp::DeleteCols { count: 0, .. }
        );
        if empty {
            return Ok(());
        }
        let before = structural::capture_snapshot(&self.workbook, sheet);
        structural::apply(
            &mut self.workbook,
            &mut self.graph,
            &mut self.parsed,
            sheet,
            op,
        );
        self.history.record(Command::Structural { sheet, op, before });
        self.recalc_all();
        Ok(())
    }

    /// Merge a region; the anchor (top-left) cell keeps its content and
    /// the rest are blanked. Undoing the merge restores every blanked
    /// cell exactly.
    pub fn merge_cells(&mut self, sheet: usize, range: &str) -> Result<()> {
        let range = CellRange::parse(range)?;
        if range.cell_count() == 1 {
            return Err(Error::InvalidRange(
                "merge needs at least two cells".into(),
            ));
        }
        let ws = self.sheet(sheet)?;
        if ws.merged_regions().iter().any(|r| r.overlaps(&range)) {
            return Err(Error::MergedCellConflict(range.to_a1_string()));
        }
        for addr in range.cells() {
            if ws.edit_blocked_at(addr.row, addr.col) {
                return Err(Error::ProtectionViolation(addr.to_a1_string()));
            }
        }

        let anchor = range.start;
        let displaced: Vec<(u32, u16, CellData)> = range
            .cells()
            .filter(|a| !(a.row == anchor.row && a.col == anchor.col))
            .filter_map(|a| ws.cell_at(a.row, a.col).map(|d| (a.row, a.col, d.clone())))
            .collect();

        for (row, col, _) in &displaced {
            self.install_cell_state(CellKey::new(sheet, *row, *col), None);
        }
        if let Some(ws) = self.workbook.worksheet_mut(sheet) {
            ws.merge_region(range)?;
        }
        let seeds = range
            .cells()
            .map(|a| CellKey::new(sheet, a.row, a.col))
            .collect();
        self.history.record(Command::Merge {
            sheet,
            range,
            displaced,
        });
        self.recalc_from(seeds);
        Ok(())
    }

    /// Remove a merged region. Blanked cells stay blank; only undoing
    /// the original merge brings their content back.
    pub fn unmerge_cells(&mut self, sheet: usize, range: &str) -> Result<()> {
        let range = CellRange::parse(range)?;
        self.sheet(sheet)?;
        let existed = self
            .workbook
            .worksheet_mut(sheet)
            .is_some_and(|ws| ws.unmerge_region(&range));
        if !existed {
            return Err(Error::InvalidRange(format!(
                "{} is not a merged region",
                range.to_a1_string()
            )));
        }
        self.history.record(Command::Unmerge { sheet, range });
        Ok(())
    }

    /// Define or redefine a named range
    pub fn define_named_range(
        &mut self,
        sheet: usize,
        name: &str,
        range: &str,
        scope: NameScope,
    ) -> Result<()> {
        let range = CellRange::parse(range)?;
        self.sheet(sheet)?;
        let after = NamedRange::new(name, sheet, range, scope);
        let before = self
            .workbook
            .named_ranges()
            .get_exact(name, scope)
            .cloned();
        self.workbook
            .named_ranges_mut()
            .define_or_replace(after.clone())?;
        // Formulas store the name symbolically; only their dependency
        // edges need refreshing
        self.refresh_name_dependents(name);
        self.history.record(Command::DefineName { before, after });
        self.recalc_all();
        Ok(())
    }

    /// Enable or disable sheet protection
    pub fn set_protection(&mut self, sheet: usize, enabled: bool) -> Result<()> {
        let before = self.sheet(sheet)?.protection().enabled;
        if before == enabled {
            return Ok(());
        }
        if let Some(ws) = self.workbook.worksheet_mut(sheet) {
            ws.set_protection_enabled(enabled);
        }
        self.history.record(Command::SetProtection {
            sheet,
            before,
            after: enabled,
        });
        Ok(())
    }

    /// Set the lock flag on every cell of a range
    pub fn set_range_locked(&mut self, sheet: usize, range: &str, locked: bool) -> Result<()> {
        let range = CellRange::parse(range)?;
        self.sheet(sheet)?;
        let Some(ws) = self.workbook.worksheet_mut(sheet) else {
            return Ok(());
        };
        let mut edits = Vec::new();
        for addr in range.cells() {
            let before = ws.cell_style_index_at(addr.row, addr.col);
            let style = ws.styles().resolve(before).clone();
            if style.locked == locked {
                continue;
            }
            let after = ws.intern_style(style.with_locked(locked));
            ws.set_cell_style_index_at(addr.row, addr.col, after);
            edits.push(StyleEdit {
                row: addr.row,
                col: addr.col,
                before,
                after,
            });
        }
        if !edits.is_empty() {
            self.history.record(Command::SetLocked { sheet, edits });
        }
        Ok(())
    }

    /// Attach or replace a cell comment
    pub fn set_comment(&mut self, sheet: usize, address: &str, comment: CellComment) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.sheet(sheet)?;
        let before = self
            .workbook
            .worksheet_mut(sheet)
            .and_then(|ws| ws.set_comment_at(addr.row, addr.col, comment.clone()));
        self.history.record(Command::SetComment {
            sheet,
            row: addr.row,
            col: addr.col,
            before,
            after: Some(comment),
        });
        Ok(())
    }

    /// Remove a cell comment; no-op (and no history entry) if absent
    pub fn remove_comment(&mut self, sheet: usize, address: &str) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.sheet(sheet)?;
        let Some(before) = self
            .workbook
            .worksheet_mut(sheet)
            .and_then(|ws| ws.remove_comment_at(addr.row, addr.col))
        else {
            return Ok(());
        };
        self.history.record(Command::SetComment {
            sheet,
            row: addr.row,
            col: addr.col,
            before: Some(before),
            after: None,
        });
        Ok(())
    }

    /// Attach or replace an opaque popup/validation payload
    pub fn set_popup(&mut self, sheet: usize, address: &str, popup: PopupAttachment) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.sheet(sheet)?;
        let before = self
            .workbook
            .worksheet_mut(sheet)
            .and_then(|ws| ws.set_popup_at(addr.row, addr.col, popup.clone()));
        self.history.record(Command::SetPopup {
            sheet,
            row: addr.row,
            col: addr.col,
            before,
            after: Some(popup),
        });
        Ok(())
    }

    /// Remove a popup attachment; no-op if absent
    pub fn remove_popup(&mut self, sheet: usize, address: &str) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.sheet(sheet)?;
        let Some(before) = self
            .workbook
            .worksheet_mut(sheet)
            .and_then(|ws| ws.remove_popup_at(addr.row, addr.col))
        else {
            return Ok(());
        };
        self.history.record(Command::SetPopup {
            sheet,
            row: addr.row,
            col: addr.col,
            before: Some(before),
            after: None,
        });
        Ok(())
    }

    /// Hide or unhide a row. `HiddenKind::Subtotal` marks rows hidden by
    /// a subtotal pass, which `SUBTOTAL` aggregation then skips.
    pub fn set_row_hidden(
        &mut self,
        sheet: usize,
        row: u32,
        hidden: Option<HiddenKind>,
    ) -> Result<()> {
        let before = self.sheet(sheet)?.row_hidden_kind(row);
        if before == hidden {
            return Ok(());
        }
        if let Some(ws) = self.workbook.worksheet_mut(sheet) {
            ws.set_row_hidden(row, hidden);
        }
        self.history.record(Command::SetRowHidden {
            sheet,
            row,
            before,
            after: hidden,
        });
        // Row visibility feeds SUBTOTAL
        self.recalc_all();
        Ok(())
    }

    /// Hide or unhide a column
    pub fn set_col_hidden(
        &mut self,
        sheet: usize,
        col: u16,
        hidden: Option<HiddenKind>,
    ) -> Result<()> {
        let before = self.sheet(sheet)?.col_hidden_kind(col);
        if before == hidden {
            return Ok(());
        }
        if let Some(ws) = self.workbook.worksheet_mut(sheet) {
            ws.set_col_hidden(col, hidden);
        }
        self.history.record(Command::SetColHidden {
            sheet,
            col,
            before,
            after: hidden,
        });
        Ok(())
    }

    /// Set or clear freeze panes (view state, not undoable)
    pub fn set_freeze_panes(&mut self, sheet: usize, rows: u32, cols: u16) -> Result<()> {
        self.sheet(sheet)?;
        if let Some(ws) = self.workbook.worksheet_mut(sheet) {
            ws.set_freeze_panes(rows, cols);
        }
        Ok(())
    }

    // === Sheet management ===

    /// Append a new worksheet, returning its index
    pub fn add_sheet(&mut self, name: &str) -> Result<usize> {
        self.workbook.add_worksheet(name)
    }

    /// Remove a worksheet. References into it become `#REF!` embedded in
    /// their formulas. Not undoable: both history stacks are cleared.
    pub fn remove_sheet(&mut self, sheet: usize) -> Result<()> {
        if self.workbook.sheet_count() <= 1 {
            return Err(Error::other("cannot remove the last worksheet"));
        }
        let name = self.sheet(sheet)?.name().to_string();
        self.workbook.remove_worksheet(sheet)?;
        self.workbook.purge_names_for_sheet(sheet);

        // Stick #REF! into every formula that named the removed sheet
        let mut rewrites: Vec<(usize, u32, u16, String)> = Vec::new();
        for idx in 0..self.workbook.sheet_count() {
            let Some(ws) = self.workbook.worksheet(idx) else {
                continue;
            };
            for (row, col, text) in ws.formula_cells() {
                if let Ok(ast) = parse_formula(text) {
                    let rewritten = rewrite::sheet_invalidated(&ast, &name);
                    if rewritten.changed {
                        rewrites.push((idx, row, col, rewritten.expr.to_formula_text()));
                    }
                }
            }
        }
        for (idx, row, col, text) in rewrites {
            if let Some(ws) = self.workbook.worksheet_mut(idx) {
                if let Some(cell) = ws.cell_at_mut(row, col) {
                    cell.value = CellValue::formula(text.clone());
                    cell.raw_input = Some(text);
                }
            }
        }

        recalc::rebuild(&self.workbook, &mut self.graph, &mut self.parsed);
        // Snapshots in the log refer to stale sheet indices
        self.history.clear();
        self.recalc_all();
        Ok(())
    }

    // === Undo/redo ===

    /// Undo the most recent command; returns false if there is nothing
    /// to undo
    pub fn undo(&mut self) -> bool {
        let Some(command) = self.history.pop_undo() else {
            return false;
        };
        self.replay(&command, false);
        self.history.push_redo(command);
        true
    }

    /// Redo the most recently undone command; returns false if there is
    /// nothing to redo
    pub fn redo(&mut self) -> bool {
        let Some(command) = self.history.pop_redo() else {
            return false;
        };
        self.replay(&command, true);
        self.history.push_undo(command);
        true
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// The undo/redo log
    pub fn history(&self) -> &History {
        &self.history
    }

    // === Queries ===

    /// A cell's display text, rendered per its number format and the
    /// workbook locale. Empty cells render as ""
    pub fn display_value(&self, sheet: usize, address: &str) -> Result<String> {
        let addr = CellAddress::parse(address)?;
        let ws = self.sheet(sheet)?;
        let Some(cell) = ws.cell_at(addr.row, addr.col) else {
            return Ok(String::new());
        };
        let format = ws.cell_style_at(addr.row, addr.col).number_format.clone();
        Ok(format_value(&cell.value, &format, self.workbook.locale()))
    }

    /// The exact text last entered into a cell, if any
    pub fn raw_input(&self, sheet: usize, address: &str) -> Result<Option<&str>> {
        let addr = CellAddress::parse(address)?;
        let ws = self.sheet(sheet)?;
        Ok(ws
            .cell_at(addr.row, addr.col)
            .and_then(|c| c.raw_input.as_deref()))
    }

    /// The error a cell currently evaluates to, if any
    pub fn cell_error(&self, sheet: usize, address: &str) -> Result<Option<CellError>> {
        let addr = CellAddress::parse(address)?;
        let ws = self.sheet(sheet)?;
        Ok(ws.cell_at(addr.row, addr.col).and_then(|c| c.value.error()))
    }

    /// A cell's typed value (the cached result for formula cells)
    pub fn cell_value(&self, sheet: usize, address: &str) -> Result<CellValue> {
        let addr = CellAddress::parse(address)?;
        Ok(self.sheet(sheet)?.get_value_at(addr.row, addr.col))
    }

    /// Named ranges visible from a sheet, ordered by name
    pub fn named_ranges(&self, sheet: usize) -> Vec<&NamedRange> {
        self.workbook.named_ranges().visible_from(sheet)
    }

    // === Internals ===

    /// Swap a cell to a new state, keeping the parsed cache and
    /// dependency edges in step
    fn install_cell_state(&mut self, key: CellKey, state: Option<&CellData>) {
        self.graph.clear_dependencies(key);
        self.parsed.remove(&key);
        {
            let Some(ws) = self.workbook.worksheet_mut(key.sheet) else {
                return;
            };
            match state {
                None => {
                    ws.clear_cell_at(key.row, key.col);
                }
                Some(data) => {
                    let _ = ws.set_cell_data_at(key.row, key.col, data.clone());
                }
            }
        }
        if let Some(text) = state.and_then(|d| d.value.formula_text()) {
            self.register_formula(key, text);
        }
    }

    fn register_formula(&mut self, key: CellKey, text: &str) {
        match parse_formula(text) {
            Ok(ast) => {
                let targets = recalc::collect_targets(&ast, key.sheet, &self.workbook);
                self.graph.set_dependencies(key, targets);
                self.parsed.insert(key, ast);
            }
            Err(e) => {
                log::warn!(
                    "stored formula failed to parse at sheet {} ({}, {}): {}",
                    key.sheet,
                    key.row,
                    key.col,
                    e
                );
            }
        }
    }

    /// Re-derive dependency edges for every formula reading a defined
    /// name (its resolution may have changed)
    fn refresh_name_dependents(&mut self, name: &str) {
        for key in self.graph.name_dependents(name) {
            if let Some(ast) = self.parsed.get(&key) {
                let targets = recalc::collect_targets(ast, key.sheet, &self.workbook);
                self.graph.set_dependencies(key, targets);
            }
        }
    }

    /// Intern a copy of the current style carrying a suggested number
    /// format, if the cell still shows General
    fn adopt_format(&mut self, sheet: usize, style_index: u32, format: NumberFormat) -> u32 {
        let Some(ws) = self.workbook.worksheet_mut(sheet) else {
            return style_index;
        };
        let current = ws.styles().resolve(style_index).clone();
        if matches!(current.number_format, NumberFormat::General) {
            ws.intern_style(current.with_number_format(format))
        } else {
            style_index
        }
    }

    /// Apply a command's diff in the given direction, then recalculate
    /// under the same contract as a forward edit
    fn replay(&mut self, command: &Command, forward: bool) {
        match command {
            Command::SetCell {
                sheet,
                row,
                col,
                before,
                after,
            } => {
                let state = if forward { after } else { before };
                self.install_cell_state(CellKey::new(*sheet, *row, *col), state.as_ref());
            }
            Command::Paste { sheet, edits } => {
                for edit in edits {
                    let state = if forward { &edit.after } else { &edit.before };
                    self.install_cell_state(
                        CellKey::new(*sheet, edit.row, edit.col),
                        state.as_ref(),
                    );
                }
            }
            Command::Structural { sheet, op, before } => {
                if forward {
                    structural::apply(
                        &mut self.workbook,
                        &mut self.graph,
                        &mut self.parsed,
                        *sheet,
                        *op,
                    );
                } else {
                    structural::restore_snapshot(&mut self.workbook, *sheet, before);
                    recalc::rebuild(&self.workbook, &mut self.graph, &mut self.parsed);
                }
            }
            Command::Merge {
                sheet,
                range,
                displaced,
            } => {
                if forward {
                    for (row, col, _) in displaced {
                        self.install_cell_state(CellKey::new(*sheet, *row, *col), None);
                    }
                    if let Some(ws) = self.workbook.worksheet_mut(*sheet) {
                        let _ = ws.merge_region(*range);
                    }
                } else {
                    if let Some(ws) = self.workbook.worksheet_mut(*sheet) {
                        ws.unmerge_region(range);
                    }
                    for (row, col, data) in displaced {
                        self.install_cell_state(CellKey::new(*sheet, *row, *col), Some(data));
                    }
                }
            }
            Command::Unmerge { sheet, range } => {
                if let Some(ws) = self.workbook.worksheet_mut(*sheet) {
                    if forward {
                        ws.unmerge_region(range);
                    } else {
                        let _ = ws.merge_region(*range);
                    }
                }
            }
            Command::SetRowHidden {
                sheet,
                row,
                before,
                after,
            } => {
                let kind = if forward { *after } else { *before };
                if let Some(ws) = self.workbook.worksheet_mut(*sheet) {
                    ws.set_row_hidden(*row, kind);
                }
            }
            Command::SetColHidden {
                sheet,
                col,
                before,
                after,
            } => {
                let kind = if forward { *after } else { *before };
                if let Some(ws) = self.workbook.worksheet_mut(*sheet) {
                    ws.set_col_hidden(*col, kind);
                }
            }
            Command::SetProtection {
                sheet,
                before,
                after,
            } => {
                let enabled = if forward { *after } else { *before };
                if let Some(ws) = self.workbook.worksheet_mut(*sheet) {
                    ws.set_protection_enabled(enabled);
                }
            }
            Command::SetLocked { sheet, edits } => {
                if let Some(ws) = self.workbook.worksheet_mut(*sheet) {
                    for edit in edits {
                        let idx = if forward { edit.after } else { edit.before };
                        ws.set_cell_style_index_at(edit.row, edit.col, idx);
                    }
                }
            }
            Command::SetComment {
                sheet,
                row,
                col,
                before,
                after,
            } => {
                let state = if forward { after } else { before };
                if let Some(ws) = self.workbook.worksheet_mut(*sheet) {
                    match state {
                        Some(comment) => {
                            ws.set_comment_at(*row, *col, comment.clone());
                        }
                        None => {
                            ws.remove_comment_at(*row, *col);
                        }
                    }
                }
            }
            Command::SetPopup {
                sheet,
                row,
                col,
                before,
                after,
            } => {
                let state = if forward { after } else { before };
                if let Some(ws) = self.workbook.worksheet_mut(*sheet) {
                    match state {
                        Some(popup) => {
                            ws.set_popup_at(*row, *col, popup.clone());
                        }
                        None => {
                            ws.remove_popup_at(*row, *col);
                        }
                    }
                }
            }
            Command::DefineName { before, after } => {
                if forward {
                    let _ = self
                        .workbook
                        .named_ranges_mut()
                        .define_or_replace(after.clone());
                } else {
                    match before {
                        Some(named) => {
                            let _ = self
                                .workbook
                                .named_ranges_mut()
                                .define_or_replace(named.clone());
                        }
                        None => {
                            self.workbook
                                .named_ranges_mut()
                                .remove(&after.name, after.scope);
                        }
                    }
                }
                self.refresh_name_dependents(&after.name);
            }
        }

        match command.affected_cells() {
            Some(seeds) if seeds.is_empty() => {}
            Some(seeds) => self.recalc_from(seeds),
            None => self.recalc_all(),
        }
    }

    fn recalc_from(&mut self, seeds: Vec<CellKey>) {
        recalc::recalculate(&mut self.workbook, &self.graph, &self.parsed, seeds);
    }

    fn recalc_all(&mut self) {
        recalc::recalculate_all(&mut self.workbook, &self.graph, &self.parsed);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Rebase a pasted cell: formulas get their relative references moved,
/// everything else copies as-is
fn rebase_cell(data: &CellData, row_delta: i64, col_delta: i64) -> CellData {
    let Some(text) = data.value.formula_text() else {
        return data.clone();
    };
    match parse_formula(text) {
        Ok(ast) => {
            let text = rewrite::rebase(&ast, row_delta, col_delta).to_formula_text();
            CellData {
                value: CellValue::formula(text.clone()),
                style_index: data.style_index,
                raw_input: Some(text),
            }
        }
        Err(_) => data.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn commands_recalculate_before_returning() {
        let mut engine = Engine::new();
        engine.set_cell_value(0, "A1", "5").unwrap();
        engine.set_cell_value(0, "A2", "=A1*2").unwrap();
        assert_eq!(engine.display_value(0, "A2").unwrap(), "10");

        engine.set_cell_value(0, "A1", "7").unwrap();
        assert_eq!(engine.display_value(0, "A2").unwrap(), "14");
    }

    #[test]
    fn rejected_commands_leave_no_trace() {
        let mut engine = Engine::new();
        engine.set_cell_value(0, "A1", "keep").unwrap();
        let depth = engine.history().undo_depth();

        assert!(engine.set_cell_value(0, "A1", "=1+").is_err());
        assert!(engine.set_cell_value(0, "bogus", "1").is_err());
        assert_eq!(engine.display_value(0, "A1").unwrap(), "keep");
        assert_eq!(engine.history().undo_depth(), depth);
    }

    #[test]
    fn wrapping_a_populated_workbook_calculates_it() {
        let mut workbook = Workbook::new();
        let ws = workbook.worksheet_mut(0).unwrap();
        ws.set_cell_value_at(0, 0, 6.0).unwrap();
        ws.set_cell_value_at(1, 0, CellValue::formula("=A1*7")).unwrap();

        let engine = Engine::with_workbook(workbook);
        assert_eq!(engine.display_value(0, "A2").unwrap(), "42");
    }
}
