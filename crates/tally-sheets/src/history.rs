//! Undo/redo history
//!
//! Commands are explicit snapshot diffs, not closures: each variant
//! carries the before/after state it needs to replay in either
//! direction, which keeps the log inspectable. The engine owns the
//! actual application of a command to the workbook.

use tally_sheets_core::{
    CellComment, CellData, CellRange, HiddenKind, NamedRange, PopupAttachment,
};
use tally_sheets_formula::CellKey;

/// One cell's before/after state inside a compound edit
#[derive(Debug, Clone, PartialEq)]
pub struct CellEdit {
    pub row: u32,
    pub col: u16,
    /// Cell state before the edit (`None` = vacant)
    pub before: Option<CellData>,
    /// Cell state after the edit
    pub after: Option<CellData>,
}

/// One cell's before/after style index inside a lock/format edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleEdit {
    pub row: u32,
    pub col: u16,
    pub before: u32,
    pub after: u32,
}

/// A structural row/column mutation, replayable forward for redo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralOp {
    InsertRows { at: u32, count: u32 },
    DeleteRows { at: u32, count: u32 },
    InsertCols { at: u16, count: u16 },
    DeleteCols { at: u16, count: u16 },
}

/// Full pre-mutation state needed to undo a structural edit.
///
/// Reference rewriting is not inverted formula-by-formula; undo restores
/// the mutated sheet wholesale plus every formula cell elsewhere whose
/// text the rewrite touched (captured before the mutation ran).
#[derive(Debug, Clone, Default)]
pub struct StructuralSnapshot {
    /// Every cell of the mutated sheet
    pub cells: Vec<(u32, u16, CellData)>,
    pub comments: Vec<(u32, u16, CellComment)>,
    pub popups: Vec<(u32, u16, PopupAttachment)>,
    pub merged_regions: Vec<CellRange>,
    pub hidden_rows: Vec<(u32, HiddenKind)>,
    pub hidden_cols: Vec<(u16, HiddenKind)>,
    /// The whole named-range collection (shifts can move or drop names)
    pub named_ranges: Vec<NamedRange>,
    /// Formula cells on other sheets, pre-rewrite
    pub foreign_formulas: Vec<(CellKey, CellData)>,
}

/// A reversible edit command
#[derive(Debug, Clone)]
pub enum Command {
    SetCell {
        sheet: usize,
        row: u32,
        col: u16,
        before: Option<CellData>,
        after: Option<CellData>,
    },
    /// Compound paste: one entry per destination cell, undone atomically
    Paste { sheet: usize, edits: Vec<CellEdit> },
    Structural {
        sheet: usize,
        op: StructuralOp,
        before: StructuralSnapshot,
    },
    Merge {
        sheet: usize,
        range: CellRange,
        /// Non-anchor cells blanked by the merge, for exact restore
        displaced: Vec<(u32, u16, CellData)>,
    },
    Unmerge { sheet: usize, range: CellRange },
    SetRowHidden {
        sheet: usize,
        row: u32,
        before: Option<HiddenKind>,
        after: Option<HiddenKind>,
    },
    SetColHidden {
        sheet: usize,
        col: u16,
        before: Option<HiddenKind>,
        after: Option<HiddenKind>,
    },
    SetProtection { sheet: usize, before: bool, after: bool },
    SetLocked { sheet: usize, edits: Vec<StyleEdit> },
    SetComment {
        sheet: usize,
        row: u32,
        col: u16,
        before: Option<CellComment>,
        after: Option<CellComment>,
    },
    SetPopup {
        sheet: usize,
        row: u32,
        col: u16,
        before: Option<PopupAttachment>,
        after: Option<PopupAttachment>,
    },
    DefineName {
        before: Option<NamedRange>,
        after: NamedRange,
    },
}

impl Command {
    /// Cells this command writes directly, used to seed recalculation.
    /// `None` means the effect is not cell-local (structural mutation,
    /// row visibility) and the caller recalculates everything.
    pub fn affected_cells(&self) -> Option<Vec<CellKey>> {
        match self {
            Command::SetCell { sheet, row, col, .. } => {
                Some(vec![CellKey::new(*sheet, *row, *col)])
            }
            Command::Paste { sheet, edits } => Some(
                edits
                    .iter()
                    .map(|e| CellKey::new(*sheet, e.row, e.col))
                    .collect(),
            ),
            Command::Merge { sheet, range, .. } => Some(
                range
                    .cells()
                    .map(|addr| CellKey::new(*sheet, addr.row, addr.col))
                    .collect(),
            ),
            Command::Unmerge { .. }
            | Command::SetProtection { .. }
            | Command::SetLocked { .. }
            | Command::SetComment { .. }
            | Command::SetPopup { .. }
            | Command::SetColHidden { .. } => Some(Vec::new()),
            Command::Structural { .. }
            | Command::SetRowHidden { .. }
            | Command::DefineName { .. } => None,
        }
    }

    /// Short human-readable label, for history inspection
    pub fn describe(&self) -> String {
        match self {
            Command::SetCell { row, col, .. } => {
                format!("edit {}", cell_label(*row, *col))
            }
            Command::Paste { edits, .. } => format!("paste {} cells", edits.len()),
            Command::Structural { op, .. } => match op {
                StructuralOp::InsertRows { count, .. } => format!("insert {} row(s)", count),
                StructuralOp::DeleteRows { count, .. } => format!("delete {} row(s)", count),
                StructuralOp::InsertCols { count, .. } => format!("insert {} column(s)", count),
                StructuralOp::DeleteCols { count, .. } => format!("delete {} column(s)", count),
            },
            Command::Merge { range, .. } => format!("merge {}", range.to_a1_string()),
            Command::Unmerge { range, .. } => format!("unmerge {}", range.to_a1_string()),
            Command::SetRowHidden { row, after, .. } => match after {
                Some(_) => format!("hide row {}", row + 1),
                None => format!("unhide row {}", row + 1),
            },
            Command::SetColHidden { col, after, .. } => match after {
                Some(_) => format!("hide column {}", col_label(*col)),
                None => format!("unhide column {}", col_label(*col)),
            },
            Command::SetProtection { after, .. } => {
                if *after { "protect sheet".into() } else { "unprotect sheet".into() }
            }
            Command::SetLocked { edits, .. } => format!("lock change on {} cells", edits.len()),
            Command::SetComment { row, col, after, .. } => match after {
                Some(_) => format!("comment {}", cell_label(*row, *col)),
                None => format!("remove comment {}", cell_label(*row, *col)),
            },
            Command::SetPopup { row, col, after, .. } => match after {
                Some(_) => format!("attach popup {}", cell_label(*row, *col)),
                None => format!("remove popup {}", cell_label(*row, *col)),
            },
            Command::DefineName { after, .. } => format!("define name {}", after.name),
        }
    }
}

fn cell_label(row: u32, col: u16) -> String {
    tally_sheets_core::CellAddress::new(row, col).to_a1_string()
}

fn col_label(col: u16) -> String {
    tally_sheets_core::CellAddress::col_to_letters(col)
}

/// Bounded undo/redo stacks.
///
/// Any newly recorded command clears the redo stack; beyond `max_depth`
/// the oldest undo entry is dropped.
#[derive(Debug)]
pub struct History {
    undo: Vec<Command>,
    redo: Vec<Command>,
    max_depth: usize,
}

/// Default number of retained undo steps
pub const DEFAULT_HISTORY_DEPTH: usize = 100;

impl History {
    /// Create a history retaining up to `max_depth` undo steps
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            max_depth,
        }
    }

    /// Record an executed command; clears the redo stack
    pub fn record(&mut self, command: Command) {
        self.redo.clear();
        self.undo.push(command);
        if self.undo.len() > self.max_depth {
            self.undo.remove(0);
        }
    }

    /// Pop the most recent undoable command
    pub fn pop_undo(&mut self) -> Option<Command> {
        self.undo.pop()
    }

    /// Push an undone command onto the redo stack
    pub fn push_redo(&mut self, command: Command) {
        self.redo.push(command);
    }

    /// Pop the most recent redoable command
    pub fn pop_redo(&mut self) -> Option<Command> {
        self.redo.pop()
    }

    /// Push a redone command back onto the undo stack
    pub fn push_undo(&mut self, command: Command) {
        self.undo.push(command);
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Label of the command an undo would revert
    pub fn undo_description(&self) -> Option<String> {
        self.undo.last().map(Command::describe)
    }

    /// Label of the command a redo would reapply
    pub fn redo_description(&self) -> Option<String> {
        self.redo.last().map(Command::describe)
    }

    /// Number of undoable commands
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Number of redoable commands
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Drop all history
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set_cell(row: u32) -> Command {
        Command::SetCell {
            sheet: 0,
            row,
            col: 0,
            before: None,
            after: None,
        }
    }

    #[test]
    fn record_pushes_and_clears_redo() {
        let mut history = History::new(10);
        history.record(set_cell(0));
        history.record(set_cell(1));
        assert!(history.can_undo());
        assert!(!history.can_redo());

        let cmd = history.pop_undo().unwrap();
        history.push_redo(cmd);
        assert!(history.can_redo());

        // A new command invalidates the redo stack
        history.record(set_cell(2));
        assert!(!history.can_redo());
        assert_eq!(history.undo_depth(), 2);
    }

    #[test]
    fn depth_is_bounded() {
        let mut history = History::new(3);
        for row in 0..5 {
            history.record(set_cell(row));
        }
        assert_eq!(history.undo_depth(), 3);
        // The oldest entries were dropped; the newest survive
        match history.pop_undo().unwrap() {
            Command::SetCell { row, .. } => assert_eq!(row, 4),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn descriptions_name_the_edit() {
        assert_eq!(set_cell(0).describe(), "edit A1");
        let merge = Command::Merge {
            sheet: 0,
            range: CellRange::parse("A1:B2").unwrap(),
            displaced: Vec::new(),
        };
        assert_eq!(merge.describe(), "merge A1:B2");
    }

    #[test]
    fn affected_cells_cover_compound_edits() {
        let paste = Command::Paste {
            sheet: 0,
            edits: vec![
                CellEdit { row: 0, col: 0, before: None, after: None },
                CellEdit { row: 0, col: 1, before: None, after: None },
            ],
        };
        assert_eq!(paste.affected_cells().unwrap().len(), 2);

        let structural = Command::Structural {
            sheet: 0,
            op: StructuralOp::InsertRows { at: 0, count: 1 },
            before: StructuralSnapshot::default(),
        };
        assert!(structural.affected_cells().is_none());
    }
}
