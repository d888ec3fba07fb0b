//! Worksheet type

use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::cell::{CellAddress, CellData, CellRange, CellStorage, CellValue};
use crate::comment::{CellComment, PopupAttachment};
use crate::error::{Error, Result};
use crate::style::{Style, StylePool};
use crate::{MAX_COLS, MAX_ROWS};

/// Why a row is hidden.
///
/// SUBTOTAL-driven hides are tracked separately because nested SUBTOTAL
/// aggregation must skip exactly the rows a previous subtotal pass hid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiddenKind {
    /// Hidden by an explicit user action
    Manual,
    /// Hidden by a subtotal/outline pass
    Subtotal,
}

/// Freeze pane settings: the first unfrozen row/column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreezePanes {
    /// Number of frozen rows
    pub rows: u32,
    /// Number of frozen columns
    pub cols: u16,
}

/// Sheet protection policy.
///
/// While enabled, cells whose style carries `locked = true` reject
/// content edits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SheetProtection {
    /// Whether protection is currently active
    pub enabled: bool,
}

/// A single sheet in a workbook
#[derive(Debug)]
pub struct Worksheet {
    /// Sheet name
    name: String,
    /// Sparse cell storage
    cells: CellStorage,
    /// Style pool; cells refer to it by index
    styles: StylePool,
    /// Merged cell regions
    merged_regions: Vec<CellRange>,
    /// Cell comments, keyed by (row, col)
    comments: AHashMap<(u32, u16), CellComment>,
    /// Opaque popup/validation attachments, keyed by (row, col)
    popups: AHashMap<(u32, u16), PopupAttachment>,
    /// Hidden rows and why they are hidden
    hidden_rows: BTreeMap<u32, HiddenKind>,
    /// Hidden columns
    hidden_cols: BTreeMap<u16, HiddenKind>,
    /// Freeze pane settings
    freeze_panes: Option<FreezePanes>,
    /// Protection policy
    protection: SheetProtection,
}

impl Worksheet {
    /// Create a new empty worksheet with the given name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            cells: CellStorage::new(),
            styles: StylePool::new(),
            merged_regions: Vec::new(),
            comments: AHashMap::new(),
            popups: AHashMap::new(),
            hidden_rows: BTreeMap::new(),
            hidden_cols: BTreeMap::new(),
            freeze_panes: None,
            protection: SheetProtection::default(),
        }
    }

    /// Get the sheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the sheet name
    pub fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    // === Cell access ===

    /// Get a cell by address string (e.g. "A1")
    pub fn cell(&self, address: &str) -> Result<Option<&CellData>> {
        let addr = CellAddress::parse(address)?;
        Ok(self.cell_at(addr.row, addr.col))
    }

    /// Get a cell by row and column indices
    pub fn cell_at(&self, row: u32, col: u16) -> Option<&CellData> {
        self.cells.get(row, col)
    }

    /// Get a mutable cell by row and column indices
    pub fn cell_at_mut(&mut self, row: u32, col: u16) -> Option<&mut CellData> {
        self.cells.get_mut(row, col)
    }

    /// Get a cell value by address string
    pub fn get_value(&self, address: &str) -> Result<CellValue> {
        let addr = CellAddress::parse(address)?;
        Ok(self.get_value_at(addr.row, addr.col))
    }

    /// Get a cell value by indices (Empty for vacant cells)
    pub fn get_value_at(&self, row: u32, col: u16) -> CellValue {
        self.cells
            .get(row, col)
            .map(|c| c.value.clone())
            .unwrap_or(CellValue::Empty)
    }

    // === Cell modification ===

    /// Set a cell value by indices
    pub fn set_cell_value_at<V: Into<CellValue>>(&mut self, row: u32, col: u16, value: V) -> Result<()> {
        validate_cell_position(row, col)?;
        self.cells.set_value(row, col, value.into());
        Ok(())
    }

    /// Install complete cell data at a position
    pub fn set_cell_data_at(&mut self, row: u32, col: u16, data: CellData) -> Result<()> {
        validate_cell_position(row, col)?;
        self.cells.set(row, col, data);
        Ok(())
    }

    /// Clear a cell, returning its prior data
    pub fn clear_cell_at(&mut self, row: u32, col: u16) -> Option<CellData> {
        self.cells.remove(row, col)
    }

    // === Styles ===

    /// Get the style pool
    pub fn styles(&self) -> &StylePool {
        &self.styles
    }

    /// Get a cell's style index (0 = default)
    pub fn cell_style_index_at(&self, row: u32, col: u16) -> u32 {
        self.cells.get(row, col).map(|c| c.style_index).unwrap_or(0)
    }

    /// Get the style applied to a cell
    pub fn cell_style_at(&self, row: u32, col: u16) -> &Style {
        self.styles.resolve(self.cell_style_index_at(row, col))
    }

    /// Apply a style to a cell
    pub fn set_cell_style_at(&mut self, row: u32, col: u16, style: Style) -> Result<()> {
        validate_cell_position(row, col)?;
        let idx = self.styles.get_or_insert(style);
        self.cells.set_style(row, col, idx);
        Ok(())
    }

    /// Point a cell at an existing pool index (snapshot restore)
    pub fn set_cell_style_index_at(&mut self, row: u32, col: u16, style_index: u32) {
        self.cells.set_style(row, col, style_index);
    }

    /// Intern a style in the pool without touching any cell
    pub fn intern_style(&mut self, style: Style) -> u32 {
        self.styles.get_or_insert(style)
    }

    /// Check whether a cell rejects edits under active protection
    pub fn is_cell_locked_at(&self, row: u32, col: u16) -> bool {
        self.cell_style_at(row, col).locked
    }

    // === Protection ===

    /// Get the protection policy
    pub fn protection(&self) -> SheetProtection {
        self.protection
    }

    /// Enable or disable sheet protection
    pub fn set_protection_enabled(&mut self, enabled: bool) {
        self.protection.enabled = enabled;
    }

    /// Check whether an edit to the given cell must be rejected
    pub fn edit_blocked_at(&self, row: u32, col: u16) -> bool {
        self.protection.enabled && self.is_cell_locked_at(row, col)
    }

    // === Comments and popups ===

    /// Set a comment on a cell
    pub fn set_comment_at(&mut self, row: u32, col: u16, comment: CellComment) -> Option<CellComment> {
        self.comments.insert((row, col), comment)
    }

    /// Get a comment from a cell
    pub fn comment_at(&self, row: u32, col: u16) -> Option<&CellComment> {
        self.comments.get(&(row, col))
    }

    /// Remove a comment from a cell
    pub fn remove_comment_at(&mut self, row: u32, col: u16) -> Option<CellComment> {
        self.comments.remove(&(row, col))
    }

    /// Iterate over all comments: ((row, col), comment)
    pub fn comments(&self) -> impl Iterator<Item = ((u32, u16), &CellComment)> {
        self.comments.iter().map(|(&k, v)| (k, v))
    }

    /// Attach an opaque popup to a cell
    pub fn set_popup_at(&mut self, row: u32, col: u16, popup: PopupAttachment) -> Option<PopupAttachment> {
        self.popups.insert((row, col), popup)
    }

    /// Get a cell's popup attachment
    pub fn popup_at(&self, row: u32, col: u16) -> Option<&PopupAttachment> {
        self.popups.get(&(row, col))
    }

    /// Remove a cell's popup attachment
    pub fn remove_popup_at(&mut self, row: u32, col: u16) -> Option<PopupAttachment> {
        self.popups.remove(&(row, col))
    }

    /// Iterate over all popup attachments: ((row, col), popup)
    pub fn popups(&self) -> impl Iterator<Item = ((u32, u16), &PopupAttachment)> {
        self.popups.iter().map(|(&k, v)| (k, v))
    }

    // === Merged regions ===

    /// Get all merged regions
    pub fn merged_regions(&self) -> &[CellRange] {
        &self.merged_regions
    }

    /// Replace the merged-region list wholesale (undo restore)
    pub fn set_merged_regions(&mut self, regions: Vec<CellRange>) {
        self.merged_regions = regions;
    }

    /// Register a merged region; rejects overlap with existing regions
    pub fn merge_region(&mut self, range: CellRange) -> Result<()> {
        for existing in &self.merged_regions {
            if range.overlaps(existing) {
                return Err(Error::MergedCellConflict(range.to_a1_string()));
            }
        }
        self.merged_regions.push(range);
        Ok(())
    }

    /// Remove a merged region; returns whether it existed
    pub fn unmerge_region(&mut self, range: &CellRange) -> bool {
        let before = self.merged_regions.len();
        self.merged_regions
            .retain(|r| !(r.start.row == range.start.row
                && r.start.col == range.start.col
                && r.end.row == range.end.row
                && r.end.col == range.end.col));
        self.merged_regions.len() != before
    }

    /// Get the merged region containing a cell, if any
    pub fn merge_containing(&self, row: u32, col: u16) -> Option<&CellRange> {
        self.merged_regions.iter().find(|r| r.contains_cell(row, col))
    }

    /// Get the anchor (top-left) of the merge containing a cell
    pub fn merge_anchor_at(&self, row: u32, col: u16) -> Option<CellAddress> {
        self.merge_containing(row, col).map(|r| r.start)
    }

    // === Hidden rows/columns ===

    /// Hide or unhide a row; `kind` distinguishes subtotal-driven hides
    pub fn set_row_hidden(&mut self, row: u32, hidden: Option<HiddenKind>) -> Option<HiddenKind> {
        match hidden {
            Some(kind) => self.hidden_rows.insert(row, kind),
            None => self.hidden_rows.remove(&row),
        }
    }

    /// Why a row is hidden, if it is
    pub fn row_hidden_kind(&self, row: u32) -> Option<HiddenKind> {
        self.hidden_rows.get(&row).copied()
    }

    /// Check whether a row is hidden for any reason
    pub fn is_row_hidden(&self, row: u32) -> bool {
        self.hidden_rows.contains_key(&row)
    }

    /// Check whether a row was hidden by a subtotal pass
    pub fn is_row_subtotal_hidden(&self, row: u32) -> bool {
        matches!(self.hidden_rows.get(&row), Some(HiddenKind::Subtotal))
    }

    /// Hide or unhide a column
    pub fn set_col_hidden(&mut self, col: u16, hidden: Option<HiddenKind>) -> Option<HiddenKind> {
        match hidden {
            Some(kind) => self.hidden_cols.insert(col, kind),
            None => self.hidden_cols.remove(&col),
        }
    }

    /// Check whether a column is hidden
    pub fn is_col_hidden(&self, col: u16) -> bool {
        self.hidden_cols.contains_key(&col)
    }

    /// Why a column is hidden, if it is
    pub fn col_hidden_kind(&self, col: u16) -> Option<HiddenKind> {
        self.hidden_cols.get(&col).copied()
    }

    /// Iterate over hidden rows: (row, why)
    pub fn hidden_rows(&self) -> impl Iterator<Item = (u32, HiddenKind)> + '_ {
        self.hidden_rows.iter().map(|(&row, &kind)| (row, kind))
    }

    /// Iterate over hidden columns: (col, why)
    pub fn hidden_cols(&self) -> impl Iterator<Item = (u16, HiddenKind)> + '_ {
        self.hidden_cols.iter().map(|(&col, &kind)| (col, kind))
    }

    // === Freeze panes ===

    /// Get freeze pane settings
    pub fn freeze_panes(&self) -> Option<FreezePanes> {
        self.freeze_panes
    }

    /// Set freeze panes; (0, 0) clears them
    pub fn set_freeze_panes(&mut self, rows: u32, cols: u16) {
        self.freeze_panes = if rows == 0 && cols == 0 {
            None
        } else {
            Some(FreezePanes { rows, cols })
        };
    }

    // === Iteration and formula support ===

    /// Bounds of all non-empty cells
    pub fn used_range(&self) -> Option<CellRange> {
        self.cells
            .used_bounds()
            .map(|(min_row, min_col, max_row, max_col)| {
                CellRange::from_indices(min_row, min_col, max_row, max_col)
            })
    }

    /// Number of non-empty cells
    pub fn cell_count(&self) -> usize {
        self.cells.cell_count()
    }

    /// Check if the worksheet holds no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterate over all non-empty cells
    pub fn iter_cells(&self) -> impl Iterator<Item = (u32, u16, &CellData)> {
        self.cells.iter()
    }

    /// Iterate over the cells of a range: (address, data-if-present).
    /// Lazy, finite, and restartable.
    pub fn range_cells<'a>(
        &'a self,
        range: &CellRange,
    ) -> impl Iterator<Item = (CellAddress, Option<&'a CellData>)> + 'a {
        range.cells().map(move |addr| (addr, self.cell_at(addr.row, addr.col)))
    }

    /// Iterate over all formula cells: (row, col, formula text)
    pub fn formula_cells(&self) -> impl Iterator<Item = (u32, u16, &str)> {
        self.cells.iter().filter_map(|(row, col, cell)| {
            cell.value.formula_text().map(|text| (row, col, text))
        })
    }

    /// Get the formula text at a position, if the cell holds a formula
    pub fn formula_text_at(&self, row: u32, col: u16) -> Option<&str> {
        self.cells.get(row, col).and_then(|c| c.value.formula_text())
    }

    /// Store the recalculated result of a formula cell
    pub fn set_formula_cache(&mut self, row: u32, col: u16, value: CellValue) -> Result<()> {
        let cell = self
            .cells
            .get_mut(row, col)
            .ok_or_else(|| Error::other(format!("no cell at ({}, {})", row, col)))?;
        match &mut cell.value {
            CellValue::Formula { cached_value, .. } => {
                *cached_value = Some(Box::new(value));
                Ok(())
            }
            _ => Err(Error::other(format!("cell at ({}, {}) is not a formula", row, col))),
        }
    }

    // === Structural shifts ===
    //
    // These move cells, attachments, merges, and hidden flags together;
    // formula rewriting and undo capture happen in the engine above.

    /// Open a gap of `count` rows at `at`
    pub fn insert_rows(&mut self, at: u32, count: u32) {
        self.cells.insert_rows(at, count);
        self.comments = remap_keys(&mut self.comments, |(row, col)| {
            Some((if row >= at { row + count } else { row }, col))
        });
        self.popups = remap_keys(&mut self.popups, |(row, col)| {
            Some((if row >= at { row + count } else { row }, col))
        });
        self.hidden_rows = shift_btree_insert(&mut self.hidden_rows, at, count);
        for region in &mut self.merged_regions {
            if region.start.row >= at {
                region.start.row += count;
                region.end.row += count;
            } else if region.end.row >= at {
                // Straddling merge grows to include the new rows
                region.end.row += count;
            }
        }
    }

    /// Remove the row band `[at, at + count)`
    pub fn delete_rows(&mut self, at: u32, count: u32) {
        self.cells.delete_rows(at, count);
        self.comments = remap_keys(&mut self.comments, |(row, col)| {
            shift_index_delete(row, at, count).map(|r| (r, col))
        });
        self.popups = remap_keys(&mut self.popups, |(row, col)| {
            shift_index_delete(row, at, count).map(|r| (r, col))
        });
        self.hidden_rows = shift_btree_delete(&mut self.hidden_rows, at, count);
        self.merged_regions.retain_mut(|region| {
            match shift_index_delete(region.start.row, at, count) {
                // Anchor row deleted: the merge collapses
                None => false,
                Some(new_start) => {
                    region.start.row = new_start;
                    region.end.row = match shift_index_delete(region.end.row, at, count) {
                        Some(r) => r,
                        None => at.saturating_sub(1).max(new_start),
                    };
                    region.start.row != region.end.row || region.start.col != region.end.col
                }
            }
        });
    }

    /// Open a gap of `count` columns at `at`
    pub fn insert_cols(&mut self, at: u16, count: u16) {
        self.cells.insert_cols(at, count);
        self.comments = remap_keys(&mut self.comments, |(row, col)| {
            Some((row, if col >= at { col + count } else { col }))
        });
        self.popups = remap_keys(&mut self.popups, |(row, col)| {
            Some((row, if col >= at { col + count } else { col }))
        });
        self.hidden_cols = shift_btree_insert(&mut self.hidden_cols, at, count);
        for region in &mut self.merged_regions {
            if region.start.col >= at {
                region.start.col += count;
                region.end.col += count;
            } else if region.end.col >= at {
                region.end.col += count;
            }
        }
    }

    /// Remove the column band `[at, at + count)`
    pub fn delete_cols(&mut self, at: u16, count: u16) {
        self.cells.delete_cols(at, count);
        self.comments = remap_keys(&mut self.comments, |(row, col)| {
            shift_index_delete(col, at, count).map(|c| (row, c))
        });
        self.popups = remap_keys(&mut self.popups, |(row, col)| {
            shift_index_delete(col, at, count).map(|c| (row, c))
        });
        self.hidden_cols = shift_btree_delete(&mut self.hidden_cols, at, count);
        self.merged_regions.retain_mut(|region| {
            match shift_index_delete(region.start.col, at, count) {
                None => false,
                Some(new_start) => {
                    region.start.col = new_start;
                    region.end.col = match shift_index_delete(region.end.col, at, count) {
                        Some(c) => c,
                        None => at.saturating_sub(1).max(new_start),
                    };
                    region.start.row != region.end.row || region.start.col != region.end.col
                }
            }
        });
    }
}

/// New index for `idx` after deleting `[at, at + count)`; None if `idx`
/// was inside the deleted band.
fn shift_index_delete<T>(idx: T, at: T, count: T) -> Option<T>
where
    T: Copy + PartialOrd + std::ops::Add<Output = T> + std::ops::Sub<Output = T>,
{
    if idx < at {
        Some(idx)
    } else if idx < at + count {
        None
    } else {
        Some(idx - count)
    }
}

fn remap_keys<V>(
    map: &mut AHashMap<(u32, u16), V>,
    f: impl Fn((u32, u16)) -> Option<(u32, u16)>,
) -> AHashMap<(u32, u16), V> {
    map.drain()
        .filter_map(|(key, value)| f(key).map(|new_key| (new_key, value)))
        .collect()
}

fn shift_btree_insert<K, V>(map: &mut BTreeMap<K, V>, at: K, count: K) -> BTreeMap<K, V>
where
    K: Copy + Ord + std::ops::Add<Output = K>,
    V: Copy,
{
    std::mem::take(map)
        .into_iter()
        .map(|(k, v)| (if k >= at { k + count } else { k }, v))
        .collect()
}

fn shift_btree_delete<K, V>(map: &mut BTreeMap<K, V>, at: K, count: K) -> BTreeMap<K, V>
where
    K: Copy + Ord + std::ops::Add<Output = K> + std::ops::Sub<Output = K>,
    V: Copy,
{
    std::mem::take(map)
        .into_iter()
        .filter_map(|(k, v)| shift_index_delete(k, at, count).map(|nk| (nk, v)))
        .collect()
}

fn validate_cell_position(row: u32, col: u16) -> Result<()> {
    if row >= MAX_ROWS {
        return Err(Error::RowOutOfBounds(row, MAX_ROWS - 1));
    }
    if col >= MAX_COLS {
        return Err(Error::ColumnOutOfBounds(col, MAX_COLS - 1));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cell_round_trip() {
        let mut ws = Worksheet::new("Data");
        ws.set_cell_value_at(0, 0, "Hello").unwrap();
        ws.set_cell_value_at(0, 1, 42.0).unwrap();

        assert_eq!(ws.get_value("A1").unwrap().as_str(), Some("Hello"));
        assert_eq!(ws.get_value("B1").unwrap().as_number(), Some(42.0));
        assert!(ws.get_value("C9").unwrap().is_empty());
        assert!(ws.set_cell_value_at(MAX_ROWS, 0, 1.0).is_err());
    }

    #[test]
    fn protection_honors_lock_flags() {
        let mut ws = Worksheet::new("Guarded");
        ws.set_cell_value_at(1, 1, 1.0).unwrap();
        ws.set_cell_value_at(1, 2, 2.0).unwrap();
        ws.set_cell_style_at(1, 2, Style::new().with_locked(false)).unwrap();

        // Protection inactive: nothing is blocked
        assert!(!ws.edit_blocked_at(1, 1));

        ws.set_protection_enabled(true);
        assert!(ws.edit_blocked_at(1, 1));
        assert!(!ws.edit_blocked_at(1, 2));
    }

    #[test]
    fn merge_bookkeeping() {
        let mut ws = Worksheet::new("M");
        let range = CellRange::parse("A1:B2").unwrap();
        ws.merge_region(range).unwrap();

        assert!(ws.merge_region(CellRange::parse("B2:C3").unwrap()).is_err());
        assert_eq!(ws.merge_anchor_at(1, 1).unwrap().to_a1_string(), "A1");
        assert!(ws.merge_anchor_at(4, 4).is_none());

        assert!(ws.unmerge_region(&range));
        assert!(!ws.unmerge_region(&range));
    }

    #[test]
    fn insert_rows_moves_attachments_and_merges() {
        let mut ws = Worksheet::new("S");
        ws.set_cell_value_at(2, 0, 1.0).unwrap();
        ws.set_comment_at(2, 0, CellComment::text_only("note"));
        ws.set_popup_at(2, 0, PopupAttachment::new("picker", "{}"));
        ws.set_row_hidden(2, Some(HiddenKind::Manual));
        ws.merge_region(CellRange::parse("A3:B3").unwrap()).unwrap();

        ws.insert_rows(1, 2);

        assert_eq!(ws.get_value_at(4, 0).as_number(), Some(1.0));
        assert!(ws.comment_at(4, 0).is_some());
        assert!(ws.comment_at(2, 0).is_none());
        assert!(ws.popup_at(4, 0).is_some());
        assert!(ws.is_row_hidden(4));
        assert!(!ws.is_row_hidden(2));
        assert_eq!(ws.merged_regions()[0].to_a1_string(), "A5:B5");
    }

    #[test]
    fn straddled_merge_grows_on_insert() {
        let mut ws = Worksheet::new("S");
        ws.merge_region(CellRange::parse("A1:A4").unwrap()).unwrap();
        ws.insert_rows(2, 1);
        assert_eq!(ws.merged_regions()[0].to_a1_string(), "A1:A5");
    }

    #[test]
    fn delete_rows_collapses_anchored_merge() {
        let mut ws = Worksheet::new("S");
        ws.merge_region(CellRange::parse("A2:B3").unwrap()).unwrap();
        ws.merge_region(CellRange::parse("D5:E6").unwrap()).unwrap();

        // Deleting the anchor row removes the first merge entirely
        ws.delete_rows(1, 1);
        assert_eq!(ws.merged_regions().len(), 1);
        assert_eq!(ws.merged_regions()[0].to_a1_string(), "D4:E5");
    }

    #[test]
    fn delete_rows_shrinks_straddling_merge() {
        let mut ws = Worksheet::new("S");
        ws.merge_region(CellRange::parse("A1:A4").unwrap()).unwrap();
        ws.delete_rows(2, 1);
        assert_eq!(ws.merged_regions()[0].to_a1_string(), "A1:A3");
    }

    #[test]
    fn delete_rows_drops_band_attachments() {
        let mut ws = Worksheet::new("S");
        ws.set_comment_at(1, 0, CellComment::text_only("gone"));
        ws.set_comment_at(3, 0, CellComment::text_only("stays"));
        ws.set_row_hidden(1, Some(HiddenKind::Subtotal));

        ws.delete_rows(1, 1);

        assert!(ws.comment_at(1, 0).is_none());
        assert_eq!(ws.comment_at(2, 0).unwrap().text, "stays");
        assert!(!ws.is_row_hidden(1));
    }

    #[test]
    fn column_shifts() {
        let mut ws = Worksheet::new("S");
        ws.set_cell_value_at(0, 1, 5.0).unwrap();
        ws.set_popup_at(0, 1, PopupAttachment::new("v", "x"));
        ws.merge_region(CellRange::parse("B1:C1").unwrap()).unwrap();

        ws.insert_cols(1, 1);
        assert_eq!(ws.get_value_at(0, 2).as_number(), Some(5.0));
        assert!(ws.popup_at(0, 2).is_some());
        assert_eq!(ws.merged_regions()[0].to_a1_string(), "C1:D1");

        ws.delete_cols(2, 2);
        // Anchor column deleted: value, popup, and merge are gone
        assert!(ws.cell_at(0, 2).is_none());
        assert!(ws.popups().next().is_none());
        assert!(ws.merged_regions().is_empty());
    }

    #[test]
    fn subtotal_hidden_rows_are_distinguished() {
        let mut ws = Worksheet::new("S");
        ws.set_row_hidden(3, Some(HiddenKind::Manual));
        ws.set_row_hidden(4, Some(HiddenKind::Subtotal));

        assert!(ws.is_row_hidden(3) && ws.is_row_hidden(4));
        assert!(!ws.is_row_subtotal_hidden(3));
        assert!(ws.is_row_subtotal_hidden(4));
    }

    #[test]
    fn formula_cache_round_trip() {
        let mut ws = Worksheet::new("F");
        ws.set_cell_value_at(0, 0, CellValue::formula("=1+1")).unwrap();
        ws.set_formula_cache(0, 0, CellValue::Number(2.0)).unwrap();
        assert_eq!(ws.get_value_at(0, 0).as_number(), Some(2.0));

        ws.set_cell_value_at(0, 1, 7.0).unwrap();
        assert!(ws.set_formula_cache(0, 1, CellValue::Number(0.0)).is_err());
        assert!(ws.set_formula_cache(5, 5, CellValue::Number(0.0)).is_err());
    }
}
