//! Dependency tracking for incremental recalculation
//!
//! The graph stores edges from precedents to dependent formula cells.
//! A range reference is ONE edge from the formula to a synthetic range
//! node; membership of a changed cell in a range is resolved when the
//! dirty closure is computed. Structural mutation shifts node
//! coordinates and range bounds in place instead of rebuilding edges
//! cell by cell.

use ahash::{AHashMap, AHashSet};
use tally_sheets_core::CellRange;

/// Unique key for a cell (sheet index + coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub sheet: usize,
    pub row: u32,
    pub col: u16,
}

impl CellKey {
    /// Create a new cell key
    pub fn new(sheet: usize, row: u32, col: u16) -> Self {
        Self { sheet, row, col }
    }
}

/// Synthetic node for a range reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeKey {
    pub sheet: usize,
    pub start_row: u32,
    pub start_col: u16,
    pub end_row: u32,
    pub end_col: u16,
}

impl RangeKey {
    /// Build a range node key from a sheet and range (absolute flags are
    /// irrelevant to dependency identity and are dropped)
    pub fn new(sheet: usize, range: &CellRange) -> Self {
        Self {
            sheet,
            start_row: range.start.row,
            start_col: range.start.col,
            end_row: range.end.row,
            end_col: range.end.col,
        }
    }

    fn contains(&self, key: CellKey) -> bool {
        key.sheet == self.sheet
            && key.row >= self.start_row
            && key.row <= self.end_row
            && key.col >= self.start_col
            && key.col <= self.end_col
    }
}

/// One reference a formula holds
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceTarget {
    /// Direct cell reference
    Cell(CellKey),
    /// Range reference (a single edge to a range node)
    Range(RangeKey),
    /// Defined-name reference, tracked so redefinition can refresh the
    /// dependent's edges; ordering uses the resolved Cell/Range targets
    /// registered alongside it
    Name(String),
}

/// A structural row/column shift
#[derive(Debug, Clone, Copy)]
pub enum ShiftOp {
    /// Insert `count` rows/columns at `at`
    Insert { at: u32, count: u32 },
    /// Delete the band `[at, at + count)`
    Delete { at: u32, count: u32 },
}

impl ShiftOp {
    /// New index after the shift; None if the index was deleted
    pub fn apply(&self, idx: u32) -> Option<u32> {
        match *self {
            ShiftOp::Insert { at, count } => {
                Some(if idx >= at { idx + count } else { idx })
            }
            ShiftOp::Delete { at, count } => {
                if idx < at {
                    Some(idx)
                } else if idx < at + count {
                    None
                } else {
                    Some(idx - count)
                }
            }
        }
    }

    /// New (start, end) for an interval; None if fully deleted. A
    /// straddled interval grows on insert and shrinks on delete.
    pub fn apply_span(&self, start: u32, end: u32) -> Option<(u32, u32)> {
        match *self {
            ShiftOp::Insert { at, count } => {
                if start >= at {
                    Some((start + count, end + count))
                } else if end >= at {
                    Some((start, end + count))
                } else {
                    Some((start, end))
                }
            }
            ShiftOp::Delete { at, count } => {
                let new_start = match self.apply(start) {
                    Some(s) => s,
                    None => {
                        if end < at + count {
                            return None; // whole span inside the band
                        }
                        at
                    }
                };
                let new_end = match self.apply(end) {
                    Some(e) => e,
                    None => at.saturating_sub(1),
                };
                if new_end < new_start {
                    None
                } else {
                    Some((new_start, new_end))
                }
            }
        }
    }
}

/// Dependency graph over formula cells
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Precedent cell -> formulas reading it directly
    cell_dependents: AHashMap<CellKey, AHashSet<CellKey>>,
    /// Range node -> formulas reading the range
    range_dependents: AHashMap<RangeKey, AHashSet<CellKey>>,
    /// Defined name (lowercase) -> formulas referencing it
    name_dependents: AHashMap<String, AHashSet<CellKey>>,
    /// Formula cell -> its registered targets
    precedents: AHashMap<CellKey, Vec<ReferenceTarget>>,
}

impl DependencyGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all outgoing edges of `cell` with `targets`
    pub fn set_dependencies(&mut self, cell: CellKey, targets: Vec<ReferenceTarget>) {
        self.clear_dependencies(cell);
        for target in &targets {
            match target {
                ReferenceTarget::Cell(key) => {
                    self.cell_dependents.entry(*key).or_default().insert(cell);
                }
                ReferenceTarget::Range(key) => {
                    self.range_dependents.entry(*key).or_default().insert(cell);
                }
                ReferenceTarget::Name(name) => {
                    self.name_dependents
                        .entry(name.to_lowercase())
                        .or_default()
                        .insert(cell);
                }
            }
        }
        if targets.is_empty() {
            self.precedents.remove(&cell);
        } else {
            self.precedents.insert(cell, targets);
        }
    }

    /// Remove all outgoing edges of `cell`
    pub fn clear_dependencies(&mut self, cell: CellKey) {
        let Some(targets) = self.precedents.remove(&cell) else {
            return;
        };
        for target in targets {
            match target {
                ReferenceTarget::Cell(key) => {
                    if let Some(deps) = self.cell_dependents.get_mut(&key) {
                        deps.remove(&cell);
                        if deps.is_empty() {
                            self.cell_dependents.remove(&key);
                        }
                    }
                }
                ReferenceTarget::Range(key) => {
                    if let Some(deps) = self.range_dependents.get_mut(&key) {
                        deps.remove(&cell);
                        if deps.is_empty() {
                            self.range_dependents.remove(&key);
                        }
                    }
                }
                ReferenceTarget::Name(name) => {
                    let key = name.to_lowercase();
                    if let Some(deps) = self.name_dependents.get_mut(&key) {
                        deps.remove(&cell);
                        if deps.is_empty() {
                            self.name_dependents.remove(&key);
                        }
                    }
                }
            }
        }
    }

    /// All formula cells registered in the graph
    pub fn formula_cells(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.precedents.keys().copied()
    }

    /// Formulas that reference a defined name
    pub fn name_dependents(&self, name: &str) -> Vec<CellKey> {
        self.name_dependents
            .get(&name.to_lowercase())
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Direct dependents of a cell: formulas reading it directly plus
    /// formulas reading any range node containing it
    fn direct_dependents(&self, key: CellKey, out: &mut AHashSet<CellKey>) {
        if let Some(deps) = self.cell_dependents.get(&key) {
            out.extend(deps.iter().copied());
        }
        for (range, deps) in &self.range_dependents {
            if range.contains(key) {
                out.extend(deps.iter().copied());
            }
        }
    }

    /// Transitive closure of dependents of `seeds` (seeds included)
    pub fn dirty_closure(&self, seeds: impl IntoIterator<Item = CellKey>) -> AHashSet<CellKey> {
        let mut closure: AHashSet<CellKey> = seeds.into_iter().collect();
        let mut queue: Vec<CellKey> = closure.iter().copied().collect();
        while let Some(key) = queue.pop() {
            let mut next = AHashSet::new();
            self.direct_dependents(key, &mut next);
            for dep in next {
                if closure.insert(dep) {
                    queue.push(dep);
                }
            }
        }
        closure
    }

    /// Precedent formula cells of `cell` restricted to `within`
    fn dirty_precedents(&self, cell: CellKey, within: &AHashSet<CellKey>) -> AHashSet<CellKey> {
        let mut out = AHashSet::new();
        let Some(targets) = self.precedents.get(&cell) else {
            return out;
        };
        for target in targets {
            match target {
                ReferenceTarget::Cell(key) => {
                    if within.contains(key) {
                        out.insert(*key);
                    }
                }
                ReferenceTarget::Range(range) => {
                    for &candidate in within {
                        if range.contains(candidate) {
                            out.insert(candidate);
                        }
                    }
                }
                ReferenceTarget::Name(_) => {}
            }
        }
        out.remove(&cell);
        out
    }

    /// Topologically order the dirty formula cells with Kahn's algorithm.
    ///
    /// Returns (evaluation order, cells on cycles). Cycle members are
    /// excluded from the order; cells downstream of a cycle still come
    /// out ordered, so they evaluate against the cached circular error
    /// and propagate (or tolerate) it like any other error value.
    pub fn recalc_order(&self, dirty: &AHashSet<CellKey>) -> (Vec<CellKey>, Vec<CellKey>) {
        let (order, leftover) = self.kahn(dirty, &AHashSet::new());
        if leftover.is_empty() {
            return (order, Vec::new());
        }

        // Leftover nodes are cycle members plus cells blocked behind
        // them. A node is on a cycle iff it can reach itself within the
        // leftover subgraph.
        let mut cycles = AHashSet::new();
        for &start in &leftover {
            let mut stack = vec![start];
            let mut seen = AHashSet::new();
            'search: while let Some(node) = stack.pop() {
                for precedent in self.dirty_precedents(node, &leftover) {
                    if precedent == start {
                        cycles.insert(start);
                        break 'search;
                    }
                    if seen.insert(precedent) {
                        stack.push(precedent);
                    }
                }
            }
        }

        // Re-run the sort with cycle members pinned (their caches get
        // the circular error before evaluation starts)
        let (order, _) = self.kahn(dirty, &cycles);
        let mut cycles: Vec<CellKey> = cycles.into_iter().collect();
        cycles.sort_by_key(|k| (k.sheet, k.row, k.col));
        (order, cycles)
    }

    /// Kahn's algorithm over `dirty`, treating `pinned` nodes as already
    /// resolved. Returns (order, unorderable leftover).
    fn kahn(
        &self,
        dirty: &AHashSet<CellKey>,
        pinned: &AHashSet<CellKey>,
    ) -> (Vec<CellKey>, AHashSet<CellKey>) {
        let mut in_degree: AHashMap<CellKey, usize> = AHashMap::new();
        let mut downstream: AHashMap<CellKey, Vec<CellKey>> = AHashMap::new();

        for &cell in dirty {
            if pinned.contains(&cell) {
                continue;
            }
            let precedents: Vec<CellKey> = self
                .dirty_precedents(cell, dirty)
                .into_iter()
                .filter(|p| !pinned.contains(p))
                .collect();
            in_degree.insert(cell, precedents.len());
            for precedent in precedents {
                downstream.entry(precedent).or_default().push(cell);
            }
        }

        let mut ready: Vec<CellKey> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&cell, _)| cell)
            .collect();
        // Deterministic order for ties
        ready.sort_by_key(|k| (k.sheet, k.row, k.col));

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(cell) = ready.pop() {
            order.push(cell);
            if let Some(dependents) = downstream.get(&cell) {
                for &dep in dependents {
                    if let Some(deg) = in_degree.get_mut(&dep) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.push(dep);
                        }
                    }
                }
            }
        }

        let leftover: AHashSet<CellKey> = in_degree
            .into_iter()
            .map(|(cell, _)| cell)
            .filter(|cell| !order.contains(cell))
            .collect();
        (order, leftover)
    }

    // === Structural shifts ===

    /// Shift row coordinates on `sheet`; range-node bounds stretch or
    /// shrink in place
    pub fn shift_rows(&mut self, sheet: usize, op: ShiftOp) {
        self.remap(
            |key| {
                if key.sheet != sheet {
                    return Some(key);
                }
                op.apply(key.row).map(|row| CellKey { row, ..key })
            },
            |range| {
                if range.sheet != sheet {
                    return Some(range);
                }
                op.apply_span(range.start_row, range.end_row)
                    .map(|(start_row, end_row)| RangeKey {
                        start_row,
                        end_row,
                        ..range
                    })
            },
        );
    }

    /// Shift column coordinates on `sheet`
    pub fn shift_cols(&mut self, sheet: usize, op: ShiftOp) {
        self.remap(
            |key| {
                if key.sheet != sheet {
                    return Some(key);
                }
                op.apply(key.col as u32).map(|col| CellKey {
                    col: col as u16,
                    ..key
                })
            },
            |range| {
                if range.sheet != sheet {
                    return Some(range);
                }
                op.apply_span(range.start_col as u32, range.end_col as u32)
                    .map(|(start, end)| RangeKey {
                        start_col: start as u16,
                        end_col: end as u16,
                        ..range
                    })
            },
        );
    }

    /// Drop all nodes on a removed sheet and renumber the sheets above it
    pub fn remove_sheet(&mut self, removed: usize) {
        self.remap(
            |key| {
                if key.sheet == removed {
                    None
                } else if key.sheet > removed {
                    Some(CellKey { sheet: key.sheet - 1, ..key })
                } else {
                    Some(key)
                }
            },
            |range| {
                if range.sheet == removed {
                    None
                } else if range.sheet > removed {
                    Some(RangeKey { sheet: range.sheet - 1, ..range })
                } else {
                    Some(range)
                }
            },
        );
    }

    fn remap(
        &mut self,
        map_cell: impl Fn(CellKey) -> Option<CellKey>,
        map_range: impl Fn(RangeKey) -> Option<RangeKey>,
    ) {
        let map_set = |set: AHashSet<CellKey>| -> AHashSet<CellKey> {
            set.into_iter().filter_map(&map_cell).collect()
        };

        self.cell_dependents = std::mem::take(&mut self.cell_dependents)
            .into_iter()
            .filter_map(|(key, deps)| {
                let key = map_cell(key)?;
                let deps = map_set(deps);
                (!deps.is_empty()).then_some((key, deps))
            })
            .collect();

        self.range_dependents = std::mem::take(&mut self.range_dependents)
            .into_iter()
            .filter_map(|(key, deps)| {
                let key = map_range(key)?;
                let deps = map_set(deps);
                (!deps.is_empty()).then_some((key, deps))
            })
            .collect();

        self.name_dependents = std::mem::take(&mut self.name_dependents)
            .into_iter()
            .filter_map(|(name, deps)| {
                let deps = map_set(deps);
                (!deps.is_empty()).then_some((name, deps))
            })
            .collect();

        self.precedents = std::mem::take(&mut self.precedents)
            .into_iter()
            .filter_map(|(cell, targets)| {
                let cell = map_cell(cell)?;
                let targets = targets
                    .into_iter()
                    .filter_map(|target| match target {
                        ReferenceTarget::Cell(key) => map_cell(key).map(ReferenceTarget::Cell),
                        ReferenceTarget::Range(key) => map_range(key).map(ReferenceTarget::Range),
                        ReferenceTarget::Name(name) => Some(ReferenceTarget::Name(name)),
                    })
                    .collect();
                Some((cell, targets))
            })
            .collect();
    }

    /// Clear the entire graph
    pub fn clear(&mut self) {
        self.cell_dependents.clear();
        self.range_dependents.clear();
        self.name_dependents.clear();
        self.precedents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(row: u32, col: u16) -> CellKey {
        CellKey::new(0, row, col)
    }

    fn range(start_row: u32, start_col: u16, end_row: u32, end_col: u16) -> RangeKey {
        RangeKey {
            sheet: 0,
            start_row,
            start_col,
            end_row,
            end_col,
        }
    }

    #[test]
    fn closure_follows_cell_edges() {
        let mut graph = DependencyGraph::new();
        let a1 = key(0, 0);
        let b1 = key(0, 1);
        let c1 = key(0, 2);

        // B1 = A1, C1 = B1
        graph.set_dependencies(b1, vec![ReferenceTarget::Cell(a1)]);
        graph.set_dependencies(c1, vec![ReferenceTarget::Cell(b1)]);

        let dirty = graph.dirty_closure([a1]);
        assert!(dirty.contains(&a1) && dirty.contains(&b1) && dirty.contains(&c1));

        let (order, cycles) = graph.recalc_order(&dirty);
        assert!(cycles.is_empty());
        let pos = |k: CellKey| order.iter().position(|&x| x == k).unwrap();
        assert!(pos(b1) < pos(c1));
    }

    #[test]
    fn range_reference_is_one_edge() {
        let mut graph = DependencyGraph::new();
        let total = key(10, 0);
        // total = SUM(A1:A10)
        graph.set_dependencies(total, vec![ReferenceTarget::Range(range(0, 0, 9, 0))]);

        // Editing any cell inside the range dirties the total
        let dirty = graph.dirty_closure([key(5, 0)]);
        assert!(dirty.contains(&total));

        // Cells outside the range do not
        let dirty = graph.dirty_closure([key(10, 1)]);
        assert!(!dirty.contains(&total));
    }

    #[test]
    fn cycle_detection_leaves_branches_ordered() {
        let mut graph = DependencyGraph::new();
        let a1 = key(0, 0);
        let b1 = key(0, 1);
        let c1 = key(0, 2);
        let d1 = key(0, 3);

        // A1 = B1, B1 = A1 (cycle); C1 = A1; D1 = 1 (no deps, reads C1)
        graph.set_dependencies(a1, vec![ReferenceTarget::Cell(b1)]);
        graph.set_dependencies(b1, vec![ReferenceTarget::Cell(a1)]);
        graph.set_dependencies(c1, vec![ReferenceTarget::Cell(a1)]);
        graph.set_dependencies(d1, vec![ReferenceTarget::Cell(c1)]);

        let dirty = graph.dirty_closure([a1]);
        let (order, cycles) = graph.recalc_order(&dirty);

        assert_eq!(cycles, vec![a1, b1]);
        // C1 and D1 read the cycle but are not part of it: they still
        // come out ordered (and will see the cached circular error)
        assert!(!order.contains(&a1) && !order.contains(&b1));
        let pos = |k: CellKey| order.iter().position(|&x| x == k).unwrap();
        assert!(pos(c1) < pos(d1));
        assert_eq!(cycles.len() + order.len(), dirty.len());
    }

    #[test]
    fn replacing_dependencies_clears_old_edges() {
        let mut graph = DependencyGraph::new();
        let f = key(0, 5);
        graph.set_dependencies(f, vec![ReferenceTarget::Cell(key(0, 0))]);
        assert!(graph.dirty_closure([key(0, 0)]).contains(&f));

        graph.set_dependencies(f, vec![ReferenceTarget::Cell(key(0, 1))]);
        assert!(!graph.dirty_closure([key(0, 0)]).contains(&f));
        assert!(graph.dirty_closure([key(0, 1)]).contains(&f));

        graph.clear_dependencies(f);
        assert!(!graph.dirty_closure([key(0, 1)]).contains(&f));
    }

    #[test]
    fn name_dependents_are_tracked() {
        let mut graph = DependencyGraph::new();
        let f = key(2, 0);
        graph.set_dependencies(
            f,
            vec![
                ReferenceTarget::Name("Sales".into()),
                ReferenceTarget::Range(range(0, 0, 1, 0)),
            ],
        );
        assert_eq!(graph.name_dependents("sales"), vec![f]);
        assert_eq!(graph.name_dependents("SALES"), vec![f]);
        assert!(graph.name_dependents("other").is_empty());
    }

    #[test]
    fn insert_rows_shifts_nodes_and_grows_ranges() {
        let mut graph = DependencyGraph::new();
        let total = key(10, 0);
        graph.set_dependencies(total, vec![ReferenceTarget::Range(range(0, 0, 9, 0))]);

        graph.shift_rows(0, ShiftOp::Insert { at: 5, count: 2 });

        // The formula cell moved from row 10 to row 12
        let moved = key(12, 0);
        // The range grew to rows 0..=11; a new cell inside the inserted
        // band now dirties the total
        let dirty = graph.dirty_closure([key(6, 0)]);
        assert!(dirty.contains(&moved));
        assert!(!dirty.contains(&total));
    }

    #[test]
    fn delete_rows_shrinks_ranges_and_drops_deleted_nodes() {
        let mut graph = DependencyGraph::new();
        let total = key(10, 0);
        graph.set_dependencies(total, vec![ReferenceTarget::Range(range(0, 0, 9, 0))]);
        let single = key(11, 0);
        graph.set_dependencies(single, vec![ReferenceTarget::Cell(key(3, 0))]);

        graph.shift_rows(0, ShiftOp::Delete { at: 2, count: 3 });

        // Range 0..=9 shrinks to 0..=6; totals moved up by 3
        let dirty = graph.dirty_closure([key(4, 0)]);
        assert!(dirty.contains(&key(7, 0)));

        // The cell edge to deleted row 3 is gone
        let dirty = graph.dirty_closure([key(3, 0)]);
        assert!(!dirty.contains(&key(8, 0)));
    }

    #[test]
    fn remove_sheet_renumbers_nodes() {
        let mut graph = DependencyGraph::new();
        let on_two = CellKey::new(2, 0, 0);
        graph.set_dependencies(on_two, vec![ReferenceTarget::Cell(CellKey::new(1, 5, 0))]);

        graph.remove_sheet(1);
        // The precedent on the removed sheet is gone; the formula cell
        // itself is renumbered from sheet 2 to sheet 1
        assert!(graph.dirty_closure([CellKey::new(1, 5, 0)]).len() == 1);
        assert!(graph.formula_cells().any(|k| k.sheet == 1));
    }
}
