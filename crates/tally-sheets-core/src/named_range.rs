//! Named ranges
//!
//! A named range aliases a rectangular range, scoped to one sheet or to
//! the whole workbook. Formulas reference names symbolically
//! (`=SUM(Sales)` stores the *name*), so redefining a name never rewrites
//! formula text; the engine only refreshes dependency edges and
//! recalculates.

use crate::cell::CellRange;
use crate::error::{Error, Result};
use ahash::AHashMap;

/// Scope of a named range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameScope {
    /// Available throughout the workbook
    Workbook,
    /// Scoped to one sheet (by index)
    Sheet(usize),
}

/// A named range definition
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRange {
    /// The name, case-preserved (lookup is case-insensitive)
    pub name: String,
    /// The range the name refers to
    pub range: CellRange,
    /// Scope of this name
    pub scope: NameScope,
    /// Sheet the range lives on
    pub sheet: usize,
}

impl NamedRange {
    /// Create a new named range
    pub fn new(name: impl Into<String>, sheet: usize, range: CellRange, scope: NameScope) -> Self {
        Self {
            name: name.into(),
            range,
            scope,
            sheet,
        }
    }
}

/// Collection of named ranges with scoped, case-insensitive lookup
#[derive(Debug, Default, Clone)]
pub struct NamedRangeCollection {
    ranges: AHashMap<(String, Option<usize>), NamedRange>,
}

impl NamedRangeCollection {
    /// Create a new empty collection
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str, scope: NameScope) -> (String, Option<usize>) {
        let scope_key = match scope {
            NameScope::Workbook => None,
            NameScope::Sheet(idx) => Some(idx),
        };
        (name.to_lowercase(), scope_key)
    }

    /// Define a new name; fails if it already exists in the same scope
    pub fn define(&mut self, range: NamedRange) -> Result<()> {
        if !is_valid_name(&range.name) {
            return Err(Error::InvalidName(range.name));
        }
        let key = Self::key(&range.name, range.scope);
        if self.ranges.contains_key(&key) {
            return Err(Error::DuplicateName(range.name));
        }
        self.ranges.insert(key, range);
        Ok(())
    }

    /// Define or replace a name, returning the previous definition
    pub fn define_or_replace(&mut self, range: NamedRange) -> Result<Option<NamedRange>> {
        if !is_valid_name(&range.name) {
            return Err(Error::InvalidName(range.name));
        }
        let key = Self::key(&range.name, range.scope);
        Ok(self.ranges.insert(key, range))
    }

    /// Resolve a name from the context of `current_sheet`: sheet scope
    /// wins over workbook scope.
    pub fn resolve(&self, name: &str, current_sheet: usize) -> Option<&NamedRange> {
        self.ranges
            .get(&Self::key(name, NameScope::Sheet(current_sheet)))
            .or_else(|| self.ranges.get(&Self::key(name, NameScope::Workbook)))
    }

    /// Get a name by exact scope
    pub fn get_exact(&self, name: &str, scope: NameScope) -> Option<&NamedRange> {
        self.ranges.get(&Self::key(name, scope))
    }

    /// Remove a name, returning it if present
    pub fn remove(&mut self, name: &str, scope: NameScope) -> Option<NamedRange> {
        self.ranges.remove(&Self::key(name, scope))
    }

    /// Names visible from `sheet` (its own scope plus workbook scope),
    /// ordered by name.
    pub fn visible_from(&self, sheet: usize) -> Vec<&NamedRange> {
        let mut out: Vec<&NamedRange> = self
            .ranges
            .values()
            .filter(|nr| match nr.scope {
                NameScope::Workbook => true,
                NameScope::Sheet(idx) => idx == sheet,
            })
            .collect();
        out.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        out
    }

    /// Iterate over all named ranges
    pub fn iter(&self) -> impl Iterator<Item = &NamedRange> {
        self.ranges.values()
    }

    /// Iterate mutably over all named ranges
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NamedRange> {
        self.ranges.values_mut()
    }

    /// Number of defined names
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Check if no names are defined
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// A valid name starts with a letter or underscore, continues with
/// alphanumerics/underscores/periods, and cannot be mistaken for a cell
/// address.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return false;
    }
    crate::CellAddress::parse(name).is_err()
}
