//! Workbook type - the top-level document structure

use crate::error::{Error, Result};
use crate::locale::Locale;
use crate::named_range::{NameScope, NamedRange, NamedRangeCollection};
use crate::worksheet::Worksheet;
use crate::MAX_SHEET_NAME_LEN;

/// A workbook: an ordered list of worksheets plus workbook-level state.
///
/// A single `Workbook` instance exclusively owns all cell and graph
/// state; callers serialize commands through one owner.
#[derive(Debug)]
pub struct Workbook {
    /// Worksheets in tab order
    worksheets: Vec<Worksheet>,
    /// Named ranges (defined names)
    named_ranges: NamedRangeCollection,
    /// Number/date conventions for parsing and rendering
    locale: Locale,
}

impl Workbook {
    /// Create a new workbook with one worksheet and en-US conventions
    pub fn new() -> Self {
        Self::with_locale(Locale::en_us())
    }

    /// Create a new workbook with one worksheet and the given locale
    pub fn with_locale(locale: Locale) -> Self {
        let mut wb = Self {
            worksheets: Vec::new(),
            named_ranges: NamedRangeCollection::new(),
            locale,
        };
        wb.add_worksheet("Sheet1").expect("default sheet name is valid");
        wb
    }

    /// Get the workbook locale
    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    /// Change the workbook locale
    pub fn set_locale(&mut self, locale: Locale) {
        self.locale = locale;
    }

    // === Worksheets ===

    /// Number of worksheets
    pub fn sheet_count(&self) -> usize {
        self.worksheets.len()
    }

    /// Get a worksheet by index
    pub fn worksheet(&self, index: usize) -> Option<&Worksheet> {
        self.worksheets.get(index)
    }

    /// Get a mutable worksheet by index
    pub fn worksheet_mut(&mut self, index: usize) -> Option<&mut Worksheet> {
        self.worksheets.get_mut(index)
    }

    /// Get the index of a worksheet by name
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.worksheets.iter().position(|ws| ws.name() == name)
    }

    /// Iterate over all worksheets
    pub fn worksheets(&self) -> impl Iterator<Item = &Worksheet> {
        self.worksheets.iter()
    }

    /// Append a new worksheet, returning its index
    pub fn add_worksheet(&mut self, name: &str) -> Result<usize> {
        self.validate_sheet_name(name, None)?;
        self.worksheets.push(Worksheet::new(name));
        Ok(self.worksheets.len() - 1)
    }

    /// Remove a worksheet by index.
    ///
    /// The caller (engine) is responsible for turning cross-sheet
    /// references into `#REF!` and dropping the sheet's names.
    pub fn remove_worksheet(&mut self, index: usize) -> Result<Worksheet> {
        if index >= self.worksheets.len() {
            return Err(Error::SheetOutOfBounds(index, self.worksheets.len()));
        }
        Ok(self.worksheets.remove(index))
    }

    /// Rename a worksheet
    pub fn rename_worksheet(&mut self, index: usize, new_name: &str) -> Result<()> {
        if index >= self.worksheets.len() {
            return Err(Error::SheetOutOfBounds(index, self.worksheets.len()));
        }
        self.validate_sheet_name(new_name, Some(index))?;
        self.worksheets[index].set_name(new_name);
        Ok(())
    }

    fn validate_sheet_name(&self, name: &str, exclude: Option<usize>) -> Result<()> {
        if name.is_empty() || name.len() > MAX_SHEET_NAME_LEN {
            return Err(Error::other(format!("invalid sheet name: {:?}", name)));
        }
        for (i, ws) in self.worksheets.iter().enumerate() {
            if Some(i) != exclude && ws.name() == name {
                return Err(Error::DuplicateSheetName(name.into()));
            }
        }
        Ok(())
    }

    // === Named ranges ===

    /// Get the named-range collection
    pub fn named_ranges(&self) -> &NamedRangeCollection {
        &self.named_ranges
    }

    /// Get the named-range collection mutably
    pub fn named_ranges_mut(&mut self) -> &mut NamedRangeCollection {
        &mut self.named_ranges
    }

    /// Resolve a name from a sheet's context (sheet scope wins)
    pub fn resolve_name(&self, name: &str, current_sheet: usize) -> Option<&NamedRange> {
        self.named_ranges.resolve(name, current_sheet)
    }

    /// Drop all names scoped to a sheet and all names whose range lives
    /// on it (used when the sheet is removed), then shift sheet indices
    /// above `removed` down by one.
    pub fn purge_names_for_sheet(&mut self, removed: usize) {
        let keep: Vec<NamedRange> = self
            .named_ranges
            .iter()
            .filter(|nr| nr.sheet != removed && nr.scope != NameScope::Sheet(removed))
            .cloned()
            .collect();
        let mut rebuilt = NamedRangeCollection::new();
        for mut nr in keep {
            if nr.sheet > removed {
                nr.sheet -= 1;
            }
            if let NameScope::Sheet(idx) = nr.scope {
                if idx > removed {
                    nr.scope = NameScope::Sheet(idx - 1);
                }
            }
            // Names were unique before, so re-adding cannot fail
            let _ = rebuilt.define(nr);
        }
        self.named_ranges = rebuilt;
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}
