//! Cell styles
//!
//! The engine only interprets two style fields: the protection lock flag
//! and the number format used for display rendering. Everything else an
//! embedding application attaches travels by style index, which moves
//! with its cell through structural mutation and undo.

use ahash::AHashMap;

/// Formatting/protection attributes attached to a cell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Style {
    /// Whether the cell rejects edits while sheet protection is active
    pub locked: bool,
    /// Number format used to render the cell's value
    pub number_format: NumberFormat,
}

impl Style {
    /// Create a new default style (locked, General format)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lock flag
    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Set the number format
    pub fn with_number_format(mut self, format: NumberFormat) -> Self {
        self.number_format = format;
        self
    }
}

impl Default for Style {
    fn default() -> Self {
        // Cells are locked by default; the flag only matters once sheet
        // protection is enabled.
        Self {
            locked: true,
            number_format: NumberFormat::General,
        }
    }
}

/// Number format for cell display
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NumberFormat {
    /// General format (default): shortest faithful rendering
    #[default]
    General,
    /// Custom format string in the number-format mini-language
    Custom(String),
}

impl NumberFormat {
    /// Integer format (0)
    pub fn integer() -> Self {
        NumberFormat::Custom("0".into())
    }

    /// Two-decimal format (0.00)
    pub fn decimal() -> Self {
        NumberFormat::Custom("0.00".into())
    }

    /// Thousands grouping with two decimals (#,##0.00)
    pub fn thousands_decimal() -> Self {
        NumberFormat::Custom("#,##0.00".into())
    }

    /// Percentage with no decimals (0%)
    pub fn percent() -> Self {
        NumberFormat::Custom("0%".into())
    }

    /// Scientific notation (0.00E+00)
    pub fn scientific() -> Self {
        NumberFormat::Custom("0.00E+00".into())
    }

    /// Parenthesized-negative accounting style (#,##0.00;(#,##0.00))
    pub fn accounting() -> Self {
        NumberFormat::Custom("#,##0.00;(#,##0.00)".into())
    }

    /// ISO short date (yyyy-mm-dd)
    pub fn date_iso() -> Self {
        NumberFormat::Custom("yyyy-mm-dd".into())
    }

    /// Text passthrough (@)
    pub fn text() -> Self {
        NumberFormat::Custom("@".into())
    }

    /// Get the format string
    pub fn format_string(&self) -> &str {
        match self {
            NumberFormat::General => "General",
            NumberFormat::Custom(s) => s,
        }
    }

    /// Check whether this format renders serial numbers as dates
    pub fn is_date_format(&self) -> bool {
        match self {
            NumberFormat::General => false,
            NumberFormat::Custom(s) => {
                let lower = s.to_lowercase();
                !lower.contains('"')
                    && !lower.contains('0')
                    && !lower.contains('#')
                    && (lower.contains('y') || lower.contains('d'))
            }
        }
    }
}

/// Deduplicating pool of styles.
///
/// Cells store a `u32` index; index 0 is always the default style.
#[derive(Debug)]
pub struct StylePool {
    styles: Vec<Style>,
    index: AHashMap<Style, u32>,
}

impl StylePool {
    /// Create a pool seeded with the default style at index 0
    pub fn new() -> Self {
        let default = Style::default();
        let mut index = AHashMap::new();
        index.insert(default.clone(), 0);
        Self {
            styles: vec![default],
            index,
        }
    }

    /// Get a style by index
    pub fn get(&self, idx: u32) -> Option<&Style> {
        self.styles.get(idx as usize)
    }

    /// Get a style by index, falling back to the default style for
    /// indices that do not resolve (e.g. data restored from a snapshot)
    pub fn resolve(&self, idx: u32) -> &Style {
        self.styles.get(idx as usize).unwrap_or(&self.styles[0])
    }

    /// Get the index for a style, inserting it if new
    pub fn get_or_insert(&mut self, style: Style) -> u32 {
        if let Some(&idx) = self.index.get(&style) {
            return idx;
        }
        let idx = self.styles.len() as u32;
        self.styles.push(style.clone());
        self.index.insert(style, idx);
        idx
    }

    /// Number of distinct styles
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    /// Check if only the default style is present
    pub fn is_empty(&self) -> bool {
        self.styles.len() <= 1
    }
}

impl Default for StylePool {
    fn default() -> Self {
        Self::new()
    }
}
