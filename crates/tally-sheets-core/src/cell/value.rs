//! Cell value types

use std::fmt;
use std::sync::Arc;

/// The content of a cell.
///
/// Formula cells preserve the exact source text last entered (including
/// any embedded `#REF!` tokens produced by structural deletion) together
/// with the latest recalculation result. The engine guarantees that
/// `cached_value` is fresh whenever a command returns.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Empty cell (no value)
    Empty,

    /// Boolean value (TRUE/FALSE)
    Boolean(bool),

    /// Numeric value (dates are stored as serial numbers)
    Number(f64),

    /// String value
    String(SharedString),

    /// Error value (#VALUE!, #REF!, ...)
    Error(CellError),

    /// Formula with cached result
    Formula {
        /// Formula source text (e.g. "=SUM(A1:A10)")
        text: String,
        /// Last calculated value; `None` only before the first
        /// recalculation pass after entry
        cached_value: Option<Box<CellValue>>,
    },
}

impl CellValue {
    /// Create a new string value
    pub fn string<S: Into<String>>(s: S) -> Self {
        CellValue::String(SharedString::new(s.into()))
    }

    /// Create a new formula value with no cached result yet
    pub fn formula<S: Into<String>>(text: S) -> Self {
        CellValue::Formula {
            text: text.into(),
            cached_value: None,
        }
    }

    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Check if the cell contains a formula
    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Formula { .. })
    }

    /// Get the formula text if this is a formula cell
    pub fn formula_text(&self) -> Option<&str> {
        match self {
            CellValue::Formula { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Resolve to the observable value: the cached result for formulas,
    /// the value itself otherwise.
    pub fn effective(&self) -> &CellValue {
        match self {
            CellValue::Formula {
                cached_value: Some(v),
                ..
            } => v.effective(),
            _ => self,
        }
    }

    /// Try to read the effective value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self.effective() {
            CellValue::Number(n) => Some(*n),
            CellValue::Boolean(true) => Some(1.0),
            CellValue::Boolean(false) => Some(0.0),
            _ => None,
        }
    }

    /// Try to read the effective value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self.effective() {
            CellValue::Boolean(b) => Some(*b),
            CellValue::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }

    /// Try to read the effective value as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self.effective() {
            CellValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the error carried by the effective value, if any
    pub fn error(&self) -> Option<CellError> {
        match self.effective() {
            CellValue::Error(e) => Some(*e),
            _ => None,
        }
    }
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.effective() {
            CellValue::Empty => Ok(()),
            CellValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::String(s) => write!(f, "{}", s.as_str()),
            CellValue::Error(e) => write!(f, "{}", e),
            // Uncalculated formula: show the source text
            CellValue::Formula { text, .. } => write!(f, "{}", text),
        }
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::string(s)
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::string(s)
    }
}

impl From<CellError> for CellValue {
    fn from(e: CellError) -> Self {
        CellValue::Error(e)
    }
}

/// Evaluation-time error values.
///
/// These are cell contents, not `Err`s: they are cached like any other
/// result and propagate through dependent formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellError {
    /// #DIV/0! - Division by zero
    Div0,
    /// #VALUE! - Wrong type of argument or operand
    Value,
    /// #REF! - Reference to deleted rows/columns/sheet
    Ref,
    /// #NAME? - Unrecognized function or defined name
    Name,
    /// #CIRC! - Formula participates in a dependency cycle
    Circular,
}

impl CellError {
    /// Display string for this error
    pub fn as_str(&self) -> &'static str {
        match self {
            CellError::Div0 => "#DIV/0!",
            CellError::Value => "#VALUE!",
            CellError::Ref => "#REF!",
            CellError::Name => "#NAME?",
            CellError::Circular => "#CIRC!",
        }
    }

    /// Parse an error token; case-insensitive
    pub fn from_token(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "#DIV/0!" => Some(CellError::Div0),
            "#VALUE!" => Some(CellError::Value),
            "#REF!" => Some(CellError::Ref),
            "#NAME?" => Some(CellError::Name),
            "#CIRC!" => Some(CellError::Circular),
            _ => None,
        }
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Interned string.
///
/// Cell text repeats heavily across a sheet; `Arc<str>` lets clones of a
/// cell (undo snapshots, paste) share one allocation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SharedString(Arc<str>);

impl SharedString {
    /// Create a new shared string
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        SharedString(Arc::from(s.as_ref()))
    }

    /// Get the string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the string is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SharedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for SharedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SharedString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SharedString {
    fn from(s: &str) -> Self {
        SharedString::new(s)
    }
}

impl From<String> for SharedString {
    fn from(s: String) -> Self {
        SharedString::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn conversions() {
        assert_eq!(CellValue::from(42), CellValue::Number(42.0));
        assert_eq!(CellValue::from(true), CellValue::Boolean(true));
        assert_eq!(CellValue::from("hi").as_str(), Some("hi"));
    }

    #[test]
    fn effective_value_follows_formula_cache() {
        let cell = CellValue::Formula {
            text: "=1+1".into(),
            cached_value: Some(Box::new(CellValue::Number(2.0))),
        };
        assert_eq!(cell.as_number(), Some(2.0));
        assert_eq!(cell.to_string(), "2");
        assert_eq!(cell.formula_text(), Some("=1+1"));

        let err_cell = CellValue::Formula {
            text: "=A1/0".into(),
            cached_value: Some(Box::new(CellValue::Error(CellError::Div0))),
        };
        assert_eq!(err_cell.error(), Some(CellError::Div0));
        assert_eq!(err_cell.to_string(), "#DIV/0!");
    }

    #[test]
    fn boolean_coercion() {
        assert_eq!(CellValue::Boolean(true).as_number(), Some(1.0));
        assert_eq!(CellValue::Number(0.0).as_bool(), Some(false));
        assert_eq!(CellValue::string("x").as_number(), None);
    }

    #[test]
    fn error_tokens_round_trip() {
        for err in [
            CellError::Div0,
            CellError::Value,
            CellError::Ref,
            CellError::Name,
            CellError::Circular,
        ] {
            assert_eq!(CellError::from_token(err.as_str()), Some(err));
        }
        assert_eq!(CellError::from_token("#div/0!"), Some(CellError::Div0));
        assert_eq!(CellError::from_token("#BOGUS!"), None);
    }
}
