//! Criteria matching for COUNTIF/SUMIF
//!
//! A criteria value can be a number (exact match), a comparison string
//! (">5", "<=10", "<>0"), or text (case-insensitive, with `*` and `?`
//! wildcards). Numeric criteria match only real numbers, never text
//! that happens to spell one.

use crate::evaluator::FormulaValue;

/// Compiled criteria
#[derive(Debug)]
pub struct CriteriaMatcher {
    criteria: Criteria,
}

#[derive(Debug)]
enum Criteria {
    /// Numeric comparison
    Number(Comparison, f64),
    /// Case-insensitive text pattern, possibly with wildcards
    Text(String),
    /// Matches empty cells
    Empty,
    /// Matches nothing (error criteria)
    Never,
}

#[derive(Debug, Clone, Copy)]
enum Comparison {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl Comparison {
    fn holds(&self, lhs: f64, rhs: f64) -> bool {
        const EPSILON: f64 = 1e-10;
        match self {
            Comparison::Equal => (lhs - rhs).abs() < EPSILON,
            Comparison::NotEqual => (lhs - rhs).abs() >= EPSILON,
            Comparison::Less => lhs < rhs,
            Comparison::LessEqual => lhs <= rhs,
            Comparison::Greater => lhs > rhs,
            Comparison::GreaterEqual => lhs >= rhs,
        }
    }
}

impl CriteriaMatcher {
    /// Compile a criteria value
    pub fn new(criteria: &FormulaValue) -> Self {
        let criteria = match criteria {
            FormulaValue::Number(n) => Criteria::Number(Comparison::Equal, *n),
            FormulaValue::Boolean(b) => {
                Criteria::Number(Comparison::Equal, if *b { 1.0 } else { 0.0 })
            }
            FormulaValue::String(s) => Self::compile_text(s),
            FormulaValue::Empty => Criteria::Empty,
            FormulaValue::Error(_) | FormulaValue::Array(_) => Criteria::Never,
        };
        Self { criteria }
    }

    fn compile_text(s: &str) -> Criteria {
        let s = s.trim();
        if s.is_empty() {
            return Criteria::Empty;
        }

        let (op, rest) = if let Some(rest) = s.strip_prefix(">=") {
            (Some(Comparison::GreaterEqual), rest)
        } else if let Some(rest) = s.strip_prefix("<=") {
            (Some(Comparison::LessEqual), rest)
        } else if let Some(rest) = s.strip_prefix("<>") {
            (Some(Comparison::NotEqual), rest)
        } else if let Some(rest) = s.strip_prefix('>') {
            (Some(Comparison::Greater), rest)
        } else if let Some(rest) = s.strip_prefix('<') {
            (Some(Comparison::Less), rest)
        } else if let Some(rest) = s.strip_prefix('=') {
            (Some(Comparison::Equal), rest)
        } else {
            (None, s)
        };

        if let Some(op) = op {
            if let Ok(n) = rest.trim().parse::<f64>() {
                return Criteria::Number(op, n);
            }
            // Comparison against text falls back to pattern matching of
            // the remainder (">apple" is rare; treat as text equality)
            return Criteria::Text(rest.trim().to_lowercase());
        }

        if let Ok(n) = s.parse::<f64>() {
            return Criteria::Number(Comparison::Equal, n);
        }
        Criteria::Text(s.to_lowercase())
    }

    /// Check whether a value matches
    pub fn matches(&self, value: &FormulaValue) -> bool {
        match &self.criteria {
            Criteria::Number(op, rhs) => match value {
                FormulaValue::Number(n) => op.holds(*n, *rhs),
                FormulaValue::Boolean(b) => op.holds(if *b { 1.0 } else { 0.0 }, *rhs),
                _ => false,
            },
            Criteria::Text(pattern) => match value {
                FormulaValue::String(s) => wildcard_match(pattern, &s.to_lowercase()),
                FormulaValue::Boolean(b) => {
                    pattern == if *b { "true" } else { "false" }
                }
                _ => false,
            },
            Criteria::Empty => matches!(
                value,
                FormulaValue::Empty
            ) || matches!(value, FormulaValue::String(s) if s.is_empty()),
            Criteria::Never => false,
        }
    }
}

/// Glob match: `*` spans any characters, `?` exactly one
fn wildcard_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') && !pattern.contains('?') {
        return pattern == text;
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob(&p, &t)
}

fn glob(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => {
            // '*' consumes zero or more characters
            (0..=text.len()).any(|skip| glob(rest, &text[skip..]))
        }
        Some(('?', rest)) => !text.is_empty() && glob(rest, &text[1..]),
        Some((&c, rest)) => text.first() == Some(&c) && glob(rest, &text[1..]),
    }
}
