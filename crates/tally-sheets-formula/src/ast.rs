//! Formula abstract syntax tree
//!
//! The tree is also the canonical carrier of formula *text*: `Display`
//! regenerates source from an AST, which is how reference rewriting
//! stores shifted formulas (and embedded `#REF!` tokens) back into
//! cells.

use std::fmt;
use tally_sheets_core::{CellAddress, CellError, CellRange};

/// Formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    // === Literals ===
    /// Numeric literal
    Number(f64),
    /// String literal
    String(String),
    /// Boolean literal
    Boolean(bool),
    /// Error literal; `#REF!` appears here when structural deletion
    /// embedded it into the formula
    Error(CellError),

    // === References ===
    /// Single cell reference
    CellRef(CellReference),
    /// Range reference
    RangeRef(RangeReference),
    /// Named range reference (stored symbolically)
    NameRef(String),

    // === Operators ===
    /// Binary operation
    BinaryOp {
        op: BinaryOperator,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },
    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<FormulaExpr>,
    },

    // === Function call ===
    Function {
        name: String,
        args: Vec<FormulaExpr>,
    },
}

/// Cell reference with optional sheet qualifier
#[derive(Debug, Clone, PartialEq)]
pub struct CellReference {
    pub sheet: Option<String>,
    pub address: CellAddress,
}

/// Range reference with optional sheet qualifier
#[derive(Debug, Clone, PartialEq)]
pub struct RangeReference {
    pub sheet: Option<String>,
    pub range: CellRange,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Text
    Concat,
}

impl BinaryOperator {
    /// Operator spelling in formula text
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Power => "^",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Concat => "&",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThan
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterEqual => 1,
            BinaryOperator::Concat => 2,
            BinaryOperator::Add | BinaryOperator::Subtract => 3,
            BinaryOperator::Multiply | BinaryOperator::Divide => 4,
            BinaryOperator::Power => 5,
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Prefix minus
    Negate,
    /// Postfix percent
    Percent,
}

impl FormulaExpr {
    /// Render as full formula text with the leading '='
    pub fn to_formula_text(&self) -> String {
        format!("={}", self)
    }

    fn precedence(&self) -> u8 {
        match self {
            FormulaExpr::BinaryOp { op, .. } => op.precedence(),
            FormulaExpr::UnaryOp { op: UnaryOperator::Negate, .. } => 6,
            FormulaExpr::UnaryOp { op: UnaryOperator::Percent, .. } => 7,
            _ => 8,
        }
    }

    fn fmt_with_prec(&self, f: &mut fmt::Formatter<'_>, min_prec: u8) -> fmt::Result {
        let own = self.precedence();
        if own < min_prec {
            write!(f, "(")?;
            self.fmt_body(f)?;
            write!(f, ")")
        } else {
            self.fmt_body(f)
        }
    }

    fn fmt_body(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaExpr::Number(n) => write!(f, "{}", n),
            FormulaExpr::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            FormulaExpr::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            FormulaExpr::Error(e) => write!(f, "{}", e),
            FormulaExpr::CellRef(cell) => {
                if let Some(sheet) = &cell.sheet {
                    write!(f, "{}!", sheet)?;
                }
                write!(f, "{}", cell.address.to_a1_string())
            }
            FormulaExpr::RangeRef(range) => {
                if let Some(sheet) = &range.sheet {
                    write!(f, "{}!", sheet)?;
                }
                write!(
                    f,
                    "{}:{}",
                    range.range.start.to_a1_string(),
                    range.range.end.to_a1_string()
                )
            }
            FormulaExpr::NameRef(name) => write!(f, "{}", name),
            FormulaExpr::BinaryOp { op, left, right } => {
                let prec = op.precedence();
                // Power is right-associative; everything else binds left
                let (left_min, right_min) = if matches!(op, BinaryOperator::Power) {
                    (prec + 1, prec)
                } else {
                    (prec, prec + 1)
                };
                left.fmt_with_prec(f, left_min)?;
                write!(f, "{}", op.symbol())?;
                right.fmt_with_prec(f, right_min)
            }
            FormulaExpr::UnaryOp { op, operand } => match op {
                UnaryOperator::Negate => {
                    write!(f, "-")?;
                    operand.fmt_with_prec(f, 6)
                }
                UnaryOperator::Percent => {
                    operand.fmt_with_prec(f, 7)?;
                    write!(f, "%")
                }
            },
            FormulaExpr::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    arg.fmt_with_prec(f, 0)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for FormulaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with_prec(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_formula;
    use pretty_assertions::assert_eq;

    fn round_trip(text: &str) -> String {
        parse_formula(text).unwrap().to_formula_text()
    }

    #[test]
    fn renders_atoms() {
        assert_eq!(round_trip("=42"), "=42");
        assert_eq!(round_trip("=\"a\"\"b\""), "=\"a\"\"b\"");
        assert_eq!(round_trip("=TRUE"), "=TRUE");
        assert_eq!(round_trip("=#REF!"), "=#REF!");
        assert_eq!(round_trip("=$B$2"), "=$B$2");
        assert_eq!(round_trip("=Sheet2!A1"), "=Sheet2!A1");
    }

    #[test]
    fn preserves_precedence_without_spurious_parens() {
        assert_eq!(round_trip("=1+2*3"), "=1+2*3");
        assert_eq!(round_trip("=(1+2)*3"), "=(1+2)*3");
        assert_eq!(round_trip("=A1+B1*2"), "=A1+B1*2");
        assert_eq!(round_trip("=-A1+5"), "=-A1+5");
        assert_eq!(round_trip("=2^3^2"), "=2^3^2");
        assert_eq!(round_trip("=(2^3)^2"), "=(2^3)^2");
        assert_eq!(round_trip("=1-(2-3)"), "=1-(2-3)");
        assert_eq!(round_trip("=50%"), "=50%");
    }

    #[test]
    fn renders_functions_and_ranges() {
        assert_eq!(round_trip("=SUM(A1:A10)"), "=SUM(A1:A10)");
        assert_eq!(round_trip("=IF(A1>0,SUM(B1:B2),0)"), "=IF(A1>0,SUM(B1:B2),0)");
        assert_eq!(round_trip("=SUM(Sales)"), "=SUM(Sales)");
        assert_eq!(round_trip("=SUM($A$1:B10)"), "=SUM($A$1:B10)");
    }
}
