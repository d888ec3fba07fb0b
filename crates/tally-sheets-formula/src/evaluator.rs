//! Formula evaluator
//!
//! Evaluates formula ASTs depth-first against a workbook. Evaluation
//! only ever reads *cached* cell values; the recalculation order managed
//! by the engine guarantees those are fresh by the time a dependent
//! formula is reached, so no recursive recalculation happens here.

use crate::ast::{BinaryOperator, FormulaExpr, RangeReference, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::registry;
use std::cmp::Ordering;
use tally_sheets_core::{
    locale::parse_number_literal, CellError, CellRange, CellValue, Locale, Workbook,
};

/// Value types during formula evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),
    /// Rectangular block of values from a range reference
    Array(Vec<Vec<FormulaValue>>),
    Empty,
}

impl FormulaValue {
    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    /// Get the error if this is one
    pub fn get_error(&self) -> Option<CellError> {
        match self {
            FormulaValue::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// Render for concatenation and display contexts
    pub fn to_text(&self) -> String {
        match self {
            FormulaValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Boolean(true) => "TRUE".to_string(),
            FormulaValue::Boolean(false) => "FALSE".to_string(),
            FormulaValue::Error(e) => e.to_string(),
            FormulaValue::Empty => String::new(),
            FormulaValue::Array(_) => CellError::Value.to_string(),
        }
    }

    /// Numeric coercion without locale context (numbers and booleans
    /// only). Text coercion goes through [`coerce_number`].
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Boolean(true) => Some(1.0),
            FormulaValue::Boolean(false) => Some(0.0),
            FormulaValue::Empty => Some(0.0),
            _ => None,
        }
    }

    /// Boolean coercion
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FormulaValue::Boolean(b) => Some(*b),
            FormulaValue::Number(n) => Some(*n != 0.0),
            FormulaValue::String(s) => match s.to_uppercase().as_str() {
                "TRUE" => Some(true),
                "FALSE" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<CellValue> for FormulaValue {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Empty => FormulaValue::Empty,
            CellValue::Number(n) => FormulaValue::Number(n),
            CellValue::String(s) => FormulaValue::String(s.as_str().to_string()),
            CellValue::Boolean(b) => FormulaValue::Boolean(b),
            CellValue::Error(e) => FormulaValue::Error(e),
            // Formula cells contribute their cached result; the
            // recalculation order keeps it fresh
            CellValue::Formula { cached_value, .. } => cached_value
                .map(|v| (*v).into())
                .unwrap_or(FormulaValue::Empty),
        }
    }
}

impl From<FormulaValue> for CellValue {
    fn from(value: FormulaValue) -> Self {
        match value {
            FormulaValue::Empty => CellValue::Empty,
            FormulaValue::Number(n) => CellValue::Number(n),
            FormulaValue::String(s) => CellValue::string(s),
            FormulaValue::Boolean(b) => CellValue::Boolean(b),
            FormulaValue::Error(e) => CellValue::Error(e),
            FormulaValue::Array(_) => CellValue::Error(CellError::Value),
        }
    }
}

/// Context for formula evaluation
pub struct EvaluationContext<'a> {
    /// Workbook for cell/name lookups
    pub workbook: &'a Workbook,
    /// Sheet the evaluating formula lives on; unqualified references
    /// resolve against it
    pub current_sheet: usize,
}

impl<'a> EvaluationContext<'a> {
    /// Create a new evaluation context
    pub fn new(workbook: &'a Workbook, current_sheet: usize) -> Self {
        Self {
            workbook,
            current_sheet,
        }
    }

    /// The workbook locale, used for text-to-number coercion
    pub fn locale(&self) -> &Locale {
        self.workbook.locale()
    }

    fn sheet_index(&self, sheet: Option<&str>) -> Option<usize> {
        match sheet {
            Some(name) => self.workbook.sheet_index(name),
            None => Some(self.current_sheet),
        }
    }

    /// Read a single cell's (cached) value
    pub fn get_cell_value(&self, sheet: Option<&str>, row: u32, col: u16) -> FormulaValue {
        let sheet_idx = match self.sheet_index(sheet) {
            Some(idx) => idx,
            None => return FormulaValue::Error(CellError::Ref),
        };
        match self.workbook.worksheet(sheet_idx) {
            Some(ws) => ws.get_value_at(row, col).into(),
            None => FormulaValue::Error(CellError::Ref),
        }
    }

    /// Read a range of (cached) values as an array
    pub fn get_range_values(&self, sheet: Option<&str>, range: &CellRange) -> FormulaValue {
        let sheet_idx = match self.sheet_index(sheet) {
            Some(idx) => idx,
            None => return FormulaValue::Error(CellError::Ref),
        };
        let ws = match self.workbook.worksheet(sheet_idx) {
            Some(ws) => ws,
            None => return FormulaValue::Error(CellError::Ref),
        };
        let mut rows = Vec::with_capacity(range.row_count() as usize);
        for row in range.start.row..=range.end.row {
            let mut cols = Vec::with_capacity(range.col_count() as usize);
            for col in range.start.col..=range.end.col {
                cols.push(ws.get_value_at(row, col).into());
            }
            rows.push(cols);
        }
        FormulaValue::Array(rows)
    }

    /// Resolve a defined name to its value (single-cell names yield the
    /// cell value, larger names an array)
    pub fn resolve_name(&self, name: &str) -> FormulaValue {
        let named = match self.workbook.resolve_name(name, self.current_sheet) {
            Some(named) => named,
            None => return FormulaValue::Error(CellError::Name),
        };
        let ws = match self.workbook.worksheet(named.sheet) {
            Some(ws) => ws,
            None => return FormulaValue::Error(CellError::Ref),
        };
        let range = named.range;
        if range.cell_count() == 1 {
            ws.get_value_at(range.start.row, range.start.col).into()
        } else {
            let sheet_name = ws.name().to_string();
            self.get_range_values(Some(&sheet_name), &range)
        }
    }

    /// Look up a defined name's range and sheet, for functions that need
    /// the reference itself rather than its values (SUBTOTAL)
    pub fn resolve_name_range(&self, name: &str) -> Option<(usize, CellRange)> {
        self.workbook
            .resolve_name(name, self.current_sheet)
            .map(|nr| (nr.sheet, nr.range))
    }
}

/// Coerce a value to a number for arithmetic.
///
/// Text coerces only when it parses as a number under the workbook
/// locale; anything else is a `#VALUE!`.
pub fn coerce_number(value: &FormulaValue, ctx: &EvaluationContext) -> Result<f64, CellError> {
    match value {
        FormulaValue::Error(e) => Err(*e),
        FormulaValue::String(s) => parse_number_literal(s, ctx.locale())
            .map(|(n, _)| n)
            .ok_or(CellError::Value),
        FormulaValue::Array(_) => Err(CellError::Value),
        other => other.as_number().ok_or(CellError::Value),
    }
}

/// Evaluate a formula expression
pub fn evaluate(expr: &FormulaExpr, ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match expr {
        FormulaExpr::Number(n) => Ok(FormulaValue::Number(*n)),
        FormulaExpr::String(s) => Ok(FormulaValue::String(s.clone())),
        FormulaExpr::Boolean(b) => Ok(FormulaValue::Boolean(*b)),
        FormulaExpr::Error(e) => Ok(FormulaValue::Error(*e)),

        FormulaExpr::CellRef(cell) => Ok(ctx.get_cell_value(
            cell.sheet.as_deref(),
            cell.address.row,
            cell.address.col,
        )),
        FormulaExpr::RangeRef(range) => {
            Ok(ctx.get_range_values(range.sheet.as_deref(), &range.range))
        }
        FormulaExpr::NameRef(name) => Ok(ctx.resolve_name(name)),

        FormulaExpr::BinaryOp { op, left, right } => evaluate_binary(*op, left, right, ctx),
        FormulaExpr::UnaryOp { op, operand } => evaluate_unary(*op, operand, ctx),
        FormulaExpr::Function { name, args } => evaluate_function(name, args, ctx),
    }
}

fn evaluate_binary(
    op: BinaryOperator,
    left: &FormulaExpr,
    right: &FormulaExpr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let lhs = evaluate(left, ctx)?;
    let rhs = evaluate(right, ctx)?;

    // Errors propagate through every operator, left operand first
    if let Some(e) = lhs.get_error() {
        return Ok(FormulaValue::Error(e));
    }
    if let Some(e) = rhs.get_error() {
        return Ok(FormulaValue::Error(e));
    }

    match op {
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Power => {
            let a = match coerce_number(&lhs, ctx) {
                Ok(n) => n,
                Err(e) => return Ok(FormulaValue::Error(e)),
            };
            let b = match coerce_number(&rhs, ctx) {
                Ok(n) => n,
                Err(e) => return Ok(FormulaValue::Error(e)),
            };
            let result = match op {
                BinaryOperator::Add => a + b,
                BinaryOperator::Subtract => a - b,
                BinaryOperator::Multiply => a * b,
                BinaryOperator::Divide => {
                    if b == 0.0 {
                        return Ok(FormulaValue::Error(CellError::Div0));
                    }
                    a / b
                }
                BinaryOperator::Power => a.powf(b),
                _ => unreachable!(),
            };
            Ok(FormulaValue::Number(result))
        }

        BinaryOperator::Concat => Ok(FormulaValue::String(format!(
            "{}{}",
            lhs.to_text(),
            rhs.to_text()
        ))),

        BinaryOperator::Equal
        | BinaryOperator::NotEqual
        | BinaryOperator::LessThan
        | BinaryOperator::LessEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterEqual => {
            let ordering = compare_values(&lhs, &rhs);
            let result = match op {
                BinaryOperator::Equal => ordering == Ordering::Equal,
                BinaryOperator::NotEqual => ordering != Ordering::Equal,
                BinaryOperator::LessThan => ordering == Ordering::Less,
                BinaryOperator::LessEqual => ordering != Ordering::Greater,
                BinaryOperator::GreaterThan => ordering == Ordering::Greater,
                BinaryOperator::GreaterEqual => ordering != Ordering::Less,
                _ => unreachable!(),
            };
            Ok(FormulaValue::Boolean(result))
        }
    }
}

/// Comparison with spreadsheet type ordering: numbers < text < booleans.
/// Empty compares as the other operand's neutral value.
fn compare_values(lhs: &FormulaValue, rhs: &FormulaValue) -> Ordering {
    use FormulaValue::*;
    match (lhs, rhs) {
        (Number(a), Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (String(a), String(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Boolean(a), Boolean(b)) => a.cmp(b),
        (Empty, Empty) => Ordering::Equal,
        (Empty, Number(b)) => 0.0f64.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Number(a), Empty) => a.partial_cmp(&0.0).unwrap_or(Ordering::Equal),
        (Empty, String(b)) => "".cmp(b.to_lowercase().as_str()),
        (String(a), Empty) => a.to_lowercase().as_str().cmp(""),
        (Empty, Boolean(b)) => false.cmp(b),
        (Boolean(a), Empty) => a.cmp(&false),
        _ => type_rank(lhs).cmp(&type_rank(rhs)),
    }
}

fn type_rank(value: &FormulaValue) -> u8 {
    match value {
        FormulaValue::Number(_) => 0,
        FormulaValue::String(_) => 1,
        FormulaValue::Boolean(_) => 2,
        _ => 3,
    }
}

fn evaluate_unary(
    op: UnaryOperator,
    operand: &FormulaExpr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let value = evaluate(operand, ctx)?;
    if let Some(e) = value.get_error() {
        return Ok(FormulaValue::Error(e));
    }
    let n = match coerce_number(&value, ctx) {
        Ok(n) => n,
        Err(e) => return Ok(FormulaValue::Error(e)),
    };
    match op {
        UnaryOperator::Negate => Ok(FormulaValue::Number(-n)),
        UnaryOperator::Percent => Ok(FormulaValue::Number(n / 100.0)),
    }
}

fn evaluate_function(
    name: &str,
    args: &[FormulaExpr],
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    // Special forms that need unevaluated arguments
    match name {
        "IF" => return evaluate_if(args, ctx),
        "SUBTOTAL" => return evaluate_subtotal(args, ctx),
        _ => {}
    }

    let def = match registry().get(name) {
        Some(def) => def,
        None => return Ok(FormulaValue::Error(CellError::Name)),
    };
    if args.len() < def.min_args || def.max_args.map_or(false, |max| args.len() > max) {
        return Err(FormulaError::ArgumentCount {
            function: name.to_string(),
            expected: match def.max_args {
                Some(max) if max == def.min_args => format!("{}", max),
                Some(max) => format!("{}..{}", def.min_args, max),
                None => format!("{}+", def.min_args),
            },
            actual: args.len(),
        });
    }

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(evaluate(arg, ctx)?);
    }
    (def.implementation)(&values, ctx)
}

/// IF evaluates lazily: only the taken branch runs
fn evaluate_if(args: &[FormulaExpr], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if args.len() < 2 || args.len() > 3 {
        return Err(FormulaError::ArgumentCount {
            function: "IF".into(),
            expected: "2..3".into(),
            actual: args.len(),
        });
    }
    let condition = evaluate(&args[0], ctx)?;
    if let Some(e) = condition.get_error() {
        return Ok(FormulaValue::Error(e));
    }
    let truthy = match condition.as_bool() {
        Some(b) => b,
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    if truthy {
        evaluate(&args[1], ctx)
    } else if let Some(otherwise) = args.get(2) {
        evaluate(otherwise, ctx)
    } else {
        Ok(FormulaValue::Boolean(false))
    }
}

/// SUBTOTAL(code, range): aggregates the range while skipping rows a
/// subtotal pass hid. Codes 101+ additionally skip manually hidden rows.
/// The range argument is inspected as a reference, not evaluated, so the
/// per-row hidden flags can be consulted.
fn evaluate_subtotal(args: &[FormulaExpr], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if args.len() != 2 {
        return Err(FormulaError::ArgumentCount {
            function: "SUBTOTAL".into(),
            expected: "2".into(),
            actual: args.len(),
        });
    }
    let code_value = evaluate(&args[0], ctx)?;
    if let Some(e) = code_value.get_error() {
        return Ok(FormulaValue::Error(e));
    }
    let code = match code_value.as_number() {
        Some(n) if n.fract() == 0.0 => n as i64,
        _ => return Ok(FormulaValue::Error(CellError::Value)),
    };

    let (sheet_idx, range) = match subtotal_target(&args[1], ctx) {
        Some(target) => target,
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    let ws = match ctx.workbook.worksheet(sheet_idx) {
        Some(ws) => ws,
        None => return Ok(FormulaValue::Error(CellError::Ref)),
    };

    let skip_manual = code > 100;
    let op = code % 100;
    let mut values = Vec::new();
    for row in range.start.row..=range.end.row {
        if ws.is_row_subtotal_hidden(row) {
            continue;
        }
        if skip_manual && ws.is_row_hidden(row) {
            continue;
        }
        for col in range.start.col..=range.end.col {
            values.push(FormulaValue::from(ws.get_value_at(row, col)));
        }
    }

    subtotal_aggregate(op, &values)
}

fn subtotal_target(arg: &FormulaExpr, ctx: &EvaluationContext) -> Option<(usize, CellRange)> {
    match arg {
        FormulaExpr::RangeRef(RangeReference { sheet, range }) => {
            let idx = match sheet {
                Some(name) => ctx.workbook.sheet_index(name)?,
                None => ctx.current_sheet,
            };
            Some((idx, *range))
        }
        FormulaExpr::CellRef(cell) => {
            let idx = match &cell.sheet {
                Some(name) => ctx.workbook.sheet_index(name)?,
                None => ctx.current_sheet,
            };
            Some((idx, CellRange::single(cell.address)))
        }
        FormulaExpr::NameRef(name) => ctx.resolve_name_range(name),
        _ => None,
    }
}

fn subtotal_aggregate(op: i64, values: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    // Errors in the visible cells propagate
    for value in values {
        if let Some(e) = value.get_error() {
            return Ok(FormulaValue::Error(e));
        }
    }
    let numbers: Vec<f64> = values
        .iter()
        .filter_map(|v| match v {
            FormulaValue::Number(n) => Some(*n),
            _ => None,
        })
        .collect();

    let result = match op {
        // AVERAGE
        1 => {
            if numbers.is_empty() {
                return Ok(FormulaValue::Error(CellError::Div0));
            }
            numbers.iter().sum::<f64>() / numbers.len() as f64
        }
        // COUNT
        2 => numbers.len() as f64,
        // COUNTA
        3 => values
            .iter()
            .filter(|v| !matches!(v, FormulaValue::Empty))
            .count() as f64,
        // MAX
        4 => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        // MIN
        5 => numbers.iter().copied().fold(f64::INFINITY, f64::min),
        // PRODUCT
        6 => numbers.iter().product(),
        // SUM
        9 => numbers.iter().sum(),
        _ => return Ok(FormulaValue::Error(CellError::Value)),
    };

    // MAX/MIN of an empty set is 0
    let result = if numbers.is_empty() && (op == 4 || op == 5) {
        0.0
    } else {
        result
    };
    Ok(FormulaValue::Number(result))
}
