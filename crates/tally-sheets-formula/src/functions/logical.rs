//! Logical functions
//!
//! IF itself is a special form in the evaluator (its branches evaluate
//! lazily); the eager logical combinators live here.

use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use tally_sheets_core::CellError;

fn bools(args: &[FormulaValue]) -> Result<Vec<bool>, CellError> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            FormulaValue::Error(e) => return Err(*e),
            FormulaValue::Array(rows) => {
                for row in rows {
                    for cell in row {
                        match cell {
                            FormulaValue::Error(e) => return Err(*e),
                            // Text and empties inside arrays are ignored
                            FormulaValue::Number(n) => out.push(*n != 0.0),
                            FormulaValue::Boolean(b) => out.push(*b),
                            _ => {}
                        }
                    }
                }
            }
            other => match other.as_bool() {
                Some(b) => out.push(b),
                None => return Err(CellError::Value),
            },
        }
    }
    if out.is_empty() {
        Err(CellError::Value)
    } else {
        Ok(out)
    }
}

/// AND: true when every argument is truthy
pub fn fn_and(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match bools(args) {
        Ok(values) => FormulaValue::Boolean(values.into_iter().all(|b| b)),
        Err(e) => FormulaValue::Error(e),
    })
}

/// OR: true when any argument is truthy
pub fn fn_or(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match bools(args) {
        Ok(values) => FormulaValue::Boolean(values.into_iter().any(|b| b)),
        Err(e) => FormulaValue::Error(e),
    })
}

/// NOT: logical negation
pub fn fn_not(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match args[0] {
        FormulaValue::Error(e) => FormulaValue::Error(e),
        ref v => match v.as_bool() {
            Some(b) => FormulaValue::Boolean(!b),
            None => FormulaValue::Error(CellError::Value),
        },
    })
}

/// TRUE()
pub fn fn_true(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(true))
}

/// FALSE()
pub fn fn_false(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_sheets_core::Workbook;

    fn eval(f: super::super::FunctionImpl, args: &[FormulaValue]) -> FormulaValue {
        let wb = Workbook::new();
        f(args, &EvaluationContext::new(&wb, 0)).unwrap()
    }

    #[test]
    fn and_or_not() {
        let t = FormulaValue::Boolean(true);
        let f = FormulaValue::Boolean(false);

        assert_eq!(eval(fn_and, &[t.clone(), t.clone()]), FormulaValue::Boolean(true));
        assert_eq!(eval(fn_and, &[t.clone(), f.clone()]), FormulaValue::Boolean(false));
        assert_eq!(eval(fn_or, &[f.clone(), t.clone()]), FormulaValue::Boolean(true));
        assert_eq!(eval(fn_or, &[f.clone(), f.clone()]), FormulaValue::Boolean(false));
        assert_eq!(eval(fn_not, &[t]), FormulaValue::Boolean(false));

        // Numbers are truthy when non-zero
        assert_eq!(
            eval(fn_and, &[FormulaValue::Number(2.0), FormulaValue::Number(1.0)]),
            FormulaValue::Boolean(true)
        );
    }

    #[test]
    fn errors_propagate() {
        let args = [FormulaValue::Boolean(true), FormulaValue::Error(CellError::Ref)];
        assert_eq!(eval(fn_and, &args), FormulaValue::Error(CellError::Ref));
        assert_eq!(eval(fn_not, &[FormulaValue::String("x".into())]), FormulaValue::Error(CellError::Value));
    }
}
