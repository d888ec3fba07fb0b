//! Date functions
//!
//! Dates are serial numbers (days since 1899-12-30); these functions
//! convert between serials and calendar components via chrono.

use crate::error::FormulaResult;
use crate::evaluator::{coerce_number, EvaluationContext, FormulaValue};
use chrono::{Datelike, NaiveDate};
use tally_sheets_core::locale::{date_to_serial, serial_to_date};
use tally_sheets_core::CellError;

fn arg_number(value: &FormulaValue, ctx: &EvaluationContext) -> Result<f64, CellError> {
    coerce_number(value, ctx)
}

/// DATE(year, month, day) -> serial number.
/// Out-of-range months and days roll over, matching spreadsheet
/// semantics (month 13 is January of the next year).
pub fn fn_date(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let year = match arg_number(&args[0], ctx) {
        Ok(n) => n as i32,
        Err(e) => return Ok(FormulaValue::Error(e)),
    };
    let month = match arg_number(&args[1], ctx) {
        Ok(n) => n as i64,
        Err(e) => return Ok(FormulaValue::Error(e)),
    };
    let day = match arg_number(&args[2], ctx) {
        Ok(n) => n as i64,
        Err(e) => return Ok(FormulaValue::Error(e)),
    };

    // Normalize month overflow into the year, then add day offset
    let months_from_zero = year as i64 * 12 + (month - 1);
    let norm_year = months_from_zero.div_euclid(12);
    let norm_month = months_from_zero.rem_euclid(12) + 1;
    let base = match NaiveDate::from_ymd_opt(norm_year as i32, norm_month as u32, 1) {
        Some(d) => d,
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    let date = match base.checked_add_signed(chrono::Duration::days(day - 1)) {
        Some(d) => d,
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    Ok(FormulaValue::Number(date_to_serial(date)))
}

fn component(
    args: &[FormulaValue],
    ctx: &EvaluationContext,
    extract: fn(NaiveDate) -> f64,
) -> FormulaResult<FormulaValue> {
    let serial = match arg_number(&args[0], ctx) {
        Ok(n) => n,
        Err(e) => return Ok(FormulaValue::Error(e)),
    };
    match serial_to_date(serial) {
        Some(date) => Ok(FormulaValue::Number(extract(date))),
        None => Ok(FormulaValue::Error(CellError::Value)),
    }
}

/// YEAR(serial)
pub fn fn_year(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    component(args, ctx, |d| d.year() as f64)
}

/// MONTH(serial)
pub fn fn_month(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    component(args, ctx, |d| d.month() as f64)
}

/// DAY(serial)
pub fn fn_day(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    component(args, ctx, |d| d.day() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tally_sheets_core::Workbook;

    fn eval(f: super::super::FunctionImpl, args: &[FormulaValue]) -> FormulaValue {
        let wb = Workbook::new();
        f(args, &EvaluationContext::new(&wb, 0)).unwrap()
    }

    fn n(v: f64) -> FormulaValue {
        FormulaValue::Number(v)
    }

    #[test]
    fn date_components_round_trip() {
        let serial = eval(fn_date, &[n(2024.0), n(3.0), n(14.0)]);
        assert_eq!(eval(fn_year, &[serial.clone()]), n(2024.0));
        assert_eq!(eval(fn_month, &[serial.clone()]), n(3.0));
        assert_eq!(eval(fn_day, &[serial]), n(14.0));
    }

    #[test]
    fn date_rolls_over_month_and_day() {
        // Month 13 is January of the next year
        assert_eq!(
            eval(fn_date, &[n(2023.0), n(13.0), n(1.0)]),
            eval(fn_date, &[n(2024.0), n(1.0), n(1.0)])
        );
        // Day 32 of January is February 1
        assert_eq!(
            eval(fn_date, &[n(2024.0), n(1.0), n(32.0)]),
            eval(fn_date, &[n(2024.0), n(2.0), n(1.0)])
        );
    }

    #[test]
    fn serial_epoch_anchor() {
        // 1900-01-01 is serial 2 in the 1899-12-30 system
        assert_eq!(eval(fn_date, &[n(1900.0), n(1.0), n(1.0)]), n(2.0));
    }

    #[test]
    fn non_numeric_argument_is_value_error() {
        assert_eq!(
            eval(fn_year, &[FormulaValue::String("soon".into())]),
            FormulaValue::Error(CellError::Value)
        );
    }
}
