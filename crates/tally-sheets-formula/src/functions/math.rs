//! Math and aggregation functions

use super::criteria::CriteriaMatcher;
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use tally_sheets_core::CellError;

/// Visit every scalar in an argument list, flattening arrays.
/// Returns the first error encountered, if any.
fn for_each_scalar<'a>(
    args: &'a [FormulaValue],
    mut visit: impl FnMut(&'a FormulaValue),
) -> Option<CellError> {
    for arg in args {
        match arg {
            FormulaValue::Error(e) => return Some(*e),
            FormulaValue::Array(rows) => {
                for row in rows {
                    for cell in row {
                        if let FormulaValue::Error(e) = cell {
                            return Some(*e);
                        }
                        visit(cell);
                    }
                }
            }
            other => visit(other),
        }
    }
    None
}

/// SUM: adds numbers, ignores text and empties, propagates errors
pub fn fn_sum(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut sum = 0.0;
    if let Some(e) = for_each_scalar(args, |v| {
        if let FormulaValue::Number(n) = v {
            sum += n;
        }
    }) {
        return Ok(FormulaValue::Error(e));
    }
    Ok(FormulaValue::Number(sum))
}

/// PRODUCT: multiplies numbers, ignoring non-numeric entries
pub fn fn_product(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut product = 1.0;
    let mut seen = false;
    if let Some(e) = for_each_scalar(args, |v| {
        if let FormulaValue::Number(n) = v {
            product *= n;
            seen = true;
        }
    }) {
        return Ok(FormulaValue::Error(e));
    }
    Ok(FormulaValue::Number(if seen { product } else { 0.0 }))
}

/// AVERAGE of the numeric entries; #DIV/0! when there are none
pub fn fn_average(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut sum = 0.0;
    let mut count = 0usize;
    if let Some(e) = for_each_scalar(args, |v| {
        if let FormulaValue::Number(n) = v {
            sum += n;
            count += 1;
        }
    }) {
        return Ok(FormulaValue::Error(e));
    }
    if count == 0 {
        Ok(FormulaValue::Error(CellError::Div0))
    } else {
        Ok(FormulaValue::Number(sum / count as f64))
    }
}

/// MIN of the numeric entries; 0 when there are none
pub fn fn_min(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut min: Option<f64> = None;
    if let Some(e) = for_each_scalar(args, |v| {
        if let FormulaValue::Number(n) = v {
            min = Some(min.map_or(*n, |m| m.min(*n)));
        }
    }) {
        return Ok(FormulaValue::Error(e));
    }
    Ok(FormulaValue::Number(min.unwrap_or(0.0)))
}

/// MAX of the numeric entries; 0 when there are none
pub fn fn_max(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut max: Option<f64> = None;
    if let Some(e) = for_each_scalar(args, |v| {
        if let FormulaValue::Number(n) = v {
            max = Some(max.map_or(*n, |m| m.max(*n)));
        }
    }) {
        return Ok(FormulaValue::Error(e));
    }
    Ok(FormulaValue::Number(max.unwrap_or(0.0)))
}

/// COUNT: numeric entries only; errors in the range are skipped, not
/// propagated
pub fn fn_count(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut count = 0usize;
    for arg in args {
        match arg {
            FormulaValue::Number(_) => count += 1,
            FormulaValue::Array(rows) => {
                for row in rows {
                    for cell in row {
                        if matches!(cell, FormulaValue::Number(_)) {
                            count += 1;
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(FormulaValue::Number(count as f64))
}

/// COUNTA: non-empty entries, errors included
pub fn fn_counta(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut count = 0usize;
    for arg in args {
        match arg {
            FormulaValue::Empty => {}
            FormulaValue::Array(rows) => {
                for row in rows {
                    for cell in row {
                        if !matches!(cell, FormulaValue::Empty) {
                            count += 1;
                        }
                    }
                }
            }
            _ => count += 1,
        }
    }
    Ok(FormulaValue::Number(count as f64))
}

fn flatten(value: &FormulaValue) -> Vec<&FormulaValue> {
    match value {
        FormulaValue::Array(rows) => rows.iter().flatten().collect(),
        other => vec![other],
    }
}

/// COUNTIF(range, criteria)
pub fn fn_countif(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let matcher = CriteriaMatcher::new(&args[1]);
    let count = flatten(&args[0]).into_iter().filter(|v| matcher.matches(v)).count();
    Ok(FormulaValue::Number(count as f64))
}

/// SUMIF(range, criteria, [sum_range]): sums `sum_range` (or the range
/// itself) where the criteria matches positionally
pub fn fn_sumif(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let matcher = CriteriaMatcher::new(&args[1]);
    let test_values = flatten(&args[0]);
    let sum_values = match args.get(2) {
        Some(range) => flatten(range),
        None => test_values.clone(),
    };

    let mut sum = 0.0;
    for (i, test) in test_values.iter().enumerate() {
        if matcher.matches(test) {
            match sum_values.get(i) {
                Some(FormulaValue::Number(n)) => sum += n,
                Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
                _ => {}
            }
        }
    }
    Ok(FormulaValue::Number(sum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_sheets_core::Workbook;

    fn ctx_eval(f: super::super::FunctionImpl, args: &[FormulaValue]) -> FormulaValue {
        let wb = Workbook::new();
        let ctx = EvaluationContext::new(&wb, 0);
        f(args, &ctx).unwrap()
    }

    fn nums(values: &[f64]) -> FormulaValue {
        FormulaValue::Array(vec![values.iter().map(|&n| FormulaValue::Number(n)).collect()])
    }

    #[test]
    fn sum_ignores_text_but_propagates_errors() {
        let args = vec![
            FormulaValue::Number(1.0),
            FormulaValue::String("x".into()),
            nums(&[2.0, 3.0]),
        ];
        assert_eq!(ctx_eval(fn_sum, &args), FormulaValue::Number(6.0));

        let args = vec![
            FormulaValue::Number(1.0),
            FormulaValue::Array(vec![vec![FormulaValue::Error(CellError::Ref)]]),
        ];
        assert_eq!(ctx_eval(fn_sum, &args), FormulaValue::Error(CellError::Ref));
    }

    #[test]
    fn count_skips_errors_and_text() {
        let args = vec![FormulaValue::Array(vec![vec![
            FormulaValue::Number(1.0),
            FormulaValue::Error(CellError::Div0),
            FormulaValue::String("x".into()),
            FormulaValue::Empty,
            FormulaValue::Number(2.0),
        ]])];
        assert_eq!(ctx_eval(fn_count, &args), FormulaValue::Number(2.0));
        assert_eq!(ctx_eval(fn_counta, &args), FormulaValue::Number(4.0));
    }

    #[test]
    fn average_of_nothing_is_div0() {
        let args = vec![FormulaValue::String("a".into())];
        assert_eq!(ctx_eval(fn_average, &args), FormulaValue::Error(CellError::Div0));
        assert_eq!(ctx_eval(fn_average, &[nums(&[2.0, 4.0])]), FormulaValue::Number(3.0));
    }

    #[test]
    fn min_max_product() {
        let arg = nums(&[3.0, -1.0, 7.0]);
        assert_eq!(ctx_eval(fn_min, std::slice::from_ref(&arg)), FormulaValue::Number(-1.0));
        assert_eq!(ctx_eval(fn_max, std::slice::from_ref(&arg)), FormulaValue::Number(7.0));
        assert_eq!(
            ctx_eval(fn_product, &[nums(&[2.0, 3.0, 4.0])]),
            FormulaValue::Number(24.0)
        );
    }

    #[test]
    fn countif_with_comparison_criteria() {
        let args = vec![nums(&[1.0, 5.0, 10.0, 20.0]), FormulaValue::String(">4".into())];
        assert_eq!(ctx_eval(fn_countif, &args), FormulaValue::Number(3.0));
    }

    #[test]
    fn sumif_with_separate_sum_range() {
        let args = vec![
            FormulaValue::Array(vec![vec![
                FormulaValue::String("a".into()),
                FormulaValue::String("b".into()),
                FormulaValue::String("a".into()),
            ]]),
            FormulaValue::String("a".into()),
            nums(&[10.0, 20.0, 30.0]),
        ];
        assert_eq!(ctx_eval(fn_sumif, &args), FormulaValue::Number(40.0));
    }

    #[test]
    fn sumif_without_sum_range_sums_matches() {
        let args = vec![nums(&[1.0, 5.0, 10.0]), FormulaValue::String(">=5".into())];
        assert_eq!(ctx_eval(fn_sumif, &args), FormulaValue::Number(15.0));
    }
}
