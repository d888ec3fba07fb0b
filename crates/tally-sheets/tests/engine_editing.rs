//! Engine behavior: value entry, recalculation, errors, protection,
//! named ranges, and locale-sensitive parsing and display.

use pretty_assertions::assert_eq;
use tally_sheets::{CellError, CellValue, Engine, Error, HiddenKind, Locale, NameScope};

#[test]
fn cascading_recalculation() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A1", "10").unwrap();
    engine.set_cell_value(0, "A2", "20").unwrap();
    engine.set_cell_value(0, "B1", "=A1+1").unwrap();
    engine.set_cell_value(0, "B2", "=B1+A2").unwrap();

    assert_eq!(engine.display_value(0, "B1").unwrap(), "11");
    assert_eq!(engine.display_value(0, "B2").unwrap(), "31");

    engine.set_cell_value(0, "A1", "40").unwrap();
    assert_eq!(engine.display_value(0, "B1").unwrap(), "41");
    assert_eq!(engine.display_value(0, "B2").unwrap(), "61");
    // The untouched input is exactly as entered
    assert_eq!(engine.display_value(0, "A2").unwrap(), "20");
}

#[test]
fn range_formulas_recalculate_on_member_edits() {
    let mut engine = Engine::new();
    for (row, value) in ["1", "2", "3", "4"].iter().enumerate() {
        let address = format!("A{}", row + 1);
        engine.set_cell_value(0, &address, value).unwrap();
    }
    engine.set_cell_value(0, "B1", "=SUM(A1:A4)").unwrap();
    assert_eq!(engine.display_value(0, "B1").unwrap(), "10");

    engine.set_cell_value(0, "A3", "30").unwrap();
    assert_eq!(engine.display_value(0, "B1").unwrap(), "37");

    engine.clear_cell(0, "A1").unwrap();
    assert_eq!(engine.display_value(0, "B1").unwrap(), "36");
}

#[test]
fn formula_parse_error_rejects_the_edit() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A1", "keep me").unwrap();

    let result = engine.set_cell_value(0, "A1", "=SUM(1,");
    assert!(matches!(result, Err(Error::FormulaParse(_))));

    // The cell keeps its previous content and no history entry appears
    assert_eq!(engine.display_value(0, "A1").unwrap(), "keep me");
    assert_eq!(engine.history().undo_depth(), 1);
}

#[test]
fn division_by_zero_propagates_as_a_value() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A1", "=1/0").unwrap();
    engine.set_cell_value(0, "B1", "=A1+1").unwrap();
    engine.set_cell_value(0, "C1", "=COUNT(A1:B1)").unwrap();

    assert_eq!(engine.cell_error(0, "A1").unwrap(), Some(CellError::Div0));
    assert_eq!(engine.display_value(0, "A1").unwrap(), "#DIV/0!");
    // Dependents become the error...
    assert_eq!(engine.cell_error(0, "B1").unwrap(), Some(CellError::Div0));
    // ...except functions that tolerate errors
    assert_eq!(engine.display_value(0, "C1").unwrap(), "0");
}

#[test]
fn text_in_arithmetic_is_value_error() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A1", "pear").unwrap();
    engine.set_cell_value(0, "B1", "=A1*2").unwrap();
    assert_eq!(engine.cell_error(0, "B1").unwrap(), Some(CellError::Value));
}

#[test]
fn circular_references_leave_independent_branches_calculated() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A1", "=B1").unwrap();
    engine.set_cell_value(0, "B1", "=A1").unwrap();
    engine.set_cell_value(0, "C1", "=A1+1").unwrap();
    engine.set_cell_value(0, "D1", "5").unwrap();
    engine.set_cell_value(0, "E1", "=D1*2").unwrap();

    assert_eq!(engine.cell_error(0, "A1").unwrap(), Some(CellError::Circular));
    assert_eq!(engine.cell_error(0, "B1").unwrap(), Some(CellError::Circular));
    // Downstream of the cycle: the error propagates like any other
    assert_eq!(engine.cell_error(0, "C1").unwrap(), Some(CellError::Circular));
    // Independent branch is fully calculated
    assert_eq!(engine.display_value(0, "E1").unwrap(), "10");

    // Breaking the cycle recovers everything
    engine.set_cell_value(0, "B1", "7").unwrap();
    assert_eq!(engine.display_value(0, "A1").unwrap(), "7");
    assert_eq!(engine.display_value(0, "C1").unwrap(), "8");
}

#[test]
fn protection_blocks_locked_cells_only() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "B2", "original").unwrap();
    // Cells are locked by default; unlock C2 before protecting
    engine.set_range_locked(0, "C2", false).unwrap();
    engine.set_protection(0, true).unwrap();
    let depth = engine.history().undo_depth();

    let result = engine.set_cell_value(0, "B2", "x");
    assert!(matches!(result, Err(Error::ProtectionViolation(_))));
    assert_eq!(engine.display_value(0, "B2").unwrap(), "original");
    // Rejected edits leave no history entry
    assert_eq!(engine.history().undo_depth(), depth);

    engine.set_cell_value(0, "C2", "x").unwrap();
    assert_eq!(engine.display_value(0, "C2").unwrap(), "x");

    // Lifting protection unblocks the locked cell
    engine.set_protection(0, false).unwrap();
    engine.set_cell_value(0, "B2", "x").unwrap();
    assert_eq!(engine.display_value(0, "B2").unwrap(), "x");
}

#[test]
fn named_ranges_resolve_and_redefine() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "B1", "0.25").unwrap();
    engine.set_cell_value(0, "C1", "0.5").unwrap();
    engine
        .define_named_range(0, "TaxRate", "B1", NameScope::Workbook)
        .unwrap();
    engine.set_cell_value(0, "A1", "=TaxRate*100").unwrap();
    assert_eq!(engine.display_value(0, "A1").unwrap(), "25");
    assert_eq!(engine.raw_input(0, "A1").unwrap(), Some("=TaxRate*100"));

    // Redefining the name needs no formula rewrite, only recalculation
    engine
        .define_named_range(0, "TaxRate", "C1", NameScope::Workbook)
        .unwrap();
    assert_eq!(engine.display_value(0, "A1").unwrap(), "50");

    let names: Vec<&str> = engine.named_ranges(0).iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["TaxRate"]);

    engine.set_cell_value(0, "D1", "=Unknown+1").unwrap();
    assert_eq!(engine.cell_error(0, "D1").unwrap(), Some(CellError::Name));
}

#[test]
fn subtotal_skips_rows_hidden_by_a_subtotal_pass() {
    let mut engine = Engine::new();
    for (row, value) in ["10", "20", "30", "40"].iter().enumerate() {
        let address = format!("A{}", row + 1);
        engine.set_cell_value(0, &address, value).unwrap();
    }
    engine.set_cell_value(0, "B1", "=SUBTOTAL(9,A1:A4)").unwrap();
    engine.set_cell_value(0, "B2", "=SUBTOTAL(109,A1:A4)").unwrap();
    assert_eq!(engine.display_value(0, "B1").unwrap(), "100");

    engine.set_row_hidden(0, 1, Some(HiddenKind::Subtotal)).unwrap();
    assert_eq!(engine.display_value(0, "B1").unwrap(), "80");

    // A manual hide is only skipped by the 100-series codes
    engine.set_row_hidden(0, 2, Some(HiddenKind::Manual)).unwrap();
    assert_eq!(engine.display_value(0, "B1").unwrap(), "80");
    assert_eq!(engine.display_value(0, "B2").unwrap(), "50");

    // Unhiding is undoable and recalculates
    engine.undo();
    engine.undo();
    assert_eq!(engine.display_value(0, "B1").unwrap(), "100");
}

#[test]
fn locale_parsing_follows_the_decimal_separator() {
    let mut engine = Engine::with_locale(Locale::de_de());
    engine.set_cell_value(0, "A1", "4,3").unwrap();
    assert_eq!(engine.cell_value(0, "A1").unwrap(), CellValue::Number(4.3));
    assert_eq!(engine.display_value(0, "A1").unwrap(), "4,3");
    // Text coercion in arithmetic also honors the locale
    engine.set_cell_value(0, "A2", "'2,5").unwrap();
    engine.set_cell_value(0, "B1", "=A1+A2").unwrap();
    assert_eq!(engine.cell_value(0, "B1").unwrap().as_number(), Some(6.8));

    // The same entry stays text under en-US
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A1", "4,3").unwrap();
    assert_eq!(engine.cell_value(0, "A1").unwrap().as_str(), Some("4,3"));
}

#[test]
fn entered_spellings_suggest_display_formats() {
    let mut engine = Engine::new();

    engine.set_cell_value(0, "A1", "50%").unwrap();
    assert_eq!(engine.cell_value(0, "A1").unwrap(), CellValue::Number(0.5));
    assert_eq!(engine.display_value(0, "A1").unwrap(), "50%");

    engine.set_cell_value(0, "A2", "1/15/2024").unwrap();
    assert_eq!(engine.display_value(0, "A2").unwrap(), "1/15/2024");
    // Dates are serial numbers underneath
    assert!(engine.cell_value(0, "A2").unwrap().as_number().is_some());

    // A numeric prefix with trailing garbage stays text
    engine.set_cell_value(0, "A3", "3rd").unwrap();
    assert_eq!(engine.cell_value(0, "A3").unwrap().as_str(), Some("3rd"));
}

#[test]
fn raw_input_is_preserved_verbatim() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A1", "=SUM( B1:B2 , 3 )").unwrap();
    assert_eq!(engine.raw_input(0, "A1").unwrap(), Some("=SUM( B1:B2 , 3 )"));

    engine.set_cell_value(0, "A2", "'007").unwrap();
    assert_eq!(engine.raw_input(0, "A2").unwrap(), Some("'007"));
    // The apostrophe forces text and is stripped from the value
    assert_eq!(engine.display_value(0, "A2").unwrap(), "007");
}

#[test]
fn cross_sheet_references() {
    let mut engine = Engine::new();
    let data = engine.add_sheet("Data").unwrap();
    engine.set_cell_value(data, "A1", "100").unwrap();
    engine.set_cell_value(0, "A1", "=Data!A1*2").unwrap();
    assert_eq!(engine.display_value(0, "A1").unwrap(), "200");

    // Edits on the other sheet flow through
    engine.set_cell_value(data, "A1", "7").unwrap();
    assert_eq!(engine.display_value(0, "A1").unwrap(), "14");

    // Removing the sheet makes the reference #REF!, stuck in the text
    engine.remove_sheet(data).unwrap();
    assert_eq!(engine.cell_error(0, "A1").unwrap(), Some(CellError::Ref));
    assert_eq!(engine.raw_input(0, "A1").unwrap(), Some("=#REF!*2"));
}
