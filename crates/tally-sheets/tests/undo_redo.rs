//! Undo/redo: atomic compound edits, exact state restoration, and
//! redo-stack invalidation.

use pretty_assertions::assert_eq;
use tally_sheets::{CellComment, Engine};

/// Display text and raw input across a small grid, for exact-state
/// comparisons
fn snapshot(engine: &Engine) -> Vec<String> {
    let mut out = Vec::new();
    for row in 1..=9 {
        for col in ["A", "B", "C", "D", "E", "F"] {
            let address = format!("{}{}", col, row);
            out.push(format!(
                "{}={}|{:?}",
                address,
                engine.display_value(0, &address).unwrap(),
                engine.raw_input(0, &address).unwrap()
            ));
        }
    }
    out
}

#[test]
fn empty_stacks_are_noops() {
    let mut engine = Engine::new();
    assert!(!engine.undo());
    assert!(!engine.redo());
    assert!(!engine.can_undo());
    assert!(!engine.can_redo());
}

#[test]
fn undo_reverts_a_value_edit_and_its_dependents() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A1", "10").unwrap();
    engine.set_cell_value(0, "B1", "=A1*2").unwrap();
    engine.set_cell_value(0, "A1", "50").unwrap();
    assert_eq!(engine.display_value(0, "B1").unwrap(), "100");

    engine.undo();
    assert_eq!(engine.display_value(0, "A1").unwrap(), "10");
    assert_eq!(engine.display_value(0, "B1").unwrap(), "20");

    engine.redo();
    assert_eq!(engine.display_value(0, "A1").unwrap(), "50");
    assert_eq!(engine.display_value(0, "B1").unwrap(), "100");
}

#[test]
fn merge_undo_restores_both_cells() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A1", "left").unwrap();
    engine.set_cell_value(0, "B1", "right").unwrap();

    engine.merge_cells(0, "A1:B1").unwrap();
    assert_eq!(engine.display_value(0, "A1").unwrap(), "left");
    assert_eq!(engine.display_value(0, "B1").unwrap(), "");

    engine.undo();
    assert_eq!(engine.display_value(0, "A1").unwrap(), "left");
    assert_eq!(engine.display_value(0, "B1").unwrap(), "right");
    assert!(engine.workbook().worksheet(0).unwrap().merged_regions().is_empty());

    engine.redo();
    assert_eq!(engine.display_value(0, "B1").unwrap(), "");
    assert_eq!(
        engine.workbook().worksheet(0).unwrap().merged_regions()[0].to_a1_string(),
        "A1:B1"
    );
}

#[test]
fn unmerge_does_not_restore_content_but_undoing_the_merge_does() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A1", "keep").unwrap();
    engine.set_cell_value(0, "B1", "blanked").unwrap();
    engine.merge_cells(0, "A1:B1").unwrap();

    // Unmerging leaves the blanked cell blank
    engine.unmerge_cells(0, "A1:B1").unwrap();
    assert_eq!(engine.display_value(0, "B1").unwrap(), "");

    // Undo the unmerge, then undo the merge: content comes back
    engine.undo();
    engine.undo();
    assert_eq!(engine.display_value(0, "B1").unwrap(), "blanked");
}

#[test]
fn paste_is_one_atomic_undo_step() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A1", "1").unwrap();
    engine.set_cell_value(0, "A2", "2").unwrap();
    engine.set_cell_value(0, "B1", "=A1*10").unwrap();

    engine.paste_region(0, "A1:B2", "D5").unwrap();
    assert_eq!(engine.display_value(0, "D5").unwrap(), "1");
    assert_eq!(engine.display_value(0, "D6").unwrap(), "2");
    // The pasted formula was rebased to its new home
    assert_eq!(engine.raw_input(0, "E5").unwrap(), Some("=D5*10"));
    assert_eq!(engine.display_value(0, "E5").unwrap(), "10");

    engine.undo();
    assert_eq!(engine.display_value(0, "D5").unwrap(), "");
    assert_eq!(engine.display_value(0, "D6").unwrap(), "");
    assert_eq!(engine.display_value(0, "E5").unwrap(), "");
    // Sources untouched
    assert_eq!(engine.display_value(0, "A1").unwrap(), "1");
}

#[test]
fn structural_undo_restores_rewritten_formulas() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A3", "42").unwrap();
    engine.set_cell_value(0, "C1", "=A3").unwrap();

    engine.delete_rows(0, 1, 1).unwrap();
    assert_eq!(engine.raw_input(0, "C1").unwrap(), Some("=A2"));

    engine.undo();
    assert_eq!(engine.raw_input(0, "C1").unwrap(), Some("=A3"));
    assert_eq!(engine.display_value(0, "C1").unwrap(), "42");
    assert_eq!(engine.display_value(0, "A3").unwrap(), "42");

    engine.redo();
    assert_eq!(engine.raw_input(0, "C1").unwrap(), Some("=A2"));
    assert_eq!(engine.display_value(0, "C1").unwrap(), "42");
}

#[test]
fn undo_then_redo_restores_the_exact_state() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A1", "10").unwrap();
    engine.set_cell_value(0, "B1", "=A1*2").unwrap();
    engine.set_cell_value(0, "C1", "x").unwrap();
    engine.merge_cells(0, "C1:D1").unwrap();
    engine.insert_rows(0, 1, 2).unwrap();
    engine.paste_region(0, "A1:B1", "A5").unwrap();

    let after = snapshot(&engine);
    engine.undo();
    engine.redo();
    assert_eq!(snapshot(&engine), after);

    // Unwinding the whole session and replaying it lands on the same
    // state again
    while engine.undo() {}
    let blank = snapshot(&engine);
    assert!(blank.iter().all(|line| line.contains("=|None")));
    while engine.redo() {}
    assert_eq!(snapshot(&engine), after);
}

#[test]
fn new_commands_clear_the_redo_stack() {
    let mut engine = Engine::new();
    engine.set_cell_value(0, "A1", "first").unwrap();
    engine.undo();
    assert!(engine.can_redo());

    engine.set_cell_value(0, "A1", "second").unwrap();
    assert!(!engine.can_redo());
    assert_eq!(engine.display_value(0, "A1").unwrap(), "second");
}

#[test]
fn comment_and_protection_commands_are_undoable() {
    let mut engine = Engine::new();
    engine
        .set_comment(0, "A1", CellComment::text_only("note"))
        .unwrap();
    engine.remove_comment(0, "A1").unwrap();

    engine.undo();
    let ws = engine.workbook().worksheet(0).unwrap();
    assert_eq!(ws.comment_at(0, 0).unwrap().text, "note");
    engine.undo();
    assert!(engine.workbook().worksheet(0).unwrap().comment_at(0, 0).is_none());

    engine.set_protection(0, true).unwrap();
    assert!(engine.workbook().worksheet(0).unwrap().protection().enabled);
    engine.undo();
    assert!(!engine.workbook().worksheet(0).unwrap().protection().enabled);

    engine.set_range_locked(0, "C2", false).unwrap();
    assert!(!engine.workbook().worksheet(0).unwrap().is_cell_locked_at(1, 2));
    engine.undo();
    assert!(engine.workbook().worksheet(0).unwrap().is_cell_locked_at(1, 2));
}
