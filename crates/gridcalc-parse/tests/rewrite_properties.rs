// Property tests for the structural reference rewriter.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use gridcalc_parse::{StructuralEdit, rewrite_formula};
use proptest::prelude::*;

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn col_letters(col: u32) -> String {
    gridcalc_common::column_name(col)
}

fn anchor(abs: bool) -> &'static str {
    if abs { "$" } else { "" }
}

/// A canonical cell reference (uppercase, as the rewriter renders it).
fn arb_cell() -> impl Strategy<Value = String> {
    (1u32..60, 1u32..500, any::<bool>(), any::<bool>())
        .prop_map(|(c, r, ca, ra)| format!("{}{}{}{}", anchor(ca), col_letters(c), anchor(ra), r))
}

fn arb_range() -> impl Strategy<Value = String> {
    (1u32..60, 1u32..500, 0u32..20, 0u32..200).prop_map(|(c, r, w, h)| {
        format!(
            "{}{}:{}{}",
            col_letters(c),
            r,
            col_letters(c + w),
            r + h
        )
    })
}

/// Cells and ranges, reversed ranges included, whose rows all lie above `at`.
fn arb_formula_above(at: u32) -> impl Strategy<Value = String> {
    let atom = prop_oneof![
        (1u32..60, 1..at).prop_map(|(c, r)| format!("{}{}", col_letters(c), r)),
        (1u32..60, 1..at, 1u32..60, 1..at).prop_map(|(c1, r1, c2, r2)| {
            format!("SUM({}{}:{}{})", col_letters(c1), r1, col_letters(c2), r2)
        }),
    ];
    prop::collection::vec(atom, 1..5).prop_map(|atoms| atoms.join("+"))
}

fn arb_qualifier() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        3 => Just(""),
        1 => Just("Sheet1!"),
        1 => Just("Data!"),
        1 => Just("'Daily Inventory'!"),
    ]
}

fn arb_literal_body() -> impl Strategy<Value = String> {
    r"[A-Z]{1,2}[0-9]{1,3}( [A-Z]{1,2}[0-9]{1,3}){0,3}"
}

fn arb_atom() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => (arb_qualifier(), arb_cell()).prop_map(|(q, c)| format!("{q}{c}")),
        2 => (arb_qualifier(), arb_range()).prop_map(|(q, r)| format!("SUM({q}{r})")),
        1 => (1u32..40).prop_map(|c| format!("SUM({0}:{0})", col_letters(c))),
        1 => arb_literal_body().prop_map(|s| format!("\"{s}\"")),
        1 => (0u32..1000).prop_map(|n| n.to_string()),
    ]
}

fn arb_formula() -> impl Strategy<Value = String> {
    prop::collection::vec((arb_atom(), prop_oneof![Just("+"), Just("*"), Just("&"), Just("-")]), 1..6)
        .prop_map(|parts| {
            let mut out = String::new();
            for (i, (atom, op)) in parts.iter().enumerate() {
                if i > 0 {
                    out.push_str(op);
                }
                out.push_str(atom);
            }
            out
        })
}

fn arb_sheet() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Sheet1".to_string()),
        Just("Data".to_string()),
        Just("Daily Inventory".to_string()),
    ]
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config())]

    /// Inserting and then removing the same block restores every reference.
    #[test]
    fn insert_then_remove_rows_is_identity(
        formula in arb_formula(),
        sheet in arb_sheet(),
        at in 1u32..600,
        count in 1u32..40,
    ) {
        let insert = StructuralEdit::InsertRows { sheet: sheet.clone(), at, count };
        let remove = StructuralEdit::RemoveRows { sheet: sheet.clone(), at, count };
        let once = rewrite_formula(&formula, "Sheet1", &insert);
        let back = rewrite_formula(&once, "Sheet1", &remove);
        prop_assert_eq!(back, formula);
    }

    #[test]
    fn insert_then_remove_columns_is_identity(
        formula in arb_formula(),
        sheet in arb_sheet(),
        at in 1u32..80,
        count in 1u32..10,
    ) {
        let insert = StructuralEdit::InsertColumns { sheet: sheet.clone(), at, count };
        let remove = StructuralEdit::RemoveColumns { sheet, at, count };
        let once = rewrite_formula(&formula, "Sheet1", &insert);
        let back = rewrite_formula(&once, "Sheet1", &remove);
        prop_assert_eq!(back, formula);
    }

    /// Row edits below every referenced row leave the text alone, whatever
    /// the orientation of its ranges.
    #[test]
    fn references_above_row_edits_are_untouched(
        (at, formula) in (2u32..500).prop_flat_map(|at| (Just(at), arb_formula_above(at))),
        count in 1u32..40,
        to_offset in 0u32..40,
    ) {
        let edits = [
            StructuralEdit::InsertRows { sheet: "Sheet1".into(), at, count },
            StructuralEdit::RemoveRows { sheet: "Sheet1".into(), at, count },
            StructuralEdit::MoveRow { sheet: "Sheet1".into(), from: at, to: at + to_offset },
        ];
        for edit in &edits {
            prop_assert_eq!(rewrite_formula(&formula, "Sheet1", edit), formula.clone());
        }
    }

    /// String literal contents survive any edit byte for byte.
    #[test]
    fn string_literals_survive_edits(
        prefix in arb_formula(),
        body in arb_literal_body(),
        at in 1u32..50,
        count in 1u32..5,
        remove in any::<bool>(),
    ) {
        let formula = format!("{prefix}&\"{body}\"");
        let edit = if remove {
            StructuralEdit::RemoveRows { sheet: "Sheet1".into(), at, count }
        } else {
            StructuralEdit::InsertColumns { sheet: "Sheet1".into(), at, count }
        };
        let out = rewrite_formula(&formula, "Sheet1", &edit);
        let quoted = format!("\"{body}\"");
        prop_assert!(out.ends_with(&quoted));
    }

    /// Zero-size edits and same-position moves leave the text alone.
    #[test]
    fn noop_edits_are_identity(formula in arb_formula(), idx in 1u32..500) {
        let edits = [
            StructuralEdit::InsertRows { sheet: "Sheet1".into(), at: idx, count: 0 },
            StructuralEdit::RemoveColumns { sheet: "Sheet1".into(), at: idx, count: 0 },
            StructuralEdit::MoveRow { sheet: "Sheet1".into(), from: idx, to: idx },
        ];
        for edit in &edits {
            prop_assert_eq!(rewrite_formula(&formula, "Sheet1", edit), formula.clone());
        }
    }

    /// A move followed by the opposite move restores single-cell references.
    #[test]
    fn move_row_roundtrip_for_cells(
        cell in arb_cell(),
        from in 1u32..500,
        to in 1u32..500,
    ) {
        let there = StructuralEdit::MoveRow { sheet: "Sheet1".into(), from, to };
        let back = StructuralEdit::MoveRow { sheet: "Sheet1".into(), from: to, to: from };
        let once = rewrite_formula(&cell, "Sheet1", &there);
        prop_assert_eq!(rewrite_formula(&once, "Sheet1", &back), cell);
    }

    /// Edits on a sheet nobody references change nothing.
    #[test]
    fn edits_on_other_sheets_are_ignored(formula in arb_formula(), at in 1u32..100) {
        let edit = StructuralEdit::RemoveRows { sheet: "Elsewhere".into(), at, count: 3 };
        prop_assert_eq!(rewrite_formula(&formula, "Sheet1", &edit), formula);
    }
}
