//! Relative-offset shifting, used to derive a shared formula's text for a
//! cell other than the one that stores it.

use gridcalc_common::{MAX_COLUMNS, MAX_ROWS};

use crate::reference::{Axis, CellRef, RefTarget, Reference, render_cell};
use crate::rewrite::map_references;

fn shift_axis(axis: Axis, delta: i64, limit: u32) -> Option<Axis> {
    if axis.absolute || delta == 0 {
        return Some(axis);
    }
    let moved = i64::from(axis.index) + delta;
    (1..=i64::from(limit))
        .contains(&moved)
        .then(|| Axis::new(moved as u32, false))
}

fn shift_cell(cell: CellRef, rows: i64, cols: i64) -> (Option<Axis>, Option<Axis>) {
    (
        shift_axis(cell.col, cols, MAX_COLUMNS),
        shift_axis(cell.row, rows, MAX_ROWS),
    )
}

/// Move every relative axis of every reference in `formula` by
/// `(rows, cols)`. Absolute axes stay put; axes pushed off the grid turn
/// into `#REF!`.
pub fn shift_formula(formula: &str, rows: i64, cols: i64) -> String {
    if rows == 0 && cols == 0 {
        return formula.to_string();
    }
    map_references(formula, |reference| {
        let prefix = reference
            .sheet
            .as_ref()
            .map(|s| s.prefix())
            .unwrap_or_default();
        let body = match reference.target {
            RefTarget::Cell(cell) => {
                let (col, row) = shift_cell(cell, rows, cols);
                render_cell(col, row)
            }
            RefTarget::Range(a, b) => match (shift_cell(a, rows, cols), shift_cell(b, rows, cols)) {
                ((Some(ac), Some(ar)), (Some(bc), Some(br))) => Reference {
                    sheet: None,
                    target: RefTarget::Range(CellRef { col: ac, row: ar }, CellRef { col: bc, row: br }),
                }
                .to_string(),
                _ => "#REF!".to_string(),
            },
            RefTarget::Columns(a, b) => match (
                shift_axis(a, cols, MAX_COLUMNS),
                shift_axis(b, cols, MAX_COLUMNS),
            ) {
                (Some(a), Some(b)) => Reference {
                    sheet: None,
                    target: RefTarget::Columns(a, b),
                }
                .to_string(),
                _ => "#REF!".to_string(),
            },
            RefTarget::Rows(a, b) => {
                match (shift_axis(a, rows, MAX_ROWS), shift_axis(b, rows, MAX_ROWS)) {
                    (Some(a), Some(b)) => Reference {
                        sheet: None,
                        target: RefTarget::Rows(a, b),
                    }
                    .to_string(),
                    _ => "#REF!".to_string(),
                }
            }
            RefTarget::Broken => return None,
        };
        Some(format!("{prefix}{body}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_relative_axes_only() {
        assert_eq!(shift_formula("A1*2", 2, 0), "A3*2");
        assert_eq!(shift_formula("$A1+A$1+$A$1", 1, 1), "$A2+B$1+$A$1");
        assert_eq!(shift_formula("SUM(A1:B2)", 0, 2), "SUM(C1:D2)");
        assert_eq!(shift_formula("SUM(A:A)", 5, 1), "SUM(B:B)");
        assert_eq!(shift_formula("Data!B2", 1, 0), "Data!B3");
    }

    #[test]
    fn zero_offset_is_identity() {
        assert_eq!(shift_formula("a1 + \"A1\"", 0, 0), "a1 + \"A1\"");
    }

    #[test]
    fn off_grid_becomes_ref_error() {
        assert_eq!(shift_formula("A1", -1, 0), "A#REF!");
        assert_eq!(shift_formula("SUM(A1:A2)", -1, 0), "SUM(#REF!)");
    }

    #[test]
    fn string_literals_untouched() {
        assert_eq!(shift_formula("IF(A1=\"B2\",A2,0)", 1, 0), "IF(A2=\"B2\",A3,0)");
    }
}
