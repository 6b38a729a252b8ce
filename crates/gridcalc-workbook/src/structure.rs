//! Row and column insertion, removal and moves.
//!
//! An edit moves the records of one sheet, rewrites the references of every
//! formula in every sheet, remaps the calc chain and drops all cached
//! results. Nothing is recalculated.

use gridcalc_common::{MAX_COLUMNS, MAX_ROWS, column_number};
use gridcalc_parse::{EditAxis, StructuralEdit, rewrite_formula};

use crate::error::WorkbookError;
use crate::workbook::Workbook;
use crate::worksheet::relocate;

fn check_row(row: u32) -> Result<u32, WorkbookError> {
    if (1..=MAX_ROWS).contains(&row) {
        Ok(row)
    } else {
        Err(WorkbookError::InvalidCellReference(format!("row {row}")))
    }
}

fn check_col(col: &str) -> Result<u32, WorkbookError> {
    column_number(col.trim())
        .map_err(|_| WorkbookError::InvalidCellReference(col.to_string()))
}

/// Every position an edit names must lie on the grid.
fn check_edit(edit: &StructuralEdit) -> Result<(), WorkbookError> {
    let positions = match *edit {
        StructuralEdit::InsertRows { at, .. }
        | StructuralEdit::RemoveRows { at, .. }
        | StructuralEdit::InsertColumns { at, .. }
        | StructuralEdit::RemoveColumns { at, .. } => [at, at],
        StructuralEdit::MoveRow { from, to, .. } | StructuralEdit::MoveColumn { from, to, .. } => {
            [from, to]
        }
    };
    let (axis, limit) = match edit.axis() {
        EditAxis::Row => ("row", MAX_ROWS),
        EditAxis::Column => ("column", MAX_COLUMNS),
    };
    match positions.into_iter().find(|i| !(1..=limit).contains(i)) {
        Some(bad) => Err(WorkbookError::InvalidCellReference(format!("{axis} {bad}"))),
        None => Ok(()),
    }
}

impl Workbook {
    /// Insert `count` empty rows before `row`.
    pub fn insert_rows(&mut self, sheet: &str, row: u32, count: u32) -> Result<(), WorkbookError> {
        let at = check_row(row)?;
        self.apply_structural_edit(StructuralEdit::InsertRows {
            sheet: sheet.to_string(),
            at,
            count,
        })
    }

    pub fn remove_row(&mut self, sheet: &str, row: u32) -> Result<(), WorkbookError> {
        let at = check_row(row)?;
        self.apply_structural_edit(StructuralEdit::RemoveRows {
            sheet: sheet.to_string(),
            at,
            count: 1,
        })
    }

    /// Insert `count` empty columns before column `col` (`"C"`).
    pub fn insert_cols(&mut self, sheet: &str, col: &str, count: u32) -> Result<(), WorkbookError> {
        let at = check_col(col)?;
        self.apply_structural_edit(StructuralEdit::InsertColumns {
            sheet: sheet.to_string(),
            at,
            count,
        })
    }

    pub fn remove_col(&mut self, sheet: &str, col: &str) -> Result<(), WorkbookError> {
        let at = check_col(col)?;
        self.apply_structural_edit(StructuralEdit::RemoveColumns {
            sheet: sheet.to_string(),
            at,
            count: 1,
        })
    }

    /// Move row `from` so it ends up at index `to`; rows in between shift
    /// by one toward the vacated slot.
    pub fn move_row(&mut self, sheet: &str, from: u32, to: u32) -> Result<(), WorkbookError> {
        let (from, to) = (check_row(from)?, check_row(to)?);
        self.apply_structural_edit(StructuralEdit::MoveRow {
            sheet: sheet.to_string(),
            from,
            to,
        })
    }

    pub fn move_col(&mut self, sheet: &str, from: &str, to: &str) -> Result<(), WorkbookError> {
        let (from, to) = (check_col(from)?, check_col(to)?);
        self.apply_structural_edit(StructuralEdit::MoveColumn {
            sheet: sheet.to_string(),
            from,
            to,
        })
    }

    /// Apply any structural edit. Shared formulas in all sheets are turned
    /// into plain formulas first so every rewrite sees effective text.
    pub fn apply_structural_edit(&mut self, edit: StructuralEdit) -> Result<(), WorkbookError> {
        check_edit(&edit)?;
        let idx = self.sheet_index(edit.sheet())?;
        if edit.is_noop() {
            return Ok(());
        }

        let materialized: usize = self.sheets.iter_mut().map(|ws| ws.materialize_shared()).sum();
        self.sheets[idx].apply_edit(&edit);
        for ws in &mut self.sheets {
            let name = ws.name().to_string();
            ws.rewrite_formulas(|formula| rewrite_formula(formula, &name, &edit));
        }

        let id = self.sheets[idx].id();
        self.chain.remap_sheet(id, |cell| relocate(&edit, cell));
        self.cache.clear();

        tracing::debug!(?edit, materialized, chain = self.chain.len(), "structural edit applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_are_validated() {
        let mut wb = Workbook::new();
        assert!(wb.insert_rows("Sheet1", 0, 1).is_err());
        assert!(wb.remove_col("Sheet1", "1").is_err());
        assert_eq!(
            wb.move_row("Nope", 1, 2),
            Err(WorkbookError::SheetNotFound("Nope".into()))
        );
    }

    #[test]
    fn raw_edits_off_the_grid_are_rejected() {
        let mut wb = Workbook::new();
        wb.set_cell_value("Sheet1", "A1", 1).unwrap();
        wb.set_cell_formula("Sheet1", "B1", "A1").unwrap();

        let remove = StructuralEdit::RemoveRows {
            sheet: "Sheet1".into(),
            at: 0,
            count: 1,
        };
        assert_eq!(
            wb.apply_structural_edit(remove),
            Err(WorkbookError::InvalidCellReference("row 0".into()))
        );
        let mv = StructuralEdit::MoveRow {
            sheet: "Sheet1".into(),
            from: 1,
            to: 0,
        };
        assert!(wb.apply_structural_edit(mv).is_err());
        let wide = StructuralEdit::InsertColumns {
            sheet: "Sheet1".into(),
            at: MAX_COLUMNS + 1,
            count: 1,
        };
        assert!(wb.apply_structural_edit(wide).is_err());

        assert_eq!(wb.get_rows("Sheet1").unwrap(), vec![vec!["1".to_string()]]);
        assert_eq!(wb.get_cell_formula("Sheet1", "B1").unwrap(), "A1");
    }

    #[test]
    fn zero_sized_edits_change_nothing() {
        let mut wb = Workbook::new();
        wb.set_cell_formula("Sheet1", "B2", "A2").unwrap();
        wb.insert_rows("Sheet1", 1, 0).unwrap();
        wb.move_col("Sheet1", "A", "A").unwrap();
        assert_eq!(wb.get_cell_formula("Sheet1", "B2").unwrap(), "A2");
    }

    #[test]
    fn chain_follows_moved_cells() {
        let mut wb = Workbook::new();
        wb.set_cell_formula("Sheet1", "B2", "A2").unwrap();
        wb.set_cell_formula("Sheet1", "B3", "A3").unwrap();
        wb.insert_rows("Sheet1", 3, 2).unwrap();
        assert!(wb.calc_chain_contains("Sheet1", "B2"));
        assert!(wb.calc_chain_contains("Sheet1", "B5"));
        assert!(!wb.calc_chain_contains("Sheet1", "B3"));
        assert_eq!(wb.get_cell_formula("Sheet1", "B5").unwrap(), "A5");

        wb.remove_row("Sheet1", 2).unwrap();
        assert_eq!(wb.calc_chain().len(), 1);
        assert!(wb.calc_chain_contains("Sheet1", "B4"));
    }
}
