//! Rewriting of formula references after rows or columns are inserted,
//! removed or moved.
//!
//! Rewriting works on the token stream, so text inside string literals,
//! function names and numbers is never touched. References that do not
//! change are copied byte for byte; only changed references are re-rendered.

use gridcalc_common::{MAX_COLUMNS, MAX_ROWS};

use crate::reference::{Axis, CellRef, RefTarget, Reference, render_cell};
use crate::tokenizer::{TokenSubType, TokenType, Tokenizer};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A structural change to one worksheet. Indices are 1-based.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralEdit {
    InsertRows { sheet: String, at: u32, count: u32 },
    RemoveRows { sheet: String, at: u32, count: u32 },
    InsertColumns { sheet: String, at: u32, count: u32 },
    RemoveColumns { sheet: String, at: u32, count: u32 },
    MoveRow { sheet: String, from: u32, to: u32 },
    MoveColumn { sheet: String, from: u32, to: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditAxis {
    Row,
    Column,
}

impl StructuralEdit {
    pub fn sheet(&self) -> &str {
        match self {
            StructuralEdit::InsertRows { sheet, .. }
            | StructuralEdit::RemoveRows { sheet, .. }
            | StructuralEdit::InsertColumns { sheet, .. }
            | StructuralEdit::RemoveColumns { sheet, .. }
            | StructuralEdit::MoveRow { sheet, .. }
            | StructuralEdit::MoveColumn { sheet, .. } => sheet,
        }
    }

    pub fn axis(&self) -> EditAxis {
        match self {
            StructuralEdit::InsertRows { .. }
            | StructuralEdit::RemoveRows { .. }
            | StructuralEdit::MoveRow { .. } => EditAxis::Row,
            _ => EditAxis::Column,
        }
    }

    /// Edits that leave every index where it is.
    pub fn is_noop(&self) -> bool {
        match self {
            StructuralEdit::InsertRows { count, .. }
            | StructuralEdit::RemoveRows { count, .. }
            | StructuralEdit::InsertColumns { count, .. }
            | StructuralEdit::RemoveColumns { count, .. } => *count == 0,
            StructuralEdit::MoveRow { from, to, .. }
            | StructuralEdit::MoveColumn { from, to, .. } => from == to,
        }
    }

    fn limit(&self) -> u32 {
        match self.axis() {
            EditAxis::Row => MAX_ROWS,
            EditAxis::Column => MAX_COLUMNS,
        }
    }

    /// New position of a single index on the edited axis; `None` when the
    /// row/column it names was removed or pushed off the grid.
    pub fn map_index(&self, idx: u32) -> Option<u32> {
        let mapped = match *self {
            StructuralEdit::InsertRows { at, count, .. }
            | StructuralEdit::InsertColumns { at, count, .. } => {
                if idx >= at {
                    idx.checked_add(count)?
                } else {
                    idx
                }
            }
            StructuralEdit::RemoveRows { at, count, .. }
            | StructuralEdit::RemoveColumns { at, count, .. } => {
                if idx < at {
                    idx
                } else if idx - at < count {
                    return None;
                } else {
                    idx - count
                }
            }
            StructuralEdit::MoveRow { from, to, .. }
            | StructuralEdit::MoveColumn { from, to, .. } => {
                if idx == from {
                    to
                } else if from < to && idx > from && idx <= to {
                    idx - 1
                } else if from > to && idx >= to && idx < from {
                    idx + 1
                } else {
                    idx
                }
            }
        };
        (mapped <= self.limit()).then_some(mapped)
    }

    /// New bounds of the span `lo..=hi` on the edited axis; `None` when
    /// nothing of the span survives.
    pub fn map_span(&self, lo: u32, hi: u32) -> Option<(u32, u32)> {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        match *self {
            StructuralEdit::InsertRows { .. } | StructuralEdit::InsertColumns { .. } => {
                let new_lo = self.map_index(lo)?;
                let new_hi = self.map_index(hi).unwrap_or(self.limit());
                Some((new_lo, new_hi))
            }
            StructuralEdit::RemoveRows { at, count, .. }
            | StructuralEdit::RemoveColumns { at, count, .. } => clip_removed(lo, hi, at, count),
            StructuralEdit::MoveRow { from, to, .. }
            | StructuralEdit::MoveColumn { from, to, .. } => {
                if from == to {
                    return Some((lo, hi));
                }
                if lo == from && hi == from {
                    return Some((to, to));
                }
                // Excise the moved index, then reinsert it at the target.
                let (lo, hi) = clip_removed(lo, hi, from, 1)?;
                let reinsert = |i: u32| if i >= to { i + 1 } else { i };
                Some((reinsert(lo), reinsert(hi)))
            }
        }
    }
}

fn clip_removed(lo: u32, hi: u32, at: u32, count: u32) -> Option<(u32, u32)> {
    let end = at.saturating_add(count);
    let new_lo = if lo < at {
        lo
    } else if lo >= end {
        lo - count
    } else {
        at
    };
    let new_hi = if hi < at {
        hi
    } else if hi >= end {
        hi - count
    } else {
        at.checked_sub(1)?
    };
    (new_hi >= new_lo && new_hi > 0).then_some((new_lo, new_hi))
}

/// Apply `f` to every reference operand of `formula`, splicing in the
/// replacement text whenever `f` returns one. Formulas that fail to tokenize
/// come back unchanged.
pub fn map_references<F>(formula: &str, mut f: F) -> String
where
    F: FnMut(&Reference) -> Option<String>,
{
    let Ok(tokenizer) = Tokenizer::new(formula) else {
        return formula.to_string();
    };
    let mut out = String::with_capacity(formula.len() + 8);
    let mut last = 0;
    for token in &tokenizer.items {
        if token.token_type != TokenType::Operand || token.subtype != TokenSubType::Range {
            continue;
        }
        let Some(reference) = Reference::parse(&token.value) else {
            continue;
        };
        if let Some(replacement) = f(&reference) {
            out.push_str(&formula[last..token.start]);
            out.push_str(&replacement);
            last = token.end;
        }
    }
    out.push_str(&formula[last..]);
    out
}

/// Rewrites formula text for a [`StructuralEdit`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceRewriter;

impl ReferenceRewriter {
    pub fn new() -> Self {
        Self
    }

    /// Rewrite `formula`, which lives on `formula_sheet`, for `edit`.
    ///
    /// Never fails: malformed text is returned as is.
    pub fn rewrite(&self, formula: &str, formula_sheet: &str, edit: &StructuralEdit) -> String {
        if edit.is_noop() {
            return formula.to_string();
        }
        map_references(formula, |r| self.rewrite_reference(r, formula_sheet, edit))
    }

    /// Replacement text for one reference, or `None` when it is unaffected.
    pub fn rewrite_reference(
        &self,
        reference: &Reference,
        formula_sheet: &str,
        edit: &StructuralEdit,
    ) -> Option<String> {
        if reference.resolved_sheet(formula_sheet) != edit.sheet() {
            return None;
        }
        let prefix = reference
            .sheet
            .as_ref()
            .map(|s| s.prefix())
            .unwrap_or_default();
        let axis = edit.axis();

        let body = match reference.target {
            RefTarget::Cell(cell) => {
                let (col, row) = map_cell(cell, axis, edit);
                if col == Some(cell.col) && row == Some(cell.row) {
                    return None;
                }
                render_cell(col, row)
            }
            RefTarget::Range(a, b) => {
                let (first, last) = match axis {
                    EditAxis::Row => (a.row.index, b.row.index),
                    EditAxis::Column => (a.col.index, b.col.index),
                };
                let span = edit.map_span(first, last);
                if span_unchanged(span, first, last) {
                    return None;
                }
                let (a2, b2) = match axis {
                    EditAxis::Row => {
                        let (lo, hi) = span.unzip();
                        (
                            lo.map(|i| CellRef { row: anchored(a.row, i), ..a }),
                            hi.map(|i| CellRef { row: anchored(b.row, i), ..b }),
                        )
                    }
                    EditAxis::Column => {
                        let (lo, hi) = span.unzip();
                        (
                            lo.map(|i| CellRef { col: anchored(a.col, i), ..a }),
                            hi.map(|i| CellRef { col: anchored(b.col, i), ..b }),
                        )
                    }
                };
                match (a2, b2) {
                    (Some(a2), Some(b2)) => Reference {
                        sheet: None,
                        target: RefTarget::Range(a2, b2),
                    }
                    .to_string(),
                    _ => "#REF!".to_string(),
                }
            }
            RefTarget::Columns(a, b) if axis == EditAxis::Column => {
                let span = edit.map_span(a.index, b.index);
                if span_unchanged(span, a.index, b.index) {
                    return None;
                }
                match span {
                    Some((lo, hi)) => Reference {
                        sheet: None,
                        target: RefTarget::Columns(anchored(a, lo), anchored(b, hi)),
                    }
                    .to_string(),
                    None => "#REF!".to_string(),
                }
            }
            RefTarget::Rows(a, b) if axis == EditAxis::Row => {
                let span = edit.map_span(a.index, b.index);
                if span_unchanged(span, a.index, b.index) {
                    return None;
                }
                match span {
                    Some((lo, hi)) => Reference {
                        sheet: None,
                        target: RefTarget::Rows(anchored(a, lo), anchored(b, hi)),
                    }
                    .to_string(),
                    None => "#REF!".to_string(),
                }
            }
            RefTarget::Columns(..) | RefTarget::Rows(..) | RefTarget::Broken => return None,
        };
        Some(format!("{prefix}{body}"))
    }
}

/// Whether a mapped span still covers `first..=last`, in either order.
fn span_unchanged(span: Option<(u32, u32)>, first: u32, last: u32) -> bool {
    span == Some((first.min(last), first.max(last)))
}

fn anchored(axis: Axis, index: u32) -> Axis {
    Axis::new(index, axis.absolute)
}

fn map_cell(cell: CellRef, axis: EditAxis, edit: &StructuralEdit) -> (Option<Axis>, Option<Axis>) {
    match axis {
        EditAxis::Row => (
            Some(cell.col),
            edit.map_index(cell.row.index).map(|i| anchored(cell.row, i)),
        ),
        EditAxis::Column => (
            edit.map_index(cell.col.index).map(|i| anchored(cell.col, i)),
            Some(cell.row),
        ),
    }
}

/// Convenience wrapper around [`ReferenceRewriter::rewrite`].
pub fn rewrite_formula(formula: &str, formula_sheet: &str, edit: &StructuralEdit) -> String {
    ReferenceRewriter::new().rewrite(formula, formula_sheet, edit)
}
