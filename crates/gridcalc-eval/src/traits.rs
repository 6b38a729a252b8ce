use gridcalc_common::{CellAddress, ExcelError, LiteralValue};

use crate::error::EvalError;

/* ─────────────────────────── data access ──────────────────────────── */

/// Read access to workbook data during evaluation.
///
/// Formula cells are read through their cached value; nothing here
/// triggers a nested evaluation.
pub trait Resolver {
    /// Stored value of `cell` on `sheet`. Unknown sheets yield `#REF!`.
    fn resolve_cell(&self, sheet: &str, cell: CellAddress) -> Result<LiteralValue, ExcelError>;

    /// Bottom-right corner of the used area of `sheet`, bounding full-row
    /// and full-column ranges.
    fn used_extent(&self, sheet: &str) -> Option<CellAddress>;

    /// Precomputed value of a call expression (exact source text) inside the
    /// formula of `cell`.
    fn cached_call(&self, _sheet: &str, _cell: CellAddress, _call: &str) -> Option<LiteralValue> {
        None
    }
}

/* ─────────────────────────── evaluator seam ───────────────────────── */

/// Evaluates one formula to the text stored in its cell.
///
/// `raw` asks for the unformatted value; evaluators without number
/// formatting may ignore it.
pub trait Evaluator: Send + Sync {
    fn evaluate(
        &self,
        resolver: &dyn Resolver,
        sheet: &str,
        cell: CellAddress,
        formula: &str,
        raw: bool,
    ) -> Result<String, EvalError>;
}
