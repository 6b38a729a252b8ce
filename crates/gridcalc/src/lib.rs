//! Meta crate that re-exports the gridcalc building blocks. Depend on this
//! crate and pick layers with feature flags; the underlying crates stay
//! reachable for deeper integration.

#[cfg(feature = "common")]
pub use gridcalc_common as common;

#[cfg(feature = "parse")]
pub use gridcalc_parse as parse;

#[cfg(feature = "eval")]
pub use gridcalc_eval as eval;

#[cfg(feature = "workbook")]
pub use gridcalc_workbook as workbook;

#[cfg(feature = "common")]
pub use gridcalc_common::{CellAddress, CellType, CellValue, ExcelError, ExcelErrorKind, LiteralValue};

#[cfg(feature = "parse")]
pub use gridcalc_parse::{StructuralEdit, rewrite_formula, shift_formula};

#[cfg(feature = "eval")]
pub use gridcalc_eval::{Evaluator, FormulaEvaluator, Resolver};

#[cfg(feature = "workbook")]
pub use gridcalc_workbook::{
    AffectedCell, CalcChainEntry, CellUpdate, FormulaUpdate, RecalcPolicy, RecalcStats, Workbook,
    WorkbookConfig, WorkbookError,
};
