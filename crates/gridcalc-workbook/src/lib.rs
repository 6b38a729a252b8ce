//! Workbook model for gridcalc: worksheets, the calculation chain, the
//! dependency scanner, the recalculation engine and the SUMIFS/AVERAGEIFS
//! batcher.

pub mod aggregate;
pub mod cache;
pub mod calc_chain;
pub mod config;
pub mod error;
mod recalc;
mod resolver;
pub mod scanner;
pub mod stats;
mod structure;
pub mod workbook;
pub mod worksheet;

pub use aggregate::{AggregateKind, BatchReport};
pub use cache::{CacheKey, ResultCache};
pub use calc_chain::{CalcChain, CalcChainEntry};
pub use config::{RecalcPolicy, WorkbookConfig};
pub use error::WorkbookError;
pub use scanner::{CellSet, DependencyScanner};
pub use stats::{CellStats, RecalcStats};
pub use workbook::{AffectedCell, CellUpdate, FormulaUpdate, Workbook};
pub use worksheet::{CellRecord, RowData, Worksheet};

pub use gridcalc_common::{CellAddress, CellType, CellValue, LiteralValue};
pub use gridcalc_eval::{Evaluator, FormulaEvaluator, Resolver};
pub use gridcalc_parse::StructuralEdit;
