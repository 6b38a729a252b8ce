use gridcalc_eval::EvalError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkbookError {
    #[error("sheet {0} does not exist")]
    SheetNotFound(String),
    #[error("invalid cell reference {0:?}")]
    InvalidCellReference(String),
    #[error("invalid sheet name {0:?}")]
    InvalidSheetName(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
}
