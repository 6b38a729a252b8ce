use thiserror::Error;

/// Failure to evaluate a formula at all. Spreadsheet error values such as
/// `#DIV/0!` are results, not failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("cannot parse formula {formula:?}: {message}")]
    Parse { formula: String, message: String },
    #[error("empty formula")]
    EmptyFormula,
}
