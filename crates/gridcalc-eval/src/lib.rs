//! Formula evaluation for gridcalc workbooks: the [`Evaluator`] seam the
//! recalculation engine calls through, and a default interpreter.

pub mod builtins;
pub mod criteria;
pub mod error;
pub mod evaluator;
pub mod interpreter;
pub mod traits;

pub use criteria::{CmpOp, Criterion, Operand, wildcard_match};
pub use error::EvalError;
pub use evaluator::{FormulaEvaluator, stored_text};
pub use interpreter::{CACHEABLE_CALLS, Interpreter};
pub use traits::{Evaluator, Resolver};

#[cfg(test)]
pub mod test_workbook;

#[cfg(test)]
mod tests;
