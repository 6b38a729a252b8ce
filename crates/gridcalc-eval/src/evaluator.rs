use gridcalc_common::{CellAddress, LiteralValue};
use gridcalc_parse::parse;

use crate::error::EvalError;
use crate::interpreter::Interpreter;
use crate::traits::{Evaluator, Resolver};

/// Default evaluator backed by [`Interpreter`] and the builtin library.
///
/// Values come back the way they are stored in a cell: numbers in general
/// format, booleans as `TRUE`/`FALSE`, errors as their code, empty as `""`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormulaEvaluator;

impl FormulaEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate to a typed value instead of stored text.
    pub fn evaluate_value(
        &self,
        resolver: &dyn Resolver,
        sheet: &str,
        cell: CellAddress,
        formula: &str,
    ) -> Result<LiteralValue, EvalError> {
        let body = formula.trim();
        if body.trim_start_matches('=').trim().is_empty() {
            return Err(EvalError::EmptyFormula);
        }
        let ast = parse(formula).map_err(|e| EvalError::Parse {
            formula: formula.to_string(),
            message: e.message,
        })?;
        let interp = Interpreter::new(resolver, sheet, cell, formula);
        Ok(interp.evaluate(&ast))
    }
}

impl Evaluator for FormulaEvaluator {
    fn evaluate(
        &self,
        resolver: &dyn Resolver,
        sheet: &str,
        cell: CellAddress,
        formula: &str,
        _raw: bool,
    ) -> Result<String, EvalError> {
        let value = self.evaluate_value(resolver, sheet, cell, formula)?;
        Ok(stored_text(&value))
    }
}

/// Text form of a value as written back into a cell.
pub fn stored_text(value: &LiteralValue) -> String {
    value.to_string()
}
