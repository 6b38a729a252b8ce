//! Lightweight in-memory resolver for unit tests.
use std::collections::HashMap;

use gridcalc_common::{CellAddress, ExcelError, ExcelErrorKind, LiteralValue};

use crate::evaluator::FormulaEvaluator;
use crate::traits::{Evaluator, Resolver};

type V = LiteralValue;

#[derive(Default)]
pub struct TestWorkbook {
    sheets: HashMap<String, HashMap<CellAddress, V>>,
    calls: HashMap<(String, CellAddress, String), V>,
}

impl TestWorkbook {
    pub fn new() -> Self {
        Self::default().with_sheet("Sheet1")
    }

    pub fn with_sheet(mut self, sheet: &str) -> Self {
        self.sheets.entry(sheet.to_string()).or_default();
        self
    }

    pub fn with_cell(mut self, sheet: &str, a1: &str, v: V) -> Self {
        let addr = CellAddress::parse(a1).expect("bad A1 ref in with_cell");
        self.sheets
            .entry(sheet.to_string())
            .or_default()
            .insert(addr, v);
        self
    }

    pub fn with_number(self, sheet: &str, a1: &str, n: f64) -> Self {
        self.with_cell(sheet, a1, V::Number(n))
    }

    pub fn with_text(self, sheet: &str, a1: &str, s: &str) -> Self {
        self.with_cell(sheet, a1, V::Text(s.to_string()))
    }

    pub fn with_cached_call(mut self, sheet: &str, a1: &str, call: &str, v: V) -> Self {
        let addr = CellAddress::parse(a1).expect("bad A1 ref in with_cached_call");
        self.calls
            .insert((sheet.to_string(), addr, call.to_string()), v);
        self
    }

    /// Evaluate `formula` as if it lived in Sheet1!Z1000.
    pub fn eval(&self, formula: &str) -> String {
        FormulaEvaluator
            .evaluate(self, "Sheet1", CellAddress::new(26, 1000), formula, true)
            .expect("formula should parse")
    }

    pub fn eval_at(&self, sheet: &str, a1: &str, formula: &str) -> String {
        let addr = CellAddress::parse(a1).expect("bad A1 ref in eval_at");
        FormulaEvaluator
            .evaluate(self, sheet, addr, formula, true)
            .expect("formula should parse")
    }
}

impl Resolver for TestWorkbook {
    fn resolve_cell(&self, sheet: &str, cell: CellAddress) -> Result<V, ExcelError> {
        let cells = self
            .sheets
            .get(sheet)
            .ok_or_else(|| ExcelError::new(ExcelErrorKind::Ref))?;
        Ok(cells.get(&cell).cloned().unwrap_or(V::Empty))
    }

    fn used_extent(&self, sheet: &str) -> Option<CellAddress> {
        let cells = self.sheets.get(sheet)?;
        let row = cells.keys().map(|c| c.row).max()?;
        let col = cells.keys().map(|c| c.col).max()?;
        Some(CellAddress::new(col, row))
    }

    fn cached_call(&self, sheet: &str, cell: CellAddress, call: &str) -> Option<V> {
        self.calls
            .get(&(sheet.to_string(), cell, call.to_string()))
            .cloned()
    }
}
