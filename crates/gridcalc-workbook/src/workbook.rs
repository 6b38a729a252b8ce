use std::sync::Arc;

use gridcalc_common::{CellAddress, CellValue};
use gridcalc_eval::{Evaluator, FormulaEvaluator};
use serde::{Deserialize, Serialize};

use crate::cache::ResultCache;
use crate::calc_chain::{CalcChain, CalcChainEntry};
use crate::config::WorkbookConfig;
use crate::error::WorkbookError;
use crate::resolver::WorkbookResolver;
use crate::worksheet::Worksheet;

const MAX_SHEET_NAME_LEN: usize = 31;

/// A value write addressed by sheet name and A1 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellUpdate {
    pub sheet: String,
    pub cell: String,
    pub value: CellValue,
}

impl CellUpdate {
    pub fn new(sheet: &str, cell: &str, value: impl Into<CellValue>) -> Self {
        Self {
            sheet: sheet.to_string(),
            cell: cell.to_string(),
            value: value.into(),
        }
    }
}

/// A formula write; empty text clears the formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaUpdate {
    pub sheet: String,
    pub cell: String,
    pub formula: String,
}

impl FormulaUpdate {
    pub fn new(sheet: &str, cell: &str, formula: &str) -> Self {
        Self {
            sheet: sheet.to_string(),
            cell: cell.to_string(),
            formula: formula.to_string(),
        }
    }
}

/// A cell the recalculation engine evaluated, with the value it stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedCell {
    pub sheet: String,
    pub cell: CellAddress,
    pub cached_value: String,
}

/// Sheets, their calculation chain and the result cache.
///
/// All mutation goes through `&mut self`; one client thread drives a
/// workbook at a time.
pub struct Workbook {
    pub(crate) config: WorkbookConfig,
    pub(crate) sheets: Vec<Worksheet>,
    next_sheet_id: u32,
    pub(crate) chain: CalcChain,
    pub(crate) cache: ResultCache,
    pub(crate) evaluator: Arc<dyn Evaluator>,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Workbook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workbook")
            .field("config", &self.config)
            .field("sheets", &self.sheet_names())
            .field("chain", &self.chain.len())
            .field("cache", &self.cache.len())
            .finish()
    }
}

pub(crate) fn parse_cell(text: &str) -> Result<CellAddress, WorkbookError> {
    CellAddress::parse(text.trim())
        .ok()
        .filter(CellAddress::is_valid)
        .ok_or_else(|| WorkbookError::InvalidCellReference(text.to_string()))
}

fn check_sheet_name(name: &str) -> Result<(), WorkbookError> {
    let invalid = name.is_empty()
        || name.chars().count() > MAX_SHEET_NAME_LEN
        || name.contains([':', '\\', '/', '?', '*', '[', ']'])
        || name.starts_with('\'')
        || name.ends_with('\'');
    if invalid {
        return Err(WorkbookError::InvalidSheetName(name.to_string()));
    }
    Ok(())
}

fn strip_formula(formula: &str) -> &str {
    let trimmed = formula.trim();
    trimmed.strip_prefix('=').unwrap_or(trimmed)
}

impl Workbook {
    pub fn new() -> Self {
        Self::with_config(WorkbookConfig::default())
    }

    /// A workbook holding one empty sheet named after
    /// [`WorkbookConfig::default_sheet`].
    pub fn with_config(config: WorkbookConfig) -> Self {
        let first = if check_sheet_name(&config.default_sheet).is_ok() {
            config.default_sheet.clone()
        } else {
            tracing::debug!(name = %config.default_sheet, "invalid default sheet name, using Sheet1");
            "Sheet1".to_string()
        };
        Self {
            sheets: vec![Worksheet::new(1, &first)],
            next_sheet_id: 2,
            chain: CalcChain::new(),
            cache: ResultCache::new(),
            evaluator: Arc::new(FormulaEvaluator::new()),
            config,
        }
    }

    /// Replace the formula evaluator.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self.cache.clear();
        self
    }

    pub fn config(&self) -> &WorkbookConfig {
        &self.config
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.config.debug = debug;
    }

    /* ─────────────────────────── sheets ──────────────────────────── */

    pub(crate) fn sheet_index(&self, name: &str) -> Result<usize, WorkbookError> {
        self.sheets
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| WorkbookError::SheetNotFound(name.to_string()))
    }

    pub(crate) fn sheet_by_id(&self, id: u32) -> Option<usize> {
        self.sheets.iter().position(|s| s.id() == id)
    }

    /// Add a sheet and return its id. Adding an existing name returns the
    /// existing id.
    pub fn new_sheet(&mut self, name: &str) -> Result<u32, WorkbookError> {
        check_sheet_name(name)?;
        if let Some(ws) = self.sheets.iter().find(|s| s.name() == name) {
            return Ok(ws.id());
        }
        let id = self.next_sheet_id;
        self.next_sheet_id += 1;
        self.sheets.push(Worksheet::new(id, name));
        Ok(id)
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn sheet_id(&self, name: &str) -> Option<u32> {
        self.sheets.iter().find(|s| s.name() == name).map(Worksheet::id)
    }

    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.name() == name)
    }

    /// Direct record access for document loaders. Cached results are
    /// dropped since anything may change; call
    /// [`Self::rebuild_calc_chain`] after adding formulas this way.
    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Worksheet> {
        self.cache.clear();
        self.sheets.iter_mut().find(|s| s.name() == name)
    }

    /* ─────────────────────────── cells ──────────────────────────── */

    /// Store a plain value, dropping any formula the cell had.
    pub fn set_cell_value(
        &mut self,
        sheet: &str,
        cell: &str,
        value: impl Into<CellValue>,
    ) -> Result<(), WorkbookError> {
        let idx = self.sheet_index(sheet)?;
        let addr = parse_cell(cell)?;
        self.write_value(idx, addr, &value.into());
        self.cache.clear();
        Ok(())
    }

    pub(crate) fn write_value(&mut self, idx: usize, addr: CellAddress, value: &CellValue) {
        let ws = &mut self.sheets[idx];
        ws.set_value(addr, value);
        self.chain.remove_entry(ws.id(), addr);
    }

    /// Stored value text of a cell; `""` when blank.
    pub fn get_cell_value(&self, sheet: &str, cell: &str) -> Result<String, WorkbookError> {
        let ws = &self.sheets[self.sheet_index(sheet)?];
        let addr = parse_cell(cell)?;
        Ok(ws.cell(addr).map(|c| c.value.clone()).unwrap_or_default())
    }

    /// Set a formula (a leading `=` is accepted). Empty text clears the
    /// formula and its chain entry.
    pub fn set_cell_formula(
        &mut self,
        sheet: &str,
        cell: &str,
        formula: &str,
    ) -> Result<(), WorkbookError> {
        let idx = self.sheet_index(sheet)?;
        let addr = parse_cell(cell)?;
        self.write_formula(idx, addr, formula);
        self.cache.clear();
        Ok(())
    }

    /// Returns whether the cell now holds a formula.
    pub(crate) fn write_formula(&mut self, idx: usize, addr: CellAddress, formula: &str) -> bool {
        let body = strip_formula(formula);
        let ws = &mut self.sheets[idx];
        ws.set_formula(addr, body);
        if body.is_empty() {
            self.chain.remove_entry(ws.id(), addr);
            false
        } else {
            self.chain.add_entry(ws.id(), addr);
            true
        }
    }

    /// Effective formula text without the leading `=`; `""` when none.
    pub fn get_cell_formula(&self, sheet: &str, cell: &str) -> Result<String, WorkbookError> {
        let ws = &self.sheets[self.sheet_index(sheet)?];
        let addr = parse_cell(cell)?;
        Ok(ws.effective_formula(addr).unwrap_or_default())
    }

    /// Store `formula` once on the top-left cell of `range` (`"B1:B10"`)
    /// and let every other cell of the range share it with its references
    /// shifted.
    pub fn set_shared_formula(
        &mut self,
        sheet: &str,
        range: &str,
        formula: &str,
    ) -> Result<(), WorkbookError> {
        let idx = self.sheet_index(sheet)?;
        let (start, end) = range.split_once(':').unwrap_or((range, range));
        let (a, b) = (parse_cell(start)?, parse_cell(end)?);
        let top_left = CellAddress::new(a.col.min(b.col), a.row.min(b.row));
        let bottom_right = CellAddress::new(a.col.max(b.col), a.row.max(b.row));
        let body = strip_formula(formula);
        if body.is_empty() {
            return Err(WorkbookError::InvalidCellReference(range.to_string()));
        }

        let ws = &mut self.sheets[idx];
        ws.set_shared_formula(top_left, bottom_right, body);
        let id = ws.id();
        for row in top_left.row..=bottom_right.row {
            for col in top_left.col..=bottom_right.col {
                self.chain.add_entry(id, CellAddress::new(col, row));
            }
        }
        self.cache.clear();
        Ok(())
    }

    pub(crate) fn resolve_updates<'u>(
        &self,
        updates: &'u [CellUpdate],
    ) -> Result<Vec<(usize, CellAddress, &'u CellValue)>, WorkbookError> {
        updates
            .iter()
            .map(|u| Ok((self.sheet_index(&u.sheet)?, parse_cell(&u.cell)?, &u.value)))
            .collect()
    }

    pub(crate) fn resolve_formulas<'u>(
        &self,
        formulas: &'u [FormulaUpdate],
    ) -> Result<Vec<(usize, CellAddress, &'u str)>, WorkbookError> {
        formulas
            .iter()
            .map(|f| Ok((self.sheet_index(&f.sheet)?, parse_cell(&f.cell)?, f.formula.as_str())))
            .collect()
    }

    /// Write many values without recalculating. Nothing is written unless
    /// every update names an existing sheet and a valid cell.
    pub fn batch_set_cell_values(&mut self, updates: &[CellUpdate]) -> Result<(), WorkbookError> {
        let resolved = self.resolve_updates(updates)?;
        for (idx, addr, value) in resolved {
            self.write_value(idx, addr, value);
        }
        self.cache.clear();
        Ok(())
    }

    /// Write many formulas without recalculating. Validated up front like
    /// [`Self::batch_set_cell_values`].
    pub fn batch_set_formulas(&mut self, formulas: &[FormulaUpdate]) -> Result<(), WorkbookError> {
        let resolved = self.resolve_formulas(formulas)?;
        for (idx, addr, formula) in resolved {
            self.write_formula(idx, addr, formula);
        }
        self.cache.clear();
        Ok(())
    }

    /* ─────────────────────────── evaluation ──────────────────────────── */

    /// Evaluate one cell through the result cache without storing the
    /// result in the cell. A cell without a formula yields its stored value.
    pub fn calc_cell_value(&self, sheet: &str, cell: &str, raw: bool) -> Result<String, WorkbookError> {
        let ws = &self.sheets[self.sheet_index(sheet)?];
        let addr = parse_cell(cell)?;
        if let Some(hit) = self.cache.get(sheet, addr, raw) {
            return Ok(hit);
        }
        let Some(formula) = ws.effective_formula(addr) else {
            return Ok(ws.cell(addr).map(|c| c.value.clone()).unwrap_or_default());
        };
        let resolver = WorkbookResolver::new(&self.sheets, &self.cache);
        let value = self.evaluator.evaluate(&resolver, sheet, addr, &formula, raw)?;
        self.cache.insert(sheet, addr, raw, value.clone());
        Ok(value)
    }

    /// Evaluate `formula` as if it were entered at `cell`. Nothing is
    /// stored, cached or added to the chain.
    pub fn calc_formula_value(
        &self,
        sheet: &str,
        cell: &str,
        formula: &str,
    ) -> Result<String, WorkbookError> {
        self.sheet_index(sheet)?;
        let addr = parse_cell(cell)?;
        let resolver = WorkbookResolver::new(&self.sheets, &self.cache);
        Ok(self
            .evaluator
            .evaluate(&resolver, sheet, addr, strip_formula(formula), true)?)
    }

    /// Stored values as a dense grid, trailing blanks trimmed.
    pub fn get_rows(&self, sheet: &str) -> Result<Vec<Vec<String>>, WorkbookError> {
        Ok(self.sheets[self.sheet_index(sheet)?].grid_values())
    }

    /// Effective formulas as a dense grid, trailing blanks trimmed.
    pub fn get_formulas(&self, sheet: &str) -> Result<Vec<Vec<String>>, WorkbookError> {
        Ok(self.sheets[self.sheet_index(sheet)?].grid_formulas())
    }

    /* ─────────────────────────── calc chain ──────────────────────────── */

    /// The chain in its persisted, run-length encoded form.
    pub fn calc_chain(&self) -> Vec<CalcChainEntry> {
        self.chain.entries()
    }

    /// Replace the chain with a persisted one, as read from a document.
    pub fn load_calc_chain(&mut self, entries: &[CalcChainEntry]) {
        self.chain = CalcChain::from_entries(entries);
    }

    /// Rebuild the chain from the formulas actually present: sheets in
    /// order, cells row by row.
    pub fn rebuild_calc_chain(&mut self) {
        let mut chain = CalcChain::new();
        for ws in &self.sheets {
            for (addr, _) in ws.formula_cells() {
                chain.add_entry(ws.id(), addr);
            }
        }
        tracing::debug!(entries = chain.len(), "calc chain rebuilt");
        self.chain = chain;
    }

    /// Add a chain entry. A missing sheet is skipped without error.
    pub fn add_calc_chain_entry(&mut self, sheet: &str, cell: &str) -> Result<(), WorkbookError> {
        let addr = parse_cell(cell)?;
        match self.sheet_id(sheet) {
            Some(id) => {
                self.chain.add_entry(id, addr);
            }
            None => tracing::debug!(sheet, cell, "calc chain entry for missing sheet skipped"),
        }
        Ok(())
    }

    pub fn remove_calc_chain_entry(&mut self, sheet: &str, cell: &str) -> Result<(), WorkbookError> {
        let addr = parse_cell(cell)?;
        if let Some(id) = self.sheet_id(sheet) {
            self.chain.remove_entry(id, addr);
        }
        Ok(())
    }

    pub fn calc_chain_contains(&self, sheet: &str, cell: &str) -> bool {
        match (self.sheet_id(sheet), parse_cell(cell)) {
            (Some(id), Ok(addr)) => self.chain.contains(id, addr),
            _ => false,
        }
    }
}
