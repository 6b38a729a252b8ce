//! The recalculation engine: walks the calc chain and re-evaluates a
//! selection of formula cells.

use std::time::Instant;

use gridcalc_common::CellAddress;
use rustc_hash::FxHashMap;

use crate::aggregate;
use crate::error::WorkbookError;
use crate::resolver::WorkbookResolver;
use crate::scanner::{CellSet, DependencyScanner};
use crate::stats::RecalcStats;
use crate::workbook::{AffectedCell, CellUpdate, FormulaUpdate, Workbook};
use crate::worksheet::CellPosition;

/// Which chain entries a recalculation evaluates.
#[derive(Debug, Clone)]
enum Selection {
    All,
    Sheet(u32),
    Cells(CellSet),
}

impl Selection {
    fn includes(&self, sheet_id: u32, sheet: &str, cell: CellAddress) -> bool {
        match self {
            Selection::All => true,
            Selection::Sheet(id) => *id == sheet_id,
            Selection::Cells(set) => set.contains(sheet, cell),
        }
    }
}

/// Sheet the pass is currently walking, with its transient cell index.
struct SheetRun {
    id: u32,
    idx: Option<usize>,
    positions: FxHashMap<CellAddress, CellPosition>,
}

impl Workbook {
    /// Evaluate every chain entry of `sheet`.
    pub fn recalculate_sheet(&mut self, sheet: &str) -> Result<Vec<AffectedCell>, WorkbookError> {
        Ok(self.recalculate_sheet_with_stats(sheet)?.0)
    }

    pub fn recalculate_sheet_with_stats(
        &mut self,
        sheet: &str,
    ) -> Result<(Vec<AffectedCell>, Option<RecalcStats>), WorkbookError> {
        let idx = self.sheet_index(sheet)?;
        let selection = Selection::Sheet(self.sheets[idx].id());
        Ok(self.recalculate(&selection, false))
    }

    /// Evaluate the whole chain, precomputing large SUMIFS/AVERAGEIFS
    /// groups first when aggregate batching is enabled.
    pub fn recalculate_all(&mut self) -> Vec<AffectedCell> {
        self.recalculate_all_with_stats().0
    }

    pub fn recalculate_all_with_stats(&mut self) -> (Vec<AffectedCell>, Option<RecalcStats>) {
        let _span = tracing::info_span!("recalculate_all", chain = self.chain.len()).entered();
        let batching = self.config.aggregate_batching;
        self.recalculate(&Selection::All, batching)
    }

    /// Write `updates`, then re-evaluate every formula cell that depends on
    /// them directly or transitively. Returns the evaluated cells in chain
    /// order.
    pub fn batch_update_and_recalculate(
        &mut self,
        updates: &[CellUpdate],
    ) -> Result<Vec<AffectedCell>, WorkbookError> {
        Ok(self.batch_update_and_recalculate_with_stats(updates)?.0)
    }

    pub fn batch_update_and_recalculate_with_stats(
        &mut self,
        updates: &[CellUpdate],
    ) -> Result<(Vec<AffectedCell>, Option<RecalcStats>), WorkbookError> {
        let resolved = self.resolve_updates(updates)?;
        let mut updated = CellSet::new();
        for (idx, addr, value) in resolved {
            self.write_value(idx, addr, value);
            updated.insert(self.sheets[idx].name(), addr);
        }

        let affected = self.dependency_scanner().find_affected(&updated, &CellSet::new());
        self.cache.invalidate_cells(&updated);
        Ok(self.recalculate(&Selection::Cells(affected), false))
    }

    /// Write `formulas`, then evaluate the new formula cells together with
    /// every cell depending on any written cell.
    pub fn batch_set_formulas_and_recalculate(
        &mut self,
        formulas: &[FormulaUpdate],
    ) -> Result<Vec<AffectedCell>, WorkbookError> {
        Ok(self.batch_set_formulas_and_recalculate_with_stats(formulas)?.0)
    }

    pub fn batch_set_formulas_and_recalculate_with_stats(
        &mut self,
        formulas: &[FormulaUpdate],
    ) -> Result<(Vec<AffectedCell>, Option<RecalcStats>), WorkbookError> {
        let resolved = self.resolve_formulas(formulas)?;
        let mut updated = CellSet::new();
        let mut seeds = CellSet::new();
        for (idx, addr, formula) in resolved {
            let name = self.sheets[idx].name().to_string();
            if self.write_formula(idx, addr, formula) {
                seeds.insert(&name, addr);
            }
            updated.insert(&name, addr);
        }

        let affected = self.dependency_scanner().find_affected(&updated, &seeds);
        self.cache.invalidate_cells(&updated);
        Ok(self.recalculate(&Selection::Cells(affected), false))
    }

    /* ─────────────────────────── internals ──────────────────────────── */

    /// Scanner over the effective formulas of the current chain.
    fn dependency_scanner(&self) -> DependencyScanner {
        let mut scanner = DependencyScanner::new();
        let ids: FxHashMap<u32, usize> = self
            .sheets
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id(), i))
            .collect();
        for (id, cell) in self.chain.iter() {
            let Some(ws) = ids.get(&id).map(|&i| &self.sheets[i]) else {
                continue;
            };
            if let Some(formula) = ws.effective_formula(cell) {
                scanner.push(ws.name(), cell, &formula);
            }
        }
        scanner
    }

    fn invalidate(&self, selection: &Selection) {
        match selection {
            Selection::All => self.cache.clear(),
            Selection::Sheet(id) => {
                if let Some(idx) = self.sheet_by_id(*id) {
                    self.cache.invalidate_sheet(self.sheets[idx].name());
                }
            }
            Selection::Cells(set) => self.cache.invalidate_cells(set),
        }
    }

    /// Run the configured number of passes over `selection`.
    ///
    /// The selection's cached results are dropped before every pass so each
    /// pass reads the values the previous one stored. Batched aggregates are
    /// seeded after that drop and only serve the first pass.
    fn recalculate(
        &mut self,
        selection: &Selection,
        batch_aggregates: bool,
    ) -> (Vec<AffectedCell>, Option<RecalcStats>) {
        let started = Instant::now();
        let mut stats = self.config.debug.then(RecalcStats::new);
        let max_passes = self.config.recalc_policy.max_passes();

        let mut affected = Vec::new();
        for pass in 1..=max_passes {
            self.invalidate(selection);
            if pass == 1 && batch_aggregates {
                let report =
                    aggregate::precompute(&self.sheets, &self.cache, self.config.batch_threshold);
                if let Some(stats) = stats.as_mut() {
                    stats.batched_groups = report.groups;
                    stats.batched_cells = report.seeded;
                }
            }

            let previous = std::mem::take(&mut affected);
            affected = self.run_pass(selection, stats.as_mut());
            if let Some(stats) = stats.as_mut() {
                stats.passes = pass;
            }
            if pass > 1 && previous == affected {
                break;
            }
        }

        if let Some(stats) = stats.as_mut() {
            stats.total_duration = started.elapsed();
        }
        tracing::info!(
            evaluated = affected.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "recalculation done"
        );
        (affected, stats)
    }

    fn run_pass(
        &mut self,
        selection: &Selection,
        mut stats: Option<&mut RecalcStats>,
    ) -> Vec<AffectedCell> {
        let entries: Vec<(u32, CellAddress)> = self.chain.iter().collect();
        let mut affected = Vec::new();
        let mut run: Option<SheetRun> = None;

        for (sheet_id, cell) in entries {
            if run.as_ref().is_none_or(|r| r.id != sheet_id) {
                let idx = self.sheet_by_id(sheet_id);
                let positions = idx
                    .map(|i| self.sheets[i].position_map())
                    .unwrap_or_default();
                tracing::debug!(sheet_id, cells = positions.len(), "cell map built");
                run = Some(SheetRun {
                    id: sheet_id,
                    idx,
                    positions,
                });
            }
            let Some(current) = run.as_ref() else {
                continue;
            };
            // Chain entries naming a missing sheet or cell are skipped.
            let Some(idx) = current.idx else {
                continue;
            };
            let Some(&pos) = current.positions.get(&cell) else {
                continue;
            };

            let sheet = self.sheets[idx].name().to_string();
            if !selection.includes(sheet_id, &sheet, cell) {
                continue;
            }
            let Some(formula) = self.sheets[idx].formula_at(pos) else {
                continue;
            };

            let began = Instant::now();
            let cached = self.cache.get(&sheet, cell, true);
            let cache_hit = cached.is_some();
            let outcome = match cached {
                Some(text) => Ok(text),
                None => {
                    let resolver = WorkbookResolver::new(&self.sheets, &self.cache);
                    self.evaluator.evaluate(&resolver, &sheet, cell, &formula, true)
                }
            };

            let cached_value = match outcome {
                Ok(text) => {
                    if !cache_hit {
                        self.cache.insert(&sheet, cell, true, text.clone());
                    }
                    if let Some(record) = self.sheets[idx].record_at_mut(pos) {
                        record.set_result(text.clone());
                    }
                    text
                }
                Err(err) => {
                    tracing::debug!(%sheet, %cell, error = %err, "evaluation failed");
                    if let Some(record) = self.sheets[idx].record_at_mut(pos) {
                        record.clear_result();
                    }
                    String::new()
                }
            };

            tracing::trace!(%sheet, %cell, value = %cached_value, cache_hit, "cell evaluated");
            if let Some(stats) = stats.as_deref_mut() {
                stats.record(&sheet, cell, &formula, began.elapsed(), cache_hit, &cached_value);
            }
            affected.push(AffectedCell {
                sheet,
                cell,
                cached_value,
            });
        }
        affected
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use gridcalc_eval::{EvalError, Evaluator, FormulaEvaluator, Resolver};

    use super::*;
    use crate::config::{RecalcPolicy, WorkbookConfig};

    /// Counts calls and fails on formulas containing `FAIL`.
    #[derive(Default)]
    struct CountingEvaluator {
        calls: AtomicUsize,
    }

    impl Evaluator for CountingEvaluator {
        fn evaluate(
            &self,
            resolver: &dyn Resolver,
            sheet: &str,
            cell: CellAddress,
            formula: &str,
            raw: bool,
        ) -> Result<String, EvalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if formula.contains("FAIL") {
                return Err(EvalError::EmptyFormula);
            }
            FormulaEvaluator.evaluate(resolver, sheet, cell, formula, raw)
        }
    }

    fn values(cells: &[AffectedCell]) -> Vec<(String, String)> {
        cells
            .iter()
            .map(|c| (c.cell.to_string(), c.cached_value.clone()))
            .collect()
    }

    #[test]
    fn sheet_runs_follow_chain_order() {
        let mut wb = Workbook::new();
        wb.new_sheet("Data").unwrap();
        wb.set_cell_value("Data", "A1", 4).unwrap();
        wb.set_cell_formula("Sheet1", "A1", "Data!A1*2").unwrap();
        wb.set_cell_formula("Data", "B1", "A1+1").unwrap();
        wb.set_cell_formula("Sheet1", "A2", "A1+1").unwrap();

        let out = wb.recalculate_all();
        let sheets: Vec<&str> = out.iter().map(|c| c.sheet.as_str()).collect();
        assert_eq!(sheets, ["Sheet1", "Data", "Sheet1"]);
        assert_eq!(
            values(&out),
            [("A1".into(), "8".into()), ("B1".into(), "5".into()), ("A2".into(), "9".into())]
        );

        let only_data = wb.recalculate_sheet("Data").unwrap();
        assert_eq!(values(&only_data), [("B1".to_string(), "5".to_string())]);
        assert!(wb.recalculate_sheet("Missing").is_err());
    }

    #[test]
    fn failures_clear_the_cell_and_continue() {
        let eval = Arc::new(CountingEvaluator::default());
        let mut wb = Workbook::new().with_evaluator(eval.clone());
        wb.set_cell_formula("Sheet1", "A1", "FAIL").unwrap();
        wb.set_cell_formula("Sheet1", "A2", "1+1").unwrap();
        wb.sheet_mut("Sheet1")
            .unwrap()
            .cell_mut(CellAddress::new(1, 1))
            .unwrap()
            .set_result("old".into());

        let out = wb.recalculate_all();
        assert_eq!(
            values(&out),
            [("A1".into(), String::new()), ("A2".into(), "2".into())]
        );
        assert_eq!(wb.get_cell_value("Sheet1", "A1").unwrap(), "");
        assert_eq!(eval.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stale_chain_entries_are_skipped() {
        let mut wb = Workbook::new();
        wb.set_cell_formula("Sheet1", "A1", "2*3").unwrap();
        wb.add_calc_chain_entry("Sheet1", "Z99").unwrap();
        wb.load_calc_chain(&[
            crate::CalcChainEntry::new(9, CellAddress::new(1, 1)),
            crate::CalcChainEntry::new(1, CellAddress::new(26, 99)),
            crate::CalcChainEntry::new(0, CellAddress::new(1, 1)),
        ]);
        assert_eq!(values(&wb.recalculate_all()), [("A1".to_string(), "6".to_string())]);
    }

    #[test]
    fn stats_are_collected_in_debug_mode() {
        let mut wb = Workbook::with_config(WorkbookConfig::debug());
        wb.set_cell_value("Sheet1", "A1", 1).unwrap();
        wb.set_cell_formula("Sheet1", "B1", "A1+1").unwrap();
        let (_, stats) = wb.recalculate_all_with_stats();
        let stats = stats.unwrap();
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.invocations(), 1);
        assert_eq!(stats.cache_misses(), 1);
        assert_eq!(stats.cell("Sheet1", CellAddress::new(2, 1)).unwrap().last_result, "2");

        wb.set_debug(false);
        assert!(wb.recalculate_all_with_stats().1.is_none());
    }

    #[test]
    fn until_stable_settles_reversed_chains() {
        let config = WorkbookConfig::debug()
            .with_recalc_policy(RecalcPolicy::UntilStable { max_passes: 10 });
        let mut wb = Workbook::with_config(config);
        wb.set_cell_value("Sheet1", "A1", 1).unwrap();
        wb.set_cell_formula("Sheet1", "D1", "C1*2").unwrap();
        wb.set_cell_formula("Sheet1", "C1", "B1+10").unwrap();
        wb.set_cell_formula("Sheet1", "B1", "A1*2").unwrap();

        let (out, stats) = wb.recalculate_all_with_stats();
        assert_eq!(
            values(&out),
            [("D1".into(), "24".into()), ("C1".into(), "12".into()), ("B1".into(), "2".into())]
        );
        // Three passes to settle plus one that changes nothing.
        assert_eq!(stats.unwrap().passes, 4);
    }

    #[test]
    fn single_pass_needs_repeat_calls_on_reversed_chains() {
        let mut wb = Workbook::new();
        wb.set_cell_value("Sheet1", "A1", 1).unwrap();
        wb.set_cell_formula("Sheet1", "C1", "B1+10").unwrap();
        wb.set_cell_formula("Sheet1", "B1", "A1*2").unwrap();

        assert_eq!(
            values(&wb.recalculate_all()),
            [("C1".into(), "10".into()), ("B1".into(), "2".into())]
        );
        assert_eq!(
            values(&wb.recalculate_all()),
            [("C1".into(), "12".into()), ("B1".into(), "2".into())]
        );
    }
}
