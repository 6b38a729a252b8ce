//! Per-call recalculation statistics, collected when `WorkbookConfig::debug`
//! is set.

use std::time::Duration;

use gridcalc_common::CellAddress;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct CellStats {
    pub sheet: String,
    pub cell: CellAddress,
    pub formula: String,
    pub invocations: u32,
    pub duration: Duration,
    pub cache_hits: u32,
    pub cache_misses: u32,
    pub last_result: String,
}

#[derive(Debug, Clone, Default)]
pub struct RecalcStats {
    /// One entry per cell, in first-evaluation order.
    pub cells: Vec<CellStats>,
    index: FxHashMap<(String, CellAddress), usize>,
    pub total_duration: Duration,
    pub passes: u32,
    /// Aggregation groups computed by the batcher.
    pub batched_groups: usize,
    /// Cache entries seeded by the batcher.
    pub batched_cells: usize,
}

impl RecalcStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(
        &mut self,
        sheet: &str,
        cell: CellAddress,
        formula: &str,
        elapsed: Duration,
        cache_hit: bool,
        result: &str,
    ) {
        let slot = match self.index.get(&(sheet.to_string(), cell)) {
            Some(&i) => i,
            None => {
                self.cells.push(CellStats {
                    sheet: sheet.to_string(),
                    cell,
                    formula: formula.to_string(),
                    invocations: 0,
                    duration: Duration::ZERO,
                    cache_hits: 0,
                    cache_misses: 0,
                    last_result: String::new(),
                });
                self.index.insert((sheet.to_string(), cell), self.cells.len() - 1);
                self.cells.len() - 1
            }
        };
        let stats = &mut self.cells[slot];
        stats.invocations += 1;
        stats.duration += elapsed;
        if cache_hit {
            stats.cache_hits += 1;
        } else {
            stats.cache_misses += 1;
        }
        stats.formula = formula.to_string();
        stats.last_result = result.to_string();
    }

    pub fn cell(&self, sheet: &str, cell: CellAddress) -> Option<&CellStats> {
        self.index
            .get(&(sheet.to_string(), cell))
            .map(|&i| &self.cells[i])
    }

    pub fn invocations(&self) -> u32 {
        self.cells.iter().map(|c| c.invocations).sum()
    }

    pub fn cache_hits(&self) -> u32 {
        self.cells.iter().map(|c| c.cache_hits).sum()
    }

    pub fn cache_misses(&self) -> u32 {
        self.cells.iter().map(|c| c.cache_misses).sum()
    }

    /// The `n` cells with the largest accumulated duration.
    pub fn slowest(&self, n: usize) -> Vec<&CellStats> {
        let mut cells: Vec<&CellStats> = self.cells.iter().collect();
        cells.sort_by(|a, b| b.duration.cmp(&a.duration));
        cells.truncate(n);
        cells
    }
}
