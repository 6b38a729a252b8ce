use dashmap::DashMap;
use gridcalc_common::CellAddress;

use crate::scanner::CellSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub sheet: String,
    pub cell: CellAddress,
    pub raw: bool,
}

impl CacheKey {
    pub fn new(sheet: &str, cell: CellAddress, raw: bool) -> Self {
        Self {
            sheet: sheet.to_string(),
            cell,
            raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CallKey {
    sheet: String,
    cell: CellAddress,
    call: String,
}

/// Calculated cell results plus precomputed call results inside formulas.
///
/// Reads may come from any thread; writes happen on the thread driving the
/// recalculation.
#[derive(Debug, Default)]
pub struct ResultCache {
    cells: DashMap<CacheKey, String>,
    calls: DashMap<CallKey, String>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sheet: &str, cell: CellAddress, raw: bool) -> Option<String> {
        self.cells
            .get(&CacheKey::new(sheet, cell, raw))
            .map(|v| v.value().clone())
    }

    pub fn insert(&self, sheet: &str, cell: CellAddress, raw: bool, value: String) {
        self.cells.insert(CacheKey::new(sheet, cell, raw), value);
    }

    pub fn get_call(&self, sheet: &str, cell: CellAddress, call: &str) -> Option<String> {
        self.calls
            .get(&CallKey {
                sheet: sheet.to_string(),
                cell,
                call: call.to_string(),
            })
            .map(|v| v.value().clone())
    }

    pub fn insert_call(&self, sheet: &str, cell: CellAddress, call: &str, value: String) {
        self.calls.insert(
            CallKey {
                sheet: sheet.to_string(),
                cell,
                call: call.to_string(),
            },
            value,
        );
    }

    /// Drop both raw flags and every call result stored for `cell`.
    pub fn invalidate(&self, sheet: &str, cell: CellAddress) {
        for raw in [true, false] {
            self.cells.remove(&CacheKey::new(sheet, cell, raw));
        }
        self.calls.retain(|k, _| !(k.cell == cell && k.sheet == sheet));
    }

    /// [`Self::invalidate`] for every cell of `set`.
    pub fn invalidate_cells(&self, set: &CellSet) {
        for (sheet, cell) in set.iter() {
            for raw in [true, false] {
                self.cells.remove(&CacheKey::new(sheet, cell, raw));
            }
        }
        self.calls.retain(|k, _| !set.contains(&k.sheet, k.cell));
    }

    pub fn invalidate_sheet(&self, sheet: &str) {
        self.cells.retain(|k, _| k.sheet != sheet);
        self.calls.retain(|k, _| k.sheet != sheet);
    }

    pub fn clear(&self) {
        self.cells.clear();
        self.calls.clear();
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }
}
