//! The calculation chain: the ordered list of formula-bearing cells.
//!
//! The persisted form tags each entry with a sheet id where `0` means
//! "same sheet as the previous entry". In memory every entry is kept
//! resolved, and the run-length form is produced on demand.

use gridcalc_common::CellAddress;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Persisted chain entry. `sheet_id == 0` repeats the previous entry's sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalcChainEntry {
    pub sheet_id: u32,
    pub cell: CellAddress,
}

impl CalcChainEntry {
    pub fn new(sheet_id: u32, cell: CellAddress) -> Self {
        Self { sheet_id, cell }
    }
}

/// Removals leave holes, compacted once at least this many outnumber the live entries.
const MIN_COMPACT_HOLES: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct CalcChain {
    /// Chain order. Removed entries leave `None` until the next compaction.
    slots: Vec<Option<(u32, CellAddress)>>,
    /// Live entry → its slot.
    index: FxHashMap<(u32, CellAddress), usize>,
}

impl CalcChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the persisted form. Leading entries without an explicit sheet
    /// are dropped, as are duplicates.
    pub fn from_entries(entries: &[CalcChainEntry]) -> Self {
        let mut chain = Self::new();
        let mut current: Option<u32> = None;
        for entry in entries {
            if entry.sheet_id != 0 {
                current = Some(entry.sheet_id);
            }
            match current {
                Some(sheet_id) => {
                    chain.add_entry(sheet_id, entry.cell);
                }
                None => {
                    tracing::debug!(cell = %entry.cell, "calc chain entry without sheet dropped");
                }
            }
        }
        chain
    }

    /// Append `(sheet_id, cell)` unless already present. Returns whether the
    /// chain changed.
    pub fn add_entry(&mut self, sheet_id: u32, cell: CellAddress) -> bool {
        let key = (sheet_id, cell);
        if sheet_id == 0 || self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.slots.len());
        self.slots.push(Some(key));
        true
    }

    pub fn remove_entry(&mut self, sheet_id: u32, cell: CellAddress) -> bool {
        let Some(slot) = self.index.remove(&(sheet_id, cell)) else {
            return false;
        };
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = None;
        }
        let holes = self.slots.len() - self.index.len();
        if holes >= MIN_COMPACT_HOLES && holes > self.index.len() {
            self.compact();
        }
        true
    }

    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        for (i, key) in self.slots.iter().enumerate() {
            if let Some(key) = key {
                self.index.insert(*key, i);
            }
        }
    }

    pub fn contains(&self, sheet_id: u32, cell: CellAddress) -> bool {
        self.index.contains_key(&(sheet_id, cell))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
    }

    /// Resolved `(sheet_id, cell)` pairs in chain order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, CellAddress)> + '_ {
        self.slots.iter().flatten().copied()
    }

    /// The persisted, run-length encoded form.
    pub fn entries(&self) -> Vec<CalcChainEntry> {
        let mut out = Vec::with_capacity(self.len());
        let mut previous = None;
        for (sheet_id, cell) in self.iter() {
            let tag = if previous == Some(sheet_id) { 0 } else { sheet_id };
            out.push(CalcChainEntry::new(tag, cell));
            previous = Some(sheet_id);
        }
        out
    }

    /// Move or drop the entries of one sheet, keeping chain order.
    pub fn remap_sheet<F>(&mut self, sheet_id: u32, mut relocate: F)
    where
        F: FnMut(CellAddress) -> Option<CellAddress>,
    {
        let old = std::mem::take(&mut self.slots);
        self.index.clear();
        for (id, cell) in old.into_iter().flatten() {
            let cell = if id == sheet_id {
                match relocate(cell) {
                    Some(c) => c,
                    None => continue,
                }
            } else {
                cell
            };
            self.add_entry(id, cell);
        }
    }
}
