//! Cell storage for one worksheet.
//!
//! Rows are kept sorted by index and cells within a row sorted by column,
//! the way the persisted document lays them out.

use gridcalc_common::{CellAddress, CellType, CellValue, LiteralValue};
use gridcalc_parse::{EditAxis, StructuralEdit, shift_formula};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// One stored cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CellRecord {
    pub col: u32,
    pub value: String,
    pub cell_type: CellType,
    /// Formula text without the leading `=`. Shared-formula children carry
    /// no text, only `shared_index`.
    pub formula: Option<String>,
    pub shared_index: Option<u32>,
}

impl CellRecord {
    pub fn new(col: u32) -> Self {
        Self {
            col,
            ..Default::default()
        }
    }

    pub fn has_formula(&self) -> bool {
        self.formula.as_deref().is_some_and(|f| !f.is_empty()) || self.shared_index.is_some()
    }

    pub fn is_blank(&self) -> bool {
        self.value.is_empty() && !self.has_formula()
    }

    /// Stored value as seen by formulas.
    pub fn literal(&self) -> LiteralValue {
        LiteralValue::from_stored(&self.value, self.cell_type)
    }

    /// Store an evaluator result, classifying its type.
    pub fn set_result(&mut self, result: String) {
        self.cell_type = CellType::classify(&result);
        self.value = result;
    }

    pub fn clear_result(&mut self) {
        self.value.clear();
        self.cell_type = CellType::Empty;
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowData {
    pub index: u32,
    pub cells: Vec<CellRecord>,
}

/// Position of a cell record: `(row slot, cell slot)`.
pub type CellPosition = (usize, usize);

#[derive(Debug, Clone)]
pub struct Worksheet {
    id: u32,
    name: String,
    rows: Vec<RowData>,
    /// Shared index → master cell.
    shared_masters: FxHashMap<u32, CellAddress>,
    next_shared_index: u32,
}

impl Worksheet {
    pub(crate) fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            rows: Vec::new(),
            shared_masters: FxHashMap::default(),
            next_shared_index: 0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[RowData] {
        &self.rows
    }

    /* ─────────────────────────── lookup ──────────────────────────── */

    fn row_slot(&self, row: u32) -> Result<usize, usize> {
        self.rows.binary_search_by_key(&row, |r| r.index)
    }

    fn position(&self, addr: CellAddress) -> Option<CellPosition> {
        let r = self.row_slot(addr.row).ok()?;
        let c = self.rows[r]
            .cells
            .binary_search_by_key(&addr.col, |c| c.col)
            .ok()?;
        Some((r, c))
    }

    pub fn cell(&self, addr: CellAddress) -> Option<&CellRecord> {
        let (r, c) = self.position(addr)?;
        Some(&self.rows[r].cells[c])
    }

    pub fn cell_mut(&mut self, addr: CellAddress) -> Option<&mut CellRecord> {
        let (r, c) = self.position(addr)?;
        Some(&mut self.rows[r].cells[c])
    }

    /// The record at `addr`, created empty if absent.
    pub fn cell_entry(&mut self, addr: CellAddress) -> &mut CellRecord {
        let r = match self.row_slot(addr.row) {
            Ok(r) => r,
            Err(r) => {
                self.rows.insert(
                    r,
                    RowData {
                        index: addr.row,
                        cells: Vec::new(),
                    },
                );
                r
            }
        };
        let row = &mut self.rows[r];
        let c = match row.cells.binary_search_by_key(&addr.col, |c| c.col) {
            Ok(c) => c,
            Err(c) => {
                row.cells.insert(c, CellRecord::new(addr.col));
                c
            }
        };
        &mut row.cells[c]
    }

    /// Replace the record at `addr` wholesale, as a document loader would.
    pub fn set_cell_record(&mut self, addr: CellAddress, mut record: CellRecord) {
        record.col = addr.col;
        if let (Some(si), Some(text)) = (record.shared_index, record.formula.as_deref()) {
            if !text.is_empty() {
                self.shared_masters.insert(si, addr);
                self.next_shared_index = self.next_shared_index.max(si + 1);
            }
        }
        *self.cell_entry(addr) = record;
    }

    pub fn value(&self, addr: CellAddress) -> LiteralValue {
        self.cell(addr)
            .map(CellRecord::literal)
            .unwrap_or(LiteralValue::Empty)
    }

    /// Row-major iteration over stored records.
    pub fn iter_cells(&self) -> impl Iterator<Item = (CellAddress, &CellRecord)> + '_ {
        self.rows.iter().flat_map(|row| {
            row.cells
                .iter()
                .map(move |cell| (CellAddress::new(cell.col, row.index), cell))
        })
    }

    /// Bottom-right corner of the non-blank area.
    pub fn used_extent(&self) -> Option<CellAddress> {
        let mut extent: Option<CellAddress> = None;
        for (addr, cell) in self.iter_cells() {
            if cell.is_blank() {
                continue;
            }
            extent = Some(match extent {
                Some(e) => CellAddress::new(e.col.max(addr.col), e.row.max(addr.row)),
                None => addr,
            });
        }
        extent
    }

    /// Transient index from address to record position. Valid until the
    /// next insertion or structural change.
    pub fn position_map(&self) -> FxHashMap<CellAddress, CellPosition> {
        let mut map = FxHashMap::default();
        for (r, row) in self.rows.iter().enumerate() {
            for (c, cell) in row.cells.iter().enumerate() {
                map.insert(CellAddress::new(cell.col, row.index), (r, c));
            }
        }
        map
    }

    pub fn record_at(&self, (r, c): CellPosition) -> Option<&CellRecord> {
        self.rows.get(r)?.cells.get(c)
    }

    pub fn record_at_mut(&mut self, (r, c): CellPosition) -> Option<&mut CellRecord> {
        self.rows.get_mut(r)?.cells.get_mut(c)
    }

    /* ─────────────────────────── formulas ──────────────────────────── */

    /// Formula text of `addr` with shared-formula indirection resolved.
    /// `None` when the cell holds no formula.
    pub fn effective_formula(&self, addr: CellAddress) -> Option<String> {
        let record = self.cell(addr)?;
        self.resolve_formula(addr, record)
    }

    fn resolve_formula(&self, addr: CellAddress, record: &CellRecord) -> Option<String> {
        match (record.formula.as_deref(), record.shared_index) {
            (Some(text), _) if !text.is_empty() => Some(text.to_string()),
            (_, Some(si)) => {
                let master = *self.shared_masters.get(&si)?;
                let text = self
                    .cell(master)?
                    .formula
                    .as_deref()
                    .filter(|t| !t.is_empty())?;
                let (rows, cols) = addr.offset_from(master);
                Some(shift_formula(text, rows, cols))
            }
            _ => None,
        }
    }

    /// Effective formula of the record at `pos`, as with [`Self::effective_formula`].
    pub fn formula_at(&self, (r, c): CellPosition) -> Option<String> {
        let row = self.rows.get(r)?;
        let record = row.cells.get(c)?;
        self.resolve_formula(CellAddress::new(record.col, row.index), record)
    }

    /// Every cell with an effective formula, row-major.
    pub fn formula_cells(&self) -> Vec<(CellAddress, String)> {
        self.iter_cells()
            .filter_map(|(addr, record)| {
                self.resolve_formula(addr, record)
                    .map(|formula| (addr, formula))
            })
            .collect()
    }

    pub(crate) fn set_value(&mut self, addr: CellAddress, value: &CellValue) {
        self.detach_shared(addr);
        let (text, cell_type) = value.to_stored();
        let record = self.cell_entry(addr);
        record.value = text;
        record.cell_type = cell_type;
        record.formula = None;
        record.shared_index = None;
    }

    /// Store formula text (leading `=` already stripped); empty text clears it.
    pub(crate) fn set_formula(&mut self, addr: CellAddress, formula: &str) {
        self.detach_shared(addr);
        let record = self.cell_entry(addr);
        record.formula = (!formula.is_empty()).then(|| formula.to_string());
        record.shared_index = None;
    }

    /// Store `formula` on `top_left` and mark every other cell of the
    /// rectangle as a child of it. Returns the new shared index.
    pub(crate) fn set_shared_formula(
        &mut self,
        top_left: CellAddress,
        bottom_right: CellAddress,
        formula: &str,
    ) -> u32 {
        let inside = |a: CellAddress| {
            (top_left.row..=bottom_right.row).contains(&a.row)
                && (top_left.col..=bottom_right.col).contains(&a.col)
        };
        let overlapped: Vec<u32> = self
            .shared_masters
            .iter()
            .filter(|(_, master)| inside(**master))
            .map(|(si, _)| *si)
            .collect();
        for si in overlapped {
            self.materialize_group(si);
        }

        let si = self.next_shared_index;
        self.next_shared_index += 1;
        for row in top_left.row..=bottom_right.row {
            for col in top_left.col..=bottom_right.col {
                let addr = CellAddress::new(col, row);
                let record = self.cell_entry(addr);
                record.formula = (addr == top_left).then(|| formula.to_string());
                record.shared_index = Some(si);
            }
        }
        self.shared_masters.insert(si, top_left);
        si
    }

    /// Write a master's group out as plain formulas before the master
    /// itself is overwritten.
    fn detach_shared(&mut self, addr: CellAddress) {
        let owned: Vec<u32> = self
            .shared_masters
            .iter()
            .filter(|(_, master)| **master == addr)
            .map(|(si, _)| *si)
            .collect();
        for si in owned {
            self.materialize_group(si);
        }
    }

    fn materialize_group(&mut self, si: u32) {
        let resolved: Vec<(CellAddress, Option<String>)> = self
            .iter_cells()
            .filter(|(_, record)| record.shared_index == Some(si))
            .map(|(addr, record)| (addr, self.resolve_formula(addr, record)))
            .collect();
        for (addr, formula) in resolved {
            if let Some(record) = self.cell_mut(addr) {
                record.formula = formula;
                record.shared_index = None;
            }
        }
        self.shared_masters.remove(&si);
    }

    /// Replace every shared formula by its effective text. Returns the
    /// number of cells rewritten.
    pub(crate) fn materialize_shared(&mut self) -> usize {
        let resolved: Vec<(CellAddress, Option<String>)> = self
            .iter_cells()
            .filter(|(_, record)| record.shared_index.is_some())
            .map(|(addr, record)| (addr, self.resolve_formula(addr, record)))
            .collect();
        let count = resolved.len();
        for (addr, formula) in resolved {
            if let Some(record) = self.cell_mut(addr) {
                record.formula = formula;
                record.shared_index = None;
            }
        }
        self.shared_masters.clear();
        count
    }

    /// Rewrite every stored formula in place.
    pub(crate) fn rewrite_formulas<F>(&mut self, mut rewrite: F)
    where
        F: FnMut(&str) -> String,
    {
        for row in &mut self.rows {
            for cell in &mut row.cells {
                if let Some(text) = cell.formula.as_deref().filter(|t| !t.is_empty()) {
                    cell.formula = Some(rewrite(text));
                }
            }
        }
    }

    /* ─────────────────────────── structure ──────────────────────────── */

    /// Move cell records according to `edit`. Records whose row or column
    /// is removed (or pushed off the grid) are dropped.
    pub(crate) fn apply_edit(&mut self, edit: &StructuralEdit) {
        let mut moved: Vec<(CellAddress, CellRecord)> = Vec::new();
        for row in std::mem::take(&mut self.rows) {
            for mut cell in row.cells {
                let Some(to) = relocate(edit, CellAddress::new(cell.col, row.index)) else {
                    continue;
                };
                cell.col = to.col;
                moved.push((to, cell));
            }
        }
        moved.sort_by_key(|(addr, _)| *addr);

        for (addr, cell) in moved {
            match self.rows.last_mut() {
                Some(last) if last.index == addr.row => last.cells.push(cell),
                _ => self.rows.push(RowData {
                    index: addr.row,
                    cells: vec![cell],
                }),
            }
        }

        self.shared_masters = self
            .shared_masters
            .iter()
            .filter_map(|(si, master)| relocate(edit, *master).map(|m| (*si, m)))
            .collect();
    }

    /* ─────────────────────────── grids ──────────────────────────── */

    fn grid<F>(&self, mut cell_text: F) -> Vec<Vec<String>>
    where
        F: FnMut(CellAddress, &CellRecord) -> String,
    {
        let mut grid: Vec<Vec<String>> = Vec::new();
        for row in &self.rows {
            let mut line: Vec<String> = Vec::new();
            for cell in &row.cells {
                let text = cell_text(CellAddress::new(cell.col, row.index), cell);
                if text.is_empty() {
                    continue;
                }
                line.resize(cell.col as usize - 1, String::new());
                line.push(text);
            }
            if line.is_empty() {
                continue;
            }
            grid.resize(row.index as usize - 1, Vec::new());
            grid.push(line);
        }
        grid
    }

    /// Dense grid of stored values; trailing empty cells and rows trimmed.
    pub fn grid_values(&self) -> Vec<Vec<String>> {
        self.grid(|_, cell| cell.value.clone())
    }

    /// Dense grid of effective formulas; trailing empty cells and rows trimmed.
    pub fn grid_formulas(&self) -> Vec<Vec<String>> {
        self.grid(|addr, cell| self.resolve_formula(addr, cell).unwrap_or_default())
    }
}

/// Where `addr` ends up after `edit`, or `None` when it is removed.
pub(crate) fn relocate(edit: &StructuralEdit, addr: CellAddress) -> Option<CellAddress> {
    match edit.axis() {
        EditAxis::Row => edit
            .map_index(addr.row)
            .map(|row| CellAddress::new(addr.col, row)),
        EditAxis::Column => edit
            .map_index(addr.col)
            .map(|col| CellAddress::new(col, addr.row)),
    }
}
