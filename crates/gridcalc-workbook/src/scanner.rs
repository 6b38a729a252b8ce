//! Textual dependency scanning over the calc chain.
//!
//! References are pulled out of formula text with a regex after string
//! literals are masked. A match may over-report (a name that merely looks
//! like a cell); that only costs an extra evaluation.

use gridcalc_common::{CellAddress, MAX_COLUMNS, MAX_ROWS, column_number, split_a1};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        (?:(?P<sheet>'(?:[^']|'')+'|[\p{L}\p{N}_.]+)!)?
        (?P<target>
            \$?[A-Za-z]{1,3}\$?[0-9]+(?::\$?[A-Za-z]{1,3}\$?[0-9]+)?
          | \$?[A-Za-z]{1,3}:\$?[A-Za-z]{1,3}
          | \$?[0-9]+:\$?[0-9]+
        )",
    )
    .expect("reference regex must compile")
});

/* ─────────────────────────── cell sets ──────────────────────────── */

/// Cells grouped by sheet, with column and row indexes kept alongside for
/// full-column and full-row checks.
#[derive(Debug, Clone, Default)]
pub struct CellSet {
    cells: FxHashMap<String, FxHashSet<CellAddress>>,
    columns: FxHashMap<String, FxHashSet<u32>>,
    rows: FxHashMap<String, FxHashSet<u32>>,
    len: usize,
}

impl CellSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sheet: &str, cell: CellAddress) -> bool {
        if !self.cells.entry(sheet.to_string()).or_default().insert(cell) {
            return false;
        }
        self.columns
            .entry(sheet.to_string())
            .or_default()
            .insert(cell.col);
        self.rows.entry(sheet.to_string()).or_default().insert(cell.row);
        self.len += 1;
        true
    }

    pub fn contains(&self, sheet: &str, cell: CellAddress) -> bool {
        self.cells.get(sheet).is_some_and(|s| s.contains(&cell))
    }

    /// Whether some member of `sheet` lies in a column within `lo..=hi`.
    pub fn covers_columns(&self, sheet: &str, lo: u32, hi: u32) -> bool {
        self.columns
            .get(sheet)
            .is_some_and(|cols| cols.iter().any(|c| (lo..=hi).contains(c)))
    }

    pub fn covers_rows(&self, sheet: &str, lo: u32, hi: u32) -> bool {
        self.rows
            .get(sheet)
            .is_some_and(|rows| rows.iter().any(|r| (lo..=hi).contains(r)))
    }

    /// Whether some member of `sheet` lies inside the rectangle.
    pub fn intersects(&self, sheet: &str, top_left: CellAddress, bottom_right: CellAddress) -> bool {
        let (r0, r1) = (top_left.row.min(bottom_right.row), top_left.row.max(bottom_right.row));
        let (c0, c1) = (top_left.col.min(bottom_right.col), top_left.col.max(bottom_right.col));
        self.cells.get(sheet).is_some_and(|cells| {
            cells
                .iter()
                .any(|c| (r0..=r1).contains(&c.row) && (c0..=c1).contains(&c.col))
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, CellAddress)> + '_ {
        self.cells
            .iter()
            .flat_map(|(sheet, cells)| cells.iter().map(move |c| (sheet.as_str(), *c)))
    }

    pub fn extend_from(&mut self, other: &CellSet) {
        for (sheet, cell) in other.iter() {
            self.insert(sheet, cell);
        }
    }
}

/* ─────────────────────────── references ──────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefSpan {
    Cell(CellAddress),
    Range(CellAddress, CellAddress),
    Columns(u32, u32),
    Rows(u32, u32),
}

/// A reference found in formula text, with its sheet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRef {
    pub sheet: String,
    pub span: RefSpan,
}

impl ScannedRef {
    pub fn hits(&self, set: &CellSet) -> bool {
        match self.span {
            RefSpan::Cell(c) => set.contains(&self.sheet, c),
            RefSpan::Range(a, b) => set.intersects(&self.sheet, a, b),
            RefSpan::Columns(lo, hi) => set.covers_columns(&self.sheet, lo, hi),
            RefSpan::Rows(lo, hi) => set.covers_rows(&self.sheet, lo, hi),
        }
    }
}

/// Blank out the contents of string literals. Quoted sheet names are left
/// alone so that a `"` inside one does not open a string.
fn mask_string_literals(formula: &str) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut in_string = false;
    let mut in_sheet = false;
    for ch in formula.chars() {
        match ch {
            '"' if !in_sheet => {
                in_string = !in_string;
                out.push(ch);
            }
            '\'' if !in_string => {
                in_sheet = !in_sheet;
                out.push(ch);
            }
            _ if in_string => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn parse_cell(text: &str) -> Option<CellAddress> {
    let (col, _, row, _) = split_a1(text).ok()?;
    let addr = CellAddress::new(col, row);
    addr.is_valid().then_some(addr)
}

fn parse_col(text: &str) -> Option<u32> {
    column_number(text).ok().filter(|c| (1..=MAX_COLUMNS).contains(c))
}

fn parse_row(text: &str) -> Option<u32> {
    text.trim_start_matches('$')
        .parse::<u32>()
        .ok()
        .filter(|r| (1..=MAX_ROWS).contains(r))
}

fn parse_span(target: &str) -> Option<RefSpan> {
    let Some((lhs, rhs)) = target.split_once(':') else {
        return parse_cell(target).map(RefSpan::Cell);
    };
    if lhs.trim_start_matches('$').starts_with(|c: char| c.is_ascii_digit()) {
        let (a, b) = (parse_row(lhs)?, parse_row(rhs)?);
        return Some(RefSpan::Rows(a.min(b), a.max(b)));
    }
    if lhs.ends_with(|c: char| c.is_ascii_digit()) {
        return Some(RefSpan::Range(parse_cell(lhs)?, parse_cell(rhs)?));
    }
    let (a, b) = (parse_col(lhs)?, parse_col(rhs)?);
    Some(RefSpan::Columns(a.min(b), a.max(b)))
}

fn unquote_sheet(raw: &str) -> String {
    match raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => raw.to_string(),
    }
}

/// Every reference in `formula`. Unqualified references resolve to
/// `current_sheet`.
pub fn extract_references(formula: &str, current_sheet: &str) -> Vec<ScannedRef> {
    let masked = mask_string_literals(formula);
    let mut refs = Vec::new();
    for caps in REFERENCE.captures_iter(&masked) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(target) = caps.name("target") else { continue };
        let before = masked[..whole.start()].chars().next_back();
        let after = masked[whole.end()..].chars().next();
        if before.is_some_and(is_word_char) || after.is_some_and(|c| c == '(' || c == '!' || is_word_char(c)) {
            continue;
        }
        let Some(span) = parse_span(target.as_str()) else {
            continue;
        };
        let sheet = caps
            .name("sheet")
            .map(|s| unquote_sheet(s.as_str()))
            .unwrap_or_else(|| current_sheet.to_string());
        refs.push(ScannedRef { sheet, span });
    }
    refs
}

/* ─────────────────────────── scanner ──────────────────────────── */

#[derive(Debug, Clone)]
struct ScanEntry {
    sheet: String,
    cell: CellAddress,
    refs: Vec<ScannedRef>,
}

/// Chain formulas with their references extracted once up front.
#[derive(Debug, Clone, Default)]
pub struct DependencyScanner {
    entries: Vec<ScanEntry>,
}

impl DependencyScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sheet: &str, cell: CellAddress, formula: &str) {
        self.entries.push(ScanEntry {
            sheet: sheet.to_string(),
            cell,
            refs: extract_references(formula, sheet),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Formula cells whose value may depend on `updated`, closed
    /// transitively. `seeds` (cells whose own formula changed) are part of
    /// the result and propagate like any other affected cell.
    pub fn find_affected(&self, updated: &CellSet, seeds: &CellSet) -> CellSet {
        let mut affected = seeds.clone();
        let mut pending = Vec::with_capacity(self.entries.len());

        for (i, entry) in self.entries.iter().enumerate() {
            if affected.contains(&entry.sheet, entry.cell) {
                continue;
            }
            if entry.refs.iter().any(|r| r.hits(updated)) {
                affected.insert(&entry.sheet, entry.cell);
            } else {
                pending.push(i);
            }
        }

        let mut passes = 0usize;
        loop {
            passes += 1;
            let before = affected.len();
            pending.retain(|&i| {
                let entry = &self.entries[i];
                if entry.refs.iter().any(|r| r.hits(&affected)) {
                    affected.insert(&entry.sheet, entry.cell);
                    false
                } else {
                    true
                }
            });
            if affected.len() == before {
                break;
            }
        }

        tracing::debug!(
            chain = self.entries.len(),
            updated = updated.len(),
            affected = affected.len(),
            passes,
            "dependency scan"
        );
        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(a1: &str) -> CellAddress {
        CellAddress::parse(a1).unwrap()
    }

    fn spans(formula: &str) -> Vec<(String, RefSpan)> {
        extract_references(formula, "Sheet1")
            .into_iter()
            .map(|r| (r.sheet, r.span))
            .collect()
    }

    fn set(cells: &[(&str, &str)]) -> CellSet {
        let mut s = CellSet::new();
        for (sheet, cell) in cells {
            s.insert(sheet, a(cell));
        }
        s
    }

    #[test]
    fn extracts_reference_shapes() {
        assert_eq!(
            spans("$A$1+Data!B2*SUM(C1:D4)+SUM('Daily Inventory'!$H:$H)+SUM(3:5)"),
            vec![
                ("Sheet1".to_string(), RefSpan::Cell(a("A1"))),
                ("Data".to_string(), RefSpan::Cell(a("B2"))),
                ("Sheet1".to_string(), RefSpan::Range(a("C1"), a("D4"))),
                ("Daily Inventory".to_string(), RefSpan::Columns(8, 8)),
                ("Sheet1".to_string(), RefSpan::Rows(3, 5)),
            ]
        );
    }

    #[test]
    fn ignores_strings_and_function_names() {
        assert_eq!(spans("\"A1\"&LOG10(2)&\"Data!B2\""), vec![]);
        assert_eq!(
            spans("IF(B1=\"x:y\",\"\",C2)"),
            vec![
                ("Sheet1".to_string(), RefSpan::Cell(a("B1"))),
                ("Sheet1".to_string(), RefSpan::Cell(a("C2"))),
            ]
        );
    }

    #[test]
    fn sheet_names_with_unicode_and_quotes() {
        assert_eq!(
            spans("库存!A2+'it''s'!B3"),
            vec![
                ("库存".to_string(), RefSpan::Cell(a("A2"))),
                ("it's".to_string(), RefSpan::Cell(a("B3"))),
            ]
        );
    }

    #[test]
    fn column_coverage_is_numeric() {
        let updated = set(&[("Sheet1", "C7")]);
        let r = &extract_references("SUM(B:AA)", "Sheet1")[0];
        assert!(r.hits(&updated));
        let r = &extract_references("SUM(D:AA)", "Sheet1")[0];
        assert!(!r.hits(&updated));
    }

    #[test]
    fn bounded_ranges_count_in_first_phase() {
        let mut scanner = DependencyScanner::new();
        scanner.push("Sheet1", a("B1"), "SUM(A1:A10)");
        let affected = scanner.find_affected(&set(&[("Sheet1", "A5")]), &CellSet::new());
        assert!(affected.contains("Sheet1", a("B1")));
    }

    #[test]
    fn closure_does_not_depend_on_chain_order() {
        let mut scanner = DependencyScanner::new();
        scanner.push("Sheet1", a("D1"), "C1*2");
        scanner.push("Sheet1", a("C1"), "B1+10");
        scanner.push("Sheet1", a("B1"), "A1*2");
        scanner.push("Sheet1", a("E1"), "Z1");
        let affected = scanner.find_affected(&set(&[("Sheet1", "A1")]), &CellSet::new());
        assert_eq!(affected.len(), 3);
        for cell in ["B1", "C1", "D1"] {
            assert!(affected.contains("Sheet1", a(cell)));
        }
    }

    #[test]
    fn qualification_follows_the_formula_sheet() {
        let mut scanner = DependencyScanner::new();
        scanner.push("Data", a("B1"), "A1");
        scanner.push("Sheet1", a("B1"), "Data!A1");
        scanner.push("Sheet1", a("C1"), "A1");
        let affected = scanner.find_affected(&set(&[("Data", "A1")]), &CellSet::new());
        assert!(affected.contains("Data", a("B1")));
        assert!(affected.contains("Sheet1", a("B1")));
        assert!(!affected.contains("Sheet1", a("C1")));
    }

    #[test]
    fn seeds_propagate() {
        let mut scanner = DependencyScanner::new();
        scanner.push("Sheet1", a("A1"), "1+1");
        scanner.push("Sheet1", a("A2"), "A1*2");
        let affected = scanner.find_affected(&CellSet::new(), &set(&[("Sheet1", "A1")]));
        assert!(affected.contains("Sheet1", a("A2")));
        assert_eq!(affected.len(), 2);
    }
}
