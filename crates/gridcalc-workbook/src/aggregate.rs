//! Batch evaluation of two-criteria SUMIFS / AVERAGEIFS groups.
//!
//! Sheets often hold hundreds of calls such as
//! `SUMIFS('source'!$H:$H,'source'!$D:$D,$A2,'source'!$A:$A,B$1)` that
//! differ only in their criteria cells. Evaluated one by one each call scans
//! the whole source column. Here every such group is answered from a single
//! parallel scan of the source rows and the results are seeded into the
//! result cache ahead of the regular recalculation loop.

use gridcalc_common::{CellAddress, LiteralValue, format_number};
use gridcalc_parse::{RefTarget, Reference};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::cache::ResultCache;
use crate::worksheet::{RowData, Worksheet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Sum,
    Average,
}

impl AggregateKind {
    fn name(&self) -> &'static [u8] {
        match self {
            AggregateKind::Sum => b"SUMIFS",
            AggregateKind::Average => b"AVERAGEIFS",
        }
    }
}

/// A SUMIFS/AVERAGEIFS call located in formula text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateCall<'a> {
    pub kind: AggregateKind,
    /// Source text from the function name through the closing parenthesis.
    pub text: &'a str,
    pub args: SmallVec<[&'a str; 5]>,
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

fn call_at(bytes: &[u8], i: usize) -> Option<AggregateKind> {
    if i > 0 && is_word_byte(bytes[i - 1]) {
        return None;
    }
    [AggregateKind::Sum, AggregateKind::Average]
        .into_iter()
        .find(|kind| {
            let name = kind.name();
            bytes.len() > i + name.len()
                && bytes[i..i + name.len()].eq_ignore_ascii_case(name)
                && bytes[i + name.len()] == b'('
        })
}

/// Bracket-match the call starting at `start`, honouring string literals
/// and quoted sheet names.
fn parse_call(formula: &str, start: usize, kind: AggregateKind) -> Option<AggregateCall<'_>> {
    let bytes = formula.as_bytes();
    let open = start + kind.name().len();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut in_sheet = false;
    let mut arg_start = open + 1;
    let mut args = SmallVec::new();

    for (j, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            in_string = b != b'"';
            continue;
        }
        if in_sheet {
            in_sheet = b != b'\'';
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'\'' => in_sheet = true,
            b'(' | b'{' => depth += 1,
            b')' | b'}' => {
                depth -= 1;
                if depth == 0 {
                    args.push(formula[arg_start..j].trim());
                    return Some(AggregateCall {
                        kind,
                        text: &formula[start..=j],
                        args,
                    });
                }
            }
            b',' if depth == 1 => {
                args.push(formula[arg_start..j].trim());
                arg_start = j + 1;
            }
            _ => {}
        }
    }
    None
}

/// Every top-level SUMIFS/AVERAGEIFS call in `formula`, left to right.
/// Calls nested inside another located call are not reported separately.
pub fn find_calls(formula: &str) -> Vec<AggregateCall<'_>> {
    let bytes = formula.as_bytes();
    let mut calls = Vec::new();
    let mut in_string = false;
    let mut in_sheet = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            in_string = b != b'"';
        } else if in_sheet {
            in_sheet = b != b'\'';
        } else if b == b'"' {
            in_string = true;
        } else if b == b'\'' {
            in_sheet = true;
        } else if let Some(kind) = call_at(bytes, i) {
            if let Some(call) = parse_call(formula, i, kind) {
                i += call.text.len();
                calls.push(call);
                continue;
            }
        }
        i += 1;
    }
    calls
}

/* ─────────────────────────── grouping ──────────────────────────── */

/// Calls sharing a kind and the same three source columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub kind: AggregateKind,
    pub sheet: String,
    pub sum_col: u32,
    pub criteria1_col: u32,
    pub criteria2_col: u32,
}

#[derive(Debug, Clone)]
struct Member {
    sheet: String,
    cell: CellAddress,
    call: String,
    whole: bool,
    keys: (CriteriaKey, CriteriaKey),
}

fn single_column(arg: &str) -> Option<(String, u32)> {
    let reference = Reference::parse(arg)?;
    let sheet = reference.sheet_name()?.to_string();
    match reference.target {
        RefTarget::Columns(a, b) if a.index == b.index => Some((sheet, a.index)),
        _ => None,
    }
}

fn criteria_cell(arg: &str) -> Option<CellAddress> {
    let reference = Reference::parse(arg)?;
    match (reference.sheet, reference.target) {
        (None, RefTarget::Cell(c)) => Some(c.address()),
        _ => None,
    }
}

/// Group key plus the two criteria cells, when `call` has the batchable
/// shape: five arguments, three single full columns on one named sheet and
/// two unqualified criteria cells.
pub fn classify(call: &AggregateCall<'_>) -> Option<(GroupKey, CellAddress, CellAddress)> {
    let [sum, range1, key1, range2, key2] = call.args.as_slice() else {
        return None;
    };
    let (sheet, sum_col) = single_column(sum)?;
    let (sheet1, criteria1_col) = single_column(range1)?;
    let (sheet2, criteria2_col) = single_column(range2)?;
    if sheet1 != sheet || sheet2 != sheet {
        return None;
    }
    let key = GroupKey {
        kind: call.kind,
        sheet,
        sum_col,
        criteria1_col,
        criteria2_col,
    };
    Some((key, criteria_cell(key1)?, criteria_cell(key2)?))
}

/* ─────────────────────────── keys & totals ──────────────────────────── */

/// Equality key shared by source cells and criteria values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CriteriaKey {
    Number(u64),
    /// Lowercased.
    Text(String),
}

impl CriteriaKey {
    fn number(n: f64) -> Self {
        let n = if n == 0.0 { 0.0 } else { n };
        CriteriaKey::Number(n.to_bits())
    }

    fn text(s: &str) -> Self {
        match s.parse::<f64>() {
            Ok(n) if n.is_finite() => Self::number(n),
            _ => CriteriaKey::Text(s.to_lowercase()),
        }
    }

    /// Key of a source cell. Empty, boolean and error cells never match a
    /// plain criterion.
    fn from_source(value: &LiteralValue) -> Option<Self> {
        match value {
            LiteralValue::Number(n) => Some(Self::number(*n)),
            LiteralValue::Text(s) if !s.is_empty() => Some(Self::text(s)),
            _ => None,
        }
    }

    /// Key of a criteria value, or `None` when it is anything other than a
    /// plain equality test (operators, wildcards, booleans, blanks, errors).
    fn from_criterion(value: &LiteralValue) -> Option<Self> {
        match value {
            LiteralValue::Number(n) => Some(Self::number(*n)),
            LiteralValue::Text(s) => {
                if s.is_empty()
                    || s.starts_with(['<', '>', '='])
                    || s.contains(['*', '?', '~'])
                    || s.eq_ignore_ascii_case("TRUE")
                    || s.eq_ignore_ascii_case("FALSE")
                {
                    None
                } else {
                    Some(Self::text(s))
                }
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Accumulator {
    sum: f64,
    count: u32,
}

type Totals = FxHashMap<CriteriaKey, FxHashMap<CriteriaKey, Accumulator>>;

fn cell_value(row: &RowData, col: u32) -> LiteralValue {
    row.cells
        .binary_search_by_key(&col, |c| c.col)
        .map(|i| row.cells[i].literal())
        .unwrap_or(LiteralValue::Empty)
}

/// Only numbers are summed. Blank cells, text such as the out-of-stock
/// marker `断货`, booleans and errors are skipped, as the evaluator does.
fn amount(value: &LiteralValue) -> Option<f64> {
    match value {
        LiteralValue::Number(n) => Some(*n),
        _ => None,
    }
}

fn scan_rows(rows: &[RowData], key: &GroupKey) -> Totals {
    let mut totals = Totals::default();
    for row in rows {
        let Some(k1) = CriteriaKey::from_source(&cell_value(row, key.criteria1_col)) else {
            continue;
        };
        let Some(k2) = CriteriaKey::from_source(&cell_value(row, key.criteria2_col)) else {
            continue;
        };
        let Some(n) = amount(&cell_value(row, key.sum_col)) else {
            continue;
        };
        let acc = totals.entry(k1).or_default().entry(k2).or_default();
        acc.sum += n;
        acc.count += 1;
    }
    totals
}

fn group_totals(source: &Worksheet, key: &GroupKey) -> Totals {
    let rows = source.rows();
    let workers = rayon::current_num_threads().min(rows.len()).max(1);
    let chunk = rows.len().div_ceil(workers).max(1);

    let partials: Vec<Totals> = rows
        .par_chunks(chunk)
        .map(|slice| scan_rows(slice, key))
        .collect();

    let mut totals = Totals::default();
    for partial in partials {
        for (k1, inner) in partial {
            let merged = totals.entry(k1).or_default();
            for (k2, acc) in inner {
                let slot = merged.entry(k2).or_default();
                slot.sum += acc.sum;
                slot.count += acc.count;
            }
        }
    }
    totals
}

fn result_text(kind: AggregateKind, acc: Option<Accumulator>) -> Option<String> {
    let acc = acc.unwrap_or_default();
    match kind {
        AggregateKind::Sum => Some(format_number(acc.sum)),
        // No matching rows is #DIV/0!; the evaluator reports it.
        AggregateKind::Average if acc.count == 0 => None,
        AggregateKind::Average => Some(format_number(acc.sum / f64::from(acc.count))),
    }
}

/* ─────────────────────────── driver ──────────────────────────── */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Groups that met the threshold and were computed.
    pub groups: usize,
    /// Cache entries written.
    pub seeded: usize,
}

fn collect_groups(sheets: &[Worksheet]) -> FxHashMap<GroupKey, Vec<Member>> {
    let mut groups: FxHashMap<GroupKey, Vec<Member>> = FxHashMap::default();
    for sheet in sheets {
        for (cell, formula) in sheet.formula_cells() {
            for call in find_calls(&formula) {
                let Some((key, c1, c2)) = classify(&call) else {
                    continue;
                };
                let keys = (
                    CriteriaKey::from_criterion(&sheet.value(c1)),
                    CriteriaKey::from_criterion(&sheet.value(c2)),
                );
                let (Some(k1), Some(k2)) = keys else {
                    continue;
                };
                groups.entry(key).or_default().push(Member {
                    sheet: sheet.name().to_string(),
                    cell,
                    call: call.text.to_string(),
                    whole: formula.trim() == call.text,
                    keys: (k1, k2),
                });
            }
        }
    }
    groups
}

/// Compute every group of at least `threshold` calls and seed `cache`.
///
/// A call that is the whole formula seeds the cell result; a call nested
/// in a larger expression seeds the call cache the evaluator consults.
/// Criteria and amounts are read from the stored values before the pass, so a
/// criteria formula that changes later in the same pass leaves its members stale.
pub fn precompute(sheets: &[Worksheet], cache: &ResultCache, threshold: usize) -> BatchReport {
    let _span = tracing::info_span!("aggregate_batch").entered();
    let mut report = BatchReport::default();

    for (key, members) in collect_groups(sheets) {
        if members.len() < threshold.max(1) {
            continue;
        }
        let Some(source) = sheets.iter().find(|s| s.name() == key.sheet) else {
            tracing::debug!(sheet = %key.sheet, "aggregate source sheet missing");
            continue;
        };
        let totals = group_totals(source, &key);
        report.groups += 1;

        for member in members {
            let acc = totals
                .get(&member.keys.0)
                .and_then(|inner| inner.get(&member.keys.1))
                .copied();
            let Some(text) = result_text(key.kind, acc) else {
                continue;
            };
            if member.whole {
                cache.insert(&member.sheet, member.cell, true, text);
            } else {
                cache.insert_call(&member.sheet, member.cell, &member.call, text);
            }
            report.seeded += 1;
        }
    }

    tracing::info!(groups = report.groups, seeded = report.seeded, "aggregate batching done");
    report
}
