//! Structured view of reference-shaped operand text.

use std::fmt;

use gridcalc_common::{MAX_COLUMNS, MAX_ROWS, column_name, column_number, split_a1};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One coordinate of a reference: an index plus its `$` anchor.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Axis {
    pub index: u32,
    pub absolute: bool,
}

impl Axis {
    pub const fn new(index: u32, absolute: bool) -> Self {
        Self { index, absolute }
    }

    fn anchor(&self) -> &'static str {
        if self.absolute { "$" } else { "" }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub col: Axis,
    pub row: Axis,
}

impl CellRef {
    pub fn address(&self) -> gridcalc_common::CellAddress {
        gridcalc_common::CellAddress::new(self.col.index, self.row.index)
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefTarget {
    Cell(CellRef),
    Range(CellRef, CellRef),
    /// `A:C`
    Columns(Axis, Axis),
    /// `1:3`
    Rows(Axis, Axis),
    /// Anything containing `#REF!`.
    Broken,
}

/// Sheet prefix as written, remembering whether it was quoted.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SheetName {
    pub name: String,
    pub quoted: bool,
}

impl SheetName {
    /// Prefix text including the trailing `!`.
    pub fn prefix(&self) -> String {
        if self.quoted {
            format!("'{}'!", self.name.replace('\'', "''"))
        } else {
            format!("{}!", self.name)
        }
    }
}

/// A parsed reference operand.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub sheet: Option<SheetName>,
    pub target: RefTarget,
}

impl Reference {
    /// Parse operand text such as `A1`, `$A$1:B9`, `'My Sheet'!C:C`,
    /// `Data!A#REF!`. Returns `None` for names and anything else that is
    /// not a reference.
    pub fn parse(text: &str) -> Option<Reference> {
        let (sheet, rest) = split_sheet(text)?;
        if rest.is_empty() {
            return None;
        }
        if rest.to_ascii_uppercase().contains("#REF!") {
            return Some(Reference {
                sheet,
                target: RefTarget::Broken,
            });
        }
        let target = match rest.split_once(':') {
            None => RefTarget::Cell(parse_cell(rest)?),
            Some((a, b)) => {
                if let (Some(a), Some(b)) = (parse_cell(a), parse_cell(b)) {
                    RefTarget::Range(a, b)
                } else if let (Some(a), Some(b)) = (parse_column(a), parse_column(b)) {
                    RefTarget::Columns(a, b)
                } else if let (Some(a), Some(b)) = (parse_row(a), parse_row(b)) {
                    RefTarget::Rows(a, b)
                } else {
                    return None;
                }
            }
        };
        Some(Reference { sheet, target })
    }

    /// Explicit sheet name, if any.
    pub fn sheet_name(&self) -> Option<&str> {
        self.sheet.as_ref().map(|s| s.name.as_str())
    }

    /// The sheet this reference points at when written on `current`.
    pub fn resolved_sheet<'a>(&'a self, current: &'a str) -> &'a str {
        self.sheet_name().unwrap_or(current)
    }

    fn prefix(&self) -> String {
        self.sheet.as_ref().map(SheetName::prefix).unwrap_or_default()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix())?;
        match &self.target {
            RefTarget::Cell(c) => f.write_str(&render_cell(Some(c.col), Some(c.row))),
            RefTarget::Range(a, b) => write!(
                f,
                "{}:{}",
                render_cell(Some(a.col), Some(a.row)),
                render_cell(Some(b.col), Some(b.row))
            ),
            RefTarget::Columns(a, b) => write!(
                f,
                "{}{}:{}{}",
                a.anchor(),
                column_name(a.index),
                b.anchor(),
                column_name(b.index)
            ),
            RefTarget::Rows(a, b) => {
                write!(f, "{}{}:{}{}", a.anchor(), a.index, b.anchor(), b.index)
            }
            RefTarget::Broken => f.write_str("#REF!"),
        }
    }
}

/// Render a cell where a missing axis became `#REF!`.
pub(crate) fn render_cell(col: Option<Axis>, row: Option<Axis>) -> String {
    let mut out = String::new();
    match col {
        Some(c) => {
            out.push_str(c.anchor());
            out.push_str(&column_name(c.index));
        }
        None => out.push_str("#REF!"),
    }
    match row {
        Some(r) => {
            out.push_str(r.anchor());
            out.push_str(&r.index.to_string());
        }
        None => out.push_str("#REF!"),
    }
    out
}

fn split_sheet(text: &str) -> Option<(Option<SheetName>, &str)> {
    if let Some(body) = text.strip_prefix('\'') {
        let bytes = body.as_bytes();
        let mut i = 0;
        let mut name = String::new();
        while i < bytes.len() {
            if bytes[i] == b'\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    name.push('\'');
                    i += 2;
                    continue;
                }
                let rest = body[i + 1..].strip_prefix('!')?;
                return Some((Some(SheetName { name, quoted: true }), rest));
            }
            let ch = body[i..].chars().next()?;
            name.push(ch);
            i += ch.len_utf8();
        }
        return None;
    }
    match text.find('!') {
        Some(pos) if pos > 0 && !text[..pos].contains('#') => Some((
            Some(SheetName {
                name: text[..pos].to_string(),
                quoted: false,
            }),
            &text[pos + 1..],
        )),
        _ => Some((None, text)),
    }
}

fn parse_cell(text: &str) -> Option<CellRef> {
    let (col, col_abs, row, row_abs) = split_a1(text).ok()?;
    Some(CellRef {
        col: Axis::new(col, col_abs),
        row: Axis::new(row, row_abs),
    })
}

fn parse_column(text: &str) -> Option<Axis> {
    let absolute = text.starts_with('$');
    let col = column_number(text).ok()?;
    (col <= MAX_COLUMNS).then_some(Axis::new(col, absolute))
}

fn parse_row(text: &str) -> Option<Axis> {
    let absolute = text.starts_with('$');
    let digits = text.strip_prefix('$').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let row: u32 = digits.parse().ok()?;
    (1..=MAX_ROWS).contains(&row).then_some(Axis::new(row, absolute))
}
