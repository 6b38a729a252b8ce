//! A1-style cell addresses and column-name conversion.

use std::error::Error;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Last addressable row (1-based).
pub const MAX_ROWS: u32 = 1_048_576;
/// Last addressable column (1-based, `XFD`).
pub const MAX_COLUMNS: u32 = 16_384;

/// Errors raised while parsing A1 text or column names.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AddressError {
    /// Input was empty.
    Empty,
    /// Column letters missing, malformed or beyond `XFD`.
    InvalidColumn(String),
    /// Row digits missing, zero or beyond the sheet limit.
    InvalidRow(String),
    /// Characters after the row digits, or otherwise not an A1 address.
    Malformed(String),
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::Empty => write!(f, "empty cell reference"),
            AddressError::InvalidColumn(s) => write!(f, "invalid column name {s:?}"),
            AddressError::InvalidRow(s) => write!(f, "invalid row number in {s:?}"),
            AddressError::Malformed(s) => write!(f, "malformed cell reference {s:?}"),
        }
    }
}

impl Error for AddressError {}

/// Convert a 1-based column number into its letters (`1 -> A`, `28 -> AB`).
pub fn column_name(mut col: u32) -> String {
    let mut buf = Vec::with_capacity(3);
    while col > 0 {
        let rem = (col - 1) % 26;
        buf.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

/// Convert column letters (case-insensitive, optional leading `$`) into a
/// 1-based column number.
pub fn column_number(name: &str) -> Result<u32, AddressError> {
    let letters = name.strip_prefix('$').unwrap_or(name);
    if letters.is_empty() || letters.len() > 3 {
        return Err(AddressError::InvalidColumn(name.to_string()));
    }
    let mut col: u32 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return Err(AddressError::InvalidColumn(name.to_string()));
        }
        col = col * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1);
    }
    if col > MAX_COLUMNS {
        return Err(AddressError::InvalidColumn(name.to_string()));
    }
    Ok(col)
}

/// A cell position on a worksheet, both indices 1-based.
///
/// Ordering is row-major (row first, then column), which is the order cells
/// are stored and scanned in.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellAddress {
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub const fn new(col: u32, row: u32) -> Self {
        Self { row, col }
    }

    /// Parse `B7`, `$B$7`, `b7`. Anchors are accepted and dropped.
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        let (col, _, row, _) = split_a1(text)?;
        Ok(Self { row, col })
    }

    /// Whether both indices are inside the sheet grid.
    pub fn is_valid(&self) -> bool {
        (1..=MAX_COLUMNS).contains(&self.col) && (1..=MAX_ROWS).contains(&self.row)
    }

    /// Relative offset `(rows, cols)` from `origin` to `self`.
    pub fn offset_from(&self, origin: CellAddress) -> (i64, i64) {
        (
            i64::from(self.row) - i64::from(origin.row),
            i64::from(self.col) - i64::from(origin.col),
        )
    }

    pub fn column_name(&self) -> String {
        column_name(self.col)
    }
}

impl PartialOrd for CellAddress {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellAddress {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.row, self.col).cmp(&(other.row, other.col))
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_name(self.col), self.row)
    }
}

impl FromStr for CellAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellAddress::parse(s)
    }
}

/// Split A1 text into `(col, col_abs, row, row_abs)`.
pub fn split_a1(text: &str) -> Result<(u32, bool, u32, bool), AddressError> {
    if text.is_empty() {
        return Err(AddressError::Empty);
    }
    let bytes = text.as_bytes();
    let mut i = 0;
    let col_abs = bytes[0] == b'$';
    if col_abs {
        i += 1;
    }
    let letters_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    if i == letters_start {
        return Err(AddressError::InvalidColumn(text.to_string()));
    }
    let col = column_number(&text[letters_start..i])?;

    let row_abs = i < bytes.len() && bytes[i] == b'$';
    if row_abs {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return Err(AddressError::InvalidRow(text.to_string()));
    }
    if i != bytes.len() {
        return Err(AddressError::Malformed(text.to_string()));
    }
    let row: u32 = text[digits_start..i]
        .parse()
        .map_err(|_| AddressError::InvalidRow(text.to_string()))?;
    if row == 0 || row > MAX_ROWS {
        return Err(AddressError::InvalidRow(text.to_string()));
    }
    Ok((col, col_abs, row, row_abs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_name_roundtrip() {
        for (n, s) in [(1, "A"), (26, "Z"), (27, "AA"), (52, "AZ"), (703, "AAA"), (16_384, "XFD")] {
            assert_eq!(column_name(n), s);
            assert_eq!(column_number(s).unwrap(), n);
        }
        assert_eq!(column_number("$c").unwrap(), 3);
    }

    #[test]
    fn column_number_rejects_out_of_grid() {
        assert!(column_number("XFE").is_err());
        assert!(column_number("ABCD").is_err());
        assert!(column_number("").is_err());
        assert!(column_number("A1").is_err());
    }

    #[test]
    fn parse_accepts_anchors() {
        assert_eq!(CellAddress::parse("B7").unwrap(), CellAddress::new(2, 7));
        assert_eq!(CellAddress::parse("$B$7").unwrap(), CellAddress::new(2, 7));
        assert_eq!(CellAddress::parse("ab12").unwrap(), CellAddress::new(28, 12));
        assert_eq!(split_a1("$C4").unwrap(), (3, true, 4, false));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(CellAddress::parse(""), Err(AddressError::Empty));
        assert!(CellAddress::parse("A0").is_err());
        assert!(CellAddress::parse("7B").is_err());
        assert!(CellAddress::parse("B7x").is_err());
        assert!(CellAddress::parse("A1048577").is_err());
    }

    #[test]
    fn ordering_is_row_major() {
        let mut cells = vec![
            CellAddress::new(2, 1),
            CellAddress::new(1, 2),
            CellAddress::new(1, 1),
        ];
        cells.sort();
        assert_eq!(
            cells.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
            vec!["A1", "B1", "A2"]
        );
    }
}
