use std::fmt::{self, Display};

use crate::{ExcelError, ExcelErrorKind};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Type tag stored next to a cell's value text.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CellType {
    #[default]
    Empty,
    Number,
    Bool,
    String,
    Error,
    InlineString,
}

impl CellType {
    /// Short tag as written in the document (`n`, `b`, `str`, ...).
    pub const fn tag(&self) -> &'static str {
        match self {
            CellType::Empty => "",
            CellType::Number => "n",
            CellType::Bool => "b",
            CellType::String => "str",
            CellType::Error => "e",
            CellType::InlineString => "inlineStr",
        }
    }

    /// Classify an evaluator result.
    ///
    /// `""` is empty, `TRUE`/`FALSE` are booleans, anything that parses as a
    /// finite number is numeric, error literals are errors, the rest is text.
    pub fn classify(result: &str) -> CellType {
        if result.is_empty() {
            CellType::Empty
        } else if result == "TRUE" || result == "FALSE" {
            CellType::Bool
        } else if result.parse::<f64>().is_ok_and(f64::is_finite) {
            CellType::Number
        } else if result.starts_with('#') && ExcelErrorKind::parse(result).is_some() {
            CellType::Error
        } else {
            CellType::String
        }
    }
}

/// Format a number the way it is stored in a cell: plain decimal, at most
/// 15 significant digits, no exponent.
pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return ExcelErrorKind::Num.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let rounded: f64 = format!("{n:.14e}").parse().unwrap_or(n);
    format!("{rounded}")
}

/// A value written into a cell by a client.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Int(i64),
    Number(f64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    /// The stored `(text, type)` pair for this value.
    pub fn to_stored(&self) -> (String, CellType) {
        match self {
            CellValue::Empty => (String::new(), CellType::Empty),
            CellValue::Int(i) => (i.to_string(), CellType::Number),
            CellValue::Number(n) if n.is_finite() => (format_number(*n), CellType::Number),
            CellValue::Number(_) => (ExcelErrorKind::Num.to_string(), CellType::Error),
            CellValue::Bool(b) => (if *b { "TRUE" } else { "FALSE" }.to_string(), CellType::Bool),
            CellValue::Text(s) if s.is_empty() => (String::new(), CellType::Empty),
            CellValue::Text(s) => (s.clone(), CellType::String),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty) || matches!(self, CellValue::Text(s) if s.is_empty())
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Int(i64::from(v))
    }
}

impl From<u32> for CellValue {
    fn from(v: u32) -> Self {
        CellValue::Int(i64::from(v))
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

/// A value produced or consumed during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    Array(Vec<Vec<LiteralValue>>),
    Empty,
    Error(ExcelError),
}

impl Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Number(n) => f.write_str(&format_number(*n)),
            LiteralValue::Text(s) => f.write_str(s),
            LiteralValue::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            LiteralValue::Error(e) => write!(f, "{e}"),
            LiteralValue::Array(a) => match a.first().and_then(|r| r.first()) {
                Some(v) => write!(f, "{v}"),
                None => Ok(()),
            },
            LiteralValue::Empty => Ok(()),
        }
    }
}

impl LiteralValue {
    /// Rebuild an evaluation value from a stored cell.
    pub fn from_stored(text: &str, ty: CellType) -> Self {
        match ty {
            CellType::Empty if text.is_empty() => LiteralValue::Empty,
            CellType::Number => text
                .parse::<f64>()
                .map(LiteralValue::Number)
                .unwrap_or_else(|_| LiteralValue::Text(text.to_string())),
            CellType::Bool => LiteralValue::Boolean(text == "TRUE" || text == "1"),
            CellType::Error => LiteralValue::Error(
                ExcelErrorKind::parse(text)
                    .map(ExcelError::new)
                    .unwrap_or_else(|| ExcelError::new(ExcelErrorKind::Value)),
            ),
            // Untyped text that looks numeric is read as a number.
            CellType::Empty => match text.parse::<f64>() {
                Ok(n) if n.is_finite() => LiteralValue::Number(n),
                _ => LiteralValue::Text(text.to_string()),
            },
            CellType::String | CellType::InlineString => LiteralValue::Text(text.to_string()),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            LiteralValue::Boolean(b) => *b,
            LiteralValue::Number(n) => *n != 0.0,
            LiteralValue::Text(s) => !s.is_empty(),
            LiteralValue::Array(arr) => !arr.is_empty(),
            LiteralValue::Error(_) | LiteralValue::Empty => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_results() {
        assert_eq!(CellType::classify(""), CellType::Empty);
        assert_eq!(CellType::classify("TRUE"), CellType::Bool);
        assert_eq!(CellType::classify("FALSE"), CellType::Bool);
        assert_eq!(CellType::classify("-12.5"), CellType::Number);
        assert_eq!(CellType::classify("1e3"), CellType::Number);
        assert_eq!(CellType::classify("inf"), CellType::String);
        assert_eq!(CellType::classify("NaN"), CellType::String);
        assert_eq!(CellType::classify("#REF!"), CellType::Error);
        assert_eq!(CellType::classify("#hashtag"), CellType::String);
        assert_eq!(CellType::classify("true"), CellType::String);
    }

    #[test]
    fn numbers_format_as_plain_decimal() {
        assert_eq!(format_number(200.0), "200");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(1e21), "1000000000000000000000");
        assert_eq!(format_number(f64::NAN), "#NUM!");
    }

    #[test]
    fn stored_values() {
        assert_eq!(CellValue::from(100).to_stored(), ("100".into(), CellType::Number));
        assert_eq!(CellValue::from(true).to_stored(), ("TRUE".into(), CellType::Bool));
        assert_eq!(CellValue::from("").to_stored(), (String::new(), CellType::Empty));
        assert_eq!(CellValue::from("x").to_stored(), ("x".into(), CellType::String));
    }

    #[test]
    fn from_stored_reads_untyped_numbers() {
        assert_eq!(LiteralValue::from_stored("42", CellType::Empty), LiteralValue::Number(42.0));
        assert_eq!(LiteralValue::from_stored("", CellType::Empty), LiteralValue::Empty);
        assert_eq!(
            LiteralValue::from_stored("42", CellType::String),
            LiteralValue::Text("42".into())
        );
        assert!(matches!(
            LiteralValue::from_stored("#REF!", CellType::Error),
            LiteralValue::Error(e) if e.kind == ExcelErrorKind::Ref
        ));
    }
}
