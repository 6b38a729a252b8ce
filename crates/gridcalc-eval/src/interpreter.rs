use gridcalc_common::{CellAddress, ExcelError, ExcelErrorKind, LiteralValue, format_number};
use gridcalc_parse::{ASTNode, ASTNodeType, RefTarget, Reference};

use crate::builtins;
use crate::traits::Resolver;

/// Calls whose results may have been precomputed by a batch pass.
pub const CACHEABLE_CALLS: &[&str] = &["SUMIFS", "AVERAGEIFS"];

/// Largest range materialised in one go.
const MAX_RANGE_CELLS: u64 = 4_000_000;

pub struct Interpreter<'a> {
    pub resolver: &'a dyn Resolver,
    sheet: &'a str,
    cell: CellAddress,
    formula: &'a str,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        resolver: &'a dyn Resolver,
        sheet: &'a str,
        cell: CellAddress,
        formula: &'a str,
    ) -> Self {
        Self {
            resolver,
            sheet,
            cell,
            formula,
        }
    }

    pub fn current_sheet(&self) -> &'a str {
        self.sheet
    }

    /// Evaluate `node`, folding failures into error values.
    pub fn evaluate(&self, node: &ASTNode) -> LiteralValue {
        self.evaluate_ast(node).unwrap_or_else(LiteralValue::Error)
    }

    pub fn evaluate_ast(&self, node: &ASTNode) -> Result<LiteralValue, ExcelError> {
        match &node.node_type {
            ASTNodeType::Literal(v) => Ok(v.clone()),
            ASTNodeType::Reference { reference, .. } => self.eval_reference(reference),
            ASTNodeType::Name(name) => Err(ExcelError::new(ExcelErrorKind::Name)
                .with_message(format!("Unknown name {name}"))),
            ASTNodeType::UnaryOp { op, expr } => self.eval_unary(op, expr),
            ASTNodeType::BinaryOp { op, left, right } => self.eval_binary(op, left, right),
            ASTNodeType::Function { name, args } => self.eval_function(node, name, args),
        }
    }

    /// Evaluate to a single value, applying implicit intersection to ranges.
    pub fn evaluate_scalar(&self, node: &ASTNode) -> Result<LiteralValue, ExcelError> {
        match self.evaluate_ast(node)? {
            LiteralValue::Array(rows) => match rows.as_slice() {
                [row] if row.len() == 1 => Ok(row[0].clone()),
                [] => Ok(LiteralValue::Empty),
                _ => Err(ExcelError::new(ExcelErrorKind::Value)
                    .with_message("Range used where a single value is expected")),
            },
            LiteralValue::Error(e) => Err(e),
            v => Ok(v),
        }
    }

    /// Evaluate to a grid; scalars become a 1x1 grid.
    pub fn evaluate_grid(&self, node: &ASTNode) -> Result<Vec<Vec<LiteralValue>>, ExcelError> {
        match self.evaluate_ast(node)? {
            LiteralValue::Array(rows) => Ok(rows),
            LiteralValue::Error(e) => Err(e),
            v => Ok(vec![vec![v]]),
        }
    }

    /* ===================  reference  =================== */
    fn eval_reference(&self, reference: &Reference) -> Result<LiteralValue, ExcelError> {
        let sheet = reference.resolved_sheet(self.sheet);
        let (top_left, bottom_right) = match reference.target {
            RefTarget::Cell(c) => return self.resolver.resolve_cell(sheet, c.address()),
            RefTarget::Broken => return Err(ExcelError::new(ExcelErrorKind::Ref)),
            RefTarget::Range(a, b) => (a.address(), b.address()),
            RefTarget::Columns(a, b) => {
                let Some(extent) = self.resolver.used_extent(sheet) else {
                    return Ok(LiteralValue::Array(Vec::new()));
                };
                (
                    CellAddress::new(a.index, 1),
                    CellAddress::new(b.index, extent.row),
                )
            }
            RefTarget::Rows(a, b) => {
                let Some(extent) = self.resolver.used_extent(sheet) else {
                    return Ok(LiteralValue::Array(Vec::new()));
                };
                (
                    CellAddress::new(1, a.index),
                    CellAddress::new(extent.col, b.index),
                )
            }
        };
        let (r0, r1) = ordered(top_left.row, bottom_right.row);
        let (c0, c1) = ordered(top_left.col, bottom_right.col);
        let cells = u64::from(r1 - r0 + 1) * u64::from(c1 - c0 + 1);
        if cells > MAX_RANGE_CELLS {
            return Err(ExcelError::new(ExcelErrorKind::Num).with_message("Range too large"));
        }
        let mut rows = Vec::with_capacity((r1 - r0 + 1) as usize);
        for r in r0..=r1 {
            let mut row = Vec::with_capacity((c1 - c0 + 1) as usize);
            for c in c0..=c1 {
                row.push(self.resolver.resolve_cell(sheet, CellAddress::new(c, r))?);
            }
            rows.push(row);
        }
        Ok(LiteralValue::Array(rows))
    }

    /* ===================  unary ops  =================== */
    fn eval_unary(&self, op: &str, expr: &ASTNode) -> Result<LiteralValue, ExcelError> {
        let n = to_number(&self.evaluate_scalar(expr)?)?;
        let out = match op {
            "+" => n,
            "-" => -n,
            "%" => n / 100.0,
            _ => {
                return Err(ExcelError::new(ExcelErrorKind::Value)
                    .with_message(format!("Unary op '{op}'")));
            }
        };
        Ok(LiteralValue::Number(out))
    }

    /* ===================  binary ops  =================== */
    fn eval_binary(
        &self,
        op: &str,
        left: &ASTNode,
        right: &ASTNode,
    ) -> Result<LiteralValue, ExcelError> {
        let l = self.evaluate_scalar(left)?;
        let r = self.evaluate_scalar(right)?;

        if matches!(op, "=" | "<>" | ">" | "<" | ">=" | "<=") {
            let ord = compare(&l, &r);
            let b = match op {
                "=" => ord.is_eq(),
                "<>" => !ord.is_eq(),
                ">" => ord.is_gt(),
                "<" => ord.is_lt(),
                ">=" => ord.is_ge(),
                _ => ord.is_le(),
            };
            return Ok(LiteralValue::Boolean(b));
        }
        if op == "&" {
            return Ok(LiteralValue::Text(format!("{}{}", to_text(&l), to_text(&r))));
        }

        let (a, b) = (to_number(&l)?, to_number(&r)?);
        let out = match op {
            "+" => a + b,
            "-" => a - b,
            "*" => a * b,
            "/" => {
                if b == 0.0 {
                    return Err(ExcelError::new(ExcelErrorKind::Div));
                }
                a / b
            }
            "^" => a.powf(b),
            _ => {
                return Err(ExcelError::new(ExcelErrorKind::Value)
                    .with_message(format!("Binary op '{op}'")));
            }
        };
        if out.is_finite() {
            Ok(LiteralValue::Number(out))
        } else {
            Err(ExcelError::new(ExcelErrorKind::Num))
        }
    }

    /* ===================  function calls  =================== */
    fn eval_function(
        &self,
        node: &ASTNode,
        name: &str,
        args: &[ASTNode],
    ) -> Result<LiteralValue, ExcelError> {
        if CACHEABLE_CALLS.contains(&name) {
            let call = node.source(self.formula);
            if let Some(v) = self.resolver.cached_call(self.sheet, self.cell, call) {
                return Ok(v);
            }
        }
        match builtins::lookup(name) {
            Some(fun) => fun(self, args),
            None => Err(ExcelError::new(ExcelErrorKind::Name)
                .with_message(format!("Unknown function {name}"))),
        }
    }
}

fn ordered(a: u32, b: u32) -> (u32, u32) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Numeric coercion used by operators and scalar function arguments.
pub fn to_number(v: &LiteralValue) -> Result<f64, ExcelError> {
    match v {
        LiteralValue::Number(n) => Ok(*n),
        LiteralValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        LiteralValue::Empty => Ok(0.0),
        LiteralValue::Text(s) if s.trim().is_empty() => Err(ExcelError::new(ExcelErrorKind::Value)),
        LiteralValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or_else(|| ExcelError::new(ExcelErrorKind::Value)),
        LiteralValue::Error(e) => Err(e.clone()),
        LiteralValue::Array(_) => Err(ExcelError::new(ExcelErrorKind::Value)),
    }
}

pub fn to_text(v: &LiteralValue) -> String {
    match v {
        LiteralValue::Number(n) => format_number(*n),
        other => other.to_string(),
    }
}

/// Spreadsheet ordering: numbers < text < booleans, text case-insensitive,
/// empty compares as the zero value of the other side.
pub fn compare(l: &LiteralValue, r: &LiteralValue) -> std::cmp::Ordering {
    use LiteralValue::*;
    use std::cmp::Ordering;

    fn rank(v: &LiteralValue) -> u8 {
        match v {
            Number(_) => 0,
            Text(_) => 1,
            Boolean(_) => 2,
            _ => 3,
        }
    }
    match (l, r) {
        (Empty, Empty) => Ordering::Equal,
        (Empty, Number(_)) => compare(&Number(0.0), r),
        (Number(_), Empty) => compare(l, &Number(0.0)),
        (Empty, Text(_)) => compare(&Text(String::new()), r),
        (Text(_), Empty) => compare(l, &Text(String::new())),
        (Empty, Boolean(_)) => compare(&Boolean(false), r),
        (Boolean(_), Empty) => compare(l, &Boolean(false)),
        (Number(a), Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Text(a), Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Boolean(a), Boolean(b)) => a.cmp(b),
        _ => rank(l).cmp(&rank(r)),
    }
}
