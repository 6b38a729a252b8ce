//! The builtin function library.

use gridcalc_common::{ExcelError, ExcelErrorKind, LiteralValue};
use gridcalc_parse::{ASTNode, ASTNodeType};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::criteria::Criterion;
use crate::interpreter::{Interpreter, to_number, to_text};

pub type BuiltinFn = fn(&Interpreter<'_>, &[ASTNode]) -> Result<LiteralValue, ExcelError>;

static REGISTRY: Lazy<FxHashMap<&'static str, BuiltinFn>> = Lazy::new(|| {
    let entries: [(&'static str, BuiltinFn); 19] = [
        ("SUM", sum),
        ("AVERAGE", average),
        ("MIN", min),
        ("MAX", max),
        ("COUNT", count),
        ("COUNTA", counta),
        ("ABS", abs),
        ("ROUND", round),
        ("IF", if_fn),
        ("IFERROR", iferror),
        ("AND", and),
        ("OR", or),
        ("NOT", not),
        ("CONCATENATE", concat),
        ("CONCAT", concat),
        ("SUMIF", sumif),
        ("SUMIFS", sumifs),
        ("AVERAGEIFS", averageifs),
        ("COUNTIFS", countifs),
    ];
    entries.into_iter().collect()
});

pub fn lookup(name: &str) -> Option<BuiltinFn> {
    REGISTRY.get(name).copied()
}

/// Names of all builtins, for diagnostics.
pub fn names() -> Vec<&'static str> {
    let mut v: Vec<_> = REGISTRY.keys().copied().collect();
    v.sort_unstable();
    v
}

/* ─────────────────────────── helpers ──────────────────────────── */

fn arity(args: &[ASTNode], min: usize, max: usize) -> Result<(), ExcelError> {
    if args.len() < min || args.len() > max {
        return Err(ExcelError::new(ExcelErrorKind::Value)
            .with_message(format!("expected {min}..={max} arguments, got {}", args.len())));
    }
    Ok(())
}

fn is_range_like(node: &ASTNode) -> bool {
    matches!(node.node_type, ASTNodeType::Reference { .. })
}

/// Walk every argument value. Values coming from ranges are passed with
/// `from_range = true`; they are skipped rather than coerced when not
/// numeric.
fn for_each_value<F>(interp: &Interpreter<'_>, args: &[ASTNode], mut f: F) -> Result<(), ExcelError>
where
    F: FnMut(&LiteralValue, bool) -> Result<(), ExcelError>,
{
    for arg in args {
        match interp.evaluate_ast(arg)? {
            LiteralValue::Array(rows) => {
                for v in rows.iter().flatten() {
                    f(v, true)?;
                }
            }
            LiteralValue::Error(e) => return Err(e),
            v => f(&v, is_range_like(arg))?,
        }
    }
    Ok(())
}

fn numbers(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<Vec<f64>, ExcelError> {
    let mut out = Vec::new();
    for_each_value(interp, args, |v, from_range| {
        match v {
            LiteralValue::Number(n) => out.push(*n),
            LiteralValue::Error(e) => return Err(e.clone()),
            _ if from_range => {}
            LiteralValue::Empty => {}
            other => out.push(to_number(other)?),
        }
        Ok(())
    })?;
    Ok(out)
}

fn to_bool(v: &LiteralValue) -> Result<bool, ExcelError> {
    match v {
        LiteralValue::Boolean(b) => Ok(*b),
        LiteralValue::Number(n) => Ok(*n != 0.0),
        LiteralValue::Empty => Ok(false),
        LiteralValue::Text(s) if s.eq_ignore_ascii_case("TRUE") => Ok(true),
        LiteralValue::Text(s) if s.eq_ignore_ascii_case("FALSE") => Ok(false),
        LiteralValue::Error(e) => Err(e.clone()),
        _ => Err(ExcelError::new(ExcelErrorKind::Value)),
    }
}

/* ─────────────────────────── math ──────────────────────────── */

fn sum(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    Ok(LiteralValue::Number(numbers(interp, args)?.iter().sum()))
}

fn average(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    let nums = numbers(interp, args)?;
    if nums.is_empty() {
        return Err(ExcelError::new(ExcelErrorKind::Div));
    }
    Ok(LiteralValue::Number(nums.iter().sum::<f64>() / nums.len() as f64))
}

fn min(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    let nums = numbers(interp, args)?;
    Ok(LiteralValue::Number(
        nums.into_iter().reduce(f64::min).unwrap_or(0.0),
    ))
}

fn max(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    let nums = numbers(interp, args)?;
    Ok(LiteralValue::Number(
        nums.into_iter().reduce(f64::max).unwrap_or(0.0),
    ))
}

fn count(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    let mut n = 0usize;
    for arg in args {
        match interp.evaluate_ast(arg) {
            Ok(LiteralValue::Array(rows)) => {
                n += rows
                    .iter()
                    .flatten()
                    .filter(|v| matches!(v, LiteralValue::Number(_)))
                    .count();
            }
            Ok(LiteralValue::Number(_)) => n += 1,
            Ok(v) if !is_range_like(arg) && to_number(&v).is_ok() && v != LiteralValue::Empty => {
                n += 1
            }
            _ => {}
        }
    }
    Ok(LiteralValue::Number(n as f64))
}

fn counta(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    let mut n = 0usize;
    for arg in args {
        match interp.evaluate_ast(arg) {
            Ok(LiteralValue::Array(rows)) => {
                n += rows
                    .iter()
                    .flatten()
                    .filter(|v| !matches!(v, LiteralValue::Empty))
                    .count();
            }
            Ok(LiteralValue::Empty) => {}
            _ => n += 1,
        }
    }
    Ok(LiteralValue::Number(n as f64))
}

fn abs(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    arity(args, 1, 1)?;
    let n = to_number(&interp.evaluate_scalar(&args[0])?)?;
    Ok(LiteralValue::Number(n.abs()))
}

fn round(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    arity(args, 1, 2)?;
    let n = to_number(&interp.evaluate_scalar(&args[0])?)?;
    let digits = match args.get(1) {
        Some(a) => to_number(&interp.evaluate_scalar(a)?)?.trunc() as i32,
        None => 0,
    };
    let factor = 10f64.powi(digits);
    Ok(LiteralValue::Number((n * factor).round() / factor))
}

/* ─────────────────────────── logical ──────────────────────────── */

fn if_fn(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    arity(args, 2, 3)?;
    let cond = to_bool(&interp.evaluate_scalar(&args[0])?)?;
    if cond {
        interp.evaluate_ast(&args[1])
    } else {
        match args.get(2) {
            Some(a) => interp.evaluate_ast(a),
            None => Ok(LiteralValue::Boolean(false)),
        }
    }
}

fn iferror(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    arity(args, 2, 2)?;
    match interp.evaluate_scalar(&args[0]) {
        Ok(v) => Ok(v),
        Err(_) => interp.evaluate_ast(&args[1]),
    }
}

fn logical_values(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<Vec<bool>, ExcelError> {
    let mut out = Vec::new();
    for_each_value(interp, args, |v, from_range| {
        match v {
            LiteralValue::Boolean(b) => out.push(*b),
            LiteralValue::Number(n) => out.push(*n != 0.0),
            LiteralValue::Error(e) => return Err(e.clone()),
            _ if from_range => {}
            other => out.push(to_bool(other)?),
        }
        Ok(())
    })?;
    if out.is_empty() {
        return Err(ExcelError::new(ExcelErrorKind::Value));
    }
    Ok(out)
}

fn and(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    Ok(LiteralValue::Boolean(
        logical_values(interp, args)?.into_iter().all(|b| b),
    ))
}

fn or(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    Ok(LiteralValue::Boolean(
        logical_values(interp, args)?.into_iter().any(|b| b),
    ))
}

fn not(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    arity(args, 1, 1)?;
    Ok(LiteralValue::Boolean(!to_bool(
        &interp.evaluate_scalar(&args[0])?,
    )?))
}

/* ─────────────────────────── text ──────────────────────────── */

fn concat(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    let mut out = String::new();
    for_each_value(interp, args, |v, _| {
        if let LiteralValue::Error(e) = v {
            return Err(e.clone());
        }
        out.push_str(&to_text(v));
        Ok(())
    })?;
    Ok(LiteralValue::Text(out))
}

/* ─────────────────────────── conditional aggregates ──────────────────────────── */

struct Conditions {
    ranges: Vec<Vec<Vec<LiteralValue>>>,
    criteria: Vec<Criterion>,
}

impl Conditions {
    fn collect(interp: &Interpreter<'_>, pairs: &[ASTNode]) -> Result<Self, ExcelError> {
        if pairs.is_empty() || pairs.len() % 2 != 0 {
            return Err(ExcelError::new(ExcelErrorKind::Value)
                .with_message("criteria must come in range/criterion pairs"));
        }
        let mut ranges = Vec::with_capacity(pairs.len() / 2);
        let mut criteria = Vec::with_capacity(pairs.len() / 2);
        for pair in pairs.chunks(2) {
            ranges.push(interp.evaluate_grid(&pair[0])?);
            criteria.push(Criterion::parse(&interp.evaluate_scalar(&pair[1])?));
        }
        Ok(Self { ranges, criteria })
    }

    fn matches(&self, r: usize, c: usize) -> bool {
        self.ranges.iter().zip(&self.criteria).all(|(grid, crit)| {
            let v = grid
                .get(r)
                .and_then(|row| row.get(c))
                .unwrap_or(&LiteralValue::Empty);
            crit.matches(v)
        })
    }
}

/// Sum and count of the numeric cells of `target` whose position satisfies
/// every condition.
fn conditional_totals(
    target: &[Vec<LiteralValue>],
    conditions: &Conditions,
) -> (f64, usize) {
    let mut total = 0.0;
    let mut n = 0;
    for (r, row) in target.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            if let LiteralValue::Number(x) = v {
                if conditions.matches(r, c) {
                    total += x;
                    n += 1;
                }
            }
        }
    }
    (total, n)
}

fn sumif(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    arity(args, 2, 3)?;
    let conditions = Conditions::collect(interp, &args[..2])?;
    let target = match args.get(2) {
        Some(a) => interp.evaluate_grid(a)?,
        None => conditions.ranges[0].clone(),
    };
    Ok(LiteralValue::Number(conditional_totals(&target, &conditions).0))
}

fn sumifs(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    if args.len() < 3 {
        return Err(ExcelError::new(ExcelErrorKind::Value));
    }
    let target = interp.evaluate_grid(&args[0])?;
    let conditions = Conditions::collect(interp, &args[1..])?;
    Ok(LiteralValue::Number(conditional_totals(&target, &conditions).0))
}

fn averageifs(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    if args.len() < 3 {
        return Err(ExcelError::new(ExcelErrorKind::Value));
    }
    let target = interp.evaluate_grid(&args[0])?;
    let conditions = Conditions::collect(interp, &args[1..])?;
    match conditional_totals(&target, &conditions) {
        (_, 0) => Err(ExcelError::new(ExcelErrorKind::Div)),
        (total, n) => Ok(LiteralValue::Number(total / n as f64)),
    }
}

fn countifs(interp: &Interpreter<'_>, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
    let conditions = Conditions::collect(interp, args)?;
    let rows = conditions.ranges[0].len();
    let cols = conditions.ranges[0].first().map_or(0, Vec::len);
    let mut n = 0usize;
    for r in 0..rows {
        for c in 0..cols {
            if conditions.matches(r, c) {
                n += 1;
            }
        }
    }
    Ok(LiteralValue::Number(n as f64))
}
