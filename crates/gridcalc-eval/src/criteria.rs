//! Criteria matching for the `*IF` / `*IFS` family.

use gridcalc_common::LiteralValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(f64),
    Bool(bool),
    /// Lowercased text; may contain `*` / `?` wildcards.
    Text(String),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub op: CmpOp,
    pub operand: Operand,
}

impl Criterion {
    pub fn parse(value: &LiteralValue) -> Criterion {
        match value {
            LiteralValue::Number(n) => Criterion {
                op: CmpOp::Eq,
                operand: Operand::Number(*n),
            },
            LiteralValue::Boolean(b) => Criterion {
                op: CmpOp::Eq,
                operand: Operand::Bool(*b),
            },
            LiteralValue::Text(s) => Self::parse_text(s),
            _ => Criterion {
                op: CmpOp::Eq,
                operand: Operand::Empty,
            },
        }
    }

    fn parse_text(s: &str) -> Criterion {
        let (op, rest) = [
            ("<=", CmpOp::Le),
            (">=", CmpOp::Ge),
            ("<>", CmpOp::Ne),
            ("<", CmpOp::Lt),
            (">", CmpOp::Gt),
            ("=", CmpOp::Eq),
        ]
        .into_iter()
        .find_map(|(p, op)| s.strip_prefix(p).map(|rest| (op, rest)))
        .unwrap_or((CmpOp::Eq, s));

        let operand = if rest.is_empty() {
            Operand::Empty
        } else if let Ok(n) = rest.parse::<f64>() {
            Operand::Number(n)
        } else if rest.eq_ignore_ascii_case("TRUE") {
            Operand::Bool(true)
        } else if rest.eq_ignore_ascii_case("FALSE") {
            Operand::Bool(false)
        } else {
            Operand::Text(rest.to_lowercase())
        };
        Criterion { op, operand }
    }

    pub fn matches(&self, cell: &LiteralValue) -> bool {
        match self.op {
            CmpOp::Eq => self.equals(cell),
            CmpOp::Ne => !self.equals(cell),
            op => match self.ordering(cell) {
                Some(ord) => match op {
                    CmpOp::Lt => ord.is_lt(),
                    CmpOp::Le => ord.is_le(),
                    CmpOp::Gt => ord.is_gt(),
                    CmpOp::Ge => ord.is_ge(),
                    CmpOp::Eq | CmpOp::Ne => false,
                },
                None => false,
            },
        }
    }

    fn equals(&self, cell: &LiteralValue) -> bool {
        match (&self.operand, cell) {
            (Operand::Number(n), LiteralValue::Number(c)) => n == c,
            (Operand::Number(n), LiteralValue::Text(s)) => s.parse::<f64>().is_ok_and(|c| c == *n),
            (Operand::Bool(b), LiteralValue::Boolean(c)) => b == c,
            (Operand::Text(pattern), LiteralValue::Text(s)) => {
                wildcard_match(pattern, &s.to_lowercase())
            }
            (Operand::Empty, LiteralValue::Empty) => true,
            (Operand::Empty, LiteralValue::Text(s)) => s.is_empty(),
            _ => false,
        }
    }

    fn ordering(&self, cell: &LiteralValue) -> Option<std::cmp::Ordering> {
        match (&self.operand, cell) {
            (Operand::Number(n), LiteralValue::Number(c)) => c.partial_cmp(n),
            (Operand::Text(t), LiteralValue::Text(s)) => Some(s.to_lowercase().cmp(t)),
            _ => None,
        }
    }
}

/// Case-folded glob match supporting `*`, `?` and `~` escapes.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains(['*', '?', '~']) {
        return pattern == text;
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '~' if pi + 1 < p.len() && p[pi + 1] == t[ti] => {
                    pi += 2;
                    ti += 1;
                    continue;
                }
                c if c != '~' && c == t[ti] => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                _ => {}
            }
        }
        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}
