//! Precedence-climbing parser from the token stream to an AST.

use std::error::Error;
use std::fmt;

use gridcalc_common::{ExcelError, ExcelErrorKind, LiteralValue};

use crate::reference::Reference;
use crate::tokenizer::{Associativity, Token, TokenSubType, TokenType, Tokenizer};

#[derive(Debug, Clone, PartialEq)]
pub struct ParserError {
    pub message: String,
    pub position: Option<usize>,
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "ParserError at {pos}: {}", self.message),
            None => write!(f, "ParserError: {}", self.message),
        }
    }
}

impl Error for ParserError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ASTNodeType {
    Literal(LiteralValue),
    Reference {
        original: String,
        reference: Reference,
    },
    /// Identifier that is not a reference (defined names are not resolved).
    Name(String),
    UnaryOp {
        op: String,
        expr: Box<ASTNode>,
    },
    BinaryOp {
        op: String,
        left: Box<ASTNode>,
        right: Box<ASTNode>,
    },
    Function {
        name: String,
        args: Vec<ASTNode>,
    },
}

/// A node plus the byte span of its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct ASTNode {
    pub node_type: ASTNodeType,
    pub start: usize,
    pub end: usize,
}

impl ASTNode {
    fn new(node_type: ASTNodeType, start: usize, end: usize) -> Self {
        Self {
            node_type,
            start,
            end,
        }
    }

    /// Source text of this node within the formula it was parsed from.
    pub fn source<'a>(&self, formula: &'a str) -> &'a str {
        formula.get(self.start..self.end).unwrap_or("")
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let tokens = tokens
            .into_iter()
            .filter(|t| t.token_type != TokenType::Whitespace)
            .collect();
        Self { tokens, pos: 0 }
    }

    pub fn parse(&mut self) -> Result<ASTNode, ParserError> {
        if self.tokens.is_empty() {
            return Err(ParserError {
                message: "empty formula".into(),
                position: None,
            });
        }
        let node = self.parse_expression(0)?;
        if let Some(extra) = self.peek() {
            return Err(ParserError {
                message: format!("unexpected token {}", extra.value),
                position: Some(extra.start),
            });
        }
        Ok(node)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ParserError> {
        let tok = self.tokens.get(self.pos).cloned().ok_or(ParserError {
            message: "unexpected end of formula".into(),
            position: None,
        })?;
        self.pos += 1;
        Ok(tok)
    }

    fn parse_expression(&mut self, min_prec: u8) -> Result<ASTNode, ParserError> {
        let mut left = self.parse_prefix()?;
        while let Some(tok) = self.peek() {
            match tok.token_type {
                TokenType::OpPostfix => {
                    if 6 < min_prec {
                        break;
                    }
                    let tok = self.next()?;
                    let start = left.start;
                    left = ASTNode::new(
                        ASTNodeType::UnaryOp {
                            op: tok.value,
                            expr: Box::new(left),
                        },
                        start,
                        tok.end,
                    );
                }
                TokenType::OpInfix => {
                    let Some((prec, assoc)) = tok.get_precedence() else {
                        return Err(ParserError {
                            message: format!("unsupported operator {:?}", tok.value),
                            position: Some(tok.start),
                        });
                    };
                    if prec < min_prec {
                        break;
                    }
                    let tok = self.next()?;
                    let next_min = match assoc {
                        Associativity::Left => prec + 1,
                        Associativity::Right => prec,
                    };
                    let right = self.parse_expression(next_min)?;
                    let (start, end) = (left.start, right.end);
                    left = ASTNode::new(
                        ASTNodeType::BinaryOp {
                            op: tok.value,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        start,
                        end,
                    );
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<ASTNode, ParserError> {
        let tok = self.next()?;
        match (tok.token_type, tok.subtype) {
            (TokenType::OpPrefix, _) => {
                let expr = self.parse_expression(7)?;
                let end = expr.end;
                Ok(ASTNode::new(
                    ASTNodeType::UnaryOp {
                        op: tok.value,
                        expr: Box::new(expr),
                    },
                    tok.start,
                    end,
                ))
            }
            (TokenType::Operand, _) => Ok(operand_node(tok)),
            (TokenType::Func, TokenSubType::Open) => self.parse_call(tok),
            (TokenType::Paren, TokenSubType::Open) => {
                let inner = self.parse_expression(0)?;
                let close = self.next()?;
                if close.token_type != TokenType::Paren || close.subtype != TokenSubType::Close {
                    return Err(ParserError {
                        message: "expected ')'".into(),
                        position: Some(close.start),
                    });
                }
                Ok(ASTNode::new(inner.node_type, tok.start, close.end))
            }
            (TokenType::Array, _) => Err(ParserError {
                message: "array constants are not supported".into(),
                position: Some(tok.start),
            }),
            _ => Err(ParserError {
                message: format!("unexpected token {}", tok.value),
                position: Some(tok.start),
            }),
        }
    }

    fn parse_call(&mut self, open: Token) -> Result<ASTNode, ParserError> {
        let name = open.func_name().to_ascii_uppercase();
        let mut args = Vec::new();
        if let Some(t) = self.peek() {
            if t.token_type == TokenType::Func && t.subtype == TokenSubType::Close {
                let close = self.next()?;
                return Ok(ASTNode::new(
                    ASTNodeType::Function { name, args },
                    open.start,
                    close.end,
                ));
            }
        }
        loop {
            let at_boundary = self.peek().is_some_and(|t| {
                (t.token_type == TokenType::Sep && t.subtype == TokenSubType::Arg)
                    || (t.token_type == TokenType::Func && t.subtype == TokenSubType::Close)
            });
            if at_boundary {
                let pos = self.peek().map(|t| t.start).unwrap_or(open.end);
                args.push(ASTNode::new(ASTNodeType::Literal(LiteralValue::Empty), pos, pos));
            } else {
                args.push(self.parse_expression(0)?);
            }
            let sep = self.next()?;
            match (sep.token_type, sep.subtype) {
                (TokenType::Sep, TokenSubType::Arg) => continue,
                (TokenType::Func, TokenSubType::Close) => {
                    return Ok(ASTNode::new(
                        ASTNodeType::Function { name, args },
                        open.start,
                        sep.end,
                    ));
                }
                _ => {
                    return Err(ParserError {
                        message: format!("unexpected token {} in argument list", sep.value),
                        position: Some(sep.start),
                    });
                }
            }
        }
    }
}

fn operand_node(tok: Token) -> ASTNode {
    let node_type = match tok.subtype {
        TokenSubType::Text => {
            let inner = &tok.value[1..tok.value.len().saturating_sub(1).max(1)];
            ASTNodeType::Literal(LiteralValue::Text(inner.replace("\"\"", "\"")))
        }
        TokenSubType::Number => match tok.value.parse::<f64>() {
            Ok(n) => ASTNodeType::Literal(LiteralValue::Number(n)),
            Err(_) => ASTNodeType::Name(tok.value.clone()),
        },
        TokenSubType::Logical => {
            ASTNodeType::Literal(LiteralValue::Boolean(tok.value.eq_ignore_ascii_case("TRUE")))
        }
        TokenSubType::Error => ASTNodeType::Literal(LiteralValue::Error(ExcelError::new(
            ExcelErrorKind::parse(&tok.value).unwrap_or(ExcelErrorKind::Value),
        ))),
        _ => match Reference::parse(&tok.value) {
            Some(reference) => ASTNodeType::Reference {
                original: tok.value.clone(),
                reference,
            },
            None => ASTNodeType::Name(tok.value.clone()),
        },
    };
    ASTNode::new(node_type, tok.start, tok.end)
}

/// Tokenize and parse `formula` (leading `=` optional).
pub fn parse(formula: &str) -> Result<ASTNode, ParserError> {
    let tokenizer = Tokenizer::new(formula).map_err(|e| ParserError {
        message: e.message,
        position: Some(e.pos),
    })?;
    Parser::new(tokenizer.items).parse()
}
