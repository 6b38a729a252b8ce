//! Formula text handling: tokenizer, expression parser, reference model and
//! the structural reference rewriter.

pub mod parser;
pub mod reference;
pub mod rewrite;
pub mod shift;
pub mod tokenizer;

pub use parser::{ASTNode, ASTNodeType, Parser, ParserError, parse};
pub use reference::{Axis, CellRef, RefTarget, Reference, SheetName};
pub use rewrite::{EditAxis, ReferenceRewriter, StructuralEdit, map_references, rewrite_formula};
pub use shift::shift_formula;
pub use tokenizer::{Token, TokenSubType, TokenType, Tokenizer, TokenizerError};

pub use gridcalc_common::{CellAddress, ExcelError, ExcelErrorKind, LiteralValue};
