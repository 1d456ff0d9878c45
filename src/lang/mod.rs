/*!
# Language Module

Lexical analysis, parsing, and the language-level data model
(types and symbols) for the QBasic dialect.

*/

#[macro_use]
mod error;
mod lex;
mod parse;
mod symbol;
mod token;
mod types;

pub use error::Error;
pub use error::ErrorCode;
pub use lex::lex;
pub use lex::LocToken;
pub use parse::parse;
pub use symbol::{StorageKind, SymbolScope, SymbolTable, VarSymbol};
pub use token::{Ident, Literal, Operator, Token, Word};
pub use types::{coerce, ElementaryType, DataTypeSpec};

pub mod ast;

/// Source position, 1-based line and column.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct Loc {
    pub line: usize,
    pub col: usize,
}

impl Loc {
    pub fn new(line: usize, col: usize) -> Loc {
        Loc { line, col }
    }
}

impl std::fmt::Display for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}
