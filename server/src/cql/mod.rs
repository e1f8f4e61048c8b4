//! Statement language front end.
//!
//! Turns statement text into a `Statement`. DDL type tokens are resolved to
//! `ColumnType` during parsing, so an unknown type rejects the statement before
//! anything touches the schema.

pub mod ast;
mod lexer;
mod parser;

pub use ast::{
    ColumnDefinition, ParsedStatement, QualifiedName, Relation, Selection, Statement, Term,
};
pub use parser::parse;

use crate::types::UnknownTypeError;

/// Errors produced while parsing a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Malformed statement text.
    Syntax(String),
    /// A type token that does not name a string type.
    UnknownType(UnknownTypeError),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax(message) => write!(f, "syntax error: {message}"),
            Self::UnknownType(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Syntax(_) => None,
            Self::UnknownType(e) => Some(e),
        }
    }
}

impl From<UnknownTypeError> for ParseError {
    fn from(e: UnknownTypeError) -> Self {
        Self::UnknownType(e)
    }
}
