//! Contains the parser and syntax tree used by the Sprig language

#![warn(missing_docs)]

mod ast;
mod error;
mod parser;

pub use crate::{
    ast::*,
    error::{Error, ErrorKind, InternalError, Result, SyntaxError, format_source_excerpt},
    parser::Parser,
};
pub use sprig_lexer::{Position, QuotedIdentifier, Span};
