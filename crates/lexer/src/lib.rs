//! Contains the lexer used by the Sprig language, along with the canonical identifier type that's
//! shared by every stage of the session engine.

#![warn(missing_docs)]

mod identifier;
mod lexer;
mod span;

pub use crate::{
    identifier::QuotedIdentifier,
    lexer::{LexedToken, SprigLexer as Lexer, Token, is_id_continue, is_id_start, is_keyword},
    span::{Position, Span},
};
