//! Query file scanning and parsing
//!
//! This crate handles:
//! - Splitting query files into tokens that keep the exact source text
//! - Recognising `<namespace>.arg('Name')` placeholders
//! - Parsing lead comments into query names, result kinds and pragmas
//! - Rewriting placeholders to positional `$N` parameters
//! - Recording scan and parse errors with positions for diagnostics

pub mod token;
pub mod scanner;
pub mod ast;
pub mod errors;
pub mod parser;

pub use token::{Position, Range, Token, TokenKind, IllegalReason};
pub use scanner::{Scanner, tokenize};
pub use ast::{BadQuery, CommentGroup, File, Pragmas, Query, SourceQuery};
pub use errors::{ErrorList, ParseError, ParseFileError, MAX_ERRORS};
pub use parser::{
    parse_file, parse_source, prepare_sql, rewrite_placeholders, ParseOptions, ParseOutcome,
};
