//! Parse errors with positions and diagnostic conversion

use crate::token::Position;
use querygen_core::{Diagnostic, DiagnosticCode, Location};
use std::fmt;
use std::path::PathBuf;

/// Maximum number of errors recorded before the parser gives up on a file
pub const MAX_ERRORS: usize = 10;

/// A lexical or syntactic error at a position
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{pos}: {message}")]
pub struct ParseError {
    pub pos: Position,
    pub code: DiagnosticCode,
    pub message: String,
}

impl ParseError {
    pub fn new(pos: Position, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            pos,
            code,
            message: message.into(),
        }
    }

    /// Convert to a querygen diagnostic
    pub fn to_diagnostic(&self, file: &str) -> Diagnostic {
        Diagnostic::error(self.code, self.message.clone())
            .with_location(Location::with_position(file, self.pos.line, self.pos.column))
    }
}

/// Errors of one file, sorted by position once parsing finishes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorList(Vec<ParseError>);

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ParseError) {
        self.0.push(error);
    }

    pub fn last(&self) -> Option<&ParseError> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParseError> {
        self.0.iter()
    }

    pub fn sort(&mut self) {
        self.0.sort_by_key(|e| e.pos);
    }

    pub fn into_vec(self) -> Vec<ParseError> {
        self.0
    }

    pub fn to_diagnostics(&self, file: &str) -> Vec<Diagnostic> {
        self.0.iter().map(|e| e.to_diagnostic(file)).collect()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "no errors"),
            [only] => write!(f, "{}", only),
            [first, rest @ ..] => write!(f, "{} (and {} more errors)", first, rest.len()),
        }
    }
}

impl std::error::Error for ErrorList {}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a ParseError;
    type IntoIter = std::slice::Iter<'a, ParseError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Signals that the error limit was exceeded and parsing must stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bailout;

/// Failure to read a query file
#[derive(Debug, thiserror::Error)]
pub enum ParseFileError {
    #[error("failed to read query file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
