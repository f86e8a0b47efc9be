//! Tokens produced by the [`Scanner`](crate::scanner::Scanner)

use querygen_core::DiagnosticCode;
use std::fmt;

/// A location in a query file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Byte offset from the start of the file (0-based)
    pub offset: usize,

    /// Line number (1-based)
    pub line: usize,

    /// Column in characters (1-based)
    pub column: usize,
}

impl Position {
    /// Position of the first byte of a file
    pub fn start() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// The position reached after reading `text` from this position
    pub fn advance(mut self, text: &str) -> Self {
        for c in text.chars() {
            self.offset += c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open span of source text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// Why a token is illegal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IllegalReason {
    /// A control character that may not appear in query files
    Character,
    UnterminatedString,
    UnterminatedIdentifier,
    UnterminatedComment,
}

impl IllegalReason {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Character => "illegal character",
            Self::UnterminatedString => "string literal not terminated",
            Self::UnterminatedIdentifier => "quoted identifier not terminated",
            Self::UnterminatedComment => "comment not terminated",
        }
    }

    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::Character => DiagnosticCode::ScanIllegalCharacter,
            Self::UnterminatedString => DiagnosticCode::ScanUnterminatedString,
            Self::UnterminatedIdentifier => DiagnosticCode::ScanUnterminatedIdentifier,
            Self::UnterminatedComment => DiagnosticCode::ScanUnterminatedComment,
        }
    }
}

/// Kind of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// End of input; the literal is empty
    EndOfInput,

    /// `-- ...` up to, not including, the newline
    LineComment,

    /// `/* ... */`, possibly nested
    BlockComment,

    /// `'...'`, `E'...'` or `$tag$...$tag$`
    StringLiteral,

    /// `"..."`
    QuotedIdentifier,

    /// Any other run of text, whitespace included
    Fragment,

    Semicolon,

    /// `namespace.arg('Name')`
    Placeholder,

    /// Illegal character or unterminated token; the literal holds the text read
    Illegal(IllegalReason),
}

impl TokenKind {
    pub fn is_comment(&self) -> bool {
        matches!(self, Self::LineComment | Self::BlockComment)
    }
}

/// A token with its exact source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub pos: Position,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>, pos: Position) -> Self {
        Self {
            kind,
            literal: literal.into(),
            pos,
        }
    }

    /// Position just past the end of the token
    pub fn end(&self) -> Position {
        self.pos.advance(&self.literal)
    }

    /// Line of the token's last character
    pub fn end_line(&self) -> usize {
        self.pos.line + self.literal.matches('\n').count()
    }

    /// A fragment of nothing but whitespace
    pub fn is_whitespace(&self) -> bool {
        self.kind == TokenKind::Fragment && self.literal.chars().all(char::is_whitespace)
    }

    /// Identifier inside a placeholder call, as in `Name` for `ns.arg('Name')`
    pub fn placeholder_name(&self) -> Option<&str> {
        if self.kind != TokenKind::Placeholder {
            return None;
        }
        let open = self.literal.find('\'')?;
        let close = self.literal.rfind('\'')?;
        (close > open).then(|| &self.literal[open + 1..close])
    }

    /// Comment text with its markers stripped
    pub fn comment_text(&self) -> Option<&str> {
        match self.kind {
            TokenKind::LineComment => self.literal.strip_prefix("--").map(str::trim),
            TokenKind::BlockComment => self
                .literal
                .strip_prefix("/*")
                .and_then(|s| s.strip_suffix("*/"))
                .map(str::trim),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::EndOfInput => write!(f, "end of input"),
            _ => write!(f, "{:?}", self.literal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_advance_tracks_lines() {
        let pos = Position::start().advance("ab\ncd\né");
        assert_eq!(pos.line, 3);
        assert_eq!(pos.column, 2);
        assert_eq!(pos.offset, 8);
    }

    #[test]
    fn placeholder_name_extraction() {
        let tok = Token::new(TokenKind::Placeholder, "ns.arg( 'FirstName' )", Position::start());
        assert_eq!(tok.placeholder_name(), Some("FirstName"));

        let frag = Token::new(TokenKind::Fragment, "ns.arg('x')", Position::start());
        assert_eq!(frag.placeholder_name(), None);
    }

    #[test]
    fn comment_text_strips_markers() {
        let line = Token::new(TokenKind::LineComment, "-- name: Foo :one", Position::start());
        assert_eq!(line.comment_text(), Some("name: Foo :one"));

        let block = Token::new(TokenKind::BlockComment, "/* doc */", Position::start());
        assert_eq!(block.comment_text(), Some("doc"));
    }
}
