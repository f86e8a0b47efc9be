//! Lexical scanner for annotated query files
//!
//! The scanner splits a file into a flat token stream without understanding
//! SQL grammar. It only needs to know enough about quoting and comments to find
//! statement-terminating semicolons, annotation comments, and placeholder
//! calls. Every byte of the input ends up in exactly one token, so concatenating
//! token literals reproduces the source.

use crate::token::{IllegalReason, Position, Token, TokenKind};
use querygen_core::config::DEFAULT_NAMESPACE;

/// Lazy token stream over a query file
pub struct Scanner<'a> {
    src: &'a str,
    pos: Position,
    namespace: String,
}

impl<'a> Scanner<'a> {
    /// Create a scanner recognising `querygen.arg('...')` placeholders
    pub fn new(src: &'a str) -> Self {
        Self::with_namespace(src, DEFAULT_NAMESPACE)
    }

    /// Create a scanner recognising `<namespace>.arg('...')` placeholders
    pub fn with_namespace(src: &'a str, namespace: &str) -> Self {
        Self {
            src,
            pos: Position::start(),
            namespace: namespace.to_string(),
        }
    }

    /// Current position
    pub fn position(&self) -> Position {
        self.pos
    }

    /// Scan the next token
    ///
    /// Returns `EndOfInput` once the input is exhausted, and keeps returning it.
    pub fn next_token(&mut self) -> Token {
        let start = self.pos.offset;
        let bytes = self.src.as_bytes();

        if start >= bytes.len() {
            return Token::new(TokenKind::EndOfInput, "", self.pos);
        }

        let (kind, end) = if let Some(len) = self.dollar_tag_len(start) {
            self.scan_dollar_string(start, len)
        } else if let Some(len) = self.placeholder_len(start) {
            (TokenKind::Placeholder, start + len)
        } else {
            match bytes[start] {
                b';' => (TokenKind::Semicolon, start + 1),
                b'-' if self.byte_at(start + 1) == Some(b'-') => {
                    (TokenKind::LineComment, self.line_comment_end(start))
                }
                b'/' if self.byte_at(start + 1) == Some(b'*') => self.scan_block_comment(start),
                b'\'' => {
                    let escapes = self.is_escape_string(start);
                    self.scan_quoted(start, b'\'', escapes, TokenKind::StringLiteral)
                }
                b'"' => self.scan_quoted(start, b'"', false, TokenKind::QuotedIdentifier),
                b if is_illegal(b) => (TokenKind::Illegal(IllegalReason::Character), start + 1),
                _ => (TokenKind::Fragment, self.fragment_end(start)),
            }
        };

        let literal = &self.src[start..end];
        let token = Token::new(kind, literal, self.pos);
        self.pos = self.pos.advance(literal);
        token
    }

    fn byte_at(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(offset).copied()
    }

    fn follows_word(&self, offset: usize) -> bool {
        offset > 0 && is_word(self.src.as_bytes()[offset - 1])
    }

    /// End of a fragment: the next offset where another token starts
    fn fragment_end(&self, start: usize) -> usize {
        let bytes = self.src.as_bytes();
        let mut i = start + 1;

        while i < bytes.len() {
            let b = bytes[i];
            let next = bytes.get(i + 1).copied();
            let stops = match b {
                b';' | b'\'' | b'"' => true,
                b'-' => next == Some(b'-'),
                b'/' => next == Some(b'*'),
                b'$' => self.dollar_tag_len(i).is_some(),
                _ if is_illegal(b) => true,
                _ => self.placeholder_len(i).is_some(),
            };
            if stops {
                break;
            }
            i += 1;
        }

        i
    }

    fn line_comment_end(&self, start: usize) -> usize {
        self.src[start..]
            .find('\n')
            .map(|idx| start + idx)
            .unwrap_or(self.src.len())
    }

    fn scan_block_comment(&self, start: usize) -> (TokenKind, usize) {
        let bytes = self.src.as_bytes();
        let mut depth = 1usize;
        let mut i = start + 2;

        while i < bytes.len() {
            match (bytes[i], bytes.get(i + 1).copied()) {
                (b'/', Some(b'*')) => {
                    depth += 1;
                    i += 2;
                }
                (b'*', Some(b'/')) => {
                    depth -= 1;
                    i += 2;
                    if depth == 0 {
                        return (TokenKind::BlockComment, i);
                    }
                }
                _ => i += 1,
            }
        }

        (TokenKind::Illegal(IllegalReason::UnterminatedComment), bytes.len())
    }

    /// `'...'` or `"..."` where a doubled quote is an escaped quote
    fn scan_quoted(
        &self,
        start: usize,
        quote: u8,
        backslash_escapes: bool,
        kind: TokenKind,
    ) -> (TokenKind, usize) {
        let bytes = self.src.as_bytes();
        let mut i = start + 1;

        while i < bytes.len() {
            let b = bytes[i];
            if backslash_escapes && b == b'\\' {
                i += 2;
                continue;
            }
            if b == quote {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                    continue;
                }
                return (kind, i + 1);
            }
            i += 1;
        }

        let reason = if quote == b'"' {
            IllegalReason::UnterminatedIdentifier
        } else {
            IllegalReason::UnterminatedString
        };
        (TokenKind::Illegal(reason), bytes.len())
    }

    /// An `E'...'` string, where backslash escapes a quote
    fn is_escape_string(&self, quote: usize) -> bool {
        quote > 0
            && matches!(self.src.as_bytes()[quote - 1], b'e' | b'E')
            && !self.follows_word(quote - 1)
    }

    /// Length of the opening `$tag$` at `offset`, if one starts there
    ///
    /// A `$` right after an identifier character belongs to the identifier.
    fn dollar_tag_len(&self, offset: usize) -> Option<usize> {
        let bytes = self.src.as_bytes();
        if bytes.get(offset) != Some(&b'$') || self.follows_word(offset) {
            return None;
        }

        let mut i = offset + 1;
        match bytes.get(i) {
            Some(b'$') => return Some(2),
            Some(b) if b.is_ascii_alphabetic() || *b == b'_' => i += 1,
            _ => return None,
        }
        while i < bytes.len() && is_word(bytes[i]) {
            i += 1;
        }

        (bytes.get(i) == Some(&b'$')).then_some(i + 1 - offset)
    }

    fn scan_dollar_string(&self, start: usize, tag_len: usize) -> (TokenKind, usize) {
        let tag = &self.src[start..start + tag_len];
        let body = start + tag_len;

        match self.src[body..].find(tag) {
            Some(idx) => (TokenKind::StringLiteral, body + idx + tag_len),
            None => (
                TokenKind::Illegal(IllegalReason::UnterminatedString),
                self.src.len(),
            ),
        }
    }

    /// Length of a `<namespace>.arg('Ident')` call at `offset`, if one starts there
    fn placeholder_len(&self, offset: usize) -> Option<usize> {
        let bytes = self.src.as_bytes();
        if !bytes[offset..].starts_with(self.namespace.as_bytes()) {
            return None;
        }
        if offset > 0 && (is_word(bytes[offset - 1]) || bytes[offset - 1] == b'.') {
            return None;
        }

        let mut i = offset + self.namespace.len();
        if !bytes[i..].starts_with(b".arg(") {
            return None;
        }
        i += ".arg(".len();
        i = skip_spaces(bytes, i);

        if bytes.get(i) != Some(&b'\'') {
            return None;
        }
        i += 1;
        match bytes.get(i) {
            Some(b) if b.is_ascii_alphabetic() || *b == b'_' => i += 1,
            _ => return None,
        }
        while i < bytes.len() && is_word(bytes[i]) {
            i += 1;
        }
        if bytes.get(i) != Some(&b'\'') {
            return None;
        }
        i = skip_spaces(bytes, i + 1);

        (bytes.get(i) == Some(&b')')).then_some(i + 1 - offset)
    }
}

impl Iterator for Scanner<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let token = self.next_token();
        (token.kind != TokenKind::EndOfInput).then_some(token)
    }
}

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_illegal(b: u8) -> bool {
    (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c)) || b == 0x7f
}

fn skip_spaces(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Scan a whole input into tokens, excluding `EndOfInput`
pub fn tokenize(src: &str, namespace: &str) -> Vec<Token> {
    Scanner::with_namespace(src, namespace).collect()
}
