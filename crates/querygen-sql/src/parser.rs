//! Parser for annotated query files
//!
//! A query file is a sequence of semicolon-terminated statements, each preceded
//! by a lead comment whose last line names the query:
//!
//! ```sql
//! -- FindAuthors returns authors by first name.
//! -- name: FindAuthors :many
//! SELECT * FROM author WHERE first_name = querygen.arg('FirstName');
//! ```
//!
//! Malformed statements become [`BadQuery`] placeholders so that the rest of the
//! file still parses; the caller decides whether any error is fatal.

use crate::ast::{BadQuery, CommentGroup, File, Pragmas, Query, SourceQuery};
use crate::errors::{Bailout, ErrorList, ParseError, ParseFileError, MAX_ERRORS};
use crate::scanner::{tokenize, Scanner};
use crate::token::{Position, Range, Token, TokenKind};
use querygen_core::config::DEFAULT_NAMESPACE;
use querygen_core::{Config, DiagnosticCode, ResultKind};
use regex::Regex;
use std::fmt::Write;
use std::path::Path;
use std::sync::OnceLock;

/// Parser settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Namespace of the placeholder call, as in `<namespace>.arg('Name')`
    pub namespace: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl ParseOptions {
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_namespace(config.namespace.clone())
    }
}

/// A parsed file together with every error found while parsing it
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub file: File,
    pub errors: ErrorList,
}

impl ParseOutcome {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The file, or the errors if there were any
    pub fn into_result(self) -> Result<File, ErrorList> {
        if self.errors.is_empty() {
            Ok(self.file)
        } else {
            Err(self.errors)
        }
    }
}

/// Parse query file contents
pub fn parse_source(name: &str, src: &str, options: &ParseOptions) -> ParseOutcome {
    let mut parser = Parser::new(src, options);
    if parser.parse_statements().is_err() {
        tracing::debug!(file = name, errors = parser.errors.len(), "too many errors, stopped parsing");
    }
    parser.finish(name)
}

/// Read and parse a query file
pub fn parse_file(path: &Path, options: &ParseOptions) -> Result<ParseOutcome, ParseFileError> {
    let src = std::fs::read_to_string(path).map_err(|source| ParseFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(parse_source(&path.display().to_string(), &src, options))
}

/// Rewrite placeholder tokens to positional `$N` markers
///
/// The first occurrence of each distinct identifier gets the next ordinal and
/// repeats reuse it. Returns the rewritten text and the identifiers in
/// ordinal order. Text that already reads `$N` is copied through untouched.
pub fn rewrite_placeholders(tokens: &[Token]) -> (String, Vec<String>) {
    let mut sql = String::new();
    let mut names: Vec<String> = Vec::new();

    for token in tokens {
        match token.placeholder_name() {
            Some(name) => {
                let ordinal = match names.iter().position(|n| n == name) {
                    Some(idx) => idx + 1,
                    None => {
                        names.push(name.to_string());
                        names.len()
                    }
                };
                let _ = write!(sql, "${}", ordinal);
            }
            None => sql.push_str(&token.literal),
        }
    }

    (sql, names)
}

/// Scan `sql` and rewrite its placeholders, see [`rewrite_placeholders`]
pub fn prepare_sql(sql: &str, namespace: &str) -> (String, Vec<String>) {
    rewrite_placeholders(&tokenize(sql, namespace))
}

fn annotation_regex() -> &'static Regex {
    static ANNOTATION: OnceLock<Regex> = OnceLock::new();
    ANNOTATION.get_or_init(|| {
        Regex::new(
            r"^name:\s*([A-Za-z_][A-Za-z0-9_]*)\s+(:many|:one|:exec)(?:\s+proto-type=(\S+))?\s*$",
        )
        .expect("annotation regex is valid")
    })
}

/// The parts of a lead comment
struct Annotation {
    name: String,
    result_kind: ResultKind,
    pragmas: Pragmas,
    doc: Vec<String>,
}

fn parse_annotation(group: &CommentGroup) -> Result<Annotation, ParseError> {
    let pos = group.comments.last().map(|t| t.pos).unwrap_or_default();
    let mut lines = group.lines();
    let line = lines.pop().unwrap_or_default();

    let Some(caps) = annotation_regex().captures(&line) else {
        return Err(if line.starts_with("name:") {
            ParseError::new(
                pos,
                DiagnosticCode::ParseInvalidAnnotation,
                format!(
                    "invalid query annotation {:?}, expected 'name: <Name> :many|:one|:exec'",
                    line
                ),
            )
        } else {
            ParseError::new(
                pos,
                DiagnosticCode::ParseMissingAnnotation,
                "last line of the query comment must be 'name: <Name> :many|:one|:exec'",
            )
        });
    };

    let result_kind = caps[2]
        .parse::<ResultKind>()
        .map_err(|e| ParseError::new(pos, DiagnosticCode::ParseInvalidAnnotation, e))?;

    Ok(Annotation {
        name: caps[1].to_string(),
        result_kind,
        pragmas: Pragmas {
            proto_type: caps.get(3).map(|m| m.as_str().to_string()),
        },
        doc: lines,
    })
}

/// Position of the first non-whitespace character of a token
fn significant_start(token: &Token) -> Position {
    if token.kind == TokenKind::Fragment {
        let lit = &token.literal;
        let leading = &lit[..lit.len() - lit.trim_start().len()];
        token.pos.advance(leading)
    } else {
        token.pos
    }
}

struct Parser<'a> {
    src: &'a str,
    scanner: Scanner<'a>,
    tok: Token,
    errors: ErrorList,
    queries: Vec<Query>,
    comments: Vec<CommentGroup>,
    doc_comment: Vec<String>,

    /// Whether a comment group or query has been seen yet
    seen_content: bool,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, options: &ParseOptions) -> Self {
        let mut scanner = Scanner::with_namespace(src, &options.namespace);
        let tok = scanner.next_token();
        Self {
            src,
            scanner,
            tok,
            errors: ErrorList::new(),
            queries: Vec::new(),
            comments: Vec::new(),
            doc_comment: Vec::new(),
            seen_content: false,
        }
    }

    fn next(&mut self) {
        self.tok = self.scanner.next_token();
    }

    fn finish(mut self, name: &str) -> ParseOutcome {
        self.errors.sort();
        ParseOutcome {
            file: File {
                name: name.to_string(),
                doc_comment: self.doc_comment,
                queries: self.queries,
                comments: self.comments,
            },
            errors: self.errors,
        }
    }

    /// Record an error, dropping it when it shares a line with the previous one
    fn error(
        &mut self,
        pos: Position,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) -> Result<(), Bailout> {
        if self.errors.last().is_some_and(|last| last.pos.line == pos.line) {
            return Ok(());
        }

        self.errors.push(ParseError::new(pos, code, message));
        if self.errors.len() > MAX_ERRORS {
            return Err(Bailout);
        }
        Ok(())
    }

    fn parse_statements(&mut self) -> Result<(), Bailout> {
        loop {
            let lead = self.skip_trivia();
            match self.tok.kind {
                TokenKind::EndOfInput => return Ok(()),
                // Empty statement
                TokenKind::Semicolon => self.next(),
                _ => self.parse_query(lead)?,
            }
        }
    }

    fn record_group(&mut self, group: CommentGroup, is_lead: bool) {
        if !self.seen_content && !is_lead {
            self.doc_comment = group.lines();
        }
        self.seen_content = true;
        self.comments.push(group);
    }

    /// Skip whitespace and comments, returning the lead comment of the next
    /// statement if it has one
    fn skip_trivia(&mut self) -> Option<CommentGroup> {
        let mut group: Option<CommentGroup> = None;

        loop {
            if self.tok.kind.is_comment() {
                let tok = self.tok.clone();
                let adjacent = group
                    .as_ref()
                    .is_some_and(|g| tok.pos.line <= g.end_line() + 1);
                if adjacent {
                    if let Some(g) = group.as_mut() {
                        g.comments.push(tok);
                    }
                } else if let Some(done) = group.replace(CommentGroup::new(tok)) {
                    self.record_group(done, false);
                }
                self.next();
            } else if self.tok.is_whitespace() {
                self.next();
            } else {
                break;
            }
        }

        let group = group?;
        let starts_statement = !matches!(self.tok.kind, TokenKind::EndOfInput | TokenKind::Semicolon);
        let is_lead = starts_statement && significant_start(&self.tok).line <= group.end_line() + 1;
        self.record_group(group.clone(), is_lead);
        is_lead.then_some(group)
    }

    fn parse_query(&mut self, lead: Option<CommentGroup>) -> Result<(), Bailout> {
        self.seen_content = true;
        let start = significant_start(&self.tok);
        let mut tokens: Vec<Token> = Vec::new();
        let mut illegal = false;

        loop {
            match self.tok.kind {
                TokenKind::EndOfInput => {
                    let range = Range::new(start, self.tok.pos);
                    self.queries.push(Query::Bad(BadQuery { range }));
                    return self.error(
                        start,
                        DiagnosticCode::ParseUnterminatedQuery,
                        "query is not terminated by a semicolon",
                    );
                }
                TokenKind::Semicolon => {
                    tokens.push(self.tok.clone());
                    self.next();
                    break;
                }
                TokenKind::Illegal(reason) => {
                    illegal = true;
                    let pos = self.tok.pos;
                    tokens.push(self.tok.clone());
                    self.next();
                    self.error(pos, reason.code(), reason.message())?;
                }
                kind => {
                    if kind.is_comment() {
                        self.comments.push(CommentGroup::new(self.tok.clone()));
                    }
                    tokens.push(self.tok.clone());
                    self.next();
                }
            }
        }

        let end = tokens.last().map(Token::end).unwrap_or(start);
        let range = Range::new(start, end);

        if illegal {
            self.queries.push(Query::Bad(BadQuery { range }));
            return Ok(());
        }

        let annotation = match lead.as_ref().map(parse_annotation) {
            Some(Ok(annotation)) => annotation,
            Some(Err(err)) => {
                self.queries.push(Query::Bad(BadQuery { range }));
                return self.error(err.pos, err.code, err.message);
            }
            None => {
                self.queries.push(Query::Bad(BadQuery { range }));
                return self.error(
                    start,
                    DiagnosticCode::ParseMissingAnnotation,
                    "query must be preceded by a 'name: <Name> :many|:one|:exec' comment",
                );
            }
        };

        if let Some(first) = tokens.first_mut() {
            if first.kind == TokenKind::Fragment {
                first.literal = first.literal.trim_start().to_string();
                first.pos = start;
            }
        }

        let (prepared_sql, param_names) = rewrite_placeholders(&tokens);
        self.queries.push(Query::Source(SourceQuery {
            name: annotation.name,
            doc_comment: annotation.doc,
            source_sql: self.src[start.offset..end.offset].to_string(),
            prepared_sql,
            param_names,
            result_kind: annotation.result_kind,
            pragmas: annotation.pragmas,
            range,
        }));
        Ok(())
    }
}
