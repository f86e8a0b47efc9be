//! Syntax tree of an annotated query file

use crate::token::{Range, Token};
use querygen_core::ResultKind;

/// A run of adjacent comments with no blank line between them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentGroup {
    pub comments: Vec<Token>,
}

impl CommentGroup {
    pub fn new(first: Token) -> Self {
        Self {
            comments: vec![first],
        }
    }

    /// Line of the last comment's final character
    pub fn end_line(&self) -> usize {
        self.comments.last().map(Token::end_line).unwrap_or(0)
    }

    /// Comment text with markers stripped, one entry per source line
    pub fn lines(&self) -> Vec<String> {
        self.comments
            .iter()
            .filter_map(Token::comment_text)
            .flat_map(|text| text.lines().map(|l| l.trim().to_string()).collect::<Vec<_>>())
            .collect()
    }

    pub fn range(&self) -> Range {
        let start = self.comments.first().map(|t| t.pos).unwrap_or_default();
        let end = self.comments.last().map(Token::end).unwrap_or_default();
        Range::new(start, end)
    }
}

/// Options given after the result kind in an annotation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pragmas {
    /// `proto-type=<value>`
    pub proto_type: Option<String>,
}

/// A well-formed, annotated query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    pub name: String,

    /// Lead comment lines before the annotation line
    pub doc_comment: Vec<String>,

    /// Statement text as written, through the terminating semicolon
    pub source_sql: String,

    /// Statement text with placeholders rewritten to `$N`
    pub prepared_sql: String,

    /// Distinct placeholder identifiers; `param_names[i]` binds `$i+1`
    pub param_names: Vec<String>,

    pub result_kind: ResultKind,
    pub pragmas: Pragmas,
    pub range: Range,
}

/// A statement that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadQuery {
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Bad(BadQuery),
    Source(SourceQuery),
}

impl Query {
    pub fn range(&self) -> Range {
        match self {
            Self::Bad(q) => q.range,
            Self::Source(q) => q.range,
        }
    }

    pub fn as_source(&self) -> Option<&SourceQuery> {
        match self {
            Self::Source(q) => Some(q),
            Self::Bad(_) => None,
        }
    }

    pub fn is_bad(&self) -> bool {
        matches!(self, Self::Bad(_))
    }
}

/// A parsed query file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct File {
    pub name: String,

    /// Leading comment group of the file that is not a query annotation
    pub doc_comment: Vec<String>,

    /// Queries in source order; names are not checked for uniqueness
    pub queries: Vec<Query>,

    /// All comment groups in source order
    pub comments: Vec<CommentGroup>,
}

impl File {
    /// Well-formed queries in source order
    pub fn source_queries(&self) -> impl Iterator<Item = &SourceQuery> {
        self.queries.iter().filter_map(Query::as_source)
    }

    pub fn has_bad_queries(&self) -> bool {
        self.queries.iter().any(Query::is_bad)
    }
}
