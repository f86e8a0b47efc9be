//! Diagnostic codes and error reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Lexical errors (1xxx)
    /// A character that may not appear in a query file
    ScanIllegalCharacter,

    /// String literal without a closing quote
    ScanUnterminatedString,

    /// Quoted identifier without a closing quote
    ScanUnterminatedIdentifier,

    /// Block comment without a closing `*/`
    ScanUnterminatedComment,

    // Syntactic errors (2xxx)
    /// Query has no `name: <Name> :kind` lead comment
    ParseMissingAnnotation,

    /// Lead comment does not match the annotation syntax
    ParseInvalidAnnotation,

    /// Query text reaches end of file without a semicolon
    ParseUnterminatedQuery,

    /// Parsing stopped after too many errors
    ParseTooManyErrors,

    /// A malformed query blocks inference of its file
    ParseBadQuery,

    // Resolution errors (3xxx)
    /// A type OID could not be resolved after a full fetch cycle
    ResolveUnresolvedType,

    /// A table column could not be found in the catalog
    ResolveMissingColumn,

    /// Composite or array types depend on each other in a cycle
    ResolveDependencyCycle,

    // Catalog errors (4xxx)
    /// A catalog round trip failed
    CatalogQueryFailed,

    /// A catalog round trip exceeded its deadline
    CatalogTimeout,

    /// The catalog reported a different parameter count than the query declares
    CatalogParamMismatch,

    // General warnings (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScanIllegalCharacter => "SCAN_ILLEGAL_CHARACTER",
            Self::ScanUnterminatedString => "SCAN_UNTERMINATED_STRING",
            Self::ScanUnterminatedIdentifier => "SCAN_UNTERMINATED_IDENTIFIER",
            Self::ScanUnterminatedComment => "SCAN_UNTERMINATED_COMMENT",
            Self::ParseMissingAnnotation => "PARSE_MISSING_ANNOTATION",
            Self::ParseInvalidAnnotation => "PARSE_INVALID_ANNOTATION",
            Self::ParseUnterminatedQuery => "PARSE_UNTERMINATED_QUERY",
            Self::ParseTooManyErrors => "PARSE_TOO_MANY_ERRORS",
            Self::ParseBadQuery => "PARSE_BAD_QUERY",
            Self::ResolveUnresolvedType => "RESOLVE_UNRESOLVED_TYPE",
            Self::ResolveMissingColumn => "RESOLVE_MISSING_COLUMN",
            Self::ResolveDependencyCycle => "RESOLVE_DEPENDENCY_CYCLE",
            Self::CatalogQueryFailed => "CATALOG_QUERY_FAILED",
            Self::CatalogTimeout => "CATALOG_TIMEOUT",
            Self::CatalogParamMismatch => "CATALOG_PARAM_MISMATCH",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - fails the generation run
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Source location in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File path as given on the command line
    pub file: String,

    /// Optional line number (1-indexed)
    pub line: Option<usize>,

    /// Optional column number (1-indexed)
    pub column: Option<usize>,
}

impl Location {
    /// Create a new location with just a file path
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            column: None,
        }
    }

    /// Create a location with file, line, and column
    pub fn with_position(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line: Some(line),
            column: Some(column),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{}:{}:{}", self.file, line, column),
            (Some(line), None) => write!(f, "{}:{}", self.file, line),
            _ => write!(f, "{}", self.file),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Name of the query the diagnostic refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            query: None,
        }
    }

    /// Shorthand for an error diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the query name
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{}: ", location)?;
        }
        write!(f, "{} [{}] {}", self.severity, self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        // Ensure codes are stable strings
        assert_eq!(DiagnosticCode::ParseMissingAnnotation.as_str(), "PARSE_MISSING_ANNOTATION");
        assert_eq!(DiagnosticCode::ResolveUnresolvedType.as_str(), "RESOLVE_UNRESOLVED_TYPE");
        assert_eq!(DiagnosticCode::CatalogTimeout.as_str(), "CATALOG_TIMEOUT");
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::error(
            DiagnosticCode::ParseInvalidAnnotation,
            "expected ':many', ':one' or ':exec'",
        )
        .with_location(Location::with_position("queries/author.sql", 4, 1))
        .with_query("FindAuthors");

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("PARSE_INVALID_ANNOTATION"));
        assert!(json.contains("error"));
        assert!(json.contains("FindAuthors"));
    }

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::error(DiagnosticCode::ParseUnterminatedQuery, "missing semicolon")
            .with_location(Location::with_position("a.sql", 3, 7));
        assert_eq!(
            diag.to_string(),
            "a.sql:3:7: error [PARSE_UNTERMINATED_QUERY] missing semicolon"
        );
    }
}
