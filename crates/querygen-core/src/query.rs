//! Typed query descriptors
//!
//! A [`TypedQuery`] is the contract handed to code generators: the prepared SQL
//! plus ordered inputs and outputs, each carrying a fully resolved [`Type`].

use crate::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How many rows a query is declared to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// Zero or more rows (`:many`)
    Many,

    /// Exactly one row (`:one`)
    One,

    /// No rows, executed for its effect (`:exec`)
    Exec,
}

impl ResultKind {
    /// Annotation spelling, including the leading colon
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Many => ":many",
            Self::One => ":one",
            Self::Exec => ":exec",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResultKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ":many" => Ok(Self::Many),
            ":one" => Ok(Self::One),
            ":exec" => Ok(Self::Exec),
            other => Err(format!("unknown result kind '{}'", other)),
        }
    }
}

/// Command tag derived from the statement's plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandTag {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "select"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A query parameter, in placeholder ordinal order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputParam {
    /// Identifier from the placeholder call
    pub name: String,

    /// Default value expression, if one was declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,

    #[serde(rename = "type")]
    pub ty: Type,
}

/// A result column, in select-list order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputColumn {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: Type,

    /// True unless the column is proven non-null
    pub nullable: bool,
}

/// A fully typed query ready for code generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedQuery {
    pub name: String,
    pub tag: CommandTag,
    pub result_kind: ResultKind,

    /// Documentation lines preceding the annotation, markers stripped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub doc_comment: Vec<String>,

    /// SQL with placeholders rewritten to `$N`
    pub prepared_sql: String,

    pub inputs: Vec<InputParam>,
    pub outputs: Vec<OutputColumn>,

    /// Value of the `proto-type` pragma
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_kind_parsing() {
        assert_eq!(":many".parse::<ResultKind>().unwrap(), ResultKind::Many);
        assert_eq!(":one".parse::<ResultKind>().unwrap(), ResultKind::One);
        assert_eq!(":exec".parse::<ResultKind>().unwrap(), ResultKind::Exec);
        assert!("many".parse::<ResultKind>().is_err());
        assert_eq!(ResultKind::Exec.to_string(), ":exec");
    }

    #[test]
    fn typed_query_serialization() {
        let query = TypedQuery {
            name: "FindAuthors".to_string(),
            tag: CommandTag::Select,
            result_kind: ResultKind::Many,
            doc_comment: Vec::new(),
            prepared_sql: "SELECT first_name FROM author WHERE first_name = $1;".to_string(),
            inputs: vec![InputParam {
                name: "FirstName".to_string(),
                default_value: None,
                ty: Type::text(),
            }],
            outputs: vec![OutputColumn {
                name: "first_name".to_string(),
                ty: Type::text(),
                nullable: true,
            }],
            proto_type: None,
        };

        let json = serde_json::to_string(&query).unwrap();
        assert!(json.contains("\"tag\":\"select\""));
        assert!(json.contains("\"result_kind\":\"many\""));
        assert!(!json.contains("proto_type"));
        assert!(!json.contains("default_value"));

        let back: TypedQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(back, query);
    }
}
