//! Output column nullability
//!
//! Every output is nullable unless proven otherwise. Two things prove an
//! output non-null:
//!
//! - a string or numeric literal, optionally cast (`'a'`, `42`, `'x'::text`)
//! - a bare reference to a `NOT NULL` column, when the plan is a scan of
//!   that column's table alone (optionally under `Limit`) or a `ModifyTable`
//!   writing it
//!
//! Joins, aggregates, subqueries and function calls are never inspected.

use crate::plan::{PlanNode, TopNode};
use querygen_core::Column;
use regex::Regex;
use std::sync::OnceLock;

const CAST: &str = r#"(?:::[A-Za-z_][A-Za-z0-9_ ."\[\]()]*)?"#;
const IDENT: &str = r#"(?:[A-Za-z_][A-Za-z0-9_$]*|"(?:[^"]|"")+")"#;

fn string_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"^'(?:[^']|'')*'{}$", CAST)).expect("string literal regex is valid"))
}

fn numeric_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^[0-9][0-9.eE+-]*{}$", CAST)).expect("numeric literal regex is valid")
    })
}

fn column_ref() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^(?:{ident}\.)?{ident}$", ident = IDENT)).expect("column reference regex is valid")
    })
}

/// A quoted-string or leading-digit numeric literal, optionally cast
pub fn is_literal(expr: &str) -> bool {
    let expr = expr.trim();
    string_literal().is_match(expr) || numeric_literal().is_match(expr)
}

/// A bare, optionally qualified, column reference
pub fn is_column_ref(expr: &str) -> bool {
    column_ref().is_match(expr.trim())
}

/// Whether the plan returns rows of `table` unchanged by joins
fn preserves_table(plan: &PlanNode, top: &TopNode, table: &str) -> bool {
    match top {
        TopNode::ModifyTable { relation, .. } => relation.as_deref() == Some(table),
        TopNode::Select | TopNode::Limit => plan.single_scan_relation() == Some(table),
    }
}

/// Nullability of each output field
///
/// `columns[i]` is the table column behind output `i`, if any. When the
/// plan's output list does not line up with the fields every output is
/// reported nullable.
pub fn infer_nullability(plan: &PlanNode, top: &TopNode, columns: &[Option<&Column>]) -> Vec<bool> {
    if plan.output.len() != columns.len() {
        tracing::warn!(
            plan_outputs = plan.output.len(),
            fields = columns.len(),
            "plan output does not match statement fields, assuming all outputs nullable"
        );
        return vec![true; columns.len()];
    }

    plan.output
        .iter()
        .zip(columns)
        .map(|(expr, column)| {
            if is_literal(expr) {
                return false;
            }
            match column {
                Some(column) if is_column_ref(expr) && !column.nullable => {
                    !preserves_table(plan, top, &column.table_name)
                }
                _ => true,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::parse_plan;
    use querygen_core::types::oid;
    use querygen_core::{CommandTag, Type};
    use serde_json::json;

    fn column(table: &str, name: &str, nullable: bool) -> Column {
        Column {
            name: name.to_string(),
            table_oid: 16384,
            table_name: table.to_string(),
            order: 1,
            ty: Type::base(oid::INT4, "int4"),
            nullable,
        }
    }

    fn plan(value: serde_json::Value) -> (PlanNode, TopNode) {
        let plan = parse_plan(&json!([{ "Plan": value }])).unwrap();
        let top = plan.classify().unwrap();
        (plan, top)
    }

    #[test]
    fn literal_detection() {
        assert!(is_literal("'abc'"));
        assert!(is_literal("'it''s'::text"));
        assert!(is_literal("42"));
        assert!(is_literal("3.14::numeric"));
        assert!(is_literal("'{1,2}'::integer[]"));
        assert!(!is_literal("NULL::text"));
        assert!(!is_literal("lower('A')"));
        assert!(!is_literal("1 + author.id"));
    }

    #[test]
    fn column_ref_detection() {
        assert!(is_column_ref("author.first_name"));
        assert!(is_column_ref("first_name"));
        assert!(is_column_ref("\"Author\".\"First Name\""));
        assert!(!is_column_ref("count(*)"));
        assert!(!is_column_ref("a.b.c"));
    }

    #[test]
    fn not_null_column_on_single_scan() {
        let (plan, top) = plan(json!({
            "Node Type": "Seq Scan",
            "Relation Name": "author",
            "Output": ["author.author_id", "author.first_name", "'x'::text", "lower(author.first_name)"],
        }));
        let id = column("author", "author_id", false);
        let name = column("author", "first_name", true);
        let lowered = column("author", "author_id", false);

        let nullable = infer_nullability(&plan, &top, &[Some(&id), Some(&name), None, Some(&lowered)]);
        assert_eq!(nullable, vec![false, true, false, true]);
    }

    #[test]
    fn joins_make_columns_nullable() {
        let (plan, top) = plan(json!({
            "Node Type": "Nested Loop",
            "Output": ["a.id"],
            "Plans": [
                { "Node Type": "Seq Scan", "Relation Name": "a" },
                { "Node Type": "Seq Scan", "Relation Name": "b" },
            ],
        }));
        let id = column("a", "id", false);
        assert_eq!(infer_nullability(&plan, &top, &[Some(&id)]), vec![true]);
    }

    #[test]
    fn returning_from_modified_table() {
        let (plan, top) = plan(json!({
            "Node Type": "ModifyTable",
            "Operation": "Insert",
            "Relation Name": "author",
            "Output": ["author.author_id"],
            "Plans": [{ "Node Type": "Result", "Output": ["nextval('author_author_id_seq'::regclass)"] }],
        }));
        assert_eq!(plan.command_tag().unwrap(), CommandTag::Insert);

        let id = column("author", "author_id", false);
        assert_eq!(infer_nullability(&plan, &top, &[Some(&id)]), vec![false]);

        let other = column("book", "author_id", false);
        assert_eq!(infer_nullability(&plan, &top, &[Some(&other)]), vec![true]);
    }

    #[test]
    fn mismatched_outputs_are_all_nullable() {
        let (plan, top) = plan(json!({ "Node Type": "Result", "Output": ["1"] }));
        assert_eq!(infer_nullability(&plan, &top, &[None, None]), vec![true, true]);
    }
}
