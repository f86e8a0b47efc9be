//! Model of `EXPLAIN (VERBOSE, FORMAT JSON)` output

use querygen_core::CommandTag;
use serde::Deserialize;

/// A node of a query plan
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlanNode {
    #[serde(rename = "Node Type")]
    pub node_type: String,

    /// `Insert`, `Update` or `Delete` on a `ModifyTable` node
    #[serde(rename = "Operation", default)]
    pub operation: Option<String>,

    /// Relation read or written by scan and modify nodes
    #[serde(rename = "Relation Name", default)]
    pub relation_name: Option<String>,

    #[serde(rename = "Alias", default)]
    pub alias: Option<String>,

    /// Output expressions as deparsed by the server
    #[serde(rename = "Output", default)]
    pub output: Vec<String>,

    #[serde(rename = "Plans", default)]
    pub plans: Vec<PlanNode>,
}

#[derive(Debug, Deserialize)]
struct ExplainEntry {
    #[serde(rename = "Plan")]
    plan: PlanNode,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("malformed plan: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("plan contains no statements")]
    Empty,

    #[error("unsupported ModifyTable operation '{0}'")]
    UnknownOperation(String),
}

/// The plan's top node, as far as inference cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopNode {
    /// `Result`, scans, joins and everything else that only reads
    Select,

    Limit,

    ModifyTable {
        tag: CommandTag,
        relation: Option<String>,
    },
}

/// Parse the JSON returned by `EXPLAIN (FORMAT JSON)`
pub fn parse_plan(value: &serde_json::Value) -> Result<PlanNode, PlanError> {
    let entries: Vec<ExplainEntry> = serde_json::from_value(value.clone())?;
    entries
        .into_iter()
        .next()
        .map(|entry| entry.plan)
        .ok_or(PlanError::Empty)
}

impl PlanNode {
    pub fn classify(&self) -> Result<TopNode, PlanError> {
        match self.node_type.as_str() {
            "ModifyTable" => {
                let operation = self.operation.as_deref().unwrap_or_default();
                let tag = match operation {
                    "Insert" => CommandTag::Insert,
                    "Update" => CommandTag::Update,
                    "Delete" => CommandTag::Delete,
                    other => return Err(PlanError::UnknownOperation(other.to_string())),
                };
                Ok(TopNode::ModifyTable {
                    tag,
                    relation: self.relation_name.clone(),
                })
            }
            "Limit" => Ok(TopNode::Limit),
            _ => Ok(TopNode::Select),
        }
    }

    pub fn command_tag(&self) -> Result<CommandTag, PlanError> {
        Ok(match self.classify()? {
            TopNode::ModifyTable { tag, .. } => tag,
            TopNode::Select | TopNode::Limit => CommandTag::Select,
        })
    }

    /// Whether this node or any node below it reads a relation
    fn reads_relation(&self) -> bool {
        self.relation_name.is_some() || self.plans.iter().any(PlanNode::reads_relation)
    }

    /// The relation scanned when the plan is a scan of exactly one relation,
    /// optionally under a `Limit`
    pub fn single_scan_relation(&self) -> Option<&str> {
        if self.node_type == "Limit" {
            return match self.plans.as_slice() {
                [child] => child.single_scan_relation(),
                _ => None,
            };
        }

        let relation = self.relation_name.as_deref()?;
        if self.node_type == "ModifyTable" || self.plans.iter().any(PlanNode::reads_relation) {
            return None;
        }
        Some(relation)
    }
}
