//! querygen inference - typed queries from the catalog
//!
//! This crate turns parsed queries into typed queries:
//! - Describing each prepared statement for parameter and output types
//! - Reading the statement's plan for its command tag and output expressions
//! - Inferring output nullability from literals and NOT NULL columns
//! - Resolving every type through the run's caches

pub mod plan;
pub mod nullability;
pub mod inference;

pub use plan::{parse_plan, PlanError, PlanNode, TopNode};
pub use nullability::{infer_nullability, is_column_ref, is_literal};
pub use inference::{InferenceError, Inferrer, QueryError};
