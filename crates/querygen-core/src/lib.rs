//! querygen core
//!
//! Domain model shared by every querygen crate: catalog types, typed query
//! descriptors, configuration, and the stable diagnostic registry.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod types;
pub mod query;
pub mod report;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use types::{
    Oid, Type, TypeKind, BaseType, ArrayType, EnumType, DomainType, CompositeType,
    UnknownType, Column, ColumnKey,
};
pub use query::{TypedQuery, InputParam, OutputColumn, ResultKind, CommandTag};
pub use report::{Report, ReportVersion, FileReport};
pub use config::{Config, ConfigError, ConnectionConfig};
