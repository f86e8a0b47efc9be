//! Catalog trait for describing statements and reading type metadata

use querygen_core::{ColumnKey, DiagnosticCode, Oid, TypeKind};
use std::future::Future;
use std::time::Duration;

/// An output field of a described statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub type_oid: Oid,

    /// Source table, or 0 when the field is not a plain column
    pub table_oid: Oid,

    /// Attribute number in the source table, or 0
    pub column_id: i16,
}

impl Field {
    pub fn new(name: impl Into<String>, type_oid: Oid) -> Self {
        Self {
            name: name.into(),
            type_oid,
            table_oid: 0,
            column_id: 0,
        }
    }

    /// Mark the field as coming from a table column
    pub fn from_column(mut self, table_oid: Oid, column_id: i16) -> Self {
        self.table_oid = table_oid;
        self.column_id = column_id;
        self
    }

    /// Key of the source column, if the field is one
    pub fn column_key(&self) -> Option<ColumnKey> {
        (self.table_oid != 0 && self.column_id > 0)
            .then(|| ColumnKey::new(self.table_oid, self.column_id))
    }
}

/// Parameter types and output fields of a prepared statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementDescription {
    pub params: Vec<Oid>,
    pub columns: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumRow {
    pub oid: Oid,
    pub name: String,
    pub labels: Vec<String>,
    pub sort_orders: Vec<f32>,
    pub child_oids: Vec<Oid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRow {
    pub oid: Oid,
    pub name: String,
    pub not_null: bool,
    pub has_default: bool,
    pub base_oid: Oid,
    pub dimensions: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeRow {
    pub oid: Oid,
    pub name: String,
    pub column_names: Vec<String>,
    pub column_oids: Vec<Oid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayRow {
    pub oid: Oid,
    pub name: String,
    pub elem_oid: Oid,
}

/// Minimal record of a type no kind-specific query recognised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRow {
    pub oid: Oid,
    pub name: String,
    pub kind: TypeKind,
}

/// A table column as stored in `pg_attribute`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub table_oid: Oid,
    pub table_name: String,
    pub order: i16,
    pub name: String,
    pub type_oid: Oid,
    pub not_null: bool,
}

impl ColumnRow {
    pub fn key(&self) -> ColumnKey {
        ColumnKey::new(self.table_oid, self.order)
    }
}

/// Errors that can occur talking to the catalog database
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Catalog query failed: {0}")]
    Query(String),

    #[error("Catalog operation {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CatalogError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::Timeout { .. } => DiagnosticCode::CatalogTimeout,
            _ => DiagnosticCode::CatalogQueryFailed,
        }
    }
}

/// The catalog database consulted during inference
///
/// Every `find_*` method answers for the OIDs or keys it knows and silently
/// omits the rest; callers decide whether an omission is an error.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// Catalog name for logs (e.g., "PostgreSQL")
    fn name(&self) -> &'static str;

    /// Prepare `sql` without executing it
    async fn describe(&self, sql: &str) -> Result<StatementDescription, CatalogError>;

    /// `EXPLAIN (VERBOSE, FORMAT JSON)` of `sql`, binding NULL for every
    /// parameter
    async fn explain(&self, sql: &str, param_types: &[Oid]) -> Result<serde_json::Value, CatalogError>;

    /// The given OIDs plus every type they depend on: composite column
    /// types, array element types and domain base types, transitively
    async fn find_descendant_oids(&self, oids: &[Oid]) -> Result<Vec<Oid>, CatalogError>;

    async fn find_enum_types(&self, oids: &[Oid]) -> Result<Vec<EnumRow>, CatalogError>;

    async fn find_domain_types(&self, oids: &[Oid]) -> Result<Vec<DomainRow>, CatalogError>;

    async fn find_composite_types(&self, oids: &[Oid]) -> Result<Vec<CompositeRow>, CatalogError>;

    async fn find_array_types(&self, oids: &[Oid]) -> Result<Vec<ArrayRow>, CatalogError>;

    /// Name and kind of any type, used for OIDs no other query matched
    async fn find_unknown_types(&self, oids: &[Oid]) -> Result<Vec<UnknownRow>, CatalogError>;

    async fn find_columns(&self, keys: &[ColumnKey]) -> Result<Vec<ColumnRow>, CatalogError>;
}

/// Run one catalog round trip, failing with [`CatalogError::Timeout`] once
/// `timeout` elapses
pub async fn round_trip<T, F>(operation: &'static str, timeout: Duration, fut: F) -> Result<T, CatalogError>
where
    F: Future<Output = Result<T, CatalogError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, ?timeout, "catalog round trip timed out");
            Err(CatalogError::Timeout { operation, timeout })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_column_key() {
        assert_eq!(Field::new("count", 20).column_key(), None);
        assert_eq!(
            Field::new("id", 23).from_column(16384, 1).column_key(),
            Some(ColumnKey::new(16384, 1))
        );
    }

    #[test]
    fn error_codes() {
        let timeout = CatalogError::Timeout {
            operation: "describe",
            timeout: Duration::from_millis(5),
        };
        assert_eq!(timeout.code(), DiagnosticCode::CatalogTimeout);
        assert_eq!(CatalogError::Query("boom".into()).code(), DiagnosticCode::CatalogQueryFailed);
    }

    #[tokio::test]
    async fn round_trip_times_out() {
        let result: Result<(), _> = round_trip("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(CatalogError::Timeout { operation: "slow", .. })));
    }

    #[tokio::test]
    async fn round_trip_passes_results_through() {
        let result = round_trip("fast", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
