//! In-memory catalog for testing
//!
//! This catalog answers from predefined types, tables, statement
//! descriptions and plans without connecting to any database. It's useful for:
//! - Unit testing type resolution and column fetching
//! - End-to-end inference tests
//! - Counting catalog round trips
//! - Simulating latency and failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use querygen_catalog::{Field, MockCatalog, StatementDescription};
//! use querygen_core::types::oid;
//!
//! let catalog = MockCatalog::new()
//!     .with_enum(90000, "mood", &["sad", "happy"])
//!     .with_table(16384, "author", &[("first_name", oid::TEXT, false)])
//!     .with_statement(
//!         "SELECT first_name FROM author",
//!         StatementDescription {
//!             params: vec![],
//!             columns: vec![Field::new("first_name", oid::TEXT).from_column(16384, 1)],
//!         },
//!     );
//! ```

use crate::catalog::{
    ArrayRow, Catalog, CatalogError, ColumnRow, CompositeRow, DomainRow, EnumRow, StatementDescription,
    UnknownRow,
};
use querygen_core::types::known_type;
use querygen_core::{ColumnKey, Oid, TypeKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Clone)]
enum MockType {
    Enum(EnumRow),
    Domain(DomainRow),
    Composite(CompositeRow),
    Array(ArrayRow),
    Other(UnknownRow),
}

impl MockType {
    fn name(&self) -> &str {
        match self {
            Self::Enum(r) => &r.name,
            Self::Domain(r) => &r.name,
            Self::Composite(r) => &r.name,
            Self::Array(r) => &r.name,
            Self::Other(r) => &r.name,
        }
    }

    fn kind(&self) -> TypeKind {
        match self {
            Self::Enum(_) => TypeKind::Enum,
            Self::Domain(_) => TypeKind::Domain,
            Self::Composite(_) => TypeKind::Composite,
            Self::Array(_) => TypeKind::Base,
            Self::Other(r) => r.kind,
        }
    }

    fn dependencies(&self) -> Vec<Oid> {
        match self {
            Self::Domain(r) => vec![r.base_oid],
            Self::Composite(r) => r.column_oids.clone(),
            Self::Array(r) => vec![r.elem_oid],
            Self::Enum(_) | Self::Other(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    types: HashMap<Oid, MockType>,
    columns: BTreeMap<ColumnKey, ColumnRow>,
    statements: HashMap<String, StatementDescription>,
    plans: HashMap<String, serde_json::Value>,

    /// Error messages by operation name
    failures: HashMap<&'static str, String>,
}

/// Round trips issued per catalog operation
#[derive(Debug, Default)]
struct CallCounters {
    describe: AtomicUsize,
    explain: AtomicUsize,
    descendants: AtomicUsize,
    enums: AtomicUsize,
    domains: AtomicUsize,
    composites: AtomicUsize,
    arrays: AtomicUsize,
    unknown: AtomicUsize,
    columns: AtomicUsize,
}

/// Snapshot of [`MockCatalog`] call counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub describe: usize,
    pub explain: usize,
    pub descendants: usize,
    pub enums: usize,
    pub domains: usize,
    pub composites: usize,
    pub arrays: usize,
    pub unknown: usize,
    pub columns: usize,
}

impl CallCounts {
    /// Total round trips
    pub fn total(&self) -> usize {
        self.describe
            + self.explain
            + self.descendants
            + self.enums
            + self.domains
            + self.composites
            + self.arrays
            + self.unknown
            + self.columns
    }
}

/// In-memory catalog for testing
///
/// Clones share state and call counters.
#[derive(Debug, Clone, Default)]
pub struct MockCatalog {
    state: Arc<RwLock<MockState>>,
    calls: Arc<CallCounters>,

    /// Simulated latency per round trip
    latency: Duration,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate round trip latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn add_type(self, oid: Oid, ty: MockType) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.types.insert(oid, ty);
        }
        self
    }

    /// Add an enum type; labels are sorted in the given order
    pub fn with_enum(self, oid: Oid, name: &str, labels: &[&str]) -> Self {
        let row = EnumRow {
            oid,
            name: name.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            sort_orders: (1..=labels.len()).map(|i| i as f32).collect(),
            child_oids: (1..=labels.len() as Oid).map(|i| oid * 100 + i).collect(),
        };
        self.add_type(oid, MockType::Enum(row))
    }

    pub fn with_domain(self, oid: Oid, name: &str, base_oid: Oid, not_null: bool) -> Self {
        let row = DomainRow {
            oid,
            name: name.to_string(),
            not_null,
            has_default: false,
            base_oid,
            dimensions: 0,
        };
        self.add_type(oid, MockType::Domain(row))
    }

    pub fn with_composite(self, oid: Oid, name: &str, columns: &[(&str, Oid)]) -> Self {
        let row = CompositeRow {
            oid,
            name: name.to_string(),
            column_names: columns.iter().map(|(n, _)| n.to_string()).collect(),
            column_oids: columns.iter().map(|(_, o)| *o).collect(),
        };
        self.add_type(oid, MockType::Composite(row))
    }

    pub fn with_array(self, oid: Oid, name: &str, elem_oid: Oid) -> Self {
        let row = ArrayRow {
            oid,
            name: name.to_string(),
            elem_oid,
        };
        self.add_type(oid, MockType::Array(row))
    }

    /// Add a type answered only by the catch-all query
    pub fn with_type(self, oid: Oid, name: &str, kind: TypeKind) -> Self {
        let row = UnknownRow {
            oid,
            name: name.to_string(),
            kind,
        };
        self.add_type(oid, MockType::Other(row))
    }

    /// Add a table; columns are `(name, type OID, NOT NULL)` numbered from 1
    pub fn with_table(self, table_oid: Oid, name: &str, columns: &[(&str, Oid, bool)]) -> Self {
        if let Ok(mut state) = self.state.write() {
            for (i, (column, type_oid, not_null)) in columns.iter().enumerate() {
                let row = ColumnRow {
                    table_oid,
                    table_name: name.to_string(),
                    order: i as i16 + 1,
                    name: column.to_string(),
                    type_oid: *type_oid,
                    not_null: *not_null,
                };
                state.columns.insert(row.key(), row);
            }
        }
        self
    }

    /// Description returned by `describe` for exactly this SQL text
    pub fn with_statement(self, sql: &str, description: StatementDescription) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.statements.insert(sql.to_string(), description);
        }
        self
    }

    /// Plan returned by `explain` for exactly this SQL text
    pub fn with_plan(self, sql: &str, plan: serde_json::Value) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.plans.insert(sql.to_string(), plan);
        }
        self
    }

    /// Fail every call of `operation` (e.g., "describe") with a query error
    pub fn with_failure(self, operation: &'static str, message: &str) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.failures.insert(operation, message.to_string());
        }
        self
    }

    pub fn calls(&self) -> CallCounts {
        let c = &self.calls;
        CallCounts {
            describe: c.describe.load(Ordering::SeqCst),
            explain: c.explain.load(Ordering::SeqCst),
            descendants: c.descendants.load(Ordering::SeqCst),
            enums: c.enums.load(Ordering::SeqCst),
            domains: c.domains.load(Ordering::SeqCst),
            composites: c.composites.load(Ordering::SeqCst),
            arrays: c.arrays.load(Ordering::SeqCst),
            unknown: c.unknown.load(Ordering::SeqCst),
            columns: c.columns.load(Ordering::SeqCst),
        }
    }

    /// Count the call, apply latency and injected failures
    async fn enter(&self, operation: &'static str, counter: &AtomicUsize) -> Result<(), CatalogError> {
        counter.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let failure = self.read()?.failures.get(operation).cloned();
        match failure {
            Some(message) => Err(CatalogError::Query(message)),
            None => Ok(()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MockState>, CatalogError> {
        self.state
            .read()
            .map_err(|_| CatalogError::InvalidResponse("mock catalog state poisoned".to_string()))
    }

    fn rows<T>(&self, oids: &[Oid], select: impl Fn(&MockType) -> Option<T>) -> Result<Vec<T>, CatalogError> {
        let state = self.read()?;
        Ok(oids
            .iter()
            .filter_map(|oid| state.types.get(oid))
            .filter_map(select)
            .collect())
    }
}

#[async_trait::async_trait]
impl Catalog for MockCatalog {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn describe(&self, sql: &str) -> Result<StatementDescription, CatalogError> {
        self.enter("describe", &self.calls.describe).await?;
        self.read()?
            .statements
            .get(sql)
            .cloned()
            .ok_or_else(|| CatalogError::Query(format!("no statement registered for {:?}", sql)))
    }

    async fn explain(&self, sql: &str, _param_types: &[Oid]) -> Result<serde_json::Value, CatalogError> {
        self.enter("explain", &self.calls.explain).await?;
        self.read()?
            .plans
            .get(sql)
            .cloned()
            .ok_or_else(|| CatalogError::Query(format!("no plan registered for {:?}", sql)))
    }

    async fn find_descendant_oids(&self, oids: &[Oid]) -> Result<Vec<Oid>, CatalogError> {
        self.enter("find_descendant_oids", &self.calls.descendants).await?;
        let state = self.read()?;

        let mut closure: Vec<Oid> = Vec::new();
        let mut stack: Vec<Oid> = oids.to_vec();
        while let Some(oid) = stack.pop() {
            if closure.contains(&oid) {
                continue;
            }
            closure.push(oid);
            if let Some(ty) = state.types.get(&oid) {
                stack.extend(ty.dependencies());
            }
        }
        Ok(closure)
    }

    async fn find_enum_types(&self, oids: &[Oid]) -> Result<Vec<EnumRow>, CatalogError> {
        self.enter("find_enum_types", &self.calls.enums).await?;
        self.rows(oids, |ty| match ty {
            MockType::Enum(row) => Some(row.clone()),
            _ => None,
        })
    }

    async fn find_domain_types(&self, oids: &[Oid]) -> Result<Vec<DomainRow>, CatalogError> {
        self.enter("find_domain_types", &self.calls.domains).await?;
        self.rows(oids, |ty| match ty {
            MockType::Domain(row) => Some(row.clone()),
            _ => None,
        })
    }

    async fn find_composite_types(&self, oids: &[Oid]) -> Result<Vec<CompositeRow>, CatalogError> {
        self.enter("find_composite_types", &self.calls.composites).await?;
        self.rows(oids, |ty| match ty {
            MockType::Composite(row) => Some(row.clone()),
            _ => None,
        })
    }

    async fn find_array_types(&self, oids: &[Oid]) -> Result<Vec<ArrayRow>, CatalogError> {
        self.enter("find_array_types", &self.calls.arrays).await?;
        self.rows(oids, |ty| match ty {
            MockType::Array(row) => Some(row.clone()),
            _ => None,
        })
    }

    async fn find_unknown_types(&self, oids: &[Oid]) -> Result<Vec<UnknownRow>, CatalogError> {
        self.enter("find_unknown_types", &self.calls.unknown).await?;
        let state = self.read()?;

        Ok(oids
            .iter()
            .filter_map(|&oid| match state.types.get(&oid) {
                Some(ty) => Some(UnknownRow {
                    oid,
                    name: ty.name().to_string(),
                    kind: ty.kind(),
                }),
                None => known_type(oid).map(|ty| UnknownRow {
                    oid,
                    name: ty.name().to_string(),
                    kind: TypeKind::Base,
                }),
            })
            .collect())
    }

    async fn find_columns(&self, keys: &[ColumnKey]) -> Result<Vec<ColumnRow>, CatalogError> {
        self.enter("find_columns", &self.calls.columns).await?;
        let state = self.read()?;
        Ok(keys.iter().filter_map(|key| state.columns.get(key).cloned()).collect())
    }
}
