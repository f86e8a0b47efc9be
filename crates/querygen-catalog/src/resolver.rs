//! Type resolution against the catalog
//!
//! [`TypeResolver`] turns type OIDs reported by the catalog into fully
//! resolved [`Type`]s. Resolution runs in a fixed number of round trips no
//! matter how many OIDs are requested:
//!
//! 1. one query for the dependency closure of the uncached OIDs
//! 2. one batched query per kind (enum, domain, composite, array)
//! 3. one catch-all query for whatever is left
//!
//! The fetched rows are then materialised children first, so a composite
//! is only built once every column type exists.

use crate::cache::TypeCache;
use crate::catalog::{
    round_trip, ArrayRow, Catalog, CatalogError, CompositeRow, DomainRow, EnumRow, UnknownRow,
};
use querygen_core::{
    ArrayType, BaseType, ColumnKey, CompositeType, DiagnosticCode, DomainType, EnumType, Oid, Type,
    UnknownType,
};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Errors that can occur resolving types or columns
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("{count} type(s) could not be resolved: {oids:?}")]
    Unresolved { count: usize, oids: Vec<Oid> },

    #[error("type {oid} depends on type {dependency}, which the catalog did not describe")]
    MissingDependency { oid: Oid, dependency: Oid },

    #[error("dependency cycle among types {oids:?}")]
    Cycle { oids: Vec<Oid> },

    #[error("column {key} not found in catalog")]
    MissingColumn { key: ColumnKey },
}

impl ResolveError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::Catalog(e) => e.code(),
            Self::Unresolved { .. } | Self::MissingDependency { .. } => {
                DiagnosticCode::ResolveUnresolvedType
            }
            Self::Cycle { .. } => DiagnosticCode::ResolveDependencyCycle,
            Self::MissingColumn { .. } => DiagnosticCode::ResolveMissingColumn,
        }
    }

    fn unresolved(oids: Vec<Oid>) -> Self {
        Self::Unresolved {
            count: oids.len(),
            oids,
        }
    }
}

/// A fetched catalog row waiting for its dependencies
#[derive(Debug, Clone)]
enum RawType {
    Enum(EnumRow),
    Domain(DomainRow),
    Composite(CompositeRow),
    Array(ArrayRow),
    Unknown(UnknownRow),
}

impl RawType {
    fn dependencies(&self) -> Vec<Oid> {
        match self {
            Self::Domain(row) => vec![row.base_oid],
            Self::Composite(row) => row.column_oids.clone(),
            Self::Array(row) => vec![row.elem_oid],
            Self::Enum(_) | Self::Unknown(_) => Vec::new(),
        }
    }

    fn build(self, lookup: impl Fn(Oid) -> Option<Type>) -> Option<Type> {
        let ty = match self {
            Self::Enum(row) => Type::Enum(EnumType {
                oid: row.oid,
                name: row.name,
                labels: row.labels,
                sort_orders: row.sort_orders,
                child_oids: row.child_oids,
            }),
            Self::Domain(row) => {
                let base = lookup(row.base_oid)?;
                let base = match base {
                    Type::Base(b) => b,
                    other => BaseType::new(other.oid(), other.name()),
                };
                Type::Domain(DomainType {
                    oid: row.oid,
                    name: row.name,
                    not_null: row.not_null,
                    has_default: row.has_default,
                    base,
                    dimensions: row.dimensions,
                })
            }
            Self::Composite(row) => {
                let column_types = row
                    .column_oids
                    .iter()
                    .map(|&oid| lookup(oid))
                    .collect::<Option<Vec<_>>>()?;
                Type::Composite(CompositeType {
                    oid: row.oid,
                    name: row.name,
                    column_names: row.column_names,
                    column_types,
                })
            }
            Self::Array(row) => Type::Array(ArrayType {
                oid: row.oid,
                name: row.name,
                elem: Box::new(lookup(row.elem_oid)?),
            }),
            Self::Unknown(row) => Type::Unknown(UnknownType {
                oid: row.oid,
                name: row.name,
                kind: row.kind,
            }),
        };
        Some(ty)
    }
}

/// Materialise fetched rows in dependency order
///
/// Every dependency must be either cached or among `rows`. Rows are keyed
/// in a `BTreeMap` so the resolution order is deterministic.
fn materialize(
    rows: BTreeMap<Oid, RawType>,
    cache: &TypeCache,
) -> Result<HashMap<Oid, Type>, ResolveError> {
    for (&oid, raw) in &rows {
        if let Some(dependency) = raw
            .dependencies()
            .into_iter()
            .find(|d| !rows.contains_key(d) && !cache.contains(*d))
        {
            return Err(ResolveError::MissingDependency { oid, dependency });
        }
    }

    let mut pending = rows;
    let mut done: HashMap<Oid, Type> = HashMap::new();

    while !pending.is_empty() {
        let ready: Vec<Oid> = pending
            .iter()
            .filter(|(_, raw)| {
                raw.dependencies()
                    .iter()
                    .all(|d| done.contains_key(d) || !pending.contains_key(d))
            })
            .map(|(&oid, _)| oid)
            .collect();

        if ready.is_empty() {
            return Err(ResolveError::Cycle {
                oids: pending.keys().copied().collect(),
            });
        }

        for oid in ready {
            let Some(raw) = pending.remove(&oid) else {
                continue;
            };
            let ty = raw
                .build(|dep| done.get(&dep).cloned().or_else(|| cache.get(dep)))
                .ok_or_else(|| ResolveError::unresolved(vec![oid]))?;
            done.insert(oid, ty);
        }
    }

    Ok(done)
}

/// Resolves type OIDs through a [`TypeCache`], consulting the catalog only
/// for misses
pub struct TypeResolver<'a> {
    catalog: &'a dyn Catalog,
    cache: &'a TypeCache,
    timeout: Duration,
}

impl<'a> TypeResolver<'a> {
    pub fn new(catalog: &'a dyn Catalog, cache: &'a TypeCache, timeout: Duration) -> Self {
        Self {
            catalog,
            cache,
            timeout,
        }
    }

    pub fn cache(&self) -> &TypeCache {
        self.cache
    }

    pub async fn resolve_type(&self, oid: Oid) -> Result<Type, ResolveError> {
        self.resolve_types(&[oid])
            .await?
            .remove(&oid)
            .ok_or_else(|| ResolveError::unresolved(vec![oid]))
    }

    /// Resolve every OID in `oids`
    ///
    /// The result holds an entry for each requested OID or the call fails with
    /// [`ResolveError::Unresolved`].
    pub async fn resolve_types(&self, oids: &[Oid]) -> Result<HashMap<Oid, Type>, ResolveError> {
        let (mut resolved, uncached) = self.cache.partition(oids);
        if uncached.is_empty() {
            tracing::debug!(requested = oids.len(), "all types cached");
            return Ok(resolved);
        }

        tracing::debug!(
            requested = oids.len(),
            cached = resolved.len(),
            uncached = ?uncached,
            "resolving types"
        );

        let closure = round_trip(
            "find_descendant_oids",
            self.timeout,
            self.catalog.find_descendant_oids(&uncached),
        )
        .await?;

        let mut wanted = uncached.clone();
        for oid in closure {
            if !wanted.contains(&oid) {
                wanted.push(oid);
            }
        }

        let (_, pending) = self.cache.partition(&wanted);
        if !pending.is_empty() {
            let rows = self.fetch_rows(&pending).await?;
            let types = materialize(rows, self.cache)?;
            tracing::debug!(count = types.len(), "resolved types from catalog");
            self.cache.extend(types.into_values());
        }

        let mut missing: Vec<Oid> = pending
            .iter()
            .copied()
            .filter(|&oid| !self.cache.contains(oid))
            .collect();
        for &oid in &uncached {
            match self.cache.get(oid) {
                Some(ty) => {
                    resolved.insert(oid, ty);
                }
                None if !missing.contains(&oid) => missing.push(oid),
                None => {}
            }
        }

        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(ResolveError::unresolved(missing));
        }
        Ok(resolved)
    }

    /// One batched round trip per type kind, then the catch-all for leftovers
    async fn fetch_rows(&self, oids: &[Oid]) -> Result<BTreeMap<Oid, RawType>, ResolveError> {
        let mut rows: BTreeMap<Oid, RawType> = BTreeMap::new();

        let enums = round_trip("find_enum_types", self.timeout, self.catalog.find_enum_types(oids)).await?;
        rows.extend(enums.into_iter().map(|r| (r.oid, RawType::Enum(r))));

        let domains = round_trip("find_domain_types", self.timeout, self.catalog.find_domain_types(oids)).await?;
        rows.extend(domains.into_iter().map(|r| (r.oid, RawType::Domain(r))));

        let composites = round_trip(
            "find_composite_types",
            self.timeout,
            self.catalog.find_composite_types(oids),
        )
        .await?;
        rows.extend(composites.into_iter().map(|r| (r.oid, RawType::Composite(r))));

        let arrays = round_trip("find_array_types", self.timeout, self.catalog.find_array_types(oids)).await?;
        rows.extend(arrays.into_iter().map(|r| (r.oid, RawType::Array(r))));

        let leftovers: Vec<Oid> = oids.iter().copied().filter(|oid| !rows.contains_key(oid)).collect();
        if !leftovers.is_empty() {
            tracing::debug!(oids = ?leftovers, "falling back to catch-all type query");
            let unknown = round_trip(
                "find_unknown_types",
                self.timeout,
                self.catalog.find_unknown_types(&leftovers),
            )
            .await?;
            for row in unknown {
                rows.entry(row.oid).or_insert(RawType::Unknown(row));
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCatalog;
    use pretty_assertions::assert_eq;
    use querygen_core::types::oid;
    use querygen_core::TypeKind;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn cached_types_need_no_round_trip() {
        let catalog = MockCatalog::new();
        let cache = TypeCache::default();
        let resolver = TypeResolver::new(&catalog, &cache, TIMEOUT);

        let types = resolver.resolve_types(&[oid::TEXT, oid::INT4_ARRAY]).await.unwrap();
        assert_eq!(types[&oid::TEXT], Type::text());
        assert_eq!(types[&oid::INT4_ARRAY].to_string(), "int4[]");
        assert_eq!(catalog.calls().total(), 0);
    }

    #[tokio::test]
    async fn resolves_enum_and_caches_it() {
        let catalog = MockCatalog::new().with_enum(90000, "mood", &["sad", "happy"]);
        let cache = TypeCache::default();
        let resolver = TypeResolver::new(&catalog, &cache, TIMEOUT);

        let mood = resolver.resolve_type(90000).await.unwrap();
        let Type::Enum(mood) = mood else {
            panic!("expected an enum, got {:?}", mood);
        };
        assert_eq!(mood.labels, vec!["sad".to_string(), "happy".to_string()]);
        assert_eq!(mood.sort_orders, vec![1.0, 2.0]);

        let first = catalog.calls().total();
        assert!(first > 0);
        resolver.resolve_type(90000).await.unwrap();
        assert_eq!(catalog.calls().total(), first);
    }

    #[tokio::test]
    async fn composite_columns_are_fully_resolved() {
        let catalog = MockCatalog::new()
            .with_enum(90000, "mood", &["ok"])
            .with_array(90001, "_mood", 90000)
            .with_domain(90002, "short_text", oid::TEXT, true)
            .with_composite(
                90003,
                "person",
                &[("name", 90002), ("moods", 90001), ("age", oid::INT4)],
            );
        let cache = TypeCache::default();
        let resolver = TypeResolver::new(&catalog, &cache, TIMEOUT);

        let person = resolver.resolve_type(90003).await.unwrap();
        let Type::Composite(person) = person else {
            panic!("expected a composite, got {:?}", person);
        };
        assert_eq!(person.column_names, vec!["name", "moods", "age"]);
        assert!(matches!(&person.column_types[0], Type::Domain(d) if d.not_null && d.base.name == "text"));
        assert_eq!(person.column_types[1].to_string(), "mood[]");
        assert_eq!(person.column_types[2], Type::base(oid::INT4, "int4"));

        // Every dependency was cached along the way.
        assert!(cache.contains(90000));
        assert!(cache.contains(90001));
        assert!(cache.contains(90002));

        let calls = catalog.calls();
        assert_eq!(calls.descendants, 1);
        assert_eq!(calls.enums, 1);
        assert_eq!(calls.composites, 1);
    }

    #[tokio::test]
    async fn unknown_kinds_use_catch_all() {
        let catalog = MockCatalog::new().with_type(90010, "int4range_custom", TypeKind::Range);
        let cache = TypeCache::default();
        let resolver = TypeResolver::new(&catalog, &cache, TIMEOUT);

        let ty = resolver.resolve_type(90010).await.unwrap();
        assert_eq!(
            ty,
            Type::Unknown(UnknownType {
                oid: 90010,
                name: "int4range_custom".into(),
                kind: TypeKind::Range,
            })
        );
        assert_eq!(catalog.calls().unknown, 1);
    }

    #[tokio::test]
    async fn missing_types_are_reported() {
        let catalog = MockCatalog::new().with_enum(90000, "mood", &["ok"]);
        let cache = TypeCache::default();
        let resolver = TypeResolver::new(&catalog, &cache, TIMEOUT);

        let err = resolver.resolve_types(&[90000, 99998, 99999]).await.unwrap_err();
        match err {
            ResolveError::Unresolved { count, oids } => {
                assert_eq!(count, 2);
                assert_eq!(oids, vec![99998, 99999]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn cycles_are_rejected() {
        let catalog = MockCatalog::new()
            .with_composite(90020, "a", &[("b", 90021)])
            .with_composite(90021, "b", &[("a", 90020)]);
        let cache = TypeCache::default();
        let resolver = TypeResolver::new(&catalog, &cache, TIMEOUT);

        let err = resolver.resolve_type(90020).await.unwrap_err();
        assert!(matches!(err, ResolveError::Cycle { ref oids } if oids == &vec![90020, 90021]));
        assert_eq!(err.code(), DiagnosticCode::ResolveDependencyCycle);
        assert!(!cache.contains(90020));
    }

    #[tokio::test]
    async fn dependency_outside_closure_is_fatal() {
        // The array's element is unknown to the catalog.
        let catalog = MockCatalog::new().with_array(90030, "_ghost", 99000);
        let cache = TypeCache::default();
        let resolver = TypeResolver::new(&catalog, &cache, TIMEOUT);

        let err = resolver.resolve_type(90030).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::MissingDependency { oid: 90030, dependency: 99000 }
        ));
    }

    #[tokio::test]
    async fn slow_catalog_times_out() {
        let catalog = MockCatalog::new()
            .with_enum(90000, "mood", &["ok"])
            .with_latency(Duration::from_millis(200));
        let cache = TypeCache::default();
        let resolver = TypeResolver::new(&catalog, &cache, Duration::from_millis(10));

        let err = resolver.resolve_type(90000).await.unwrap_err();
        assert_eq!(err.code(), DiagnosticCode::CatalogTimeout);
    }

    #[test]
    fn materialize_orders_children_first() {
        let mut rows = BTreeMap::new();
        rows.insert(
            5,
            RawType::Array(ArrayRow {
                oid: 5,
                name: "_wrapper".into(),
                elem_oid: 9,
            }),
        );
        rows.insert(
            9,
            RawType::Composite(CompositeRow {
                oid: 9,
                name: "wrapper".into(),
                column_names: vec!["v".into()],
                column_oids: vec![oid::TEXT],
            }),
        );

        let types = materialize(rows, &TypeCache::default()).unwrap();
        assert_eq!(types[&5].to_string(), "wrapper[]");
    }
}
