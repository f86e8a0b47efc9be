//! Table column metadata for output fields

use crate::cache::ColumnCache;
use crate::catalog::{round_trip, Catalog};
use crate::resolver::{ResolveError, TypeResolver};
use querygen_core::{Column, ColumnKey, Oid};
use std::fmt::Write;
use std::time::Duration;

/// Catalog query returning every column named by `keys`
///
/// Key `i` binds the table OID to `$2i+1` and the attribute number to
/// `$2i+2`, so the parameters are the keys flattened in order.
pub fn columns_query(keys: &[ColumnKey]) -> String {
    let mut sql = String::from(
        "SELECT cls.oid::int8, cls.relname::text, attr.attnum, attr.attname::text, \
         attr.atttypid::int8, attr.attnotnull\n\
         FROM pg_catalog.pg_class cls\n\
         JOIN pg_catalog.pg_attribute attr ON attr.attrelid = cls.oid\n\
         WHERE ",
    );

    if keys.is_empty() {
        sql.push_str("false");
        return sql;
    }

    for i in 0..keys.len() {
        if i > 0 {
            sql.push_str("\n   OR ");
        }
        let _ = write!(sql, "(cls.oid = ${} AND attr.attnum = ${})", 2 * i + 1, 2 * i + 2);
    }
    sql
}

/// Fetches table columns through a [`ColumnCache`]
pub struct ColumnFetcher<'a> {
    catalog: &'a dyn Catalog,
    cache: &'a ColumnCache,
    timeout: Duration,
}

impl<'a> ColumnFetcher<'a> {
    pub fn new(catalog: &'a dyn Catalog, cache: &'a ColumnCache, timeout: Duration) -> Self {
        Self {
            catalog,
            cache,
            timeout,
        }
    }

    /// Columns for `keys`, in the same order
    ///
    /// Uncached keys are fetched in a single catalog query whatever tables
    /// they belong to.
    pub async fn fetch_columns(
        &self,
        keys: &[ColumnKey],
        resolver: &TypeResolver<'_>,
    ) -> Result<Vec<Column>, ResolveError> {
        let missing = self.cache.missing(keys);

        if !missing.is_empty() {
            tracing::debug!(
                requested = keys.len(),
                missing = missing.len(),
                "fetching columns"
            );

            let rows = round_trip("find_columns", self.timeout, self.catalog.find_columns(&missing)).await?;
            let oids: Vec<Oid> = rows.iter().map(|r| r.type_oid).collect();
            let types = resolver.resolve_types(&oids).await?;

            for row in rows {
                let Some(ty) = types.get(&row.type_oid).cloned() else {
                    return Err(ResolveError::Unresolved {
                        count: 1,
                        oids: vec![row.type_oid],
                    });
                };
                self.cache.insert(Column {
                    name: row.name,
                    table_oid: row.table_oid,
                    table_name: row.table_name,
                    order: row.order,
                    ty,
                    nullable: !row.not_null,
                });
            }
        }

        keys.iter()
            .map(|&key| self.cache.get(key).ok_or(ResolveError::MissingColumn { key }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Caches;
    use crate::mock::MockCatalog;
    use pretty_assertions::assert_eq;
    use querygen_core::types::oid;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn author_catalog() -> MockCatalog {
        MockCatalog::new()
            .with_table(
                16384,
                "author",
                &[("author_id", oid::INT4, true), ("first_name", oid::TEXT, false)],
            )
            .with_enum(90000, "genre", &["fiction"])
            .with_table(16400, "book", &[("genre", 90000, true)])
    }

    #[test]
    fn query_is_a_disjunction_over_all_keys() {
        let sql = columns_query(&[ColumnKey::new(1, 1), ColumnKey::new(2, 3)]);
        assert!(sql.ends_with(
            "WHERE (cls.oid = $1 AND attr.attnum = $2)\n   OR (cls.oid = $3 AND attr.attnum = $4)"
        ));
        assert!(columns_query(&[]).ends_with("WHERE false"));
    }

    #[tokio::test]
    async fn fetches_columns_across_tables_in_caller_order() {
        let catalog = author_catalog();
        let caches = Caches::new();
        let resolver = TypeResolver::new(&catalog, &caches.types, TIMEOUT);
        let fetcher = ColumnFetcher::new(&catalog, &caches.columns, TIMEOUT);

        let keys = [ColumnKey::new(16400, 1), ColumnKey::new(16384, 2), ColumnKey::new(16384, 1)];
        let columns = fetcher.fetch_columns(&keys, &resolver).await.unwrap();

        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["genre", "first_name", "author_id"]);
        assert_eq!(columns[0].ty.name(), "genre");
        assert!(columns[1].nullable);
        assert!(!columns[2].nullable);
        assert_eq!(columns[2].table_name, "author");
        assert_eq!(catalog.calls().columns, 1);
    }

    #[tokio::test]
    async fn cached_columns_skip_the_catalog() {
        let catalog = author_catalog();
        let caches = Caches::new();
        let resolver = TypeResolver::new(&catalog, &caches.types, TIMEOUT);
        let fetcher = ColumnFetcher::new(&catalog, &caches.columns, TIMEOUT);

        let keys = [ColumnKey::new(16384, 1)];
        fetcher.fetch_columns(&keys, &resolver).await.unwrap();
        let before = catalog.calls().total();
        fetcher.fetch_columns(&keys, &resolver).await.unwrap();
        assert_eq!(catalog.calls().total(), before);
    }

    #[tokio::test]
    async fn missing_column_is_fatal() {
        let catalog = author_catalog();
        let caches = Caches::new();
        let resolver = TypeResolver::new(&catalog, &caches.types, TIMEOUT);
        let fetcher = ColumnFetcher::new(&catalog, &caches.columns, TIMEOUT);

        let err = fetcher
            .fetch_columns(&[ColumnKey::new(16384, 1), ColumnKey::new(16384, 9)], &resolver)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingColumn { key } if key == ColumnKey::new(16384, 9)));
    }
}
