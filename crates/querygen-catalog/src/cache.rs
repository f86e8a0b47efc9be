//! Per-run caches of resolved types and table columns
//!
//! Both caches are append-only for the lifetime of a run: entries are never
//! evicted or replaced once inserted, so a type resolved for one query is
//! reused by every later query without another catalog round trip.
//!
//! A lock poisoned by a panicking writer is recovered rather than reported.
//! Writers only add complete entries, so the map behind it stays valid.

use querygen_core::types::known_types;
use querygen_core::{Column, ColumnKey, Oid, Type};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::warn!("recovering poisoned cache lock");
        PoisonError::into_inner(poisoned)
    })
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::warn!("recovering poisoned cache lock");
        PoisonError::into_inner(poisoned)
    })
}

/// Resolved types by OID, pre-seeded with the well-known built-ins
#[derive(Debug)]
pub struct TypeCache {
    types: RwLock<HashMap<Oid, Type>>,
}

impl TypeCache {
    /// An empty cache without the built-ins
    pub fn empty() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, oid: Oid) -> Option<Type> {
        read(&self.types).get(&oid).cloned()
    }

    pub fn contains(&self, oid: Oid) -> bool {
        read(&self.types).contains_key(&oid)
    }

    /// Insert a type unless its OID is already cached
    pub fn insert(&self, ty: Type) {
        write(&self.types).entry(ty.oid()).or_insert(ty);
    }

    pub fn extend(&self, types: impl IntoIterator<Item = Type>) {
        let mut cache = write(&self.types);
        for ty in types {
            cache.entry(ty.oid()).or_insert(ty);
        }
    }

    /// Split `oids` into cached types and the OIDs still missing
    pub fn partition(&self, oids: &[Oid]) -> (HashMap<Oid, Type>, Vec<Oid>) {
        let mut found = HashMap::new();
        let mut missing = Vec::new();

        let types = read(&self.types);
        for &oid in oids {
            match types.get(&oid) {
                Some(ty) => {
                    found.insert(oid, ty.clone());
                }
                None if !missing.contains(&oid) => missing.push(oid),
                None => {}
            }
        }

        (found, missing)
    }

    pub fn len(&self) -> usize {
        read(&self.types).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TypeCache {
    fn default() -> Self {
        let cache = Self::empty();
        cache.extend(known_types());
        cache
    }
}

/// Table columns by (table OID, attribute number)
#[derive(Debug, Default)]
pub struct ColumnCache {
    columns: RwLock<HashMap<ColumnKey, Column>>,
}

impl ColumnCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: ColumnKey) -> Option<Column> {
        read(&self.columns).get(&key).cloned()
    }

    pub fn contains(&self, key: ColumnKey) -> bool {
        read(&self.columns).contains_key(&key)
    }

    /// Insert a column unless its key is already cached
    pub fn insert(&self, column: Column) {
        write(&self.columns).entry(column.key()).or_insert(column);
    }

    /// Keys from `keys` that are not cached, deduplicated, in input order
    pub fn missing(&self, keys: &[ColumnKey]) -> Vec<ColumnKey> {
        let columns = read(&self.columns);
        let mut missing: Vec<ColumnKey> = Vec::new();
        for &key in keys {
            if !columns.contains_key(&key) && !missing.contains(&key) {
                missing.push(key);
            }
        }
        missing
    }

    pub fn len(&self) -> usize {
        read(&self.columns).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The caches of one run
#[derive(Debug, Default)]
pub struct Caches {
    pub types: TypeCache,
    pub columns: ColumnCache,
}

impl Caches {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnFetcher;
    use crate::mock::MockCatalog;
    use crate::resolver::TypeResolver;
    use querygen_core::types::oid;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn type_cache_is_seeded_with_builtins() {
        let cache = TypeCache::default();
        assert_eq!(cache.get(oid::TEXT), Some(Type::text()));
        assert_eq!(cache.get(oid::VOID), Some(Type::Void));
        assert!(cache.contains(oid::INT4_ARRAY));
        assert!(TypeCache::empty().is_empty());
    }

    #[test]
    fn type_cache_never_replaces_entries() {
        let cache = TypeCache::empty();
        cache.insert(Type::base(90000, "first"));
        cache.insert(Type::base(90000, "second"));
        assert_eq!(cache.get(90000).unwrap().name(), "first");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn partition_deduplicates_misses() {
        let cache = TypeCache::default();
        let (found, missing) = cache.partition(&[oid::TEXT, 90001, 90001, oid::INT4]);
        assert_eq!(found.len(), 2);
        assert_eq!(missing, vec![90001]);
    }

    #[test]
    fn column_cache_missing_keys() {
        let cache = ColumnCache::new();
        cache.insert(Column {
            name: "id".into(),
            table_oid: 16384,
            table_name: "author".into(),
            order: 1,
            ty: Type::base(oid::INT4, "int4"),
            nullable: false,
        });

        let keys = [ColumnKey::new(16384, 1), ColumnKey::new(16384, 2), ColumnKey::new(16384, 2)];
        assert_eq!(cache.missing(&keys), vec![ColumnKey::new(16384, 2)]);
        assert_eq!(cache.get(ColumnKey::new(16384, 1)).unwrap().name, "id");
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let cache = TypeCache::empty();
        cache.insert(Type::base(90000, "before"));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = cache.types.write().unwrap();
            panic!("writer panicked");
        }));
        assert!(result.is_err());
        assert!(cache.types.is_poisoned());

        cache.insert(Type::base(90001, "after"));
        let (found, missing) = cache.partition(&[90000, 90001, 90002]);
        assert_eq!(found.len(), 2);
        assert_eq!(missing, vec![90002]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shared_caches_across_parallel_tasks() {
        let catalog = MockCatalog::new()
            .with_latency(Duration::from_millis(5))
            .with_enum(90000, "mood", &["sad", "happy"])
            .with_composite(90100, "entry", &[("mood", 90000), ("note", oid::TEXT)])
            .with_array(90200, "_entry", 90100)
            .with_table(16384, "diary", &[("id", oid::INT4, true), ("entries", 90200, false)]);
        let caches = Arc::new(Caches::new());
        let seeded = caches.types.len();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let catalog = catalog.clone();
            let caches = Arc::clone(&caches);
            handles.push(tokio::spawn(async move {
                let timeout = Duration::from_secs(5);
                let resolver = TypeResolver::new(&catalog, &caches.types, timeout);
                let fetcher = ColumnFetcher::new(&catalog, &caches.columns, timeout);

                let columns = fetcher
                    .fetch_columns(&[ColumnKey::new(16384, 1), ColumnKey::new(16384, 2)], &resolver)
                    .await
                    .unwrap();
                let types = resolver.resolve_types(&[90200, 90100, 90000]).await.unwrap();
                let mut types: Vec<(Oid, Type)> = types.into_iter().collect();
                types.sort_by_key(|(oid, _)| *oid);
                (columns, types)
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let first = &results[0];
        assert!(results.iter().all(|r| r == first));
        assert_eq!(first.1.len(), 3);
        assert_eq!(first.0[1].ty.name(), "_entry");
        assert_eq!(caches.types.len(), seeded + 3);
        assert_eq!(caches.columns.len(), 2);
    }
}
