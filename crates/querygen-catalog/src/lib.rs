//! Catalog access and type resolution
//!
//! This crate talks to the catalog database on behalf of inference:
//! - The [`Catalog`] trait describes statements and reads type metadata
//! - [`TypeResolver`] turns type OIDs into fully resolved types
//! - [`ColumnFetcher`] reads NOT NULL and type information for table columns
//! - [`Caches`] keeps everything resolved during a run
//!
//! ## Features
//!
//! - `postgres` (default) - [`PostgresCatalog`] backed by `tokio-postgres`
//!
//! ## Example
//!
//! ```rust,ignore
//! use querygen_catalog::{Caches, PostgresCatalog, TypeResolver};
//!
//! let catalog = PostgresCatalog::from_connection_string(&url).await?;
//! let caches = Caches::new();
//! let resolver = TypeResolver::new(&catalog, &caches.types, config.catalog_timeout());
//! let ty = resolver.resolve_type(oid).await?;
//! ```

pub mod catalog;
pub mod cache;
pub mod resolver;
pub mod columns;
pub mod mock;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use catalog::{
    round_trip, ArrayRow, Catalog, CatalogError, ColumnRow, CompositeRow, DomainRow, EnumRow, Field,
    StatementDescription, UnknownRow,
};
pub use cache::{Caches, ColumnCache, TypeCache};
pub use resolver::{ResolveError, TypeResolver};
pub use columns::{columns_query, ColumnFetcher};
pub use mock::{CallCounts, MockCatalog};

#[cfg(feature = "postgres")]
pub use postgres::PostgresCatalog;
