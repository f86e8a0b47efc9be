//! Query type inference
//!
//! [`Inferrer`] asks the catalog database to describe and plan each query,
//! then resolves every parameter and output type through the run's caches.
//! A query either gets complete types or fails; nothing is guessed.

use crate::nullability::infer_nullability;
use crate::plan::{parse_plan, PlanError};
use querygen_catalog::{
    round_trip, Caches, Catalog, CatalogError, ColumnFetcher, Field, ResolveError, TypeResolver,
};
use querygen_core::{
    Column, ColumnKey, Config, Diagnostic, DiagnosticCode, InputParam, Location, Oid, OutputColumn,
    Type, TypedQuery,
};
use querygen_sql::{File, Query, SourceQuery};
use std::collections::HashMap;
use std::time::Duration;

/// Why a single query could not be typed
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("query declares {declared} parameter(s) but the catalog describes {described}")]
    ParamMismatch { declared: usize, described: usize },
}

impl QueryError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::Catalog(e) => e.code(),
            Self::Resolve(e) => e.code(),
            Self::Plan(_) => DiagnosticCode::CatalogQueryFailed,
            Self::ParamMismatch { .. } => DiagnosticCode::CatalogParamMismatch,
        }
    }
}

/// Errors that can occur inferring a file's queries
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("query {name}: {source}")]
    Query {
        name: String,
        #[source]
        source: QueryError,
    },

    #[error("{file}:{line}: malformed query cannot be inferred")]
    BadQuery { file: String, line: usize },
}

impl InferenceError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::Query { source, .. } => source.code(),
            Self::BadQuery { .. } => DiagnosticCode::ParseBadQuery,
        }
    }

    pub fn to_diagnostic(&self, file: &str) -> Diagnostic {
        match self {
            Self::Query { name, source } => Diagnostic::error(source.code(), source.to_string())
                .with_location(Location::new(file))
                .with_query(name.clone()),
            Self::BadQuery { line, .. } => Diagnostic::error(self.code(), self.to_string())
                .with_location(Location::with_position(file, *line, 1)),
        }
    }
}

/// Infers typed queries against a catalog
pub struct Inferrer<'a> {
    catalog: &'a dyn Catalog,
    caches: &'a Caches,
    timeout: Duration,
}

impl<'a> Inferrer<'a> {
    pub fn new(catalog: &'a dyn Catalog, caches: &'a Caches, timeout: Duration) -> Self {
        Self {
            catalog,
            caches,
            timeout,
        }
    }

    pub fn from_config(catalog: &'a dyn Catalog, caches: &'a Caches, config: &Config) -> Self {
        Self::new(catalog, caches, config.catalog_timeout())
    }

    /// Infer every query of a file, stopping at the first failure
    pub async fn infer_file(&self, file: &File) -> Result<Vec<TypedQuery>, InferenceError> {
        let mut typed = Vec::with_capacity(file.queries.len());
        for query in &file.queries {
            match query {
                Query::Bad(bad) => {
                    return Err(InferenceError::BadQuery {
                        file: file.name.clone(),
                        line: bad.range.start.line,
                    })
                }
                Query::Source(query) => typed.push(self.infer(query).await?),
            }
        }
        Ok(typed)
    }

    pub async fn infer(&self, query: &SourceQuery) -> Result<TypedQuery, InferenceError> {
        tracing::debug!(query = %query.name, "inferring query");
        self.infer_query(query)
            .await
            .map_err(|source| InferenceError::Query {
                name: query.name.clone(),
                source,
            })
    }

    async fn infer_query(&self, query: &SourceQuery) -> Result<TypedQuery, QueryError> {
        let resolver = TypeResolver::new(self.catalog, &self.caches.types, self.timeout);
        let fetcher = ColumnFetcher::new(self.catalog, &self.caches.columns, self.timeout);

        let description = round_trip(
            "describe",
            self.timeout,
            self.catalog.describe(&query.prepared_sql),
        )
        .await?;

        if description.params.len() != query.param_names.len() {
            return Err(QueryError::ParamMismatch {
                declared: query.param_names.len(),
                described: description.params.len(),
            });
        }

        let explained = round_trip(
            "explain",
            self.timeout,
            self.catalog.explain(&query.prepared_sql, &description.params),
        )
        .await?;
        let plan = parse_plan(&explained)?;
        let top = plan.classify()?;
        let tag = plan.command_tag()?;

        let keys: Vec<ColumnKey> = description.columns.iter().filter_map(Field::column_key).collect();
        let columns: HashMap<ColumnKey, Column> = fetcher
            .fetch_columns(&keys, &resolver)
            .await?
            .into_iter()
            .map(|c| (c.key(), c))
            .collect();
        let field_columns: Vec<Option<&Column>> = description
            .columns
            .iter()
            .map(|f| f.column_key().and_then(|key| columns.get(&key)))
            .collect();
        let nullable = infer_nullability(&plan, &top, &field_columns);

        let mut oids: Vec<Oid> = description.params.clone();
        oids.extend(description.columns.iter().map(|f| f.type_oid));
        let types = resolver.resolve_types(&oids).await?;
        let type_of = |oid: Oid| -> Result<Type, QueryError> {
            types.get(&oid).cloned().ok_or_else(|| {
                QueryError::Resolve(ResolveError::Unresolved {
                    count: 1,
                    oids: vec![oid],
                })
            })
        };

        let mut inputs = Vec::with_capacity(query.param_names.len());
        for (name, &oid) in query.param_names.iter().zip(&description.params) {
            inputs.push(InputParam {
                name: name.clone(),
                default_value: None,
                ty: type_of(oid)?,
            });
        }

        let mut outputs = Vec::with_capacity(description.columns.len());
        for (field, nullable) in description.columns.iter().zip(nullable) {
            let ty = type_of(field.type_oid)?;
            if ty.is_void() {
                continue;
            }
            outputs.push(OutputColumn {
                name: field.name.clone(),
                ty,
                nullable,
            });
        }

        tracing::info!(
            query = %query.name,
            %tag,
            inputs = inputs.len(),
            outputs = outputs.len(),
            "inferred query"
        );

        Ok(TypedQuery {
            name: query.name.clone(),
            tag,
            result_kind: query.result_kind,
            doc_comment: query.doc_comment.clone(),
            prepared_sql: query.prepared_sql.clone(),
            inputs,
            outputs,
            proto_type: query.pragmas.proto_type.clone(),
        })
    }
}
