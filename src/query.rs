//! Bound queries: a template plus the call that resolves and executes it.

use std::future::Future;
use std::sync::Arc;

use crate::adapter::{Adapter, Row};
use crate::error::{PlainError, PlainResult};
use crate::template::{Placeholder, Template};
use crate::value::ParamBag;

/// Define a query from SQL text.
///
/// # Example
///
/// ```
/// use plainsql::prelude::*;
///
/// let query = define_query("SELECT * FROM user WHERE id = :id");
/// let sql = query.resolve(&ParamBag::new().set("id", 1), &Postgres).unwrap();
/// assert_eq!(sql, "SELECT * FROM user WHERE id = 1");
/// ```
pub fn define_query(sql: impl Into<String>) -> Query {
    Query::new(sql)
}

/// A template bound to the call surface. Cheap to clone; clones share the
/// scanned template.
#[derive(Debug, Clone)]
pub struct Query {
    name: Option<String>,
    template: Arc<Template>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            name: None,
            template: Arc::new(Template::new(sql)),
        }
    }

    pub fn named(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(sql)
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The template text.
    pub fn sql(&self) -> &str {
        self.template.text()
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Placeholder occurrences in template order.
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.template.tokens().iter().map(|t| &t.placeholder)
    }

    /// Resolve without executing.
    pub fn resolve(&self, params: &ParamBag, adapter: &dyn Adapter) -> PlainResult<String> {
        self.template.resolve(params, adapter)
    }

    /// Resolve the template and hand the SQL to the adapter.
    ///
    /// Adapter and parameter problems fail right here, before any future
    /// exists. The returned future fails only with
    /// [`PlainError::BackendQueryFailed`], which carries the resolved SQL and
    /// the backend error.
    pub fn call<'a>(
        &self,
        params: &ParamBag,
        adapter: &'a dyn Adapter,
    ) -> PlainResult<impl Future<Output = PlainResult<Vec<Row>>> + Send + use<'a>> {
        let executor = adapter
            .executor()
            .ok_or(PlainError::MissingAdapter { capability: "query" })?;
        let sql = self.template.resolve(params, adapter)?;
        let name = self.name.clone();

        tracing::debug!(query = name.as_deref().unwrap_or("<anonymous>"), %sql, "executing");

        Ok(async move {
            let result = executor.query(&sql).await;
            result.map_err(|source| {
                tracing::warn!(
                    query = name.as_deref().unwrap_or("<anonymous>"),
                    %sql,
                    error = %source,
                    "query failed"
                );
                PlainError::BackendQueryFailed { query: sql, source }
            })
        })
    }

    /// [`Query::call`] and await in one step.
    pub async fn run(&self, params: &ParamBag, adapter: &dyn Adapter) -> PlainResult<Vec<Row>> {
        self.call(params, adapter)?.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{EchoAdapter, Executor, Postgres, QueryFuture};
    use crate::error::BoxError;
    use crate::value::Scalar;
    use std::error::Error as _;

    struct BrokenBackend;

    impl Adapter for BrokenBackend {
        fn escape(&self, value: &Scalar) -> String {
            Postgres.escape(value)
        }

        fn executor(&self) -> Option<&dyn Executor> {
            Some(self)
        }
    }

    impl Executor for BrokenBackend {
        fn query<'a>(&'a self, _sql: &'a str) -> QueryFuture<'a> {
            Box::pin(async { Err::<Vec<Row>, BoxError>("connection reset".into()) })
        }
    }

    #[tokio::test]
    async fn test_run_echoes_resolved_sql() {
        let query = define_query("SELECT * FROM user WHERE id = :id");
        let rows = query.run(&ParamBag::new().set("id", 1), &EchoAdapter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["sql"], "SELECT * FROM user WHERE id = 1");
    }

    #[test]
    fn test_escape_only_adapter_is_rejected_synchronously() {
        let query = define_query("SELECT 1");
        let err = query.call(&ParamBag::new(), &Postgres).err().unwrap();
        assert!(matches!(err, PlainError::MissingAdapter { capability: "query" }));
    }

    #[test]
    fn test_resolution_errors_are_synchronous() {
        let query = define_query("SELECT * FROM user WHERE id = :id");
        let err = query.call(&ParamBag::new(), &EchoAdapter).err().unwrap();
        assert!(matches!(err, PlainError::MissingParameters(_)));
    }

    #[tokio::test]
    async fn test_backend_failure_carries_sql() {
        let query = Query::named("get_user", "SELECT * FROM user WHERE name = :name");
        let err = query
            .run(&ParamBag::new().set("name", "john"), &BrokenBackend)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Query execution failed");
        assert_eq!(err.query(), Some("SELECT * FROM user WHERE name = 'john'"));
        assert_eq!(err.source().unwrap().to_string(), "connection reset");
    }

    #[test]
    fn test_placeholders_listed_in_order() {
        let query = define_query("UPDATE user SET :@user{name} WHERE id = :id");
        let keys: Vec<String> = query.placeholders().map(Placeholder::key).collect();
        assert_eq!(keys, vec!["@user", "id"]);
    }
}
