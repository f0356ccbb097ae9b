//! Traced database connection wrapper.
//!
//! Wraps a deadpool-postgres pool and logs all queries via tracing.

use crate::Result;
use crate::query::{Row, SqlParam, Value, pg_row_to_row};
use std::ops::Deref;
use tokio_postgres::types::ToSql;
use tracing::Instrument;

/// A traced connection pool.
///
/// Wraps a `deadpool_postgres::Pool` and returns `TracedObject` from `get()`,
/// ensuring all queries are automatically logged.
#[derive(Clone)]
pub struct TracedPool {
    inner: deadpool_postgres::Pool,
}

impl TracedPool {
    /// Create a new traced pool wrapper.
    pub fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { inner: pool }
    }

    /// Get a traced connection from the pool.
    pub async fn get(&self) -> Result<TracedObject> {
        let conn = self.inner.get().await?;
        Ok(TracedObject { inner: conn })
    }

    /// Get the inner pool (for cases where you need the raw pool).
    pub fn inner(&self) -> &deadpool_postgres::Pool {
        &self.inner
    }
}

/// A traced connection that owns the underlying connection.
///
/// All queries executed through this wrapper are logged via tracing.
pub struct TracedObject {
    inner: deadpool_postgres::Object,
}

fn bind(params: &[Value]) -> Vec<SqlParam<'_>> {
    params.iter().map(SqlParam).collect()
}

fn refs<'a>(params: &'a [SqlParam<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

impl TracedObject {
    fn client(&self) -> &tokio_postgres::Client {
        self.inner.deref()
    }

    /// Execute a statement, returning the number of rows affected.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let span = tracing::debug_span!(
            "db.execute",
            sql = %sql,
            params = params.len(),
            affected = tracing::field::Empty,
        );
        let bound = bind(params);
        let affected = self
            .client()
            .execute(sql, &refs(&bound))
            .instrument(span.clone())
            .await?;
        span.record("affected", affected);
        Ok(affected)
    }

    /// Execute a query, returning all rows.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let bound = bind(params);
        let rows = self
            .client()
            .query(sql, &refs(&bound))
            .instrument(span.clone())
            .await?;
        span.record("rows", rows.len());
        rows.iter().map(pg_row_to_row).collect()
    }

    /// Run one or more statements without parameters.
    pub async fn batch_execute(&self, sql: &str) -> Result<()> {
        let span = tracing::debug_span!("db.batch_execute", sql = %sql);
        self.client().batch_execute(sql).instrument(span).await?;
        Ok(())
    }

    /// Detach the connection from the pool so it is closed instead of reused.
    pub fn detach(self) {
        drop(deadpool_postgres::Object::take(self.inner));
    }

    /// Get the inner connection (for cases where you need the raw connection).
    pub fn inner(&self) -> &deadpool_postgres::Object {
        &self.inner
    }
}
