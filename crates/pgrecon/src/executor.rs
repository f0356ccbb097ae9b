//! Query execution.
//!
//! Everything above this module talks to the database through [`Executor`],
//! which speaks in runtime [`Value`]s and [`Row`]s so the catalog and the
//! consolidation engine never see driver types.

use crate::cursor::RowCursor;
use crate::query::{Row, Value};
use crate::traced::TracedPool;
use crate::{Error, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::future::Future;
use std::pin::Pin;
use tokio_postgres::NoTls;

/// Boxed future returned by [`Executor`] methods.
pub type QueryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Something that can run SQL and hand back rows.
pub trait Executor: Send + Sync {
    /// Run a query, returning all rows.
    fn select_many<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> QueryFuture<'a, Vec<Row>>;

    /// Run a statement, returning the number of rows affected.
    ///
    /// With `dry_run` the statement is logged and not sent; the result is `None`.
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        dry_run: bool,
    ) -> QueryFuture<'a, Option<u64>>;

    /// Run a query that must return exactly one row.
    fn select_one<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> QueryFuture<'a, Row> {
        Box::pin(async move {
            let mut rows = self.select_many(sql, params).await?;
            if rows.len() != 1 {
                return Err(Error::NotFound {
                    expected: "exactly one row",
                    got: rows.len(),
                });
            }
            Ok(rows.remove(0))
        })
    }

    /// Run a query that returns zero or one row.
    fn select_optional<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
    ) -> QueryFuture<'a, Option<Row>> {
        Box::pin(async move {
            let mut rows = self.select_many(sql, params).await?;
            match rows.len() {
                0 => Ok(None),
                1 => Ok(Some(rows.remove(0))),
                got => Err(Error::NotFound {
                    expected: "at most one row",
                    got,
                }),
            }
        })
    }

    /// Stream the rows of a query in batches of `batch_size`.
    ///
    /// The default runs the query once and serves the rows from memory.
    fn select_stream<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        _batch_size: u32,
    ) -> QueryFuture<'a, RowCursor> {
        Box::pin(async move {
            let rows = self.select_many(sql, params).await?;
            Ok(RowCursor::from_rows(rows))
        })
    }
}

/// A pooled Postgres executor.
#[derive(Clone)]
pub struct PgExecutor {
    pool: TracedPool,
}

impl PgExecutor {
    /// Build a pool of at most `pool_size` connections and check that it can
    /// reach the server.
    pub async fn connect(url: &str, pool_size: usize) -> Result<Self> {
        let pg_config: tokio_postgres::Config = url.parse()?;
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(pool_size)
            .build()
            .map_err(|e| Error::CreatePool(e.to_string()))?;

        let executor = Self::from_pool(pool);
        executor.pool.get().await?.batch_execute("select 1").await?;
        tracing::debug!(pool_size, "connected to postgres");
        Ok(executor)
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool: TracedPool::new(pool),
        }
    }

    pub fn pool(&self) -> &TracedPool {
        &self.pool
    }
}

impl Executor for PgExecutor {
    fn select_many<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> QueryFuture<'a, Vec<Row>> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            conn.query(sql, params).await
        })
    }

    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        dry_run: bool,
    ) -> QueryFuture<'a, Option<u64>> {
        Box::pin(async move {
            if dry_run {
                tracing::info!(sql = %sql, params = params.len(), "dry run, not executing");
                return Ok(None);
            }
            let conn = self.pool.get().await?;
            conn.execute(sql, params).await.map(Some)
        })
    }

    fn select_stream<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        batch_size: u32,
    ) -> QueryFuture<'a, RowCursor> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            RowCursor::open(conn, sql, params, batch_size).await
        })
    }
}
