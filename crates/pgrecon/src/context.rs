//! Process-wide state, held explicitly.

use crate::attribute::AttributeResolver;
use crate::catalog::Catalog;
use crate::executor::{Executor, PgExecutor};
use crate::Result;
use std::collections::HashMap;
use std::sync::Mutex;

/// Default number of pooled connections per database.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Memoizing factory for executors, keyed by a logical database name.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: Mutex<HashMap<String, PgExecutor>>,
}

impl ExecutorRegistry {
    /// The executor registered under `key`, connecting to `url` the first
    /// time the key is used.
    pub async fn get_or_connect(&self, key: &str, url: &str, pool_size: usize) -> Result<PgExecutor> {
        if let Some(exec) = self.get(key) {
            return Ok(exec);
        }
        let exec = PgExecutor::connect(url, pool_size).await?;
        // Another task may have connected meanwhile; the first one registered wins.
        let mut executors = self.executors.lock().unwrap_or_else(|e| e.into_inner());
        Ok(executors.entry(key.to_string()).or_insert(exec).clone())
    }

    pub fn get(&self, key: &str) -> Option<PgExecutor> {
        self.executors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: impl Into<String>, exec: PgExecutor) {
        self.executors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), exec);
    }
}

/// Shared caches for one process: the attribute cache and the executor registry.
#[derive(Default)]
pub struct Context {
    attributes: AttributeResolver,
    executors: ExecutorRegistry,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attributes(&self) -> &AttributeResolver {
        &self.attributes
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.executors
    }

    /// Catalog queries through `exec`, sharing this context's attribute cache.
    pub fn catalog<'a, E: Executor + ?Sized>(&'a self, exec: &'a E) -> Catalog<'a, E> {
        Catalog::new(exec, &self.attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::attribute_row;
    use crate::fake::FakeExecutor;

    #[tokio::test]
    async fn test_catalogs_share_the_attribute_cache() {
        let exec = FakeExecutor::new(|_, params| Ok(attribute_row(params)));
        let ctx = Context::new();

        let first = ctx.attributes().resolve(&exec, 1, 2).await.unwrap();
        let catalog = ctx.catalog(&exec);
        let again = ctx.attributes().resolve(catalog.executor(), 1, 2).await.unwrap();

        assert_eq!(first, again);
        assert_eq!(first.name, "email");
        assert_eq!(exec.call_count(), 1);
        assert!(ctx.executors().get("main").is_none());
    }
}
