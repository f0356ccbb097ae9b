//! In-memory executor for unit tests.

use crate::Result;
use crate::executor::{Executor, QueryFuture};
use crate::query::{Row, Value};
use std::sync::Mutex;

type Handler = Box<dyn Fn(&str, &[Value]) -> Result<Vec<Row>> + Send + Sync>;

/// Answers every query through a closure and records what it was asked.
pub(crate) struct FakeExecutor {
    handler: Handler,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl FakeExecutor {
    pub fn new(
        handler: impl Fn(&str, &[Value]) -> Result<Vec<Row>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of statements sent so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Every statement sent so far, in order.
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        (self.handler)(sql, params)
    }
}

impl Executor for FakeExecutor {
    fn select_many<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> QueryFuture<'a, Vec<Row>> {
        Box::pin(async move {
            // Let concurrent callers interleave the way they would on a real pool.
            tokio::task::yield_now().await;
            self.answer(sql, params)
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
                return Ok(None);
            }
            let rows = self.answer(sql, params)?;
            Ok(Some(rows.len() as u64))
        })
    }
}

/// Build a row from name/value pairs.
pub(crate) fn row<const N: usize>(pairs: [(&str, Value); N]) -> Row {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// An executor that fails the test if it is ever asked anything.
pub(crate) fn unreachable_executor() -> FakeExecutor {
    FakeExecutor::new(|sql, _| panic!("unexpected query: {}", sql))
}
