//! Server-side cursors for streaming large tables.

use crate::Result;
use crate::query::{Row, Value};
use crate::traced::TracedObject;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

static CURSOR_SEQ: AtomicU64 = AtomicU64::new(0);

/// Rows of a query, delivered in batches.
///
/// A cursor opened by [`PgExecutor`](crate::PgExecutor) holds a pooled
/// connection with an open transaction for as long as it lives. Call
/// [`close`](Self::close) when done; dropping an unclosed cursor rolls the
/// transaction back on a spawned task before the connection is reused.
pub struct RowCursor {
    buffer: VecDeque<Row>,
    portal: Option<Portal>,
}

struct Portal {
    conn: Option<TracedObject>,
    name: String,
    batch_size: u32,
    exhausted: bool,
}

impl RowCursor {
    /// A cursor over rows already in memory.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            buffer: rows.into(),
            portal: None,
        }
    }

    /// Declare a cursor for `sql` on `conn` inside a new transaction.
    pub(crate) async fn open(
        conn: TracedObject,
        sql: &str,
        params: &[Value],
        batch_size: u32,
    ) -> Result<Self> {
        let name = format!("pgrecon_cursor_{}", CURSOR_SEQ.fetch_add(1, Ordering::Relaxed));
        let portal = Portal {
            conn: Some(conn),
            name,
            batch_size: batch_size.max(1),
            exhausted: false,
        };

        // From here on, an early return drops the portal and rolls back.
        let conn = portal.conn()?;
        conn.batch_execute("begin").await?;
        conn.execute(
            &format!("declare {} no scroll cursor for {}", portal.name, sql),
            params,
        )
        .await?;

        tracing::debug!(cursor = %portal.name, batch_size = portal.batch_size, "cursor opened");
        Ok(Self {
            buffer: VecDeque::new(),
            portal: Some(portal),
        })
    }

    /// The next row, fetching another batch from the server when the buffer
    /// runs dry.
    pub async fn next(&mut self) -> Result<Option<Row>> {
        if self.buffer.is_empty() {
            if let Some(portal) = self.portal.as_mut() {
                if !portal.exhausted {
                    let rows = portal.fetch().await?;
                    self.buffer.extend(rows);
                }
            }
        }
        Ok(self.buffer.pop_front())
    }

    /// Finish the cursor, committing its transaction.
    pub async fn close(mut self) -> Result<()> {
        self.buffer.clear();
        if let Some(mut portal) = self.portal.take() {
            if let Some(conn) = portal.conn.take() {
                let committed = conn
                    .batch_execute(&format!("close {}; commit", portal.name))
                    .await;
                if let Err(e) = committed {
                    conn.detach();
                    return Err(e);
                }
                tracing::debug!(cursor = %portal.name, "cursor closed");
            }
        }
        Ok(())
    }
}

impl Portal {
    fn conn(&self) -> Result<&TracedObject> {
        self.conn.as_ref().ok_or_else(|| {
            crate::Error::SchemaInconsistency(format!("cursor {} is already closed", self.name))
        })
    }

    async fn fetch(&mut self) -> Result<Vec<Row>> {
        let sql = format!("fetch forward {} from {}", self.batch_size, self.name);
        let rows = self.conn()?.query(&sql, &[]).await?;
        if rows.len() < self.batch_size as usize {
            self.exhausted = true;
        }
        Ok(rows)
    }
}

impl Drop for Portal {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let rolled_back = conn.batch_execute("rollback").await;
                    if let Err(e) = rolled_back {
                        tracing::warn!(cursor = %name, error = %e, "rollback of abandoned cursor failed");
                        conn.detach();
                    }
                });
            }
            Err(_) => {
                tracing::warn!(cursor = %name, "cursor dropped outside a runtime, discarding connection");
                conn.detach();
            }
        }
    }
}
