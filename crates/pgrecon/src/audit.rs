//! Dangling-reference audit for references the schema does not enforce.
//!
//! Applications often link tables by naming convention (`user_id` points at
//! `user`) without a foreign key. The audit finds every table carrying such a
//! column and counts the rows whose value matches no parent row.

use crate::catalog::Catalog;
use crate::executor::Executor;
use crate::query::RowExt;
use crate::{Error, Result};
use futures::future::try_join_all;
use pgrecon_config::TableReferences;
use pgrecon_sql::{Ident, Qualified, validate_ident};

/// Reference health of one child column.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceAuditRow {
    pub parent: String,
    pub child: String,
    pub column: String,
    pub total: i64,
    pub dangling: i64,
    /// `dangling` as a share of `total`, 0 for an empty child.
    pub percent: f64,
}

pub struct ReferenceAudit<'a, E: Executor + ?Sized> {
    catalog: Catalog<'a, E>,
    schema: String,
}

impl<'a, E: Executor + ?Sized> ReferenceAudit<'a, E> {
    pub fn new(catalog: Catalog<'a, E>, schema: impl Into<String>) -> Self {
        Self {
            catalog,
            schema: schema.into(),
        }
    }

    /// Audit every configured parent and reference column, in configuration order.
    pub async fn run(&self, references: &TableReferences) -> Result<Vec<ReferenceAuditRow>> {
        validate_ident(&self.schema)?;
        let mut rows = Vec::new();
        for (parent, columns) in &references.tables {
            validate_ident(parent)?;
            let primary_key = self.parent_key(parent).await?;
            for column in columns {
                validate_ident(column)?;
                let children: Vec<String> = self
                    .catalog
                    .list_tables(&self.schema, Some(column))
                    .await?
                    .into_iter()
                    .filter(|t| !t.is_partition)
                    .map(|t| t.name)
                    .filter(|name| name != parent && !references.ignore.contains(name))
                    .collect();

                let audited = try_join_all(
                    children
                        .iter()
                        .map(|child| self.audit_child(parent, &primary_key, child, column)),
                )
                .await?;
                rows.extend(audited);
            }
        }
        Ok(rows)
    }

    async fn parent_key(&self, parent: &str) -> Result<String> {
        let mut columns = self.catalog.primary_key(&self.schema, parent).await?;
        if columns.len() != 1 {
            return Err(Error::NoPrimaryKey {
                table: parent.to_string(),
            });
        }
        Ok(columns.remove(0))
    }

    async fn audit_child(
        &self,
        parent: &str,
        primary_key: &str,
        child: &str,
        column: &str,
    ) -> Result<ReferenceAuditRow> {
        let sql = format!(
            "select count(*) as total, \
             count(*) filter (where c.{col} is not null and not exists \
             (select 1 from {parent} p where p.{pk}::text = c.{col}::text)) as dangling \
             from {child} c",
            col = Ident(column),
            pk = Ident(primary_key),
            parent = Qualified(&self.schema, parent),
            child = Qualified(&self.schema, child),
        );
        let row = self.catalog.executor().select_one(&sql, &[]).await?;
        let total = row.int("total")?;
        let dangling = row.int("dangling")?;
        let percent = if total == 0 {
            0.0
        } else {
            dangling as f64 * 100.0 / total as f64
        };

        if dangling > 0 {
            tracing::warn!(parent, child, column, dangling, "dangling references");
        }
        Ok(ReferenceAuditRow {
            parent: parent.to_string(),
            child: child.to_string(),
            column: column.to_string(),
            total,
            dangling,
            percent,
        })
    }
}
