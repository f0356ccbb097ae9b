//! Deletion order from foreign keys.
//!
//! A table can be emptied once every table that references it has been
//! emptied. Tables are released in rounds:
//!
//! ```text
//! user <- post <- comment
//!
//! round 1: comment       (nothing references it)
//! round 2: post          (its only referrer is gone)
//! round 3: user
//! ```
//!
//! Tables caught in a reference cycle are never released. They are appended
//! at the end in input order and reported in [`DeletionOrder::cyclic`].

use crate::catalog::{Catalog, ConstraintDescriptor, ConstraintKind};
use crate::executor::Executor;
use crate::Result;
use std::collections::HashSet;

/// Result of [`deletion_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOrder {
    /// Every input table exactly once, referencing tables before the tables
    /// they reference.
    pub tables: Vec<String>,
    /// Tables appended without a valid position because of a reference cycle.
    pub cyclic: Vec<String>,
}

impl DeletionOrder {
    /// Whether every table was placed by the foreign-key rule.
    pub fn is_complete(&self) -> bool {
        self.cyclic.is_empty()
    }
}

/// Order `tables` so that deleting from them in sequence never violates a
/// foreign key from `foreign_keys`.
///
/// Within a round, tables keep their input order. Self-references and
/// references to tables outside `tables` do not constrain the order.
pub fn deletion_order(tables: &[String], foreign_keys: &[ConstraintDescriptor]) -> DeletionOrder {
    let known: HashSet<&str> = tables.iter().map(String::as_str).collect();

    // (referenced, referencing)
    let mut edges: Vec<(&str, &str)> = Vec::new();
    for fk in foreign_keys {
        if fk.kind != ConstraintKind::Foreign {
            continue;
        }
        let Some(referenced) = fk.foreign_table.as_deref() else {
            continue;
        };
        let referencing = fk.table.as_str();
        if referenced == referencing || !known.contains(referenced) || !known.contains(referencing)
        {
            continue;
        }
        edges.push((referenced, referencing));
    }

    let mut released: HashSet<&str> = HashSet::new();
    let mut ordered: Vec<String> = Vec::with_capacity(tables.len());

    loop {
        // Judged against the state at the start of the round.
        let blocked: HashSet<&str> = edges
            .iter()
            .filter(|(_, referencing)| !released.contains(referencing))
            .map(|(referenced, _)| *referenced)
            .collect();

        let round: Vec<&str> = tables
            .iter()
            .map(String::as_str)
            .filter(|t| !released.contains(t) && !blocked.contains(t))
            .collect();

        if round.is_empty() {
            break;
        }
        for table in round {
            if released.insert(table) {
                ordered.push(table.to_string());
            }
        }
    }

    let mut cyclic: Vec<String> = Vec::new();
    for table in tables {
        if released.insert(table.as_str()) {
            cyclic.push(table.clone());
        }
    }

    if !cyclic.is_empty() {
        tracing::warn!(
            tables = ?cyclic,
            "foreign keys form a cycle, appending tables in listing order"
        );
        ordered.extend(cyclic.iter().cloned());
    }

    DeletionOrder {
        tables: ordered,
        cyclic,
    }
}

impl<E: Executor + ?Sized> Catalog<'_, E> {
    /// Deletion order for every table of a schema.
    pub async fn deletion_order(&self, schema: &str) -> Result<DeletionOrder> {
        let (tables, fks) = tokio::try_join!(
            self.list_tables(schema, None),
            self.list_constraints(schema, None, &ConstraintKind::Foreign.into()),
        )?;
        let names: Vec<String> = tables.into_iter().map(|t| t.name).collect();
        Ok(deletion_order(&names, &fks))
    }
}
