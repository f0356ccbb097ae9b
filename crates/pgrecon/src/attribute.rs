//! Memoized `(relation id, attribute position) → column` lookups.

use crate::executor::Executor;
use crate::query::{RowExt, Value};
use crate::{Error, Result};
use facet::Facet;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// A column of a relation, as recorded in `pg_attribute`.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct AttributeDescriptor {
    pub relation_id: i64,
    pub position: i16,
    pub name: String,
    pub type_name: String,
}

type Slot = Arc<OnceCell<AttributeDescriptor>>;

/// Cache of attribute descriptors.
///
/// Each key gets one slot, and concurrent callers for the same key wait on
/// that slot, so at most one catalog query runs per key. A failed lookup
/// leaves the slot empty for the next caller to retry.
#[derive(Default)]
pub struct AttributeResolver {
    slots: Mutex<HashMap<(i64, i16), Slot>>,
}

const ATTRIBUTE_SQL: &str = "select attrelid::int8 as relation_id, attnum::int4 as position, \
     attname::text as name, format_type(atttypid, atttypmod) as type_name \
     from pg_attribute where attrelid = $1::int8::oid and attnum = $2::int4";

impl AttributeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve one attribute, querying the catalog on first use of the key.
    pub async fn resolve<E: Executor + ?Sized>(
        &self,
        exec: &E,
        relation_id: i64,
        position: i16,
    ) -> Result<AttributeDescriptor> {
        let slot = self.slot(relation_id, position);
        let descriptor = slot
            .get_or_try_init(|| load(exec, relation_id, position))
            .await?;
        Ok(descriptor.clone())
    }

    /// Resolve every position of `positions` against one relation, keeping order.
    pub async fn resolve_all<E: Executor + ?Sized>(
        &self,
        exec: &E,
        relation_id: i64,
        positions: &[i16],
    ) -> Result<Vec<AttributeDescriptor>> {
        futures::future::try_join_all(
            positions
                .iter()
                .map(|&position| self.resolve(exec, relation_id, position)),
        )
        .await
    }

    /// Number of keys resolved so far.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, relation_id: i64, position: i16) -> Slot {
        self.lock()
            .entry((relation_id, position))
            .or_default()
            .clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(i64, i16), Slot>> {
        // The map only ever gains entries, so a poisoned guard is still usable.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn load<E: Executor + ?Sized>(
    exec: &E,
    relation_id: i64,
    position: i16,
) -> Result<AttributeDescriptor> {
    let params = [Value::I64(relation_id), Value::I32(i32::from(position))];
    let row = exec
        .select_optional(ATTRIBUTE_SQL, &params)
        .await?
        .ok_or(Error::AttributeNotFound {
            relation_id,
            position,
        })?;

    tracing::trace!(relation_id, position, "attribute resolved");
    Ok(AttributeDescriptor {
        relation_id,
        position,
        name: row.text("name")?,
        type_name: row.text("type_name")?,
    })
}
