//! Postgres catalog inspection and data-integrity reconciliation.
//!
//! This crate provides:
//! - Typed listings of tables, columns, constraints and indexes
//! - Foreign-key-aware deletion order
//! - Schema snapshots and index comparison
//! - Duplicate-row consolidation, emitted as transactional repair scripts
//! - An audit of references that are not backed by foreign keys
//!
//! # Example
//!
//! ```ignore
//! let ctx = Context::new();
//! let exec = PgExecutor::connect(&url, DEFAULT_POOL_SIZE).await?;
//! let catalog = ctx.catalog(&exec);
//!
//! let order = catalog.deletion_order("public").await?;
//! for table in &order.tables {
//!     println!("{table}");
//! }
//! ```
//!
//! Duplicate consolidation never modifies the database. It reads the rows
//! and writes one `<table>.sql` file per rule into an output directory:
//!
//! ```ignore
//! let writer = ScriptWriter::create("repair")?;
//! let consolidator = Consolidator::new(catalog, "public", ConsolidationPolicy::default());
//! consolidator.run(&config.unique, &writer).await?;
//! ```

mod attribute;
mod audit;
mod catalog;
mod context;
mod cursor;
mod dedupe;
mod error;
mod executor;
mod order;
pub mod query;
mod script;
mod snapshot;
mod traced;

#[cfg(test)]
mod fake;

pub use attribute::{AttributeDescriptor, AttributeResolver};
pub use audit::{ReferenceAudit, ReferenceAuditRow};
pub use catalog::{
    Catalog, ClassColumn, ConstraintDescriptor, ConstraintKind, ConstraintKinds, DumpOptions,
    IndexDescriptor, RelationKind, TableColumn, TableDescriptor,
};
pub use context::{Context, DEFAULT_POOL_SIZE, ExecutorRegistry};
pub use cursor::RowCursor;
pub use dedupe::{
    ConsolidationPolicy, ConsolidationReport, Consolidator, DependentPolicy, DuplicateGroup,
    SurvivorPolicy,
};
pub use error::Error;
pub use executor::{Executor, PgExecutor, QueryFuture};
pub use order::{DeletionOrder, deletion_order};
pub use query::{Row, RowExt, Value};
pub use script::{RepairBlock, ScriptWriter};
pub use snapshot::{IndexDiff, SchemaSnapshot, diff_indexes};
pub use traced::{TracedObject, TracedPool};

pub use pgrecon_config::{Config, TableReferences, UniquenessSpec};

/// Result type for pgrecon operations.
pub type Result<T> = std::result::Result<T, Error>;
