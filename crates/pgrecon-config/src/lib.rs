//! Facet types for the pgrecon configuration schema.
//!
//! The configuration lives in `.config/pgrecon.styx`:
//!
//! ```text
//! schema public
//! unique (
//!   {table user, columns (email), reference_column user_id}
//!   {table tag, columns (tenant_id name)}
//! )
//! references {
//!   tables {user (user_id author_id)}
//!   ignore (audit_log)
//! }
//! survivor largest
//! dependents delete
//! ```

use facet::Facet;
use indexmap::IndexMap;

/// Schema used when the configuration does not name one.
pub const DEFAULT_SCHEMA: &str = "public";

/// Rows fetched per round trip when streaming a table.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Facet)]
pub struct Config {
    /// Connection URL, overridden by `DATABASE_URL` and `--database-url`.
    #[facet(default)]
    pub database_url: Option<String>,

    /// Schema to inspect.
    #[facet(default)]
    pub schema: Option<String>,

    /// Uniqueness rules to reconcile, processed in order.
    #[facet(default)]
    pub unique: Vec<UniquenessSpec>,

    /// Application-level references for the dangling-reference audit.
    #[facet(default)]
    pub references: Option<TableReferences>,

    /// Which duplicate survives: `largest` (default) or `smallest` key.
    #[facet(default)]
    pub survivor: Option<String>,

    /// What happens to dependent rows: `delete` (default) or `repoint`.
    #[facet(default)]
    pub dependents: Option<String>,

    /// Cursor batch size for table dumps.
    #[facet(default)]
    pub batch_size: Option<u32>,
}

impl Config {
    /// The configured schema, or `public`.
    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    /// The configured batch size, or [`DEFAULT_BATCH_SIZE`].
    pub fn batch_size(&self) -> u32 {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }
}

/// A uniqueness rule that existing rows may violate.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct UniquenessSpec {
    /// Table holding the rows.
    pub table: String,

    /// Columns whose values should be unique together, in order.
    pub columns: Vec<String>,

    /// Column name that other tables use to point at this table's key.
    #[facet(default)]
    pub reference_column: Option<String>,

    /// Key column, when the table has no single-column primary key.
    #[facet(default)]
    pub primary_key: Option<String>,
}

impl UniquenessSpec {
    /// Build a rule without dependents.
    pub fn new(table: impl Into<String>, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            reference_column: None,
            primary_key: None,
        }
    }

    /// Set the column other tables use to reference this one.
    pub fn referenced_by(mut self, column: impl Into<String>) -> Self {
        self.reference_column = Some(column.into());
        self
    }

    /// Set the key column explicitly.
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }
}

/// Reference conventions used by the audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Facet)]
pub struct TableReferences {
    /// Parent table name to the column names other tables use to reference it.
    #[facet(default)]
    pub tables: IndexMap<String, Vec<String>>,

    /// Tables never considered as children.
    #[facet(default)]
    pub ignore: Vec<String>,
}
