use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("could not create connection pool: {0}")]
    CreatePool(String),

    /// `select_one` got zero or several rows.
    #[error("expected {expected}, got {got} rows")]
    NotFound { expected: &'static str, got: usize },

    #[error("{path} already exists, refusing to mix runs")]
    AlreadyExists { path: Utf8PathBuf },

    #[error("attribute {position} of relation {relation_id} not found in catalog")]
    AttributeNotFound { relation_id: i64, position: i16 },

    #[error("schema inconsistency: {0}")]
    SchemaInconsistency(String),

    #[error("table '{table}' has no single-column primary key")]
    NoPrimaryKey { table: String },

    #[error("column '{column}' has unsupported type '{type_name}'")]
    UnsupportedType { column: String, type_name: String },

    #[error("table {schema}.{table} not found")]
    UnknownTable { schema: String, table: String },

    #[error("column '{column}' not found in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("uniqueness rule for '{table}' names no columns")]
    EmptyRule { table: String },

    #[error("unknown {setting} policy '{value}'")]
    InvalidPolicy { setting: &'static str, value: String },

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] pgrecon_sql::IdentError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}
