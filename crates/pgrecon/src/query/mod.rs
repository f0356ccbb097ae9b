//! Dynamic rows and values.
//!
//! Catalog and table queries return columns whose types are discovered at
//! runtime, so results are decoded into [`Row`]s of [`Value`]s instead of
//! typed structs.

mod row;
mod value;

pub use row::{Row, RowExt, SqlParam, decodes_natively, pg_row_to_row};
pub use value::Value;
