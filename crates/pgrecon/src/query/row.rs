//! Row mapping between Postgres and runtime values.

use super::Value;
use crate::{Error, Result};
use rust_decimal::Decimal;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type as PgTypeInfo};

/// Internal type for reading raw JSONB bytes from PostgreSQL.
struct JsonbRaw(Vec<u8>);

impl<'a> FromSql<'a> for JsonbRaw {
    fn from_sql(
        ty: &PgTypeInfo,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        if *ty == PgTypeInfo::JSON || *ty == PgTypeInfo::JSONB {
            Ok(JsonbRaw(raw.to_vec()))
        } else {
            Err(format!("expected JSON or JSONB, got {:?}", ty).into())
        }
    }

    fn accepts(ty: &PgTypeInfo) -> bool {
        *ty == PgTypeInfo::JSON || *ty == PgTypeInfo::JSONB
    }
}

/// A row of data as field name → value pairs, in select-list order.
pub type Row = Vec<(String, Value)>;

/// Typed accessors over a [`Row`].
///
/// A missing column or a value of the wrong shape is a
/// [`Error::SchemaInconsistency`]: catalog queries select fixed column lists,
/// so either means the catalog did not look the way the query expected.
pub trait RowExt {
    /// The value of a column, if the row has it.
    fn value(&self, column: &str) -> Option<&Value>;

    /// A column that must be present.
    fn get(&self, column: &str) -> Result<&Value> {
        self.value(column).ok_or_else(|| {
            Error::SchemaInconsistency(format!("row has no column '{}'", column))
        })
    }

    /// A non-null text column.
    fn text(&self, column: &str) -> Result<String> {
        match self.get(column)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(wrong_shape(column, "text", other)),
        }
    }

    /// A nullable text column.
    fn opt_text(&self, column: &str) -> Result<Option<String>> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            other => Err(wrong_shape(column, "text", other)),
        }
    }

    /// A non-null integer column of any width.
    fn int(&self, column: &str) -> Result<i64> {
        let value = self.get(column)?;
        value
            .as_i64()
            .ok_or_else(|| wrong_shape(column, "integer", value))
    }

    /// A nullable integer column of any width.
    fn opt_int(&self, column: &str) -> Result<Option<i64>> {
        match self.get(column)? {
            Value::Null => Ok(None),
            value => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| wrong_shape(column, "integer", value)),
        }
    }

    /// A non-null boolean column.
    fn boolean(&self, column: &str) -> Result<bool> {
        match self.get(column)? {
            Value::Bool(b) => Ok(*b),
            other => Err(wrong_shape(column, "bool", other)),
        }
    }

    /// A nullable array of attribute positions (`int2[]`/`int4[]`).
    fn positions(&self, column: &str) -> Result<Option<Vec<i16>>> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_i64()
                        .and_then(|v| i16::try_from(v).ok())
                        .ok_or_else(|| wrong_shape(column, "attribute position", item))
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            other => Err(wrong_shape(column, "int array", other)),
        }
    }

    /// A text array; NULL reads as empty.
    fn text_array(&self, column: &str) -> Result<Vec<String>> {
        match self.get(column)? {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(wrong_shape(column, "text", other)),
                })
                .collect(),
            other => Err(wrong_shape(column, "text array", other)),
        }
    }
}

impl RowExt for Row {
    fn value(&self, column: &str) -> Option<&Value> {
        self.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }
}

fn wrong_shape(column: &str, expected: &str, got: &Value) -> Error {
    Error::SchemaInconsistency(format!(
        "column '{}' should be {}, got {:?}",
        column, expected, got
    ))
}

/// Convert a tokio_postgres Row to our Row type, using each column's
/// runtime type.
pub fn pg_row_to_row(pg_row: &tokio_postgres::Row) -> Result<Row> {
    let mut row = Vec::with_capacity(pg_row.len());
    for (idx, column) in pg_row.columns().iter().enumerate() {
        let value = pg_value_to_value(pg_row, idx, column.name(), column.type_())?;
        row.push((column.name().to_string(), value));
    }
    Ok(row)
}

/// Types [`pg_row_to_row`] decodes directly. Columns of any other type have
/// to be cast to text in the select list.
const NATIVE_TYPES: &[PgTypeInfo] = &[
    PgTypeInfo::BOOL,
    PgTypeInfo::INT2,
    PgTypeInfo::INT4,
    PgTypeInfo::INT8,
    PgTypeInfo::OID,
    PgTypeInfo::FLOAT4,
    PgTypeInfo::FLOAT8,
    PgTypeInfo::NUMERIC,
    PgTypeInfo::TEXT,
    PgTypeInfo::VARCHAR,
    PgTypeInfo::NAME,
    PgTypeInfo::BPCHAR,
    PgTypeInfo::UNKNOWN,
    PgTypeInfo::CHAR,
    PgTypeInfo::BYTEA,
    PgTypeInfo::JSON,
    PgTypeInfo::JSONB,
    PgTypeInfo::TIMESTAMPTZ,
    PgTypeInfo::TIMESTAMP,
    PgTypeInfo::DATE,
    PgTypeInfo::TIME,
    PgTypeInfo::INT2_ARRAY,
    PgTypeInfo::INT4_ARRAY,
    PgTypeInfo::INT8_ARRAY,
    PgTypeInfo::TEXT_ARRAY,
    PgTypeInfo::VARCHAR_ARRAY,
    PgTypeInfo::NAME_ARRAY,
];

/// Whether a column whose type has this OID can be read without a cast.
pub fn decodes_natively(type_oid: u32) -> bool {
    PgTypeInfo::from_oid(type_oid).is_some_and(|ty| NATIVE_TYPES.contains(&ty))
}

fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> Result<Option<T>> {
    Ok(row.try_get::<_, Option<T>>(idx)?)
}

fn array<'a, T, F>(row: &'a tokio_postgres::Row, idx: usize, wrap: F) -> Result<Value>
where
    T: FromSql<'a>,
    F: Fn(T) -> Value,
{
    let items: Option<Vec<Option<T>>> = get(row, idx)?;
    Ok(match items {
        Some(items) => Value::Array(
            items
                .into_iter()
                .map(|item| item.map(&wrap).unwrap_or(Value::Null))
                .collect(),
        ),
        None => Value::Null,
    })
}

/// Extract a value from a Postgres row at a given index.
fn pg_value_to_value(
    row: &tokio_postgres::Row,
    idx: usize,
    column_name: &str,
    ty: &PgTypeInfo,
) -> Result<Value> {
    let value = match *ty {
        PgTypeInfo::BOOL => get::<bool>(row, idx)?.map(Value::Bool),
        PgTypeInfo::INT2 => get::<i16>(row, idx)?.map(Value::I16),
        PgTypeInfo::INT4 => get::<i32>(row, idx)?.map(Value::I32),
        PgTypeInfo::INT8 => get::<i64>(row, idx)?.map(Value::I64),
        PgTypeInfo::OID => get::<u32>(row, idx)?.map(|v| Value::I64(i64::from(v))),
        PgTypeInfo::FLOAT4 => get::<f32>(row, idx)?.map(Value::F32),
        PgTypeInfo::FLOAT8 => get::<f64>(row, idx)?.map(Value::F64),
        PgTypeInfo::NUMERIC => get::<Decimal>(row, idx)?.map(Value::Decimal),
        PgTypeInfo::TEXT
        | PgTypeInfo::VARCHAR
        | PgTypeInfo::NAME
        | PgTypeInfo::BPCHAR
        | PgTypeInfo::UNKNOWN => get::<String>(row, idx)?.map(Value::String),
        // The one-byte "char" type used by relkind/contype
        PgTypeInfo::CHAR => {
            get::<i8>(row, idx)?.map(|c| Value::String(char::from(c as u8).to_string()))
        }
        PgTypeInfo::BYTEA => get::<Vec<u8>>(row, idx)?.map(Value::Bytes),
        PgTypeInfo::JSON | PgTypeInfo::JSONB => get::<JsonbRaw>(row, idx)?.map(|raw| {
            // JSONB wire format has a 1-byte version prefix, skip it
            let json_bytes = if *ty == PgTypeInfo::JSONB && raw.0.first() == Some(&1) {
                &raw.0[1..]
            } else {
                &raw.0[..]
            };
            Value::Json(String::from_utf8_lossy(json_bytes).into_owned())
        }),
        PgTypeInfo::TIMESTAMPTZ => get::<chrono::DateTime<chrono::Utc>>(row, idx)?
            .map(|dt| Value::String(dt.to_rfc3339())),
        PgTypeInfo::TIMESTAMP => {
            get::<chrono::NaiveDateTime>(row, idx)?.map(|dt| Value::String(dt.to_string()))
        }
        PgTypeInfo::DATE => {
            get::<chrono::NaiveDate>(row, idx)?.map(|d| Value::String(d.to_string()))
        }
        PgTypeInfo::TIME => {
            get::<chrono::NaiveTime>(row, idx)?.map(|t| Value::String(t.to_string()))
        }
        PgTypeInfo::INT2_ARRAY => Some(array::<i16, _>(row, idx, Value::I16)?),
        PgTypeInfo::INT4_ARRAY => Some(array::<i32, _>(row, idx, Value::I32)?),
        PgTypeInfo::INT8_ARRAY => Some(array::<i64, _>(row, idx, Value::I64)?),
        PgTypeInfo::TEXT_ARRAY | PgTypeInfo::VARCHAR_ARRAY | PgTypeInfo::NAME_ARRAY => {
            Some(array::<String, _>(row, idx, Value::String)?)
        }
        _ => {
            return Err(Error::UnsupportedType {
                column: column_name.to_string(),
                type_name: ty.name().to_string(),
            });
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Wrapper to make our Value usable as a ToSql parameter.
///
/// Integers are narrowed or widened to the parameter type Postgres inferred,
/// so a key read as `int4` can be compared against an `int8` column.
#[derive(Debug)]
pub struct SqlParam<'a>(pub &'a Value);

impl ToSql for SqlParam<'_> {
    fn to_sql(
        &self,
        ty: &PgTypeInfo,
        out: &mut bytes::BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::I16(v) => int_to_sql(i64::from(*v), ty, out),
            Value::I32(v) => int_to_sql(i64::from(*v), ty, out),
            Value::I64(v) => int_to_sql(*v, ty, out),
            Value::F32(v) => v.to_sql(ty, out),
            Value::F64(v) => v.to_sql(ty, out),
            Value::Decimal(v) => v.to_sql(ty, out),
            Value::String(v) => v.to_sql(ty, out),
            Value::Bytes(v) => v.to_sql(ty, out),
            Value::Json(v) => {
                // For JSONB, we need to prepend the version byte
                if *ty == PgTypeInfo::JSONB {
                    out.extend_from_slice(&[1]); // JSONB version 1
                }
                out.extend_from_slice(v.as_bytes());
                Ok(IsNull::No)
            }
            Value::Array(_) => Err("array parameters are not supported".into()),
        }
    }

    fn accepts(ty: &PgTypeInfo) -> bool {
        matches!(
            *ty,
            PgTypeInfo::BOOL
                | PgTypeInfo::INT2
                | PgTypeInfo::INT4
                | PgTypeInfo::INT8
                | PgTypeInfo::OID
                | PgTypeInfo::FLOAT4
                | PgTypeInfo::FLOAT8
                | PgTypeInfo::NUMERIC
                | PgTypeInfo::TEXT
                | PgTypeInfo::VARCHAR
                | PgTypeInfo::NAME
                | PgTypeInfo::BPCHAR
                | PgTypeInfo::UNKNOWN
                | PgTypeInfo::BYTEA
                | PgTypeInfo::JSON
                | PgTypeInfo::JSONB
        )
    }

    tokio_postgres::types::to_sql_checked!();
}

fn int_to_sql(
    v: i64,
    ty: &PgTypeInfo,
    out: &mut bytes::BytesMut,
) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
    match *ty {
        PgTypeInfo::INT2 => i16::try_from(v)?.to_sql(ty, out),
        PgTypeInfo::INT4 => i32::try_from(v)?.to_sql(ty, out),
        PgTypeInfo::OID => u32::try_from(v)?.to_sql(ty, out),
        PgTypeInfo::NUMERIC => Decimal::from(v).to_sql(ty, out),
        PgTypeInfo::TEXT | PgTypeInfo::VARCHAR => v.to_string().to_sql(ty, out),
        _ => v.to_sql(ty, out),
    }
}
