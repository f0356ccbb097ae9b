//! Typed views of the Postgres system catalog.
//!
//! Every listing is scoped to one schema and comes back in a stable order, so
//! two runs against the same database produce the same output.

use crate::attribute::AttributeResolver;
use crate::cursor::RowCursor;
use crate::executor::Executor;
use crate::query::{Row, RowExt, Value, decodes_natively};
use crate::{Error, Result};
use facet::Facet;
use futures::future::try_join_all;
use pgrecon_sql::{Ident, Qualified, order_by, page_limit, validate_ident};

/// Kind of a relation (`pg_class.relkind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum RelationKind {
    OrdinaryTable,
    Index,
    Sequence,
    View,
    MaterializedView,
    CompositeType,
    ToastTable,
    ForeignTable,
    PartitionedTable,
    PartitionedIndex,
}

impl RelationKind {
    pub const ALL: [RelationKind; 10] = [
        RelationKind::OrdinaryTable,
        RelationKind::Index,
        RelationKind::Sequence,
        RelationKind::View,
        RelationKind::MaterializedView,
        RelationKind::CompositeType,
        RelationKind::ToastTable,
        RelationKind::ForeignTable,
        RelationKind::PartitionedTable,
        RelationKind::PartitionedIndex,
    ];

    /// The `relkind` code.
    pub fn code(self) -> char {
        match self {
            RelationKind::OrdinaryTable => 'r',
            RelationKind::Index => 'i',
            RelationKind::Sequence => 'S',
            RelationKind::View => 'v',
            RelationKind::MaterializedView => 'm',
            RelationKind::CompositeType => 'c',
            RelationKind::ToastTable => 't',
            RelationKind::ForeignTable => 'f',
            RelationKind::PartitionedTable => 'p',
            RelationKind::PartitionedIndex => 'I',
        }
    }

    /// Human-readable label, also used to group snapshot columns.
    pub fn label(self) -> &'static str {
        match self {
            RelationKind::OrdinaryTable => "table",
            RelationKind::Index => "index",
            RelationKind::Sequence => "sequence",
            RelationKind::View => "view",
            RelationKind::MaterializedView => "materialized_view",
            RelationKind::CompositeType => "composite_type",
            RelationKind::ToastTable => "toast_table",
            RelationKind::ForeignTable => "foreign_table",
            RelationKind::PartitionedTable => "partitioned_table",
            RelationKind::PartitionedIndex => "partitioned_index",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| code.len() == 1 && code.starts_with(k.code()))
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of a constraint (`pg_constraint.contype`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum ConstraintKind {
    Foreign,
    Check,
    Unique,
    PrimaryKey,
    Exclusion,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 5] = [
        ConstraintKind::Foreign,
        ConstraintKind::Check,
        ConstraintKind::Unique,
        ConstraintKind::PrimaryKey,
        ConstraintKind::Exclusion,
    ];

    /// The `contype` code.
    pub fn code(self) -> char {
        match self {
            ConstraintKind::Foreign => 'f',
            ConstraintKind::Check => 'c',
            ConstraintKind::Unique => 'u',
            ConstraintKind::PrimaryKey => 'p',
            ConstraintKind::Exclusion => 'x',
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| code.len() == 1 && code.starts_with(k.code()))
    }
}

/// Which constraint kinds a listing should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKinds {
    All,
    Only(Vec<ConstraintKind>),
}

impl ConstraintKinds {
    pub fn contains(&self, kind: ConstraintKind) -> bool {
        match self {
            ConstraintKinds::All => true,
            ConstraintKinds::Only(kinds) => kinds.contains(&kind),
        }
    }

    fn codes(&self) -> Vec<char> {
        ConstraintKind::ALL
            .into_iter()
            .filter(|k| self.contains(*k))
            .map(ConstraintKind::code)
            .collect()
    }
}

impl From<ConstraintKind> for ConstraintKinds {
    fn from(kind: ConstraintKind) -> Self {
        ConstraintKinds::Only(vec![kind])
    }
}

/// A relation in a schema.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct TableDescriptor {
    pub name: String,
    pub schema: String,
    pub kind: RelationKind,
    /// Total on-disk size including indexes and toast.
    pub size_bytes: Option<i64>,
    /// A partition of a partitioned table. Its rows are also reachable
    /// through the parent.
    pub is_partition: bool,
}

/// A constraint with its key positions resolved to column names.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct ConstraintDescriptor {
    pub table: String,
    pub table_id: i64,
    pub name: String,
    pub kind: ConstraintKind,
    pub keys: Vec<i16>,
    pub columns: Vec<String>,
    pub foreign_table: Option<String>,
    pub foreign_table_id: Option<i64>,
    pub foreign_keys: Option<Vec<i16>>,
    pub foreign_columns: Option<Vec<String>>,
}

/// An index and its key columns, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct IndexDescriptor {
    pub table_name: String,
    pub index_name: String,
    pub column_names: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
}

impl IndexDescriptor {
    /// What the index is, regardless of what it is called.
    pub fn identity_key(&self) -> String {
        format!(
            "{}:{}:unique={}:primary={}",
            self.table_name,
            self.column_names.join(","),
            self.is_unique,
            self.is_primary
        )
    }
}

/// One column of one relation.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct ClassColumn {
    pub class_name: String,
    pub column_name: String,
    pub column_type: String,
    pub class_type: String,
}

/// A live column of one table.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct TableColumn {
    pub name: String,
    /// `format_type` rendering, valid as a cast target.
    pub type_name: String,
    pub type_oid: i64,
}

impl TableColumn {
    /// The column as a select-list item: as is when the row decoder reads
    /// its type, cast to text otherwise.
    fn select_item(&self) -> String {
        let native = u32::try_from(self.type_oid).is_ok_and(decodes_natively);
        if native {
            Ident(&self.name).to_string()
        } else {
            format!("{}::text as {}", Ident(&self.name), Ident(&self.name))
        }
    }
}

/// Options for [`Catalog::dump_table`].
#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// Sort keys; a leading `-` sorts descending.
    pub order_by: Vec<String>,
    /// 1-based page, used together with `limit`.
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Rows fetched per round trip.
    pub batch_size: u32,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            order_by: Vec::new(),
            page: None,
            limit: None,
            batch_size: pgrecon_config::DEFAULT_BATCH_SIZE,
        }
    }
}

/// Index key columns in key order; expression members have no attribute and drop out.
const INDEX_COLUMNS: &str = "array(select a.attname::text \
     from unnest(x.indkey::int2[]) with ordinality as k(attnum, ord) \
     join pg_attribute a on a.attrelid = x.indrelid and a.attnum = k.attnum \
     order by k.ord)";

/// Catalog queries for one database.
pub struct Catalog<'a, E: Executor + ?Sized> {
    exec: &'a E,
    attributes: &'a AttributeResolver,
}

impl<'a, E: Executor + ?Sized> Catalog<'a, E> {
    pub fn new(exec: &'a E, attributes: &'a AttributeResolver) -> Self {
        Self { exec, attributes }
    }

    pub fn executor(&self) -> &'a E {
        self.exec
    }

    /// Ordinary and partitioned tables, optionally only those with a live
    /// column named `column_filter`.
    pub async fn list_tables(
        &self,
        schema: &str,
        column_filter: Option<&str>,
    ) -> Result<Vec<TableDescriptor>> {
        self.list_relations(
            schema,
            &[RelationKind::OrdinaryTable, RelationKind::PartitionedTable],
            column_filter,
        )
        .await
    }

    /// Relations of the given kinds, sorted by name.
    pub async fn list_relations(
        &self,
        schema: &str,
        kinds: &[RelationKind],
        column_filter: Option<&str>,
    ) -> Result<Vec<TableDescriptor>> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }
        let codes: Vec<String> = kinds.iter().map(|k| format!("'{}'", k.code())).collect();
        let mut sql = format!(
            "select c.relname::text as name, n.nspname::text as schema, c.relkind::text as kind, \
             pg_total_relation_size(c.oid)::int8 as size_bytes, \
             c.relispartition as is_partition \
             from pg_class c join pg_namespace n on n.oid = c.relnamespace \
             where n.nspname = $1 and c.relkind in ({})",
            codes.join(", ")
        );
        let mut params = vec![Value::from(schema)];
        if let Some(column) = column_filter {
            sql.push_str(
                " and exists (select 1 from pg_attribute a where a.attrelid = c.oid \
                 and a.attname::text = $2 and a.attnum > 0 and not a.attisdropped)",
            );
            params.push(Value::from(column));
        }
        sql.push_str(" order by c.relname");

        let rows = self.exec.select_many(&sql, &params).await?;
        rows.iter().map(table_from_row).collect()
    }

    /// Constraints of a schema, or of one table, with key columns resolved.
    pub async fn list_constraints(
        &self,
        schema: &str,
        table: Option<&str>,
        kinds: &ConstraintKinds,
    ) -> Result<Vec<ConstraintDescriptor>> {
        let codes: Vec<String> = kinds.codes().iter().map(|c| format!("'{}'", c)).collect();
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let mut sql = format!(
            "select t.oid::int8 as table_id, t.relname::text as table_name, \
             c.conname::text as name, c.contype::text as kind, c.conkey::int4[] as keys, \
             f.oid::int8 as foreign_table_id, f.relname::text as foreign_table, \
             c.confkey::int4[] as foreign_keys \
             from pg_constraint c \
             join pg_class t on t.oid = c.conrelid \
             join pg_namespace n on n.oid = t.relnamespace \
             left join pg_class f on f.oid = c.confrelid \
             where n.nspname = $1 and c.contype in ({})",
            codes.join(", ")
        );
        let mut params = vec![Value::from(schema)];
        if let Some(table) = table {
            sql.push_str(" and t.relname = $2");
            params.push(Value::from(table));
        }
        sql.push_str(" order by t.relname, c.conname");

        let rows = self.exec.select_many(&sql, &params).await?;
        try_join_all(rows.iter().map(|row| self.resolve_constraint(row))).await
    }

    async fn resolve_constraint(&self, row: &Row) -> Result<ConstraintDescriptor> {
        let name = row.text("name")?;
        let kind_code = row.text("kind")?;
        let kind = ConstraintKind::from_code(&kind_code).ok_or_else(|| {
            Error::SchemaInconsistency(format!(
                "constraint '{}' has unknown kind '{}'",
                name, kind_code
            ))
        })?;
        let table_id = row.int("table_id")?;
        let keys = row.positions("keys")?.unwrap_or_default();
        let foreign_table_id = row.opt_int("foreign_table_id")?;
        let foreign_keys = row.positions("foreign_keys")?;

        if kind == ConstraintKind::Foreign {
            let foreign_len = foreign_keys.as_ref().map_or(0, Vec::len);
            if foreign_len != keys.len() {
                return Err(Error::SchemaInconsistency(format!(
                    "foreign key '{}' has {} local and {} referenced columns",
                    name,
                    keys.len(),
                    foreign_len
                )));
            }
        }

        let owner = self.attributes.resolve_all(self.exec, table_id, &keys);
        let foreign = async {
            match (foreign_table_id, &foreign_keys) {
                (Some(id), Some(positions)) if kind == ConstraintKind::Foreign => self
                    .attributes
                    .resolve_all(self.exec, id, positions)
                    .await
                    .map(Some),
                _ => Ok(None),
            }
        };
        let (owner, foreign) = tokio::try_join!(owner, foreign)?;

        Ok(ConstraintDescriptor {
            table: row.text("table_name")?,
            table_id,
            name,
            kind,
            keys,
            columns: owner.into_iter().map(|a| a.name).collect(),
            foreign_table: row.opt_text("foreign_table")?,
            foreign_table_id,
            foreign_keys,
            foreign_columns: foreign.map(|attrs| attrs.into_iter().map(|a| a.name).collect()),
        })
    }

    /// Indexes of a schema, ordered by table then index name.
    pub async fn list_indexes(&self, schema: &str) -> Result<Vec<IndexDescriptor>> {
        let sql = format!(
            "select t.relname::text as table_name, i.relname::text as index_name, \
             {} as column_names, x.indisunique as is_unique, x.indisprimary as is_primary \
             from pg_index x \
             join pg_class i on i.oid = x.indexrelid \
             join pg_class t on t.oid = x.indrelid \
             join pg_namespace n on n.oid = t.relnamespace \
             where n.nspname = $1 \
             order by t.relname, i.relname",
            INDEX_COLUMNS
        );
        let rows = self.exec.select_many(&sql, &[Value::from(schema)]).await?;
        rows.iter()
            .map(|row| {
                Ok(IndexDescriptor {
                    table_name: row.text("table_name")?,
                    index_name: row.text("index_name")?,
                    column_names: row.text_array("column_names")?,
                    is_unique: row.boolean("is_unique")?,
                    is_primary: row.boolean("is_primary")?,
                })
            })
            .collect()
    }

    /// Live columns of every non-index relation.
    pub async fn list_class_columns(&self, schema: &str) -> Result<Vec<ClassColumn>> {
        let sql = "select c.relname::text as class_name, a.attname::text as column_name, \
             format_type(a.atttypid, a.atttypmod) as column_type, c.relkind::text as kind \
             from pg_attribute a \
             join pg_class c on c.oid = a.attrelid \
             join pg_namespace n on n.oid = c.relnamespace \
             where n.nspname = $1 and c.relkind not in ('i', 'I') \
             and a.attnum > 0 and not a.attisdropped \
             order by c.relkind, c.relname, a.attnum";
        let rows = self.exec.select_many(sql, &[Value::from(schema)]).await?;
        rows.iter()
            .map(|row| {
                Ok(ClassColumn {
                    class_name: row.text("class_name")?,
                    column_name: row.text("column_name")?,
                    column_type: row.text("column_type")?,
                    class_type: relation_kind(row)?.label().to_string(),
                })
            })
            .collect()
    }

    /// Primary-key columns of a table in key order; empty when it has none.
    pub async fn primary_key(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let sql = format!(
            "select {} as column_names \
             from pg_index x \
             join pg_class t on t.oid = x.indrelid \
             join pg_namespace n on n.oid = t.relnamespace \
             where n.nspname = $1 and t.relname = $2 and x.indisprimary",
            INDEX_COLUMNS
        );
        let params = [Value::from(schema), Value::from(table)];
        match self.exec.select_optional(&sql, &params).await? {
            Some(row) => row.text_array("column_names"),
            None => Ok(Vec::new()),
        }
    }

    /// Live columns of one table in attribute order; empty when there is no
    /// such table.
    pub async fn table_columns(&self, schema: &str, table: &str) -> Result<Vec<TableColumn>> {
        let sql = "select a.attname::text as name, \
             format_type(a.atttypid, a.atttypmod) as type_name, \
             a.atttypid::int8 as type_oid \
             from pg_attribute a \
             join pg_class c on c.oid = a.attrelid \
             join pg_namespace n on n.oid = c.relnamespace \
             where n.nspname = $1 and c.relname = $2 \
             and a.attnum > 0 and not a.attisdropped \
             order by a.attnum";
        let params = [Value::from(schema), Value::from(table)];
        let rows = self.exec.select_many(sql, &params).await?;
        rows.iter()
            .map(|row| {
                Ok(TableColumn {
                    name: row.text("name")?,
                    type_name: row.text("type_name")?,
                    type_oid: row.int("type_oid")?,
                })
            })
            .collect()
    }

    /// Stream every row of a table to `visit`, returning the number of rows.
    ///
    /// Columns whose type the row decoder does not read (uuid, enums, inet,
    /// ...) arrive as text.
    pub async fn dump_table<F>(
        &self,
        schema: &str,
        table: &str,
        options: &DumpOptions,
        mut visit: F,
    ) -> Result<u64>
    where
        F: FnMut(Row) -> Result<()>,
    {
        let target = Qualified(validate_ident(schema)?, validate_ident(table)?);
        let sort = order_by(&options.order_by)?;
        let columns = self.table_columns(schema, table).await?;
        if columns.is_empty() {
            return Err(Error::UnknownTable {
                schema: schema.to_string(),
                table: table.to_string(),
            });
        }
        let items: Vec<String> = columns.iter().map(TableColumn::select_item).collect();

        let mut sql = format!("select {} from {}", items.join(", "), target);
        for clause in [sort, page_limit(options.page, options.limit)] {
            if !clause.is_empty() {
                sql.push(' ');
                sql.push_str(&clause);
            }
        }

        let mut cursor: RowCursor = self.exec.select_stream(&sql, &[], options.batch_size).await?;
        let mut count = 0;
        while let Some(row) = cursor.next().await? {
            visit(row)?;
            count += 1;
        }
        cursor.close().await?;
        tracing::debug!(schema, table, rows = count, "table dumped");
        Ok(count)
    }
}

fn relation_kind(row: &Row) -> Result<RelationKind> {
    let code = row.text("kind")?;
    RelationKind::from_code(&code)
        .ok_or_else(|| Error::SchemaInconsistency(format!("unknown relation kind '{}'", code)))
}

fn table_from_row(row: &Row) -> Result<TableDescriptor> {
    Ok(TableDescriptor {
        name: row.text("name")?,
        schema: row.text("schema")?,
        kind: relation_kind(row)?,
        size_bytes: row.opt_int("size_bytes")?,
        is_partition: row.boolean("is_partition")?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fake::{FakeExecutor, row};

    pub(crate) fn column_row(name: &str, type_name: &str, type_oid: i64) -> Row {
        row([
            ("name", Value::from(name)),
            ("type_name", Value::from(type_name)),
            ("type_oid", Value::I64(type_oid)),
        ])
    }

    /// Answers `pg_attribute` lookups for a two-table schema:
    /// `user` (oid 1: id, email) and `post` (oid 2: id, author_id).
    pub(crate) fn attribute_row(params: &[Value]) -> Vec<Row> {
        let relation = params[0].as_i64().unwrap();
        let position = params[1].as_i64().unwrap();
        let name = match (relation, position) {
            (1, 1) | (2, 1) => "id",
            (1, 2) => "email",
            (2, 2) => "author_id",
            _ => return vec![],
        };
        vec![row([
            ("relation_id", Value::I64(relation)),
            ("position", Value::I32(position as i32)),
            ("name", Value::from(name)),
            ("type_name", Value::from("bigint")),
        ])]
    }

    fn constraint_row(
        table: (&str, i64),
        name: &str,
        kind: &str,
        keys: &[i32],
        foreign: Option<(&str, i64, &[i32])>,
    ) -> Row {
        let ints = |k: &[i32]| Value::Array(k.iter().map(|&v| Value::I32(v)).collect());
        row([
            ("table_id", Value::I64(table.1)),
            ("table_name", Value::from(table.0)),
            ("name", Value::from(name)),
            ("kind", Value::from(kind)),
            ("keys", ints(keys)),
            ("foreign_table_id", Value::from(foreign.map(|f| f.1))),
            ("foreign_table", Value::from(foreign.map(|f| f.0))),
            ("foreign_keys", foreign.map_or(Value::Null, |f| ints(f.2))),
        ])
    }

    #[test]
    fn test_relation_kind_codes() {
        for kind in RelationKind::ALL {
            assert_eq!(
                RelationKind::from_code(&kind.code().to_string()),
                Some(kind)
            );
            assert_eq!(RelationKind::from_label(kind.label()), Some(kind));
        }
        assert_eq!(RelationKind::from_code("rr"), None);
        assert_eq!(RelationKind::from_code("I"), Some(RelationKind::PartitionedIndex));
        assert_eq!(RelationKind::from_code("i"), Some(RelationKind::Index));
    }

    #[test]
    fn test_constraint_kind_filter() {
        assert_eq!(ConstraintKinds::All.codes(), vec!['f', 'c', 'u', 'p', 'x']);
        assert_eq!(
            ConstraintKinds::Only(vec![ConstraintKind::Unique, ConstraintKind::Foreign]).codes(),
            vec!['f', 'u']
        );
        assert!(ConstraintKinds::from(ConstraintKind::Check).contains(ConstraintKind::Check));
    }

    #[test]
    fn test_identity_key_keeps_column_order() {
        let idx = IndexDescriptor {
            table_name: "post".into(),
            index_name: "post_a_b".into(),
            column_names: vec!["b".into(), "a".into()],
            is_unique: true,
            is_primary: false,
        };
        assert_eq!(idx.identity_key(), "post:b,a:unique=true:primary=false");
    }

    #[tokio::test]
    async fn test_list_tables_with_column_filter() {
        let exec = FakeExecutor::new(|sql, params| {
            assert!(sql.contains("c.relkind in ('r', 'p')"));
            assert!(sql.contains("a.attname::text = $2"));
            assert_eq!(params, [Value::from("public"), Value::from("user_id")]);
            Ok(vec![row([
                ("name", Value::from("post")),
                ("schema", Value::from("public")),
                ("kind", Value::from("r")),
                ("size_bytes", Value::I64(8192)),
                ("is_partition", Value::Bool(false)),
            ])])
        });
        let attrs = AttributeResolver::new();
        let catalog = Catalog::new(&exec, &attrs);

        let tables = catalog.list_tables("public", Some("user_id")).await.unwrap();
        assert_eq!(
            tables,
            vec![TableDescriptor {
                name: "post".into(),
                schema: "public".into(),
                kind: RelationKind::OrdinaryTable,
                size_bytes: Some(8192),
                is_partition: false,
            }]
        );
    }

    #[tokio::test]
    async fn test_list_constraints_resolves_both_sides() {
        let exec = FakeExecutor::new(|sql, params| {
            if sql.contains("from pg_attribute where") {
                return Ok(attribute_row(params));
            }
            assert!(sql.contains("c.contype in ('f')"));
            Ok(vec![
                constraint_row(("post", 2), "post_author_fk", "f", &[2], Some(("user", 1, &[1][..]))),
                constraint_row(("user", 1), "user_parent_fk", "f", &[1], Some(("user", 1, &[1][..]))),
            ])
        });
        let attrs = AttributeResolver::new();
        let catalog = Catalog::new(&exec, &attrs);

        let fks = catalog
            .list_constraints("public", None, &ConstraintKind::Foreign.into())
            .await
            .unwrap();

        assert_eq!(fks.len(), 2);
        assert_eq!(fks[0].name, "post_author_fk");
        assert_eq!(fks[0].columns, vec!["author_id".to_string()]);
        assert_eq!(fks[0].foreign_table.as_deref(), Some("user"));
        assert_eq!(fks[0].foreign_columns, Some(vec!["id".to_string()]));
        assert_eq!(fks[1].table, "user");
        // user.id is shared by both constraints and was looked up once
        assert_eq!(attrs.len(), 2);
    }

    #[tokio::test]
    async fn test_list_constraints_fails_on_missing_attribute() {
        let exec = FakeExecutor::new(|sql, params| {
            if sql.contains("from pg_attribute where") {
                return Ok(attribute_row(params));
            }
            Ok(vec![constraint_row(("user", 1), "user_check", "c", &[7], None)])
        });
        let attrs = AttributeResolver::new();
        let catalog = Catalog::new(&exec, &attrs);

        let err = catalog
            .list_constraints("public", Some("user"), &ConstraintKinds::All)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AttributeNotFound { position: 7, .. }));
    }

    #[tokio::test]
    async fn test_mismatched_foreign_key_arrays() {
        let exec = FakeExecutor::new(|sql, params| {
            if sql.contains("from pg_attribute where") {
                return Ok(attribute_row(params));
            }
            Ok(vec![constraint_row(
                ("post", 2),
                "post_broken_fk",
                "f",
                &[1, 2],
                Some(("user", 1, &[1][..])),
            )])
        });
        let attrs = AttributeResolver::new();
        let catalog = Catalog::new(&exec, &attrs);

        let err = catalog
            .list_constraints("public", None, &ConstraintKinds::All)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemaInconsistency(_)));
    }

    #[tokio::test]
    async fn test_class_columns_labels() {
        let exec = FakeExecutor::new(|_, _| {
            Ok(vec![
                row([
                    ("class_name", Value::from("user")),
                    ("column_name", Value::from("id")),
                    ("column_type", Value::from("bigint")),
                    ("kind", Value::from("r")),
                ]),
                row([
                    ("class_name", Value::from("active_user")),
                    ("column_name", Value::from("id")),
                    ("column_type", Value::from("bigint")),
                    ("kind", Value::from("v")),
                ]),
            ])
        });
        let attrs = AttributeResolver::new();
        let catalog = Catalog::new(&exec, &attrs);

        let columns = catalog.list_class_columns("public").await.unwrap();
        let labels: Vec<_> = columns.iter().map(|c| c.class_type.as_str()).collect();
        assert_eq!(labels, vec!["table", "view"]);
    }

    #[tokio::test]
    async fn test_primary_key_absent() {
        let exec = FakeExecutor::new(|_, _| Ok(vec![]));
        let attrs = AttributeResolver::new();
        let catalog = Catalog::new(&exec, &attrs);

        assert!(catalog.primary_key("public", "log").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dump_table_builds_query_and_visits_rows() {
        let exec = FakeExecutor::new(|sql, params| {
            if sql.contains("a.atttypid::int8") {
                assert_eq!(params, [Value::from("public"), Value::from("user")]);
                return Ok(vec![
                    column_row("id", "bigint", 20),
                    column_row("token", "uuid", 2950),
                    column_row("state", "mood", 123_456),
                ]);
            }
            assert_eq!(
                sql,
                "select \"id\", \"token\"::text as \"token\", \"state\"::text as \"state\" \
                 from \"public\".\"user\" order by \"id\" desc limit 2"
            );
            Ok(vec![
                row([("id", Value::I64(2))]),
                row([("id", Value::I64(1))]),
            ])
        });
        let attrs = AttributeResolver::new();
        let catalog = Catalog::new(&exec, &attrs);

        let options = DumpOptions {
            order_by: vec!["-id".into()],
            page: Some(1),
            limit: Some(2),
            ..Default::default()
        };
        let mut ids = Vec::new();
        let count = catalog
            .dump_table("public", "user", &options, |row| {
                ids.push(row.int("id")?);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_dump_missing_table_is_unknown() {
        let exec = FakeExecutor::new(|sql, _| {
            assert!(sql.contains("a.atttypid::int8"));
            Ok(vec![])
        });
        let attrs = AttributeResolver::new();
        let catalog = Catalog::new(&exec, &attrs);

        let err = catalog
            .dump_table("public", "ghost", &DumpOptions::default(), |_| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTable { table, .. } if table == "ghost"));
        assert_eq!(exec.call_count(), 1);
    }

    #[tokio::test]
    async fn test_dump_table_rejects_bad_identifier() {
        let exec = crate::fake::unreachable_executor();
        let attrs = AttributeResolver::new();
        let catalog = Catalog::new(&exec, &attrs);

        let err = catalog
            .dump_table("public", "user; drop table x", &DumpOptions::default(), |_| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }
}
