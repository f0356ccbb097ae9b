//! Duplicate-row consolidation.
//!
//! Given a set of columns that should be unique together, every group of rows
//! sharing the same values is collapsed into one survivor. Rows in other
//! tables that point at a removed row are deleted or repointed first, so
//! the generated script never breaks a reference.
//!
//! Nothing here writes to the database. The output is a set of SQL files,
//! one block per group, each in its own transaction:
//!
//! ```text
//! -- collapse 3 rows of user (email = 'a@x.org') into id = 3; removing 1, 2
//! begin transaction;
//! delete from "public"."post" where "user_id" = 1;
//! delete from "public"."user" where "id" = 1;
//! delete from "public"."user" where "id" = 2;
//! commit;
//! ```

use crate::catalog::{Catalog, TableColumn};
use crate::executor::Executor;
use crate::query::{Row, RowExt, Value};
use crate::script::{RepairBlock, ScriptWriter};
use crate::{Error, Result};
use pgrecon_config::{Config, UniquenessSpec};
use pgrecon_sql::{Ident, Qualified, validate_ident, where_clause};
use std::str::FromStr;

/// Which row of a duplicate group is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SurvivorPolicy {
    /// The row with the largest key.
    #[default]
    LargestKey,
    /// The row with the smallest key.
    SmallestKey,
}

impl SurvivorPolicy {
    /// Pick the survivor from keys sorted ascending.
    pub fn choose<'v>(&self, ascending: &'v [Value]) -> Option<&'v Value> {
        match self {
            SurvivorPolicy::LargestKey => ascending.last(),
            SurvivorPolicy::SmallestKey => ascending.first(),
        }
    }
}

impl FromStr for SurvivorPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "largest" => Ok(SurvivorPolicy::LargestKey),
            "smallest" => Ok(SurvivorPolicy::SmallestKey),
            other => Err(Error::InvalidPolicy {
                setting: "survivor",
                value: other.to_string(),
            }),
        }
    }
}

/// What happens to rows that reference a removed duplicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DependentPolicy {
    /// Delete them.
    #[default]
    Delete,
    /// Point them at the survivor instead.
    Repoint,
}

impl DependentPolicy {
    /// The statement applied to `table` rows whose `column` holds `key`.
    pub fn statement(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        key: &Value,
        survivor: &Value,
    ) -> String {
        match self {
            DependentPolicy::Delete => format!(
                "delete from {} where {} = {};",
                Qualified(schema, table),
                Ident(column),
                key.to_sql_literal()
            ),
            DependentPolicy::Repoint => format!(
                "update {} set {} = {} where {} = {};",
                Qualified(schema, table),
                Ident(column),
                survivor.to_sql_literal(),
                Ident(column),
                key.to_sql_literal()
            ),
        }
    }
}

impl FromStr for DependentPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "delete" => Ok(DependentPolicy::Delete),
            "repoint" => Ok(DependentPolicy::Repoint),
            other => Err(Error::InvalidPolicy {
                setting: "dependents",
                value: other.to_string(),
            }),
        }
    }
}

/// Survivor and dependent handling for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsolidationPolicy {
    pub survivor: SurvivorPolicy,
    pub dependents: DependentPolicy,
}

impl ConsolidationPolicy {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            survivor: config
                .survivor
                .as_deref()
                .map(SurvivorPolicy::from_str)
                .transpose()?
                .unwrap_or_default(),
            dependents: config
                .dependents
                .as_deref()
                .map(DependentPolicy::from_str)
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

/// Values shared by more than one row.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    /// Column name and its value as text, in rule order. NULL stays NULL.
    pub values: Vec<(String, Value)>,
    pub occurrences: i64,
}

impl DuplicateGroup {
    fn describe(&self) -> String {
        self.values
            .iter()
            .map(|(column, value)| format!("{} = {}", column, value.to_sql_literal()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Outcome of one uniqueness rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    pub table: String,
    pub groups: usize,
    pub rows_removed: usize,
    pub dependent_statements: usize,
    /// Groups left alone because their member rows no longer added up to
    /// the duplicate count.
    pub skipped_groups: usize,
}

impl std::fmt::Display for ConsolidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} groups, {} rows removed, {} dependent statements",
            self.table, self.groups, self.rows_removed, self.dependent_statements
        )?;
        if self.skipped_groups > 0 {
            write!(f, ", {} groups skipped", self.skipped_groups)?;
        }
        Ok(())
    }
}

const INTEGER_TYPES: [&str; 3] = ["smallint", "integer", "bigint"];

/// Plans repair scripts for uniqueness rules.
pub struct Consolidator<'a, E: Executor + ?Sized> {
    catalog: Catalog<'a, E>,
    schema: String,
    policy: ConsolidationPolicy,
}

impl<'a, E: Executor + ?Sized> Consolidator<'a, E> {
    pub fn new(catalog: Catalog<'a, E>, schema: impl Into<String>, policy: ConsolidationPolicy) -> Self {
        Self {
            catalog,
            schema: schema.into(),
            policy,
        }
    }

    /// Process `rules` in order, appending each table's blocks once they are
    /// all computed. The first failure stops the run.
    pub async fn run(
        &self,
        rules: &[UniquenessSpec],
        writer: &ScriptWriter,
    ) -> Result<Vec<ConsolidationReport>> {
        let mut reports = Vec::with_capacity(rules.len());
        for rule in rules {
            let (blocks, report) = self.consolidate(rule).await?;
            writer.append(&rule.table, &blocks)?;
            tracing::info!(
                table = %report.table,
                groups = report.groups,
                rows_removed = report.rows_removed,
                "uniqueness rule processed"
            );
            reports.push(report);
        }
        Ok(reports)
    }

    /// Plan the repair blocks for one rule.
    pub async fn consolidate(
        &self,
        rule: &UniquenessSpec,
    ) -> Result<(Vec<RepairBlock>, ConsolidationReport)> {
        validate_ident(&self.schema)?;
        validate_ident(&rule.table)?;
        if rule.columns.is_empty() {
            return Err(Error::EmptyRule {
                table: rule.table.clone(),
            });
        }
        for column in &rule.columns {
            validate_ident(column)?;
        }
        if let Some(reference) = &rule.reference_column {
            validate_ident(reference)?;
        }

        let primary_key = self.primary_key(rule).await?;
        let columns = self.rule_columns(rule).await?;
        let dependents = self.dependents(rule).await?;
        let groups = self.find_duplicate_groups(&rule.table, &rule.columns).await?;

        let mut report = ConsolidationReport {
            table: rule.table.clone(),
            ..Default::default()
        };
        let mut blocks = Vec::new();

        for group in &groups {
            let members = self
                .group_members(&rule.table, &primary_key, &columns, group)
                .await?;
            if members.len() as i64 != group.occurrences {
                tracing::warn!(
                    table = %rule.table,
                    group = %group.describe(),
                    expected = group.occurrences,
                    found = members.len(),
                    "duplicate group changed under us, skipping"
                );
                report.skipped_groups += 1;
                continue;
            }
            let Some(survivor) = self.policy.survivor.choose(&members) else {
                continue;
            };
            let doomed: Vec<&Value> = members.iter().filter(|k| *k != survivor).collect();
            if doomed.is_empty() {
                continue;
            }

            let keys: Vec<String> = doomed.iter().map(|k| k.to_sql_literal()).collect();
            let mut block = RepairBlock::new(format!(
                "collapse {} rows of {} ({}) into {} = {}; removing {}",
                members.len(),
                rule.table,
                group.describe(),
                primary_key,
                survivor.to_sql_literal(),
                keys.join(", ")
            ));

            if let Some(reference) = &rule.reference_column {
                for key in &doomed {
                    for dependent in &dependents {
                        if self.count_dependents(dependent, reference, key).await? == 0 {
                            continue;
                        }
                        block.push(self.policy.dependents.statement(
                            &self.schema,
                            dependent,
                            reference,
                            key,
                            survivor,
                        ));
                        report.dependent_statements += 1;
                    }
                }
            }

            for key in &doomed {
                block.push(format!(
                    "delete from {} where {} = {};",
                    Qualified(&self.schema, &rule.table),
                    Ident(&primary_key),
                    key.to_sql_literal()
                ));
            }

            report.groups += 1;
            report.rows_removed += doomed.len();
            blocks.push(block);
        }

        Ok((blocks, report))
    }

    /// Groups of rows sharing the same values in `columns`, sorted by those values.
    pub async fn find_duplicate_groups(
        &self,
        table: &str,
        columns: &[String],
    ) -> Result<Vec<DuplicateGroup>> {
        let select: Vec<String> = columns
            .iter()
            .map(|c| format!("{}::text as {}", Ident(c), Ident(c)))
            .collect();
        let quoted: Vec<String> = columns.iter().map(|c| Ident(c).to_string()).collect();
        let sql = format!(
            "select {}, count(*) as occurrences from {} group by {} having count(*) > 1 order by {}",
            select.join(", "),
            Qualified(&self.schema, table),
            quoted.join(", "),
            quoted.join(", ")
        );

        let rows = self.catalog.executor().select_many(&sql, &[]).await?;
        rows.into_iter()
            .map(|row| group_from_row(row, columns.len()))
            .collect()
    }

    /// Keys of the rows in `group`, ascending.
    ///
    /// Group values come back as text; each is cast to its column's type
    /// before comparing, so rows match by the same equality that grouped
    /// them (`1.0` and `1.00` are one numeric, `citext` ignores case).
    pub async fn group_members(
        &self,
        table: &str,
        primary_key: &str,
        columns: &[TableColumn],
        group: &DuplicateGroup,
    ) -> Result<Vec<Value>> {
        let mut predicates = Vec::with_capacity(group.values.len());
        let mut params = Vec::new();
        for (column, value) in &group.values {
            if value.is_null() {
                predicates.push(format!("{} is null", Ident(column)));
                continue;
            }
            let Some(typed) = columns.iter().find(|c| c.name == *column) else {
                return Err(Error::UnknownColumn {
                    table: table.to_string(),
                    column: column.clone(),
                });
            };
            params.push(value.clone());
            predicates.push(format!(
                "{} = ${}::text::{}",
                Ident(column),
                params.len(),
                typed.type_name
            ));
        }
        let sql = format!(
            "select {pk}::text as key, pg_typeof({pk})::text as key_type from {} {} order by {pk} asc",
            Qualified(&self.schema, table),
            where_clause(&predicates),
            pk = Ident(primary_key),
        );

        let rows = self.catalog.executor().select_many(&sql, &params).await?;
        rows.iter().map(member_key).collect()
    }

    /// Tables other than the rule's own that carry the reference column.
    async fn dependents(&self, rule: &UniquenessSpec) -> Result<Vec<String>> {
        let Some(reference) = &rule.reference_column else {
            return Ok(Vec::new());
        };
        let tables = self.catalog.list_tables(&self.schema, Some(reference)).await?;
        let dependents: Vec<String> = tables
            .into_iter()
            .filter(|t| !t.is_partition)
            .map(|t| t.name)
            .filter(|name| *name != rule.table)
            .collect();
        tracing::debug!(table = %rule.table, ?dependents, "dependent tables");
        Ok(dependents)
    }

    /// Live columns of the rule's table. Every rule column must be among them.
    async fn rule_columns(&self, rule: &UniquenessSpec) -> Result<Vec<TableColumn>> {
        let columns = self.catalog.table_columns(&self.schema, &rule.table).await?;
        if columns.is_empty() {
            return Err(Error::UnknownTable {
                schema: self.schema.clone(),
                table: rule.table.clone(),
            });
        }
        if let Some(missing) = rule
            .columns
            .iter()
            .find(|name| !columns.iter().any(|c| c.name == **name))
        {
            return Err(Error::UnknownColumn {
                table: rule.table.clone(),
                column: missing.clone(),
            });
        }
        Ok(columns)
    }

    async fn primary_key(&self, rule: &UniquenessSpec) -> Result<String> {
        if let Some(pk) = &rule.primary_key {
            return Ok(validate_ident(pk)?.to_string());
        }
        let mut columns = self.catalog.primary_key(&self.schema, &rule.table).await?;
        if columns.len() != 1 {
            return Err(Error::NoPrimaryKey {
                table: rule.table.clone(),
            });
        }
        Ok(columns.remove(0))
    }

    async fn count_dependents(&self, table: &str, column: &str, key: &Value) -> Result<i64> {
        let (predicate, param) = match key {
            Value::I16(_) | Value::I32(_) | Value::I64(_) => {
                (format!("{} = $1", Ident(column)), key.clone())
            }
            other => (
                format!("{}::text = $1", Ident(column)),
                Value::String(other.to_string()),
            ),
        };
        let sql = format!(
            "select count(*) as n from {} where {}",
            Qualified(&self.schema, table),
            predicate
        );
        let row = self.catalog.executor().select_one(&sql, &[param]).await?;
        row.int("n")
    }
}

fn group_from_row(row: Row, width: usize) -> Result<DuplicateGroup> {
    if row.len() != width + 1 {
        return Err(Error::SchemaInconsistency(format!(
            "duplicate query returned {} columns, expected {}",
            row.len(),
            width + 1
        )));
    }
    let mut values = row;
    // The count is always the last column, whatever the rule's columns are called.
    let Some((_, occurrences)) = values.pop() else {
        return Err(Error::SchemaInconsistency("empty duplicate row".to_string()));
    };
    let occurrences = occurrences.as_i64().ok_or_else(|| {
        Error::SchemaInconsistency(format!("occurrence count is {:?}", occurrences))
    })?;
    Ok(DuplicateGroup {
        values,
        occurrences,
    })
}

fn member_key(row: &Row) -> Result<Value> {
    let key = row.text("key")?;
    let key_type = row.text("key_type")?;
    if INTEGER_TYPES.contains(&key_type.as_str()) {
        let parsed = key.parse::<i64>().map_err(|_| {
            Error::SchemaInconsistency(format!("{} key '{}' is not an integer", key_type, key))
        })?;
        return Ok(Value::I64(parsed));
    }
    Ok(Value::String(key))
}
