//! Schema snapshots and index comparison.

use crate::catalog::{Catalog, ClassColumn, ConstraintDescriptor, ConstraintKinds, IndexDescriptor};
use crate::executor::Executor;
use crate::{Error, Result};
use camino::Utf8Path;
use facet::Facet;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::io::Write;

/// Structure of one schema at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Facet)]
pub struct SchemaSnapshot {
    /// Columns grouped by relation kind label (`table`, `view`, ...).
    pub classes: IndexMap<String, Vec<ClassColumn>>,
    pub constraint: Vec<ConstraintDescriptor>,
    pub index: Vec<IndexDescriptor>,
}

impl SchemaSnapshot {
    pub fn to_json(&self) -> Result<String> {
        facet_json::to_string(self).map_err(|e| Error::Snapshot(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        facet_json::from_str(json).map_err(|e| Error::Snapshot(e.to_string()))
    }

    /// Write the snapshot to `path`. An existing file is only replaced when
    /// `overwrite` is set.
    pub fn save(&self, path: &Utf8Path, overwrite: bool) -> Result<()> {
        let json = self.to_json()?;
        let mut options = std::fs::OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = options.open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => Error::AlreadyExists {
                path: path.to_owned(),
            },
            _ => Error::Io(e),
        })?;
        file.write_all(json.as_bytes())?;
        tracing::info!(path = %path, "snapshot saved");
        Ok(())
    }

    pub fn load(path: &Utf8Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Indexes present in only one of the two snapshots.
    pub fn diff_indexes(&self, other: &SchemaSnapshot) -> IndexDiff {
        diff_indexes(&self.index, &other.index)
    }

    /// Number of columns across all relation kinds.
    pub fn column_count(&self) -> usize {
        self.classes.values().map(Vec::len).sum()
    }
}

/// Index identity keys found on only one side of a comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDiff {
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
}

impl IndexDiff {
    pub fn is_empty(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty()
    }

    /// The same comparison seen from the other side.
    pub fn swap(self) -> Self {
        Self {
            only_in_a: self.only_in_b,
            only_in_b: self.only_in_a,
        }
    }
}

impl std::fmt::Display for IndexDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return writeln!(f, "Indexes match.");
        }
        for key in &self.only_in_a {
            writeln!(f, "  - {}", key)?;
        }
        for key in &self.only_in_b {
            writeln!(f, "  + {}", key)?;
        }
        Ok(())
    }
}

/// Compare two index lists by what each index covers, ignoring names.
///
/// Each side is listed in first-seen order without repeats.
pub fn diff_indexes(a: &[IndexDescriptor], b: &[IndexDescriptor]) -> IndexDiff {
    IndexDiff {
        only_in_a: only_in(a, b),
        only_in_b: only_in(b, a),
    }
}

fn only_in(left: &[IndexDescriptor], right: &[IndexDescriptor]) -> Vec<String> {
    let right_keys: HashSet<String> = right.iter().map(IndexDescriptor::identity_key).collect();
    let mut seen = HashSet::new();
    left.iter()
        .map(IndexDescriptor::identity_key)
        .filter(|key| !right_keys.contains(key) && seen.insert(key.clone()))
        .collect()
}

impl<E: Executor + ?Sized> Catalog<'_, E> {
    /// Capture columns, constraints and indexes of a schema.
    pub async fn snapshot(&self, schema: &str) -> Result<SchemaSnapshot> {
        let (columns, constraint, index) = tokio::try_join!(
            self.list_class_columns(schema),
            self.list_constraints(schema, None, &ConstraintKinds::All),
            self.list_indexes(schema),
        )?;

        let mut classes: IndexMap<String, Vec<ClassColumn>> = IndexMap::new();
        for column in columns {
            classes
                .entry(column.class_type.clone())
                .or_default()
                .push(column);
        }

        tracing::debug!(
            schema,
            columns = classes.values().map(Vec::len).sum::<usize>(),
            constraints = constraint.len(),
            indexes = index.len(),
            "snapshot taken"
        );
        Ok(SchemaSnapshot {
            classes,
            constraint,
            index,
        })
    }
}
