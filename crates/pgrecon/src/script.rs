//! Repair scripts: transactional SQL blocks written one file per table.

use crate::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::Write;

/// One transaction of repair statements with a comment saying what it does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairBlock {
    pub comment: String,
    pub statements: Vec<String>,
}

impl RepairBlock {
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            statements: Vec::new(),
        }
    }

    pub fn push(&mut self, statement: impl Into<String>) {
        self.statements.push(statement.into());
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl std::fmt::Display for RepairBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // A line break would end the comment early.
        let comment: String = self
            .comment
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        writeln!(f, "-- {}", comment)?;
        writeln!(f, "begin transaction;")?;
        for statement in &self.statements {
            writeln!(f, "{}", statement)?;
        }
        writeln!(f, "commit;")
    }
}

/// Writes `<table>.sql` files into a fresh output directory.
#[derive(Debug)]
pub struct ScriptWriter {
    dir: Utf8PathBuf,
}

impl ScriptWriter {
    /// Create the output directory. An existing directory is refused so the
    /// output of two runs never mixes.
    pub fn create(dir: impl Into<Utf8PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if dir.exists() {
            return Err(Error::AlreadyExists { path: dir });
        }
        std::fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir, "script directory created");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// The file a table's blocks go to.
    pub fn path_for(&self, table: &str) -> Result<Utf8PathBuf> {
        let table = pgrecon_sql::validate_ident(table)?;
        Ok(self.dir.join(format!("{}.sql", table)))
    }

    /// Append the blocks for one table in a single write.
    ///
    /// Nothing is created when `blocks` is empty; the path written is
    /// returned otherwise.
    pub fn append(&self, table: &str, blocks: &[RepairBlock]) -> Result<Option<Utf8PathBuf>> {
        let path = self.path_for(table)?;
        let blocks: Vec<&RepairBlock> = blocks.iter().filter(|b| !b.is_empty()).collect();
        if blocks.is_empty() {
            return Ok(None);
        }

        let mut script = String::new();
        for block in &blocks {
            script.push_str(&block.to_string());
            script.push('\n');
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.write_all(script.as_bytes())?;
        tracing::info!(path = %path, blocks = blocks.len(), "repair script written");
        Ok(Some(path))
    }
}
