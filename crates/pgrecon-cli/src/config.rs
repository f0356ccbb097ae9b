//! Configuration file handling for pgrecon.
//!
//! Looks for `.config/pgrecon.styx` in the current directory or any parent directory.

pub use pgrecon_config::Config;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

const CONFIG_FILE: &str = ".config/pgrecon.styx";

/// Load configuration from `.config/pgrecon.styx`, searching up the directory tree.
pub fn load() -> Result<(Config, Utf8PathBuf), ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(e.to_string()))?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|p| ConfigError::Io(format!("{} is not valid UTF-8", p.display())))?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory.
pub fn load_from(start: &Utf8Path) -> Result<(Config, Utf8PathBuf), ConfigError> {
    let config_path = find_config_file(start)?;
    let content =
        std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Io(e.to_string()))?;

    let config: Config =
        facet_styx::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    Ok((config, config_path))
}

/// Like [`load`], but a missing file gives the default configuration.
pub fn load_or_default() -> Result<(Config, Option<Utf8PathBuf>), ConfigError> {
    match load() {
        Ok((config, path)) => Ok((config, Some(path))),
        Err(ConfigError::NotFound) => Ok((Config::default(), None)),
        Err(e) => Err(e),
    }
}

/// Find `.config/pgrecon.styx` by searching up the directory tree.
fn find_config_file(start: &Utf8Path) -> Result<Utf8PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(ConfigError::NotFound);
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No `.config/pgrecon.styx` found in any parent directory
    #[error("No .config/pgrecon.styx found in current directory or any parent")]
    NotFound,
    /// I/O error reading the file
    #[error("Failed to read .config/pgrecon.styx: {0}")]
    Io(String),
    /// Parse error in the Styx file
    #[error("Failed to parse .config/pgrecon.styx: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(root: &Utf8Path, content: &str) {
        std::fs::create_dir_all(root.join(".config")).unwrap();
        std::fs::write(root.join(CONFIG_FILE), content).unwrap();
    }

    #[test]
    fn test_found_in_parent_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(tmp.path()).unwrap();
        write_config(root, "schema app\nunique ({table user, columns (email)})\n");
        let nested = root.join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, path) = load_from(&nested).unwrap();
        assert_eq!(path, root.join(CONFIG_FILE));
        assert_eq!(config.schema(), "app");
        assert_eq!(config.unique.len(), 1);
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(tmp.path()).unwrap();
        write_config(root, "unique {{{");

        let err = load_from(root).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("pgrecon.styx"));
    }
}
