use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::engine::EngineConfig;
use crate::models::ModelOptions;
use crate::{Error, Result};

/// Contents of `rowkeeper.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RowkeeperConfig {
    /// Connection descriptor, e.g. `sqlite:///database.db`
    pub database: Option<String>,
    pub echo: Option<bool>,
    pub expire_on_commit: Option<bool>,
    #[serde(default)]
    pub model: ModelOptions,
}

impl RowkeeperConfig {
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            echo: self.echo.unwrap_or(defaults.echo),
            expire_on_commit: self.expire_on_commit.unwrap_or(defaults.expire_on_commit),
        }
    }

    pub fn database_or_default(&self) -> String {
        self.database.clone().unwrap_or_else(default_database)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("rowkeeper.toml")
}

pub fn default_database() -> String {
    "sqlite:///database.db".to_string()
}

pub fn load_config(path: Option<&Path>) -> Result<Option<RowkeeperConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: RowkeeperConfig = toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &RowkeeperConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        )));
    }

    let contents = toml::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Create the parent directory of a database file if needed
pub fn ensure_db_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::OnDelete;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load_config(Some(&dir.path().join("rowkeeper.toml"))).unwrap(), None);
    }

    #[test]
    fn test_load_model_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rowkeeper.toml");
        std::fs::write(
            &path,
            "database = \"sqlite:///heroes.db\"\necho = true\n\n[model]\non_delete = \"cascade\"\nbidirectional = false\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(config.database.as_deref(), Some("sqlite:///heroes.db"));
        assert_eq!(config.model.on_delete, OnDelete::Cascade);
        assert!(!config.model.bidirectional);
        let engine = config.engine_config();
        assert!(engine.echo);
        assert!(engine.expire_on_commit);
    }

    #[test]
    fn test_write_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rowkeeper.toml");
        write_config(&path, &RowkeeperConfig::default(), false).unwrap();
        assert!(matches!(
            write_config(&path, &RowkeeperConfig::default(), false),
            Err(Error::Config(_))
        ));
        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.model, ModelOptions::default());
    }

    #[test]
    fn test_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rowkeeper.toml");
        std::fs::write(&path, "database = [").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(Error::Config(_))));
    }
}
