//! CLI configuration, read from `plainsql.toml`.
//!
//! ```toml
//! database_url = "postgres://localhost/app"
//! dialect = "postgres"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::adapter::DialectKind;
use crate::error::{PlainError, PlainResult};

/// File name looked up in the working directory.
pub const CONFIG_FILE: &str = "plainsql.toml";

/// Output format for result rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Database connection URL
    pub database_url: Option<String>,

    /// Escaping dialect when no database URL says otherwise
    pub dialect: Option<DialectKind>,

    #[serde(default)]
    pub format: OutputFormat,
}

impl Config {
    pub fn from_toml(text: &str) -> PlainResult<Self> {
        toml::from_str(text).map_err(|e| PlainError::Config(e.to_string()))
    }

    /// Load `explicit` if given, otherwise the first of `./plainsql.toml` and
    /// `<config dir>/plainsql/config.toml` that exists. No file means defaults.
    pub fn load(explicit: Option<&Path>) -> PlainResult<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::search_paths().into_iter().find(|p| p.exists()),
        };

        match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| PlainError::Config(format!("{}: {}", path.display(), e)))?;
                tracing::debug!(path = %path.display(), "loaded config");
                Self::from_toml(&text)
            }
            None => Ok(Self::default()),
        }
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("plainsql").join("config.toml"));
        }
        paths
    }

    /// The dialect to escape with: explicit setting, else the URL scheme,
    /// else PostgreSQL.
    pub fn effective_dialect(&self) -> DialectKind {
        self.dialect
            .or_else(|| self.database_url.as_deref().and_then(DialectKind::from_url))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml(
            r#"
            database_url = "mysql://root@localhost/app"
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("mysql://root@localhost/app"));
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.effective_dialect(), DialectKind::Mysql);
    }

    #[test]
    fn test_explicit_dialect_wins() {
        let config = Config::from_toml(
            r#"
            database_url = "mysql://root@localhost/app"
            dialect = "sqlite"
            "#,
        )
        .unwrap();
        assert_eq!(config.effective_dialect(), DialectKind::Sqlite);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.effective_dialect(), DialectKind::Postgres);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(matches!(
            Config::from_toml("databse_url = 'x'"),
            Err(PlainError::Config(_))
        ));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "dialect = \"mysql\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.dialect, Some(DialectKind::Mysql));
    }
}
