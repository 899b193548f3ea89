//! Configuration module for errstore
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `ERRSTORE__*` environment variables (`ERRSTORE__STORE__ROLLUP_SECONDS=60`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::store::{StoreError, DEFAULT_DISPLAY_COUNT, DEFAULT_ROLLUP_SECONDS};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Error store configuration
    #[serde(default)]
    pub store: StoreSettings,

    /// Named connection strings, referenced by `store.connection_string_name`
    #[serde(default)]
    pub connection_strings: ConnectionStrings,
}

pub type ConnectionStrings = HashMap<String, String>;

/// Backing database technology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Postgres,
    Memory,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Sqlite => write!(f, "sqlite"),
            StoreKind::Postgres => write!(f, "postgres"),
            StoreKind::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqlite" => Ok(StoreKind::Sqlite),
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            _ => Err(format!("Unknown store kind: {}", s)),
        }
    }
}

/// Error store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub kind: StoreKind,

    /// Application namespace the store logs under
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Connection string, takes precedence over `connection_string_name`
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Key into `[connection_strings]`
    #[serde(default)]
    pub connection_string_name: Option<String>,

    /// How many errors to list by default (display only, the log is not truncated)
    #[serde(default = "default_size")]
    pub size: u32,

    /// Duplicate errors within this many seconds are rolled up, 0 disables
    #[serde(default = "default_rollup_seconds")]
    pub rollup_seconds: u64,
}

fn default_application_name() -> String {
    "errstore".to_string()
}

fn default_size() -> u32 {
    DEFAULT_DISPLAY_COUNT
}

fn default_rollup_seconds() -> u64 {
    DEFAULT_ROLLUP_SECONDS
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            application_name: default_application_name(),
            connection_string: None,
            connection_string_name: None,
            size: default_size(),
            rollup_seconds: default_rollup_seconds(),
        }
    }
}

impl StoreSettings {
    /// Resolve the connection string directly or by name.
    ///
    /// Fails when neither yields a non-empty value.
    pub fn resolve_connection_string(&self, named: &ConnectionStrings) -> Result<String, StoreError> {
        if let Some(cs) = self.connection_string.as_deref().filter(|cs| !cs.trim().is_empty()) {
            return Ok(cs.to_string());
        }

        let name = self
            .connection_string_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                StoreError::Config(
                    "a connection string or connection string name must be specified".to_string(),
                )
            })?;

        named
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, cs)| cs.clone())
            .filter(|cs| !cs.trim().is_empty())
            .ok_or_else(|| StoreError::Config(format!("connection string '{}' not found", name)))
    }
}

/// Configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),
}

/// Get the data directory for errstore
pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("errstore"))
        .or_else(|| dirs::home_dir().map(|h| h.join(".errstore")))
        .unwrap_or_else(|| PathBuf::from(".errstore"))
}

/// Get the config directory for errstore
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("errstore"))
        .unwrap_or_else(get_data_dir)
}

/// Default SQLite connection string under the data directory
pub fn default_sqlite_connection_string() -> String {
    format!("sqlite://{}", get_data_dir().join("errors.db").display())
}

/// Load configuration.
///
/// An explicit `path` must exist; otherwise `<config_dir>/config.toml` is read
/// when present. Environment variables override either.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let (file, required) = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound(p.to_path_buf()));
            }
            (p.to_path_buf(), true)
        }
        None => (get_config_dir().join("config.toml"), false),
    };

    let settings = config::Config::builder()
        .add_source(
            config::File::new(&file.to_string_lossy(), config::FileFormat::Toml).required(required),
        )
        .add_source(
            config::Environment::with_prefix("ERRSTORE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config = settings.try_deserialize::<Config>()?;
    tracing::debug!("Loaded configuration (store kind: {})", config.store.kind);
    Ok(config)
}

/// Render the effective configuration as TOML
pub fn render_config(config: &Config) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = StoreSettings::default();
        assert_eq!(settings.kind, StoreKind::Sqlite);
        assert_eq!(settings.size, 200);
        assert_eq!(settings.rollup_seconds, 600);
    }

    #[test]
    fn test_store_kind_round_trip() {
        for kind in [StoreKind::Sqlite, StoreKind::Postgres, StoreKind::Memory] {
            assert_eq!(kind.to_string().parse::<StoreKind>().unwrap(), kind);
        }
        assert!("oracle".parse::<StoreKind>().is_err());
    }

    #[test]
    fn test_resolve_direct_connection_string_wins() {
        let settings = StoreSettings {
            connection_string: Some("sqlite::memory:".to_string()),
            connection_string_name: Some("errors".to_string()),
            ..Default::default()
        };
        let named = ConnectionStrings::from([("errors".to_string(), "sqlite://other.db".to_string())]);

        assert_eq!(settings.resolve_connection_string(&named).unwrap(), "sqlite::memory:");
    }

    #[test]
    fn test_resolve_by_name() {
        let settings = StoreSettings {
            connection_string_name: Some("Errors".to_string()),
            ..Default::default()
        };
        let named = ConnectionStrings::from([("errors".to_string(), "sqlite://errors.db".to_string())]);

        assert_eq!(settings.resolve_connection_string(&named).unwrap(), "sqlite://errors.db");
    }

    #[test]
    fn test_resolve_missing_is_config_error() {
        let settings = StoreSettings {
            connection_string: Some("  ".to_string()),
            ..Default::default()
        };
        let err = settings.resolve_connection_string(&ConnectionStrings::new()).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));

        let settings = StoreSettings {
            connection_string_name: Some("nope".to_string()),
            ..Default::default()
        };
        let err = settings.resolve_connection_string(&ConnectionStrings::new()).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errstore.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[store]
kind = "memory"
application_name = "Billing"
size = 50
rollup_seconds = 30

[connection_strings]
main = "sqlite://billing.db"
"#
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.store.kind, StoreKind::Memory);
        assert_eq!(config.store.application_name, "Billing");
        assert_eq!(config.store.size, 50);
        assert_eq!(config.store.rollup_seconds, 30);
        assert_eq!(config.connection_strings["main"], "sqlite://billing.db");
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_render_config() {
        let rendered = render_config(&Config::default()).unwrap();
        assert!(rendered.contains("[store]"));
        assert!(rendered.contains("rollup_seconds = 600"));
    }
}
