//! Configuration schema (querygen.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default namespace of the placeholder call, as in `querygen.arg('Name')`
pub const DEFAULT_NAMESPACE: &str = "querygen";

/// Default deadline for a single catalog round trip
pub const DEFAULT_CATALOG_TIMEOUT_MS: u64 = 5_000;

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_catalog_timeout_ms() -> u64 {
    DEFAULT_CATALOG_TIMEOUT_MS
}

/// Catalog database connection settings
///
/// Either `url` or the individual fields may be given; `url` wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Full connection string (`postgres://...` or `host=... dbname=...`)
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub dbname: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Connect over TLS
    #[serde(default)]
    pub tls: bool,
}

impl ConnectionConfig {
    /// Connection config from a single connection string
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Render as a libpq-style connection string
    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        let mut parts = Vec::new();
        parts.push(format!("host={}", self.host.as_deref().unwrap_or("localhost")));
        parts.push(format!("port={}", self.port.unwrap_or(5432)));
        if let Some(dbname) = &self.dbname {
            parts.push(format!("dbname={}", dbname));
        }
        if let Some(user) = &self.user {
            parts.push(format!("user={}", user));
        }
        if let Some(password) = &self.password {
            parts.push(format!("password={}", password));
        }
        parts.join(" ")
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Namespace of the placeholder call in query bodies
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Deadline for each catalog round trip, in milliseconds
    #[serde(default = "default_catalog_timeout_ms")]
    pub catalog_timeout_ms: u64,

    /// Catalog database connection
    #[serde(default)]
    pub connection: Option<ConnectionConfig>,

    /// Query files to skip when walking directories (glob patterns)
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            catalog_timeout_ms: default_catalog_timeout_ms(),
            connection: None,
            exclude: Vec::new(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Deadline for a single catalog round trip
    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }

    /// Check if a query file should be skipped
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude.iter().any(|pattern| glob_match(pattern, path))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let valid_namespace = !self.namespace.is_empty()
            && self
                .namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_namespace {
            return Err(ConfigError::InvalidValue(format!(
                "namespace '{}' must be a non-empty identifier",
                self.namespace
            )));
        }

        if self.catalog_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "catalog_timeout_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Simple glob matching (supports a single `*`)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }

    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = pattern[star_pos + 1..].trim_start_matches('*');

        text.len() >= prefix.len() + suffix.len()
            && text.starts_with(prefix)
            && text.ends_with(suffix)
    } else {
        pattern == text
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
