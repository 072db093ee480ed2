//! Connection configuration.
//!
//! Loaded from `<config dir>/framehouse/config.toml` when present:
//!
//! ```toml
//! host = "http://localhost:8123"
//! database = "analytics"
//! strategy = "textual"
//!
//! [settings]
//! max_threads = "4"
//! ```
//!
//! `FRAMEHOUSE_HOST` and `FRAMEHOUSE_DATABASE` override the file.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::decoder::{ArrayLiteralDecoder, Strategy};
use crate::error::{Error, Result};
use crate::native::{NativeDecoder, DEFAULT_MARGIN};

pub const ENV_HOST: &str = "FRAMEHOUSE_HOST";
pub const ENV_DATABASE: &str = "FRAMEHOUSE_DATABASE";

/// Where to send queries and how to decode what comes back.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the HTTP interface
    #[serde(default = "default_host")]
    pub host: String,

    /// Database used for unqualified table names
    #[serde(default = "default_database")]
    pub database: String,

    /// Extra settings sent as URL parameters with every request
    #[serde(default)]
    pub settings: BTreeMap<String, String>,

    /// Array literal decoding strategy
    #[serde(default)]
    pub strategy: Strategy,

    /// Output room for the native decoder
    #[serde(default = "default_margin")]
    pub native_margin: usize,
}

fn default_host() -> String {
    "http://localhost:8123".to_string()
}

fn default_database() -> String {
    "default".to_string()
}

fn default_margin() -> usize {
    DEFAULT_MARGIN
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            database: default_database(),
            settings: BTreeMap::new(),
            strategy: Strategy::default(),
            native_margin: DEFAULT_MARGIN,
        }
    }
}

impl ConnectionConfig {
    /// Create a new configuration builder
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read a TOML file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Default config file location, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("framehouse").join("config.toml"))
    }

    /// Load the default file (or defaults when absent), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config = match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load_from(&path)?
            }
            _ => Self::default(),
        };
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply overrides from a variable lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(database) = lookup(ENV_DATABASE) {
            self.database = database;
        }
        self
    }

    /// Endpoint URL carrying the database and settings parameters.
    pub fn endpoint(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.host)
            .map_err(|e| Error::Config(format!("invalid host '{}': {}", self.host, e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("database", &self.database);
            for (key, value) in &self.settings {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Decoder configured with this strategy and margin.
    pub fn decoder(&self) -> ArrayLiteralDecoder {
        ArrayLiteralDecoder::new(self.strategy)
            .with_native(NativeDecoder::new().margin(self.native_margin))
    }
}

/// Builder for ConnectionConfig
#[derive(Debug, Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Set the host URL
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the database
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    /// Add a request setting
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.settings.insert(key.into(), value.into());
        self
    }

    /// Set the decoding strategy
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Set the native decoder margin
    pub fn native_margin(mut self, margin: usize) -> Self {
        self.config.native_margin = margin;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = ConnectionConfig::from_toml_str("").unwrap();
        assert_eq!(config, ConnectionConfig::default());
    }

    #[test]
    fn test_full_toml() {
        let config = ConnectionConfig::from_toml_str(
            r#"
            host = "http://ch:8123"
            database = "analytics"
            strategy = "native"
            native_margin = 4096

            [settings]
            max_threads = "4"
            "#,
        )
        .unwrap();
        assert_eq!(config.host, "http://ch:8123");
        assert_eq!(config.database, "analytics");
        assert_eq!(config.strategy, Strategy::Native);
        assert_eq!(config.native_margin, 4096);
        assert_eq!(config.settings.get("max_threads").map(String::as_str), Some("4"));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            ConnectionConfig::from_toml_str("strategy = \"fast\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = ConnectionConfig::default().with_overrides(|key| match key {
            ENV_DATABASE => Some("other".to_string()),
            _ => None,
        });
        assert_eq!(config.database, "other");
        assert_eq!(config.host, "http://localhost:8123");
    }

    #[test]
    fn test_endpoint() {
        let config = ConnectionConfig::builder()
            .host("http://ch:8123/")
            .database("db")
            .setting("max_threads", "2")
            .build();
        assert_eq!(
            config.endpoint().unwrap().as_str(),
            "http://ch:8123/?database=db&max_threads=2"
        );
    }

    #[test]
    fn test_invalid_host() {
        let config = ConnectionConfig::builder().host("not a url").build();
        assert!(matches!(config.endpoint(), Err(Error::Config(_))));
    }
}
