//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables,
//! plus the project file (`.agentenv.yml`) the CLI falls back to.

use crate::export::{ExportOptions, DEFAULT_MAX_DEPTH};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Project file consulted for a database URL
pub const PROJECT_FILE: &str = ".agentenv.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 3000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    /// Source database registered at startup, if any
    pub database_url: Option<String>,
    pub cors: CorsConfig,
    pub export: ExportOptions,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ServerConfig::default();
        let server = ServerConfig {
            host: parse_or(&lookup, "HOST", defaults.host)?,
            port: parse_or(&lookup, "PORT", defaults.port)?,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let cors = CorsConfig {
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let export = ExportOptions {
            max_depth: parse_or(&lookup, "EXPORT_MAX_DEPTH", DEFAULT_MAX_DEPTH)?,
            strict: match lookup("EXPORT_STRICT") {
                Some(value) => parse_flag("EXPORT_STRICT", &value)?,
                None => false,
            },
            timeout: match lookup("EXPORT_TIMEOUT_SECS") {
                Some(_) => Some(Duration::from_secs(parse_or(&lookup, "EXPORT_TIMEOUT_SECS", 0)?)),
                None => None,
            },
        };

        if export.max_depth == 0 {
            return Err(ConfigError::InvalidValue(
                "EXPORT_MAX_DEPTH must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            server,
            database_url,
            cors,
            export,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}={}", key, raw))),
        None => Ok(default),
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!("{}={}", key, raw))),
    }
}

/// The slice of the project file the exporter cares about
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub database: ProjectDatabase,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectDatabase {
    #[serde(default)]
    pub main_url: Option<String>,
}

impl ProjectConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn main_url(&self) -> Option<&str> {
        self.database
            .main_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
    }
}
