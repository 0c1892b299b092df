//! Configuration loading and management
//!
//! Every section is optional in the YAML file; missing values take their
//! defaults. `AppConfig::load` additionally honors a few environment
//! variables so the binary can be configured without a file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Names a YAML configuration file to load
pub const CONFIG_ENV: &str = "STORY_API_CONFIG";
/// Overrides `server.port`
pub const PORT_ENV: &str = "PORT";
/// Overrides `storage.data_folder`
pub const DATA_FOLDER_ENV: &str = "DATA_FOLDER";

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Prefix of every route (e.g. `/api`)
    pub prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: "/api".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Folder of the JSON collection files; in-memory storage when unset
    pub data_folder: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Number of tokens kept per identity
    pub tokens_limit: usize,
    pub default_admin_email: String,
    pub default_admin_password: String,

    /// Argon2 memory cost in KiB
    pub hash_memory_kib: u32,
    pub hash_iterations: u32,
    pub hash_parallelism: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            tokens_limit: crate::core::context::DEFAULT_TOKENS_LIMIT,
            default_admin_email: "admin@admin.com".to_string(),
            default_admin_password: "secret".to_string(),
            hash_memory_kib: argon2::Params::DEFAULT_M_COST,
            hash_iterations: argon2::Params::DEFAULT_T_COST,
            hash_parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Configuration of the running process
    ///
    /// Reads the file named by `STORY_API_CONFIG` when set, then applies the
    /// `PORT` and `DATA_FOLDER` overrides.
    pub fn load() -> Result<Self> {
        let base = match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_yaml_file(path)?,
            _ => Self::default(),
        };
        base.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply environment-style overrides looked up through `lookup`
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(port) = lookup(PORT_ENV) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("{} must be a port number, got '{}'", PORT_ENV, port))?;
        }
        if let Some(folder) = lookup(DATA_FOLDER_ENV).filter(|f| !f.trim().is_empty()) {
            self.storage.data_folder = Some(PathBuf::from(folder));
        }
        Ok(self)
    }

    /// `host:port` to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
