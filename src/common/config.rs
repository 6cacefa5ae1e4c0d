//! Configuration file handling

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::Result;
use crate::setup::registry::StrategyConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Tools and how to acquire them, keyed by logical name
    #[serde(default)]
    pub tools: BTreeMap<String, StrategyConfig>,

    /// Container runtime connection
    #[serde(default)]
    pub docker: DockerConfig,

    /// Registry credentials for image pulls
    #[serde(default)]
    pub registry: RegistryAuth,

    /// Download catalog settings
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Acquisition workspace settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Container runtime connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct DockerConfig {
    /// Daemon address (`unix:///var/run/docker.sock`, `tcp://host:2375`).
    /// Falls back to `DOCKER_HOST` and then the platform default socket.
    #[serde(default)]
    pub host: Option<String>,

    /// Request timeout for the runtime client
    #[serde(default = "default_docker_timeout")]
    pub timeout_secs: u64,

    /// Platform OS for throwaway containers (defaults to the host OS)
    #[serde(default)]
    pub platform: Option<String>,

    /// Remove the throwaway container after copying the binary out
    #[serde(default = "default_true")]
    pub remove_container: bool,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: None,
            timeout_secs: default_docker_timeout(),
            platform: None,
            remove_container: true,
        }
    }
}

fn default_docker_timeout() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

/// Registry credentials used when pulling images
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub server_address: Option<String>,
    #[serde(default)]
    pub identity_token: Option<String>,
}

impl RegistryAuth {
    /// Overlay `REGISTRY_USERNAME`, `REGISTRY_PASSWORD`, `REGISTRY_SERVER`
    /// and `REGISTRY_TOKEN` from the environment
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("REGISTRY_USERNAME") {
            self.username = Some(v);
        }
        if let Some(v) = lookup("REGISTRY_PASSWORD") {
            self.password = Some(v);
        }
        if let Some(v) = lookup("REGISTRY_SERVER") {
            self.server_address = Some(v);
        }
        if let Some(v) = lookup("REGISTRY_TOKEN") {
            self.identity_token = Some(v);
        }
    }

    /// Whether no credential is present
    pub fn is_anonymous(&self) -> bool {
        self.username.is_none() && self.password.is_none() && self.identity_token.is_none()
    }
}

/// Download catalog settings
#[derive(Debug, Deserialize, Default, Clone)]
pub struct CatalogConfig {
    /// Cluster API URL serving `ConsoleCLIDownload` resources
    #[serde(default)]
    pub api_url: Option<String>,

    /// Bearer token for the cluster API (`CATALOG_TOKEN` overrides)
    #[serde(default)]
    pub token: Option<String>,

    /// Static links: entry name -> OS -> URL. Consulted when `api_url` is unset.
    #[serde(default)]
    pub links: BTreeMap<String, BTreeMap<String, String>>,
}

/// Acquisition workspace settings
#[derive(Debug, Deserialize, Default, Clone)]
pub struct WorkspaceConfig {
    /// Keep workspaces on disk after the tool is destroyed
    #[serde(default)]
    pub keep: bool,

    /// Parent directory for workspaces (defaults to the system temp dir)
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Timeout for catalog lookups
    #[serde(default = "default_catalog_request")]
    pub catalog_request_secs: u64,

    /// Timeout for establishing download connections
    #[serde(default = "default_connect")]
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            catalog_request_secs: default_catalog_request(),
            connect_secs: default_connect(),
        }
    }
}

fn default_catalog_request() -> u64 {
    30
}
fn default_connect() -> u64 {
    30
}

impl Config {
    /// Load configuration from `path`, or from the default config file
    ///
    /// Returns default configuration if the default file doesn't exist.
    /// An explicit path that doesn't exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(super::Error::Config(format!(
                        "Config file not found: {}",
                        p.display()
                    )));
                }
                Some(p.to_path_buf())
            }
            None => config_path().filter(|p| p.exists()),
        };

        let config = match path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(&path).map_err(|e| super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };

        Ok(config.with_env_overrides())
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    fn with_env_overrides(mut self) -> Self {
        self.registry = self.registry.with_env_overrides();
        if let Ok(token) = std::env::var("CATALOG_TOKEN") {
            self.catalog.token = Some(token);
        }
        self
    }

    /// Get the acquisition strategy configured for a tool
    ///
    /// Falls back to a PATH lookup when the tool is not explicitly configured
    pub fn tool_strategy(&self, name: &str) -> StrategyConfig {
        self.tools
            .get(name)
            .cloned()
            .unwrap_or(StrategyConfig::Local { search_path: None })
    }
}
