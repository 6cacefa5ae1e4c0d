//! Strategy registry
//!
//! Maps declarative strategy definitions (from the config file or a test
//! scenario) to strategy instances.

use super::catalog;
use super::{BuildFromGit, DownloadFromCatalog, ExtractFromContainer, LocalBinary, SetupStrategy, StrategyKind};
use crate::common::config::Config;
use crate::common::Result;
use crate::tool::Tool;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Declarative acquisition strategy
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Clone and build
    BuildFromGit {
        url: String,
        branch: String,
        /// Package to build (default `./cmd/<name>`)
        #[serde(default)]
        package: Option<String>,
        /// Build argv with `{name}` / `{package}` placeholders
        #[serde(default)]
        build_command: Option<Vec<String>>,
    },
    /// Download from the configured catalog
    Download {
        /// Catalog entry name (defaults to the tool name)
        #[serde(default)]
        entry: Option<String>,
    },
    /// Look up on PATH
    Local {
        /// Directories to search instead of PATH
        #[serde(default)]
        search_path: Option<String>,
    },
    /// Copy out of a container image
    ExtractFromContainer { image: String, path: String },
}

impl StrategyConfig {
    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyConfig::BuildFromGit { .. } => StrategyKind::BuildFromGit,
            StrategyConfig::Download { .. } => StrategyKind::Download,
            StrategyConfig::Local { .. } => StrategyKind::Local,
            StrategyConfig::ExtractFromContainer { .. } => StrategyKind::ExtractFromContainer,
        }
    }

    /// Instantiate the strategy for `tool` using shared settings from `config`
    pub fn build(&self, tool: &str, config: &Config) -> Result<Arc<dyn SetupStrategy>> {
        let workspace = config.workspace.clone();
        let strategy: Arc<dyn SetupStrategy> = match self {
            StrategyConfig::BuildFromGit {
                url,
                branch,
                package,
                build_command,
            } => {
                let mut s = BuildFromGit::new(url, branch).with_workspace(workspace);
                if let Some(package) = package {
                    s = s.with_package(package);
                }
                if let Some(cmd) = build_command {
                    s = s.with_build_command(cmd.clone());
                }
                Arc::new(s)
            }
            StrategyConfig::Download { entry } => {
                let catalog = catalog::from_config(&config.catalog, &config.timeouts)?;
                let entry = entry.clone().unwrap_or_else(|| tool.to_string());
                Arc::new(
                    DownloadFromCatalog::new(entry, catalog)
                        .with_connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
                        .with_workspace(workspace),
                )
            }
            StrategyConfig::Local { search_path } => match search_path {
                Some(paths) => Arc::new(LocalBinary::in_paths(paths.clone())),
                None => Arc::new(LocalBinary::new()),
            },
            StrategyConfig::ExtractFromContainer { image, path } => Arc::new(
                ExtractFromContainer::new(image, path, config.docker.clone())
                    .with_auth(config.registry.clone())
                    .with_workspace(workspace),
            ),
        };
        Ok(strategy)
    }
}

/// Build a tool handle for `name` as configured (PATH lookup if unconfigured)
pub fn tool_from_config(name: &str, config: &Config) -> Result<Tool> {
    let strategy = config.tool_strategy(name).build(name, config)?;
    Ok(Tool::new(name).with_shared_strategy(strategy))
}
