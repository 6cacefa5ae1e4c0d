//! Catalog download
//!
//! Resolves a platform-specific link from a [`DownloadCatalog`] and streams
//! the artifact into a private workspace, unpacking it on the way.

use crate::common::config::WorkspaceConfig;
use crate::common::{cancellable, Result};
use crate::setup::catalog::DownloadCatalog;
use crate::setup::installer::{
    download_and_unpack, http_client, make_executable, platform_str, Workspace,
};
use crate::setup::{Acquired, SetupStrategy, StrategyKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Download the catalog entry `entry` for the host OS
pub struct DownloadFromCatalog {
    entry: String,
    catalog: Arc<dyn DownloadCatalog>,
    os: String,
    connect_timeout: Duration,
    workspace: WorkspaceConfig,
}

impl DownloadFromCatalog {
    pub fn new(entry: impl Into<String>, catalog: Arc<dyn DownloadCatalog>) -> Self {
        Self {
            entry: entry.into(),
            catalog,
            os: platform_str().to_string(),
            connect_timeout: Duration::from_secs(30),
            workspace: WorkspaceConfig::default(),
        }
    }

    /// Look up links for another OS than the host's
    pub fn for_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_workspace(mut self, workspace: WorkspaceConfig) -> Self {
        self.workspace = workspace;
        self
    }
}

#[async_trait]
impl SetupStrategy for DownloadFromCatalog {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Download
    }

    fn describe(&self) -> String {
        format!("download '{}' from {}", self.entry, self.catalog.describe())
    }

    async fn acquire(&self, _tool: &str, cancel: &CancellationToken) -> Result<Acquired> {
        let link = cancellable(
            cancel,
            "catalog lookup",
            self.catalog.download_link(&self.entry, &self.os),
        )
        .await?;

        let workspace = Workspace::create(&self.entry, &self.workspace)?;
        let dest = workspace.path().join(&self.entry);

        tracing::info!(entry = %self.entry, url = %link, "Downloading");
        let client = http_client(self.connect_timeout)?;
        cancellable(
            cancel,
            "download",
            download_and_unpack(&client, &link, &dest, workspace.path()),
        )
        .await?;
        make_executable(&dest)?;

        Ok(Acquired::in_workspace(dest, workspace))
    }
}
