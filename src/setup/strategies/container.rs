//! Container extraction
//!
//! Lifts a binary that only ships inside a container image: pull the image,
//! create a container that is never started, copy one file out and unpack it.

use crate::common::config::{DockerConfig, RegistryAuth, WorkspaceConfig};
use crate::common::{cancellable, Error, Result};
use crate::setup::archive::extract_binary;
use crate::setup::docker::{BollardRuntime, ContainerRuntime};
use crate::setup::installer::{platform_str, Workspace};
use crate::setup::{Acquired, SetupStrategy, StrategyKind};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How the strategy reaches a container runtime
#[derive(Clone)]
enum RuntimeSource {
    /// Fresh bollard connection per acquisition
    Docker(DockerConfig),
    /// Caller-supplied runtime
    Custom(Arc<dyn ContainerRuntime>),
}

/// Extract the file at `path` from `image`
#[derive(Clone)]
pub struct ExtractFromContainer {
    image: String,
    path: String,
    runtime: RuntimeSource,
    auth: RegistryAuth,
    platform: String,
    remove_container: bool,
    workspace: WorkspaceConfig,
}

impl ExtractFromContainer {
    /// Extract using the Docker daemon described by `docker`
    pub fn new(image: impl Into<String>, path: impl Into<String>, docker: DockerConfig) -> Self {
        let platform = docker
            .platform
            .clone()
            .unwrap_or_else(|| platform_str().to_string());
        let remove_container = docker.remove_container;
        Self {
            image: image.into(),
            path: path.into(),
            runtime: RuntimeSource::Docker(docker),
            auth: RegistryAuth::default(),
            platform,
            remove_container,
            workspace: WorkspaceConfig::default(),
        }
    }

    /// Extract using an already connected runtime
    pub fn with_runtime(
        image: impl Into<String>,
        path: impl Into<String>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            image: image.into(),
            path: path.into(),
            runtime: RuntimeSource::Custom(runtime),
            auth: RegistryAuth::default(),
            platform: platform_str().to_string(),
            remove_container: true,
            workspace: WorkspaceConfig::default(),
        }
    }

    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_workspace(mut self, workspace: WorkspaceConfig) -> Self {
        self.workspace = workspace;
        self
    }

    /// Leave the throwaway container behind for inspection
    pub fn keep_container(mut self) -> Self {
        self.remove_container = false;
        self
    }

    async fn connect(&self) -> Result<Arc<dyn ContainerRuntime>> {
        match &self.runtime {
            RuntimeSource::Docker(config) => Ok(Arc::new(BollardRuntime::connect(config).await?)),
            RuntimeSource::Custom(runtime) => Ok(Arc::clone(runtime)),
        }
    }

    async fn copy_out(
        &self,
        runtime: &dyn ContainerRuntime,
        container_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Acquired> {
        let archive = cancellable(
            cancel,
            "copy from container",
            runtime.copy_from_container(container_id, &self.path, cancel),
        )
        .await?;

        let name = binary_name_from_path(&self.path)?;
        let workspace = Workspace::create(&name, &self.workspace)?;
        let dest = workspace.path().join(&name);

        let written = cancellable(cancel, "extract", extract_binary(archive, &dest)).await?;
        tracing::debug!(image = %self.image, path = %self.path, bytes = written, "Extracted binary");

        Ok(Acquired::in_workspace(dest, workspace))
    }
}

/// Removes the throwaway container, including when acquisition is dropped mid-copy
struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    id: Option<String>,
}

impl ContainerGuard {
    fn new(runtime: Arc<dyn ContainerRuntime>, id: String) -> Self {
        Self {
            runtime,
            id: Some(id),
        }
    }

    async fn remove(mut self) {
        if let Some(id) = self.id.take() {
            remove_logged(self.runtime.as_ref(), &id).await;
        }
    }

    /// Leave the container in place
    fn keep(mut self) {
        if let Some(id) = self.id.take() {
            tracing::info!(container = %id, "Keeping container");
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let runtime = Arc::clone(&self.runtime);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { remove_logged(runtime.as_ref(), &id).await });
            }
            Err(_) => tracing::warn!(container = %id, "No runtime left to remove container"),
        }
    }
}

async fn remove_logged(runtime: &dyn ContainerRuntime, id: &str) {
    match runtime.remove_container(id).await {
        Ok(()) => tracing::debug!(container = %id, "Removed container"),
        Err(e) => tracing::warn!(container = %id, error = %e, "Failed to remove container"),
    }
}

/// Logical binary name: base name of the in-container path without extension
pub fn binary_name_from_path(path: &str) -> Result<String> {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Config(format!("cannot derive a binary name from '{}'", path)))
}

#[async_trait]
impl SetupStrategy for ExtractFromContainer {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ExtractFromContainer
    }

    fn describe(&self) -> String {
        format!("extract {} from {}", self.path, self.image)
    }

    async fn acquire(&self, _tool: &str, cancel: &CancellationToken) -> Result<Acquired> {
        binary_name_from_path(&self.path)?;

        let runtime = cancellable(cancel, "connect to container runtime", self.connect()).await?;

        tracing::info!(image = %self.image, "Pulling image");
        cancellable(
            cancel,
            "image pull",
            runtime.pull_image(&self.image, &self.auth),
        )
        .await?;

        let name = Uuid::new_v4().to_string();
        let container_id = cancellable(
            cancel,
            "container create",
            runtime.create_container(&self.image, &name, &self.platform),
        )
        .await?;

        let guard = ContainerGuard::new(Arc::clone(&runtime), container_id.clone());
        let result = self.copy_out(runtime.as_ref(), &container_id, cancel).await;

        if self.remove_container {
            guard.remove().await;
        } else {
            guard.keep();
        }

        result
    }
}
