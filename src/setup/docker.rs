//! Container runtime abstraction
//!
//! [`ContainerRuntime`] covers the handful of calls needed to lift a file out
//! of an image. [`BollardRuntime`] talks to a Docker-compatible daemon; tests
//! substitute an in-memory implementation.

use crate::common::config::{DockerConfig, RegistryAuth};
use crate::common::{Error, Result};
use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder,
    DownloadFromContainerOptionsBuilder, RemoveContainerOptionsBuilder,
};
use bollard::Docker;
use futures_util::{stream, StreamExt};
use std::io;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

/// Byte stream of a tar archive copied out of a container
pub type ArchiveReader = Box<dyn AsyncRead + Send + Unpin>;

/// Operations on a container runtime used during extraction
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pull `image`, draining progress to the debug log
    async fn pull_image(&self, image: &str, auth: &RegistryAuth) -> Result<()>;

    /// Create (but never start) a container from `image`; returns its ID
    async fn create_container(&self, image: &str, name: &str, platform: &str) -> Result<String>;

    /// Copy `path` out of a container as a tar stream
    ///
    /// The stream ends early if `cancel` fires.
    async fn copy_from_container(
        &self,
        id: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<ArchiveReader>;

    /// Force-remove a container
    async fn remove_container(&self, id: &str) -> Result<()>;
}

/// Docker-compatible runtime client backed by `bollard`
pub struct BollardRuntime {
    docker: Docker,
}

impl BollardRuntime {
    /// Connect using explicit settings and negotiate the API version
    ///
    /// Without `config.host`, `DOCKER_HOST` and then the platform default
    /// socket are used.
    pub async fn connect(config: &DockerConfig) -> Result<Self> {
        let timeout = config.timeout_secs;
        let docker = match config.host.as_deref() {
            Some(host) if host.starts_with("unix://") || host.starts_with("npipe://") => {
                let socket = host
                    .trim_start_matches("unix://")
                    .trim_start_matches("npipe://");
                Docker::connect_with_socket(socket, timeout, bollard::API_DEFAULT_VERSION)
            }
            Some(host) => Docker::connect_with_http(host, timeout, bollard::API_DEFAULT_VERSION),
            None => Docker::connect_with_defaults(),
        }
        .map_err(|e| Error::Docker(format!("failed to connect to container runtime: {}", e)))?;

        let docker = docker
            .negotiate_version()
            .await
            .map_err(|e| Error::Docker(format!("API version negotiation failed: {}", e)))?;

        Ok(Self { docker })
    }
}

fn credentials(auth: &RegistryAuth) -> Option<DockerCredentials> {
    if auth.is_anonymous() {
        return None;
    }
    Some(DockerCredentials {
        username: auth.username.clone(),
        password: auth.password.clone(),
        serveraddress: auth.server_address.clone(),
        identitytoken: auth.identity_token.clone(),
        ..Default::default()
    })
}

#[async_trait]
impl ContainerRuntime for BollardRuntime {
    async fn pull_image(&self, image: &str, auth: &RegistryAuth) -> Result<()> {
        let options = CreateImageOptionsBuilder::default().from_image(image).build();
        let mut progress = self.docker.create_image(Some(options), None, credentials(auth));

        // The daemon stalls the pull unless the progress stream is consumed
        while let Some(info) = progress.next().await {
            let info =
                info.map_err(|e| Error::Docker(format!("failed to pull {}: {}", image, e)))?;
            tracing::debug!(
                app = "docker",
                status = info.status.as_deref().unwrap_or(""),
                progress = info.progress.as_deref().unwrap_or(""),
                "pull {}",
                image
            );
        }
        Ok(())
    }

    async fn create_container(&self, image: &str, name: &str, platform: &str) -> Result<String> {
        let options = CreateContainerOptionsBuilder::default()
            .name(name)
            .platform(platform)
            .build();
        let body = ContainerCreateBody {
            image: Some(image.to_string()),
            ..Default::default()
        };
        let created = self
            .docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| Error::Docker(format!("failed to create container from {}: {}", image, e)))?;
        Ok(created.id)
    }

    async fn copy_from_container(
        &self,
        id: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<ArchiveReader> {
        let options = DownloadFromContainerOptionsBuilder::default()
            .path(path)
            .build();
        let mut chunks = Box::pin(
            self.docker
                .download_from_container(id, Some(options))
                .take_until(cancel.clone().cancelled_owned()),
        );

        // Surface "no such file" as a copy failure rather than a bad archive
        let first = match chunks.next().await {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                return Err(Error::Docker(format!(
                    "failed to copy {} from container {}: {}",
                    path, id, e
                )))
            }
            None => {
                if cancel.is_cancelled() {
                    return Err(Error::cancelled("copy from container"));
                }
                return Err(Error::Docker(format!(
                    "copy of {} from container {} returned no data",
                    path, id
                )));
            }
        };

        let chunks = stream::once(async move { Ok(first) })
            .chain(chunks)
            .map(|chunk| chunk.map_err(io::Error::other));
        Ok(Box::new(StreamReader::new(Box::pin(chunks))))
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptionsBuilder::default().force(true).build();
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| Error::Docker(format!("failed to remove container {}: {}", id, e)))
    }
}
