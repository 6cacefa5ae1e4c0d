//! Tool acquisition
//!
//! A [`SetupStrategy`] turns a logical tool name into a path to a runnable
//! binary. Four strategies exist: build from a git checkout, download from a
//! catalog, look up on `PATH`, and extract from a container image. They are
//! interchangeable behind the trait and share no state.

pub mod archive;
pub mod catalog;
pub mod docker;
pub mod installer;
pub mod registry;
pub mod strategies;
pub mod verifier;

use crate::common::Result;
use async_trait::async_trait;
use installer::Workspace;
use std::fmt;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

pub use strategies::{BuildFromGit, DownloadFromCatalog, ExtractFromContainer, LocalBinary};

/// Which kind of source a strategy acquires from
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    BuildFromGit,
    Download,
    Local,
    ExtractFromContainer,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::BuildFromGit => write!(f, "build_from_git"),
            StrategyKind::Download => write!(f, "download"),
            StrategyKind::Local => write!(f, "local"),
            StrategyKind::ExtractFromContainer => write!(f, "extract_from_container"),
        }
    }
}

/// Outcome of a successful acquisition
#[derive(Debug)]
pub struct Acquired {
    /// Path to the executable
    pub path: PathBuf,
    /// Directory holding the artifact, if the strategy created one
    pub workspace: Option<Workspace>,
}

impl Acquired {
    /// A binary that already lives somewhere permanent
    pub fn existing(path: PathBuf) -> Self {
        Self {
            path,
            workspace: None,
        }
    }

    /// A binary inside a freshly created workspace
    pub fn in_workspace(path: PathBuf, workspace: Workspace) -> Self {
        Self {
            path,
            workspace: Some(workspace),
        }
    }
}

/// Produces an executable path for a tool
#[async_trait]
pub trait SetupStrategy: Send + Sync {
    /// Which source this strategy uses
    fn kind(&self) -> StrategyKind;

    /// Human-readable summary for logs
    fn describe(&self) -> String;

    /// Acquire the binary for `tool`
    ///
    /// Each call is independent: nothing is cached between calls. On failure
    /// any workspace created along the way is removed.
    async fn acquire(&self, tool: &str, cancel: &CancellationToken) -> Result<Acquired>;
}
