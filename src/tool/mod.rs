//! Tool handles
//!
//! A [`Tool`] binds a logical name to a [`SetupStrategy`]. After `setup` it
//! holds the path of a runnable binary and builds invocations of it; callers
//! never need to know which strategy produced the binary.

mod command;

pub use command::{RunningCommand, ToolCommand};

use crate::common::{cancellable, Error, Result};
use crate::setup::installer::Workspace;
use crate::setup::verifier::{verify_tool, VerifyResult, DEFAULT_PROBES};
use crate::setup::{SetupStrategy, StrategyKind};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A command-line tool acquired by a setup strategy
pub struct Tool {
    name: String,
    strategy: Option<Arc<dyn SetupStrategy>>,
    path: Option<PathBuf>,
    workspace: Option<Workspace>,
}

impl Tool {
    /// Create a handle with no strategy attached
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategy: None,
            path: None,
            workspace: None,
        }
    }

    /// Attach the strategy used by [`Tool::setup`]
    pub fn with_setup_strategy(self, strategy: impl SetupStrategy + 'static) -> Self {
        self.with_shared_strategy(Arc::new(strategy))
    }

    /// Attach an already shared strategy
    pub fn with_shared_strategy(mut self, strategy: Arc<dyn SetupStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved binary path, once set up
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether `setup` has succeeded
    pub fn is_ready(&self) -> bool {
        self.path.is_some()
    }

    pub fn strategy_kind(&self) -> Option<StrategyKind> {
        self.strategy.as_ref().map(|s| s.kind())
    }

    /// Acquire the binary with the attached strategy
    ///
    /// On failure the error is returned unchanged and any previously resolved
    /// path stays in place.
    pub async fn setup(&mut self, cancel: &CancellationToken) -> Result<&Path> {
        let strategy = self
            .strategy
            .clone()
            .ok_or_else(|| Error::NoSetupStrategy(self.name.clone()))?;

        tracing::info!(tool = %self.name, strategy = %strategy.describe(), "Setting up");
        let operation = format!("setup of '{}'", self.name);
        let acquired = cancellable(cancel, &operation, strategy.acquire(&self.name, cancel)).await?;

        let previous = std::mem::replace(&mut self.workspace, acquired.workspace);
        if let Some(previous) = previous {
            if let Err(e) = previous.close() {
                tracing::warn!(tool = %self.name, error = %e, "Failed to remove previous workspace");
            }
        }

        tracing::info!(tool = %self.name, path = %acquired.path.display(), "Ready");
        Ok(self.path.insert(acquired.path).as_path())
    }

    fn resolved_path(&self) -> Result<&Path> {
        self.path
            .as_deref()
            .ok_or_else(|| Error::ToolNotSetUp(self.name.clone()))
    }

    /// Prepare an invocation with output forwarded to the log
    ///
    /// Nothing runs until the returned command is started.
    pub fn command<I, S>(&self, cancel: &CancellationToken, args: I) -> Result<ToolCommand>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let path = self.resolved_path()?;
        Ok(ToolCommand::new(&self.name, path, args, cancel))
    }

    /// Run to completion and return standard output
    ///
    /// A non-zero exit yields `Error::CommandFailed` carrying standard error.
    pub async fn command_output<I, S>(&self, cancel: &CancellationToken, args: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.command(cancel, args)?.output().await?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                tool: self.name.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Check the binary answers `version`, `--version` or `--help`
    pub async fn verify(&self, cancel: &CancellationToken) -> Result<VerifyResult> {
        verify_tool(self.resolved_path()?, DEFAULT_PROBES, cancel).await
    }

    /// Forget the resolved path and remove the acquisition workspace
    pub fn destroy(&mut self) -> Result<()> {
        self.path = None;
        match self.workspace.take() {
            Some(workspace) => workspace.close(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("strategy", &self.strategy.as_ref().map(|s| s.describe()))
            .field("path", &self.path)
            .field("workspace", &self.workspace.as_ref().map(|w| w.path()))
            .finish()
    }
}
