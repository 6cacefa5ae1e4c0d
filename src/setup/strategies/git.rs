//! Build from source
//!
//! Shallow-clones a repository at a branch and compiles the named command
//! inside the checkout. The default build is the Go convention used by the
//! sigstore projects: `go build -o <name> ./cmd/<name>`.

use crate::common::config::WorkspaceConfig;
use crate::common::{Error, Result};
use crate::setup::installer::{run_command, stderr_tail, Workspace};
use crate::setup::{Acquired, SetupStrategy, StrategyKind};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Clone `url` at `branch` and build the tool from it
#[derive(Debug, Clone)]
pub struct BuildFromGit {
    url: String,
    branch: String,
    package: Option<String>,
    build_command: Option<Vec<String>>,
    workspace: WorkspaceConfig,
}

impl BuildFromGit {
    pub fn new(url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
            package: None,
            build_command: None,
            workspace: WorkspaceConfig::default(),
        }
    }

    /// Package directory to build, relative to the checkout (default `./cmd/<name>`)
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Replace the build command
    ///
    /// `{name}` and `{package}` are substituted in every argument. The command
    /// runs in the checkout and must leave the binary at `<checkout>/<name>`.
    pub fn with_build_command(mut self, command: Vec<String>) -> Self {
        self.build_command = Some(command);
        self
    }

    pub fn with_workspace(mut self, workspace: WorkspaceConfig) -> Self {
        self.workspace = workspace;
        self
    }

    fn package_for(&self, tool: &str) -> String {
        self.package
            .clone()
            .unwrap_or_else(|| format!("./cmd/{}", tool))
    }

    /// Build argv with placeholders resolved
    fn build_argv(&self, tool: &str) -> Vec<String> {
        let package = self.package_for(tool);
        let template = match &self.build_command {
            Some(cmd) => cmd.clone(),
            None => vec![
                "go".to_string(),
                "build".to_string(),
                "-o".to_string(),
                "{name}".to_string(),
                "{package}".to_string(),
            ],
        };
        template
            .into_iter()
            .map(|arg| arg.replace("{name}", tool).replace("{package}", &package))
            .collect()
    }

    async fn clone_into(&self, dir: &Path, cancel: &CancellationToken) -> Result<()> {
        let clone_error = |message: String| Error::GitClone {
            url: self.url.clone(),
            branch: self.branch.clone(),
            message,
        };

        let mut cmd = Command::new("git");
        cmd.args([
            "clone",
            "--depth",
            "1",
            "--branch",
            self.branch.as_str(),
            self.url.as_str(),
        ])
            .arg(dir)
            .env("GIT_TERMINAL_PROMPT", "0");

        match run_command(&mut cmd, cancel, "git clone").await {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => Err(clone_error(stderr_tail(&output))),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => Err(clone_error(e.to_string())),
        }
    }

    async fn build_in(&self, dir: &Path, tool: &str, cancel: &CancellationToken) -> Result<()> {
        let argv = self.build_argv(tool);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Config(format!("empty build command for '{}'", tool)))?;

        tracing::info!(tool, command = %argv.join(" "), "Building");
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(dir);

        match run_command(&mut cmd, cancel, "build").await {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => Err(Error::build(
                tool,
                format!("'{}' exited with {}: {}", program, output.status, stderr_tail(&output)),
            )),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => Err(Error::build(tool, e.to_string())),
        }
    }
}

#[async_trait]
impl SetupStrategy for BuildFromGit {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BuildFromGit
    }

    fn describe(&self) -> String {
        format!("build from {} ({})", self.url, self.branch)
    }

    async fn acquire(&self, tool: &str, cancel: &CancellationToken) -> Result<Acquired> {
        let workspace = Workspace::create(tool, &self.workspace)?;
        let checkout = workspace.path().join("src");

        tracing::info!(tool, url = %self.url, branch = %self.branch, "Cloning");
        self.clone_into(&checkout, cancel).await?;
        self.build_in(&checkout, tool, cancel).await?;

        let path = checkout.join(tool);
        if !path.is_file() {
            return Err(Error::build(
                tool,
                format!("build succeeded but produced no binary at {}", path.display()),
            ));
        }
        Ok(Acquired::in_workspace(path, workspace))
    }
}
