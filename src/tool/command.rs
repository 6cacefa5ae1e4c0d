//! Cancellable subprocess with log-forwarded output

use crate::common::{cancellable, Error, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Which child stream a forwarded line came from
#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// A prepared, not yet started invocation of a tool
///
/// Standard output lines are logged at INFO and standard error lines at
/// ERROR, both with an `app` field naming the tool.
pub struct ToolCommand {
    tool: String,
    path: PathBuf,
    command: Command,
    cancel: CancellationToken,
}

impl ToolCommand {
    pub(crate) fn new<I, S>(tool: &str, path: &Path, args: I, cancel: &CancellationToken) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(path);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Self {
            tool: tool.to_string(),
            path: path.to_path_buf(),
            command,
            cancel: cancel.clone(),
        }
    }

    /// Set an environment variable for the child
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.command.env(key, value);
        self
    }

    /// Run the child in `dir`
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.command.current_dir(dir);
        self
    }

    /// Underlying command, for settings not covered here
    pub fn as_command_mut(&mut self) -> &mut Command {
        &mut self.command
    }

    /// Start the child and begin forwarding its output
    pub fn spawn(mut self) -> Result<RunningCommand> {
        tracing::debug!(app = %self.tool, path = %self.path.display(), "Starting");
        let mut child = self.command.spawn().map_err(|source| Error::CommandSpawn {
            path: self.path.clone(),
            source,
        })?;

        let mut forwarders = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(forward_lines(self.tool.clone(), stdout, Stream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(forward_lines(self.tool.clone(), stderr, Stream::Stderr));
        }

        Ok(RunningCommand {
            tool: self.tool,
            child,
            forwarders,
            cancel: self.cancel,
        })
    }

    /// Run to completion capturing both streams instead of logging them
    pub async fn output(mut self) -> Result<Output> {
        let operation = format!("'{}' run", self.tool);
        let path = self.path;
        let command = &mut self.command;
        cancellable(&self.cancel, &operation, async move {
            command
                .output()
                .await
                .map_err(|source| Error::CommandSpawn { path, source })
        })
        .await
    }

    /// Run to completion and return the exit status
    pub async fn status(self) -> Result<ExitStatus> {
        self.spawn()?.wait().await
    }

    /// Run to completion, failing on a non-zero exit
    pub async fn run(self) -> Result<()> {
        let tool = self.tool.clone();
        let status = self.status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                tool,
                code: status.code(),
                stderr: String::new(),
            })
        }
    }
}

/// A started tool invocation
pub struct RunningCommand {
    tool: String,
    child: Child,
    forwarders: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl RunningCommand {
    /// OS process ID, if still running
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for exit; kills the child if the token fires first
    pub async fn wait(mut self) -> Result<ExitStatus> {
        let status = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(app = %self.tool, error = %e, "Failed to kill cancelled process");
                }
                return Err(Error::cancelled(format!("'{}' run", self.tool)));
            }
            status = self.child.wait() => status?,
        };

        for forwarder in self.forwarders.drain(..) {
            let _ = forwarder.await;
        }
        tracing::debug!(app = %self.tool, %status, "Exited");
        Ok(status)
    }
}

fn forward_lines<R>(tool: String, reader: R, stream: Stream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            // Tools may print arbitrary bytes; the pipe must keep draining
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            match stream {
                Stream::Stdout => tracing::info!(app = %tool, "{}", line),
                Stream::Stderr => tracing::error!(app = %tool, "{}", line),
            }
        }
    })
}
