//! Installation verification
//!
//! Checks that an acquired binary actually runs by invoking it with a
//! version or help argument.

use crate::common::{Error, Result};
use crate::setup::installer::run_command;
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Arguments tried in order until one exits successfully
pub const DEFAULT_PROBES: &[&[&str]] = &[&["version"], &["--version"], &["--help"]];

/// Per-probe time limit
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of verifying a tool binary
#[derive(Debug, Clone, serde::Serialize)]
pub struct VerifyResult {
    /// Whether any probe succeeded
    pub success: bool,
    /// Arguments of the probe that succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<String>,
    /// First line of the successful probe's output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error from the last failed probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run `path` with each probe until one succeeds
pub async fn verify_tool(
    path: &Path,
    probes: &[&[&str]],
    cancel: &CancellationToken,
) -> Result<VerifyResult> {
    let mut last_error = None;

    for probe in probes {
        let mut cmd = tokio::process::Command::new(path);
        cmd.args(*probe);

        let output = match timeout(PROBE_TIMEOUT, run_command(&mut cmd, cancel, "verify")).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.is_cancelled() => return Err(e),
            Ok(Err(e)) => {
                last_error = Some(e.to_string());
                continue;
            }
            Err(_) => {
                last_error = Some(format!(
                    "'{}': {}",
                    probe.join(" "),
                    Error::Timeout(PROBE_TIMEOUT.as_secs())
                ));
                continue;
            }
        };

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first_line = stdout
                .lines()
                .chain(stderr.lines())
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string());
            return Ok(VerifyResult {
                success: true,
                probe: Some(probe.join(" ")),
                output: first_line,
                error: None,
            });
        }

        last_error = Some(format!(
            "'{}' exited with {}",
            probe.join(" "),
            output.status
        ));
    }

    Ok(VerifyResult {
        success: false,
        probe: None,
        output: None,
        error: last_error.or_else(|| Some("no probes given".to_string())),
    })
}
