//! Common utilities shared by the tool handles, strategies and CLI

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, ErrorKind, Result};

/// Run a future unless the token fires first
///
/// Returns `Error::Cancelled` naming `operation` when cancelled. The future is
/// dropped on cancellation, so anything it owns (child processes with
/// `kill_on_drop`, HTTP connections) is torn down with it.
pub async fn cancellable<F, T>(
    cancel: &tokio_util::sync::CancellationToken,
    operation: &str,
    fut: F,
) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(operation)),
        res = fut => res,
    }
}
