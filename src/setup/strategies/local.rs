//! Local lookup
//!
//! Uses a binary already installed on the machine.

use crate::common::{Error, Result};
use crate::setup::{Acquired, SetupStrategy, StrategyKind};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Find the tool by name on `PATH`, or on an explicit search path
#[derive(Debug, Clone, Default)]
pub struct LocalBinary {
    search_path: Option<String>,
}

impl LocalBinary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search these directories (`PATH` syntax) instead of `PATH`
    pub fn in_paths(search_path: impl Into<String>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }
}

#[async_trait]
impl SetupStrategy for LocalBinary {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Local
    }

    fn describe(&self) -> String {
        match &self.search_path {
            Some(paths) => format!("lookup in {}", paths),
            None => "lookup on PATH".to_string(),
        }
    }

    async fn acquire(&self, tool: &str, _cancel: &CancellationToken) -> Result<Acquired> {
        let found = match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir()?;
                which::which_in(tool, Some(paths), cwd)
            }
            None => which::which(tool),
        };

        let path = found.map_err(|source| Error::NotFoundOnPath {
            name: tool.to_string(),
            source,
        })?;
        tracing::debug!(tool, path = %path.display(), "Found local binary");
        Ok(Acquired::existing(path))
    }
}
