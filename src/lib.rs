//! sigstore-e2e - Tool provisioning for end-to-end tests
//!
//! Acquires the command-line tools an end-to-end suite drives (built from a
//! git checkout, downloaded from a catalog, found on `PATH`, or extracted
//! from a container image) and runs them with cancellation and logging.

pub mod cli;
pub mod commands;
pub mod common;
pub mod setup;
pub mod testing;
pub mod tool;

// Re-export commonly used types for tests
pub use common::{Error, ErrorKind, Result};
pub use setup::{
    Acquired, BuildFromGit, DownloadFromCatalog, ExtractFromContainer, LocalBinary, SetupStrategy,
    StrategyKind,
};
pub use tool::{RunningCommand, Tool, ToolCommand};
