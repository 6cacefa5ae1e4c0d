//! Error types for the e2e harness
//!
//! Errors are grouped by where in a tool's lifecycle they happen: acquiring
//! the binary, unpacking it, invoking it, or being cancelled along the way.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Acquisition Errors ===
    #[error("Tool '{0}' has no setup strategy. Attach one with 'with_setup_strategy' first")]
    NoSetupStrategy(String),

    #[error("Failed to clone {url} (branch {branch}): {message}")]
    GitClone {
        url: String,
        branch: String,
        message: String,
    },

    #[error("Failed to build '{tool}': {message}")]
    Build { tool: String, message: String },

    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },

    #[error("No download link for '{name}' on {os}: {message}")]
    CatalogLookup {
        name: String,
        os: String,
        message: String,
    },

    #[error("'{name}' not found on PATH")]
    NotFoundOnPath {
        name: String,
        #[source]
        source: which::Error,
    },

    #[error("Container runtime error: {0}")]
    Docker(String),

    // === Decompression Errors ===
    #[error("Failed to unpack archive: {0}")]
    Decompression(String),

    // === Invocation Errors ===
    #[error("Tool '{0}' is not set up. Call 'setup' before running commands")]
    ToolNotSetUp(String),

    #[error("Failed to start '{}': {source}", path.display())]
    CommandSpawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{tool}' exited with {}{}", exit_description(*code), stderr_suffix(stderr))]
    CommandFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    // === Cancellation ===
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Clone, build, download, lookup, pull or copy failed
    Acquisition,
    /// Archive malformed or truncated
    Decompression,
    /// Subprocess missing or exited non-zero
    Invocation,
    /// Cancellation token fired mid-operation
    Cancellation,
    Other,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoSetupStrategy(_)
            | Error::GitClone { .. }
            | Error::Build { .. }
            | Error::Download { .. }
            | Error::CatalogLookup { .. }
            | Error::NotFoundOnPath { .. }
            | Error::Docker(_) => ErrorKind::Acquisition,
            Error::Decompression(_) => ErrorKind::Decompression,
            Error::ToolNotSetUp(_) | Error::CommandSpawn { .. } | Error::CommandFailed { .. } => {
                ErrorKind::Invocation
            }
            Error::Cancelled(_) => ErrorKind::Cancellation,
            _ => ErrorKind::Other,
        }
    }

    /// Whether this error came from a cancelled token
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }

    /// Create a download error
    pub fn download<E: std::fmt::Display>(url: &str, err: E) -> Self {
        Self::Download {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    /// Create a build error
    pub fn build(tool: &str, message: impl Into<String>) -> Self {
        Self::Build {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    /// Create a catalog lookup error
    pub fn catalog_lookup(name: &str, os: &str, message: impl Into<String>) -> Self {
        Self::CatalogLookup {
            name: name.to_string(),
            os: os.to_string(),
            message: message.into(),
        }
    }

    /// Create a cancellation error for the named operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled(operation.into())
    }
}

fn exit_description(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

impl From<bollard::errors::Error> for Error {
    fn from(e: bollard::errors::Error) -> Self {
        Error::Docker(e.to_string())
    }
}
