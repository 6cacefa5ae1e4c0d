//! Configuration and workspace locations
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/sigstore-e2e/`
//! - macOS: `~/Library/Application Support/sigstore-e2e/`
//! - Windows: `%APPDATA%\sigstore-e2e\`

use std::path::PathBuf;

/// Application name used for directories and temp prefixes
pub const APP_NAME: &str = "sigstore-e2e";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Default parent directory for acquisition workspaces
pub fn workspace_root() -> PathBuf {
    std::env::temp_dir()
}
